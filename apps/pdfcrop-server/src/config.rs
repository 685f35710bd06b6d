//! Server configuration
//!
//! Cross-origin policy and limits are plain values handed to the router
//! builder, never process-wide state.

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowMethods, AllowOrigin, Any, CorsLayer};

/// Wildcard accepted in origin and method lists
const ANY: &str = "*";

/// Cross-origin access policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsConfig {
    /// Exact origins, or `*` for any
    pub allowed_origins: Vec<String>,
    /// Method names, or `*` for any
    pub allowed_methods: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![ANY.to_string()],
            allowed_methods: vec![ANY.to_string()],
        }
    }
}

impl CorsConfig {
    pub fn layer(&self) -> Result<CorsLayer> {
        let origins = if self.allowed_origins.iter().any(|o| o == ANY) {
            AllowOrigin::from(Any)
        } else {
            let values = self
                .allowed_origins
                .iter()
                .map(|o| {
                    HeaderValue::from_str(o).with_context(|| format!("Invalid origin '{}'", o))
                })
                .collect::<Result<Vec<_>>>()?;
            AllowOrigin::list(values)
        };

        let methods = if self.allowed_methods.iter().any(|m| m == ANY) {
            AllowMethods::from(Any)
        } else {
            let values = self
                .allowed_methods
                .iter()
                .map(|m| {
                    Method::from_bytes(m.to_uppercase().as_bytes())
                        .with_context(|| format!("Invalid method '{}'", m))
                })
                .collect::<Result<Vec<_>>>()?;
            AllowMethods::list(values)
        };

        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any))
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors: CorsConfig::default(),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}
