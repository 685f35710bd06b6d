use std::fmt;

use thiserror::Error;

/// Stage of page processing in which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePhase {
    /// Reading the page box or rotation
    Geometry,
    /// Replacing the page content with a white canvas
    Erase,
    /// Stamping keep zones back from the source page
    Restore,
}

impl fmt::Display for PagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PagePhase::Geometry => write!(f, "geometry"),
            PagePhase::Erase => write!(f, "erase"),
            PagePhase::Restore => write!(f, "restore"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CropError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Page {page} failed during {phase}: {message}")]
    PageProcessing {
        page: usize,
        phase: PagePhase,
        message: String,
    },

    #[error("Failed to save PDF: {0}")]
    Persistence(String),
}

impl CropError {
    pub(crate) fn page(page: usize, phase: PagePhase, err: impl fmt::Display) -> Self {
        CropError::PageProcessing {
            page,
            phase,
            message: err.to_string(),
        }
    }
}
