//! Region Resolver
//!
//! Turns the client's fractional boxes into absolute keep zones for one page,
//! and parses the per-page keep-zone mapping from its JSON wire format.

use std::collections::BTreeMap;
use std::num::IntErrorKind;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CropError;

/// A box relative to the page's displayed size: `(x, y)` is the top-left
/// corner and `(w, h)` the extent, each nominally in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FractionalBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl FractionalBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// The box covering the whole page
    pub fn full_page() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }
}

/// Absolute keep-zone rectangle in page units, top-left origin, y growing down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeepZone {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl KeepZone {
    /// Zero or negative area, or not a real rectangle at all.
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.x0, self.y0, self.x1, self.y1]
            .iter()
            .all(|v| v.is_finite());
        !finite || self.x1 <= self.x0 || self.y1 <= self.y0
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

/// Resolve fractional boxes against a page of `width` x `height`.
///
/// No clamping: boxes reaching past the page edge stay that way and are
/// bounded later by the stamp clip.
pub fn resolve(boxes: &[FractionalBox], width: f64, height: f64) -> Vec<KeepZone> {
    boxes
        .iter()
        .map(|b| KeepZone {
            x0: b.x * width,
            y0: b.y * height,
            x1: (b.x + b.w) * width,
            y1: (b.y + b.h) * height,
        })
        .collect()
}

/// Page index (zero-based) to the boxes to keep on that page.
///
/// Pages without an entry are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeepZoneMap {
    pages: BTreeMap<usize, Vec<FractionalBox>>,
}

impl KeepZoneMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the wire format: `{"0": [{"x":..,"y":..,"w":..,"h":..}], ...}`
    pub fn from_json(json: &str) -> Result<Self, CropError> {
        let raw: BTreeMap<String, Vec<FractionalBox>> = serde_json::from_str(json)
            .map_err(|e| CropError::Input(format!("Invalid annotations: {}", e)))?;

        let mut map = Self::new();
        for (key, boxes) in raw {
            match parse_page_key(&key)? {
                Some(index) => map.insert(index, boxes),
                None => warn!("Ignoring out-of-range page key '{}'", key),
            }
        }
        Ok(map)
    }

    pub fn insert(&mut self, page: usize, boxes: Vec<FractionalBox>) {
        self.pages.insert(page, boxes);
    }

    pub fn get(&self, page: usize) -> Option<&[FractionalBox]> {
        self.pages.get(&page).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Entries that address an existing page, ascending by index
    pub fn pages_in(&self, page_count: usize) -> impl Iterator<Item = (usize, &[FractionalBox])> {
        self.pages
            .range(..page_count)
            .map(|(index, boxes)| (*index, boxes.as_slice()))
    }

    /// True when at least one existing page would be modified
    pub fn touches_any(&self, page_count: usize) -> bool {
        self.pages_in(page_count).any(|(_, boxes)| !boxes.is_empty())
    }
}

impl FromIterator<(usize, Vec<FractionalBox>)> for KeepZoneMap {
    fn from_iter<I: IntoIterator<Item = (usize, Vec<FractionalBox>)>>(iter: I) -> Self {
        Self {
            pages: iter.into_iter().collect(),
        }
    }
}

/// `Ok(None)` for integers that can never name a page (negative or huge).
fn parse_page_key(key: &str) -> Result<Option<usize>, CropError> {
    match key.trim().parse::<i64>() {
        Ok(n) if n < 0 => Ok(None),
        Ok(n) => Ok(usize::try_from(n).ok()),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => Ok(None),
            _ => Err(CropError::Input(format!(
                "Page key '{}' is not an integer",
                key
            ))),
        },
    }
}
