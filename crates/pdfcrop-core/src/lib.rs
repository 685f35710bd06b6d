//! Keep-zone cropping for PDF documents
//!
//! Given a document and, per page, a list of rectangles expressed as
//! fractions of the page size, produce a document in which everything
//! outside those rectangles is painted white while the content inside them
//! is kept exactly as it was (text and vectors stay vectors).
//!
//! The work is split in two:
//! - [`region`]: fractional boxes to absolute keep zones, plus the
//!   page-index mapping parsed from JSON
//! - [`compositor`]: erase a page, then stamp the zones back from an
//!   untouched copy of the document
//!
//! [`crop_document`] ties them together.

pub mod compositor;
pub mod document;
pub mod error;
pub mod geometry;
pub mod region;

#[cfg(test)]
mod test_support;

pub use compositor::{PageOutcome, PageState};
pub use document::{crop_document, page_count, CropOutput};
pub use error::{CropError, PagePhase};
pub use geometry::{PageGeometry, Rotation};
pub use region::{resolve, FractionalBox, KeepZone, KeepZoneMap};
