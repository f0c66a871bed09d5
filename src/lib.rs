//! # pdftoolbox
//!
//! A Rust library for editing PDF documents as structured object graphs.
//!
//! ## What this crate does
//!
//! 1. **Open and inspect** — parses a PDF into an arena of indirect objects
//!    and exposes the page tree, page rotations and image placements.
//! 2. **Edit pages** — rotate, delete, move, and insert pages copied from
//!    another document.
//! 3. **Merge and split** — concatenate documents or cut them into ranges,
//!    always copying objects into fresh, independent documents.
//! 4. **Recompress** — re-encode embedded raster images at a quality tier and
//!    substitute the new stream for every placement of the old one.
//! 5. **Annotate** — draw Helvetica text onto a page, or attach highlight,
//!    sticky-note and freehand ink annotations.
//! 6. **Save** — append an incremental update to the source file, or write a
//!    garbage-collected, deflated full rewrite.
//!
//! ## Quick example
//!
//! ```no_run
//! use pdftoolbox::{PdfDocument, SaveOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut doc = PdfDocument::open("report.pdf")?;
//! println!("{} pages", doc.page_count()?);
//!
//! doc.rotate(0, 90)?;
//! doc.move_page(0, 2)?;
//! doc.save_as("report-edited.pdf", &SaveOptions::default())?;
//! doc.close();
//! # Ok(())
//! # }
//! ```

use std::fmt;
use thiserror::Error;

mod annotate;
mod compress;
mod content;
mod document;
mod graph_copy;
mod images;
mod merge;
mod page_tree;
mod pdf_utils;
mod save;
mod split;
mod transcode;

pub use annotate::{InkStyle, TextStyle};
pub use compress::{compress, simple_compress, CompressionOutcome};
pub use content::Rect;
pub use document::{PageHandle, PdfDocument};
pub use images::{ImageObject, ImageReference, RecompressionReport};
pub use merge::{merge, MergeQueue};
pub use save::{SaveOutcome, SaveStrategy};
pub use split::{extract_range, split_all_pages, split_at_ranges};

pub use lopdf::ObjectId;

// ── Configuration ────────────────────────────────────────────────────────────

/// Named bucket controlling how aggressively images are re-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QualityTier {
    /// Strong compression, visible quality loss (JPEG quality 30).
    Low,
    /// Balanced default (JPEG quality 60).
    #[default]
    Medium,
    /// Light compression, good quality (JPEG quality 85).
    High,
}

impl QualityTier {
    /// The JPEG encoder quality used for this tier.
    pub fn jpeg_quality(self) -> u8 {
        match self {
            QualityTier::Low => 30,
            QualityTier::Medium => 60,
            QualityTier::High => 85,
        }
    }

    /// Parse a tier label.
    ///
    /// Accepts `low`/`medium`/`high` and the German labels
    /// `niedrig`/`mittel`/`hoch`, ignoring case. Anything else yields
    /// [`QualityTier::Medium`].
    ///
    /// ```
    /// use pdftoolbox::QualityTier;
    /// assert_eq!(QualityTier::parse("HIGH"), QualityTier::High);
    /// assert_eq!(QualityTier::parse("niedrig"), QualityTier::Low);
    /// assert_eq!(QualityTier::parse("ultra"), QualityTier::Medium);
    /// ```
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" | "niedrig" => QualityTier::Low,
            "high" | "hoch" => QualityTier::High,
            "medium" | "mittel" => QualityTier::Medium,
            _ => QualityTier::Medium,
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        };
        f.write_str(label)
    }
}

/// Options for [`PdfDocument::save`] and [`PdfDocument::save_as`].
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Force a full rewrite with garbage collection and stream deflation,
    /// even when an incremental update would be possible.
    pub garbage_collect: bool,
}

/// Options for [`compress`].
#[derive(Debug, Clone)]
pub struct CompressOptions {
    /// Re-encoding tier for images. `None` means [`QualityTier::Medium`].
    pub quality: Option<QualityTier>,

    /// When `false`, no image is transcoded and only the garbage-collecting
    /// rewrite is performed (lossless).
    pub recompress_images: bool,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            quality: None,
            recompress_images: true,
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

/// Coarse classification of a [`PdfError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unreadable/unwritable path, or bytes that are not a valid PDF.
    Io,
    /// A page or object index outside the valid range, or an empty point
    /// list.
    Index,
    /// A handle was used after its document was closed.
    UseAfterClose,
    /// A merge was requested with fewer than two sources.
    InsufficientInput,
    /// An individual image could not be decoded or re-encoded.
    Encoding,
}

/// Every error that this crate can produce.
#[derive(Error, Debug)]
pub enum PdfError {
    /// A filesystem I/O error occurred (e.g. when loading or saving a file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input bytes do not form a structurally valid PDF document.
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// The underlying lopdf parser or writer returned an error.
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),

    /// A 0-based page index outside `[0, page_count)`.
    #[error("page index {index} is out of range for a document with {page_count} page(s)")]
    PageIndex { index: usize, page_count: usize },

    /// The object id does not name an image XObject in this document.
    #[error("object {} is not an image XObject", object_label(.0))]
    NotAnImage(ObjectId),

    /// The document was closed before this call.
    #[error("document handle has been closed")]
    UseAfterClose,

    /// A page handle obtained from a different document was passed in.
    #[error("page handle belongs to a different document")]
    ForeignPage,

    /// A freehand stroke was requested without any points.
    #[error("an ink stroke needs at least one point")]
    EmptyStroke,

    /// [`merge`] was called with fewer than two source paths.
    #[error("merge needs at least 2 source documents, got {given}")]
    InsufficientInput { given: usize },

    /// An image could not be decoded or re-encoded.
    #[error("image {} could not be encoded: {reason}", optional_object_label(.object_id))]
    Encoding {
        object_id: Option<ObjectId>,
        reason: String,
    },

    /// [`PdfDocument::save`] was called on a document that was not opened
    /// from a file.
    #[error("document has no source path; use save_as with an explicit destination")]
    NoSourcePath,
}

impl PdfError {
    /// Map this error onto the five-member taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PdfError::Io(_)
            | PdfError::InvalidPdf(_)
            | PdfError::Parse(_)
            | PdfError::NoSourcePath => ErrorKind::Io,
            PdfError::PageIndex { .. } | PdfError::NotAnImage(_) | PdfError::EmptyStroke => ErrorKind::Index,
            PdfError::UseAfterClose | PdfError::ForeignPage => ErrorKind::UseAfterClose,
            PdfError::InsufficientInput { .. } => ErrorKind::InsufficientInput,
            PdfError::Encoding { .. } => ErrorKind::Encoding,
        }
    }

    pub(crate) fn encoding(object_id: Option<ObjectId>, reason: impl Into<String>) -> Self {
        PdfError::Encoding {
            object_id,
            reason: reason.into(),
        }
    }
}

fn object_label(id: &ObjectId) -> String {
    format!("{} {} R", id.0, id.1)
}

fn optional_object_label(id: &Option<ObjectId>) -> String {
    match id {
        Some(id) => object_label(id),
        None => "<new>".into(),
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, PdfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_map_to_fixed_qualities() {
        assert_eq!(QualityTier::Low.jpeg_quality(), 30);
        assert_eq!(QualityTier::Medium.jpeg_quality(), 60);
        assert_eq!(QualityTier::High.jpeg_quality(), 85);
        assert_eq!(QualityTier::default(), QualityTier::Medium);
    }

    #[test]
    fn unknown_tier_label_defaults_to_medium() {
        assert_eq!(QualityTier::parse(""), QualityTier::Medium);
        assert_eq!(QualityTier::parse("best"), QualityTier::Medium);
        assert_eq!(QualityTier::parse(" Hoch "), QualityTier::High);
    }

    #[test]
    fn error_kinds_follow_taxonomy() {
        assert_eq!(PdfError::UseAfterClose.kind(), ErrorKind::UseAfterClose);
        assert_eq!(
            PdfError::PageIndex { index: 3, page_count: 2 }.kind(),
            ErrorKind::Index
        );
        assert_eq!(
            PdfError::InsufficientInput { given: 1 }.kind(),
            ErrorKind::InsufficientInput
        );
        assert_eq!(PdfError::encoding(None, "bad").kind(), ErrorKind::Encoding);
        assert_eq!(PdfError::InvalidPdf("x".into()).kind(), ErrorKind::Io);
    }

    #[test]
    fn encoding_error_names_the_object() {
        let err = PdfError::encoding(Some((12, 0)), "truncated stream");
        let text = err.to_string();
        assert!(text.contains("12 0 R"), "{text}");
        assert!(text.contains("truncated stream"), "{text}");
    }
}
