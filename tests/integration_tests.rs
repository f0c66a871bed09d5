// Integration tests for pdftoolbox: configuration, error taxonomy and the
// document lifecycle. Operation-level behaviour lives in
// document_operations.rs.

mod common;

use pdftoolbox::{CompressOptions, ErrorKind, PdfDocument, PdfError, QualityTier, SaveOptions};

// ── Configuration ─────────────────────────────────────────────────────────────

#[test]
fn default_options_are_conservative() {
    assert!(!SaveOptions::default().garbage_collect);

    let compress = CompressOptions::default();
    assert!(compress.recompress_images);
    assert_eq!(compress.quality.unwrap_or_default(), QualityTier::Medium);
}

#[test]
fn german_tier_labels_are_understood() {
    assert_eq!(QualityTier::parse("niedrig").jpeg_quality(), 30);
    assert_eq!(QualityTier::parse("mittel").jpeg_quality(), 60);
    assert_eq!(QualityTier::parse("hoch").jpeg_quality(), 85);
    assert_eq!(QualityTier::parse("maximal"), QualityTier::Medium);
}

// ── PdfError display ──────────────────────────────────────────────────────────

#[test]
fn error_display_names_the_parameter() {
    let err = PdfError::PageIndex { index: 7, page_count: 3 };
    let text = err.to_string();
    assert!(text.contains('7') && text.contains('3'), "{text}");

    let err = PdfError::InsufficientInput { given: 1 };
    assert!(err.to_string().contains('1'));

    assert!(PdfError::NotAnImage((5, 0)).to_string().contains("5 0 R"));
}

// ── Opening ───────────────────────────────────────────────────────────────────

#[test]
fn from_bytes_rejects_empty_slice() {
    let err = PdfDocument::from_bytes(&[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn from_bytes_rejects_non_pdf() {
    let err = PdfDocument::from_bytes(b"not a pdf").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn open_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = PdfDocument::open(dir.path().join("absent.pdf")).unwrap_err();
    assert!(matches!(err, PdfError::Io(_)));
}

#[test]
fn new_document_is_empty_and_unsaved() {
    let doc = PdfDocument::new();
    assert_eq!(doc.page_count().unwrap(), 0);
    assert!(doc.is_modified().unwrap());
    assert_eq!(doc.source_path().unwrap(), None);
    assert_eq!(doc.file_size().unwrap(), 0);
}

#[test]
fn save_without_source_path_is_refused() {
    let bytes = common::labelled_pdf(&["A"]);
    let mut doc = PdfDocument::from_bytes(&bytes).unwrap();
    assert!(matches!(doc.save(&SaveOptions::default()), Err(PdfError::NoSourcePath)));
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[test]
fn closed_document_rejects_every_call() {
    let bytes = common::labelled_pdf(&["A", "B"]);
    let mut doc = PdfDocument::from_bytes(&bytes).unwrap();
    let page = doc.page(1).unwrap();

    doc.close();
    doc.close();
    assert!(doc.is_closed());

    assert_eq!(doc.page_count().unwrap_err().kind(), ErrorKind::UseAfterClose);
    assert_eq!(doc.rotation(&page).unwrap_err().kind(), ErrorKind::UseAfterClose);
    assert_eq!(doc.image_references(&page).unwrap_err().kind(), ErrorKind::UseAfterClose);
    assert_eq!(doc.rotate(0, 90).unwrap_err().kind(), ErrorKind::UseAfterClose);
    assert_eq!(
        doc.save_as("never.pdf", &SaveOptions::default()).unwrap_err().kind(),
        ErrorKind::UseAfterClose
    );
}

#[test]
fn handles_are_bound_to_their_document() {
    let bytes = common::labelled_pdf(&["A"]);
    let a = PdfDocument::from_bytes(&bytes).unwrap();
    let b = PdfDocument::from_bytes(&bytes).unwrap();
    let page = a.page(0).unwrap();
    assert!(matches!(b.rotation(&page), Err(PdfError::ForeignPage)));
}

#[test]
fn page_index_out_of_range() {
    let bytes = common::labelled_pdf(&["A", "B"]);
    let doc = PdfDocument::from_bytes(&bytes).unwrap();
    match doc.page(2) {
        Err(PdfError::PageIndex { index, page_count }) => assert_eq!((index, page_count), (2, 2)),
        other => panic!("expected PageIndex, got {other:?}"),
    }
}
