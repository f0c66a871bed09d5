use crate::content::Rect;
use crate::document::OpenState;
use crate::images::{overlay_page, page_resources};
use crate::pdf_utils;
use crate::{PageHandle, PdfDocument, PdfError, Result};
use lopdf::content::Operation;
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

/// Side of the square a sticky-note comment occupies, in points.
const NOTE_SIZE: f32 = 20.0;

/// Annotation flag bit 3: print the annotation with the page.
const PRINT_FLAG: i64 = 4;

/// How [`PdfDocument::add_text`] draws its text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub font_size: f32,
    /// DeviceRGB fill, each channel in `0.0..=1.0`.
    pub color: [f32; 3],
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            color: [0.0, 0.0, 0.0],
        }
    }
}

/// Stroke of a freehand ink annotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InkStyle {
    /// DeviceRGB stroke, each channel in `0.0..=1.0`.
    pub color: [f32; 3],
    pub width: f32,
}

impl Default for InkStyle {
    fn default() -> Self {
        Self {
            color: [1.0, 0.0, 0.0],
            width: 2.0,
        }
    }
}

// ── Encoding helpers ─────────────────────────────────────────────────────────

fn real(value: f32) -> Object {
    Object::Real(value)
}

fn rgb(color: [f32; 3]) -> Object {
    Object::Array(color.iter().map(|c| real(c.clamp(0.0, 1.0))).collect())
}

fn rect_array(rect: &Rect) -> Object {
    Object::Array(vec![real(rect.x0), real(rect.y0), real(rect.x1), real(rect.y1)])
}

/// Bytes for a simple-font `Tj` under WinAnsiEncoding. Latin-1 maps
/// straight through; anything outside it becomes `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// A PDF text string: plain bytes for ASCII, UTF-16BE with a byte-order
/// mark otherwise.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Corners in the order highlight `/QuadPoints` expects: top-left,
/// top-right, bottom-left, bottom-right.
fn quad_points(rect: &Rect) -> Vec<Object> {
    [rect.x0, rect.y1, rect.x1, rect.y1, rect.x0, rect.y0, rect.x1, rect.y0]
        .into_iter()
        .map(real)
        .collect()
}

/// Bounding box of a stroke, grown by `margin` on every side.
fn stroke_bounds(points: &[(f32, f32)], margin: f32) -> Rect {
    let (mut x0, mut y0) = (f32::MAX, f32::MAX);
    let (mut x1, mut y1) = (f32::MIN, f32::MIN);
    for &(x, y) in points {
        x0 = x0.min(x);
        y0 = y0.min(y);
        x1 = x1.max(x);
        y1 = y1.max(y);
    }
    Rect::new(x0 - margin, y0 - margin, x1 + margin, y1 + margin)
}

// ── Page helpers ─────────────────────────────────────────────────────────────

/// The page's `/Annots` entries, following an indirect array.
fn annotation_list(document: &Document, page_dict: &Dictionary) -> Vec<Object> {
    match page_dict.get(b"Annots") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(Object::Reference(id)) => match document.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Store `annotation` and append it to the page's `/Annots`.
fn attach_annotation(state: &mut OpenState, page_id: ObjectId, mut annotation: Dictionary) -> Result<ObjectId> {
    annotation.set("Type", Object::Name(b"Annot".to_vec()));
    annotation.set("P", Object::Reference(page_id));
    annotation.set("F", Object::Integer(PRINT_FLAG));

    let mut annots = annotation_list(&state.document, state.document.get_dictionary(page_id)?);
    let annotation_id = state.add_object(annotation);
    annots.push(Object::Reference(annotation_id));

    state
        .document
        .get_dictionary_mut(page_id)?
        .set("Annots", Object::Array(annots));
    state.mark_dirty(page_id);
    Ok(annotation_id)
}

/// Name under which a base-14 Helvetica is registered in `resources`,
/// adding it when the page has none.
fn helvetica(state: &mut OpenState, resources: &mut Dictionary) -> String {
    let mut fonts = resources
        .get(b"Font")
        .ok()
        .and_then(|value| pdf_utils::resolve_dict(&state.document, value))
        .cloned()
        .unwrap_or_default();

    let existing = fonts.iter().find_map(|(name, value)| {
        let dict = pdf_utils::resolve_dict(&state.document, value)?;
        let base = dict.get(b"BaseFont").and_then(Object::as_name).ok()?;
        (base == b"Helvetica").then(|| String::from_utf8_lossy(name).into_owned())
    });
    if let Some(name) = existing {
        return name;
    }

    let mut n = 0;
    let name = loop {
        let candidate = if n == 0 { "Helv".to_string() } else { format!("Helv{n}") };
        if !fonts.has(candidate.as_bytes()) {
            break candidate;
        }
        n += 1;
    };
    let font_id = state.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
    ]));
    fonts.set(name.as_bytes().to_vec(), Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));
    name
}

// ── PdfDocument: annotations and overlays ─────────────────────────────────────

/// Text overlays and markup annotations for PdfDocument.
impl PdfDocument {
    /// Draw `text` in Helvetica with its baseline starting at `(x, y)`.
    ///
    /// Lines split on `\n` run downwards at 1.2 times the font size. The
    /// text becomes part of the page content, drawn over what is there.
    pub fn add_text(&mut self, page: &PageHandle, x: f32, y: f32, text: &str, style: &TextStyle) -> Result<()> {
        let page_id = self.resolve_page(page)?;
        let state = self.state_mut()?;

        let mut resources = page_resources(&state.document, page_id);
        let font = helvetica(state, &mut resources);

        let [r, g, b] = style.color;
        let mut operations = vec![
            Operation::new("q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(font.into_bytes()), real(style.font_size)]),
            Operation::new("TL", vec![real(style.font_size * 1.2)]),
            Operation::new("rg", vec![real(r), real(g), real(b)]),
            Operation::new("Td", vec![real(x), real(y)]),
        ];
        for (i, line) in text.lines().enumerate() {
            if i > 0 {
                operations.push(Operation::new("T*", vec![]));
            }
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(win_ansi(line), StringFormat::Literal)],
            ));
        }
        operations.extend([Operation::new("ET", vec![]), Operation::new("Q", vec![])]);

        overlay_page(state, page_id, resources, operations)?;
        log::info!("added text at ({x}, {y}) on page {}", page.index());
        Ok(())
    }

    /// Add a yellow highlight annotation covering `rect`.
    pub fn add_highlight(&mut self, page: &PageHandle, rect: Rect) -> Result<ObjectId> {
        let page_id = self.resolve_page(page)?;
        let annotation = Dictionary::from_iter(vec![
            ("Subtype", Object::Name(b"Highlight".to_vec())),
            ("Rect", rect_array(&rect)),
            ("QuadPoints", Object::Array(quad_points(&rect))),
            ("C", rgb([1.0, 1.0, 0.0])),
        ]);
        let id = attach_annotation(self.state_mut()?, page_id, annotation)?;
        log::debug!("highlight {} {} R on page {}", id.0, id.1, page.index());
        Ok(id)
    }

    /// Add a closed sticky-note comment whose icon sits at `(x, y)`.
    pub fn add_comment(&mut self, page: &PageHandle, x: f32, y: f32, text: &str) -> Result<ObjectId> {
        let page_id = self.resolve_page(page)?;
        let icon = Rect::new(x, y, x + NOTE_SIZE, y + NOTE_SIZE);
        let annotation = Dictionary::from_iter(vec![
            ("Subtype", Object::Name(b"Text".to_vec())),
            ("Rect", rect_array(&icon)),
            ("Contents", text_string(text)),
            ("Name", Object::Name(b"Note".to_vec())),
            ("Open", Object::Boolean(false)),
            ("C", rgb([1.0, 1.0, 0.0])),
        ]);
        let id = attach_annotation(self.state_mut()?, page_id, annotation)?;
        log::debug!("comment {} {} R on page {}", id.0, id.1, page.index());
        Ok(id)
    }

    /// Add an ink annotation tracing `points` as one continuous stroke.
    pub fn add_freehand(&mut self, page: &PageHandle, points: &[(f32, f32)], style: &InkStyle) -> Result<ObjectId> {
        let page_id = self.resolve_page(page)?;
        if points.is_empty() {
            return Err(PdfError::EmptyStroke);
        }
        let path = points.iter().flat_map(|&(x, y)| [real(x), real(y)]).collect();
        let annotation = Dictionary::from_iter(vec![
            ("Subtype", Object::Name(b"Ink".to_vec())),
            ("Rect", rect_array(&stroke_bounds(points, style.width))),
            ("InkList", Object::Array(vec![Object::Array(path)])),
            ("C", rgb(style.color)),
            (
                "BS",
                Object::Dictionary(Dictionary::from_iter(vec![
                    ("W", real(style.width)),
                    ("S", Object::Name(b"S".to_vec())),
                ])),
            ),
        ]);
        let id = attach_annotation(self.state_mut()?, page_id, annotation)?;
        log::debug!("ink stroke of {} point(s) on page {}", points.len(), page.index());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_strings_switch_to_utf16_outside_ascii() {
        assert_eq!(text_string("ok"), Object::String(b"ok".to_vec(), StringFormat::Literal));
        match text_string("Prüfung") {
            Object::String(bytes, StringFormat::Hexadecimal) => {
                assert_eq!(&bytes[..4], &[0xFE, 0xFF, 0x00, b'P']);
                assert_eq!(bytes.len(), 2 + 2 * 7);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn win_ansi_keeps_latin1() {
        assert_eq!(win_ansi("Grüße"), vec![b'G', b'r', 0xFC, 0xDF, b'e']);
        assert_eq!(win_ansi("a€"), vec![b'a', b'?']);
    }

    #[test]
    fn stroke_bounds_include_the_pen() {
        let bounds = stroke_bounds(&[(10.0, 20.0), (30.0, 5.0)], 2.0);
        assert_eq!(bounds, Rect::new(8.0, 3.0, 32.0, 22.0));
    }
}
