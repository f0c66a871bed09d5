use crate::pdf_utils;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};

/// Deepest chain of nested Form XObjects followed while scanning.
const MAX_FORM_DEPTH: usize = 12;

// ── Rect ──────────────────────────────────────────────────────────────────────

/// An axis-aligned rectangle in default user space (points, origin at the
/// bottom-left of the page).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    /// Build a rectangle from two corners given in any order.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

// ── Matrix ────────────────────────────────────────────────────────────────────

/// A PDF transformation matrix `[a b c d e f]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix([f32; 6]);

impl Matrix {
    pub(crate) const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    /// Read six numeric operands; `None` if there are fewer or any is not a
    /// number.
    pub(crate) fn from_operands(operands: &[Object]) -> Option<Self> {
        if operands.len() < 6 {
            return None;
        }
        let mut values = [0.0f32; 6];
        for (slot, operand) in values.iter_mut().zip(operands) {
            *slot = operand.as_float().ok()?;
        }
        Some(Matrix(values))
    }

    /// `self × other`: apply `self` first, then `other`. This is how `cm`
    /// combines with the current matrix (`CTM' = M × CTM`).
    pub(crate) fn then(&self, other: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [oa, ob, oc, od, oe, of] = other.0;
        Matrix([
            a * oa + b * oc,
            a * ob + b * od,
            c * oa + d * oc,
            c * ob + d * od,
            e * oa + f * oc + oe,
            e * ob + f * od + of,
        ])
    }

    pub(crate) fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    /// Bounding box of the unit square under this matrix, which is where an
    /// image XObject is painted.
    pub(crate) fn unit_square_bounds(&self) -> Rect {
        let corners = [self.apply(0.0, 0.0), self.apply(1.0, 0.0), self.apply(0.0, 1.0), self.apply(1.0, 1.0)];
        let (mut x0, mut y0) = corners[0];
        let (mut x1, mut y1) = corners[0];
        for (x, y) in &corners[1..] {
            x0 = x0.min(*x);
            y0 = y0.min(*y);
            x1 = x1.max(*x);
            y1 = y1.max(*y);
        }
        Rect { x0, y0, x1, y1 }
    }

    /// The matrix that maps the unit square onto `rect`.
    pub(crate) fn for_rect(rect: &Rect) -> Matrix {
        Matrix([rect.width(), 0.0, 0.0, rect.height(), rect.x0, rect.y0])
    }

    pub(crate) fn to_operands(self) -> Vec<Object> {
        self.0.iter().map(|v| Object::Real(*v)).collect()
    }
}

// ── Placement scanning ───────────────────────────────────────────────────────

/// Walks page content streams and records where each image XObject is
/// painted.
///
/// Tracks the graphics state stack (`q`/`Q`/`cm`), resolves `Do` operands
/// through the applicable `/Resources /XObject` dictionary and descends into
/// Form XObjects with their `/Matrix` applied.
pub(crate) struct PlacementScanner<'a> {
    document: &'a Document,
    placements: Vec<(ObjectId, Vec<Rect>)>,
    form_stack: Vec<ObjectId>,
}

impl<'a> PlacementScanner<'a> {
    pub(crate) fn new(document: &'a Document) -> Self {
        Self {
            document,
            placements: Vec::new(),
            form_stack: Vec::new(),
        }
    }

    /// Image placements on one page, grouped by image in order of first
    /// appearance.
    pub(crate) fn scan_page(mut self, page_id: ObjectId) -> Vec<(ObjectId, Vec<Rect>)> {
        let content = match self.document.get_page_content(page_id) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("page {} {} R: unreadable content: {e}", page_id.0, page_id.1);
                return Vec::new();
            }
        };
        let resources = crate::page_tree::inherited_attribute(self.document, page_id, b"Resources");
        let resources = resources
            .as_ref()
            .and_then(|value| pdf_utils::resolve_dict(self.document, value))
            .cloned()
            .unwrap_or_default();

        self.scan_content(&content, &resources, Matrix::IDENTITY);
        self.placements
    }

    fn scan_content(&mut self, bytes: &[u8], resources: &Dictionary, base: Matrix) {
        let content = match Content::decode(bytes) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("skipping undecodable content stream: {e}");
                return;
            }
        };

        let mut ctm = base;
        let mut saved = Vec::new();
        for operation in &content.operations {
            match operation.operator.as_str() {
                "q" => saved.push(ctm),
                "Q" => ctm = saved.pop().unwrap_or(base),
                "cm" => {
                    if let Some(matrix) = Matrix::from_operands(&operation.operands) {
                        ctm = matrix.then(&ctm);
                    }
                }
                "Do" => {
                    if let Some(name) = operation.operands.first().and_then(|o| o.as_name().ok()) {
                        self.paint_xobject(name, resources, ctm);
                    }
                }
                _ => {}
            }
        }
    }

    fn paint_xobject(&mut self, name: &[u8], resources: &Dictionary, ctm: Matrix) {
        let document = self.document;
        let Some(id) = xobject_reference(document, resources, name) else {
            return;
        };
        let Ok(stream) = document.get_object(id).and_then(Object::as_stream) else {
            return;
        };

        match pdf_utils::name_from_dict(&stream.dict, b"Subtype").as_deref() {
            Some("Image") => self.record(id, ctm.unit_square_bounds()),
            Some("Form") => {
                if self.form_stack.contains(&id) || self.form_stack.len() >= MAX_FORM_DEPTH {
                    return;
                }
                let form_matrix = stream
                    .dict
                    .get(b"Matrix")
                    .ok()
                    .and_then(|m| m.as_array().ok())
                    .and_then(|items| Matrix::from_operands(items))
                    .unwrap_or(Matrix::IDENTITY);
                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|value| pdf_utils::resolve_dict(document, value))
                    .cloned()
                    .unwrap_or_else(|| resources.clone());
                let bytes = pdf_utils::decoded_content(stream);

                self.form_stack.push(id);
                self.scan_content(&bytes, &form_resources, form_matrix.then(&ctm));
                self.form_stack.pop();
            }
            _ => {}
        }
    }

    fn record(&mut self, id: ObjectId, rect: Rect) {
        match self.placements.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, rects)) => rects.push(rect),
            None => self.placements.push((id, vec![rect])),
        }
    }
}

/// Resolve an XObject resource name to the object id it refers to.
pub(crate) fn xobject_reference(document: &Document, resources: &Dictionary, name: &[u8]) -> Option<ObjectId> {
    let xobjects = resources.get(b"XObject").ok()?;
    let xobjects = pdf_utils::resolve_dict(document, xobjects)?;
    xobjects.get(name).and_then(Object::as_reference).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_square_maps_onto_placement() {
        let m = Matrix([200.0, 0.0, 0.0, 100.0, 50.0, 60.0]);
        assert_eq!(m.unit_square_bounds(), Rect::new(50.0, 60.0, 250.0, 160.0));
    }

    #[test]
    fn cm_composes_with_current_matrix() {
        // translate, then scale inside it
        let ctm = Matrix([1.0, 0.0, 0.0, 1.0, 100.0, 100.0]);
        let scale = Matrix([10.0, 0.0, 0.0, 20.0, 0.0, 0.0]);
        let combined = scale.then(&ctm);
        assert_eq!(combined.unit_square_bounds(), Rect::new(100.0, 100.0, 110.0, 120.0));
    }

    #[test]
    fn rotated_placement_uses_bounding_box() {
        // quarter turn: (x, y) -> (-y, x), then scale 10
        let m = Matrix([0.0, 10.0, -10.0, 0.0, 0.0, 0.0]);
        let bounds = m.unit_square_bounds();
        assert_eq!(bounds, Rect::new(-10.0, 0.0, 0.0, 10.0));
    }

    #[test]
    fn rect_for_matrix_round_trips_placement() {
        let rect = Rect::new(10.0, 20.0, 110.0, 70.0);
        assert_eq!(Matrix::for_rect(&rect).unit_square_bounds(), rect);
    }
}
