use crate::document::OpenState;
use crate::graph_copy::ObjectCopier;
use crate::pdf_utils::INHERITABLE_PAGE_KEYS;
use crate::{PageHandle, PdfDocument, PdfError, Result};
use lopdf::{Document, Object, ObjectId};
use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;

/// Deepest page tree walked when resolving inherited attributes.
const MAX_TREE_DEPTH: usize = 64;

// ── Page tree helpers ────────────────────────────────────────────────────────

/// Look up `key` on a page, walking up `/Parent` links when the page itself
/// does not carry it.
pub(crate) fn inherited_attribute(document: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page_id;
    let mut seen = HashSet::new();
    for _ in 0..MAX_TREE_DEPTH {
        if !seen.insert(current) {
            return None;
        }
        let dict = document.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

/// Inheritable attributes the page does not define itself but receives from
/// an ancestor.
pub(crate) fn missing_inherited(document: &Document, page_id: ObjectId) -> Vec<(&'static [u8], Object)> {
    let Ok(dict) = document.get_dictionary(page_id) else {
        return Vec::new();
    };
    INHERITABLE_PAGE_KEYS
        .iter()
        .filter(|key| !dict.has(key))
        .filter_map(|key| inherited_attribute(document, page_id, key).map(|value| (*key, value)))
        .collect()
}

/// Effective `/Rotate` of a page, normalised to 0, 90, 180 or 270.
pub(crate) fn effective_rotation(document: &Document, page_id: ObjectId) -> i64 {
    let raw = match inherited_attribute(document, page_id, b"Rotate") {
        Some(Object::Integer(n)) => n,
        Some(Object::Real(r)) => r as i64,
        _ => 0,
    };
    normalize_rotation(raw)
}

/// Snap an angle to the nearest quarter turn and fold it into `[0, 360)`.
pub(crate) fn normalize_rotation(degrees: i64) -> i64 {
    let quarter_turns = (degrees as f64 / 90.0).round() as i64;
    (quarter_turns * 90).rem_euclid(360)
}

impl OpenState {
    pub(crate) fn pages_root(&self) -> Result<ObjectId> {
        self.document
            .catalog()?
            .get(b"Pages")
            .and_then(Object::as_reference)
            .map_err(|_| PdfError::InvalidPdf("catalog has no /Pages reference".into()))
    }

    /// Rebuild the page tree as a single flat node whose kids are `order`.
    ///
    /// Inherited attributes are copied onto each page before its `/Parent`
    /// changes, so what a page displays does not depend on where it used to
    /// sit in the tree. Intermediate nodes that drop out of the tree stay in
    /// the arena until a collecting save.
    pub(crate) fn set_page_order(&mut self, order: &[ObjectId]) -> Result<()> {
        let root = self.pages_root()?;
        if !matches!(self.document.get_object(root), Ok(Object::Dictionary(_))) {
            return Err(PdfError::InvalidPdf("/Pages is not a dictionary".into()));
        }

        // Resolve everything first: nothing below this point can fail.
        let mut updates = Vec::with_capacity(order.len());
        for &page_id in order {
            let dict = self.document.get_dictionary(page_id).map_err(|_| {
                PdfError::InvalidPdf(format!("page object {} {} R is missing", page_id.0, page_id.1))
            })?;
            let reparent = dict.get(b"Parent").and_then(Object::as_reference).ok() != Some(root);
            updates.push((page_id, reparent, missing_inherited(&self.document, page_id)));
        }

        for (page_id, reparent, inherited) in updates {
            if !reparent && inherited.is_empty() {
                continue;
            }
            if let Ok(dict) = self.document.get_dictionary_mut(page_id) {
                for (key, value) in inherited {
                    dict.set(key, value);
                }
                dict.set("Parent", Object::Reference(root));
            }
            self.mark_dirty(page_id);
        }

        if let Ok(dict) = self.document.get_dictionary_mut(root) {
            dict.set(
                "Kids",
                Object::Array(order.iter().map(|id| Object::Reference(*id)).collect()),
            );
            dict.set("Count", Object::Integer(order.len() as i64));
            dict.remove(b"Parent");
        }
        self.mark_dirty(root);
        Ok(())
    }

    /// Copy `range` of the source's pages (and every object they reach) into
    /// this arena under fresh ids and splice them in at `at`.
    ///
    /// Either all pages land or the arena, dirty set and page order are left
    /// as they were.
    pub(crate) fn splice_pages_from(&mut self, source: &Document, range: Range<usize>, at: usize) -> Result<usize> {
        let source_pages: Vec<ObjectId> = source.get_pages().into_values().collect();
        let source_count = source_pages.len();
        let selected = source_pages.get(range.clone()).ok_or(PdfError::PageIndex {
            index: range.end.saturating_sub(1),
            page_count: source_count,
        })?;

        let mut order = self.page_ids();
        if at > order.len() {
            return Err(PdfError::PageIndex {
                index: at,
                page_count: order.len(),
            });
        }

        let max_id_before = self.document.max_id;
        let dirty_before = self.dirty.clone();

        let mut copier = ObjectCopier::new(source, &mut self.document);
        let copied_pages = copier.copy_pages(selected);
        let created = copier.created_ids();

        for id in &created {
            self.mark_dirty(*id);
        }

        order.splice(at..at, copied_pages.iter().copied());
        if let Err(err) = self.set_page_order(&order) {
            self.document.objects.retain(|id, _| !created.contains(id));
            self.document.max_id = max_id_before;
            self.dirty = dirty_before;
            return Err(err);
        }

        log::debug!(
            "spliced {} page(s) ({} objects) at position {}",
            copied_pages.len(),
            created.len(),
            at
        );
        Ok(copied_pages.len())
    }
}

// ── PdfDocument: page tree operations ─────────────────────────────────────────

/// Page tree mutation for PdfDocument.
impl PdfDocument {
    /// Effective rotation of a page in degrees (0, 90, 180 or 270), including
    /// a `/Rotate` inherited from the page tree.
    pub fn rotation(&self, page: &PageHandle) -> Result<i64> {
        let page_id = self.resolve_page(page)?;
        Ok(effective_rotation(&self.state()?.document, page_id))
    }

    /// Rotate the page at `index` by `delta_degrees` and return the new
    /// rotation.
    ///
    /// The result is `(old + delta) mod 360`. PDF only allows quarter turns,
    /// so a delta that is not a multiple of 90 is snapped to the nearest one.
    pub fn rotate(&mut self, index: usize, delta_degrees: i64) -> Result<i64> {
        let state = self.state_mut()?;
        let page_id = state.page_id(index)?;
        let old = effective_rotation(&state.document, page_id);
        let new = normalize_rotation(old + normalize_rotation(delta_degrees));

        state
            .document
            .get_dictionary_mut(page_id)?
            .set("Rotate", Object::Integer(new));
        state.mark_dirty(page_id);

        log::debug!("page {index}: rotation {old} -> {new}");
        Ok(new)
    }

    /// Remove the page at `index`. Later pages shift down by one.
    ///
    /// The page object and anything only it referenced stay in the arena,
    /// unreachable, until the next garbage-collecting save.
    pub fn delete_page(&mut self, index: usize) -> Result<()> {
        let state = self.state_mut()?;
        let mut order = state.page_ids();
        if index >= order.len() {
            return Err(PdfError::PageIndex {
                index,
                page_count: order.len(),
            });
        }
        order.remove(index);
        state.set_page_order(&order)?;

        log::debug!("deleted page {index}, {} remaining", order.len());
        Ok(())
    }

    /// Move the page at `from` to position `to` of the ordering that results
    /// once it has been taken out.
    ///
    /// On `[A, B, C, D]`, `move_page(0, 2)` yields `[B, C, A, D]`. Equal
    /// indices are a no-op.
    pub fn move_page(&mut self, from: usize, to: usize) -> Result<()> {
        let state = self.state_mut()?;
        let mut order = state.page_ids();
        let page_count = order.len();
        for index in [from, to] {
            if index >= page_count {
                return Err(PdfError::PageIndex { index, page_count });
            }
        }
        if from == to {
            return Ok(());
        }

        let page = order.remove(from);
        order.insert(to, page);
        state.set_page_order(&order)?;

        log::debug!("moved page {from} to {to}");
        Ok(())
    }

    /// Copy every page of the PDF at `source_path` into this document,
    /// starting at position `at` (`None` appends at the end).
    ///
    /// The source is opened and released within this call. Copied pages get
    /// their own freshly numbered objects, so nothing is shared with objects
    /// already in this document. Returns the number of pages inserted.
    pub fn insert_pages_from<P: AsRef<Path>>(&mut self, source_path: P, at: Option<usize>) -> Result<usize> {
        // Fail fast before touching the source.
        let page_count = self.page_count()?;
        let at = at.unwrap_or(page_count);
        if at > page_count {
            return Err(PdfError::PageIndex {
                index: at,
                page_count,
            });
        }

        let mut source = PdfDocument::open(source_path.as_ref())?;
        let result = self.append_pages(&source, None, at);
        source.close();

        let inserted = result?;
        log::info!(
            "inserted {inserted} page(s) from {} at position {at}",
            source_path.as_ref().display()
        );
        Ok(inserted)
    }

    /// Copy `range` (0-based, end-exclusive; `None` = every page) of
    /// `source` into this document at position `at`.
    pub(crate) fn append_pages(&mut self, source: &PdfDocument, range: Option<Range<usize>>, at: usize) -> Result<usize> {
        let source_document = &source.state()?.document;
        let range = range.unwrap_or(0..source_document.get_pages().len());
        self.state_mut()?.splice_pages_from(source_document, range, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_folds_into_quarter_turns() {
        assert_eq!(normalize_rotation(0), 0);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(-90), 270);
        assert_eq!(normalize_rotation(-450), 270);
        assert_eq!(normalize_rotation(360), 0);
        assert_eq!(normalize_rotation(100), 90);
    }

    #[test]
    fn inherited_attribute_walks_parents() {
        let mut doc = Document::with_version("1.7");
        let root = doc.new_object_id();
        let page = doc.add_object(lopdf::Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(root)),
        ]));
        doc.objects.insert(
            root,
            Object::Dictionary(lopdf::Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Kids", Object::Array(vec![Object::Reference(page)])),
                ("Count", Object::Integer(1)),
                ("Rotate", Object::Integer(180)),
            ])),
        );

        assert_eq!(effective_rotation(&doc, page), 180);
        let missing = missing_inherited(&doc, page);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].0, b"Rotate");
    }

    fn catalog_for(doc: &mut Document, pages: ObjectId) {
        let catalog = doc.add_object(lopdf::Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog));
    }

    #[test]
    fn failed_splice_rolls_back_copied_objects() {
        let mut source = Document::with_version("1.7");
        let source_root = source.new_object_id();
        let content = source.add_object(lopdf::Stream::new(lopdf::Dictionary::new(), b"0 0 m".to_vec()));
        let page = source.add_object(lopdf::Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(source_root)),
            ("Contents", Object::Reference(content)),
        ]));
        source.objects.insert(
            source_root,
            Object::Dictionary(lopdf::Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Kids", Object::Array(vec![Object::Reference(page)])),
                ("Count", Object::Integer(1)),
            ])),
        );
        catalog_for(&mut source, source_root);

        // /Pages names an object that is not a page tree node
        let mut document = Document::with_version("1.7");
        let broken = document.add_object(Object::Integer(0));
        catalog_for(&mut document, broken);
        let mut state = OpenState {
            document,
            origin: None,
            dirty: Default::default(),
        };
        let ids_before: Vec<ObjectId> = state.document.objects.keys().copied().collect();
        let max_id_before = state.document.max_id;

        let err = state.splice_pages_from(&source, 0..1, 0).unwrap_err();
        assert!(matches!(err, PdfError::InvalidPdf(_)), "{err}");

        let ids_after: Vec<ObjectId> = state.document.objects.keys().copied().collect();
        assert_eq!(ids_after, ids_before);
        assert_eq!(state.document.max_id, max_id_before);
        assert!(state.dirty.is_empty());
    }
}
