use crate::content::{Matrix, PlacementScanner, Rect};
use crate::document::OpenState;
use crate::page_tree;
use crate::pdf_utils;
use crate::transcode;
use crate::{ErrorKind, PageHandle, PdfDocument, PdfError, QualityTier, Result};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::{BTreeMap, BTreeSet};

// ── Public records ───────────────────────────────────────────────────────────

/// One image drawn on a page, with every rectangle it is painted at.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageReference {
    pub object_id: ObjectId,
    pub placements: Vec<Rect>,
}

/// Inventory entry for an image XObject in the document's object pool.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageObject {
    pub object_id: ObjectId,
    pub width: i64,
    pub height: i64,
    /// Colour space name, or the family name for array colour spaces.
    pub color_space: Option<String>,
    pub bits_per_component: Option<i64>,
    /// Outermost filter of the stream, e.g. `DCTDecode`.
    pub filter: Option<String>,
    /// Size of the stream data as stored in the file.
    pub encoded_len: usize,
    /// Placement rectangles across all pages.
    pub reference_count: usize,
}

/// What a bulk recompression did, image by image.
#[derive(Debug, Default)]
pub struct RecompressionReport {
    /// Images a re-encode was tried on.
    pub attempted: usize,
    /// Images replaced by a smaller encoding.
    pub recompressed: usize,
    /// Images kept because the new encoding was not smaller.
    pub unchanged: usize,
    /// Images that could not be decoded or re-encoded, left untouched.
    pub skipped: Vec<(ObjectId, PdfError)>,
    /// Encoded bytes saved over all replaced images.
    pub bytes_saved: u64,
}

impl RecompressionReport {
    /// `true` when at least one image was tried and none of them could be
    /// processed.
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.skipped.len() == self.attempted
    }
}

// ── Resource helpers ─────────────────────────────────────────────────────────

/// Owned copy of the resources that apply to a page, inherited or not.
pub(crate) fn page_resources(document: &Document, page_id: ObjectId) -> Dictionary {
    page_tree::inherited_attribute(document, page_id, b"Resources")
        .as_ref()
        .and_then(|value| pdf_utils::resolve_dict(document, value))
        .cloned()
        .unwrap_or_default()
}

fn xobject_map(document: &Document, resources: &Dictionary) -> Dictionary {
    resources
        .get(b"XObject")
        .ok()
        .and_then(|value| pdf_utils::resolve_dict(document, value))
        .cloned()
        .unwrap_or_default()
}

/// The page's content streams as a list of references, in drawing order.
fn content_list(document: &Document, page_dict: &Dictionary) -> Vec<Object> {
    match page_dict.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(Object::Reference(id)) => match document.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        _ => Vec::new(),
    }
}

/// Draw `operations` on top of a page and install `resources` as its
/// resource dictionary.
///
/// The existing content is bracketed in `q`/`Q` so a graphics state it
/// leaves behind does not leak into the overlay.
pub(crate) fn overlay_page(
    state: &mut OpenState,
    page_id: ObjectId,
    resources: Dictionary,
    operations: Vec<Operation>,
) -> Result<()> {
    let existing = content_list(&state.document, state.document.get_dictionary(page_id)?);

    let mut all = Vec::with_capacity(operations.len() + 1);
    if !existing.is_empty() {
        all.push(Operation::new("Q", vec![]));
    }
    all.extend(operations);
    // content streams are concatenated as-is; keep tokens apart
    let mut drawing = b"\n".to_vec();
    drawing.extend(Content { operations: all }.encode()?);

    let mut contents = Vec::with_capacity(existing.len() + 2);
    if !existing.is_empty() {
        contents.push(Object::Reference(state.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()))));
        contents.extend(existing);
    }
    contents.push(Object::Reference(state.add_object(Stream::new(Dictionary::new(), drawing))));

    let page_dict = state.document.get_dictionary_mut(page_id)?;
    page_dict.set("Resources", Object::Dictionary(resources));
    page_dict.set("Contents", Object::Array(contents));
    state.mark_dirty(page_id);
    Ok(())
}

fn color_space_label(dict: &Dictionary) -> Option<String> {
    match dict.get(b"ColorSpace").ok()? {
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        Object::Array(items) => items
            .first()
            .and_then(|o| o.as_name().ok())
            .map(|name| String::from_utf8_lossy(name).into_owned()),
        Object::Reference(_) => Some("indirect".into()),
        _ => None,
    }
}

/// Record ids of dictionaries that serve as `/XObject` maps through an
/// indirect reference.
fn collect_indirect_xobject_maps(object: &Object, out: &mut BTreeSet<ObjectId>) {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        Object::Array(items) => {
            items.iter().for_each(|item| collect_indirect_xobject_maps(item, out));
            return;
        }
        _ => return,
    };
    for (key, value) in dict.iter() {
        match value {
            Object::Reference(id) if key == b"XObject" => {
                out.insert(*id);
            }
            other => collect_indirect_xobject_maps(other, out),
        }
    }
}

/// Point every entry of an `/XObject` map that names `old` at `new`.
fn swap_map_entries(map: &mut Dictionary, old: ObjectId, new: ObjectId) -> usize {
    let mut swapped = 0;
    for (_, entry) in map.iter_mut() {
        if matches!(entry, Object::Reference(id) if *id == old) {
            *entry = Object::Reference(new);
            swapped += 1;
        }
    }
    swapped
}

/// Swap `old` for `new` in every inline `/XObject` map found inside `object`.
fn swap_inline_maps(object: &mut Object, old: ObjectId, new: ObjectId) -> usize {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &mut stream.dict,
        Object::Array(items) => return items.iter_mut().map(|item| swap_inline_maps(item, old, new)).sum(),
        _ => return 0,
    };
    let mut swapped = 0;
    for (key, value) in dict.iter_mut() {
        match value {
            Object::Dictionary(map) if key == b"XObject" => swapped += swap_map_entries(map, old, new),
            other => swapped += swap_inline_maps(other, old, new),
        }
    }
    swapped
}

impl OpenState {
    /// Redirect every `/XObject` resource entry naming `old` to `new`.
    ///
    /// Content streams refer to images by resource name, so rewriting the
    /// resource maps moves every placement at once, on every page and in
    /// every Form XObject. Returns the number of entries changed.
    pub(crate) fn substitute_xobject(&mut self, old: ObjectId, new: ObjectId) -> usize {
        let mut indirect_maps = BTreeSet::new();
        for object in self.document.objects.values() {
            collect_indirect_xobject_maps(object, &mut indirect_maps);
        }

        let mut touched = Vec::new();
        let mut total = 0;
        for (id, object) in self.document.objects.iter_mut() {
            let swapped = match object {
                Object::Dictionary(map) if indirect_maps.contains(id) => swap_map_entries(map, old, new),
                other => swap_inline_maps(other, old, new),
            };
            if swapped > 0 {
                touched.push(*id);
                total += swapped;
            }
        }
        for id in touched {
            self.mark_dirty(id);
        }
        total
    }
}

// ── PdfDocument: image operations ─────────────────────────────────────────────

/// Image inspection and recompression for PdfDocument.
impl PdfDocument {
    /// Images drawn on `page`, each with its placement rectangles, in order
    /// of first appearance in the content stream.
    pub fn image_references(&self, page: &PageHandle) -> Result<Vec<ImageReference>> {
        let page_id = self.resolve_page(page)?;
        let document = &self.state()?.document;
        Ok(PlacementScanner::new(document)
            .scan_page(page_id)
            .into_iter()
            .map(|(object_id, placements)| ImageReference { object_id, placements })
            .collect())
    }

    /// Every image XObject reachable from the document, ordered by object
    /// id, with its reference count over all pages.
    pub fn images(&self) -> Result<Vec<ImageObject>> {
        let state = self.state()?;
        let document = &state.document;

        let mut counts: BTreeMap<ObjectId, usize> = BTreeMap::new();
        for page_id in state.page_ids() {
            for (id, rects) in PlacementScanner::new(document).scan_page(page_id) {
                *counts.entry(id).or_default() += rects.len();
            }
        }

        let reachable = pdf_utils::reachable_objects(document);
        let inventory = document
            .objects
            .iter()
            .filter(|(id, _)| reachable.contains(*id))
            .filter_map(|(id, object)| {
                let stream = object.as_stream().ok()?;
                let dict = &stream.dict;
                pdf_utils::is_image(dict).then(|| ImageObject {
                    object_id: *id,
                    width: pdf_utils::integer_from_dict(dict, b"Width").unwrap_or(0),
                    height: pdf_utils::integer_from_dict(dict, b"Height").unwrap_or(0),
                    color_space: color_space_label(dict),
                    bits_per_component: pdf_utils::integer_from_dict(dict, b"BitsPerComponent"),
                    filter: pdf_utils::filter_names(dict).into_iter().next(),
                    encoded_len: stream.content.len(),
                    reference_count: counts.get(id).copied().unwrap_or(0),
                })
            })
            .collect();
        Ok(inventory)
    }

    /// Image streams still held in the object pool that nothing reachable
    /// refers to any more. They are dropped by the next full-rewrite save.
    pub fn reclaimable_images(&self) -> Result<Vec<ObjectId>> {
        let document = &self.state()?.document;
        let reachable = pdf_utils::reachable_objects(document);
        Ok(document
            .objects
            .iter()
            .filter(|(id, _)| !reachable.contains(*id))
            .filter(|(_, object)| {
                object
                    .as_stream()
                    .map(|stream| pdf_utils::is_image(&stream.dict))
                    .unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .collect())
    }

    /// Re-encode one image as JPEG at `tier` and point every placement of
    /// it at the new stream.
    ///
    /// Alpha channels and palettes are flattened to opaque RGB. The new
    /// stream is only used when it is smaller than the old one; otherwise
    /// nothing changes and `Ok(0)` is returned. The old object stays in the
    /// pool, unreferenced, until a full-rewrite save. Returns the number of
    /// encoded bytes saved.
    pub fn recompress_image(&mut self, object_id: ObjectId, tier: QualityTier) -> Result<u64> {
        let state = self.state_mut()?;
        let stream = pdf_utils::image_stream(&state.document, object_id).ok_or(PdfError::NotAnImage(object_id))?;
        let original_len = stream.content.len();

        let pixels = transcode::decode_image(&state.document, object_id, stream)?;
        let replacement = transcode::encode_jpeg_stream(&pixels, tier.jpeg_quality(), Some(object_id))?;
        let new_len = replacement.content.len();
        if new_len >= original_len {
            log::debug!(
                "image {} {} R: {tier} encoding is {new_len} bytes, keeping the {original_len} byte original",
                object_id.0,
                object_id.1
            );
            return Ok(0);
        }

        let new_id = state.add_object(replacement);
        let swapped = state.substitute_xobject(object_id, new_id);
        if swapped == 0 {
            state.document.objects.remove(&new_id);
            state.dirty.remove(&new_id);
            log::debug!("image {} {} R has no resource entries, left as is", object_id.0, object_id.1);
            return Ok(0);
        }

        let saved = (original_len - new_len) as u64;
        log::debug!(
            "image {} {} R -> {} {} R: {original_len} -> {new_len} bytes ({swapped} resource entries)",
            object_id.0,
            object_id.1,
            new_id.0,
            new_id.1
        );
        Ok(saved)
    }

    /// Recompress every placed image at `tier`.
    ///
    /// An image that cannot be decoded or re-encoded is left untouched and
    /// recorded in [`RecompressionReport::skipped`]; only structural errors
    /// (closed document, broken page tree) fail the call.
    pub fn recompress_images(&mut self, tier: QualityTier) -> Result<RecompressionReport> {
        let candidates: Vec<ObjectId> = self
            .images()?
            .into_iter()
            .filter(|image| image.reference_count > 0)
            .map(|image| image.object_id)
            .collect();

        let mut report = RecompressionReport::default();
        for object_id in candidates {
            report.attempted += 1;
            match self.recompress_image(object_id, tier) {
                Ok(0) => report.unchanged += 1,
                Ok(saved) => {
                    report.recompressed += 1;
                    report.bytes_saved += saved;
                }
                Err(err) if err.kind() == ErrorKind::Encoding => {
                    log::warn!("skipping image: {err}");
                    report.skipped.push((object_id, err));
                }
                Err(err) => return Err(err),
            }
        }

        if report.all_failed() {
            log::warn!("none of the {} image(s) could be recompressed", report.attempted);
        }
        log::info!(
            "recompressed {} of {} image(s) at {tier}, {} bytes saved, {} skipped",
            report.recompressed,
            report.attempted,
            report.bytes_saved,
            report.skipped.len()
        );
        Ok(report)
    }

    // ── Insertion and removal ─────────────────────────────────────────────────

    /// Draw an image (PNG, JPEG, or any format the `image` crate reads) on
    /// top of the page's existing content, scaled into `rect`.
    ///
    /// Transparent sources keep their alpha as a soft mask, which is what a
    /// scanned signature needs. Returns the id of the new image object.
    pub fn insert_image(&mut self, page: &PageHandle, rect: Rect, image_bytes: &[u8]) -> Result<ObjectId> {
        let page_id = self.resolve_page(page)?;
        let (mut image, soft_mask) = transcode::embed_image_bytes(image_bytes)?;
        let state = self.state_mut()?;

        let mut resources = page_resources(&state.document, page_id);
        let mut xobjects = xobject_map(&state.document, &resources);
        let mut n = xobjects.len() + 1;
        let name = loop {
            let candidate = format!("Im{n}");
            if !xobjects.has(candidate.as_bytes()) {
                break candidate;
            }
            n += 1;
        };
        if let Some(mask) = soft_mask {
            let mask_id = state.add_object(mask);
            image.dict.set("SMask", Object::Reference(mask_id));
        }
        let image_id = state.add_object(image);
        xobjects.set(name.as_bytes().to_vec(), Object::Reference(image_id));
        resources.set("XObject", Object::Dictionary(xobjects));

        let operations = vec![
            Operation::new("q", vec![]),
            Operation::new("cm", Matrix::for_rect(&rect).to_operands()),
            Operation::new("Do", vec![Object::Name(name.clone().into_bytes())]),
            Operation::new("Q", vec![]),
        ];
        overlay_page(state, page_id, resources, operations)?;

        log::info!(
            "placed image {} {} R as /{name} on page {} at [{} {} {} {}]",
            image_id.0,
            image_id.1,
            page.index(),
            rect.x0,
            rect.y0,
            rect.x1,
            rect.y1
        );
        Ok(image_id)
    }

    /// Stop drawing an image on `page`: every `Do` of it in the page's own
    /// content goes away, along with its entries in the page's `/XObject`
    /// resources.
    ///
    /// The image object stays in the pool (other pages may still use it).
    /// Returns the number of placements removed.
    pub fn remove_image(&mut self, page: &PageHandle, object_id: ObjectId) -> Result<usize> {
        let page_id = self.resolve_page(page)?;
        let state = self.state_mut()?;
        if pdf_utils::image_stream(&state.document, object_id).is_none() {
            return Err(PdfError::NotAnImage(object_id));
        }

        let mut resources = page_resources(&state.document, page_id);
        let mut xobjects = xobject_map(&state.document, &resources);
        let names: Vec<Vec<u8>> = xobjects
            .iter()
            .filter(|(_, value)| matches!(value, Object::Reference(id) if *id == object_id))
            .map(|(name, _)| name.clone())
            .collect();
        if names.is_empty() {
            return Ok(0);
        }

        let bytes = state.document.get_page_content(page_id)?;
        let mut content = Content::decode(&bytes)?;
        let before = content.operations.len();
        content.operations.retain(|op| {
            let painted = op.operator == "Do"
                && op
                    .operands
                    .first()
                    .and_then(|o| o.as_name().ok())
                    .map(|name| names.iter().any(|n| n.as_slice() == name))
                    .unwrap_or(false);
            !painted
        });
        let removed = before - content.operations.len();
        let encoded = content.encode()?;

        for name in &names {
            xobjects.remove(name);
        }
        resources.set("XObject", Object::Dictionary(xobjects));

        let stream_id = state.add_object(Stream::new(Dictionary::new(), encoded));
        let page_dict = state.document.get_dictionary_mut(page_id)?;
        page_dict.set("Resources", Object::Dictionary(resources));
        page_dict.set("Contents", Object::Reference(stream_id));
        state.mark_dirty(page_id);

        log::info!(
            "removed {removed} placement(s) of image {} {} R from page {}",
            object_id.0,
            object_id.1,
            page.index()
        );
        Ok(removed)
    }
}
