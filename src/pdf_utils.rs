//! Shared PDF object helpers used across multiple modules.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeSet;

/// Attributes a page may inherit from its ancestors in the page tree
/// (ISO 32000-1, table 30).
pub(crate) const INHERITABLE_PAGE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Extract a name value from a PDF dictionary for a given key.
///
/// Returns `Some(String)` if the key exists and holds a name, `None`
/// otherwise.
pub(crate) fn name_from_dict(dict: &Dictionary, key: &[u8]) -> Option<String> {
    dict.get(key)
        .ok()
        .and_then(|v| v.as_name().ok())
        .map(|s| String::from_utf8_lossy(s).into_owned())
}

/// Read an integer entry, accepting reals that carry an integral value.
pub(crate) fn integer_from_dict(dict: &Dictionary, key: &[u8]) -> Option<i64> {
    match dict.get(key).ok()? {
        Object::Integer(n) => Some(*n),
        Object::Real(r) => Some(*r as i64),
        _ => None,
    }
}

/// Resolve a value that might be inline or a reference to a dictionary.
pub(crate) fn resolve_dict<'a>(document: &'a Document, value: &'a Object) -> Option<&'a Dictionary> {
    match value {
        Object::Reference(id) => document.get_object(*id).ok().and_then(|o| o.as_dict().ok()),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Resolve a value that might be inline or a reference, following at most
/// one level of indirection.
pub(crate) fn resolve<'a>(document: &'a Document, value: &'a Object) -> &'a Object {
    match value {
        Object::Reference(id) => document.get_object(*id).unwrap_or(value),
        other => other,
    }
}

/// Returns `true` when `dict` has `/Type` equal to `type_name`.
pub(crate) fn has_type(dict: &Dictionary, type_name: &[u8]) -> bool {
    dict.get(b"Type")
        .and_then(Object::as_name)
        .map(|name| name == type_name)
        .unwrap_or(false)
}

/// Returns the stream behind `id` when it is an image XObject.
pub(crate) fn image_stream(document: &Document, id: ObjectId) -> Option<&Stream> {
    let stream = document.get_object(id).ok()?.as_stream().ok()?;
    is_image(&stream.dict).then_some(stream)
}

/// Returns `true` when the stream dictionary declares `/Subtype /Image`.
pub(crate) fn is_image(dict: &Dictionary) -> bool {
    name_from_dict(dict, b"Subtype").as_deref() == Some("Image")
}

/// The stream's filter chain, outermost first. A single `/Filter` name is
/// returned as a one-element list.
pub(crate) fn filter_names(dict: &Dictionary) -> Vec<String> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![String::from_utf8_lossy(name).into_owned()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().ok())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect(),
        _ => Vec::new(),
    }
}

/// Content of a stream with its filters removed, falling back to the raw
/// bytes when the stream is unfiltered or cannot be decoded.
pub(crate) fn decoded_content(stream: &Stream) -> Vec<u8> {
    if filter_names(&stream.dict).is_empty() {
        return stream.content.clone();
    }
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

/// Push every indirect reference contained in `object` onto `out`.
pub(crate) fn collect_references(object: &Object, out: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => out.push(*id),
        Object::Array(items) => items.iter().for_each(|item| collect_references(item, out)),
        Object::Dictionary(dict) => dict.iter().for_each(|(_, v)| collect_references(v, out)),
        Object::Stream(stream) => stream
            .dict
            .iter()
            .for_each(|(_, v)| collect_references(v, out)),
        _ => {}
    }
}

/// Every object id reachable from the trailer (catalog, info dictionary, and
/// everything they transitively reference).
pub(crate) fn reachable_objects(document: &Document) -> BTreeSet<ObjectId> {
    let mut pending = Vec::new();
    for (_, value) in document.trailer.iter() {
        collect_references(value, &mut pending);
    }

    let mut reachable = BTreeSet::new();
    while let Some(id) = pending.pop() {
        if !reachable.insert(id) {
            continue;
        }
        if let Ok(object) = document.get_object(id) {
            collect_references(object, &mut pending);
        }
    }
    reachable
}
