use crate::page_tree;
use crate::pdf_utils;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::{BTreeSet, HashMap};

/// Copies pages and everything they reference from one document's arena into
/// another's, assigning fresh ids in the target.
///
/// References to page tree nodes that are not part of the copy (a link
/// annotation's `/P` or a `/Dest` pointing at an uncopied page) are replaced
/// by `null`; following them would drag the whole source page tree along.
pub(crate) struct ObjectCopier<'a> {
    source: &'a Document,
    target: &'a mut Document,
    /// source id → target id, for everything copied or scheduled so far.
    remap: HashMap<ObjectId, ObjectId>,
    /// Source objects whose target id is allocated but whose body has not
    /// been written yet.
    pending: Vec<ObjectId>,
}

impl<'a> ObjectCopier<'a> {
    pub(crate) fn new(source: &'a Document, target: &'a mut Document) -> Self {
        Self {
            source,
            target,
            remap: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// Copy the given source pages and return their ids in the target, in
    /// the same order.
    ///
    /// Each copy carries its inherited attributes explicitly and has no
    /// `/Parent`; the caller links it into a page tree.
    pub(crate) fn copy_pages(&mut self, pages: &[ObjectId]) -> Vec<ObjectId> {
        // Allocate page ids up front so pages that point at each other
        // (annotations, destinations) resolve to the copies.
        let targets: Vec<ObjectId> = pages
            .iter()
            .map(|page_id| {
                let new_id = self.target.new_object_id();
                self.remap.insert(*page_id, new_id);
                new_id
            })
            .collect();

        let source = self.source;
        for (page_id, new_id) in pages.iter().zip(&targets) {
            let mut dict = source
                .get_dictionary(*page_id)
                .cloned()
                .unwrap_or_else(|_| Dictionary::new());
            for (key, value) in page_tree::missing_inherited(source, *page_id) {
                dict.set(key, value);
            }
            dict.remove(b"Parent");
            dict.set("Type", Object::Name(b"Page".to_vec()));

            let copied = self.copy_dictionary(&dict);
            self.target.objects.insert(*new_id, Object::Dictionary(copied));
        }

        self.drain();
        targets
    }

    /// Ids of every object this copier wrote into the target.
    pub(crate) fn created_ids(&self) -> BTreeSet<ObjectId> {
        self.remap.values().copied().collect()
    }

    fn drain(&mut self) {
        let source = self.source;
        while let Some(source_id) = self.pending.pop() {
            let Some(&target_id) = self.remap.get(&source_id) else {
                continue;
            };
            let copied = match source.get_object(source_id) {
                Ok(object) => self.copy_object(object),
                Err(_) => Object::Null,
            };
            self.target.objects.insert(target_id, copied);
        }
    }

    fn copy_object(&mut self, object: &Object) -> Object {
        match object {
            Object::Reference(id) => self.map_reference(*id),
            Object::Array(items) => Object::Array(items.iter().map(|item| self.copy_object(item)).collect()),
            Object::Dictionary(dict) => Object::Dictionary(self.copy_dictionary(dict)),
            Object::Stream(stream) => {
                let mut copy = Stream::new(self.copy_dictionary(&stream.dict), stream.content.clone());
                copy.allows_compression = stream.allows_compression;
                Object::Stream(copy)
            }
            other => other.clone(),
        }
    }

    fn copy_dictionary(&mut self, dict: &Dictionary) -> Dictionary {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            copy.set(key.clone(), self.copy_object(value));
        }
        copy
    }

    /// Target reference for a source reference, scheduling the object for
    /// copying on first sight.
    fn map_reference(&mut self, source_id: ObjectId) -> Object {
        if let Some(target_id) = self.remap.get(&source_id) {
            return Object::Reference(*target_id);
        }

        let source = self.source;
        let Ok(object) = source.get_object(source_id) else {
            return Object::Null;
        };
        if let Object::Dictionary(dict) = object {
            if pdf_utils::has_type(dict, b"Page") || pdf_utils::has_type(dict, b"Pages") {
                return Object::Null;
            }
        }

        let target_id = self.target.new_object_id();
        self.remap.insert(source_id, target_id);
        self.pending.push(source_id);
        Object::Reference(target_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_page_source() -> (Document, Vec<ObjectId>) {
        let mut doc = Document::with_version("1.7");
        let root = doc.new_object_id();
        let shared = doc.add_object(Stream::new(Dictionary::new(), b"shared".to_vec()));
        let mut pages = Vec::new();
        for _ in 0..2 {
            pages.push(doc.add_object(Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(root)),
                ("Contents", Object::Reference(shared)),
            ])));
        }
        doc.objects.insert(
            root,
            Object::Dictionary(Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Pages".to_vec())),
                (
                    "Kids",
                    Object::Array(pages.iter().map(|id| Object::Reference(*id)).collect()),
                ),
                ("Count", Object::Integer(2)),
            ])),
        );
        (doc, pages)
    }

    #[test]
    fn copies_never_alias_target_ids() {
        let (source, pages) = two_page_source();
        let mut target = Document::with_version("1.7");
        let existing = target.add_object(Object::Integer(7));

        let mut copier = ObjectCopier::new(&source, &mut target);
        let copied = copier.copy_pages(&pages);
        let created = copier.created_ids();

        assert_eq!(copied.len(), 2);
        assert!(!created.contains(&existing));
        // two pages plus one shared content stream, copied once
        assert_eq!(created.len(), 3);
        assert!(target.get_dictionary(copied[0]).unwrap().get(b"Parent").is_err());
    }
}
