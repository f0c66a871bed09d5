use crate::{PdfDocument, PdfError, Result, SaveOptions};
use std::path::{Path, PathBuf};

/// Concatenate the pages of `paths`, in the order given, into a new
/// in-memory document.
///
/// Each source is opened, copied and closed before the next one is read.
/// Any source that fails to open aborts the whole merge and nothing is
/// returned. Returns the document and its total page count.
pub fn merge<P: AsRef<Path>>(paths: &[P]) -> Result<(PdfDocument, usize)> {
    if paths.len() < 2 {
        return Err(PdfError::InsufficientInput { given: paths.len() });
    }

    let mut output = PdfDocument::new();
    let mut total = 0;
    for path in paths {
        total += output.insert_pages_from(path.as_ref(), None)?;
    }

    log::info!("merged {} document(s), {total} page(s)", paths.len());
    Ok((output, total))
}

// ── MergeQueue ────────────────────────────────────────────────────────────────

/// An ordered list of files waiting to be merged.
///
/// The order of the queue is the page order of the result, so callers
/// reorder entries here before calling [`merge_into`](MergeQueue::merge_into).
#[derive(Debug, Clone, Default)]
pub struct MergeQueue {
    paths: Vec<PathBuf>,
}

impl MergeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<P: Into<PathBuf>>(&mut self, path: P) {
        self.paths.push(path.into());
    }

    /// Remove and return the entry at `index`, if there is one.
    pub fn remove(&mut self, index: usize) -> Option<PathBuf> {
        (index < self.paths.len()).then(|| self.paths.remove(index))
    }

    /// Move the entry at `from` to position `to`. Out-of-range indices
    /// leave the queue unchanged.
    pub fn move_entry(&mut self, from: usize, to: usize) {
        let len = self.paths.len();
        if from >= len || to >= len || from == to {
            return;
        }
        let entry = self.paths.remove(from);
        self.paths.insert(to, entry);
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Merge the queued files and write the result to `output` as a
    /// garbage-collected full rewrite. Returns the total page count.
    pub fn merge_into<P: AsRef<Path>>(&self, output: P) -> Result<usize> {
        let (mut document, total) = merge(self.paths.as_slice())?;
        let saved = document.save_as(output.as_ref(), &SaveOptions { garbage_collect: true });
        document.close();
        saved?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(names: &[&str]) -> MergeQueue {
        let mut queue = MergeQueue::new();
        for name in names {
            queue.push(*name);
        }
        queue
    }

    #[test]
    fn move_entry_reorders() {
        let mut q = queue(&["a.pdf", "b.pdf", "c.pdf"]);
        q.move_entry(2, 0);
        assert_eq!(
            q.paths(),
            &[PathBuf::from("c.pdf"), PathBuf::from("a.pdf"), PathBuf::from("b.pdf")]
        );
    }

    #[test]
    fn out_of_range_edits_are_ignored() {
        let mut q = queue(&["a.pdf", "b.pdf"]);
        q.move_entry(0, 5);
        assert_eq!(q.remove(7), None);
        assert_eq!(q.len(), 2);
        assert_eq!(q.remove(0), Some(PathBuf::from("a.pdf")));
        assert_eq!(q.paths(), &[PathBuf::from("b.pdf")]);
    }

    #[test]
    fn fewer_than_two_sources_is_rejected() {
        let err = merge(&["only.pdf"]).unwrap_err();
        assert!(matches!(err, PdfError::InsufficientInput { given: 1 }));
        assert!(queue(&[]).merge_into("out.pdf").is_err());
    }
}
