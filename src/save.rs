use crate::document::{OpenState, Origin};
use crate::pdf_utils;
use crate::{PdfDocument, PdfError, Result, SaveOptions};
use lopdf::{Document, IncrementalDocument};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Trailer keys that belong to the previous cross-reference section and must
/// not be repeated in a new one.
const XREF_TRAILER_KEYS: [&[u8]; 8] = [
    b"Prev",
    b"XRefStm",
    b"Type",
    b"W",
    b"Index",
    b"Length",
    b"Filter",
    b"DecodeParms",
];

/// How a document was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStrategy {
    /// Changed objects appended after the original bytes, with a new
    /// cross-reference section pointing back at the old one.
    Incremental,
    /// Only reachable objects, renumbered from 1 and deflated, in a fresh
    /// file.
    FullRewrite,
}

/// Result of a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub path: PathBuf,
    pub strategy: SaveStrategy,
    /// Size of the file at `path` after the save.
    pub bytes_written: u64,
}

// ── Strategy selection ───────────────────────────────────────────────────────

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Incremental only when writing back onto the file the document came from
/// and no collection was requested.
fn select_strategy(state: &OpenState, destination: &Path, options: &SaveOptions) -> SaveStrategy {
    if options.garbage_collect {
        return SaveStrategy::FullRewrite;
    }
    match state.origin.as_ref().and_then(|origin| origin.path.as_deref()) {
        Some(source) if same_file(source, destination) => SaveStrategy::Incremental,
        _ => SaveStrategy::FullRewrite,
    }
}

// ── Writers ──────────────────────────────────────────────────────────────────

/// The origin bytes followed by an update section holding every dirty
/// object.
fn incremental_bytes(state: &OpenState, origin: &Origin) -> Result<Vec<u8>> {
    let mut update = IncrementalDocument::create_from(origin.bytes.clone(), origin.base.clone());
    let section = &mut update.new_document;

    for id in &state.dirty {
        if let Some(object) = state.document.objects.get(id) {
            section.objects.insert(*id, object.clone());
        }
    }
    section.trailer = state.document.trailer.clone();
    for key in XREF_TRAILER_KEYS {
        section.trailer.remove(key);
    }
    section
        .trailer
        .set("Prev", lopdf::Object::Integer(origin.base.xref_start as i64));
    section.max_id = section.max_id.max(state.document.max_id);
    section
        .trailer
        .set("Size", lopdf::Object::Integer(i64::from(section.max_id) + 1));

    let mut bytes = Vec::with_capacity(origin.bytes.len() + 4096);
    update.save_to(&mut bytes)?;
    Ok(bytes)
}

/// A self-contained file with unreachable objects dropped, ids renumbered
/// contiguously and every compressible stream deflated.
///
/// Written both with a classic xref table and with object streams; the
/// smaller of the two is returned.
pub(crate) fn full_rewrite_bytes(document: &Document) -> Result<Vec<u8>> {
    let mut output = document.clone();
    let reachable = pdf_utils::reachable_objects(&output);
    let before = output.objects.len();
    output.objects.retain(|id, _| reachable.contains(id));
    let dropped = before - output.objects.len();

    output.renumber_objects();
    output.compress();
    for key in XREF_TRAILER_KEYS {
        output.trailer.remove(key);
    }
    output
        .trailer
        .set("Size", lopdf::Object::Integer(i64::from(output.max_id) + 1));

    let kept = output.objects.len();
    let mut bytes = Vec::new();
    output.clone().save_to(&mut bytes)?;

    // Sources that packed their dictionaries into object streams would grow
    // when written back loose, so the packed layout is tried as well.
    let mut packed = Vec::new();
    match output.save_modern(&mut packed) {
        Ok(()) if packed.len() < bytes.len() && Document::load_mem(&packed).is_ok() => {
            log::debug!("object streams: {} -> {} bytes", bytes.len(), packed.len());
            bytes = packed;
        }
        Ok(()) => {}
        Err(e) => log::warn!("object stream layout failed, keeping xref table: {e}"),
    }

    log::debug!(
        "full rewrite: {kept} objects kept, {dropped} unreachable dropped, {} bytes",
        bytes.len()
    );
    Ok(bytes)
}

/// Write through a temporary file in the destination directory so a failed
/// save never leaves a partial file behind.
pub(crate) fn write_atomically(destination: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(destination).map_err(|e| PdfError::Io(e.error))?;
    Ok(())
}

// ── PdfDocument: saving ───────────────────────────────────────────────────────

/// Saving for PdfDocument.
impl PdfDocument {
    /// Save back to the path the document was opened from (or last saved
    /// to).
    ///
    /// Appends an incremental update unless `options.garbage_collect` asks
    /// for a full rewrite. Fails with [`PdfError::NoSourcePath`] for
    /// documents built in memory.
    pub fn save(&mut self, options: &SaveOptions) -> Result<SaveOutcome> {
        let path = self.source_path()?.map(Path::to_path_buf).ok_or(PdfError::NoSourcePath)?;
        self.save_as(path, options)
    }

    /// Save to `path`, choosing the strategy:
    ///
    /// - same path as the source and no `garbage_collect` → incremental
    /// - anything else → full rewrite with garbage collection
    ///
    /// The source file is left untouched when `path` differs from it. The
    /// document stays open; after a full rewrite its object ids follow the
    /// new file and its source path becomes `path`.
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P, options: &SaveOptions) -> Result<SaveOutcome> {
        let destination = path.as_ref();
        let state = self.state_mut()?;
        let strategy = select_strategy(state, destination, options);

        match strategy {
            SaveStrategy::Incremental => {
                let Some(origin) = state.origin.as_ref() else {
                    return Err(PdfError::NoSourcePath);
                };
                if state.dirty.is_empty() {
                    log::debug!("{}: nothing changed, no update appended", destination.display());
                } else {
                    let bytes = incremental_bytes(state, origin)?;
                    write_atomically(destination, &bytes)?;
                    let base = Document::load_mem(&bytes)?;
                    log::info!(
                        "appended {} object(s) to {} ({} -> {} bytes)",
                        state.dirty.len(),
                        destination.display(),
                        origin.bytes.len(),
                        bytes.len()
                    );
                    state.origin = Some(Origin {
                        path: Some(destination.to_path_buf()),
                        bytes,
                        base,
                    });
                }
            }
            SaveStrategy::FullRewrite => {
                let bytes = full_rewrite_bytes(&state.document)?;
                write_atomically(destination, &bytes)?;
                let document = PdfDocument::parse(&bytes)?;
                log::info!("wrote {} ({} bytes, full rewrite)", destination.display(), bytes.len());
                state.origin = Some(Origin {
                    path: Some(destination.to_path_buf()),
                    bytes,
                    base: document.clone(),
                });
                state.document = document;
            }
        }
        state.dirty.clear();

        Ok(SaveOutcome {
            path: destination.to_path_buf(),
            strategy,
            bytes_written: fs::metadata(destination)?.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_forces_full_rewrite() {
        let state = OpenState {
            document: Document::with_version("1.7"),
            origin: Some(Origin {
                path: Some(PathBuf::from("a.pdf")),
                bytes: Vec::new(),
                base: Document::with_version("1.7"),
            }),
            dirty: Default::default(),
        };
        let same = Path::new("a.pdf");
        assert_eq!(select_strategy(&state, same, &SaveOptions::default()), SaveStrategy::Incremental);
        assert_eq!(
            select_strategy(&state, same, &SaveOptions { garbage_collect: true }),
            SaveStrategy::FullRewrite
        );
        assert_eq!(
            select_strategy(&state, Path::new("b.pdf"), &SaveOptions::default()),
            SaveStrategy::FullRewrite
        );
    }

    #[test]
    fn in_memory_documents_always_rewrite() {
        let state = OpenState {
            document: Document::with_version("1.7"),
            origin: None,
            dirty: Default::default(),
        };
        assert_eq!(
            select_strategy(&state, Path::new("a.pdf"), &SaveOptions::default()),
            SaveStrategy::FullRewrite
        );
    }
}
