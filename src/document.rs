use crate::{PdfError, Result};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_DOCUMENT_TOKEN: AtomicU64 = AtomicU64::new(1);

// ── PageHandle ────────────────────────────────────────────────────────────────

/// A page of a specific [`PdfDocument`], addressed by its 0-based position.
///
/// Handles are cheap values. Every call that receives one checks that the
/// owning document is still open and that the position is still in range, so
/// a handle taken before a `delete_page` may now name a different page (or
/// none at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageHandle {
    document: u64,
    index: usize,
}

impl PageHandle {
    /// The 0-based page position this handle was created for.
    pub fn index(&self) -> usize {
        self.index
    }
}

// ── Internal state ───────────────────────────────────────────────────────────

/// The file a document was loaded from, kept for incremental updates.
pub(crate) struct Origin {
    pub(crate) path: Option<PathBuf>,
    pub(crate) bytes: Vec<u8>,
    /// The parse of `bytes`, untouched by edits. Its xref offset becomes
    /// `/Prev` of the next incremental section.
    pub(crate) base: Document,
}

/// Everything a live document owns. Dropped as a whole on `close`.
pub(crate) struct OpenState {
    pub(crate) document: Document,
    pub(crate) origin: Option<Origin>,
    /// Objects created or modified since the last save.
    pub(crate) dirty: BTreeSet<ObjectId>,
}

impl OpenState {
    pub(crate) fn mark_dirty(&mut self, id: ObjectId) {
        self.dirty.insert(id);
    }

    pub(crate) fn add_object<T: Into<Object>>(&mut self, object: T) -> ObjectId {
        let id = self.document.add_object(object);
        self.dirty.insert(id);
        id
    }

    /// Page object ids in document order.
    pub(crate) fn page_ids(&self) -> Vec<ObjectId> {
        self.document.get_pages().into_values().collect()
    }

    pub(crate) fn page_id(&self, index: usize) -> Result<ObjectId> {
        let pages = self.page_ids();
        pages.get(index).copied().ok_or(PdfError::PageIndex {
            index,
            page_count: pages.len(),
        })
    }
}

// ── PdfDocument ───────────────────────────────────────────────────────────────

/// An open PDF document: an arena of indirect objects plus its page tree.
///
/// # Creating a document
///
/// ```no_run
/// use pdftoolbox::PdfDocument;
///
/// // From a file path
/// let a = PdfDocument::open("invoice.pdf").unwrap();
///
/// // From an in-memory buffer
/// let bytes = std::fs::read("invoice.pdf").unwrap();
/// let b = PdfDocument::from_bytes(&bytes).unwrap();
///
/// // Empty, ready to receive pages
/// let c = PdfDocument::new();
/// ```
///
/// All methods take the document by reference; mutating ones need
/// `&mut self`, so one handle never sees two concurrent edits. After
/// [`close`](PdfDocument::close) every call fails with
/// [`PdfError::UseAfterClose`].
pub struct PdfDocument {
    token: u64,
    state: Option<OpenState>,
}

impl PdfDocument {
    // ── Constructors ──────────────────────────────────────────────────────────

    /// Load a PDF from the file system.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let document = Self::parse(&bytes)?;
        log::debug!(
            "opened {} ({} bytes, {} objects)",
            path.display(),
            bytes.len(),
            document.objects.len()
        );
        Ok(Self::with_state(OpenState {
            origin: Some(Origin {
                path: Some(path.to_path_buf()),
                bytes,
                base: document.clone(),
            }),
            document,
            dirty: BTreeSet::new(),
        }))
    }

    /// Load a PDF from an in-memory byte slice.
    ///
    /// The document has no source path, so it can only be written with
    /// [`save_as`](PdfDocument::save_as).
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Self::parse(data)?;
        Ok(Self::with_state(OpenState {
            origin: Some(Origin {
                path: None,
                bytes: data.to_vec(),
                base: document.clone(),
            }),
            document,
            dirty: BTreeSet::new(),
        }))
    }

    /// Create an empty document with a catalog and an empty page tree.
    pub fn new() -> Self {
        let mut document = Document::with_version("1.7");
        let pages_id = document.new_object_id();
        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(Vec::new())),
            ("Count", Object::Integer(0)),
        ]);
        document.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        let catalog_id = document.add_object(catalog);
        document.trailer.set("Root", Object::Reference(catalog_id));

        let dirty = document.objects.keys().copied().collect();
        Self::with_state(OpenState {
            document,
            origin: None,
            dirty,
        })
    }

    fn with_state(state: OpenState) -> Self {
        Self {
            token: NEXT_DOCUMENT_TOKEN.fetch_add(1, Ordering::Relaxed),
            state: Some(state),
        }
    }

    /// Parse bytes and check the catalog → page tree path lopdf needs for
    /// every later operation.
    pub(crate) fn parse(bytes: &[u8]) -> Result<Document> {
        let document = Document::load_mem(bytes)?;

        let catalog = document
            .catalog()
            .map_err(|e| PdfError::InvalidPdf(format!("missing or invalid catalog: {e}")))?;
        let pages_id = catalog
            .get(b"Pages")
            .and_then(Object::as_reference)
            .map_err(|_| PdfError::InvalidPdf("catalog has no /Pages reference".into()))?;
        document
            .get_dictionary(pages_id)
            .map_err(|_| PdfError::InvalidPdf("/Pages is not a dictionary".into()))?;

        Ok(document)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Release the object graph and the retained source bytes.
    ///
    /// Closing twice is harmless. Every other call on a closed document, or
    /// with a [`PageHandle`] taken from it, fails with
    /// [`PdfError::UseAfterClose`].
    pub fn close(&mut self) {
        if self.state.take().is_some() {
            log::debug!("closed document #{}", self.token);
        }
    }

    /// Returns `true` once [`close`](PdfDocument::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.is_none()
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    /// Number of pages in the document.
    pub fn page_count(&self) -> Result<usize> {
        Ok(self.state()?.document.get_pages().len())
    }

    /// A handle for the page at `index` (0-based).
    pub fn page(&self, index: usize) -> Result<PageHandle> {
        let page_count = self.page_count()?;
        if index >= page_count {
            return Err(PdfError::PageIndex { index, page_count });
        }
        Ok(PageHandle {
            document: self.token,
            index,
        })
    }

    /// Handles for every page, in order.
    pub fn pages(&self) -> Result<Vec<PageHandle>> {
        let page_count = self.page_count()?;
        Ok((0..page_count)
            .map(|index| PageHandle {
                document: self.token,
                index,
            })
            .collect())
    }

    /// The path the document was opened from or last saved to.
    pub fn source_path(&self) -> Result<Option<&Path>> {
        Ok(self
            .state()?
            .origin
            .as_ref()
            .and_then(|origin| origin.path.as_deref()))
    }

    /// Size in bytes of the source file on disk, or 0 when there is none.
    pub fn file_size(&self) -> Result<u64> {
        match self.source_path()? {
            Some(path) if path.exists() => Ok(std::fs::metadata(path)?.len()),
            _ => Ok(0),
        }
    }

    /// Returns `true` when the document has unsaved changes.
    pub fn is_modified(&self) -> Result<bool> {
        Ok(!self.state()?.dirty.is_empty())
    }

    /// Returns a reference to the underlying [`lopdf::Document`].
    pub fn document(&self) -> Result<&Document> {
        Ok(&self.state()?.document)
    }

    // ── Crate-internal plumbing ──────────────────────────────────────────────

    pub(crate) fn state(&self) -> Result<&OpenState> {
        self.state.as_ref().ok_or(PdfError::UseAfterClose)
    }

    pub(crate) fn state_mut(&mut self) -> Result<&mut OpenState> {
        self.state.as_mut().ok_or(PdfError::UseAfterClose)
    }

    /// Check a handle against this document and return the page object id it
    /// currently designates.
    pub(crate) fn resolve_page(&self, page: &PageHandle) -> Result<ObjectId> {
        let state = self.state()?;
        if page.document != self.token {
            return Err(PdfError::ForeignPage);
        }
        state.page_id(page.index)
    }
}

impl Default for PdfDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("PdfDocument");
        out.field("token", &self.token);
        match &self.state {
            Some(state) => out
                .field("objects", &state.document.objects.len())
                .field("dirty", &state.dirty.len())
                .field(
                    "path",
                    &state.origin.as_ref().and_then(|o| o.path.as_deref()),
                ),
            None => out.field("closed", &true),
        };
        out.finish()
    }
}
