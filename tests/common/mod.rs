// Fixture PDFs built in-process with lopdf, so no binary files are checked in.

#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use pdftoolbox::PdfDocument;
use std::path::{Path, PathBuf};

/// Builds a small PDF page by page.
pub struct Fixture {
    doc: Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    kids: Vec<ObjectId>,
}

impl Fixture {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ]));
        Self {
            doc,
            pages_id,
            font_id,
            kids: Vec::new(),
        }
    }

    /// A 64x64 uncompressed DeviceRGB gradient.
    pub fn gradient_image(&mut self) -> ObjectId {
        let mut samples = Vec::with_capacity(64 * 64 * 3);
        for y in 0..64u32 {
            for x in 0..64u32 {
                samples.extend_from_slice(&[(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8]);
            }
        }
        let dict = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(64)),
            ("Height", Object::Integer(64)),
            ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
            ("BitsPerComponent", Object::Integer(8)),
        ]);
        let mut stream = Stream::new(dict, samples);
        stream.allows_compression = false;
        self.doc.add_object(stream)
    }

    /// A stream that claims to be a JPEG but is not.
    pub fn broken_jpeg(&mut self) -> ObjectId {
        let dict = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(32)),
            ("Height", Object::Integer(32)),
            ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
            ("BitsPerComponent", Object::Integer(8)),
            ("Filter", Object::Name(b"DCTDecode".to_vec())),
        ]);
        let mut stream = Stream::new(dict, b"definitely not a jpeg".to_vec());
        stream.allows_compression = false;
        self.doc.add_object(stream)
    }

    /// Add a page showing `label`, rotated by `rotate` degrees, drawing each
    /// image at `[50 60 250 160]`.
    pub fn page(&mut self, label: &str, rotate: i64, images: &[ObjectId]) -> &mut Self {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
            Operation::new("Td", vec![Object::Integer(72), Object::Integer(720)]),
            Operation::new(
                "Tj",
                vec![Object::String(label.as_bytes().to_vec(), lopdf::StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ];
        let mut xobjects = Dictionary::new();
        for (i, image) in images.iter().enumerate() {
            let name = format!("Im{}", i + 1);
            xobjects.set(name.as_bytes().to_vec(), Object::Reference(*image));
            operations.extend([
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    [200, 0, 0, 100, 50, 60].iter().map(|v| Object::Integer(*v)).collect(),
                ),
                Operation::new("Do", vec![Object::Name(name.into_bytes())]),
                Operation::new("Q", vec![]),
            ]);
        }
        let content = Content { operations }.encode().unwrap();
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), content));

        let resources = Dictionary::from_iter(vec![
            (
                "Font",
                Object::Dictionary(Dictionary::from_iter(vec![("F1", Object::Reference(self.font_id))])),
            ),
            ("XObject", Object::Dictionary(xobjects)),
        ]);
        let mut page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(self.pages_id)),
            (
                "MediaBox",
                Object::Array([0, 0, 612, 792].iter().map(|v| Object::Integer(*v)).collect()),
            ),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Dictionary(resources)),
        ]);
        if rotate != 0 {
            page.set("Rotate", Object::Integer(rotate));
        }
        let page_id = self.doc.add_object(page);
        self.kids.push(page_id);
        self
    }

    /// A 64x64 DeviceRGB image already stored as a low-quality JPEG.
    pub fn jpeg_image(&mut self) -> ObjectId {
        let pixels = image::RgbImage::from_fn(64, 64, |x, y| image::Rgb([(x * 4) as u8, (y * 4) as u8, 128]));
        let mut encoded = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, 20)
            .encode_image(&pixels)
            .unwrap();
        let dict = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(64)),
            ("Height", Object::Integer(64)),
            ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
            ("BitsPerComponent", Object::Integer(8)),
            ("Filter", Object::Name(b"DCTDecode".to_vec())),
        ]);
        let mut stream = Stream::new(dict, encoded);
        stream.allows_compression = false;
        self.doc.add_object(stream)
    }

    /// Like [`Fixture::finish`], but with deflated content and the
    /// dictionaries packed into object streams behind an xref stream.
    pub fn finish_packed(&mut self) -> Vec<u8> {
        self.close_tree();
        self.doc.compress();
        let mut bytes = Vec::new();
        self.doc.save_modern(&mut bytes).unwrap();
        bytes
    }

    pub fn finish(&mut self) -> Vec<u8> {
        self.close_tree();
        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn close_tree(&mut self) {
        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            (
                "Kids",
                Object::Array(self.kids.iter().map(|id| Object::Reference(*id)).collect()),
            ),
            ("Count", Object::Integer(self.kids.len() as i64)),
        ]);
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));
        let catalog_id = self.doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(self.pages_id)),
        ]));
        self.doc.trailer.set("Root", Object::Reference(catalog_id));
    }
}

/// Plain labelled pages, no images.
pub fn labelled_pdf(labels: &[&str]) -> Vec<u8> {
    let mut fixture = Fixture::new();
    for label in labels {
        fixture.page(label, 0, &[]);
    }
    fixture.finish()
}

pub fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// The label shown on each page, in page order.
pub fn labels(doc: &PdfDocument) -> Vec<String> {
    let document = doc.document().unwrap();
    document
        .get_pages()
        .values()
        .map(|page_id| {
            let content = Content::decode(&document.get_page_content(*page_id).unwrap()).unwrap();
            content
                .operations
                .iter()
                .find(|op| op.operator == "Tj")
                .and_then(|op| op.operands.first())
                .and_then(|operand| operand.as_str().ok())
                .map(|text| String::from_utf8_lossy(text).into_owned())
                .unwrap_or_default()
        })
        .collect()
}

pub fn labels_of(path: &Path) -> Vec<String> {
    let mut doc = PdfDocument::open(path).unwrap();
    let labels = labels(&doc);
    doc.close();
    labels
}
