//! Pixel-level work: decoding PDF image streams and producing replacement
//! streams.

use crate::pdf_utils;
use crate::{PdfError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Colour model of raw (non-JPEG) image samples.
#[derive(Debug, Clone)]
enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
    /// Palette of `base` colours, one entry per index value.
    Indexed { base: Box<ColorModel>, palette: Vec<u8> },
}

impl ColorModel {
    fn components(&self) -> usize {
        match self {
            ColorModel::Gray => 1,
            ColorModel::Rgb => 3,
            ColorModel::Cmyk => 4,
            ColorModel::Indexed { .. } => 1,
        }
    }

    fn resolve(document: &Document, value: &Object) -> std::result::Result<Self, String> {
        match pdf_utils::resolve(document, value) {
            Object::Name(name) => match name.as_slice() {
                b"DeviceGray" | b"CalGray" | b"G" => Ok(ColorModel::Gray),
                b"DeviceRGB" | b"CalRGB" | b"RGB" => Ok(ColorModel::Rgb),
                b"DeviceCMYK" | b"CMYK" => Ok(ColorModel::Cmyk),
                other => Err(format!("unsupported colour space /{}", String::from_utf8_lossy(other))),
            },
            Object::Array(items) => Self::resolve_array(document, items),
            _ => Err("colour space is neither a name nor an array".into()),
        }
    }

    fn resolve_array(document: &Document, items: &[Object]) -> std::result::Result<Self, String> {
        let family = items
            .first()
            .and_then(|o| o.as_name().ok())
            .ok_or("colour space array has no family name")?;

        match family {
            b"CalGray" => Ok(ColorModel::Gray),
            b"CalRGB" | b"Lab" => Ok(ColorModel::Rgb),
            b"ICCBased" => {
                let profile = items
                    .get(1)
                    .map(|o| pdf_utils::resolve(document, o))
                    .and_then(|o| o.as_stream().ok())
                    .ok_or("ICCBased colour space without a profile stream")?;
                match pdf_utils::integer_from_dict(&profile.dict, b"N") {
                    Some(1) => Ok(ColorModel::Gray),
                    Some(3) => Ok(ColorModel::Rgb),
                    Some(4) => Ok(ColorModel::Cmyk),
                    other => Err(format!("ICC profile with {other:?} components")),
                }
            }
            b"Indexed" | b"I" => {
                let base = items.get(1).ok_or("Indexed colour space without base")?;
                let base = Self::resolve(document, base)?;
                if matches!(base, ColorModel::Indexed { .. }) {
                    return Err("nested Indexed colour space".into());
                }
                let lookup = items.get(3).ok_or("Indexed colour space without lookup table")?;
                let palette = match pdf_utils::resolve(document, lookup) {
                    Object::String(bytes, _) => bytes.clone(),
                    Object::Stream(stream) => pdf_utils::decoded_content(stream),
                    _ => return Err("Indexed lookup is neither a string nor a stream".into()),
                };
                Ok(ColorModel::Indexed {
                    base: Box::new(base),
                    palette,
                })
            }
            other => Err(format!("unsupported colour space family /{}", String::from_utf8_lossy(other))),
        }
    }
}

/// Palette entry used for indices beyond the lookup table.
static MISSING_ENTRY: [u8; 4] = [0; 4];

/// Convert one CMYK sample to RGB (naive, no colour management).
fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> [u8; 3] {
    let k = 255 - k as u16;
    let channel = |v: u8| ((255 - v as u16) * k / 255) as u8;
    [channel(c), channel(m), channel(y)]
}

/// Decode an image XObject into pixels.
///
/// Soft masks and `/Decode` arrays are not applied: the result is the opaque
/// colour data, which is what a lossy re-encode keeps anyway.
pub(crate) fn decode_image(document: &Document, id: ObjectId, stream: &Stream) -> Result<DynamicImage> {
    let fail = |reason: String| PdfError::encoding(Some(id), reason);
    let dict = &stream.dict;

    if matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
        return Err(fail("stencil masks are not recompressed".into()));
    }

    let filters = pdf_utils::filter_names(dict);
    match filters.last().map(String::as_str) {
        Some("DCTDecode") | Some("DCT") if filters.len() == 1 => {
            return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
                .map_err(|e| fail(format!("JPEG decode failed: {e}")));
        }
        Some(other @ ("DCTDecode" | "DCT" | "JPXDecode" | "JBIG2Decode" | "CCITTFaxDecode")) => {
            return Err(fail(format!("unsupported image filter /{other}")));
        }
        _ => {}
    }

    let samples = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream
            .decompressed_content()
            .map_err(|e| fail(format!("cannot decode {filters:?} stream: {e}")))?
    };

    let width = pdf_utils::integer_from_dict(dict, b"Width").unwrap_or(0);
    let height = pdf_utils::integer_from_dict(dict, b"Height").unwrap_or(0);
    if width <= 0 || height <= 0 {
        return Err(fail(format!("invalid dimensions {width}x{height}")));
    }
    let (width, height) = (width as u32, height as u32);

    let bits = pdf_utils::integer_from_dict(dict, b"BitsPerComponent").unwrap_or(8);
    if bits != 8 {
        return Err(fail(format!("{bits} bits per component is not supported")));
    }

    let model = match dict.get(b"ColorSpace") {
        Ok(value) => ColorModel::resolve(document, value).map_err(fail)?,
        Err(_) => return Err(fail("image has no /ColorSpace".into())),
    };

    let pixels = width as usize * height as usize;
    let expected = pixels * model.components();
    if samples.len() < expected {
        return Err(fail(format!(
            "truncated samples: {} bytes, expected {expected}",
            samples.len()
        )));
    }
    let samples = &samples[..expected];

    let image = match &model {
        ColorModel::Gray => GrayImage::from_raw(width, height, samples.to_vec()).map(DynamicImage::ImageLuma8),
        ColorModel::Rgb => RgbImage::from_raw(width, height, samples.to_vec()).map(DynamicImage::ImageRgb8),
        ColorModel::Cmyk => {
            let rgb = samples
                .chunks_exact(4)
                .flat_map(|px| cmyk_to_rgb(px[0], px[1], px[2], px[3]))
                .collect();
            RgbImage::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
        }
        ColorModel::Indexed { base, palette } => {
            let stride = base.components();
            let mut rgb = Vec::with_capacity(pixels * 3);
            for &index in samples {
                let start = index as usize * stride;
                let entry = palette.get(start..start + stride).unwrap_or(&MISSING_ENTRY[..stride]);
                match **base {
                    ColorModel::Gray => rgb.extend_from_slice(&[entry[0]; 3]),
                    ColorModel::Cmyk => rgb.extend_from_slice(&cmyk_to_rgb(entry[0], entry[1], entry[2], entry[3])),
                    _ => rgb.extend_from_slice(entry),
                }
            }
            RgbImage::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
        }
    };

    image.ok_or_else(|| fail("sample buffer does not match dimensions".into()))
}

/// Re-encode pixels as a baseline JPEG image XObject.
///
/// Grayscale stays grayscale; everything else (alpha, palettes, CMYK) is
/// flattened to opaque RGB. Alpha is dropped, not composited.
pub(crate) fn encode_jpeg_stream(image: &DynamicImage, quality: u8, id: Option<ObjectId>) -> Result<Stream> {
    let mut jpeg = Vec::new();
    let color_space: &[u8] = {
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
        let (encoded, color_space): (_, &[u8]) = match image {
            DynamicImage::ImageLuma8(gray) => (encoder.encode_image(gray), b"DeviceGray"),
            other => (encoder.encode_image(&other.to_rgb8()), b"DeviceRGB"),
        };
        encoded.map_err(|e| PdfError::encoding(id, format!("JPEG encode failed: {e}")))?;
        color_space
    };

    let mut dict = image_dictionary(image.width(), image.height(), color_space);
    dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    let mut stream = Stream::new(dict, jpeg);
    stream.allows_compression = false;
    Ok(stream)
}

/// Image XObject for caller-supplied bytes (PNG, JPEG, ...).
///
/// JPEG input in gray or RGB is embedded untouched. Anything else becomes
/// deflated RGB samples, with a soft mask stream when the source has alpha.
/// Returns the image stream and the optional soft mask.
pub(crate) fn embed_image_bytes(bytes: &[u8]) -> Result<(Stream, Option<Stream>)> {
    let format = image::guess_format(bytes).map_err(|e| PdfError::encoding(None, format!("unrecognised image data: {e}")))?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| PdfError::encoding(None, format!("cannot decode {format:?} image: {e}")))?;
    let (width, height) = (decoded.width(), decoded.height());

    if format == ImageFormat::Jpeg {
        let color_space: Option<&[u8]> = match &decoded {
            DynamicImage::ImageLuma8(_) => Some(b"DeviceGray"),
            DynamicImage::ImageRgb8(_) => Some(b"DeviceRGB"),
            _ => None,
        };
        if let Some(color_space) = color_space {
            let mut dict = image_dictionary(width, height, color_space);
            dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
            let mut stream = Stream::new(dict, bytes.to_vec());
            stream.allows_compression = false;
            return Ok((stream, None));
        }
    }

    let soft_mask = decoded.color().has_alpha().then(|| {
        let alpha: Vec<u8> = decoded.to_rgba8().pixels().map(|p| p.0[3]).collect();
        deflated(Stream::new(image_dictionary(width, height, b"DeviceGray"), alpha))
    });
    let rgb = decoded.to_rgb8().into_raw();
    let stream = deflated(Stream::new(image_dictionary(width, height, b"DeviceRGB"), rgb));
    Ok((stream, soft_mask))
}

fn image_dictionary(width: u32, height: u32, color_space: &[u8]) -> Dictionary {
    Dictionary::from_iter(vec![
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(width as i64)),
        ("Height", Object::Integer(height as i64)),
        ("ColorSpace", Object::Name(color_space.to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
    ])
}

fn deflated(mut stream: Stream) -> Stream {
    if let Err(e) = stream.compress() {
        log::debug!("leaving image stream uncompressed: {e}");
    }
    stream
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_image(color_space: Object, components: usize, bits: i64) -> Stream {
        let dict = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(4)),
            ("Height", Object::Integer(2)),
            ("ColorSpace", color_space),
            ("BitsPerComponent", Object::Integer(bits)),
        ]);
        Stream::new(dict, vec![128u8; 4 * 2 * components])
    }

    #[test]
    fn decodes_raw_rgb_and_gray() {
        let doc = Document::with_version("1.7");
        let rgb = decode_image(&doc, (1, 0), &raw_image(Object::Name(b"DeviceRGB".to_vec()), 3, 8)).unwrap();
        assert_eq!((rgb.width(), rgb.height()), (4, 2));

        let gray = decode_image(&doc, (1, 0), &raw_image(Object::Name(b"DeviceGray".to_vec()), 1, 8)).unwrap();
        assert!(matches!(gray, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn indexed_images_flatten_to_rgb() {
        let doc = Document::with_version("1.7");
        let palette = (0..=255u8).flat_map(|i| [i, 0, 255 - i]).collect::<Vec<u8>>();
        let space = Object::Array(vec![
            Object::Name(b"Indexed".to_vec()),
            Object::Name(b"DeviceRGB".to_vec()),
            Object::Integer(255),
            Object::String(palette, lopdf::StringFormat::Hexadecimal),
        ]);
        let decoded = decode_image(&doc, (1, 0), &raw_image(space, 1, 8)).unwrap();
        let rgb = decoded.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [128, 0, 127]);
    }

    #[test]
    fn sixteen_bit_samples_are_rejected() {
        let doc = Document::with_version("1.7");
        let err = decode_image(&doc, (9, 0), &raw_image(Object::Name(b"DeviceRGB".to_vec()), 6, 16)).unwrap_err();
        assert!(err.to_string().contains("9 0 R"));
    }

    #[test]
    fn cmyk_black_is_black() {
        assert_eq!(cmyk_to_rgb(0, 0, 0, 255), [0, 0, 0]);
        assert_eq!(cmyk_to_rgb(0, 0, 0, 0), [255, 255, 255]);
    }

    #[test]
    fn jpeg_stream_declares_dct() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, image::Rgb([10, 200, 30])));
        let stream = encode_jpeg_stream(&image, 60, None).unwrap();
        assert_eq!(pdf_utils::filter_names(&stream.dict), vec!["DCTDecode".to_string()]);
        assert!(stream.content.starts_with(&[0xFF, 0xD8]));
    }
}
