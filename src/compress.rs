use crate::images::RecompressionReport;
use crate::save;
use crate::{CompressOptions, PdfDocument, Result, SaveOptions};
use std::path::Path;

/// Sizes before and after a [`compress`] run.
#[derive(Debug)]
pub struct CompressionOutcome {
    pub original_size: u64,
    pub compressed_size: u64,
    /// Per-image results. Empty when image recompression was disabled.
    pub report: RecompressionReport,
}

impl CompressionOutcome {
    /// Bytes saved on disk; 0 when the output is not smaller.
    pub fn saved(&self) -> u64 {
        self.original_size.saturating_sub(self.compressed_size)
    }
}

/// Shrink `input` into `output`.
///
/// With `recompress_images` set, every placed image is re-encoded at the
/// chosen tier first; images that fail are skipped. The result is always a
/// full rewrite: unreachable objects dropped, ids renumbered, streams
/// deflated. `output` may equal `input`.
///
/// The output is never larger than the input: when the rewrite comes out
/// bigger, the original bytes are written to `output` instead.
pub fn compress<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &CompressOptions,
) -> Result<CompressionOutcome> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let mut document = PdfDocument::open(input)?;
    let original_size = document.file_size()?;

    let result = shrink(&mut document, output, options, original_size);
    document.close();

    let outcome = result?;
    log::info!(
        "compressed {} -> {}: {} -> {} bytes",
        input.display(),
        output.display(),
        outcome.original_size,
        outcome.compressed_size
    );
    Ok(outcome)
}

fn shrink(
    document: &mut PdfDocument,
    output: &Path,
    options: &CompressOptions,
    original_size: u64,
) -> Result<CompressionOutcome> {
    let report = if options.recompress_images {
        document.recompress_images(options.quality.unwrap_or_default())?
    } else {
        RecompressionReport::default()
    };
    let original = document
        .state()?
        .origin
        .as_ref()
        .map(|origin| origin.bytes.clone())
        .unwrap_or_default();
    let saved = document.save_as(output, &SaveOptions { garbage_collect: true })?;

    let mut compressed_size = saved.bytes_written;
    if compressed_size > original_size && !original.is_empty() {
        log::info!(
            "rewrite of {} grew to {compressed_size} bytes, keeping the original {original_size}",
            output.display()
        );
        save::write_atomically(output, &original)?;
        compressed_size = original_size;
    }
    Ok(CompressionOutcome {
        original_size,
        compressed_size,
        report,
    })
}

/// Lossless compression: no image is touched, only the garbage-collecting
/// rewrite runs.
pub fn simple_compress<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<CompressionOutcome> {
    compress(
        input,
        output,
        &CompressOptions {
            quality: None,
            recompress_images: false,
        },
    )
}
