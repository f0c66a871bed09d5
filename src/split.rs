use crate::{PdfDocument, PdfError, Result, SaveOptions};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Turn a 1-based inclusive `(start, end)` into a 0-based range of
/// `page_count` pages.
///
/// Out-of-bounds values are clamped into `[1, page_count]`; a start past the
/// end collapses onto the end page. `None` only for an empty document.
pub(crate) fn clamp_range(start: usize, end: usize, page_count: usize) -> Option<Range<usize>> {
    if page_count == 0 {
        return None;
    }
    let end = end.clamp(1, page_count);
    let start = start.clamp(1, page_count).min(end);
    Some(start - 1..end)
}

fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into())
}

fn page_file_name(base: &str, page_number: usize) -> String {
    format!("{base}_Seite_{page_number}.pdf")
}

fn part_file_name(base: &str, part_number: usize) -> String {
    format!("{base}_Teil_{part_number}.pdf")
}

/// Copy `range` of `source` into a fresh document and write it to `output`.
fn write_pages(source: &PdfDocument, range: Range<usize>, output: &Path) -> Result<()> {
    let mut document = PdfDocument::new();
    let written = document
        .append_pages(source, Some(range.clone()), 0)
        .and_then(|_| document.save_as(output, &SaveOptions { garbage_collect: true }));
    document.close();
    written?;
    log::debug!(
        "wrote pages {}-{} to {}",
        range.start + 1,
        range.end,
        output.display()
    );
    Ok(())
}

/// Open `path`, write one file per range into `out_dir`, and close it again.
///
/// Either every file is written or the ones already produced are removed
/// and the error is returned.
fn split_into<F>(path: &Path, out_dir: &Path, plan: F) -> Result<Vec<PathBuf>>
where
    F: FnOnce(usize, &str) -> Vec<(Range<usize>, String)>,
{
    let mut source = PdfDocument::open(path)?;
    let page_count = source.page_count()?;
    if page_count == 0 {
        source.close();
        return Err(PdfError::PageIndex { index: 0, page_count });
    }
    let jobs = plan(page_count, &base_name(path));

    let result = fs::create_dir_all(out_dir).map_err(PdfError::from).and_then(|_| {
        let mut produced: Vec<PathBuf> = Vec::with_capacity(jobs.len());
        for (range, name) in jobs {
            let output = out_dir.join(name);
            if let Err(err) = write_pages(&source, range, &output) {
                for file in &produced {
                    if let Err(e) = fs::remove_file(file) {
                        log::warn!("could not remove partial output {}: {e}", file.display());
                    }
                }
                return Err(err);
            }
            produced.push(output);
        }
        Ok(produced)
    });
    source.close();

    let produced = result?;
    log::info!("split {} into {} file(s)", path.display(), produced.len());
    Ok(produced)
}

/// Write every page of `path` to its own file in `out_dir`, named
/// `{base}_Seite_{n}.pdf` with 1-based `n`.
pub fn split_all_pages<P: AsRef<Path>, Q: AsRef<Path>>(path: P, out_dir: Q) -> Result<Vec<PathBuf>> {
    split_into(path.as_ref(), out_dir.as_ref(), |page_count, base| {
        (0..page_count)
            .map(|index| (index..index + 1, page_file_name(base, index + 1)))
            .collect()
    })
}

/// Write one file per 1-based inclusive `(start, end)` range, in the order
/// given, named `{base}_Teil_{n}.pdf`.
///
/// Ranges are clamped to the document instead of being rejected, so a range
/// computed against a stale page count still produces output.
pub fn split_at_ranges<P: AsRef<Path>, Q: AsRef<Path>>(
    path: P,
    out_dir: Q,
    ranges: &[(usize, usize)],
) -> Result<Vec<PathBuf>> {
    split_into(path.as_ref(), out_dir.as_ref(), |page_count, base| {
        ranges
            .iter()
            .enumerate()
            .filter_map(|(i, &(start, end))| {
                clamp_range(start, end, page_count).map(|range| (range, part_file_name(base, i + 1)))
            })
            .collect()
    })
}

/// Write the 1-based inclusive page range `start..=end` of `path` to
/// `out_path`. The source is not modified.
pub fn extract_range<P: AsRef<Path>, Q: AsRef<Path>>(path: P, out_path: Q, start: usize, end: usize) -> Result<()> {
    let (path, out_path) = (path.as_ref(), out_path.as_ref());
    let mut source = PdfDocument::open(path)?;
    let result = source.page_count().and_then(|page_count| {
        let range = clamp_range(start, end, page_count).ok_or(PdfError::PageIndex { index: 0, page_count })?;
        if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        write_pages(&source, range, out_path)
    });
    source.close();
    result?;

    log::info!("extracted pages {start}-{end} of {} to {}", path.display(), out_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_clamped_not_rejected() {
        assert_eq!(clamp_range(1, 3, 5), Some(0..3));
        assert_eq!(clamp_range(0, 2, 5), Some(0..2));
        assert_eq!(clamp_range(4, 99, 5), Some(3..5));
        assert_eq!(clamp_range(9, 12, 5), Some(4..5));
        assert_eq!(clamp_range(4, 2, 5), Some(1..2));
        assert_eq!(clamp_range(1, 1, 0), None);
    }

    #[test]
    fn output_names_are_one_based() {
        assert_eq!(page_file_name("report", 1), "report_Seite_1.pdf");
        assert_eq!(part_file_name("report", 2), "report_Teil_2.pdf");
        assert_eq!(base_name(Path::new("/tmp/scan.2024.pdf")), "scan.2024");
    }
}
