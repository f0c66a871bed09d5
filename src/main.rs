//! Command-line front end for the pdftoolbox crate.
//!
//! Every library operation is one subcommand: inspect, merge, split,
//! extract, compress, and the single-page edits (rotate, delete, move,
//! insert, text). Edits are saved back onto the input unless `--output` is given.

use clap::{Parser, Subcommand, ValueEnum};
use pdftoolbox::{
    compress, extract_range, split_all_pages, split_at_ranges, CompressOptions, MergeQueue, PdfDocument,
    QualityTier, Rect, Result, SaveOptions, TextStyle,
};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Quality {
    Low,
    Medium,
    High,
}

impl From<Quality> for QualityTier {
    fn from(quality: Quality) -> Self {
        match quality {
            Quality::Low => QualityTier::Low,
            Quality::Medium => QualityTier::Medium,
            Quality::High => QualityTier::High,
        }
    }
}

/// Merge, split, compress and edit PDF documents.
#[derive(Parser, Debug)]
#[command(name = "pdftoolbox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log every object-level step (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show page count, rotations and image usage
    Info { file: PathBuf },

    /// Concatenate files, in the order given, into one document
    Merge {
        #[arg(short, long)]
        output: PathBuf,
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
    },

    /// Split into one file per page, or one file per range
    Split {
        file: PathBuf,
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
        /// Ranges such as `1-3,5`; without it every page gets its own file
        #[arg(short, long)]
        ranges: Option<String>,
    },

    /// Copy a page range (1-based, inclusive) into a new file
    Extract {
        file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        start: usize,
        end: usize,
    },

    /// Recompress images and rewrite the file without unused objects
    Compress {
        file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, value_enum, default_value_t = Quality::Medium)]
        quality: Quality,
        /// Only garbage-collect and deflate, leave images alone
        #[arg(long)]
        lossless: bool,
    },

    /// Rotate a page (1-based) by a multiple of 90 degrees
    Rotate {
        file: PathBuf,
        page: usize,
        #[arg(allow_hyphen_values = true)]
        degrees: i64,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete a page (1-based)
    Delete {
        file: PathBuf,
        page: usize,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Move a page (1-based) to a new position
    Move {
        file: PathBuf,
        from: usize,
        to: usize,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Insert all pages of another file before page `--at` (default: append)
    Insert {
        file: PathBuf,
        source: PathBuf,
        #[arg(long)]
        at: Option<usize>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List image objects with their placements
    Images { file: PathBuf },

    /// Write Helvetica text onto a page (1-based) at x/y in points
    Text {
        file: PathBuf,
        page: usize,
        x: f32,
        y: f32,
        text: String,
        #[arg(long, default_value_t = 12.0)]
        size: f32,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    if let Err(e) = run(cli.command) {
        eprintln!("❌ Error: {e}");
        process::exit(1);
    }
}

fn run(command: Command) -> std::result::Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Info { file } => info(&file)?,
        Command::Merge { output, inputs } => {
            let mut queue = MergeQueue::new();
            for input in inputs {
                queue.push(input);
            }
            let pages = queue.merge_into(&output)?;
            println!("✅ Merged {} file(s), {pages} page(s) → {}", queue.len(), output.display());
        }
        Command::Split { file, out_dir, ranges } => {
            let produced = match ranges {
                Some(spec) => split_at_ranges(&file, &out_dir, &parse_ranges(&spec)?)?,
                None => split_all_pages(&file, &out_dir)?,
            };
            for path in &produced {
                println!("📄 {}", path.display());
            }
            println!("✅ {} file(s) written", produced.len());
        }
        Command::Extract { file, output, start, end } => {
            extract_range(&file, &output, start, end)?;
            println!("✅ Pages {start}-{end} → {}", output.display());
        }
        Command::Compress {
            file,
            output,
            quality,
            lossless,
        } => {
            let options = CompressOptions {
                quality: Some(quality.into()),
                recompress_images: !lossless,
            };
            let outcome = compress(&file, &output, &options)?;
            println!(
                "✅ {} → {} ({} saved)",
                format_bytes(outcome.original_size),
                format_bytes(outcome.compressed_size),
                format_bytes(outcome.saved())
            );
            if !outcome.report.skipped.is_empty() {
                println!("⚠️  {} image(s) left unchanged:", outcome.report.skipped.len());
                for (_, err) in &outcome.report.skipped {
                    println!("   • {err}");
                }
            }
        }
        Command::Rotate {
            file,
            page,
            degrees,
            output,
        } => edit(&file, output.as_deref(), |doc| {
            let rotation = doc.rotate(page_index(page), degrees)?;
            println!("↻ Page {page} is now at {rotation}°");
            Ok(())
        })?,
        Command::Delete { file, page, output } => edit(&file, output.as_deref(), |doc| {
            doc.delete_page(page_index(page))?;
            println!("🗑️  Deleted page {page}, {} left", doc.page_count()?);
            Ok(())
        })?,
        Command::Move { file, from, to, output } => edit(&file, output.as_deref(), |doc| {
            doc.move_page(page_index(from), page_index(to))?;
            println!("↕ Moved page {from} to position {to}");
            Ok(())
        })?,
        Command::Insert {
            file,
            source,
            at,
            output,
        } => edit(&file, output.as_deref(), |doc| {
            let inserted = doc.insert_pages_from(&source, at.map(page_index))?;
            println!("➕ Inserted {inserted} page(s) from {}", source.display());
            Ok(())
        })?,
        Command::Images { file } => images(&file)?,
        Command::Text {
            file,
            page,
            x,
            y,
            text,
            size,
            output,
        } => edit(&file, output.as_deref(), |doc| {
            let handle = doc.page(page_index(page))?;
            let style = TextStyle {
                font_size: size,
                ..TextStyle::default()
            };
            doc.add_text(&handle, x, y, &text, &style)?;
            println!("✏️  Added text to page {page}");
            Ok(())
        })?,
    }
    Ok(())
}

/// Open, apply one edit, save (incrementally when writing back in place)
/// and close.
fn edit<F>(file: &Path, output: Option<&Path>, apply: F) -> Result<()>
where
    F: FnOnce(&mut PdfDocument) -> Result<()>,
{
    let mut doc = PdfDocument::open(file)?;
    let result = apply(&mut doc).and_then(|_| doc.save_as(output.unwrap_or(file), &SaveOptions::default()));
    doc.close();

    let saved = result?;
    println!("💾 {} ({:?}, {})", saved.path.display(), saved.strategy, format_bytes(saved.bytes_written));
    Ok(())
}

fn info(file: &Path) -> Result<()> {
    let mut doc = PdfDocument::open(file)?;
    println!("🔍 {}", file.display());
    println!("{}", "─".repeat(60));
    println!("   📏 Size: {}", format_bytes(doc.file_size()?));
    println!("   📄 Pages: {}", doc.page_count()?);
    for page in doc.pages()? {
        let images = doc.image_references(&page)?;
        let placements: usize = images.iter().map(|image| image.placements.len()).sum();
        println!(
            "   • Page {}: rotation {}°, {} image(s), {placements} placement(s)",
            page.index() + 1,
            doc.rotation(&page)?,
            images.len()
        );
    }
    doc.close();
    Ok(())
}

fn images(file: &Path) -> Result<()> {
    let mut doc = PdfDocument::open(file)?;
    let inventory = doc.images()?;
    if inventory.is_empty() {
        println!("ℹ️  No images found");
    }
    for image in &inventory {
        println!(
            "🖼️  {} {} R: {}x{} {} {} bpc, {}, {}, used {}x",
            image.object_id.0,
            image.object_id.1,
            image.width,
            image.height,
            image.color_space.as_deref().unwrap_or("?"),
            image.bits_per_component.unwrap_or(0),
            image.filter.as_deref().unwrap_or("raw"),
            format_bytes(image.encoded_len as u64),
            image.reference_count
        );
    }
    for page in doc.pages()? {
        for reference in doc.image_references(&page)? {
            for Rect { x0, y0, x1, y1 } in reference.placements {
                println!(
                    "   • page {}: {} {} R at [{x0:.1} {y0:.1} {x1:.1} {y1:.1}]",
                    page.index() + 1,
                    reference.object_id.0,
                    reference.object_id.1
                );
            }
        }
    }
    doc.close();
    Ok(())
}

/// 1-based page number from the command line to a 0-based index. Page 0 is
/// passed through as index 0.
fn page_index(page: usize) -> usize {
    page.saturating_sub(1)
}

/// Parse `1-3,5,7-8` into 1-based inclusive pairs.
fn parse_ranges(spec: &str) -> std::result::Result<Vec<(usize, usize)>, String> {
    spec.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (start, end) = part.split_once('-').unwrap_or((part, part));
            let number = |text: &str| {
                text.trim()
                    .parse::<usize>()
                    .map_err(|_| format!("'{part}' is not a page range"))
            };
            let (start, end) = (number(start)?, number(end)?);
            if start == 0 || start > end {
                return Err(format!("'{part}' is not a valid page range"));
            }
            Ok((start, end))
        })
        .collect()
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_range_lists() {
        assert_eq!(parse_ranges("1-3, 5").unwrap(), vec![(1, 3), (5, 5)]);
        assert_eq!(parse_ranges("2-2,").unwrap(), vec![(2, 2)]);
    }

    #[test]
    fn rejects_reversed_and_non_numeric_ranges() {
        assert!(parse_ranges("3-1").is_err());
        assert!(parse_ranges("a-b").is_err());
        assert!(parse_ranges("0-2").is_err());
    }

    #[test]
    fn formats_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
    }
}
