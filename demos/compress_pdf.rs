//! Shrink a PDF by recompressing its images.
//!
//! Usage:
//!   cargo run --example compress_pdf -- scan.pdf scan-small.pdf
//!   cargo run --example compress_pdf -- scan.pdf scan-small.pdf niedrig
//!   cargo run --example compress_pdf -- scan.pdf scan-small.pdf --lossless

use pdftoolbox::{compress, CompressOptions, QualityTier};
use std::{env, process};

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <input.pdf> <output.pdf> [low|medium|high] [--lossless]", args[0]);
        process::exit(1);
    }

    let lossless = args.iter().any(|a| a == "--lossless");
    let quality = args
        .get(3)
        .filter(|a| !a.starts_with("--"))
        .map(|label| QualityTier::parse(label));

    let options = CompressOptions {
        quality,
        recompress_images: !lossless,
    };

    let outcome = compress(&args[1], &args[2], &options).unwrap_or_else(|e| {
        eprintln!("Compression failed: {e}");
        process::exit(1);
    });

    let report = &outcome.report;
    println!(
        "{} -> {} bytes ({} images recompressed, {} unchanged, {} skipped)",
        outcome.original_size,
        outcome.compressed_size,
        report.recompressed,
        report.unchanged,
        report.skipped.len()
    );
    for (id, err) in &report.skipped {
        println!("  {} {} R: {err}", id.0, id.1);
    }
}
