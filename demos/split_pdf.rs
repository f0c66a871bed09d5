//! Split a PDF into single pages or into ranges.
//!
//! Usage:
//!   cargo run --example split_pdf -- report.pdf out/
//!   cargo run --example split_pdf -- report.pdf out/ 1-2 3-5

use pdftoolbox::{split_all_pages, split_at_ranges};
use std::{env, process};

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <input.pdf> <out_dir> [start-end ...]", args[0]);
        process::exit(1);
    }

    let ranges: Vec<(usize, usize)> = args[3..]
        .iter()
        .map(|arg| parse_range(arg))
        .collect::<Result<_, _>>()
        .unwrap_or_else(|e| {
            eprintln!("{e}");
            process::exit(1);
        });

    let result = if ranges.is_empty() {
        split_all_pages(&args[1], &args[2])
    } else {
        split_at_ranges(&args[1], &args[2], &ranges)
    };

    match result {
        Ok(files) => {
            for file in &files {
                println!("{}", file.display());
            }
        }
        Err(e) => {
            eprintln!("Split failed: {e}");
            process::exit(1);
        }
    }
}

fn parse_range(arg: &str) -> Result<(usize, usize), String> {
    let (start, end) = arg.split_once('-').unwrap_or((arg, arg));
    match (start.trim().parse::<usize>(), end.trim().parse::<usize>()) {
        (Ok(start), Ok(end)) if start >= 1 && start <= end => Ok((start, end)),
        _ => Err(format!("'{arg}' is not a valid page range (expected start-end)")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typos_in_ranges_are_reported() {
        assert_eq!(parse_range("2-4"), Ok((2, 4)));
        assert_eq!(parse_range("3"), Ok((3, 3)));
        assert!(parse_range("1-x").is_err());
        assert!(parse_range("5-2").is_err());
        assert!(parse_range("0-1").is_err());
    }
}
