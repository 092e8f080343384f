//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Process
//!
//! Plain mode prints only the cache path, so it can be piped:
//!
//! ```text
//! temp/resizer/photos/beach.jpg/c250xc150.webp
//! ```
//!
//! `--json` prints a report an HTTP layer would need to serve the file:
//!
//! ```text
//! {
//!   "path": "temp/resizer/photos/beach.jpg/c250xc150.webp",
//!   "format": "webp",
//!   "mime": "image/webp",
//!   "cache_hit": false,
//!   "etag": "1718000000-9f86d08…"
//! }
//! ```
//!
//! ## Warm
//!
//! ```text
//! 001 photos/beach.jpg
//!     c250xc150: generated
//! 002 photos/dune.png
//!     c250xc150: cached
//! 003 photos/broken.jpg
//!     c250xc150: failed (image not found or not readable: photos/broken.jpg)
//! Cache: 1 cached, 1 generated (3 total), 1 failed
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::engine::{BatchEvent, Thumbnail};
use crate::format::{OutputFormat, ServerSupport};
use serde::Serialize;
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

// ============================================================================
// process
// ============================================================================

/// Everything needed to answer an HTTP request for one derivative.
#[derive(Debug, Serialize)]
pub struct ThumbnailReport<'a> {
    pub path: &'a Path,
    pub format: OutputFormat,
    pub mime: &'static str,
    pub cache_hit: bool,
    pub etag: String,
}

impl<'a> ThumbnailReport<'a> {
    pub fn new(thumbnail: &'a Thumbnail, etag: String) -> Self {
        Self {
            path: &thumbnail.path,
            format: thumbnail.format,
            mime: thumbnail.format.mime_type(),
            cache_hit: thumbnail.cache_hit,
            etag,
        }
    }
}

pub fn format_thumbnail(thumbnail: &Thumbnail) -> Vec<String> {
    vec![thumbnail.path.display().to_string()]
}

pub fn format_report(report: &ThumbnailReport<'_>) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

pub fn print_thumbnail(thumbnail: &Thumbnail) {
    for line in format_thumbnail(thumbnail) {
        println!("{}", line);
    }
}

// ============================================================================
// warm
// ============================================================================

/// Format one batch event as an entry header plus a status line.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::Done {
            index,
            source,
            directive,
            thumbnail,
        } => {
            let status = if thumbnail.cache_hit {
                "cached"
            } else {
                "generated"
            };
            vec![
                format!("{} {}", format_index(index + 1), source),
                format!("    {}: {}", directive, status),
            ]
        }
        BatchEvent::Failed {
            index,
            source,
            directive,
            error,
        } => vec![
            format!("{} {}", format_index(index + 1), source),
            format!("    {}: failed ({})", directive, error),
        ],
    }
}

// ============================================================================
// formats
// ============================================================================

pub fn format_formats(
    backend: &str,
    server: ServerSupport,
    input_extensions: &[&str],
) -> Vec<String> {
    let mut lines = vec![format!("Backend: {}", backend), "Output formats".to_string()];
    for format in OutputFormat::ALL {
        let note = match format {
            OutputFormat::Webp | OutputFormat::Avif if !server.supports(format) => {
                " (disabled)"
            }
            _ => "",
        };
        lines.push(format!(
            "    {:<5}{}{}",
            format.extension(),
            format.mime_type(),
            note
        ));
    }
    lines.push("Server".to_string());
    lines.push(format!("    webp: {}", yes_no(server.webp)));
    lines.push(format!("    avif: {}", yes_no(server.avif)));
    lines.push(format!("Input extensions: {}", input_extensions.join(", ")));
    lines
}

pub fn print_formats(backend: &str, server: ServerSupport, input_extensions: &[&str]) {
    for line in format_formats(backend, server, input_extensions) {
        println!("{}", line);
    }
}

// ============================================================================
// check
// ============================================================================

/// Facts gathered by `check` after the engine came up.
pub struct CheckSummary<'a> {
    pub config_path: &'a Path,
    pub config_found: bool,
    pub www_root: &'a Path,
    pub cache_root: &'a Path,
    pub workers: usize,
}

pub fn format_check(summary: &CheckSummary<'_>) -> Vec<String> {
    let config = if summary.config_found {
        summary.config_path.display().to_string()
    } else {
        format!(
            "{} (not found, using defaults)",
            summary.config_path.display()
        )
    };
    vec![
        format!("Config: {}", config),
        format!("    Web root: {}", summary.www_root.display()),
        format!("    Cache: {}", summary.cache_root.display()),
        format!("    Workers: {}", summary.workers),
    ]
}

pub fn print_check(summary: &CheckSummary<'_>) {
    for line in format_check(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
