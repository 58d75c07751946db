//! CLI output formatting for all commands.
//!
//! Every source image is shown with its positional index and file name, with
//! paths as indented context lines. Each version is listed by suffix with the
//! file it resolves to, so the output reads as an inventory of what was (or
//! would be) written.
//!
//! # Output Format
//!
//! ## Run
//!
//! ```text
//! 001 horizontal.jpg (5184x2623)
//!     Source: assets/horizontal.jpg
//!     -full → assets/horizontal-full.jpg
//!     -1200 → assets/horizontal-1200.jpg
//! 002 broken.jpg
//!     Error: cannot identify broken.jpg: …
//!
//! Processed 1 image (2 versions), 1 failed
//! ```
//!
//! ## Plan
//!
//! ```text
//! 001 horizontal.jpg (5184x2623)
//!     convert assets/horizontal.jpg -auto-orient -strip -write mpr:… +delete
//!     mpr:assets/horizontal.jpg -quality 80 -resize "1920x1920" -write … +delete
//!     mpr:assets/horizontal.jpg -quality 80 -crop "3936x2623+624+0" …
//! ```
//!
//! ## Check
//!
//! ```text
//! Versions
//! 001 -full 1920x1920
//! 002 -1200 1200x1200 crop 3:2
//!
//! Engine
//!     convert (timeout 10000ms)
//!
//! Warning: assets/horizontal-full.jpg is written by 2 versions
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::config::Config;
use crate::imaging::EngineCommand;
use crate::process::{BatchResult, ProcessEvent};
use crate::types::{ImageDescriptor, VersionSpec};
use std::path::{Path, PathBuf};

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Image header: index, file name, and oriented size.
///
/// ```text
/// 001 horizontal.jpg (5184x2623)
/// ```
fn image_header(index: usize, image: &ImageDescriptor) -> String {
    format!(
        "{} {} ({}x{})",
        format_index(index),
        file_name(&image.path),
        image.width,
        image.height
    )
}

/// One version and where it lands.
fn version_line(version: &VersionSpec) -> String {
    let label = if version.suffix.is_empty() {
        "(no suffix)"
    } else {
        version.suffix.as_str()
    };
    match &version.resolved_path {
        Some(path) => format!("{}{} → {}", indent(1), label, path.display()),
        None => format!("{}{}", indent(1), label),
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Run
// ============================================================================

/// Format a single progress event as display lines.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::ImageProcessed {
            index,
            image,
            versions,
        } => {
            let mut lines = vec![image_header(*index, image)];
            lines.push(format!("{}Source: {}", indent(1), image.path.display()));
            lines.extend(versions.iter().map(version_line));
            lines
        }
        ProcessEvent::ImageFailed {
            index,
            source,
            error,
        } => vec![
            format!("{} {}", format_index(*index), file_name(source)),
            format!("{}Error: {}", indent(1), error),
        ],
    }
}

/// Closing summary line for a batch.
pub fn format_run_summary(result: &BatchResult) -> Vec<String> {
    let versions: usize = result.processed.iter().map(|p| p.versions.len()).sum();
    let mut summary = format!(
        "Processed {} ({})",
        plural(result.processed.len(), "image"),
        plural(versions, "version")
    );
    if !result.failures.is_empty() {
        summary.push_str(&format!(", {} failed", result.failures.len()));
    }
    vec![String::new(), summary]
}

pub fn print_run_summary(result: &BatchResult) {
    for line in format_run_summary(result) {
        println!("{}", line);
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Format a compiled command, one fragment per line.
pub fn format_plan(index: usize, image: &ImageDescriptor, command: &EngineCommand) -> Vec<String> {
    let mut lines = vec![image_header(index, image)];
    let mut fragments = command.fragments.iter();
    if let Some(preamble) = fragments.next() {
        lines.push(format!("{}{} {}", indent(1), command.program, preamble));
    }
    lines.extend(fragments.map(|f| format!("{}{}", indent(1), f)));
    lines
}

pub fn print_plan(index: usize, image: &ImageDescriptor, command: &EngineCommand) {
    for line in format_plan(index, image, command) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

fn version_summary(index: usize, v: &VersionSpec) -> String {
    let mut line = format!(
        "{} {} {}x{}",
        format_index(index),
        if v.suffix.is_empty() { "(no suffix)" } else { v.suffix.as_str() },
        v.max_width,
        v.max_height
    );
    if let Some(aspect) = &v.aspect {
        line.push_str(&format!(" crop {aspect}"));
    }
    if let Some(q) = v.quality {
        line.push_str(&format!(" q{q}"));
    }
    if v.flatten {
        line.push_str(" flatten");
    }
    if let Some(format) = &v.format {
        line.push_str(&format!(" as {format}"));
    }
    line
}

/// Format the validated configuration plus any output path collisions.
pub fn format_check(config: &Config, collisions: &[(PathBuf, usize)]) -> Vec<String> {
    let mut lines = vec!["Versions".to_string()];
    if config.output.versions.is_empty() {
        lines.push(format!("{}(none, decode only)", indent(1)));
    }
    for (i, v) in config.output.versions.iter().enumerate() {
        lines.push(version_summary(i + 1, v));
    }

    if let Some(dir) = &config.output.path {
        lines.push(format!("{}Directory: {}", indent(1), dir.display()));
    }
    if let Some(prefix) = &config.output.prefix {
        lines.push(format!("{}Prefix: {}", indent(1), prefix));
    }

    lines.push(String::new());
    lines.push("Engine".to_string());
    lines.push(format!(
        "{}{} (timeout {}ms)",
        indent(1),
        config.engine.program,
        config.engine.timeout_ms
    ));

    if !collisions.is_empty() {
        lines.push(String::new());
        for (path, count) in collisions {
            lines.push(format!(
                "Warning: {} is written by {} versions",
                path.display(),
                count
            ));
        }
    }
    lines
}

pub fn print_check(config: &Config, collisions: &[(PathBuf, usize)]) {
    for line in format_check(config, collisions) {
        println!("{}", line);
    }
}
