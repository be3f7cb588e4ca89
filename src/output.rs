//! CLI output formatting for the `build` and `check` commands.
//!
//! # Information-First Display
//!
//! Each asset leads with its position in the build order and its name (plus
//! language, when localized). Paths are secondary context on indented lines,
//! shown relative to the project root so the output stays short.
//!
//! ## Build
//!
//! ```text
//! 001 logo.png (created)
//!     Source: images/logo.png
//!     Target: public/images/logo-3fa1c2b9d0.png
//! 002 _footer.html (cached)
//!     Source: html/_footer.html
//! 003 page.html [de] (updated)
//!     Source: html/page.html
//!     Target: public/html/page-de.html
//!
//! Pruned
//!     images/old.png
//!
//! 2 compiled, 1 cached (3 total)
//! ```
//!
//! ## Check
//!
//! ```text
//! 001 _footer.html (partial)
//!     Source: html/_footer.html
//! 002 page.html (1 dependency)
//!     Source: html/page.html
//!     Missing: images/gone.png
//!
//! 2 assets, 1 missing reference
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::compile::{AssetReport, BuildReport, CheckReport, Outcome, PlannedAsset};
use std::path::Path;

// ============================================================================
// Shared entity display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Path relative to `root` when it lies below it, `/`-separated.
fn display_path(path: &Path, root: &Path) -> String {
    let shown = path.strip_prefix(root).unwrap_or(path);
    shown.to_string_lossy().replace('\\', "/")
}

/// Header line: index, file name, optional language, optional detail.
///
/// ```text
/// 001 page.html [de] (updated)
/// 002 logo.png
/// ```
fn asset_header(
    index: usize,
    source: &Path,
    language: Option<&str>,
    detail: Option<&str>,
) -> String {
    let name = source
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string());
    let mut line = format!("{} {}", format_index(index), name);
    if let Some(lang) = language {
        line.push_str(&format!(" [{lang}]"));
    }
    if let Some(detail) = detail {
        line.push_str(&format!(" ({detail})"));
    }
    line
}

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{n} {}", if n == 1 { one } else { many })
}

// ============================================================================
// Build output
// ============================================================================

fn asset_lines(index: usize, asset: &AssetReport, root: &Path) -> Vec<String> {
    let outcome = asset.outcome.to_string();
    let mut lines = vec![
        asset_header(index, &asset.source, asset.language.as_deref(), Some(&outcome)),
        format!("    Source: {}", display_path(&asset.source, root)),
    ];
    if matches!(asset.outcome, Outcome::Created | Outcome::Updated)
        && let Some(target) = &asset.target
    {
        lines.push(format!("    Target: {}", display_path(target, root)));
    }
    if let Some(error) = &asset.error {
        lines.push(format!("    Error: {error}"));
    }
    lines
}

/// Format the result of a build.
pub fn format_build_report(report: &BuildReport, root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, asset) in report.assets.iter().enumerate() {
        lines.extend(asset_lines(i + 1, asset, root));
    }

    if !report.pruned.is_empty() {
        lines.push(String::new());
        lines.push("Pruned".to_string());
        for source in &report.pruned {
            lines.push(format!("    {}", display_path(source, root)));
        }
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(report.to_string());
    lines
}

/// Print build output to stdout.
pub fn print_build_report(report: &BuildReport, root: &Path) {
    for line in format_build_report(report, root) {
        println!("{}", line);
    }
}

// ============================================================================
// Check output
// ============================================================================

fn planned_lines(index: usize, asset: &PlannedAsset, root: &Path) -> Vec<String> {
    let detail = if asset.partial {
        Some("partial".to_string())
    } else if asset.dependencies > 0 {
        Some(plural(asset.dependencies, "dependency", "dependencies"))
    } else {
        None
    };
    let mut lines = vec![
        asset_header(index, &asset.source, asset.language.as_deref(), detail.as_deref()),
        format!("    Source: {}", display_path(&asset.source, root)),
    ];
    for missing in &asset.unresolved {
        lines.push(format!("    Missing: {}", display_path(missing, root)));
    }
    lines
}

/// Format the planned build order from `check`.
pub fn format_build_order(report: &CheckReport, root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, asset) in report.order.iter().enumerate() {
        lines.extend(planned_lines(i + 1, asset, root));
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "{}, {}",
        plural(report.order.len(), "asset", "assets"),
        plural(report.unresolved_count(), "missing reference", "missing references")
    ));
    lines
}

/// Print check output to stdout.
pub fn print_build_order(report: &CheckReport, root: &Path) {
    for line in format_build_order(report, root) {
        println!("{}", line);
    }
}
