//! Shared test utilities for the assetsmith test suite.
//!
//! Builds throwaway asset trees in a temp directory and reads back what a
//! build produced.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let site = SiteBuilder::new()
//!     .file("html/index.html", "[%= include footer %]")
//!     .file("html/_footer.html", "<footer/>")
//!     .build();
//! let config = test_config(site.path());
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::compile::BuildReport;
use crate::config::BuildConfig;

// =========================================================================
// Fixture setup
// =========================================================================

/// Collects files to write into a fresh temp directory.
#[derive(Default)]
pub struct SiteBuilder {
    files: Vec<(String, String)>,
}

impl SiteBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file at a `/`-separated path relative to the site root.
    pub fn file(mut self, path: &str, content: &str) -> Self {
        self.files.push((path.to_string(), content.to_string()));
        self
    }

    pub fn build(self) -> Site {
        let site = Site {
            tmp: TempDir::new().unwrap(),
        };
        for (path, content) in &self.files {
            site.write(path, content);
        }
        site
    }
}

/// An asset tree on disk. Removed when dropped.
pub struct Site {
    tmp: TempDir,
}

impl Site {
    pub fn path(&self) -> &Path {
        self.tmp.path()
    }

    /// Create or overwrite a file, creating parent directories.
    pub fn write(&self, path: &str, content: &str) {
        let full = self.tmp.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    /// Every source file the default test config discovers.
    pub fn files(&self) -> Vec<PathBuf> {
        crate::scan::discover(&test_config(self.path())).unwrap()
    }
}

/// Configuration for a site laid out as `<root>/{html,stylesheets,scripts,images}`
/// with output under `<root>/public` and the cache in `<root>/build`.
pub fn test_config(root: &Path) -> BuildConfig {
    BuildConfig::for_roots(None, root, &root.join("public"))
}

// =========================================================================
// Report lookups: panics with a clear message on miss
// =========================================================================

/// Contents of the target a build produced for an unlocalized source.
pub fn read_target(report: &BuildReport, source: &Path) -> String {
    let asset = report.find(source, None).unwrap_or_else(|| {
        let known: Vec<_> = report.assets.iter().map(|a| a.source.display().to_string()).collect();
        panic!("{} not in report. Available: {known:?}", source.display())
    });
    let target = asset
        .target
        .as_ref()
        .unwrap_or_else(|| panic!("{} has no target", source.display()));
    fs::read_to_string(target).unwrap()
}
