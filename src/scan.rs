//! Source discovery.
//!
//! Walks each kind's source root and collects the files whose extension
//! belongs to that kind:
//!
//! ```text
//! html/                 .html
//! ├── index.html
//! └── _footer.html      partial
//! stylesheets/          .css, .scss, .sass
//! scripts/              .js, .coffee
//! images/               .png, .jpg, .jpeg, .gif, .svg, .webp, .ico
//! ```
//!
//! Hidden files and directories are skipped, as is the cache directory when
//! it sits inside a source root. A missing source root simply contributes no
//! files.

use crate::config::BuildConfig;
use crate::types::ResourceKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Every source file of every kind, grouped by kind and sorted by path
/// within each kind.
pub fn discover(config: &BuildConfig) -> Result<Vec<PathBuf>, ScanError> {
    let mut files = Vec::new();
    for kind in ResourceKind::ALL {
        let root = &config.section(kind).source;
        if !root.is_dir() {
            log::debug!("no {} directory at {}", kind, root.display());
            continue;
        }
        let mut found = collect_kind(root, kind, &config.cache)?;
        found.sort();
        log::debug!("found {} {} files", found.len(), kind);
        files.extend(found);
    }
    Ok(files)
}

fn collect_kind(root: &Path, kind: ResourceKind, cache: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let mut found = Vec::new();
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || (!is_hidden(e) && e.path() != cache));
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && ResourceKind::from_path(entry.path()) == Some(kind) {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}
