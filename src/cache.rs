//! Incremental build cache.
//!
//! One row per compiled (source, language) pair, remembering where the last
//! compile wrote its output and what the source looked like at the time. A
//! later build compares the source against its row to decide whether the
//! asset can be skipped.
//!
//! # Staleness
//!
//! An asset is recompiled when any of these hold:
//!
//! 1. it has no row;
//! 2. the source's mtime is newer than the recorded one;
//! 3. the source's SHA-256 differs from the recorded checksum;
//! 4. the recorded target file is gone;
//! 5. one of its dependencies was rebuilt earlier in this run;
//! 6. one of its unresolved references names a source that was pruned when
//!    this build started;
//! 7. a dependency's current row names a different target or output than the
//!    one recorded when this asset was last compiled.
//!
//! Rule 5 is what cascades a change through the graph: the resolver orders
//! dependencies first, so by the time a dependent is checked, its
//! dependencies' rebuilt flags are final. Rule 6 covers deleted files: a page
//! that referenced a now-deleted image has no edge to it any more, but must
//! still be re-rendered so the URL evaluates to nothing.
//!
//! Rule 7 carries the cascade across runs. A build that stops after a
//! dependency was rewritten but before its dependents were (an aborted build,
//! or a dependent whose processor failed) leaves no rebuilt flag behind, but
//! the dependents' rows still hold the old [`DependencyStamp`]s.
//!
//! # Storage
//!
//! The manifest is `cache.json` inside the cache directory. A missing,
//! corrupt or wrong-version manifest loads as empty, which simply means a
//! full rebuild. The cache takes an exclusive advisory lock on `cache.lock`
//! next to it for as long as it is open; a second build against the same
//! directory fails fast with [`CacheError::Busy`].

use crate::asset::{Asset, AssetCollection};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Name of the manifest file within the cache directory.
const MANIFEST_FILENAME: &str = "cache.json";

/// Name of the lock file within the cache directory.
const LOCK_FILENAME: &str = "cache.lock";

/// Version of the manifest format. Bump this to invalidate all existing
/// caches when the format changes.
const MANIFEST_VERSION: u32 = 2;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache {} is in use by another build", .0.display())]
    Busy(PathBuf),
}

/// Cache row for one compiled asset.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub source: PathBuf,
    pub target: PathBuf,
    pub language: Option<String>,
    /// Source mtime at compile time, nanoseconds since the Unix epoch.
    pub last_modified: u64,
    /// SHA-256 of the source at compile time.
    pub checksum: String,
    /// SHA-256 of the bytes written to `target`.
    pub output_checksum: String,
    /// Dependency outputs this compile was rendered against, in dependency
    /// order.
    pub dependencies: Vec<DependencyStamp>,
}

/// Target and output checksum of a dependency, as seen by a dependent.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct DependencyStamp {
    pub target: PathBuf,
    pub checksum: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Manifest {
    version: u32,
    entries: Vec<CacheEntry>,
}

impl Manifest {
    fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: Vec::new(),
        }
    }

    fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("ignoring corrupt cache {}: {e}", path.display());
                return Self::empty();
            }
        };
        if manifest.version != MANIFEST_VERSION {
            log::info!("cache format changed, rebuilding everything");
            return Self::empty();
        }
        manifest
    }
}

type EntryKey = (PathBuf, Option<String>);

/// Open build cache, holding the directory lock until dropped.
#[derive(Debug)]
pub struct BuildCache {
    dir: PathBuf,
    entries: Vec<CacheEntry>,
    /// `(source, language)` → position in `entries`.
    index: HashMap<EntryKey, usize>,
    /// Sources whose rows were pruned when the cache was opened.
    pruned: HashSet<PathBuf>,
    /// Rows were recorded or pruned since the manifest was loaded.
    dirty: bool,
    _lock: File,
}

impl BuildCache {
    /// Lock the cache directory and load its manifest.
    ///
    /// The directory is created if needed.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        fs::create_dir_all(dir)?;
        let lock = File::create(dir.join(LOCK_FILENAME))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(CacheError::Busy(dir.to_path_buf()));
        }

        let manifest = Manifest::load(&dir.join(MANIFEST_FILENAME));
        let mut cache = Self {
            dir: dir.to_path_buf(),
            entries: manifest.entries,
            index: HashMap::new(),
            pruned: HashSet::new(),
            dirty: false,
            _lock: lock,
        };
        cache.reindex();
        log::debug!(
            "opened cache {} with {} entries",
            dir.display(),
            cache.entries.len()
        );
        Ok(cache)
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| ((e.source.clone(), e.language.clone()), i))
            .collect();
    }

    /// Drop rows whose source no longer exists and delete their targets.
    ///
    /// Returns the removed rows. Their sources are remembered for the rest
    /// of this build (see staleness rule 6).
    pub fn prune(&mut self) -> io::Result<Vec<CacheEntry>> {
        let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| !e.source.is_file());
        self.entries = kept;
        self.reindex();
        self.dirty |= !gone.is_empty();

        for entry in &gone {
            match fs::remove_file(&entry.target) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            log::info!(
                "pruned {} (removed {})",
                entry.source.display(),
                entry.target.display()
            );
            self.pruned.insert(entry.source.clone());
        }
        Ok(gone)
    }

    /// Sources pruned when this build started.
    pub fn pruned(&self) -> &HashSet<PathBuf> {
        &self.pruned
    }

    pub fn find(&self, source: &Path, language: Option<&str>) -> Option<&CacheEntry> {
        self.index
            .get(&(source.to_path_buf(), language.map(str::to_string)))
            .map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `asset` must be recompiled. `entry` is its row, if any.
    pub fn is_stale(
        &self,
        entry: Option<&CacheEntry>,
        asset: &Asset,
        assets: &AssetCollection,
    ) -> io::Result<bool> {
        let Some(entry) = entry else {
            return Ok(true);
        };
        if modified_nanos(&asset.source)? > entry.last_modified {
            log::debug!("{asset}: source modified");
            return Ok(true);
        }
        if hash_file(&asset.source)? != entry.checksum {
            log::debug!("{asset}: checksum changed");
            return Ok(true);
        }
        if !entry.target.is_file() {
            log::debug!("{asset}: target {} missing", entry.target.display());
            return Ok(true);
        }
        if asset.dependencies.iter().any(|&dep| assets.get(dep).rebuilt) {
            log::debug!("{asset}: dependency rebuilt");
            return Ok(true);
        }
        if asset.unresolved.iter().any(|p| self.pruned.contains(p)) {
            log::debug!("{asset}: references a deleted source");
            return Ok(true);
        }
        if self.stamps(asset, assets) != entry.dependencies {
            log::debug!("{asset}: dependency output changed");
            return Ok(true);
        }
        Ok(false)
    }

    /// Current stamps of `asset`'s dependencies. Dependencies without a row
    /// are left out.
    fn stamps(&self, asset: &Asset, assets: &AssetCollection) -> Vec<DependencyStamp> {
        asset
            .dependencies
            .iter()
            .filter_map(|&id| {
                let dep = assets.get(id);
                self.find(&dep.source, dep.language.as_deref())
            })
            .map(|e| DependencyStamp {
                target: e.target.clone(),
                checksum: e.output_checksum.clone(),
            })
            .collect()
    }

    /// Record a fresh compile of `asset` that wrote `output` to `target`.
    ///
    /// Dependencies must already have their rows for this run.
    pub fn record(
        &mut self,
        asset: &Asset,
        target: &Path,
        output: &[u8],
        assets: &AssetCollection,
    ) -> io::Result<()> {
        let entry = CacheEntry {
            source: asset.source.clone(),
            target: target.to_path_buf(),
            language: asset.language.clone(),
            last_modified: modified_nanos(&asset.source)?,
            checksum: hash_file(&asset.source)?,
            output_checksum: hash_bytes(output),
            dependencies: self.stamps(asset, assets),
        };
        let key = (entry.source.clone(), entry.language.clone());
        match self.index.get(&key) {
            Some(&i) => self.entries[i] = entry,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(entry);
            }
        }
        self.dirty = true;
        Ok(())
    }

    /// Write the manifest back to disk, if anything changed since it was
    /// loaded.
    pub fn save(&self) -> Result<(), CacheError> {
        if !self.dirty {
            log::debug!("cache unchanged, not rewriting {}", MANIFEST_FILENAME);
            return Ok(());
        }
        let manifest = Manifest {
            version: MANIFEST_VERSION,
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&manifest)?;
        fs::write(self.manifest_path(), json)?;
        Ok(())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILENAME)
    }
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    Ok(hash_bytes(&fs::read(path)?))
}

fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Modification time in nanoseconds since the Unix epoch.
fn modified_nanos(path: &Path) -> io::Result<u64> {
    let modified = fs::metadata(path)?.modified()?;
    let nanos = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    Ok(u64::try_from(nanos).unwrap_or(u64::MAX))
}
