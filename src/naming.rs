//! Centralized file-name rules for sources and targets.
//!
//! Two conventions live here:
//!
//! ## Partials
//!
//! A file whose name starts with `_` is a partial. Partials are include-only:
//! they never get a public URL and are written to the partials area of the
//! cache directory instead of the public target root. Include macros name a
//! partial without its underscore (`[%= include footer %]` → `_footer.html`).
//!
//! ## Target names
//!
//! Target names are derived from the source path relative to its kind's
//! source root, then decorated in this order:
//!
//! - fingerprint: `logo.png` → `logo-3fa9c01b7e.png`
//! - extension change: `app.coffee` → `app.js`
//! - language: `index.html` → `index-de.html`
//!
//! The fingerprint is a cache-busting token, not a content address: the
//! source bytes are hashed together with fresh random bytes, so two compiles
//! of the same file produce different names.

use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Prefix that marks a file as a partial.
pub const PARTIAL_PREFIX: &str = "_";

/// Number of hex characters kept from the fingerprint digest.
const FINGERPRINT_LEN: usize = 10;

/// Number of random salt bytes mixed into each fingerprint.
const SALT_LEN: usize = 16;

/// Whether the file name of `path` marks it as a partial.
pub fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(PARTIAL_PREFIX))
}

/// Turn an include reference into the relative path of the partial it names.
///
/// The file name gets the partial prefix unless it already has it, and
/// `default_ext` is appended when the reference carries no extension.
///
/// - `"footer"`, `Some("html")` → `_footer.html`
/// - `"blocks/nav.html"`, `Some("html")` → `blocks/_nav.html`
/// - `"_reset.css"`, `None` → `_reset.css`
pub fn partial_reference(reference: &str, default_ext: Option<&str>) -> PathBuf {
    let reference = reference.replace('\\', "/");
    let path = Path::new(&reference);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut name = if file_name.starts_with(PARTIAL_PREFIX) {
        file_name
    } else {
        format!("{PARTIAL_PREFIX}{file_name}")
    };
    if let Some(ext) = default_ext
        && Path::new(&name).extension().is_none()
    {
        name.push('.');
        name.push_str(ext);
    }

    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}

/// Decorations applied to a relative target name.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decorations<'a> {
    pub fingerprint: Option<&'a str>,
    pub extension: Option<&'a str>,
    pub language: Option<&'a str>,
}

/// Apply fingerprint, extension change and language suffix to `relative`.
pub fn decorate(relative: &Path, decorations: Decorations<'_>) -> PathBuf {
    let mut path = relative.to_path_buf();
    if let Some(fingerprint) = decorations.fingerprint {
        path = append_to_stem(&path, fingerprint);
    }
    if let Some(ext) = decorations.extension {
        path.set_extension(ext);
    }
    if let Some(lang) = decorations.language {
        path = append_to_stem(&path, lang);
    }
    path
}

/// `dir/name.ext` + `suffix` → `dir/name-suffix.ext`.
fn append_to_stem(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push("-");
    name.push(suffix);
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// Cache-busting fingerprint of a source file.
///
/// SHA-256 over the file bytes followed by random salt, truncated to a short
/// hex string.
pub fn fingerprint(source: &Path) -> io::Result<String> {
    let bytes = std::fs::read(source)?;
    let mut salt = [0u8; SALT_LEN];
    getrandom::fill(&mut salt).map_err(|e| io::Error::other(e.to_string()))?;
    Ok(fingerprint_with_salt(&bytes, &salt))
}

fn fingerprint_with_salt(bytes: &[u8], salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.update(salt);
    let digest = format!("{:x}", hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}

/// Link from the directory `from` to `target`, `/`-separated, climbing with
/// `..` past the longest shared prefix.
///
/// - `public/images/bg-1.png` from `public/stylesheets` → `../images/bg-1.png`
pub fn relative_link(target: &Path, from: &Path) -> String {
    let target: Vec<_> = target.components().collect();
    let from: Vec<_> = from.components().collect();
    let shared = target
        .iter()
        .zip(&from)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = vec!["..".to_string(); from.len() - shared];
    parts.extend(
        target[shared..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}
