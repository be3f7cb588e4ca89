//! Application configuration exposed to `[!dotted.key!filter]` macros.
//!
//! Loaded from `index.json` in the configured directory. Any object may carry
//! an `__include` key naming another JSON file (or a list of them), relative
//! to the file that contains it. The included object's keys are merged into
//! the including object and win over its own keys. Includes nest; a file that
//! ends up including itself is an error.

use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const INDEX_FILENAME: &str = "index.json";
const INCLUDE_KEY: &str = "__include";

#[derive(thiserror::Error, Debug)]
pub enum AppConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("include cycle through {}", .0.display())]
    IncludeCycle(PathBuf),
    #[error("{}: {reason}", path.display())]
    InvalidInclude { path: PathBuf, reason: String },
}

/// Merged application configuration tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    root: Value,
}

impl AppConfig {
    /// A configuration with no keys; every lookup misses.
    pub fn empty() -> Self {
        Self { root: Value::Null }
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Load `<dir>/index.json` and expand its includes.
    pub fn load(dir: &Path) -> Result<Self, AppConfigError> {
        let mut stack = Vec::new();
        let root = load_file(&dir.join(INDEX_FILENAME), &mut stack)?;
        Ok(Self { root })
    }

    /// Look up a dotted key such as `site.title`.
    pub fn lookup(&self, dotted: &str) -> Option<&Value> {
        dotted
            .split('.')
            .try_fold(&self.root, |node, part| node.as_object()?.get(part))
    }

    /// Text for `[!key!filter]`. Misses and unknown filters yield empty text.
    pub fn render(&self, dotted: &str, filter: &str) -> String {
        let Some(value) = self.lookup(dotted) else {
            log::warn!("app config key `{dotted}` not found");
            return String::new();
        };
        match filter {
            "" => match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            "json" => value.to_string(),
            _ => {
                log::warn!("unknown app config filter `{filter}` for `{dotted}`");
                String::new()
            }
        }
    }
}

fn load_file(path: &Path, stack: &mut Vec<PathBuf>) -> Result<Value, AppConfigError> {
    let canonical = fs::canonicalize(path).map_err(|source| AppConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if stack.contains(&canonical) {
        return Err(AppConfigError::IncludeCycle(canonical));
    }
    let text = fs::read_to_string(&canonical).map_err(|source| AppConfigError::Io {
        path: canonical.clone(),
        source,
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|source| AppConfigError::Json {
        path: canonical.clone(),
        source,
    })?;

    let base = canonical.parent().map(Path::to_path_buf).unwrap_or_default();
    stack.push(canonical);
    let expanded = expand(value, &base, stack);
    stack.pop();
    expanded
}

fn expand(value: Value, base: &Path, stack: &mut Vec<PathBuf>) -> Result<Value, AppConfigError> {
    match value {
        Value::Object(map) => expand_object(map, base, stack).map(Value::Object),
        Value::Array(items) => items
            .into_iter()
            .map(|v| expand(v, base, stack))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

fn expand_object(
    mut map: Map<String, Value>,
    base: &Path,
    stack: &mut Vec<PathBuf>,
) -> Result<Map<String, Value>, AppConfigError> {
    let include = map.remove(INCLUDE_KEY);

    let mut out = Map::new();
    for (key, value) in map {
        out.insert(key, expand(value, base, stack)?);
    }

    let names = match include {
        None => Vec::new(),
        Some(Value::String(name)) => vec![name],
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(name) => Ok(name),
                other => Err(invalid(base, format!("include entry {other} is not a string"))),
            })
            .collect::<Result<_, _>>()?,
        Some(other) => {
            return Err(invalid(base, format!("{INCLUDE_KEY} must be a string, got {other}")));
        }
    };

    for name in names {
        let path = base.join(&name);
        match load_file(&path, stack)? {
            Value::Object(included) => out.extend(included),
            _ => return Err(invalid(&path, "included file is not a JSON object".into())),
        }
    }
    Ok(out)
}

fn invalid(path: &Path, reason: String) -> AppConfigError {
    AppConfigError::InvalidInclude {
        path: path.to_path_buf(),
        reason,
    }
}
