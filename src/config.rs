//! Build configuration.
//!
//! Handles loading, validating, and merging the build's TOML configuration.
//! Stock defaults are serialized to a `toml::Value`, the user's file is merged
//! on top of them, and the result is deserialized with unknown keys rejected.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! cache = "build"              # cache.json, cache.lock and partials/
//! force = false                # recompile everything, ignoring the cache
//! minify = false               # run the minify processors on public assets
//! on_processor_error = "abort" # or "continue"
//! # appconf = "config"         # directory holding index.json
//! # i18n = "i18n"              # directory holding <lang>.json
//!
//! [cdn]
//! path = "public"              # local directory the CDN serves
//! url = "/"                    # URL prefix for that directory
//!
//! [html]
//! source = "html"
//! target = "public/html"
//! languages = []               # e.g. ["en", "de"] to localize markup
//!
//! [stylesheets]
//! source = "stylesheets"
//! target = "public/stylesheets"
//!
//! [scripts]
//! source = "scripts"
//! target = "public/scripts"
//!
//! [images]
//! source = "images"
//! target = "public/images"
//!
//! [resources]
//! # fonts = "https://fonts.example.com/css"
//!
//! [processors]
//! # transpile_script = ["coffee", "--stdio", "--print"]
//! # minify_stylesheet = ["java", "-jar", "yuicompressor.jar", "--type", "css", "-o", "{output}", "{input}"]
//! ```
//!
//! Relative paths are resolved against the directory of the config file.
//! Unknown keys are rejected to catch typos early.

use crate::types::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// What to do when an external processor fails on one asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Stop the build at the first failure.
    #[default]
    Abort,
    /// Mark the asset failed and keep building the rest.
    Continue,
}

/// Build configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Directory for the cache manifest, its lock, and compiled partials.
    pub cache: PathBuf,
    /// Recompile every asset regardless of cache state.
    pub force: bool,
    /// Minify public (non-partial) text assets through the processors.
    pub minify: bool,
    /// Failure policy for external processors.
    pub on_processor_error: ErrorPolicy,
    /// Directory holding the app-config `index.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appconf: Option<PathBuf>,
    /// Directory holding one `<lang>.json` translation file per language.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub i18n: Option<PathBuf>,
    pub cdn: CdnConfig,
    pub html: SectionConfig,
    pub stylesheets: SectionConfig,
    pub scripts: SectionConfig,
    pub images: SectionConfig,
    /// Named URLs for `[%= resource_url key %]`.
    pub resources: BTreeMap<String, String>,
    pub processors: ProcessorsConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            cache: PathBuf::from("build"),
            force: false,
            minify: false,
            on_processor_error: ErrorPolicy::default(),
            appconf: None,
            i18n: None,
            cdn: CdnConfig::default(),
            html: SectionConfig::new("html", "public/html"),
            stylesheets: SectionConfig::new("stylesheets", "public/stylesheets"),
            scripts: SectionConfig::new("scripts", "public/scripts"),
            images: SectionConfig::new("images", "public/images"),
            resources: BTreeMap::new(),
            processors: ProcessorsConfig::default(),
        }
    }
}

impl BuildConfig {
    /// Configuration for an explicit (app-config, asset root, output root)
    /// triple, as given on the command line.
    ///
    /// Sources are `asset_root/{html,stylesheets,scripts,images}`, targets the
    /// same names under `output_root`, and the cache lives in
    /// `asset_root/build`.
    pub fn for_roots(appconf: Option<&Path>, asset_root: &Path, output_root: &Path) -> Self {
        let section = |name: &str| SectionConfig {
            source: asset_root.join(name),
            target: output_root.join(name),
            languages: Vec::new(),
        };
        Self {
            cache: asset_root.join("build"),
            appconf: appconf.map(Path::to_path_buf),
            cdn: CdnConfig {
                path: output_root.to_path_buf(),
                url: "/".to_string(),
            },
            html: section("html"),
            stylesheets: section("stylesheets"),
            scripts: section("scripts"),
            images: section("images"),
            ..Self::default()
        }
    }

    /// Validate config values are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cdn.url.is_empty() {
            return Err(ConfigError::Validation("cdn.url must not be empty".into()));
        }
        for kind in [
            ResourceKind::Stylesheet,
            ResourceKind::Script,
            ResourceKind::Image,
        ] {
            if !self.section(kind).languages.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "{}.languages is only supported for html",
                    kind.dir_name()
                )));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for lang in &self.html.languages {
            if lang.is_empty() || !seen.insert(lang) {
                return Err(ConfigError::Validation(format!(
                    "html.languages contains an empty or duplicate entry: {lang:?}"
                )));
            }
        }
        Ok(())
    }

    /// Source/target roots for a resource kind.
    pub fn section(&self, kind: ResourceKind) -> &SectionConfig {
        match kind {
            ResourceKind::Markup => &self.html,
            ResourceKind::Stylesheet => &self.stylesheets,
            ResourceKind::Script => &self.scripts,
            ResourceKind::Image => &self.images,
        }
    }

    /// Root directory for compiled partials.
    pub fn partials_dir(&self) -> PathBuf {
        self.cache.join("partials")
    }

    /// Make every relative path absolute against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        rebase(&mut self.cache);
        rebase(&mut self.cdn.path);
        if let Some(p) = self.appconf.as_mut() {
            rebase(p);
        }
        if let Some(p) = self.i18n.as_mut() {
            rebase(p);
        }
        for section in [
            &mut self.html,
            &mut self.stylesheets,
            &mut self.scripts,
            &mut self.images,
        ] {
            rebase(&mut section.source);
            rebase(&mut section.target);
        }
    }
}

/// Where compiled public assets are served from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CdnConfig {
    /// Local directory whose contents the CDN serves.
    pub path: PathBuf,
    /// URL prefix corresponding to `path`.
    pub url: String,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("public"),
            url: "/".to_string(),
        }
    }
}

/// Source and target roots for one resource kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SectionConfig {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Languages to compile each file for. Empty means not localized.
    pub languages: Vec<String>,
}

impl SectionConfig {
    fn new(source: &str, target: &str) -> Self {
        Self {
            source: PathBuf::from(source),
            target: PathBuf::from(target),
            languages: Vec::new(),
        }
    }
}

/// Command lines for the external processors. An empty command is a
/// pass-through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorsConfig {
    pub transpile_script: Vec<String>,
    pub minify_stylesheet: Vec<String>,
    pub minify_script: Vec<String>,
    pub minify_markup: Vec<String>,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(BuildConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<BuildConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: BuildConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load a build config file.
///
/// Merges the file on top of stock defaults, rejects unknown keys, validates,
/// and resolves relative paths against the file's directory.
pub fn load_config(path: &Path) -> Result<BuildConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let overlay: toml::Value = toml::from_str(&content)?;
    let mut config = resolve_config(stock_defaults_value(), Some(overlay))?;
    let base = path.parent().unwrap_or(Path::new("."));
    config.resolve_paths(base);
    Ok(config)
}

/// Returns a fully-commented stock config with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# assetsmith configuration
# ========================
# All settings are optional. Values shown below are the defaults.
# Relative paths are resolved against this file's directory.
# Unknown keys will cause an error.

# Directory for cache.json, cache.lock and compiled partials.
cache = "build"

# Recompile every asset even when the cache says it is fresh.
force = false

# Run the minify processors on public (non-partial) stylesheets, scripts
# and markup.
minify = false

# What to do when an external processor exits with an error:
#   "abort"    - stop the build
#   "continue" - mark the asset failed and keep going
on_processor_error = "abort"

# Directory holding index.json for [!dotted.key!] lookups.
# appconf = "config"

# Directory holding <lang>.json files for [ key ] lookups.
# i18n = "i18n"

# ---------------------------------------------------------------------------
# CDN: URLs are cdn.url + the target path relative to cdn.path
# ---------------------------------------------------------------------------
[cdn]
path = "public"
url = "/"

# ---------------------------------------------------------------------------
# Sources and targets per resource kind
# ---------------------------------------------------------------------------
[html]
source = "html"
target = "public/html"
# Compile every page once per language, e.g. ["en", "de"].
languages = []

[stylesheets]
source = "stylesheets"
target = "public/stylesheets"

[scripts]
source = "scripts"
target = "public/scripts"

[images]
source = "images"
target = "public/images"

# ---------------------------------------------------------------------------
# Named URLs for [%= resource_url key %]
# ---------------------------------------------------------------------------
[resources]
# fonts = "https://fonts.example.com/css?family=Inter"

# ---------------------------------------------------------------------------
# External processors
# ---------------------------------------------------------------------------
# Each entry is an argv list. Input is piped on stdin and output read from
# stdout, unless the arguments contain {input} / {output}, in which case
# temp files are passed instead. An empty list passes content through.
[processors]
transpile_script = []
minify_stylesheet = []
minify_script = []
minify_markup = []
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        BuildConfig::default().validate().unwrap();
    }

    #[test]
    fn stock_config_toml_parses_to_defaults() {
        let config = resolve_config(
            stock_defaults_value(),
            Some(toml::from_str(stock_config_toml()).unwrap()),
        )
        .unwrap();
        assert_eq!(config.cache, PathBuf::from("build"));
        assert_eq!(config.html.target, PathBuf::from("public/html"));
        assert!(config.processors.minify_script.is_empty());
    }

    #[test]
    fn parse_partial_config() {
        let overlay: toml::Value = toml::from_str(
            r#"
minify = true
[html]
languages = ["en", "de"]
"#,
        )
        .unwrap();
        let config = resolve_config(stock_defaults_value(), Some(overlay)).unwrap();
        assert!(config.minify);
        assert_eq!(config.html.languages, vec!["en", "de"]);
        // untouched keys keep their stock values
        assert_eq!(config.html.source, PathBuf::from("html"));
        assert_eq!(config.images.target, PathBuf::from("public/images"));
    }

    #[test]
    fn parse_error_policy() {
        let overlay: toml::Value = toml::from_str(r#"on_processor_error = "continue""#).unwrap();
        let config = resolve_config(stock_defaults_value(), Some(overlay)).unwrap();
        assert_eq!(config.on_processor_error, ErrorPolicy::Continue);
    }

    #[test]
    fn parse_resources_and_processors() {
        let overlay: toml::Value = toml::from_str(
            r#"
[resources]
fonts = "https://fonts.example.com/css"

[processors]
minify_stylesheet = ["cssmin"]
"#,
        )
        .unwrap();
        let config = resolve_config(stock_defaults_value(), Some(overlay)).unwrap();
        assert_eq!(
            config.resources.get("fonts").map(String::as_str),
            Some("https://fonts.example.com/css")
        );
        assert_eq!(config.processors.minify_stylesheet, vec!["cssmin"]);
    }

    #[test]
    fn unknown_key_rejected() {
        let overlay: toml::Value = toml::from_str(
            r#"
[html]
sourse = "x"
"#,
        )
        .unwrap();
        let err = resolve_config(stock_defaults_value(), Some(overlay))
            .unwrap_err()
            .to_string();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn unknown_section_rejected() {
        let overlay: toml::Value = toml::from_str("[fonts]\nx = 1").unwrap();
        assert!(resolve_config(stock_defaults_value(), Some(overlay)).is_err());
    }

    #[test]
    fn languages_only_for_html() {
        let mut config = BuildConfig::default();
        config.scripts.languages = vec!["en".into()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn duplicate_language_rejected() {
        let mut config = BuildConfig::default();
        config.html.languages = vec!["en".into(), "en".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_cdn_url_rejected() {
        let mut config = BuildConfig::default();
        config.cdn.url.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_resolves_relative_paths() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("assets.toml");
        fs::write(
            &path,
            r#"
cache = ".cache"
appconf = "conf"

[cdn]
path = "/srv/www"
url = "https://cdn.example.com"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.cache, tmp.path().join(".cache"));
        assert_eq!(config.appconf, Some(tmp.path().join("conf")));
        assert_eq!(config.html.source, tmp.path().join("html"));
        // absolute paths are left alone
        assert_eq!(config.cdn.path, PathBuf::from("/srv/www"));
        assert_eq!(config.cdn.url, "https://cdn.example.com");
    }

    #[test]
    fn load_config_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            load_config(&tmp.path().join("nope.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("assets.toml");
        fs::write(&path, "this is not toml [[[").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn for_roots_lays_out_sections() {
        let config = BuildConfig::for_roots(
            Some(Path::new("conf")),
            Path::new("assets"),
            Path::new("out"),
        );
        assert_eq!(config.cache, PathBuf::from("assets/build"));
        assert_eq!(config.scripts.source, PathBuf::from("assets/scripts"));
        assert_eq!(config.scripts.target, PathBuf::from("out/scripts"));
        assert_eq!(config.cdn.path, PathBuf::from("out"));
        assert_eq!(config.appconf, Some(PathBuf::from("conf")));
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str(r#"minify = false"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"minify = true"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("minify").unwrap().as_bool(), Some(true));
    }

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str(
            r#"
[cdn]
path = "public"
url = "/"
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[cdn]
url = "https://cdn.example.com"
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let cdn = merged.get("cdn").unwrap();
        assert_eq!(
            cdn.get("url").unwrap().as_str(),
            Some("https://cdn.example.com")
        );
        assert_eq!(cdn.get("path").unwrap().as_str(), Some("public"));
    }

    #[test]
    fn merge_toml_arrays_replace() {
        let base: toml::Value = toml::from_str(r#"languages = ["en", "de"]"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"languages = ["fr"]"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("languages").unwrap().as_array().unwrap().len(), 1);
    }
}
