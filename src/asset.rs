//! Asset model: one compilable unit per (source path, language).
//!
//! All assets of a build live in one [`AssetCollection`] owned by the driver.
//! Dependencies are stored as [`AssetId`] indices into that collection, so a
//! dependent always sees the current state (target path, rebuilt flag) of
//! what it depends on.
//!
//! Parsing an asset loads its text, tokenizes it with its kind's syntax, and
//! turns every include/URL macro into a dependency edge. References that do
//! not name a discovered asset are logged and remembered as unresolved; the
//! build proceeds and the macro later evaluates to an empty string.

use crate::config::BuildConfig;
use crate::expression::{self, Expression, Syntax};
use crate::naming::{self, Decorations};
use crate::types::ResourceKind;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Index of an asset within its [`AssetCollection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(usize);

impl AssetId {
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// One compilable source file, optionally specialized for a language.
#[derive(Debug)]
pub struct Asset {
    pub kind: ResourceKind,
    pub source: PathBuf,
    pub language: Option<String>,
    /// Include-only; never gets a public URL.
    pub partial: bool,
    pub dependencies: Vec<AssetId>,
    /// Referenced source paths that matched no asset.
    pub unresolved: Vec<PathBuf>,
    /// Set when this asset was written during the current build.
    pub rebuilt: bool,
    /// Raw text, loaded by [`AssetCollection::parse`]. `None` for images and
    /// for sources that are not UTF-8; both are compiled byte for byte.
    pub content: Option<String>,
    pub expressions: Vec<Expression>,
    /// Current target: fresh after a compile, or the cached one.
    pub target: Option<PathBuf>,
}

impl Asset {
    pub fn new(kind: ResourceKind, source: PathBuf, language: Option<String>) -> Self {
        let partial = naming::is_partial(&source);
        Self {
            kind,
            source,
            language,
            partial,
            dependencies: Vec::new(),
            unresolved: Vec::new(),
            rebuilt: false,
            content: None,
            expressions: Vec::new(),
            target: None,
        }
    }

    /// Macro table for this asset's kind. Images are not tokenized.
    pub fn syntax(&self) -> Option<&'static Syntax> {
        match self.kind {
            ResourceKind::Markup => Some(Syntax::markup()),
            ResourceKind::Stylesheet => Some(Syntax::stylesheet()),
            ResourceKind::Script => Some(Syntax::script()),
            ResourceKind::Image => None,
        }
    }

    /// Whether the source needs the script transpile step.
    pub fn needs_transpile(&self) -> bool {
        self.kind == ResourceKind::Script && has_extension(&self.source, "coffee")
    }

    /// Compute a new target path for this asset.
    ///
    /// Public stylesheets, scripts and images get a fresh fingerprint on
    /// every call; partials go to the partials area unfingerprinted.
    pub fn target_path(&self, config: &BuildConfig) -> io::Result<PathBuf> {
        let relative = self.relative_source(config);
        let fingerprint = if self.partial || self.kind == ResourceKind::Markup {
            None
        } else {
            Some(naming::fingerprint(&self.source)?)
        };
        let name = naming::decorate(
            &relative,
            Decorations {
                fingerprint: fingerprint.as_deref(),
                extension: self.needs_transpile().then_some("js"),
                language: self.language.as_deref(),
            },
        );
        Ok(self.target_root(config).join(name))
    }

    /// Directory the target is written to. Only the file name changes
    /// between compiles, so this is known before the asset is rendered.
    pub fn target_dir(&self, config: &BuildConfig) -> PathBuf {
        let root = self.target_root(config);
        root.join(self.relative_source(config))
            .parent()
            .map_or(root.clone(), Path::to_path_buf)
    }

    fn relative_source(&self, config: &BuildConfig) -> PathBuf {
        self.source
            .strip_prefix(&config.section(self.kind).source)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(self.source.file_name().unwrap_or_default()))
    }

    fn target_root(&self, config: &BuildConfig) -> PathBuf {
        if self.partial {
            config.partials_dir().join(self.kind.dir_name())
        } else {
            config.section(self.kind).target.clone()
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.source.display())?;
        if let Some(lang) = &self.language {
            write!(f, " [{lang}]")?;
        }
        Ok(())
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Arena of every asset in one build.
#[derive(Debug, Default)]
pub struct AssetCollection {
    assets: Vec<Asset>,
}

impl AssetCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the asset model for a discovered file list.
    ///
    /// Markup is expanded into one asset per configured language. Files with
    /// unrecognised extensions are skipped, as are repeats.
    pub fn from_files(files: &[PathBuf], config: &BuildConfig) -> Self {
        let mut collection = Self::new();
        for path in files {
            let Some(kind) = ResourceKind::from_path(path) else {
                log::debug!("skipping {}: unsupported extension", path.display());
                continue;
            };
            let languages = &config.section(kind).languages;
            if languages.is_empty() {
                collection.insert(Asset::new(kind, path.clone(), None));
            } else {
                for lang in languages {
                    collection.insert(Asset::new(kind, path.clone(), Some(lang.clone())));
                }
            }
        }
        collection
    }

    /// Add an asset unless one with the same identity exists.
    pub fn insert(&mut self, asset: Asset) -> AssetId {
        if let Some(id) = self.find(&asset.source, asset.language.as_deref()) {
            return id;
        }
        self.assets.push(asset);
        AssetId(self.assets.len() - 1)
    }

    /// Look up an asset by identity.
    pub fn find(&self, source: &Path, language: Option<&str>) -> Option<AssetId> {
        self.assets
            .iter()
            .position(|a| a.source == source && a.language.as_deref() == language)
            .map(AssetId)
    }

    pub fn get(&self, id: AssetId) -> &Asset {
        &self.assets[id.0]
    }

    pub fn get_mut(&mut self, id: AssetId) -> &mut Asset {
        &mut self.assets[id.0]
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// All ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = AssetId> + '_ {
        (0..self.assets.len()).map(AssetId)
    }

    /// Dependency lists indexed by asset id, for the resolver.
    pub fn dependency_graph(&self) -> Vec<Vec<AssetId>> {
        self.assets.iter().map(|a| a.dependencies.clone()).collect()
    }

    /// Parse every asset.
    pub fn parse_all(&mut self, config: &BuildConfig) -> Result<(), ParseError> {
        let ids: Vec<AssetId> = self.ids().collect();
        for id in ids {
            self.parse(id, config)?;
        }
        Ok(())
    }

    /// Load, tokenize and resolve the dependencies of one asset.
    pub fn parse(&mut self, id: AssetId, config: &BuildConfig) -> Result<(), ParseError> {
        let asset = self.get(id);
        let Some(syntax) = asset.syntax() else {
            return Ok(());
        };
        let source = asset.source.clone();
        let bytes = std::fs::read(&source).map_err(|e| ParseError {
            path: source.clone(),
            source: e,
        })?;
        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(e) => {
                log::warn!(
                    "{}: not valid UTF-8 ({}), copying without macro expansion",
                    asset,
                    e.utf8_error()
                );
                return Ok(());
            }
        };

        let mut expressions = expression::tokenize(&content, syntax);
        let mut dependencies = Vec::new();
        let mut unresolved = Vec::new();
        for expr in &mut expressions {
            let Some(reference) = expr.kind.reference(asset.kind) else {
                continue;
            };
            let path = reference_path(reference, config);
            match self.find_for(&path, asset.language.as_deref()) {
                Some(dep) => {
                    expr.dependency = Some(dep);
                    if !dependencies.contains(&dep) {
                        dependencies.push(dep);
                    }
                }
                None => {
                    log::warn!(
                        "{}: could not find dependency {}",
                        asset,
                        path.display()
                    );
                    if !unresolved.contains(&path) {
                        unresolved.push(path);
                    }
                }
            }
        }
        log::debug!(
            "{}: {} expressions, {} dependencies",
            asset,
            expressions.len(),
            dependencies.len()
        );

        let asset = self.get_mut(id);
        asset.content = Some(content);
        asset.expressions = expressions;
        asset.dependencies = dependencies;
        asset.unresolved = unresolved;
        Ok(())
    }

    /// Find a referenced asset, preferring the referrer's language variant.
    fn find_for(&self, source: &Path, language: Option<&str>) -> Option<AssetId> {
        language
            .and_then(|lang| self.find(source, Some(lang)))
            .or_else(|| self.find(source, None))
    }
}

/// Source path a macro reference points at.
fn reference_path(reference: expression::Reference<'_>, config: &BuildConfig) -> PathBuf {
    let root = &config.section(reference.kind).source;
    if reference.include {
        let default_ext = (reference.kind == ResourceKind::Markup).then_some("html");
        root.join(naming::partial_reference(reference.path, default_ext))
    } else {
        root.join(reference.path.replace('\\', "/"))
    }
}

/// An asset's source could not be read.
#[derive(thiserror::Error, Debug)]
#[error("failed to read {}: {source}", path.display())]
pub struct ParseError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{SiteBuilder, test_config};
    use std::fs;

    #[test]
    fn localized_markup_expands_per_language() {
        let mut config = BuildConfig::default();
        config.html.languages = vec!["en".into(), "de".into()];
        let files = vec![PathBuf::from("html/index.html"), PathBuf::from("images/a.png")];
        let assets = AssetCollection::from_files(&files, &config);

        assert_eq!(assets.len(), 3);
        assert!(assets.find(Path::new("html/index.html"), Some("en")).is_some());
        assert!(assets.find(Path::new("html/index.html"), Some("de")).is_some());
        assert!(assets.find(Path::new("html/index.html"), None).is_none());
        assert!(assets.find(Path::new("images/a.png"), None).is_some());
    }

    #[test]
    fn unsupported_and_duplicate_files_skipped() {
        let config = BuildConfig::default();
        let files = vec![
            PathBuf::from("html/readme.txt"),
            PathBuf::from("html/a.html"),
            PathBuf::from("html/a.html"),
        ];
        assert_eq!(AssetCollection::from_files(&files, &config).len(), 1);
    }

    #[test]
    fn partial_flag_from_file_name() {
        let a = Asset::new(ResourceKind::Markup, "html/_footer.html".into(), None);
        let b = Asset::new(ResourceKind::Markup, "html/page.html".into(), None);
        assert!(a.partial);
        assert!(!b.partial);
    }

    #[test]
    fn parse_registers_dependencies() {
        let site = SiteBuilder::new()
            .file("html/page.html", "<body>[%= include footer %][%= image_url logo.png %]</body>")
            .file("html/_footer.html", "<footer>[%= image_url logo.png %]</footer>")
            .file("images/logo.png", "png")
            .build();
        let config = test_config(site.path());
        let mut assets = AssetCollection::from_files(&site.files(), &config);
        assets.parse_all(&config).unwrap();

        let page = assets
            .find(&config.html.source.join("page.html"), None)
            .unwrap();
        let footer = assets
            .find(&config.html.source.join("_footer.html"), None)
            .unwrap();
        let logo = assets
            .find(&config.images.source.join("logo.png"), None)
            .unwrap();

        assert_eq!(assets.get(page).dependencies, vec![footer, logo]);
        assert_eq!(assets.get(footer).dependencies, vec![logo]);
        assert!(assets.get(logo).dependencies.is_empty());
        assert_eq!(assets.get(page).expressions[0].dependency, Some(footer));
    }

    #[test]
    fn missing_dependency_is_unresolved_not_error() {
        let site = SiteBuilder::new()
            .file("html/page.html", "[%= image_url gone.png %]")
            .build();
        let config = test_config(site.path());
        let mut assets = AssetCollection::from_files(&site.files(), &config);
        assets.parse_all(&config).unwrap();

        let page = assets.get(AssetId(0));
        assert!(page.dependencies.is_empty());
        assert_eq!(page.unresolved, vec![config.images.source.join("gone.png")]);
        assert_eq!(page.expressions[0].dependency, None);
    }

    #[test]
    fn localized_include_prefers_same_language() {
        let site = SiteBuilder::new()
            .file("html/page.html", "[%= include footer %]")
            .file("html/_footer.html", "f")
            .build();
        let mut config = test_config(site.path());
        config.html.languages = vec!["en".into(), "de".into()];
        let mut assets = AssetCollection::from_files(&site.files(), &config);
        assets.parse_all(&config).unwrap();

        let page_path = config.html.source.join("page.html");
        let footer_path = config.html.source.join("_footer.html");
        let page_de = assets.find(&page_path, Some("de")).unwrap();
        let footer_de = assets.find(&footer_path, Some("de")).unwrap();
        assert_eq!(assets.get(page_de).dependencies, vec![footer_de]);
    }

    #[test]
    fn images_are_not_parsed() {
        let site = SiteBuilder::new()
            .file("images/logo.png", "[%= include x %]")
            .build();
        let config = test_config(site.path());
        let mut assets = AssetCollection::from_files(&site.files(), &config);
        assets.parse_all(&config).unwrap();
        assert!(assets.get(AssetId(0)).content.is_none());
        assert!(assets.get(AssetId(0)).expressions.is_empty());
    }

    #[test]
    fn unreadable_source_is_parse_error() {
        let site = SiteBuilder::new().file("html/page.html", "x").build();
        let config = test_config(site.path());
        let mut assets = AssetCollection::from_files(&site.files(), &config);
        fs::remove_file(config.html.source.join("page.html")).unwrap();
        let err = assets.parse_all(&config).unwrap_err();
        assert!(err.path.ends_with("page.html"));
    }

    #[test]
    fn non_utf8_source_is_left_unparsed() {
        let site = SiteBuilder::new()
            .file("stylesheets/latin1.css", "")
            .build();
        let config = test_config(site.path());
        let path = config.stylesheets.source.join("latin1.css");
        fs::write(&path, b"/* caf\xe9 */ [%= image_url a.png %]").unwrap();
        let mut assets = AssetCollection::from_files(&site.files(), &config);
        assets.parse_all(&config).unwrap();

        let css = assets.get(AssetId(0));
        assert!(css.content.is_none());
        assert!(css.expressions.is_empty());
        assert!(css.dependencies.is_empty());
    }

    #[test]
    fn image_path_registers_image_dependency() {
        let site = SiteBuilder::new()
            .file("stylesheets/site.css", r#"a { b: url([%= image_path "bg.png" %]); }"#)
            .file("images/bg.png", "png")
            .build();
        let config = test_config(site.path());
        let mut assets = AssetCollection::from_files(&site.files(), &config);
        assets.parse_all(&config).unwrap();

        let css = assets
            .find(&config.stylesheets.source.join("site.css"), None)
            .unwrap();
        let bg = assets
            .find(&config.images.source.join("bg.png"), None)
            .unwrap();
        assert_eq!(assets.get(css).dependencies, vec![bg]);
    }

    #[test]
    fn target_path_fingerprints_public_assets() {
        let site = SiteBuilder::new().file("images/img/logo.png", "png").build();
        let config = test_config(site.path());
        let asset = Asset::new(
            ResourceKind::Image,
            config.images.source.join("img/logo.png"),
            None,
        );
        let target = asset.target_path(&config).unwrap();
        assert_eq!(target.parent().unwrap(), config.images.target.join("img"));
        assert_eq!(asset.target_dir(&config), config.images.target.join("img"));
        let name = target.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("logo-") && name.ends_with(".png"));
        assert_ne!(name, "logo.png");
    }

    #[test]
    fn target_path_for_partials_goes_to_partials_area() {
        let site = SiteBuilder::new().file("stylesheets/_reset.css", "").build();
        let config = test_config(site.path());
        let asset = Asset::new(
            ResourceKind::Stylesheet,
            config.stylesheets.source.join("_reset.css"),
            None,
        );
        assert_eq!(
            asset.target_path(&config).unwrap(),
            config.partials_dir().join("stylesheets/_reset.css")
        );
    }

    #[test]
    fn target_path_for_localized_markup() {
        let config = test_config(Path::new("/site"));
        let asset = Asset::new(
            ResourceKind::Markup,
            config.html.source.join("index.html"),
            Some("de".into()),
        );
        assert_eq!(
            asset.target_path(&config).unwrap(),
            config.html.target.join("index-de.html")
        );
    }

    #[test]
    fn coffee_targets_become_js() {
        let site = SiteBuilder::new().file("scripts/app.coffee", "x = 1").build();
        let config = test_config(site.path());
        let asset = Asset::new(
            ResourceKind::Script,
            config.scripts.source.join("app.coffee"),
            None,
        );
        assert!(asset.needs_transpile());
        let target = asset.target_path(&config).unwrap();
        assert_eq!(target.extension().unwrap(), "js");
    }

    #[test]
    fn display_includes_language() {
        let a = Asset::new(ResourceKind::Markup, "html/i.html".into(), Some("en".into()));
        assert_eq!(a.to_string(), "markup html/i.html [en]");
    }
}
