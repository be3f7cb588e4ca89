//! Build driver: discover → parse → order → compile → save.
//!
//! [`build`] runs the whole pipeline against the cache; [`check`] stops after
//! ordering and writes nothing.
//!
//! Assets are compiled strictly in dependency order, so when an asset is
//! rendered every include and URL it names already has its final target for
//! this run. An asset is skipped when the cache says it is fresh; otherwise
//! its text is rendered, passed through the configured processors, written to
//! a new target, and recorded. A written asset sets its `rebuilt` flag, which
//! is what makes its dependents stale in turn.

use crate::asset::{Asset, AssetCollection, AssetId, ParseError};
use crate::cache::{BuildCache, CacheError};
use crate::config::{BuildConfig, ErrorPolicy};
use crate::context::BuildContext;
use crate::expression::{self, Expression, Lookup, MacroKind};
use crate::i18n;
use crate::naming;
use crate::processor::{ProcessorError, ProcessorStep};
use crate::resolve::{self, CycleError};
use crate::scan::{self, ScanError};
use crate::types::ResourceKind;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("cyclic dependency among: {}", .assets.join(", "))]
    Cycle { assets: Vec<String> },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("processing {asset} failed: {source}")]
    Processor {
        asset: String,
        #[source]
        source: ProcessorError,
    },
}

impl BuildError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            BuildError::Cycle { .. } => 2,
            BuildError::Processor { .. } => 4,
            BuildError::Cache(_) | BuildError::Scan(_) | BuildError::Parse(_) | BuildError::Io(_) => 3,
        }
    }
}

/// What happened to one asset during a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Compiled for the first time.
    Created,
    /// Recompiled over a previous build.
    Updated,
    /// Fresh; the cached target was reused.
    Cached,
    /// An external processor failed and the policy is `continue`.
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::Cached => "cached",
            Outcome::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone)]
pub struct AssetReport {
    pub kind: ResourceKind,
    pub source: PathBuf,
    pub language: Option<String>,
    pub partial: bool,
    pub target: Option<PathBuf>,
    pub outcome: Outcome,
    pub error: Option<String>,
}

/// Per-asset outcomes in compile order.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub assets: Vec<AssetReport>,
    /// Sources whose cache rows were pruned because the file is gone.
    pub pruned: Vec<PathBuf>,
}

impl BuildReport {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.assets.iter().filter(|a| a.outcome == outcome).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(Outcome::Failed) > 0
    }

    pub fn find(&self, source: &Path, language: Option<&str>) -> Option<&AssetReport> {
        self.assets
            .iter()
            .find(|a| a.source == source && a.language.as_deref() == language)
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let compiled = self.count(Outcome::Created) + self.count(Outcome::Updated);
        write!(
            f,
            "{} compiled, {} cached",
            compiled,
            self.count(Outcome::Cached)
        )?;
        let failed = self.count(Outcome::Failed);
        if failed > 0 {
            write!(f, ", {failed} failed")?;
        }
        write!(f, " ({} total)", self.assets.len())
    }
}

/// One entry of the planned build order.
#[derive(Debug, Clone)]
pub struct PlannedAsset {
    pub kind: ResourceKind,
    pub source: PathBuf,
    pub language: Option<String>,
    pub partial: bool,
    pub dependencies: usize,
    pub unresolved: Vec<PathBuf>,
}

/// Result of [`check`]: the order a build would compile in.
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub order: Vec<PlannedAsset>,
}

impl CheckReport {
    pub fn unresolved_count(&self) -> usize {
        self.order.iter().map(|a| a.unresolved.len()).sum()
    }
}

/// Run a full incremental build.
pub fn build(ctx: &BuildContext) -> Result<BuildReport, BuildError> {
    let config = &ctx.config;
    let mut cache = BuildCache::open(&config.cache)?;
    let pruned = cache.prune()?;

    let (mut assets, order) = plan(config)?;
    let mut report = BuildReport {
        assets: Vec::with_capacity(order.len()),
        pruned: pruned.into_iter().map(|e| e.source).collect(),
    };

    for id in order {
        match compile_asset(ctx, &mut cache, &mut assets, id) {
            Ok(outcome) => report.assets.push(asset_report(assets.get(id), outcome, None)),
            Err(CompileError::Io(e)) => {
                cache.save()?;
                return Err(e.into());
            }
            Err(CompileError::Processor(e)) => {
                let asset = assets.get(id);
                if config.on_processor_error == ErrorPolicy::Abort {
                    cache.save()?;
                    return Err(BuildError::Processor {
                        asset: asset.to_string(),
                        source: e,
                    });
                }
                log::error!("{asset}: {e}");
                let previous = cache
                    .find(&asset.source, asset.language.as_deref())
                    .map(|entry| entry.target.clone());
                let asset = assets.get_mut(id);
                asset.target = previous;
                report
                    .assets
                    .push(asset_report(asset, Outcome::Failed, Some(e.to_string())));
            }
        }
    }

    cache.save()?;
    Ok(report)
}

/// Discover, parse and order every asset without compiling anything.
pub fn check(ctx: &BuildContext) -> Result<CheckReport, BuildError> {
    let (assets, order) = plan(&ctx.config)?;
    let order = order
        .into_iter()
        .map(|id| {
            let asset = assets.get(id);
            PlannedAsset {
                kind: asset.kind,
                source: asset.source.clone(),
                language: asset.language.clone(),
                partial: asset.partial,
                dependencies: asset.dependencies.len(),
                unresolved: asset.unresolved.clone(),
            }
        })
        .collect();
    Ok(CheckReport { order })
}

fn plan(config: &BuildConfig) -> Result<(AssetCollection, Vec<AssetId>), BuildError> {
    let files = scan::discover(config)?;
    let mut assets = AssetCollection::from_files(&files, config);
    assets.parse_all(config)?;
    let order = resolve::topological_sort(&assets.dependency_graph())
        .map_err(|e| cycle_error(e, &assets))?;
    log::debug!("build order: {} assets", order.len());
    Ok((assets, order))
}

fn cycle_error(err: CycleError, assets: &AssetCollection) -> BuildError {
    BuildError::Cycle {
        assets: err
            .remaining
            .into_iter()
            .map(|id| assets.get(id).to_string())
            .collect(),
    }
}

fn asset_report(asset: &Asset, outcome: Outcome, error: Option<String>) -> AssetReport {
    AssetReport {
        kind: asset.kind,
        source: asset.source.clone(),
        language: asset.language.clone(),
        partial: asset.partial,
        target: asset.target.clone(),
        outcome,
        error,
    }
}

// ============================================================================
// Single asset
// ============================================================================

#[derive(Debug)]
enum CompileError {
    Io(io::Error),
    Processor(ProcessorError),
}

impl From<io::Error> for CompileError {
    fn from(e: io::Error) -> Self {
        CompileError::Io(e)
    }
}

impl From<ProcessorError> for CompileError {
    fn from(e: ProcessorError) -> Self {
        CompileError::Processor(e)
    }
}

fn compile_asset(
    ctx: &BuildContext,
    cache: &mut BuildCache,
    assets: &mut AssetCollection,
    id: AssetId,
) -> Result<Outcome, CompileError> {
    let asset = assets.get(id);
    let entry = cache
        .find(&asset.source, asset.language.as_deref())
        .cloned();

    if !ctx.config.force
        && let Some(entry) = &entry
        && !cache.is_stale(Some(entry), asset, assets)?
    {
        log::info!("{}", outcome_line(Outcome::Cached, asset, &entry.target));
        assets.get_mut(id).target = Some(entry.target.clone());
        return Ok(Outcome::Cached);
    }

    let bytes = produce(ctx, assets, asset)?;
    let target = asset.target_path(&ctx.config)?;

    if let Some(old) = &entry
        && old.target != target
    {
        remove_if_exists(&old.target)?;
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&target, &bytes)?;
    cache.record(asset, &target, &bytes, assets)?;

    let outcome = if entry.is_some() {
        Outcome::Updated
    } else {
        Outcome::Created
    };
    log::info!("{}", outcome_line(outcome, asset, &target));

    let asset = assets.get_mut(id);
    asset.target = Some(target);
    asset.rebuilt = true;
    Ok(outcome)
}

/// Log line for one compiled or reused asset.
fn outcome_line(outcome: Outcome, asset: &Asset, target: &Path) -> String {
    format!("{outcome} {asset} → {}", target.display())
}

/// Final bytes for an asset's target.
fn produce(
    ctx: &BuildContext,
    assets: &AssetCollection,
    asset: &Asset,
) -> Result<Vec<u8>, CompileError> {
    let mut bytes = match asset.content.as_deref() {
        Some(text) => {
            let mut lookup = EvalLookup { ctx, assets, asset };
            expression::render(text, &asset.expressions, &mut lookup).into_bytes()
        }
        None => fs::read(&asset.source)?,
    };
    if asset.kind == ResourceKind::Image {
        return Ok(bytes);
    }

    if asset.needs_transpile() {
        bytes = ctx.processor.run(&bytes, ProcessorStep::TranspileScript)?;
    }
    if ctx.config.minify
        && !asset.partial
        && let Some(step) = minify_step(asset.kind)
    {
        bytes = ctx.processor.run(&bytes, step)?;
    }
    Ok(bytes)
}

fn minify_step(kind: ResourceKind) -> Option<ProcessorStep> {
    match kind {
        ResourceKind::Markup => Some(ProcessorStep::MinifyMarkup),
        ResourceKind::Stylesheet => Some(ProcessorStep::MinifyStylesheet),
        ResourceKind::Script => Some(ProcessorStep::MinifyScript),
        ResourceKind::Image => None,
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

// ============================================================================
// Expression lookups
// ============================================================================

/// Answers lookup macros for one asset being compiled.
struct EvalLookup<'a> {
    ctx: &'a BuildContext,
    assets: &'a AssetCollection,
    asset: &'a Asset,
}

impl EvalLookup<'_> {
    /// Compiled target of the expression's dependency, if it has one.
    fn dependency_target(&self, expr: &Expression) -> Option<(&Asset, &Path)> {
        let dep = self.assets.get(expr.dependency?);
        match &dep.target {
            Some(target) => Some((dep, target.as_path())),
            None => {
                log::warn!("{}: {} has no compiled target", self.asset, dep);
                None
            }
        }
    }

    fn include(&self, expr: &Expression, escaped: bool) -> String {
        let Some((dep, target)) = self.dependency_target(expr) else {
            return String::new();
        };
        let text = match fs::read_to_string(target) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("{}: cannot read {} ({e})", self.asset, dep);
                return String::new();
            }
        };
        if escaped {
            maud::html! { (text) }.into_string()
        } else {
            text
        }
    }

    /// Link to the dependency's target from this asset's target directory.
    fn relative_path(&self, expr: &Expression) -> String {
        let Some((_, target)) = self.dependency_target(expr) else {
            return String::new();
        };
        naming::relative_link(target, &self.asset.target_dir(&self.ctx.config))
    }

    fn url(&self, expr: &Expression) -> String {
        let Some((dep, target)) = self.dependency_target(expr) else {
            return String::new();
        };
        if dep.partial {
            log::warn!("{}: {} is a partial and has no URL", self.asset, dep);
            return String::new();
        }
        cdn_url(&self.ctx.config, target).unwrap_or_else(|| {
            log::warn!(
                "{}: {} is outside the CDN directory {}",
                self.asset,
                target.display(),
                self.ctx.config.cdn.path.display()
            );
            String::new()
        })
    }
}

impl Lookup for EvalLookup<'_> {
    fn lookup(&mut self, expr: &Expression) -> String {
        match &expr.kind {
            MacroKind::Include { escaped, .. } => self.include(expr, *escaped),
            MacroKind::StylesheetUrl { .. }
            | MacroKind::ScriptUrl { .. }
            | MacroKind::ImageUrl { .. } => self.url(expr),
            MacroKind::ImagePath { .. } => self.relative_path(expr),
            MacroKind::ResourceUrl { key } => self.ctx.resource_url(key),
            MacroKind::AppConf { key, filter } => self.ctx.appconf.render(key, filter),
            MacroKind::Translate { key } => {
                i18n::translate(&*self.ctx.translations, key, self.asset.language.as_deref())
            }
            MacroKind::Declare { .. }
            | MacroKind::Display { .. }
            | MacroKind::If(_)
            | MacroKind::Else
            | MacroKind::End => String::new(),
        }
    }
}

/// Public URL of a compiled target: `cdn.url` joined with the target's path
/// relative to `cdn.path`.
pub fn cdn_url(config: &BuildConfig, target: &Path) -> Option<String> {
    let relative = target.strip_prefix(&config.cdn.path).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(format!(
        "{}/{}",
        config.cdn.url.trim_end_matches('/'),
        parts.join("/")
    ))
}
