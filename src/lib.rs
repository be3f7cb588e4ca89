//! # assetsmith
//!
//! An incremental web-asset preprocessor. Markup, stylesheets, scripts and
//! images are compiled into a deployable output tree: macros inside text
//! assets are expanded (includes, asset URLs, app configuration,
//! translations, variables and conditionals), public assets get
//! cache-busting file names, and only what changed since the last build is
//! recompiled.
//!
//! # Architecture: One Pass Per Build
//!
//! ```text
//! 1. Discover   source roots        →  file list          (scan)
//! 2. Model      file list           →  AssetCollection    (asset)
//! 3. Parse      asset text          →  expressions + deps (asset, expression)
//! 4. Order      dependency graph    →  build order        (resolve)
//! 5. Compile    each asset in order →  target files       (compile, cache)
//! ```
//!
//! Step 5 consults the [`cache`] before doing any work. A rebuilt asset marks
//! itself, and because dependencies always compile first, every dependent
//! sees the mark and rebuilds too.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`compile`] | Build driver: `build` and `check`, per-asset outcomes, exit codes |
//! | [`expression`] | Macro syntax tables, tokenizer, evaluator with conditional state |
//! | [`variables`] | Typed variable store for `set`/`if`/display macros |
//! | [`asset`] | Asset arena, parsing, dependency references, target paths |
//! | [`resolve`] | Layered topological sort with cycle detection |
//! | [`cache`] | Persistent build cache, staleness rules, pruning, directory lock |
//! | [`naming`] | Partial conventions and decorated target file names |
//! | [`scan`] | Source discovery per resource kind |
//! | [`config`] | `assetsmith.toml` loading, merging over stock defaults, validation |
//! | [`context`] | Per-build bundle of config and collaborators |
//! | [`appconf`] | JSON application config with `__include` merging |
//! | [`i18n`] | Translation store for localized markup |
//! | [`processor`] | External transpile/minify commands |
//! | [`types`] | Resource kinds and their extensions |
//! | [`output`] | CLI output formatting for build and check results |
//!
//! # Design Decisions
//!
//! ## Arena Assets
//!
//! Assets live in a single [`asset::AssetCollection`] and refer to each other
//! by [`asset::AssetId`]. The driver owns the collection for the whole build,
//! so a dependent reads the current target path and rebuilt flag of each
//! dependency directly.
//!
//! ## Deferred Conditionals
//!
//! A guard over an undeclared variable is not an error. The whole block is
//! kept, with its `if`/`else`/`end` macros copied through unchanged, for a
//! runtime templating pass to decide. See [`expression`].
//!
//! ## Dependency Stamps
//!
//! Each cache row remembers the target and output checksum of every
//! dependency it was rendered against. The in-run rebuilt flag cascades a
//! change within one build; the stamps carry it into the next one when a
//! build stops part way. See [`cache`].
//!
//! ## Fresh Fingerprints
//!
//! Every compile of a public stylesheet, script or image gets a new random
//! fingerprint in its file name, even when its bytes are unchanged. Page URLs
//! are never fingerprinted. See [`naming`].

pub mod appconf;
pub mod asset;
pub mod cache;
pub mod compile;
pub mod config;
pub mod context;
pub mod expression;
pub mod i18n;
pub mod naming;
pub mod output;
pub mod processor;
pub mod resolve;
pub mod scan;
pub mod types;
pub mod variables;

#[cfg(test)]
pub(crate) mod test_helpers;
