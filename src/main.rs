use assetsmith::compile::{self, BuildError};
use assetsmith::config::{self, BuildConfig, ConfigError};
use assetsmith::context::BuildContext;
use assetsmith::output;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Config file looked up in the working directory when no roots are given.
const DEFAULT_CONFIG: &str = "assetsmith.toml";

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "assetsmith")]
#[command(about = "Incremental preprocessor for web assets")]
#[command(long_about = "\
Incremental preprocessor for web assets

Expands include, URL, app-config, translation and conditional macros in
markup, stylesheets and scripts, gives public assets cache-busting file
names, and recompiles only what changed since the last build.

Asset layout:

  assets/
  ├── html/
  │   ├── index.html               # Page, compiled once per language
  │   └── _footer.html             # Partial: [%= include footer %]
  ├── stylesheets/
  │   ├── site.css                 # → site-<fingerprint>.css
  │   └── _reset.css               # Partial: /*= include reset.css */
  ├── scripts/
  │   └── app.coffee               # Transpiled → app-<fingerprint>.js
  ├── images/
  │   └── logo.png                 # [%= image_url logo.png %]
  └── build/                       # Cache: cache.json, cache.lock, partials/

Exit codes: 0 ok, 1 configuration error, 2 cyclic dependency,
3 I/O failure (including a busy cache), 4 external processor failure.

Run 'assetsmith gen-config' to generate a documented assetsmith.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Build configuration file (default: ./assetsmith.toml)
    #[arg(long, global = true, conflicts_with_all = ["app_config", "assets", "output"])]
    config: Option<PathBuf>,

    /// Directory holding the app config index.json
    #[arg(long, global = true, requires = "assets")]
    app_config: Option<PathBuf>,

    /// Asset root with html/, stylesheets/, scripts/ and images/
    #[arg(long, global = true, requires = "output")]
    assets: Option<PathBuf>,

    /// Output root for compiled assets
    #[arg(long, global = true, requires = "assets")]
    output: Option<PathBuf>,

    /// Log debug detail
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Recompile every asset regardless of the cache
    #[arg(long, global = true)]
    force: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile all stale assets
    Build,
    /// Resolve the build order and report missing references without writing
    Check,
    /// Print a stock assetsmith.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return ExitCode::SUCCESS;
    }

    let (mut build_config, root) = match resolve_build_config(&cli) {
        Ok(found) => found,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::from(1);
        }
    };
    build_config.force |= cli.force;

    let ctx = match BuildContext::load(build_config) {
        Ok(ctx) => ctx,
        Err(e) => {
            log::error!("app config: {e}");
            return ExitCode::from(1);
        }
    };

    match run(&cli.command, &ctx, &root) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(command: &Command, ctx: &BuildContext, root: &Path) -> Result<ExitCode, BuildError> {
    match command {
        Command::Build => {
            let report = compile::build(ctx)?;
            output::print_build_report(&report, root);
            if report.has_failures() {
                return Ok(ExitCode::from(4));
            }
        }
        Command::Check => {
            let report = compile::check(ctx)?;
            output::print_build_order(&report, root);
        }
        Command::GenConfig => {}
    }
    Ok(ExitCode::SUCCESS)
}

/// Build configuration from the CLI, plus the root paths are shown relative to.
fn resolve_build_config(cli: &Cli) -> Result<(BuildConfig, PathBuf), ConfigError> {
    if let (Some(assets), Some(output)) = (&cli.assets, &cli.output) {
        let config = BuildConfig::for_roots(cli.app_config.as_deref(), assets, output);
        config.validate()?;
        return Ok((config, PathBuf::from(".")));
    }

    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = config::load_config(&path)?;
    let root = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((config, root))
}
