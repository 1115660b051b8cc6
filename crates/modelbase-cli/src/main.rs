//! Modelbase CLI
//!
//! The `modelbase` command builds catalog artifacts from layer files and
//! queries them under a load configuration.
//!
//! ## Commands
//!
//! - `build`: merge layer files into a packaged dataset
//! - `inspect`: load a dataset and report what the filter keeps
//! - `lookup`: resolve a `provider:model` spec (aliases included)
//! - `select`: first model matching capability predicates
//! - `candidates`: every model matching capability predicates

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use modelbase_core::{
    read_artifact_if_present, write_artifact, BuildPipeline, Catalog, JsonFileSource, LayerSource,
    LoadConfig, LoadOutcome, SelectQuery, Snapshot,
};

#[derive(Parser)]
#[command(name = "modelbase")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Layered provider/model catalog", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where to load the catalog from.
#[derive(Args, Debug, Clone)]
struct LoadArgs {
    /// Packaged dataset (missing file serves an empty catalog)
    #[arg(short, long, default_value = "modelbase.json")]
    dataset: PathBuf,

    /// Load configuration (TOML, or JSON by extension)
    #[arg(short, long, env = "MODELBASE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct QueryArgs {
    /// Capability that must hold (`tools`, `json_strict:true`, ...)
    #[arg(long = "require", value_name = "PREDICATE")]
    require: Vec<String>,

    /// Capability that must not hold
    #[arg(long = "forbid", value_name = "PREDICATE")]
    forbid: Vec<String>,

    /// Provider scan order, overriding the configured prefer list
    #[arg(long, value_delimiter = ',')]
    prefer: Vec<String>,

    /// Only scan this provider
    #[arg(long)]
    scope: Option<String>,

    /// Skip deprecated models
    #[arg(long)]
    exclude_deprecated: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge layer files (lowest precedence first) into a dataset artifact
    Build {
        /// Layer file (JSON); repeat in precedence order
        #[arg(short, long = "layer", required = true)]
        layers: Vec<PathBuf>,

        /// Output artifact path
        #[arg(short, long, default_value = "modelbase.json")]
        output: PathBuf,
    },

    /// Load a dataset and report provider/model counts
    Inspect {
        #[command(flatten)]
        load: LoadArgs,
    },

    /// Resolve a `provider:model` spec
    Lookup {
        spec: String,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// Print the first model matching the query
    Select {
        #[command(flatten)]
        query: QueryArgs,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// Print every model matching the query, in scan order
    Candidates {
        #[command(flatten)]
        query: QueryArgs,

        #[command(flatten)]
        load: LoadArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    modelbase_core::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Build { layers, output } => cmd_build(&layers, &output).await,
        Commands::Inspect { load } => cmd_inspect(&load),
        Commands::Lookup { spec, load } => cmd_lookup(&load, &spec),
        Commands::Select { query, load } => cmd_select(&load, &query),
        Commands::Candidates { query, load } => cmd_candidates(&load, &query),
    };
    modelbase_core::metrics::METRICS.flush();
    result
}

/// Build an artifact from layer files
async fn cmd_build(layers: &[PathBuf], output: &Path) -> Result<()> {
    let sources: Vec<Box<dyn LayerSource>> = layers
        .iter()
        .map(|path| Box::new(JsonFileSource::new(path)) as Box<dyn LayerSource>)
        .collect();

    let built = BuildPipeline::new()
        .build_from_sources(&sources)
        .await
        .context("Failed to read layers")?;

    write_artifact(&built.dataset, output)
        .with_context(|| format!("Failed to write artifact: {:?}", output))?;

    println!("Wrote {}", output.display());
    println!("  providers: {}", built.dataset.provider_count());
    println!("  models:    {}", built.dataset.model_count());
    println!("  dropped:   {}", built.report.dropped);
    println!("  excluded:  {}", built.report.excluded.len());
    println!("  aliases excluded: {}", built.report.aliases_excluded);
    println!("  digest:    {}", built.dataset.source_digest);
    if !built.report.viability.is_viable() {
        println!("warning: dataset contains no models");
    }
    Ok(())
}

/// Load the configured dataset into a fresh catalog.
fn load_catalog(args: &LoadArgs) -> Result<Arc<Snapshot>> {
    let config = match &args.config {
        Some(path) => LoadConfig::from_path(path)
            .with_context(|| format!("Failed to read load config: {:?}", path))?,
        None => LoadConfig::default(),
    };
    let dataset = read_artifact_if_present(&args.dataset)
        .with_context(|| format!("Failed to read dataset: {:?}", args.dataset))?;

    let catalog = Catalog::new();
    let outcome = catalog.load(dataset.map(Arc::new), &config)?;
    if let LoadOutcome::Fallback { .. } = outcome {
        eprintln!(
            "warning: no dataset at {}; serving an empty catalog",
            args.dataset.display()
        );
    }
    info!(version = outcome.version(), "catalog loaded");
    catalog
        .snapshot()
        .context("Catalog has no published snapshot")
}

#[derive(Serialize)]
struct InspectReport<'a> {
    providers: usize,
    models: usize,
    aliases: usize,
    digest: &'a str,
    filter: String,
    warnings: Vec<String>,
}

fn cmd_inspect(args: &LoadArgs) -> Result<()> {
    let snapshot = load_catalog(args)?;
    let meta = snapshot.meta();
    let report = InspectReport {
        providers: meta.providers,
        models: meta.models,
        aliases: snapshot.alias_count(),
        digest: &meta.digest,
        filter: snapshot.filter().summary(),
        warnings: snapshot
            .filter()
            .warnings()
            .iter()
            .map(ToString::to_string)
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_lookup(args: &LoadArgs, spec: &str) -> Result<()> {
    let snapshot = load_catalog(args)?;
    let model = snapshot
        .lookup_spec(spec)
        .with_context(|| format!("Lookup failed for '{}'", spec))?;
    println!("{}", serde_json::to_string_pretty(model.as_ref())?);
    Ok(())
}

fn build_query(args: &QueryArgs) -> SelectQuery {
    let mut query = SelectQuery::new().exclude_deprecated(args.exclude_deprecated);
    for predicate in &args.require {
        query = query.require(predicate.as_str());
    }
    for predicate in &args.forbid {
        query = query.forbid(predicate.as_str());
    }
    if !args.prefer.is_empty() {
        query = query.prefer(args.prefer.iter().cloned());
    }
    if let Some(scope) = &args.scope {
        query = query.scope(scope.clone());
    }
    query
}

fn cmd_select(args: &LoadArgs, query: &QueryArgs) -> Result<()> {
    let snapshot = load_catalog(args)?;
    match snapshot.select(&build_query(query)) {
        Some(key) => println!("{}", key),
        None => println!("No matching model"),
    }
    Ok(())
}

fn cmd_candidates(args: &LoadArgs, query: &QueryArgs) -> Result<()> {
    let snapshot = load_catalog(args)?;
    let matches = snapshot.candidates(&build_query(query));
    if matches.is_empty() {
        println!("No matching models");
    }
    for key in matches {
        println!("{}", key);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn query_args_map_onto_select_query() {
        let args = QueryArgs {
            require: vec!["tools".into()],
            forbid: vec!["reasoning".into()],
            prefer: vec!["anthropic".into(), "openai".into()],
            scope: None,
            exclude_deprecated: true,
        };
        let query = build_query(&args);
        assert_eq!(query.require.len(), 1);
        assert_eq!(query.forbid.len(), 1);
        assert_eq!(
            query.prefer,
            Some(vec!["anthropic".to_string(), "openai".to_string()])
        );
        assert!(query.exclude_deprecated);
    }

    #[tokio::test]
    async fn build_then_lookup_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layer = dir.path().join("base.json");
        std::fs::write(
            &layer,
            r#"{"providers": [{"id": "openai", "models": [{"id": "gpt-4", "aliases": ["gpt4"]}]}]}"#,
        )
        .expect("write layer");
        let artifact = dir.path().join("out/modelbase.json");

        cmd_build(&[layer], &artifact).await.expect("build");

        let load = LoadArgs {
            dataset: artifact,
            config: None,
        };
        let snapshot = load_catalog(&load).expect("load");
        let model = snapshot.lookup_spec("openai:gpt4").expect("alias resolves");
        assert_eq!(model.model_id, "gpt-4");
    }

    #[test]
    fn missing_dataset_serves_empty_catalog() {
        let dir = tempfile::tempdir().expect("tempdir");
        let load = LoadArgs {
            dataset: dir.path().join("absent.json"),
            config: None,
        };
        let snapshot = load_catalog(&load).expect("fallback load");
        assert!(snapshot.is_empty());
    }
}
