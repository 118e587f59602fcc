//! # fieldmap-cli
//!
//! Runs YAML mapping definitions over JSON documents.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use fieldmap_mapping::{FieldMapper, MappingDefinition, MappingDsl};
use fieldmap_model::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fieldmap")]
#[command(about = "Field mapping engine CLI")]
#[command(version)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
enum Commands {
    /// Map a JSON source document onto a target document
    Map {
        /// Mapping file path
        #[arg(short, long)]
        mapping: PathBuf,

        /// Source JSON file path
        #[arg(short, long)]
        source: PathBuf,

        /// Existing target JSON to map onto; an empty target is created
        /// when omitted
        #[arg(short, long)]
        target: Option<PathBuf>,

        /// Output file path; the result is printed when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a mapping file
    Check {
        /// Mapping file path
        #[arg(short, long)]
        mapping: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Map {
            mapping,
            source,
            target,
            output,
        } => run_map(&mapping, &source, target.as_deref(), output.as_deref()),
        Commands::Check { mapping } => run_check(&mapping),
    }
}

fn run_map(
    mapping: &Path,
    source: &Path,
    target: Option<&Path>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let definition = load_definition(mapping)?;
    let mapper = definition
        .build()
        .with_context(|| format!("Invalid mapping {}", mapping.display()))?;
    tracing::info!(mapping = %definition.name, source = %source.display(), "Mapping");

    let source = mapper
        .bind_source(read_json(source)?)
        .context("Source document does not match the declared source type")?;
    let target = match target {
        Some(path) => bind_target(&mapper, read_json(path)?)?,
        None => mapper.new_target(),
    };

    let mapped = mapper.map(&source, target)?;
    let rendered = serde_json::to_string_pretty(&mapped.to_json())?;

    match output {
        Some(path) => {
            fs::write(path, format!("{rendered}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(output = %path.display(), "Wrote mapped document");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn run_check(mapping: &Path) -> anyhow::Result<()> {
    let definition = load_definition(mapping)?;
    let types = definition
        .type_registry()
        .with_context(|| format!("Invalid types in {}", mapping.display()))?;
    let mapper = definition
        .build()
        .with_context(|| format!("Invalid mapping {}", mapping.display()))?;

    println!("Mapping '{}' is valid", definition.name);
    println!(
        "  types: {} -> {}",
        mapper.source_type().unwrap_or("*"),
        mapper.target_type().unwrap_or("*")
    );
    println!("  declared types: {}", types.len());
    println!("  rules: {}", mapper.entries().len());
    for entry in mapper.entries() {
        println!("    {entry}");
    }
    println!(
        "  auto-mapping: {}",
        if mapper.is_auto_mapping_enabled() { "on" } else { "off" }
    );
    println!("  failure policy: {:?}", mapper.failure_policy());
    Ok(())
}

fn load_definition(path: &Path) -> anyhow::Result<MappingDefinition> {
    MappingDsl::parse_file(path).with_context(|| format!("Failed to load mapping {}", path.display()))
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    Ok(Value::from(json))
}

fn bind_target(mapper: &FieldMapper, target: Value) -> anyhow::Result<Value> {
    match mapper.target_type() {
        Some(name) if mapper.type_registry().contains(name) => mapper
            .type_registry()
            .instantiate(name, target)
            .context("Target document does not match the declared target type"),
        _ => Ok(target),
    }
}
