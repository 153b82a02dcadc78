//! Normalize a GISAID ndjson export into metadata and sequence files.

use clap::Parser;
use ncov_ingest::logging::init_logging;
use ncov_ingest::{
    Annotations, GeoRules, GisaidOutputs, NdjsonSource, Result, TransformConfig, chain_all,
    drain, gisaid_stages,
};
use std::path::PathBuf;
use std::process;
use std::rc::Rc;
use tracing::{error, info, warn};

/// Transform a GISAID ndjson export into a metadata table and a FASTA file.
#[derive(Parser)]
#[command(name = "transform-gisaid")]
struct Cli {
    /// GISAID ndjson input, or - for stdin
    input: PathBuf,

    /// Metadata output (delimited text)
    #[arg(long)]
    output_metadata: PathBuf,

    /// FASTA output
    #[arg(long)]
    output_fasta: Option<PathBuf>,

    /// Location hierarchy output (TSV)
    #[arg(long)]
    output_hierarchy: Option<PathBuf>,

    /// Per-record overrides: id, field, value separated by tabs
    #[arg(long)]
    annotations: Option<PathBuf>,

    /// Location substitution rules
    #[arg(long)]
    geo_rules: Option<PathBuf>,

    /// TOML file overriding the built-in configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Drop sequences shorter than this
    #[arg(long)]
    min_length: Option<usize>,

    /// Log stage details on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => TransformConfig::load(path)?,
        None => TransformConfig::default(),
    };
    if cli.min_length.is_some() {
        config.min_length = cli.min_length;
    }

    let annotations = Rc::new(match &cli.annotations {
        Some(path) => Annotations::load(path)?,
        None => Annotations::new(),
    });
    let rules = Rc::new(match &cli.geo_rules {
        Some(path) => GeoRules::load(path)?,
        None => GeoRules::new(),
    });

    let outputs = GisaidOutputs {
        metadata: cli.output_metadata.clone(),
        fasta: cli.output_fasta.clone(),
        hierarchy: cli.output_hierarchy.clone(),
    };
    let stages = gisaid_stages(&config, Rc::clone(&annotations), Rc::clone(&rules), &outputs)?;
    let mut chain = chain_all(NdjsonSource::from_path(&cli.input), stages);

    let count = drain(&mut chain)?;
    info!(records = count, output = %cli.output_metadata.display(), "transform complete");

    for id in annotations.unused_annotations() {
        warn!(id = %id, "annotation never matched a record");
    }
    for rule in rules.unused_rules() {
        warn!(rule = %rule.join("/"), "geo rule never applied");
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        error!("{e}");
        process::exit(1);
    }
}
