pub mod chunks;
pub mod cli;
pub mod config;
pub mod counts;
pub mod engine;
pub mod error;
pub mod events;
pub mod index;
pub mod io_utils;
pub mod join;
pub mod key;
pub mod label;
pub mod resolver;
pub mod table;
pub mod writer;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands, SourceArgs},
    config::DatasetConfig,
    events::LogSink,
    resolver::LabelCatalogue,
    table::Align,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging(debug: bool) {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            let level = if debug {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            };
            builder.filter_module("flow_labeler", level);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);
    match cli.command {
        Commands::Label(args) => handle_label(&args),
        Commands::Batch(args) => handle_batch(&args),
        Commands::Counts(args) => handle_counts(&args),
    }
}

fn load_sources(
    source: &SourceArgs,
    overrides: &cli::OverrideArgs,
) -> Result<(DatasetConfig, LabelCatalogue)> {
    let mut config = config::load_config(&source.config, &source.dataset)
        .with_context(|| format!("Loading configuration from {:?}", source.config))?;
    config.apply_overrides(&overrides.to_overrides());
    debug!(
        "Dataset '{}': {:?} mode, key {:?} -> {:?}, default label '{}'",
        config.dataset,
        config.mode,
        config.target_key_columns,
        config.reference_key_columns,
        config.default_label
    );
    let catalogue = LabelCatalogue::scan(&source.labels_dir)?;
    if catalogue.is_empty() {
        warn!("No reference label files found in {:?}", catalogue.root());
    }
    Ok((config, catalogue))
}

fn handle_label(args: &cli::LabelArgs) -> Result<()> {
    let (config, catalogue) = load_sources(&args.source, &args.overrides)?;
    info!(
        "Labeling '{}' using delimiter '{}'",
        args.data_file.display(),
        printable_delimiter(config.target_delimiter)
    );
    let summary = label::label_file(&args.data_file, &catalogue, &config, &args.output, &LogSink)?;
    info!(
        "Labeled output for {} row(s) written to {:?}",
        summary.rows_written, summary.output
    );
    Ok(())
}

fn handle_batch(args: &cli::BatchArgs) -> Result<()> {
    let (config, catalogue) = load_sources(&args.source, &args.overrides)?;
    let summary =
        label::label_directory(&args.target_dir, &catalogue, &config, &args.output_dir, &LogSink)?;
    if summary.is_success() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} of {} target(s) failed to label",
            summary.failed.len(),
            summary.failed.len() + summary.labeled.len()
        ))
    }
}

fn handle_counts(args: &cli::CountsArgs) -> Result<()> {
    let columns = args
        .columns
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| c.to_string())
        .collect::<Vec<_>>();
    let rows = counts::compute_label_counts(args.inputs.as_slice(), &columns, args.top, &LogSink)?;
    let headers = ["column", "value", "count", "percent"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    table::print_table(
        &headers,
        &rows,
        &[Align::Left, Align::Left, Align::Right, Align::Right],
    );
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
