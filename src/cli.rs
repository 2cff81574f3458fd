//! Command-line surface for the `label`, `batch` and `counts` commands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{CompressionPolicy, Overrides};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Label network-flow CSV captures from reference label files",
    long_about = None
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Label one target CSV file
    Label(LabelArgs),
    /// Label every CSV file in a directory
    Batch(BatchArgs),
    /// Count label values in one or more labeled files
    Counts(CountsArgs),
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Directory holding the reference label files
    #[arg(short = 'l', long = "labels-dir")]
    pub labels_dir: PathBuf,
    /// JSON configuration file with a `datasets` map
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,
    /// Dataset type to look up in the configuration
    #[arg(short = 't', long = "dataset")]
    pub dataset: String,
}

#[derive(Debug, Args, Default)]
pub struct OverrideArgs {
    /// Label written to rows without a reference match (config default: Unclear)
    #[arg(long = "default-label")]
    pub default_label: Option<String>,
    /// Target file delimiter (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Reference file delimiter
    #[arg(long = "reference-delimiter", value_parser = parse_delimiter)]
    pub reference_delimiter: Option<u8>,
    /// Output delimiter (defaults to the target delimiter)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Rows read per chunk
    #[arg(long = "chunk-size")]
    pub chunk_size: Option<usize>,
    /// Fail on the first malformed row instead of skipping it
    #[arg(long)]
    pub strict: bool,
    /// Output compression policy
    #[arg(long, value_enum)]
    pub compression: Option<CompressionPolicy>,
    /// Row count above which `auto` compression gzips the output
    #[arg(long = "compression-threshold")]
    pub compression_threshold: Option<usize>,
}

impl OverrideArgs {
    pub fn to_overrides(&self) -> Overrides {
        Overrides {
            default_label: self.default_label.clone(),
            target_delimiter: self.delimiter,
            reference_delimiter: self.reference_delimiter,
            output_delimiter: self.output_delimiter,
            chunk_size: self.chunk_size,
            strict: self.strict,
            compression: self.compression,
            compression_threshold: self.compression_threshold,
        }
    }
}

#[derive(Debug, Args)]
pub struct LabelArgs {
    /// Target CSV file to label
    #[arg(short = 'i', long = "data-file")]
    pub data_file: PathBuf,
    #[command(flatten)]
    pub source: SourceArgs,
    /// Output file path
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Directory of target CSV files
    #[arg(short = 'd', long = "target-dir")]
    pub target_dir: PathBuf,
    #[command(flatten)]
    pub source: SourceArgs,
    /// Directory receiving `labeled_<name>` outputs
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: PathBuf,
    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Debug, Args)]
pub struct CountsArgs {
    /// Labeled CSV files to inspect
    #[arg(short = 'i', long = "input", required = true, action = clap::ArgAction::Append)]
    pub inputs: Vec<PathBuf>,
    /// Label columns to count
    #[arg(
        short = 'C',
        long = "columns",
        value_delimiter = ',',
        default_value = "attack,category,subcategory"
    )]
    pub columns: Vec<String>,
    /// Keep only the most frequent N values per column (0 keeps all)
    #[arg(long, default_value_t = 0)]
    pub top: usize,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_delimiter_accepts_names_and_characters() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("semicolon"), Ok(b';'));
        assert_eq!(parse_delimiter(":"), Ok(b':'));
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter(";;").is_err());
        assert!(parse_delimiter("§").is_err());
    }

    #[test]
    fn label_arguments_parse_with_overrides() {
        let cli = Cli::try_parse_from([
            "flow-labeler",
            "label",
            "-i",
            "IoT_Keylogging.csv",
            "-l",
            "labels",
            "-c",
            "config.json",
            "-t",
            "Bot-IoT",
            "-o",
            "out.csv",
            "--default-label",
            "benign",
            "--compression",
            "never",
            "--debug",
        ])
        .expect("valid arguments");
        assert!(cli.debug);
        let Commands::Label(args) = cli.command else {
            panic!("expected label command");
        };
        let overrides = args.overrides.to_overrides();
        assert_eq!(overrides.default_label.as_deref(), Some("benign"));
        assert_eq!(overrides.compression, Some(CompressionPolicy::Never));
        assert_eq!(args.source.dataset, "Bot-IoT");
    }
}
