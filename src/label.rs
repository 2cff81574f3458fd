//! End-to-end labeling of target files: resolve, index, label, write.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use log::{info, warn};

use crate::{
    chunks::{ChunkedReader, RowSource},
    config::DatasetConfig,
    engine::{LabelingEngine, ReferenceData},
    error::LabelError,
    events::{EventSink, LabelEvent},
    io_utils,
    resolver::{self, LabelCatalogue},
    writer,
};

const OUTPUT_PREFIX: &str = "labeled_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSummary {
    pub target: PathBuf,
    pub reference: PathBuf,
    pub rows_read: usize,
    pub rows_written: usize,
    pub rows_matched: usize,
    pub rows_missing_key: usize,
    pub rows_malformed: usize,
    pub output: PathBuf,
    pub compressed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub labeled: Vec<LabelSummary>,
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Labels one target file against the reference the catalogue resolves for it.
pub fn label_file(
    target: &Path,
    catalogue: &LabelCatalogue,
    config: &DatasetConfig,
    output: &Path,
    sink: &dyn EventSink,
) -> Result<LabelSummary> {
    label_target(target, catalogue, config, output, sink)
        .with_context(|| format!("Labeling {target:?}"))
}

fn label_target(
    target: &Path,
    catalogue: &LabelCatalogue,
    config: &DatasetConfig,
    output: &Path,
    sink: &dyn EventSink,
) -> std::result::Result<LabelSummary, LabelError> {
    if !target.is_file() {
        return Err(LabelError::io(
            target,
            std::io::Error::new(std::io::ErrorKind::NotFound, "target file does not exist"),
        ));
    }
    let target_name = target
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    let reference = resolver::resolve(target_name, catalogue, config, sink)?;
    let data = ReferenceData::load(&reference, config, sink)?;

    let mut reader = ChunkedReader::open(
        target,
        config.target_delimiter,
        config.chunk_size,
        config.strict,
        sink,
    )?;
    let dataset = LabelingEngine::new(config, sink).label(&mut reader, &data)?;
    let malformed = reader.malformed();
    reader.finish();

    let written = writer::write_dataset(&dataset, output, config, sink)?;
    let summary = LabelSummary {
        target: target.to_path_buf(),
        reference,
        rows_read: dataset.stats.rows_read,
        rows_written: written.rows,
        rows_matched: dataset.stats.rows_matched,
        rows_missing_key: dataset.stats.rows_missing_key,
        rows_malformed: malformed,
        output: written.path,
        compressed: written.compressed,
    };
    info!(
        "Labeled {:?}: {} of {} row(s) matched, {} without a complete key, {} malformed",
        summary.target,
        summary.rows_matched,
        summary.rows_read,
        summary.rows_missing_key,
        summary.rows_malformed
    );
    Ok(summary)
}

/// Labels every CSV file in `target_dir` sequentially. Failures that concern a
/// single target are recorded and the batch moves on; anything else aborts.
pub fn label_directory(
    target_dir: &Path,
    catalogue: &LabelCatalogue,
    config: &DatasetConfig,
    output_dir: &Path,
    sink: &dyn EventSink,
) -> Result<BatchSummary> {
    let targets = list_targets(target_dir)?;
    if targets.is_empty() {
        warn!("No CSV files found in {target_dir:?}");
    }
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Creating output directory {output_dir:?}"))?;

    let mut summary = BatchSummary::default();
    for target in targets {
        let name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output = output_dir.join(format!("{OUTPUT_PREFIX}{name}"));
        match label_target(&target, catalogue, config, &output, sink) {
            Ok(labeled) => summary.labeled.push(labeled),
            Err(err) if err.is_per_target() => {
                sink.emit(LabelEvent::TargetFailed {
                    target: target.clone(),
                    reason: err.to_string(),
                });
                summary.failed.push((target, err.to_string()));
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Labeling {target:?}"));
            }
        }
    }
    info!(
        "Batch complete: {} labeled, {} failed",
        summary.labeled.len(),
        summary.failed.len()
    );
    Ok(summary)
}

fn list_targets(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(anyhow!(LabelError::Directory {
            path: dir.to_path_buf(),
        }));
    }
    let mut targets = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Listing {dir:?}"))? {
        let path = entry.with_context(|| format!("Listing {dir:?}"))?.path();
        let plain = io_utils::strip_gzip_extension(&path);
        let is_csv = plain
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if path.is_file() && is_csv {
            targets.push(path);
        }
    }
    targets.sort();
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config, events::RecordingSink};
    use serde_json::json;
    use tempfile::tempdir;

    fn config() -> DatasetConfig {
        config::validate(
            &json!({
                "target_key_columns": ["src_ip", "dst_ip"],
                "reference_key_columns": ["saddr", "daddr"],
                "column_mapping": {},
                "columns_to_copy": ["attack", "category", "subcategory"],
                "labeling_files": {}
            }),
            "Bot-IoT",
        )
        .expect("valid config")
    }

    #[test]
    fn label_file_reports_summary() {
        let dir = tempdir().expect("temp dir");
        let labels = dir.path().join("labels");
        fs::create_dir(&labels).expect("labels dir");
        fs::write(
            labels.join("Keylogging.csv"),
            "saddr;daddr;attack;category;subcategory\n1.1.1.1;2.2.2.2;1;Theft;Keylogging\n",
        )
        .expect("reference");
        let target = dir.path().join("IoT_Keylogging__00002.csv");
        fs::write(&target, "src_ip,dst_ip\n1.1.1.1,2.2.2.2\n3.3.3.3,2.2.2.2\n").expect("target");

        let catalogue = LabelCatalogue::scan(&labels).expect("catalogue");
        let output = dir.path().join("out").join("labeled.csv");
        let summary = label_file(&target, &catalogue, &config(), &output, &RecordingSink::new())
            .expect("labeled");
        assert_eq!(summary.reference, labels.join("Keylogging.csv"));
        assert_eq!(summary.rows_read, 2);
        assert_eq!(summary.rows_matched, 1);
        assert!(!summary.compressed);
        let text = fs::read_to_string(&output).expect("output");
        assert_eq!(
            text,
            "src_ip,dst_ip,attack,category,subcategory\n\
             1.1.1.1,2.2.2.2,1,Theft,Keylogging\n\
             3.3.3.3,2.2.2.2,Unclear,Unclear,Unclear\n"
        );
    }

    #[test]
    fn batch_records_unresolved_targets_and_continues() {
        let dir = tempdir().expect("temp dir");
        let labels = dir.path().join("labels");
        let targets = dir.path().join("targets");
        fs::create_dir(&labels).expect("labels dir");
        fs::create_dir(&targets).expect("targets dir");
        fs::write(
            labels.join("DDoS.csv"),
            "saddr;daddr;attack;category;subcategory\n1.1.1.1;2.2.2.2;1;DDoS;TCP\n",
        )
        .expect("reference");
        fs::write(targets.join("DDoS_TCP_1.csv"), "src_ip,dst_ip\n1.1.1.1,2.2.2.2\n")
            .expect("target");
        fs::write(targets.join("Benign_1.csv"), "src_ip,dst_ip\n1.1.1.1,2.2.2.2\n")
            .expect("target");

        let catalogue = LabelCatalogue::scan(&labels).expect("catalogue");
        let sink = RecordingSink::new();
        let out = dir.path().join("out");
        let summary =
            label_directory(&targets, &catalogue, &config(), &out, &sink).expect("batch ran");
        assert_eq!(summary.labeled.len(), 1);
        assert_eq!(summary.failed.len(), 1);
        assert!(!summary.is_success());
        assert!(out.join("labeled_DDoS_TCP_1.csv").is_file());
        assert_eq!(sink.count("target_failed"), 1);
    }
}
