//! Reference index: flow key → label record, materialized from one
//! reference file.
//!
//! The reference file is streamed in chunks, but the resulting mapping is
//! held in memory for the whole run; its size is bounded by the number of
//! distinct flow keys. Later rows overwrite earlier rows with the same key.

use std::{collections::HashMap, path::Path};

use crate::{
    chunks::{ChunkedReader, RowSource},
    config::DatasetConfig,
    error::{LabelError, Result},
    events::{EventSink, LabelEvent},
    key::{FlowKey, column_positions},
};

/// Label values for one flow key, aligned with [`ReferenceIndex::label_columns`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRecord {
    values: Vec<String>,
}

impl LabelRecord {
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

#[derive(Debug, Clone)]
pub struct ReferenceIndex {
    label_columns: Vec<String>,
    entries: HashMap<FlowKey, LabelRecord>,
    rows_read: usize,
    rows_skipped: usize,
}

impl ReferenceIndex {
    pub fn new(label_columns: Vec<String>) -> Self {
        Self {
            label_columns,
            entries: HashMap::new(),
            rows_read: 0,
            rows_skipped: 0,
        }
    }

    /// Builds the index from `path` using the configured reference key and
    /// label columns.
    pub fn build(path: &Path, config: &DatasetConfig, sink: &dyn EventSink) -> Result<Self> {
        let mut reader = ChunkedReader::open(
            path,
            config.reference_delimiter,
            config.chunk_size,
            config.strict,
            sink,
        )?;
        let index = Self::from_source(&mut reader, config, sink)?;
        reader.finish();
        Ok(index)
    }

    pub fn from_source(
        source: &mut dyn RowSource,
        config: &DatasetConfig,
        sink: &dyn EventSink,
    ) -> Result<Self> {
        let mut required = config.reference_key_columns.clone();
        required.extend(config.label_reference_columns());
        let positions =
            column_positions(source.headers(), &required).map_err(|mut columns| {
                columns.dedup();
                LabelError::MissingColumns {
                    path: source.origin().to_path_buf(),
                    columns,
                }
            })?;
        let (key_positions, label_positions) = positions.split_at(config.reference_key_columns.len());

        let mut index = ReferenceIndex::new(config.label_output_columns());
        while let Some(chunk) = source.next_chunk()? {
            for row in &chunk.rows {
                index.rows_read += 1;
                let Some(key) = FlowKey::from_row(row, key_positions) else {
                    index.rows_skipped += 1;
                    continue;
                };
                let values = label_positions
                    .iter()
                    .map(|idx| clean_label(row.get(*idx).map(String::as_str).unwrap_or("")))
                    .collect();
                index.insert(key, LabelRecord { values });
            }
        }

        sink.emit(LabelEvent::IndexBuilt {
            path: source.origin().to_path_buf(),
            keys: index.len(),
            rows: index.rows_read,
            skipped: index.rows_skipped,
        });
        Ok(index)
    }

    /// Inserts a record, replacing any earlier record for the same key.
    pub fn insert(&mut self, key: FlowKey, record: LabelRecord) -> Option<LabelRecord> {
        self.entries.insert(key, record)
    }

    pub fn lookup(&self, key: &FlowKey) -> Option<&LabelRecord> {
        self.entries.get(key)
    }

    pub fn label(&self, key: &FlowKey, column: &str) -> Option<&str> {
        let position = self.label_columns.iter().position(|c| c == column)?;
        self.lookup(key)
            .and_then(|record| record.values.get(position))
            .map(String::as_str)
    }

    pub fn label_columns(&self) -> &[String] {
        &self.label_columns
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    pub fn rows_skipped(&self) -> usize {
        self.rows_skipped
    }
}

/// Label values keep their text but lose the quoting left behind by earlier
/// exports.
pub(crate) fn clean_label(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| c == '"' || c == '\'')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chunks::MemorySource, config, events::RecordingSink};
    use proptest::prelude::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn lookup_config() -> DatasetConfig {
        config::validate(
            &json!({
                "target_key_columns": ["src_ip", "dst_ip"],
                "reference_key_columns": ["saddr", "daddr"],
                "column_mapping": {},
                "columns_to_copy": ["attack", "category", "subcategory"],
                "labeling_files": {},
                "chunk_size": 2
            }),
            "Bot-IoT",
        )
        .expect("valid config")
    }

    #[test]
    fn build_indexes_quoted_keys_and_skips_partial_rows() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("Keylogging.csv");
        fs::write(
            &path,
            "saddr;daddr;attack;category;subcategory\n\
             \"192.168.100.147\";\"192.168.100.3\";1;Theft;Keylogging\n\
             \"192.168.100.150\";;1;Theft;Keylogging\n\
             192.168.100.147;192.168.100.5;0;Normal;Normal\n",
        )
        .expect("write reference");
        let sink = RecordingSink::new();
        let index = ReferenceIndex::build(&path, &lookup_config(), &sink).expect("build index");

        assert_eq!(index.len(), 2);
        assert_eq!(index.rows_read(), 3);
        assert_eq!(index.rows_skipped(), 1);
        let key = FlowKey::from_parts(["192.168.100.147", "192.168.100.3"]).expect("key");
        assert_eq!(index.label(&key, "subcategory"), Some("Keylogging"));
        assert_eq!(sink.count("index_built"), 1);
    }

    #[test]
    fn later_rows_overwrite_earlier_rows() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("DDoS.csv");
        fs::write(
            &path,
            "saddr;daddr;attack;category;subcategory\n\
             10.0.0.1;10.0.0.2;1;DDoS;TCP\n\
             10.0.0.9;10.0.0.2;1;DDoS;UDP\n\
             10.0.0.1;10.0.0.2;1;DoS;HTTP\n",
        )
        .expect("write reference");
        let index =
            ReferenceIndex::build(&path, &lookup_config(), &RecordingSink::new()).expect("build");
        let key = FlowKey::from_parts(["10.0.0.1", "10.0.0.2"]).expect("key");
        assert_eq!(index.label(&key, "category"), Some("DoS"));
        assert_eq!(index.label(&key, "subcategory"), Some("HTTP"));
    }

    #[test]
    fn missing_key_column_is_named() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("Theft.csv");
        fs::write(&path, "saddr;attack;category;subcategory\n1.1.1.1;1;Theft;Data\n")
            .expect("write reference");
        let err = ReferenceIndex::build(&path, &lookup_config(), &RecordingSink::new())
            .expect_err("daddr missing");
        match err {
            LabelError::MissingColumns { columns, .. } => assert_eq!(columns, vec!["daddr"]),
            other => panic!("unexpected error {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn index_holds_the_last_record_per_key(
            rows in proptest::collection::vec((0u8..4, 0u8..4, "[A-Za-z]{1,8}"), 1..40)
        ) {
            let table: Vec<Vec<String>> = rows
                .iter()
                .map(|(src, dst, label)| {
                    vec![
                        format!("10.0.0.{src}"),
                        format!("10.0.1.{dst}"),
                        "1".to_string(),
                        label.clone(),
                        label.clone(),
                    ]
                })
                .collect();
            let mut source = MemorySource::new(
                ["saddr", "daddr", "attack", "category", "subcategory"]
                    .iter()
                    .map(|h| h.to_string())
                    .collect(),
                table,
                7,
            );
            let index = ReferenceIndex::from_source(&mut source, &lookup_config(), &RecordingSink::new())
                .expect("index");
            for (src, dst, _) in &rows {
                let last = rows
                    .iter()
                    .rev()
                    .find(|(s, d, _)| s == src && d == dst)
                    .map(|(_, _, label)| label.as_str());
                let key = FlowKey::from_parts([format!("10.0.0.{src}"), format!("10.0.1.{dst}")])
                    .expect("key");
                prop_assert_eq!(index.label(&key, "category"), last);
            }
        }
    }
}
