//! Row labeling engine.
//!
//! The target dataset is consumed chunk by chunk and every chunk is labeled
//! against the reference data loaded for the run. Chunks are concatenated in
//! the order they were read, so output order is the target's row order (with
//! join-mode expansions kept adjacent to the row that produced them).

use std::path::Path;

use crate::{
    chunks::RowSource,
    config::{DatasetConfig, LabelMode},
    error::{LabelError, Result, Side},
    events::{EventSink, LabelEvent},
    index::ReferenceIndex,
    join::{JoinTable, build_output_headers},
    key::{self, FlowKey, column_positions},
};

/// Reference data in the shape the configured mode needs.
#[derive(Debug, Clone)]
pub enum ReferenceData {
    Index(ReferenceIndex),
    Join(JoinTable),
}

impl ReferenceData {
    pub fn load(path: &Path, config: &DatasetConfig, sink: &dyn EventSink) -> Result<Self> {
        match config.mode {
            LabelMode::Lookup => ReferenceIndex::build(path, config, sink).map(ReferenceData::Index),
            LabelMode::Join => JoinTable::build(path, config, sink).map(ReferenceData::Join),
        }
    }

    pub fn from_source(
        source: &mut dyn RowSource,
        config: &DatasetConfig,
        sink: &dyn EventSink,
    ) -> Result<Self> {
        match config.mode {
            LabelMode::Lookup => {
                ReferenceIndex::from_source(source, config, sink).map(ReferenceData::Index)
            }
            LabelMode::Join => JoinTable::from_source(source, config, sink).map(ReferenceData::Join),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelStats {
    pub rows_read: usize,
    pub rows_written: usize,
    /// Target rows that found at least one reference match.
    pub rows_matched: usize,
    pub rows_missing_key: usize,
    pub rows_malformed: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone)]
pub struct LabeledDataset {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub stats: LabelStats,
}

impl LabeledDataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

pub struct LabelingEngine<'a> {
    config: &'a DatasetConfig,
    sink: &'a dyn EventSink,
}

impl<'a> LabelingEngine<'a> {
    pub fn new(config: &'a DatasetConfig, sink: &'a dyn EventSink) -> Self {
        Self { config, sink }
    }

    /// Labels every row of `target`. Schema checks run before the first chunk
    /// is read, so a mismatch never produces partial output.
    pub fn label(
        &self,
        target: &mut dyn RowSource,
        reference: &ReferenceData,
    ) -> Result<LabeledDataset> {
        let key_positions =
            column_positions(target.headers(), &self.config.target_key_columns).map_err(
                |columns| LabelError::SchemaMismatch {
                    side: Side::Target,
                    path: target.origin().to_path_buf(),
                    columns,
                },
            )?;
        let mut dataset = match reference {
            ReferenceData::Index(index) => self.label_lookup(target, &key_positions, index)?,
            ReferenceData::Join(table) => self.label_join(target, &key_positions, table)?,
        };
        dataset.stats.rows_malformed = target.malformed();
        if dataset.stats.rows_missing_key > 0 {
            self.sink.emit(LabelEvent::MissingKeyRows {
                path: target.origin().to_path_buf(),
                count: dataset.stats.rows_missing_key,
            });
        }
        Ok(dataset)
    }

    fn label_lookup(
        &self,
        target: &mut dyn RowSource,
        key_positions: &[usize],
        index: &ReferenceIndex,
    ) -> Result<LabeledDataset> {
        let (headers, label_positions) = build_output_headers(target.headers(), index.label_columns());
        let width = headers.len();
        let default = self.config.default_label.as_str();
        let mut stats = LabelStats::default();
        let mut rows = Vec::new();

        while let Some(chunk) = target.next_chunk()? {
            let mut matched = 0usize;
            let chunk_rows = chunk.rows.len();
            for mut row in chunk.rows {
                row.resize(width, String::new());
                // Earlier label values are discarded so relabeling cannot drift.
                for pos in &label_positions {
                    row[*pos] = default.to_string();
                }
                match FlowKey::from_row(&row, key_positions) {
                    Some(key) => {
                        if let Some(record) = index.lookup(&key) {
                            for (pos, value) in label_positions.iter().zip(record.values()) {
                                row[*pos] = value.clone();
                            }
                            matched += 1;
                        }
                    }
                    None => stats.rows_missing_key += 1,
                }
                rows.push(row);
            }
            self.finish_chunk(&mut stats, chunk.index, chunk_rows, matched);
        }

        stats.rows_written = rows.len();
        Ok(LabeledDataset {
            headers,
            rows,
            stats,
        })
    }

    fn label_join(
        &self,
        target: &mut dyn RowSource,
        key_positions: &[usize],
        table: &JoinTable,
    ) -> Result<LabeledDataset> {
        let target_width = target.headers().len();
        let (headers, copy_positions) = build_output_headers(target.headers(), table.copy_columns());
        let width = headers.len();
        let default = self.config.default_label.as_str();
        let mut stats = LabelStats::default();
        let mut rows = Vec::new();

        while let Some(chunk) = target.next_chunk()? {
            let mut matched = 0usize;
            let chunk_rows = chunk.rows.len();
            for mut row in chunk.rows {
                row.resize(width, String::new());
                let key = FlowKey::from_row(&row, key_positions);
                if key.is_none() {
                    stats.rows_missing_key += 1;
                }
                let mut expanded = 0usize;
                if let Some(key) = &key {
                    for values in table.matches(key) {
                        let mut joined = row.clone();
                        for (pos, value) in copy_positions.iter().zip(values) {
                            let existing = (*pos < target_width).then(|| row[*pos].as_str());
                            joined[*pos] = coalesce(existing, value, default);
                        }
                        rows.push(joined);
                        expanded += 1;
                    }
                }
                if expanded > 0 {
                    matched += 1;
                    continue;
                }
                for pos in &copy_positions {
                    if key::is_absent(&row[*pos]) {
                        row[*pos] = default.to_string();
                    }
                }
                rows.push(row);
            }
            self.finish_chunk(&mut stats, chunk.index, chunk_rows, matched);
        }

        stats.rows_written = rows.len();
        Ok(LabeledDataset {
            headers,
            rows,
            stats,
        })
    }

    fn finish_chunk(&self, stats: &mut LabelStats, chunk: usize, rows: usize, matched: usize) {
        stats.rows_read += rows;
        stats.rows_matched += matched;
        stats.chunks += 1;
        self.sink.emit(LabelEvent::ChunkLabeled {
            chunk,
            rows,
            matched,
        });
    }
}

/// First present value wins: the target's own value, then the joined
/// reference value, then the default label.
fn coalesce(existing: Option<&str>, joined: &str, default: &str) -> String {
    let present = |value: &str| !key::is_absent(value) && value.trim() != default;
    match existing {
        Some(value) if present(value) => value.to_string(),
        _ if !key::is_absent(joined) => joined.to_string(),
        _ => default.to_string(),
    }
}
