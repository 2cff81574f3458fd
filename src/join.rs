//! Reference side of relational-join labeling.
//!
//! Unlike [`crate::index::ReferenceIndex`], a [`JoinTable`] keeps every
//! reference row: a flow key maps to a bucket of row ids in file order, so a
//! target row matching N reference rows expands to N output rows.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use crate::{
    chunks::{ChunkedReader, RowSource},
    config::DatasetConfig,
    error::{LabelError, Result, Side},
    events::{EventSink, LabelEvent},
    index::clean_label,
    key::FlowKey,
};

#[derive(Debug, Clone)]
pub struct JoinTable {
    copy_columns: Vec<String>,
    rows: Vec<Vec<String>>,
    buckets: HashMap<FlowKey, Vec<usize>>,
    rows_read: usize,
    rows_skipped: usize,
}

impl JoinTable {
    pub fn build(path: &Path, config: &DatasetConfig, sink: &dyn EventSink) -> Result<Self> {
        let mut reader = ChunkedReader::open(
            path,
            config.reference_delimiter,
            config.chunk_size,
            config.strict,
            sink,
        )?;
        let table = Self::from_source(&mut reader, config, sink)?;
        reader.finish();
        Ok(table)
    }

    /// Reads every reference row, keeping the `columns_to_copy` projection.
    ///
    /// Reference headers are first renamed through the inverse of
    /// `column_mapping`, so key and copy columns may be named either way.
    pub fn from_source(
        source: &mut dyn RowSource,
        config: &DatasetConfig,
        sink: &dyn EventSink,
    ) -> Result<Self> {
        let original = source.headers().to_vec();
        let renamed = rename_reference_headers(&original, config);

        let mut missing = Vec::new();
        let mut key_positions = Vec::with_capacity(config.reference_key_columns.len());
        for (reference, target) in config
            .reference_key_columns
            .iter()
            .zip(&config.target_key_columns)
        {
            match locate(&renamed, &original, &[reference.as_str(), target.as_str()]) {
                Some(pos) => key_positions.push(pos),
                None => missing.push(reference.clone()),
            }
        }
        let mut copy_positions = Vec::with_capacity(config.columns_to_copy.len());
        for column in &config.columns_to_copy {
            let mapped = config.column_mapping.get(column).map(String::as_str);
            let candidates: Vec<&str> = std::iter::once(column.as_str()).chain(mapped).collect();
            match locate(&renamed, &original, &candidates) {
                Some(pos) => copy_positions.push(pos),
                None => missing.push(column.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(LabelError::SchemaMismatch {
                side: Side::Reference,
                path: source.origin().to_path_buf(),
                columns: missing,
            });
        }

        let mut table = JoinTable {
            copy_columns: config.columns_to_copy.clone(),
            rows: Vec::new(),
            buckets: HashMap::new(),
            rows_read: 0,
            rows_skipped: 0,
        };
        while let Some(chunk) = source.next_chunk()? {
            for row in &chunk.rows {
                table.rows_read += 1;
                let Some(key) = FlowKey::from_row(row, &key_positions) else {
                    table.rows_skipped += 1;
                    continue;
                };
                let projected = copy_positions
                    .iter()
                    .map(|idx| clean_label(row.get(*idx).map(String::as_str).unwrap_or("")))
                    .collect();
                table.push(key, projected);
            }
        }

        sink.emit(LabelEvent::IndexBuilt {
            path: source.origin().to_path_buf(),
            keys: table.buckets.len(),
            rows: table.rows_read,
            skipped: table.rows_skipped,
        });
        Ok(table)
    }

    pub fn push(&mut self, key: FlowKey, values: Vec<String>) {
        let id = self.rows.len();
        self.rows.push(values);
        self.buckets.entry(key).or_default().push(id);
    }

    /// Copy-column values of every reference row sharing `key`, in file order.
    pub fn matches<'a>(&'a self, key: &FlowKey) -> impl Iterator<Item = &'a [String]> + use<'a> {
        self.buckets
            .get(key)
            .into_iter()
            .flatten()
            .map(|id| self.rows[*id].as_slice())
    }

    pub fn copy_columns(&self) -> &[String] {
        &self.copy_columns
    }

    pub fn distinct_keys(&self) -> usize {
        self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows_skipped(&self) -> usize {
        self.rows_skipped
    }
}

/// First of `names` found among the renamed headers, then the original ones.
fn locate(renamed: &[String], original: &[String], names: &[&str]) -> Option<usize> {
    names.iter().find_map(|name| {
        renamed
            .iter()
            .position(|h| h == name)
            .or_else(|| original.iter().position(|h| h == name))
    })
}

fn rename_reference_headers(headers: &[String], config: &DatasetConfig) -> Vec<String> {
    let inverse: HashMap<&str, &str> = config
        .column_mapping
        .iter()
        .map(|(target, reference)| (reference.as_str(), target.as_str()))
        .collect();
    headers
        .iter()
        .map(|h| inverse.get(h.as_str()).map_or_else(|| h.clone(), |t| t.to_string()))
        .collect()
}

/// Output layout: the target headers followed by the named columns the target
/// does not already carry. Returns the headers and, for each named column, its
/// position in the output row.
pub fn build_output_headers(target_headers: &[String], added: &[String]) -> (Vec<String>, Vec<usize>) {
    let mut headers = target_headers.to_vec();
    let mut seen: HashSet<String> = headers.iter().cloned().collect();
    let mut positions = Vec::with_capacity(added.len());
    for name in added {
        if seen.insert(name.clone()) {
            positions.push(headers.len());
            headers.push(name.clone());
        } else {
            let existing = headers.iter().position(|h| h == name).unwrap_or_default();
            positions.push(existing);
        }
    }
    (headers, positions)
}
