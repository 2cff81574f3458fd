//! Label value counts across labeled files, for checking a labeling run.

use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::{
    chunks::{ChunkedReader, RowSource},
    events::EventSink,
    io_utils, key,
};

const EMPTY_VALUE: &str = "<empty>";
const COUNT_CHUNK_SIZE: usize = 50_000;

/// Tallies value counts for `columns` over every input and returns report
/// rows of `column, value, count, percent`, most frequent first.
pub fn compute_label_counts(
    inputs: &[impl AsRef<Path>],
    columns: &[String],
    top: usize,
    sink: &dyn EventSink,
) -> Result<Vec<Vec<String>>> {
    let mut counts = CountAccumulator::new(columns);
    for input in inputs {
        let input = input.as_ref();
        let delimiter = io_utils::sniff_delimiter(input)
            .with_context(|| format!("Detecting delimiter of {input:?}"))?;
        let mut reader = ChunkedReader::open(input, delimiter, COUNT_CHUNK_SIZE, false, sink)
            .with_context(|| format!("Opening {input:?}"))?;
        let positions: Vec<Option<usize>> = columns
            .iter()
            .map(|name| reader.headers().iter().position(|h| h == name))
            .collect();
        for (name, position) in columns.iter().zip(&positions) {
            if position.is_none() {
                warn!("{input:?} has no column '{name}'; skipping it for this file");
            }
        }

        let mut rows = 0usize;
        while let Some(chunk) = reader
            .next_chunk()
            .with_context(|| format!("Reading {input:?}"))?
        {
            for row in &chunk.rows {
                counts.ingest(&positions, row);
                rows += 1;
            }
        }
        reader.finish();
        info!("Counted {rows} row(s) in {input:?}");
    }

    Ok(columns
        .iter()
        .enumerate()
        .flat_map(|(slot, _)| counts.render_rows(slot, top))
        .collect())
}

struct CountAccumulator {
    names: Vec<String>,
    totals: Vec<usize>,
    counts: Vec<HashMap<String, usize>>,
}

impl CountAccumulator {
    fn new(columns: &[String]) -> Self {
        Self {
            names: columns.to_vec(),
            totals: vec![0; columns.len()],
            counts: vec![HashMap::new(); columns.len()],
        }
    }

    fn ingest(&mut self, positions: &[Option<usize>], row: &[String]) {
        for (slot, position) in positions.iter().enumerate() {
            let Some(idx) = position else {
                continue;
            };
            let raw = row.get(*idx).map(String::as_str).unwrap_or("");
            let value = if key::is_absent(raw) {
                EMPTY_VALUE.to_string()
            } else {
                raw.trim().to_string()
            };
            self.totals[slot] += 1;
            *self.counts[slot].entry(value).or_insert(0) += 1;
        }
    }

    fn render_rows(&self, slot: usize, top: usize) -> Vec<Vec<String>> {
        let total = self.totals[slot];
        if total == 0 {
            return Vec::new();
        }
        let mut items = self.counts[slot]
            .iter()
            .map(|(value, count)| (value.clone(), *count))
            .collect::<Vec<_>>();
        items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if top > 0 && items.len() > top {
            items.truncate(top);
        }
        items
            .into_iter()
            .map(|(value, count)| {
                let percent = (count as f64 / total as f64) * 100.0;
                vec![
                    self.names[slot].clone(),
                    value,
                    count.to_string(),
                    format!("{percent:.2}%"),
                ]
            })
            .collect()
    }
}
