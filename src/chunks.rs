//! Bounded-size row chunks over a delimited file.
//!
//! Both the reference index builder and the labeling engine consume input
//! through [`ChunkedReader`], so peak memory per read is bounded by the chunk
//! size rather than the file size. Chunks are produced strictly in file order.

use std::{
    io::Read,
    path::{Path, PathBuf},
};

use csv::ByteRecord;

use crate::{
    error::{LabelError, Result},
    events::{EventSink, LabelEvent},
    io_utils::{self, FieldDecoder},
};

#[derive(Debug, Clone)]
pub struct RowChunk {
    /// Zero-based chunk sequence number.
    pub index: usize,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub rows: usize,
    pub malformed: usize,
}

/// A header plus a sequence of row chunks, consumed front to back.
pub trait RowSource {
    /// Where the rows come from, for diagnostics.
    fn origin(&self) -> &Path {
        Path::new("<memory>")
    }
    fn headers(&self) -> &[String];
    fn next_chunk(&mut self) -> Result<Option<RowChunk>>;
    fn malformed(&self) -> usize {
        0
    }
}

/// Rows already held in memory, served in chunks like a file.
#[derive(Debug, Clone)]
pub struct MemorySource {
    headers: Vec<String>,
    rows: std::vec::IntoIter<Vec<String>>,
    chunk_size: usize,
    next_index: usize,
}

impl MemorySource {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>, chunk_size: usize) -> Self {
        Self {
            headers,
            rows: rows.into_iter(),
            chunk_size: chunk_size.max(1),
            next_index: 0,
        }
    }

    pub fn from_strs(headers: &[&str], rows: &[&[&str]], chunk_size: usize) -> Self {
        Self::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|v| v.to_string()).collect())
                .collect(),
            chunk_size,
        )
    }
}

impl RowSource for MemorySource {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn next_chunk(&mut self) -> Result<Option<RowChunk>> {
        let rows: Vec<_> = self.rows.by_ref().take(self.chunk_size).collect();
        if rows.is_empty() {
            return Ok(None);
        }
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(RowChunk { index, rows }))
    }
}

pub struct ChunkedReader<'a> {
    path: PathBuf,
    reader: csv::Reader<Box<dyn Read>>,
    headers: Vec<String>,
    decoder: FieldDecoder,
    chunk_size: usize,
    strict: bool,
    record: ByteRecord,
    next_index: usize,
    stats: ReadStats,
    sink: &'a dyn EventSink,
}

impl<'a> ChunkedReader<'a> {
    pub fn open(
        path: &Path,
        delimiter: u8,
        chunk_size: usize,
        strict: bool,
        sink: &'a dyn EventSink,
    ) -> Result<Self> {
        let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
        let mut decoder = FieldDecoder::default();
        let raw_headers = reader
            .byte_headers()
            .map_err(|err| LabelError::csv(path, err))?
            .clone();
        let (headers, switch) = decoder.decode_record(&raw_headers, path)?;
        if let Some(switch) = switch {
            sink.emit(LabelEvent::EncodingFallback {
                path: path.to_path_buf(),
                from: switch.from.name(),
                to: switch.to.name(),
                line: 1,
            });
        }
        let headers = headers
            .into_iter()
            .enumerate()
            .map(|(idx, h)| {
                let h = if idx == 0 { h.trim_start_matches('\u{feff}') } else { h.as_str() };
                h.trim().to_string()
            })
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            headers,
            decoder,
            chunk_size: chunk_size.max(1),
            strict,
            record: ByteRecord::new(),
            next_index: 0,
            stats: ReadStats::default(),
            sink,
        })
    }

    /// Ends the read, reporting skipped malformed rows.
    pub fn finish(self) -> ReadStats {
        if self.stats.malformed > 0 {
            self.sink.emit(LabelEvent::MalformedRowsSkipped {
                path: self.path.clone(),
                count: self.stats.malformed,
            });
        }
        self.stats
    }
}

impl RowSource for ChunkedReader<'_> {
    fn origin(&self) -> &Path {
        &self.path
    }

    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn malformed(&self) -> usize {
        self.stats.malformed
    }

    /// Reads up to `chunk_size` well-formed rows; `None` once the input is
    /// exhausted.
    fn next_chunk(&mut self) -> Result<Option<RowChunk>> {
        let mut rows = Vec::with_capacity(self.chunk_size.min(8_192));
        while rows.len() < self.chunk_size {
            let more = self
                .reader
                .read_byte_record(&mut self.record)
                .map_err(|err| LabelError::csv(&self.path, err))?;
            if !more {
                break;
            }
            let line = self.record.position().map(|p| p.line()).unwrap_or_default();
            if self.record.len() != self.headers.len() {
                let reason = format!(
                    "expected {} field(s), found {}",
                    self.headers.len(),
                    self.record.len()
                );
                if self.strict {
                    return Err(LabelError::MalformedRow {
                        path: self.path.clone(),
                        line,
                        reason,
                    });
                }
                log::debug!("Skipping line {line} of {:?}: {reason}", self.path);
                self.stats.malformed += 1;
                continue;
            }
            let (decoded, switch) = self.decoder.decode_record(&self.record, &self.path)?;
            if let Some(switch) = switch {
                self.sink.emit(LabelEvent::EncodingFallback {
                    path: self.path.clone(),
                    from: switch.from.name(),
                    to: switch.to.name(),
                    line,
                });
            }
            rows.push(decoded);
        }
        if rows.is_empty() {
            return Ok(None);
        }
        self.stats.rows += rows.len();
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(RowChunk { index, rows }))
    }
}
