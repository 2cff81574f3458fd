//! I/O utilities for CSV reading, writing, decoding, and delimiter handling.
//!
//! All dataset I/O in flow-labeler flows through this module. It provides:
//!
//! - **Reader construction**: `open_csv_reader_from_path` with transparent
//!   gzip decompression for `.gz` inputs.
//! - **Decoding**: records are read as raw bytes and decoded with a
//!   [`FieldDecoder`], which starts as UTF-8 and switches once to the
//!   Latin-1 fallback when a record fails to decode.
//! - **Writer construction**: plain or gzip-compressed CSV output.
//! - **Delimiter sniffing** for reports over files of mixed conventions.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use flate2::{Compression, read::MultiGzDecoder, write::GzEncoder};

use crate::error::{LabelError, Result};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const SNIFF_CANDIDATES: &[u8] = &[b',', b';', b'\t', b'|'];

/// Encoding tried when a file is not valid UTF-8. encoding_rs serves the
/// `latin1` label with windows-1252, which decodes every byte.
pub fn fallback_encoding() -> &'static Encoding {
    WINDOWS_1252
}

pub fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// `capture.csv.gz` → `capture.csv`, otherwise the path unchanged.
pub fn strip_gzip_extension(path: &Path) -> PathBuf {
    if is_gzip(path) {
        path.with_extension("")
    } else {
        path.to_path_buf()
    }
}

pub fn with_gzip_extension(path: &Path) -> PathBuf {
    if is_gzip(path) {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_owned();
    name.push(".gz");
    PathBuf::from(name)
}

fn open_raw(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).map_err(|err| LabelError::io(path, err))?;
    let reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(reader)
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8, has_headers: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(
    path: &Path,
    delimiter: u8,
    has_headers: bool,
) -> Result<csv::Reader<Box<dyn Read>>> {
    Ok(open_csv_reader(open_raw(path)?, delimiter, has_headers))
}

/// Guesses the delimiter from the first line by counting candidate bytes.
pub fn sniff_delimiter(path: &Path) -> Result<u8> {
    let mut reader = BufReader::new(open_raw(path)?);
    let mut line = Vec::new();
    reader
        .read_until(b'\n', &mut line)
        .map_err(|err| LabelError::io(path, err))?;
    let best = SNIFF_CANDIDATES
        .iter()
        .map(|candidate| (*candidate, line.iter().filter(|b| *b == candidate).count()))
        .filter(|(_, count)| *count > 0)
        .max_by_key(|(_, count)| *count)
        .map(|(candidate, _)| candidate);
    Ok(best.unwrap_or(DEFAULT_CSV_DELIMITER))
}

/// Decodes raw CSV fields, falling back from UTF-8 once per file.
#[derive(Debug)]
pub struct FieldDecoder {
    active: &'static Encoding,
    fallback: Option<&'static Encoding>,
}

/// Reported by [`FieldDecoder::decode_record`] when the fallback kicked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingSwitch {
    pub from: &'static Encoding,
    pub to: &'static Encoding,
}

impl Default for FieldDecoder {
    fn default() -> Self {
        Self::new(UTF_8, Some(fallback_encoding()))
    }
}

impl FieldDecoder {
    pub fn new(primary: &'static Encoding, fallback: Option<&'static Encoding>) -> Self {
        Self {
            active: primary,
            fallback,
        }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.active
    }

    pub fn decode_record(
        &mut self,
        record: &csv::ByteRecord,
        path: &Path,
    ) -> Result<(Vec<String>, Option<EncodingSwitch>)> {
        if let Some(decoded) = decode_with(record, self.active) {
            return Ok((decoded, None));
        }
        let from = self.active;
        let fallback = self.fallback.take().ok_or_else(|| LabelError::Decode {
            path: path.to_path_buf(),
            encoding: from.name(),
        })?;
        self.active = fallback;
        let decoded = decode_with(record, fallback).ok_or_else(|| LabelError::Decode {
            path: path.to_path_buf(),
            encoding: fallback.name(),
        })?;
        Ok((decoded, Some(EncodingSwitch { from, to: fallback })))
    }
}

fn decode_with(record: &csv::ByteRecord, encoding: &'static Encoding) -> Option<Vec<String>> {
    record
        .iter()
        .map(|field| {
            encoding
                .decode_without_bom_handling_and_without_replacement(field)
                .map(|text| text.into_owned())
        })
        .collect()
}

/// Output byte stream; gzip streams need an explicit [`OutputStream::finish`]
/// to write their trailer and surface any error doing so.
pub enum OutputStream {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl OutputStream {
    pub fn finish(self) -> std::io::Result<()> {
        match self {
            OutputStream::Plain(mut inner) => inner.flush(),
            OutputStream::Gzip(encoder) => encoder.finish()?.flush(),
        }
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            OutputStream::Plain(inner) => inner.write(buf),
            OutputStream::Gzip(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            OutputStream::Plain(inner) => inner.flush(),
            OutputStream::Gzip(inner) => inner.flush(),
        }
    }
}

pub type CsvSink = csv::Writer<OutputStream>;

pub fn open_csv_writer(path: &Path, delimiter: u8, compress: bool) -> Result<CsvSink> {
    let file = File::create(path).map_err(|err| LabelError::io(path, err))?;
    let base = if compress {
        OutputStream::Gzip(GzEncoder::new(BufWriter::new(file), Compression::default()))
    } else {
        OutputStream::Plain(BufWriter::new(file))
    };

    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(base))
}
