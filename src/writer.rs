//! Labeled output: directories, delimiter and threshold-driven gzip.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    config::DatasetConfig,
    engine::LabeledDataset,
    error::{LabelError, Result},
    events::{EventSink, LabelEvent},
    io_utils,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenOutput {
    pub path: PathBuf,
    pub rows: usize,
    pub compressed: bool,
}

/// Writes `dataset` to `path`, gzip-compressing it when the configured policy
/// asks for it. A compressed file gets a `.gz` suffix if `path` lacks one.
pub fn write_dataset(
    dataset: &LabeledDataset,
    path: &Path,
    config: &DatasetConfig,
    sink: &dyn EventSink,
) -> Result<WrittenOutput> {
    let compressed = io_utils::is_gzip(path)
        || config
            .compression
            .should_compress(dataset.len(), config.compression_threshold);
    let path = if compressed {
        io_utils::with_gzip_extension(path)
    } else {
        path.to_path_buf()
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| LabelError::io(parent, err))?;
    }

    let mut writer = io_utils::open_csv_writer(&path, config.output_delimiter, compressed)?;
    writer
        .write_record(&dataset.headers)
        .map_err(|err| LabelError::csv(&path, err))?;
    for row in &dataset.rows {
        writer
            .write_record(row)
            .map_err(|err| LabelError::csv(&path, err))?;
    }
    let stream = writer
        .into_inner()
        .map_err(|err| LabelError::io(&path, err.into_error()))?;
    stream.finish().map_err(|err| LabelError::io(&path, err))?;

    sink.emit(LabelEvent::OutputWritten {
        path: path.clone(),
        rows: dataset.len(),
        delimiter: config.output_delimiter,
        compressed,
    });
    Ok(WrittenOutput {
        path,
        rows: dataset.len(),
        compressed,
    })
}
