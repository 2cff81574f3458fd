//! Label-source resolution: which reference file applies to a target file.
//!
//! Resolution is a filename heuristic. The exception table is consulted
//! first, then the configured `labeling_files` patterns, then every catalogue
//! stem. When several distinct files match, the first in that order wins and
//! an [`LabelEvent::AmbiguousSource`] is emitted.

use std::{
    fs,
    path::{Path, PathBuf},
};

use itertools::Itertools;

use crate::{
    config::DatasetConfig,
    error::{LabelError, Result},
    events::{EventSink, LabelEvent},
    io_utils,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogueEntry {
    /// File name without the `.csv` / `.csv.gz` extension.
    pub stem: String,
    pub path: PathBuf,
}

/// Reference label files available for resolution, in file-name order.
#[derive(Debug, Clone)]
pub struct LabelCatalogue {
    root: PathBuf,
    entries: Vec<CatalogueEntry>,
}

impl LabelCatalogue {
    pub fn scan(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(LabelError::Directory {
                path: dir.to_path_buf(),
            });
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir).map_err(|err| LabelError::io(dir, err))? {
            let entry = entry.map_err(|err| LabelError::io(dir, err))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(stem) = csv_stem(&path) {
                entries.push(CatalogueEntry { stem, path });
            }
        }
        entries.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
        log::debug!(
            "Found {} reference file(s) in {:?}: {:?}",
            entries.len(),
            dir,
            entries.iter().map(|e| e.stem.as_str()).collect::<Vec<_>>()
        );
        Ok(Self {
            root: dir.to_path_buf(),
            entries,
        })
    }

    /// Builds a catalogue from file names without touching the file system.
    pub fn from_names<I, S>(root: &Path, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = names
            .into_iter()
            .filter_map(|name| {
                let path = root.join(name.as_ref());
                csv_stem(&path).map(|stem| CatalogueEntry { stem, path })
            })
            .collect();
        Self {
            root: root.to_path_buf(),
            entries,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[CatalogueEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find_stem(&self, stem: &str) -> Option<&CatalogueEntry> {
        self.entries
            .iter()
            .find(|entry| entry.stem.eq_ignore_ascii_case(stem))
    }
}

fn csv_stem(path: &Path) -> Option<String> {
    let plain = io_utils::strip_gzip_extension(path);
    let is_csv = plain
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return None;
    }
    plain
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}

/// Lowercased file name without directory or extension(s).
pub fn normalize_target_name(target: &str) -> String {
    let path = io_utils::strip_gzip_extension(Path::new(target));
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(target)
        .to_lowercase()
}

pub fn resolve(
    target_name: &str,
    catalogue: &LabelCatalogue,
    config: &DatasetConfig,
    sink: &dyn EventSink,
) -> Result<PathBuf> {
    let normalized = normalize_target_name(target_name);
    let not_found = || LabelError::NotFound {
        target: target_name.to_string(),
    };

    if let Some((pattern, label)) = config
        .label_exceptions
        .iter()
        .find(|(pattern, _)| normalized.contains(pattern.to_lowercase().as_str()))
    {
        sink.emit(LabelEvent::ExceptionApplied {
            target: target_name.to_string(),
            pattern: pattern.clone(),
            label: label.clone(),
        });
        let entry = catalogue.find_stem(label).ok_or_else(not_found)?;
        return Ok(resolved(target_name, entry, sink));
    }

    let configured = config
        .labeling_files
        .iter()
        .filter(|(pattern, _)| normalized.contains(pattern.to_lowercase().as_str()))
        .filter_map(|(pattern, stem)| {
            let entry = catalogue.find_stem(stem);
            if entry.is_none() {
                log::debug!(
                    "Pattern '{pattern}' names '{stem}', which is not in {:?}",
                    catalogue.root()
                );
            }
            entry
        });
    let by_stem = catalogue
        .entries()
        .iter()
        .filter(|entry| normalized.contains(entry.stem.to_lowercase().as_str()));
    let matches: Vec<&CatalogueEntry> = configured
        .chain(by_stem)
        .unique_by(|entry| entry.path.clone())
        .collect();

    let chosen = *matches.first().ok_or_else(not_found)?;
    if matches.len() > 1 {
        sink.emit(LabelEvent::AmbiguousSource {
            target: target_name.to_string(),
            candidates: matches.iter().map(|e| e.stem.clone()).collect(),
            chosen: chosen.stem.clone(),
        });
    }
    Ok(resolved(target_name, chosen, sink))
}

fn resolved(target: &str, entry: &CatalogueEntry, sink: &dyn EventSink) -> PathBuf {
    sink.emit(LabelEvent::SourceResolved {
        target: target.to_string(),
        reference: entry.path.clone(),
    });
    entry.path.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config, events::RecordingSink};
    use serde_json::json;

    fn config_with(labeling_files: serde_json::Value) -> DatasetConfig {
        config::validate(
            &json!({
                "target_key_columns": ["src_ip", "dst_ip"],
                "reference_key_columns": ["saddr", "daddr"],
                "column_mapping": {},
                "columns_to_copy": ["attack", "category", "subcategory"],
                "labeling_files": labeling_files
            }),
            "Bot-IoT",
        )
        .expect("valid config")
    }

    #[test]
    fn exception_wins_over_generic_matches() {
        let root = Path::new("/labels");
        let catalogue = LabelCatalogue::from_names(
            root,
            ["IoT.csv", "Keylogging.csv", "Data_exfiltration.csv"],
        );
        let sink = RecordingSink::new();
        let path = resolve(
            "IoT_Keylogging__00002.csv",
            &catalogue,
            &config_with(json!({})),
            &sink,
        )
        .expect("resolved");
        assert_eq!(path, root.join("Keylogging.csv"));
        assert_eq!(sink.count("exception_applied"), 1);
        assert_eq!(sink.count("ambiguous_source"), 0);
    }

    #[test]
    fn data_theft_maps_to_exfiltration() {
        let root = Path::new("/labels");
        let catalogue =
            LabelCatalogue::from_names(root, ["Keylogging.csv", "Data_exfiltration.csv"]);
        let path = resolve(
            "IoT_Data_Theft_00012.csv",
            &catalogue,
            &config_with(json!({})),
            &RecordingSink::new(),
        )
        .expect("resolved");
        assert_eq!(path, root.join("Data_exfiltration.csv"));
    }

    #[test]
    fn first_generic_match_wins_with_warning() {
        let root = Path::new("/labels");
        let catalogue = LabelCatalogue::from_names(root, ["DDoS.csv", "DoS.csv", "OS_Scan.csv"]);
        let sink = RecordingSink::new();
        let path = resolve(
            "DDoS_HTTP[1].pcap.csv",
            &catalogue,
            &config_with(json!({})),
            &sink,
        )
        .expect("resolved");
        assert_eq!(path, root.join("DDoS.csv"));
        assert_eq!(sink.count("ambiguous_source"), 1);
    }

    #[test]
    fn configured_patterns_precede_catalogue_stems() {
        let root = Path::new("/labels");
        let catalogue = LabelCatalogue::from_names(root, ["Service_Scan.csv", "Scan.csv"]);
        let path = resolve(
            "service_scan_3.csv",
            &catalogue,
            &config_with(json!({"service_scan": "Service_Scan"})),
            &RecordingSink::new(),
        )
        .expect("resolved");
        assert_eq!(path, root.join("Service_Scan.csv"));
    }

    #[test]
    fn configured_patterns_are_tried_in_declared_order() {
        let root = Path::new("/labels");
        let catalogue = LabelCatalogue::from_names(root, ["OS_Scan.csv", "Scan.csv"]);
        let raw: serde_json::Value =
            serde_json::from_str(r#"{"scan": "Scan", "os_scan": "OS_Scan"}"#).expect("json");
        let sink = RecordingSink::new();
        let path = resolve("os_scan_1.csv", &catalogue, &config_with(raw), &sink)
            .expect("resolved");
        assert_eq!(path, root.join("Scan.csv"));
        assert_eq!(sink.count("ambiguous_source"), 1);
    }

    #[test]
    fn no_match_is_not_found() {
        let catalogue = LabelCatalogue::from_names(Path::new("/labels"), ["Data_exfiltration.csv"]);
        let err = resolve(
            "IoT_Keylogging__00002.csv",
            &catalogue,
            &config_with(json!({})),
            &RecordingSink::new(),
        )
        .expect_err("keylogging reference absent");
        assert!(matches!(err, LabelError::NotFound { .. }));
    }

    #[test]
    fn scan_rejects_missing_directory() {
        let err = LabelCatalogue::scan(Path::new("/definitely/not/here")).expect_err("missing dir");
        assert!(matches!(err, LabelError::Directory { .. }));
    }

    #[test]
    fn normalize_target_name_strips_extensions() {
        assert_eq!(normalize_target_name("/data/IoT_Keylogging.CSV"), "iot_keylogging");
        assert_eq!(normalize_target_name("flows.csv.gz"), "flows");
    }
}
