//! Per-dataset labeling configuration and its schema validation.
//!
//! The configuration file is JSON with a top-level `datasets` map keyed by
//! dataset type. [`validate`] checks the raw value for every required
//! declaration before anything is deserialized, so a defect is always
//! reported by key name and before any dataset file is opened. Downstream
//! components receive a fully populated [`DatasetConfig`] and never probe for
//! optional fields themselves.

use std::{collections::BTreeMap, fs, path::Path};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    cli::parse_delimiter,
    error::{LabelError, Result},
};

pub const DEFAULT_LABEL: &str = "Unclear";
pub const DEFAULT_CHUNK_SIZE: usize = 50_000;
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 100_000;

const TARGET_KEYS: &[&str] = &["target_key_columns", "columns_to_tag"];
const REFERENCE_KEYS: &[&str] = &["reference_key_columns", "reference_columns"];

/// Substring → canonical label overrides applied before generic matching.
pub const DEFAULT_LABEL_EXCEPTIONS: &[(&str, &str)] = &[
    ("data_theft", "Data_exfiltration"),
    ("keylog", "Keylogging"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelMode {
    /// One hash lookup per target row; duplicate reference keys resolve
    /// last-write-wins.
    Lookup,
    /// Left equi-join; a target row matching N reference rows yields N rows.
    Join,
}

impl LabelMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lookup" | "point" | "point-lookup" => Some(LabelMode::Lookup),
            "join" | "relational" | "relational-join" => Some(LabelMode::Join),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum CompressionPolicy {
    /// Gzip once the row count exceeds the configured threshold.
    Auto,
    Always,
    Never,
}

impl CompressionPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(CompressionPolicy::Auto),
            "always" | "gzip" => Some(CompressionPolicy::Always),
            "never" | "none" => Some(CompressionPolicy::Never),
            _ => None,
        }
    }

    pub fn should_compress(self, rows: usize, threshold: usize) -> bool {
        match self {
            CompressionPolicy::Auto => rows > threshold,
            CompressionPolicy::Always => true,
            CompressionPolicy::Never => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub dataset: String,
    pub target_key_columns: Vec<String>,
    pub reference_key_columns: Vec<String>,
    /// Target column name → reference column name.
    pub column_mapping: BTreeMap<String, String>,
    pub columns_to_copy: Vec<String>,
    /// Filename pattern → reference file stem, in declaration order.
    pub labeling_files: Vec<(String, String)>,
    /// Output column name → reference column projected in lookup mode.
    pub label_columns: Vec<(String, String)>,
    pub label_exceptions: Vec<(String, String)>,
    pub mode: LabelMode,
    pub default_label: String,
    pub target_delimiter: u8,
    pub reference_delimiter: u8,
    pub output_delimiter: u8,
    pub chunk_size: usize,
    pub strict: bool,
    pub compression: CompressionPolicy,
    pub compression_threshold: usize,
}

/// Per-run values supplied on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub default_label: Option<String>,
    pub target_delimiter: Option<u8>,
    pub reference_delimiter: Option<u8>,
    pub output_delimiter: Option<u8>,
    pub chunk_size: Option<usize>,
    pub strict: bool,
    pub compression: Option<CompressionPolicy>,
    pub compression_threshold: Option<usize>,
}

impl DatasetConfig {
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(label) = &overrides.default_label {
            self.default_label = label.clone();
        }
        if let Some(delimiter) = overrides.target_delimiter {
            self.target_delimiter = delimiter;
            if overrides.output_delimiter.is_none() {
                self.output_delimiter = delimiter;
            }
        }
        if let Some(delimiter) = overrides.reference_delimiter {
            self.reference_delimiter = delimiter;
        }
        if let Some(delimiter) = overrides.output_delimiter {
            self.output_delimiter = delimiter;
        }
        if let Some(size) = overrides.chunk_size.filter(|size| *size > 0) {
            self.chunk_size = size;
        }
        if overrides.strict {
            self.strict = true;
        }
        if let Some(policy) = overrides.compression {
            self.compression = policy;
        }
        if let Some(threshold) = overrides.compression_threshold {
            self.compression_threshold = threshold;
        }
    }

    /// Names of the label fields added to every target row in lookup mode.
    pub fn label_output_columns(&self) -> Vec<String> {
        self.label_columns
            .iter()
            .map(|(output, _)| output.clone())
            .collect()
    }

    pub fn label_reference_columns(&self) -> Vec<String> {
        self.label_columns
            .iter()
            .map(|(_, reference)| reference.clone())
            .collect()
    }
}

/// On-disk layout; dataset entries stay raw until [`validate`] checks them.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    datasets: BTreeMap<String, Value>,
}

pub fn load_config(path: &Path, dataset_type: &str) -> Result<DatasetConfig> {
    let text = fs::read_to_string(path).map_err(|err| LabelError::io(path, err))?;
    let document: ConfigFile =
        serde_json::from_str(&text).map_err(|source| LabelError::Config {
            path: path.to_path_buf(),
            source,
        })?;
    let raw = document
        .datasets
        .get(dataset_type)
        .ok_or_else(|| LabelError::DatasetNotConfigured {
            dataset: dataset_type.to_string(),
            path: path.to_path_buf(),
        })?;
    validate(raw, dataset_type)
}

/// Validates one dataset entry and builds the typed configuration.
pub fn validate(raw: &Value, dataset_type: &str) -> Result<DatasetConfig> {
    let entry = raw.as_object().ok_or_else(|| {
        LabelError::config_schema(dataset_type, dataset_type, "must be a map")
    })?;

    let target_key_columns = required_list(entry, dataset_type, TARGET_KEYS, true)?;
    let reference_key_columns = required_list(entry, dataset_type, REFERENCE_KEYS, true)?;
    let column_mapping: BTreeMap<String, String> =
        required_map(entry, dataset_type, "column_mapping")?
            .into_iter()
            .collect();
    let columns_to_copy = required_list(entry, dataset_type, &["columns_to_copy"], false)?;
    let labeling_files = required_map(entry, dataset_type, "labeling_files")?;

    if target_key_columns.len() != reference_key_columns.len() {
        return Err(LabelError::config_schema(
            dataset_type,
            REFERENCE_KEYS[0],
            format!(
                "must list as many columns as {} ({} vs {})",
                TARGET_KEYS[0],
                reference_key_columns.len(),
                target_key_columns.len()
            ),
        ));
    }
    for (target, reference) in &column_mapping {
        if let Some(pos) = target_key_columns.iter().position(|c| c == target)
            && reference_key_columns[pos] != *reference
        {
            return Err(LabelError::config_schema(
                dataset_type,
                "column_mapping",
                format!(
                    "maps key column '{target}' to '{reference}' but the key correspondence pairs it with '{}'",
                    reference_key_columns[pos]
                ),
            ));
        }
    }

    let label_columns: Vec<(String, String)> = match entry.get("label_columns") {
        None | Some(Value::Null) => columns_to_copy
            .iter()
            .map(|c| (c.clone(), c.clone()))
            .collect(),
        Some(Value::Array(_)) => required_list(entry, dataset_type, &["label_columns"], true)?
            .into_iter()
            .map(|c| (c.clone(), c))
            .collect(),
        Some(_) => required_map(entry, dataset_type, "label_columns")?,
    };

    let label_exceptions: Vec<(String, String)> = match entry.get("label_exceptions") {
        None | Some(Value::Null) => DEFAULT_LABEL_EXCEPTIONS
            .iter()
            .map(|(pattern, label)| (pattern.to_string(), label.to_string()))
            .collect(),
        Some(_) => required_map(entry, dataset_type, "label_exceptions")?
            .into_iter()
            .map(|(pattern, label)| (pattern.to_lowercase(), label))
            .collect(),
    };

    let mode = match optional_str(entry, dataset_type, "mode")? {
        Some(value) => LabelMode::parse(&value).ok_or_else(|| {
            LabelError::config_schema(dataset_type, "mode", "must be 'lookup' or 'join'")
        })?,
        None if column_mapping.is_empty() => LabelMode::Lookup,
        None => LabelMode::Join,
    };

    if mode == LabelMode::Lookup && label_columns.is_empty() {
        return Err(LabelError::config_schema(
            dataset_type,
            "columns_to_copy",
            "must name at least one label column in lookup mode",
        ));
    }

    let default_label =
        optional_str(entry, dataset_type, "default_label")?.unwrap_or_else(|| DEFAULT_LABEL.into());
    let target_delimiter = optional_delimiter(entry, dataset_type, "target_delimiter")?.unwrap_or(b',');
    let reference_delimiter =
        optional_delimiter(entry, dataset_type, "reference_delimiter")?.unwrap_or(b';');
    let output_delimiter =
        optional_delimiter(entry, dataset_type, "output_delimiter")?.unwrap_or(target_delimiter);
    let chunk_size = optional_usize(entry, dataset_type, "chunk_size")?.unwrap_or(DEFAULT_CHUNK_SIZE);
    if chunk_size == 0 {
        return Err(LabelError::config_schema(
            dataset_type,
            "chunk_size",
            "must be greater than zero",
        ));
    }
    let strict = match entry.get("strict") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            return Err(LabelError::config_schema(
                dataset_type,
                "strict",
                "must be a boolean",
            ));
        }
    };
    let compression = match optional_str(entry, dataset_type, "compression")? {
        Some(value) => CompressionPolicy::parse(&value).ok_or_else(|| {
            LabelError::config_schema(
                dataset_type,
                "compression",
                "must be 'auto', 'always' or 'never'",
            )
        })?,
        None => CompressionPolicy::Auto,
    };
    let compression_threshold = optional_usize(entry, dataset_type, "compression_threshold")?
        .unwrap_or(DEFAULT_COMPRESSION_THRESHOLD);

    Ok(DatasetConfig {
        dataset: dataset_type.to_string(),
        target_key_columns,
        reference_key_columns,
        column_mapping,
        columns_to_copy,
        labeling_files,
        label_columns,
        label_exceptions,
        mode,
        default_label,
        target_delimiter,
        reference_delimiter,
        output_delimiter,
        chunk_size,
        strict,
        compression,
        compression_threshold,
    })
}

fn required_list(
    entry: &Map<String, Value>,
    dataset: &str,
    keys: &[&str],
    non_empty: bool,
) -> Result<Vec<String>> {
    let (key, value) = keys
        .iter()
        .find_map(|key| entry.get(*key).map(|value| (*key, value)))
        .ok_or_else(|| LabelError::config_schema(dataset, keys[0], "is missing"))?;
    let items = value
        .as_array()
        .ok_or_else(|| LabelError::config_schema(dataset, key, "must be a list"))?;
    let values = items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    LabelError::config_schema(dataset, key, "must contain only non-empty strings")
                })
        })
        .collect::<Result<Vec<_>>>()?;
    if non_empty && values.is_empty() {
        return Err(LabelError::config_schema(dataset, key, "must not be empty"));
    }
    Ok(values)
}

/// String-to-string map entries in the order the file declares them.
fn required_map(
    entry: &Map<String, Value>,
    dataset: &str,
    key: &str,
) -> Result<Vec<(String, String)>> {
    let value = entry
        .get(key)
        .ok_or_else(|| LabelError::config_schema(dataset, key, "is missing"))?;
    let object = value
        .as_object()
        .ok_or_else(|| LabelError::config_schema(dataset, key, "must be a map"))?;
    object
        .iter()
        .map(|(name, target)| {
            target
                .as_str()
                .map(|s| (name.trim().to_string(), s.trim().to_string()))
                .ok_or_else(|| {
                    LabelError::config_schema(dataset, key, "must map names to strings")
                })
        })
        .collect()
}

fn optional_str(entry: &Map<String, Value>, dataset: &str, key: &str) -> Result<Option<String>> {
    match entry.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(LabelError::config_schema(dataset, key, "must be a string")),
    }
}

fn optional_usize(entry: &Map<String, Value>, dataset: &str, key: &str) -> Result<Option<usize>> {
    match entry.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| LabelError::config_schema(dataset, key, "must be a non-negative integer")),
    }
}

fn optional_delimiter(entry: &Map<String, Value>, dataset: &str, key: &str) -> Result<Option<u8>> {
    optional_str(entry, dataset, key)?
        .map(|value| {
            parse_delimiter(&value).map_err(|reason| {
                LabelError::config_schema(dataset, key, reason.to_lowercase())
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bot_iot() -> Value {
        json!({
            "target_key_columns": ["saddr", "daddr"],
            "reference_key_columns": ["src_ip", "dst_ip"],
            "column_mapping": {"saddr": "src_ip", "daddr": "dst_ip"},
            "columns_to_copy": ["attack", "category", "subcategory"],
            "labeling_files": {"keylog": "Keylogging"}
        })
    }

    #[test]
    fn validate_fills_defaults() {
        let config = validate(&bot_iot(), "Bot-IoT").expect("valid config");
        assert_eq!(config.mode, LabelMode::Join);
        assert_eq!(config.default_label, DEFAULT_LABEL);
        assert_eq!(config.reference_delimiter, b';');
        assert_eq!(config.output_delimiter, b',');
        assert_eq!(config.compression, CompressionPolicy::Auto);
        assert_eq!(config.compression_threshold, 100_000);
        assert_eq!(
            config.label_output_columns(),
            vec!["attack", "category", "subcategory"]
        );
        assert_eq!(config.label_exceptions.len(), 2);
    }

    #[test]
    fn map_entries_keep_declaration_order() {
        let raw: Value = serde_json::from_str(
            r#"{
                "target_key_columns": ["saddr"],
                "reference_key_columns": ["src_ip"],
                "column_mapping": {},
                "columns_to_copy": ["attack"],
                "labeling_files": {"scan": "Scan", "os_scan": "OS_Scan"},
                "label_exceptions": {"Theft": "Data_exfiltration", "keylog": "Keylogging"}
            }"#,
        )
        .expect("json");
        let config = validate(&raw, "Bot-IoT").expect("valid config");
        assert_eq!(
            config.labeling_files,
            vec![
                ("scan".to_string(), "Scan".to_string()),
                ("os_scan".to_string(), "OS_Scan".to_string()),
            ]
        );
        assert_eq!(config.label_exceptions[0].0, "theft");
        assert_eq!(config.label_exceptions[1].0, "keylog");
    }

    #[test]
    fn validate_accepts_legacy_key_names() {
        let raw = json!({
            "columns_to_tag": ["saddr"],
            "reference_columns": ["src_ip"],
            "column_mapping": {},
            "columns_to_copy": ["attack"],
            "labeling_files": {}
        });
        let config = validate(&raw, "legacy").expect("legacy names accepted");
        assert_eq!(config.target_key_columns, vec!["saddr"]);
        assert_eq!(config.mode, LabelMode::Lookup);
    }

    #[test]
    fn validate_names_first_missing_key() {
        let raw = json!({ "columns_to_tag": ["saddr"] });
        let err = validate(&raw, "Bot-IoT").expect_err("incomplete config");
        match err {
            LabelError::ConfigSchema { key, .. } => assert_eq!(key, "reference_key_columns"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_mistyped_mapping() {
        let mut raw = bot_iot();
        raw["column_mapping"] = json!(["saddr"]);
        let err = validate(&raw, "Bot-IoT").expect_err("mapping must be a map");
        assert!(err.to_string().contains("'column_mapping' must be a map"));
    }

    #[test]
    fn validate_rejects_unequal_key_lists() {
        let mut raw = bot_iot();
        raw["reference_key_columns"] = json!(["src_ip"]);
        let err = validate(&raw, "Bot-IoT").expect_err("key lists differ in length");
        assert!(err.to_string().contains("as many columns"));
    }

    #[test]
    fn validate_rejects_mapping_that_contradicts_key_order() {
        let mut raw = bot_iot();
        raw["column_mapping"] = json!({"saddr": "dst_ip"});
        let err = validate(&raw, "Bot-IoT").expect_err("crossed mapping");
        assert!(err.to_string().contains("key correspondence"));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = validate(&bot_iot(), "Bot-IoT").expect("valid config");
        config.apply_overrides(&Overrides {
            default_label: Some("benign".into()),
            target_delimiter: Some(b';'),
            strict: true,
            ..Overrides::default()
        });
        assert_eq!(config.default_label, "benign");
        assert_eq!(config.target_delimiter, b';');
        assert_eq!(config.output_delimiter, b';');
        assert!(config.strict);
    }

    #[test]
    fn compression_policy_threshold_is_exclusive() {
        assert!(CompressionPolicy::Auto.should_compress(150_000, 100_000));
        assert!(!CompressionPolicy::Auto.should_compress(50_000, 100_000));
        assert!(!CompressionPolicy::Auto.should_compress(100_000, 100_000));
        assert!(CompressionPolicy::Always.should_compress(1, 100_000));
        assert!(!CompressionPolicy::Never.should_compress(1_000_000, 100_000));
    }
}
