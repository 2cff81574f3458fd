#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::{Compression, read::MultiGzDecoder, write::GzEncoder};
use std::io::Read;
use tempfile::{TempDir, tempdir};

pub const BOT_IOT_CONFIG: &str = r#"{
  "datasets": {
    "Bot-IoT": {
      "target_key_columns": ["src_ip", "dst_ip"],
      "reference_key_columns": ["saddr", "daddr"],
      "column_mapping": {},
      "columns_to_copy": ["attack", "category", "subcategory"],
      "labeling_files": {"service_scan": "Service_Scan"}
    },
    "TON_IoT": {
      "target_key_columns": ["saddr", "daddr", "sport", "dport"],
      "reference_key_columns": ["src_ip", "dst_ip", "src_port", "dst_port"],
      "column_mapping": {
        "saddr": "src_ip",
        "daddr": "dst_ip",
        "sport": "src_port",
        "dport": "dst_port"
      },
      "columns_to_copy": ["protocol", "attack_type"],
      "labeling_files": {},
      "reference_delimiter": ","
    }
  }
}"#;

/// Scratch directory holding a labels directory, a targets directory and a
/// configuration file. Files are removed on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let workspace = Self {
            temp_dir: tempdir().expect("temp dir"),
        };
        fs::create_dir_all(workspace.labels_dir()).expect("labels dir");
        fs::create_dir_all(workspace.targets_dir()).expect("targets dir");
        workspace.write("config.json", BOT_IOT_CONFIG);
        workspace
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn labels_dir(&self) -> PathBuf {
        self.path().join("labels")
    }

    pub fn targets_dir(&self) -> PathBuf {
        self.path().join("targets")
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("config.json")
    }

    /// Writes `contents` under the workspace root and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn write_label(&self, name: &str, contents: &str) -> PathBuf {
        self.write(&format!("labels/{name}"), contents)
    }

    pub fn write_target(&self, name: &str, contents: &str) -> PathBuf {
        self.write(&format!("targets/{name}"), contents)
    }

    pub fn write_gzip(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path().join(name);
        let file = File::create(&path).expect("create gzip file");
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder
            .write_all(contents.as_bytes())
            .expect("write gzip contents");
        encoder.finish().expect("finish gzip");
        path
    }
}

pub fn read_gzip(path: &Path) -> String {
    let mut text = String::new();
    MultiGzDecoder::new(File::open(path).expect("open gzip"))
        .read_to_string(&mut text)
        .expect("gunzip");
    text
}

/// Reference rows for the Bot-IoT keylogging capture.
pub const KEYLOGGING_LABELS: &str = "saddr;daddr;attack;category;subcategory\n\
\"192.168.100.147\";\"192.168.100.3\";1;Theft;Keylogging\n\
192.168.100.150;192.168.100.3;1;Theft;Keylogging\n";

pub const DATA_EXFILTRATION_LABELS: &str = "saddr;daddr;attack;category;subcategory\n\
192.168.100.147;192.168.100.3;1;Theft;Data_Exfiltration\n";
