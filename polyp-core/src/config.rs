//! Configuration for polyp-scope
//!
//! Values are layered: built-in defaults, then a TOML or YAML file, then
//! `POLYP_*` environment variables, then command-line flags (applied by the
//! binary). Every section uses `#[serde(default)]` so partial files work.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How often the examination loop hands frames to the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistencePolicy {
    /// Nothing is recorded
    Off,
    /// Only the session row is written
    Session,
    /// Session row plus every n-th frame (n >= 1)
    EveryNFrames(u32),
}

impl PersistencePolicy {
    pub fn records_session(&self) -> bool {
        !matches!(self, PersistencePolicy::Off)
    }

    pub fn records_frame(&self, index: u64) -> bool {
        match self {
            PersistencePolicy::EveryNFrames(n) if *n > 0 => index % (*n as u64) == 0,
            _ => false,
        }
    }

    /// Parse the short form used by env vars and flags:
    /// `off`, `session`, or `every:<n>`.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim().to_ascii_lowercase();
        match value.as_str() {
            "off" | "none" => Ok(PersistencePolicy::Off),
            "session" => Ok(PersistencePolicy::Session),
            other => {
                let n = other
                    .strip_prefix("every:")
                    .ok_or_else(|| {
                        Error::Configuration(format!("unknown persistence policy '{}'", other))
                    })?
                    .parse::<u32>()
                    .map_err(|e| Error::Configuration(format!("invalid frame interval: {}", e)))?;
                Ok(PersistencePolicy::EveryNFrames(n))
            }
        }
    }
}

impl Default for PersistencePolicy {
    fn default() -> Self {
        PersistencePolicy::Off
    }
}

/// Which detector implementation to load at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorBackend {
    Onnx,
    None,
}

/// HTTP UI settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Bundled example videos offered in the picker
    pub examples_dir: PathBuf,
    /// Where uploaded videos are stored
    pub upload_dir: PathBuf,
    /// JPEG quality for the display stream (1-100)
    pub jpeg_quality: u8,
    /// Frames buffered per viewer before it starts skipping
    pub stream_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7860".to_string(),
            examples_dir: PathBuf::from("./assets/examples"),
            upload_dir: PathBuf::from("./uploads"),
            jpeg_quality: 85,
            stream_buffer: 16,
        }
    }
}

/// Detection model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub backend: DetectorBackend,
    pub model_path: PathBuf,
    /// Square model input size in pixels
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Sigmoid threshold applied to mask logits
    pub mask_threshold: f32,
    pub max_detections: usize,
    pub intra_threads: usize,
    pub model_name: String,
    pub model_version: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            backend: DetectorBackend::Onnx,
            model_path: PathBuf::from("./models/best.onnx"),
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            mask_threshold: 0.5,
            max_detections: 100,
            intra_threads: 4,
            model_name: "Yolo".to_string(),
            model_version: "v8".to_string(),
        }
    }
}

/// Capture apparatus identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub model: String,
    pub serial_number: String,
    pub location: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            model: "Endoscope Model X".to_string(),
            serial_number: "123456789".to_string(),
            location: "Room 1".to_string(),
        }
    }
}

/// Initial toggles and loop tolerances
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExaminationConfig {
    pub detection_enabled: bool,
    pub segmentation_enabled: bool,
    /// Consecutive frame-read failures tolerated before the feed ends
    pub max_consecutive_read_errors: u32,
}

impl Default for ExaminationConfig {
    fn default() -> Self {
        Self {
            detection_enabled: true,
            segmentation_enabled: true,
            max_consecutive_read_errors: 3,
        }
    }
}

/// Local relational store and image output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub raw_output_dir: PathBuf,
    pub segmented_output_dir: PathBuf,
    pub persistence: PersistencePolicy,
    /// Frames waiting to be written; further frames are dropped
    pub recorder_queue: usize,
    pub segmentation_model_name: String,
    pub segmentation_model_version: String,
    pub doctor_id: i64,
    pub patient_id: i64,
    pub device_id: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./colonoscopy_management.db"),
            raw_output_dir: PathBuf::from("./output/raw"),
            segmented_output_dir: PathBuf::from("./output/segmented"),
            persistence: PersistencePolicy::Off,
            recorder_queue: 64,
            segmentation_model_name: "DE-ColonSegNet".to_string(),
            segmentation_model_version: "v1".to_string(),
            doctor_id: 1,
            patient_id: 1,
            device_id: 1,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub server: ServerConfig,
    pub detector: DetectorConfig,
    pub device: DeviceConfig,
    pub examination: ExaminationConfig,
    pub storage: StorageConfig,
}

impl ScopeConfig {
    /// Load from a TOML or YAML file. The extension picks the parser;
    /// unknown extensions try TOML first, then YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| Error::Serialization(format!("{}: {}", path.display(), e))),
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| Error::Serialization(format!("{}: {}", path.display(), e))),
            _ => {
                if let Ok(config) = toml::from_str::<ScopeConfig>(&content) {
                    return Ok(config);
                }
                serde_yaml::from_str(&content).map_err(|e| {
                    Error::Serialization(format!("{}: unknown config format ({})", path.display(), e))
                })
            }
        }
    }

    /// Apply `POLYP_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("POLYP_BIND") {
            self.server.bind_address = bind;
        }
        if let Some(db) = lookup("POLYP_DATABASE") {
            self.storage.database_path = PathBuf::from(db);
        }
        if let Some(model) = lookup("POLYP_MODEL") {
            self.detector.model_path = PathBuf::from(model);
        }
        if let Some(dir) = lookup("POLYP_EXAMPLES_DIR") {
            self.server.examples_dir = PathBuf::from(dir);
        }
        if let Some(policy) = lookup("POLYP_PERSISTENCE") {
            self.storage.persistence = PersistencePolicy::parse(&policy)?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_address.trim().is_empty() {
            return Err(Error::Configuration("bind address must not be empty".to_string()));
        }
        if !(1..=100).contains(&self.server.jpeg_quality) {
            return Err(Error::Configuration(
                "jpeg_quality must be between 1 and 100".to_string(),
            ));
        }
        if self.server.stream_buffer == 0 {
            return Err(Error::Configuration("stream_buffer must be at least 1".to_string()));
        }

        let detector = &self.detector;
        if detector.input_size == 0 || detector.input_size % 32 != 0 {
            return Err(Error::Configuration(
                "detector input_size must be a positive multiple of 32".to_string(),
            ));
        }
        for (name, value) in [
            ("confidence_threshold", detector.confidence_threshold),
            ("iou_threshold", detector.iou_threshold),
            ("mask_threshold", detector.mask_threshold),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(Error::Configuration(format!("{} must be within [0, 1]", name)));
            }
        }
        if detector.max_detections == 0 {
            return Err(Error::Configuration("max_detections must be at least 1".to_string()));
        }

        if let PersistencePolicy::EveryNFrames(0) = self.storage.persistence {
            return Err(Error::Configuration(
                "every_n_frames interval must be at least 1".to_string(),
            ));
        }
        if self.storage.recorder_queue == 0 {
            return Err(Error::Configuration("recorder_queue must be at least 1".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = ScopeConfig::default();
        assert_eq!(config.server.bind_address, "127.0.0.1:7860");
        assert_eq!(config.detector.backend, DetectorBackend::Onnx);
        assert_eq!(config.detector.input_size, 640);
        assert_eq!(config.device.model, "Endoscope Model X");
        assert_eq!(config.device.serial_number, "123456789");
        assert!(config.examination.detection_enabled);
        assert!(config.examination.segmentation_enabled);
        assert_eq!(config.storage.persistence, PersistencePolicy::Off);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_jpeg_quality() {
        let mut config = ScopeConfig::default();
        config.server.jpeg_quality = 0;
        assert!(config.validate().is_err());
        config.server.jpeg_quality = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_thresholds() {
        let mut config = ScopeConfig::default();
        config.detector.iou_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = ScopeConfig::default();
        config.detector.confidence_threshold = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_input_size() {
        let mut config = ScopeConfig::default();
        config.detector.input_size = 600;
        assert!(config.validate().is_err());
        config.detector.input_size = 320;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_interval() {
        let mut config = ScopeConfig::default();
        config.storage.persistence = PersistencePolicy::EveryNFrames(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_persistence_policy_records() {
        assert!(!PersistencePolicy::Off.records_session());
        assert!(!PersistencePolicy::Off.records_frame(0));
        assert!(PersistencePolicy::Session.records_session());
        assert!(!PersistencePolicy::Session.records_frame(0));

        let every_five = PersistencePolicy::EveryNFrames(5);
        assert!(every_five.records_session());
        assert!(every_five.records_frame(0));
        assert!(!every_five.records_frame(4));
        assert!(every_five.records_frame(10));
    }

    #[test]
    fn test_persistence_policy_parse() {
        assert_eq!(PersistencePolicy::parse("off").unwrap(), PersistencePolicy::Off);
        assert_eq!(PersistencePolicy::parse(" Session ").unwrap(), PersistencePolicy::Session);
        assert_eq!(
            PersistencePolicy::parse("every:25").unwrap(),
            PersistencePolicy::EveryNFrames(25)
        );
        assert!(PersistencePolicy::parse("sometimes").is_err());
        assert!(PersistencePolicy::parse("every:x").is_err());
    }

    #[test]
    fn test_config_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
bind_address = "0.0.0.0:9000"

[storage]
persistence = {{ every_n_frames = 10 }}
"#
        )
        .unwrap();

        let config = ScopeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:9000");
        assert_eq!(config.storage.persistence, PersistencePolicy::EveryNFrames(10));
        // untouched sections keep defaults
        assert_eq!(config.detector.model_name, "Yolo");
    }

    #[test]
    fn test_config_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "detector:\n  backend: none\n  input_size: 320\n").unwrap();

        let config = ScopeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.detector.backend, DetectorBackend::None);
        assert_eq!(config.detector.input_size, 320);
    }

    #[test]
    fn test_config_from_missing_file() {
        let result = ScopeConfig::from_file("/definitely/not/here.toml");
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_apply_vars() {
        let vars: HashMap<&str, &str> = [
            ("POLYP_BIND", "0.0.0.0:1234"),
            ("POLYP_DATABASE", "/tmp/scope.db"),
            ("POLYP_PERSISTENCE", "every:3"),
        ]
        .into_iter()
        .collect();

        let mut config = ScopeConfig::default();
        config
            .apply_vars(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.bind_address, "0.0.0.0:1234");
        assert_eq!(config.storage.database_path, PathBuf::from("/tmp/scope.db"));
        assert_eq!(config.storage.persistence, PersistencePolicy::EveryNFrames(3));
        assert_eq!(config.detector.model_path, PathBuf::from("./models/best.onnx"));
    }
}
