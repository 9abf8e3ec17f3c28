//! Polyp detectors
//!
//! A detector is loaded once at startup and shared read-only with every
//! examination through an `Arc<dyn Detector>`.

pub mod postprocess;
#[cfg(feature = "onnx")]
pub mod yolo;

#[cfg(feature = "onnx")]
pub use yolo::OnnxDetector;

use crate::error::VisionError;
use polyp_core::config::{DetectorBackend, DetectorConfig};
use polyp_core::{DetectionSet, Frame};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Name and version of the model behind a detector, as recorded in the
/// `DetectionModel` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub version: String,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Maps one frame to its detection set. One synchronous call per frame,
/// no retries and no batching.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<DetectionSet, VisionError>;

    fn descriptor(&self) -> ModelDescriptor;
}

/// Detector that never finds anything. Lets the UI run without a model.
#[derive(Debug, Clone, Default)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&self, _frame: &Frame) -> Result<DetectionSet, VisionError> {
        Ok(DetectionSet::empty())
    }

    fn descriptor(&self) -> ModelDescriptor {
        ModelDescriptor::new("none", "0")
    }
}

/// Load the configured detector. Failures are returned to the caller,
/// which is expected to abort startup.
pub fn load_detector(config: &DetectorConfig) -> Result<Arc<dyn Detector>, VisionError> {
    match config.backend {
        DetectorBackend::None => {
            warn!("Detector backend is 'none'; frames will be rendered without detections");
            Ok(Arc::new(NullDetector))
        }
        DetectorBackend::Onnx => load_onnx(config),
    }
}

#[cfg(feature = "onnx")]
fn load_onnx(config: &DetectorConfig) -> Result<Arc<dyn Detector>, VisionError> {
    let detector = OnnxDetector::load(config)?;
    info!(
        "Loaded {} {} from {}",
        config.model_name,
        config.model_version,
        config.model_path.display()
    );
    Ok(Arc::new(detector))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(config: &DetectorConfig) -> Result<Arc<dyn Detector>, VisionError> {
    info!("ONNX backend requested for {}", config.model_path.display());
    Err(VisionError::Model(
        "this build has no ONNX support; rebuild with the `onnx` feature or set detector.backend = \"none\""
            .to_string(),
    ))
}
