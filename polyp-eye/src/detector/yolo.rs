//! YOLOv8-seg detector on ONNX Runtime

use super::postprocess::{
    decode_mask, decode_predictions, letterbox_tensor, non_max_suppression, OutputLayout,
    Prototypes,
};
use super::{Detector, ModelDescriptor};
use crate::error::VisionError;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use polyp_core::config::DetectorConfig;
use polyp_core::{Detection, DetectionSet, Frame};
use tracing::{debug, info};

/// Segmentation-capable YOLO model exported to ONNX.
pub struct OnnxDetector {
    session: Mutex<Session>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
    mask_threshold: f32,
    max_detections: usize,
    descriptor: ModelDescriptor,
}

impl OnnxDetector {
    /// Load the model from `config.model_path`
    pub fn load(config: &DetectorConfig) -> Result<Self, VisionError> {
        if !config.model_path.is_file() {
            return Err(VisionError::Model(format!(
                "model file not found: {}",
                config.model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| VisionError::Ort(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| VisionError::Ort(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(config.intra_threads.max(1))
            .map_err(|e| VisionError::Ort(format!("Failed to set thread count: {}", e)))?
            .commit_from_file(&config.model_path)
            .map_err(|e| VisionError::Ort(format!("Failed to load YOLO model: {}", e)))?;

        info!(
            "YOLO model loaded from {:?} ({} inputs, {} outputs)",
            config.model_path,
            session.inputs.len(),
            session.outputs.len()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_size: config.input_size,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            mask_threshold: config.mask_threshold,
            max_detections: config.max_detections,
            descriptor: ModelDescriptor::new(&config.model_name, &config.model_version),
        })
    }
}

impl Detector for OnnxDetector {
    fn detect(&self, frame: &Frame) -> Result<DetectionSet, VisionError> {
        let size = self.input_size as usize;
        let (input, letterbox) = letterbox_tensor(frame, self.input_size);
        let tensor = Tensor::from_array(([1usize, 3, size, size], input))
            .map_err(|e| VisionError::Ort(format!("Failed to create input tensor: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| VisionError::Ort(format!("YOLO inference failed: {}", e)))?;

        if outputs.len() == 0 {
            return Ok(DetectionSet::empty());
        }

        let (prediction_shape, predictions) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::Ort(format!("Failed to extract predictions: {}", e)))?;
        let prototypes = if outputs.len() > 1 {
            Some(
                outputs[1]
                    .try_extract_tensor::<f32>()
                    .map_err(|e| VisionError::Ort(format!("Failed to extract prototypes: {}", e)))?,
            )
        } else {
            None
        };

        let layout = OutputLayout::from_shapes(
            prediction_shape,
            prototypes.as_ref().map(|(shape, _)| &shape[..]),
        )?;
        let candidates = decode_predictions(predictions, &layout, self.confidence_threshold)?;
        let kept = non_max_suppression(candidates, self.iou_threshold, self.max_detections);
        debug!("YOLO kept {} detections for frame {}", kept.len(), frame.index);

        let prototypes = match prototypes {
            Some((_, data)) if layout.num_coefficients > 0 => Some(Prototypes::new(data, &layout)?),
            _ => None,
        };

        let detections = kept
            .into_iter()
            .map(|candidate| {
                let bbox = letterbox
                    .to_source(&candidate.bbox)
                    .clamp(frame.width, frame.height);
                let detection = Detection::new(bbox, candidate.confidence, candidate.class_id);
                match &prototypes {
                    Some(protos) => detection.with_mask(decode_mask(
                        &candidate.coefficients,
                        protos,
                        &bbox,
                        &letterbox,
                        frame.width,
                        frame.height,
                        self.mask_threshold,
                    )),
                    None => detection,
                }
            })
            .collect();

        Ok(detections)
    }

    fn descriptor(&self) -> ModelDescriptor {
        self.descriptor.clone()
    }
}
