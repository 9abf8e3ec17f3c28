//! YOLOv8-seg pre/post-processing
//!
//! Everything here is pure so it can be tested without a runtime or a model.

use crate::error::VisionError;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use polyp_core::{BoundingBox, Frame, Mask};
use std::cmp::Ordering;

const PAD_VALUE: u8 = 114;

/// Mapping between source-frame and model-input coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub input_size: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

impl Letterbox {
    pub fn new(src_width: u32, src_height: u32, input_size: u32) -> Self {
        let scale = (input_size as f32 / src_width.max(1) as f32)
            .min(input_size as f32 / src_height.max(1) as f32);
        let scaled_width = ((src_width as f32 * scale).round() as u32).clamp(1, input_size);
        let scaled_height = ((src_height as f32 * scale).round() as u32).clamp(1, input_size);
        Self {
            scale,
            pad_x: ((input_size - scaled_width) / 2) as f32,
            pad_y: ((input_size - scaled_height) / 2) as f32,
            input_size,
            scaled_width,
            scaled_height,
        }
    }

    /// Map a box in model-input pixels back to source-frame pixels.
    pub fn to_source(&self, bbox: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            (bbox.x1 - self.pad_x) / self.scale,
            (bbox.y1 - self.pad_y) / self.scale,
            (bbox.x2 - self.pad_x) / self.scale,
            (bbox.y2 - self.pad_y) / self.scale,
        )
    }

    /// Map a source-frame point to model-input pixels.
    pub fn to_input(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale + self.pad_x, y * self.scale + self.pad_y)
    }
}

/// Resize with preserved aspect ratio onto a grey square and produce a
/// normalised NCHW tensor (batch of one).
pub fn letterbox_tensor(frame: &Frame, input_size: u32) -> (Vec<f32>, Letterbox) {
    let letterbox = Letterbox::new(frame.width, frame.height, input_size);
    let rgb = frame.to_rgb_image();
    let resized = imageops::resize(
        &rgb,
        letterbox.scaled_width,
        letterbox.scaled_height,
        FilterType::Triangle,
    );

    let mut canvas = RgbImage::from_pixel(input_size, input_size, Rgb([PAD_VALUE; 3]));
    imageops::replace(
        &mut canvas,
        &resized,
        letterbox.pad_x as i64,
        letterbox.pad_y as i64,
    );

    let plane = (input_size * input_size) as usize;
    let mut tensor = vec![0.0f32; plane * 3];
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let offset = (y * input_size + x) as usize;
        for c in 0..3 {
            tensor[c * plane + offset] = pixel.0[c] as f32 / 255.0;
        }
    }
    (tensor, letterbox)
}

/// Shape of a YOLOv8(-seg) export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
    pub num_anchors: usize,
    pub num_classes: usize,
    /// Mask coefficients per anchor, 0 for detection-only exports
    pub num_coefficients: usize,
    pub proto_height: usize,
    pub proto_width: usize,
}

impl OutputLayout {
    /// Derive the layout from `[1, 4 + nc + nm, anchors]` and the optional
    /// `[1, nm, ph, pw]` prototype output.
    pub fn from_shapes(predictions: &[i64], prototypes: Option<&[i64]>) -> Result<Self, VisionError> {
        if predictions.len() != 3 || predictions[0] != 1 {
            return Err(VisionError::Model(format!(
                "unexpected prediction shape {:?}",
                predictions
            )));
        }
        let features = predictions[1].max(0) as usize;
        let num_anchors = predictions[2].max(0) as usize;

        let (num_coefficients, proto_height, proto_width) = match prototypes {
            Some(shape) => {
                if shape.len() != 4 || shape[0] != 1 {
                    return Err(VisionError::Model(format!(
                        "unexpected prototype shape {:?}",
                        shape
                    )));
                }
                (shape[1].max(0) as usize, shape[2].max(0) as usize, shape[3].max(0) as usize)
            }
            None => (0, 0, 0),
        };

        if features <= 4 + num_coefficients {
            return Err(VisionError::Model(format!(
                "prediction has {} features, too few for {} mask coefficients",
                features, num_coefficients
            )));
        }

        Ok(Self {
            num_anchors,
            num_classes: features - 4 - num_coefficients,
            num_coefficients,
            proto_height,
            proto_width,
        })
    }

    fn features(&self) -> usize {
        4 + self.num_classes + self.num_coefficients
    }
}

/// A scored box in model-input coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: usize,
    pub coefficients: Vec<f32>,
}

/// Decode the channel-major prediction tensor, keeping anchors whose best
/// class score exceeds `confidence_threshold`.
pub fn decode_predictions(
    output: &[f32],
    layout: &OutputLayout,
    confidence_threshold: f32,
) -> Result<Vec<Candidate>, VisionError> {
    let anchors = layout.num_anchors;
    let expected = layout.features() * anchors;
    if output.len() < expected {
        return Err(VisionError::Model(format!(
            "prediction tensor has {} values, expected {}",
            output.len(),
            expected
        )));
    }

    let at = |feature: usize, anchor: usize| output[feature * anchors + anchor];
    let mut candidates = Vec::new();

    for anchor in 0..anchors {
        let mut best_class = 0;
        let mut best_score = f32::MIN;
        for class in 0..layout.num_classes {
            let score = at(4 + class, anchor);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if !best_score.is_finite() || best_score <= confidence_threshold {
            continue;
        }

        let bbox = BoundingBox::from_center(
            at(0, anchor),
            at(1, anchor),
            at(2, anchor),
            at(3, anchor),
        );
        let coefficient_base = 4 + layout.num_classes;
        let coefficients = (0..layout.num_coefficients)
            .map(|k| at(coefficient_base + k, anchor))
            .collect();

        candidates.push(Candidate {
            bbox,
            confidence: best_score,
            class_id: best_class,
            coefficients,
        });
    }

    Ok(candidates)
}

/// Greedy per-class non-maximum suppression, highest confidence first.
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Mask prototypes, `[nm, height, width]` row-major.
pub struct Prototypes<'a> {
    pub data: &'a [f32],
    pub count: usize,
    pub height: usize,
    pub width: usize,
}

impl<'a> Prototypes<'a> {
    pub fn new(data: &'a [f32], layout: &OutputLayout) -> Result<Self, VisionError> {
        let expected = layout.num_coefficients * layout.proto_height * layout.proto_width;
        if data.len() < expected {
            return Err(VisionError::Model(format!(
                "prototype tensor has {} values, expected {}",
                data.len(),
                expected
            )));
        }
        Ok(Self {
            data,
            count: layout.num_coefficients,
            height: layout.proto_height,
            width: layout.proto_width,
        })
    }

    /// Linear combination of the prototypes, one logit per proto cell.
    fn combine(&self, coefficients: &[f32]) -> Vec<f32> {
        let plane = self.height * self.width;
        let mut logits = vec![0.0f32; plane];
        for (k, coefficient) in coefficients.iter().enumerate().take(self.count) {
            let proto = &self.data[k * plane..(k + 1) * plane];
            for (logit, value) in logits.iter_mut().zip(proto) {
                *logit += coefficient * value;
            }
        }
        logits
    }
}

/// Build a frame-sized mask for one detection, cropped to its box.
pub fn decode_mask(
    coefficients: &[f32],
    prototypes: &Prototypes<'_>,
    source_box: &BoundingBox,
    letterbox: &Letterbox,
    frame_width: u32,
    frame_height: u32,
    threshold: f32,
) -> Mask {
    let mut mask = Mask::new(frame_width, frame_height);
    if prototypes.width == 0 || prototypes.height == 0 {
        return mask;
    }

    let logits = prototypes.combine(coefficients);
    let clamped = source_box.clamp(frame_width, frame_height);
    let proto_scale_x = prototypes.width as f32 / letterbox.input_size as f32;
    let proto_scale_y = prototypes.height as f32 / letterbox.input_size as f32;

    for y in clamped.y1.floor() as u32..=clamped.y2.ceil() as u32 {
        for x in clamped.x1.floor() as u32..=clamped.x2.ceil() as u32 {
            let (ix, iy) = letterbox.to_input(x as f32 + 0.5, y as f32 + 0.5);
            let px = ((ix * proto_scale_x) as usize).min(prototypes.width - 1);
            let py = ((iy * proto_scale_y) as usize).min(prototypes.height - 1);
            if sigmoid(logits[py * prototypes.width + px]) > threshold {
                mask.set(x, y, true);
            }
        }
    }
    mask
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
