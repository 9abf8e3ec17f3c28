//! Endoscope device: overlays detections onto captured frames

use crate::draw::{class_color, text_width, Canvas, Color, GLYPH_HEIGHT};
use image::RgbImage;
use polyp_core::config::DeviceConfig;
use polyp_core::{DetectionSet, Frame, Mask};
use serde::{Deserialize, Serialize};

/// Label drawn above every box.
pub const POLYP_LABEL: &str = "Polyp";

const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: i32 = 2;
const LABEL_PADDING: i32 = 3;
const MASK_OPACITY: f32 = 0.5;

/// A capture apparatus. Rendering is a pure function of its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndoscopeDevice {
    pub model: String,
    pub serial_number: String,
}

impl EndoscopeDevice {
    pub fn new(model: impl Into<String>, serial_number: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            serial_number: serial_number.into(),
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(&config.model, &config.serial_number)
    }

    /// Render `detections` onto `frame` and return a display-ready RGB image.
    ///
    /// Boxes and the "Polyp" label are drawn when `detection_enabled`; masks
    /// are blended on top when `segmentation_enabled`. With both off the
    /// result is the frame converted to RGB.
    pub fn capture_images(
        &self,
        frame: &Frame,
        detections: &DetectionSet,
        detection_enabled: bool,
        segmentation_enabled: bool,
    ) -> RgbImage {
        let mut canvas_frame = frame.clone();
        if detection_enabled {
            annotate_boxes(&mut canvas_frame, detections);
        }
        if segmentation_enabled {
            annotate_masks(&mut canvas_frame, detections);
        }
        canvas_frame.to_rgb_image()
    }
}

impl Default for EndoscopeDevice {
    fn default() -> Self {
        Self::from_config(&DeviceConfig::default())
    }
}

fn annotate_boxes(frame: &mut Frame, detections: &DetectionSet) {
    let mut canvas = Canvas::new(frame);
    for detection in detections {
        let color = class_color(detection.class_id);
        let bbox = detection.bbox.clamp(canvas.width() as u32, canvas.height() as u32);
        let (left, top) = (bbox.x1.round() as i32, bbox.y1.round() as i32);
        let (right, bottom) = (bbox.x2.round() as i32, bbox.y2.round() as i32);
        canvas.draw_rectangle(left, top, right, bottom, color, BOX_THICKNESS);

        let label_w = text_width(POLYP_LABEL, LABEL_SCALE) + 2 * LABEL_PADDING;
        let label_h = GLYPH_HEIGHT * LABEL_SCALE + 2 * LABEL_PADDING;
        // Above the box when there is room, otherwise inside it.
        let label_top = if top - label_h >= 0 { top - label_h } else { top };
        canvas.fill_rect(left, label_top, left + label_w - 1, label_top + label_h - 1, color);
        canvas.draw_text(
            left + LABEL_PADDING,
            label_top + LABEL_PADDING,
            POLYP_LABEL,
            color.contrasting_text(),
            LABEL_SCALE,
        );
    }
}

fn annotate_masks(frame: &mut Frame, detections: &DetectionSet) {
    let mut canvas = Canvas::new(frame);
    let (width, height) = (canvas.width(), canvas.height());
    for detection in detections {
        let Some(mask) = &detection.mask else { continue };
        let color = class_color(detection.class_id);
        for y in 0..height {
            for x in 0..width {
                if mask_hit(mask, x as u32, y as u32, width as u32, height as u32) {
                    canvas.blend(x, y, color, MASK_OPACITY);
                }
            }
        }
    }
}

/// Sample a mask at frame coordinates, scaling when its size differs.
fn mask_hit(mask: &Mask, x: u32, y: u32, frame_width: u32, frame_height: u32) -> bool {
    if mask.width() == frame_width && mask.height() == frame_height {
        return mask.get(x, y);
    }
    let mx = (x as u64 * mask.width() as u64 / frame_width.max(1) as u64) as u32;
    let my = (y as u64 * mask.height() as u64 / frame_height.max(1) as u64) as u32;
    mask.get(mx, my)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyp_core::{BoundingBox, ColorOrder, Detection};

    fn gray_frame() -> Frame {
        Frame::new(0, 64, 48, ColorOrder::Bgr, vec![40; 64 * 48 * 3]).unwrap()
    }

    #[test]
    fn test_device_from_config() {
        let device = EndoscopeDevice::default();
        assert_eq!(device.model, "Endoscope Model X");
        assert_eq!(device.serial_number, "123456789");
    }

    #[test]
    fn test_box_drawn_with_label_above() {
        let device = EndoscopeDevice::default();
        let frame = gray_frame();
        let set = DetectionSet::new(vec![Detection::new(
            BoundingBox::new(10.0, 30.0, 40.0, 45.0),
            0.8,
            0,
        )]);
        let out = device.capture_images(&frame, &set, true, false);
        let expected = class_color(0).0;
        assert_eq!(out.get_pixel(10, 35).0, expected);
        // Label background sits directly above the box.
        assert_eq!(out.get_pixel(11, 29).0, expected);
        // Interior untouched.
        assert_eq!(out.get_pixel(25, 40).0, [40, 40, 40]);
    }

    #[test]
    fn test_mask_scaled_to_frame() {
        let mut mask = Mask::new(2, 2);
        mask.set(1, 1, true);
        assert!(mask_hit(&mask, 63, 47, 64, 48));
        assert!(!mask_hit(&mask, 0, 0, 64, 48));
    }
}
