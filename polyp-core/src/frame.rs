//! Raw video frames

use crate::error::{Error, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Channel order of a 3-channel raster.
///
/// Capture sources decode to `Bgr`; the display side always wants `Rgb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorOrder {
    Bgr,
    Rgb,
}

/// A single `height x width x 3` image read from a video source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Zero-based position of the frame in its source
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub order: ColorOrder,
    /// Row-major interleaved pixels, `width * height * 3` bytes
    pub data: Vec<u8>,
}

impl Frame {
    /// Build a frame, checking the buffer length against the dimensions.
    pub fn new(index: u64, width: u32, height: u32, order: ColorOrder, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidFrame(format!(
                "frame dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }

        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|p| p.checked_mul(3))
            .ok_or_else(|| Error::InvalidFrame("frame dimensions overflow".to_string()))?;

        if data.len() != expected {
            return Err(Error::InvalidFrame(format!(
                "expected {} bytes for {}x{} frame, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }

        Ok(Self {
            index,
            width,
            height,
            order,
            data,
        })
    }

    /// Wrap a decoded RGB image.
    pub fn from_rgb_image(index: u64, image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            index,
            width,
            height,
            order: ColorOrder::Rgb,
            data: image.into_raw(),
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Return a copy of this frame with its channels in `order`.
    pub fn to_order(&self, order: ColorOrder) -> Frame {
        if self.order == order {
            return self.clone();
        }
        Frame {
            index: self.index,
            width: self.width,
            height: self.height,
            order,
            data: swap_red_blue(&self.data),
        }
    }

    /// Convert to an RGB image for display or encoding.
    pub fn to_rgb_image(&self) -> RgbImage {
        let data = match self.order {
            ColorOrder::Rgb => self.data.clone(),
            ColorOrder::Bgr => swap_red_blue(&self.data),
        };
        // Length was checked at construction.
        RgbImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}

fn swap_red_blue(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks_exact(3) {
        output.push(chunk[2]);
        output.push(chunk[1]);
        output.push(chunk[0]);
    }
    output
}
