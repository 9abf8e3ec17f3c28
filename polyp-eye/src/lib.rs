//! polyp-eye: detection, rendering and the examination loop
//!
//! Frames come from a [`VideoSource`], pass through a shared [`Detector`],
//! are rendered by an [`EndoscopeDevice`] and are handed out by
//! [`Examination::perform`] one at a time.

pub mod detector;
pub mod device;
mod draw;
pub mod error;
pub mod examination;
pub mod video;

pub use detector::{load_detector, Detector, ModelDescriptor, NullDetector};
pub use device::{EndoscopeDevice, POLYP_LABEL};
pub use error::VisionError;
pub use examination::{
    encode_jpeg, AnnotatedFrame, Examination, ExaminationControls, Performance, ToggleSnapshot,
};
pub use video::{
    encode_image_sequence, open_video, FfmpegSource, ImageSequenceSource, VideoSource, VideoWriter,
};

#[cfg(feature = "onnx")]
pub use detector::OnnxDetector;
