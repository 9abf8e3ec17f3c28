//! Video sources and sinks

pub mod ffmpeg;
pub mod sequence;
pub mod writer;

pub use ffmpeg::FfmpegSource;
pub use sequence::ImageSequenceSource;
pub use writer::{encode_image_sequence, VideoWriter};

use crate::error::VisionError;
use polyp_core::Frame;
use std::path::Path;

/// A pull-based source of frames.
pub trait VideoSource: Send {
    /// Read the next frame. `Ok(None)` means the source is exhausted; an
    /// error is a single failed read and the source may still be usable.
    fn read(&mut self) -> Result<Option<Frame>, VisionError>;

    /// Release the underlying handle. Reads afterwards return `Ok(None)`.
    fn release(&mut self);

    /// Short human-readable name for logs and session records.
    fn describe(&self) -> String;
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn read(&mut self) -> Result<Option<Frame>, VisionError> {
        (**self).read()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Open a video file through ffmpeg, or a directory as an image sequence.
pub fn open_video(path: impl AsRef<Path>) -> Result<Box<dyn VideoSource>, VisionError> {
    let path = path.as_ref();
    if path.is_dir() {
        Ok(Box::new(ImageSequenceSource::open(path)?))
    } else {
        Ok(Box::new(FfmpegSource::open(path)?))
    }
}
