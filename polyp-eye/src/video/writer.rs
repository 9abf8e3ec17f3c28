//! MP4 output through an `ffmpeg` subprocess

use super::{ImageSequenceSource, VideoSource};
use crate::error::VisionError;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use tracing::{info, warn};

/// Streams RGB images into an `mpeg4` encoded file.
pub struct VideoWriter {
    output: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
    frames_written: u64,
}

impl VideoWriter {
    pub fn create(output: impl AsRef<Path>, width: u32, height: u32, fps: u32) -> Result<Self, VisionError> {
        let output = output.as_ref();
        if width == 0 || height == 0 {
            return Err(VisionError::Encode(format!("invalid frame size {}x{}", width, height)));
        }
        if fps == 0 {
            return Err(VisionError::Encode("fps must be at least 1".to_string()));
        }
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut child = Command::new("ffmpeg")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-s")
            .arg(format!("{}x{}", width, height))
            .arg("-r")
            .arg(fps.to_string())
            .arg("-i")
            .arg("-")
            .arg("-vf")
            .arg("scale=trunc(iw/2)*2:trunc(ih/2)*2")
            .arg("-c:v")
            .arg("mpeg4")
            .arg("-q:v")
            .arg("5")
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| VisionError::Encode(format!("failed to spawn ffmpeg: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| VisionError::Encode("ffmpeg stdin unavailable".to_string()))?;

        Ok(Self {
            output: output.to_path_buf(),
            child,
            stdin: Some(stdin),
            width,
            height,
            frames_written: 0,
        })
    }

    /// Append one image, resizing it if it does not match the output size.
    pub fn write(&mut self, image: &RgbImage) -> Result<(), VisionError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| VisionError::Encode("writer already finished".to_string()))?;

        let resized;
        let image = if image.dimensions() == (self.width, self.height) {
            image
        } else {
            resized = imageops::resize(image, self.width, self.height, FilterType::Triangle);
            &resized
        };

        stdin
            .write_all(image.as_raw())
            .map_err(|e| VisionError::Encode(format!("failed to write frame: {}", e)))?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Close the stream and wait for ffmpeg. Returns the number of frames.
    pub fn finish(mut self) -> Result<u64, VisionError> {
        self.stdin = None;
        let status = self.child.wait()?;
        if !status.success() {
            return Err(VisionError::Encode(format!(
                "ffmpeg exited with {} while writing {}",
                status,
                self.output.display()
            )));
        }
        info!("Wrote {} frames to {}", self.frames_written, self.output.display());
        Ok(self.frames_written)
    }
}

impl Drop for VideoWriter {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            if let Err(e) = self.child.wait() {
                warn!("ffmpeg did not exit cleanly for {}: {}", self.output.display(), e);
            }
        }
    }
}

/// Encode the numbered images in `dir` into a video at `fps`. The first
/// readable image fixes the output size; unreadable images are skipped.
pub fn encode_image_sequence(
    dir: impl AsRef<Path>,
    output: impl AsRef<Path>,
    fps: u32,
) -> Result<u64, VisionError> {
    let mut source = ImageSequenceSource::open(dir.as_ref())?;
    if source.is_empty() {
        return Err(VisionError::Source(format!(
            "no images found in {}",
            dir.as_ref().display()
        )));
    }

    let mut writer: Option<VideoWriter> = None;
    loop {
        let frame = match source.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!("Skipping image: {}", e);
                continue;
            }
        };
        let image = frame.to_rgb_image();
        if writer.is_none() {
            writer = Some(VideoWriter::create(
                output.as_ref(),
                image.width(),
                image.height(),
                fps,
            )?);
        }
        if let Some(writer) = writer.as_mut() {
            writer.write(&image)?;
        }
    }

    match writer {
        Some(writer) => writer.finish(),
        None => Err(VisionError::Source(format!(
            "no readable images in {}",
            dir.as_ref().display()
        ))),
    }
}
