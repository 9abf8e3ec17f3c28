//! Video file decoding through an `ffmpeg` subprocess
//!
//! `ffprobe` reports the stream size, then `ffmpeg` writes raw `bgr24`
//! frames to a pipe which is read one frame at a time. Rotation metadata is
//! ignored so the decoded frames keep the coded size that was probed.

use super::VideoSource;
use crate::error::VisionError;
use polyp_core::{ColorOrder, Frame};
use std::ffi::OsString;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

pub struct FfmpegSource {
    path: PathBuf,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    width: u32,
    height: u32,
    next_index: u64,
}

impl FfmpegSource {
    /// Probe and start decoding `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VisionError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(VisionError::Source(format!(
                "video file not found: {}",
                path.display()
            )));
        }

        let (width, height) = probe_dimensions(path)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(decoder_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .map_err(|e| VisionError::Source(format!("failed to spawn ffmpeg: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VisionError::Source("ffmpeg stdout unavailable".to_string()))?;

        debug!("Decoding {} at {}x{}", path.display(), width, height);

        Ok(Self {
            path: path.to_path_buf(),
            child: Some(child),
            stdout: Some(stdout),
            width,
            height,
            next_index: 0,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl VideoSource for FfmpegSource {
    fn read(&mut self) -> Result<Option<Frame>, VisionError> {
        let frame_bytes = self.frame_bytes();
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buffer = vec![0u8; frame_bytes];
        let filled = read_full(stdout, &mut buffer)
            .map_err(|e| VisionError::FrameRead(format!("frame {}: {}", self.next_index, e)))?;

        if filled == 0 {
            return Ok(None);
        }
        if filled < frame_bytes {
            warn!(
                "Truncated frame {} in {} ({} of {} bytes), treating as end of stream",
                self.next_index,
                self.path.display(),
                filled,
                frame_bytes
            );
            return Ok(None);
        }

        let frame = Frame::new(self.next_index, self.width, self.height, ColorOrder::Bgr, buffer)?;
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            debug!("Released ffmpeg decoder for {}", self.path.display());
        }
    }

    fn describe(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Fill `buffer` as far as the reader allows; returns the bytes read.
fn read_full<R: Read>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn probe_dimensions(path: &Path) -> Result<(u32, u32), VisionError> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg("stream=width,height")
        .arg("-of")
        .arg("csv=s=x:p=0")
        .arg(path)
        .output()
        .map_err(|e| VisionError::Source(format!("failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(VisionError::Source(format!(
            "ffprobe failed on {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_dimensions(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
        VisionError::Source(format!("no video stream found in {}", path.display()))
    })
}

/// Parse ffprobe's `WIDTHxHEIGHT` output.
pub(crate) fn parse_dimensions(text: &str) -> Option<(u32, u32)> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (w, h) = line.split_once('x')?;
    let width = w.trim().parse::<u32>().ok()?;
    let height = h.trim().trim_end_matches('x').parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

/// Arguments for decoding `path` to raw `bgr24` on stdout.
pub(crate) fn decoder_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-noautorotate", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_os_string());
    args.extend(
        ["-an", "-pix_fmt", "bgr24", "-f", "rawvideo", "-"]
            .into_iter()
            .map(OsString::from),
    );
    args
}
