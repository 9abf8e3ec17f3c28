// Headless examination: feed a video through the loop and write the result

use anyhow::{bail, Context};
use polyp_eye::{encode_jpeg, open_video, Examination, VideoWriter};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where annotated frames go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// One JPEG per frame, `frame_000000.jpg` onwards
    Frames(PathBuf),
    /// A single mp4 encoded by ffmpeg
    Video { path: PathBuf, fps: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub detections: u64,
}

/// Run one feed to completion on the calling thread.
pub fn run(
    examination: &Examination,
    video: &Path,
    output: &Output,
    jpeg_quality: u8,
) -> anyhow::Result<RunSummary> {
    let source = open_video(video).with_context(|| format!("cannot open {}", video.display()))?;

    if let Output::Frames(dir) = output {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create {}", dir.display()))?;
    }

    let mut writer: Option<VideoWriter> = None;
    let mut summary = RunSummary {
        frames: 0,
        detections: 0,
    };

    for item in examination.perform(source) {
        let frame = item.context("examination aborted")?;
        summary.frames += 1;
        summary.detections += frame.detections.len() as u64;

        match output {
            Output::Frames(dir) => {
                let jpeg = encode_jpeg(&frame.image, jpeg_quality)?;
                let path = dir.join(format!("frame_{:06}.jpg", frame.index));
                std::fs::write(&path, jpeg)
                    .with_context(|| format!("cannot write {}", path.display()))?;
            }
            Output::Video { path, fps } => {
                if writer.is_none() {
                    let (width, height) = frame.image.dimensions();
                    writer = Some(VideoWriter::create(path, width, height, *fps)?);
                }
                if let Some(writer) = writer.as_mut() {
                    writer.write(&frame.image)?;
                }
            }
        }
    }

    if let Some(writer) = writer {
        let written = writer.finish()?;
        info!("Encoded {} frames", written);
    }
    if summary.frames == 0 {
        warn!("{} produced no frames", video.display());
    }
    Ok(summary)
}

/// Pick the output from the mutually exclusive flags.
pub fn resolve_output(
    out_dir: Option<PathBuf>,
    out_video: Option<PathBuf>,
    fps: u32,
) -> anyhow::Result<Output> {
    match (out_dir, out_video) {
        (Some(_), Some(_)) => bail!("--out-dir and --out-video cannot be combined"),
        (Some(dir), None) => Ok(Output::Frames(dir)),
        (None, Some(path)) => {
            if fps == 0 {
                bail!("--fps must be at least 1");
            }
            Ok(Output::Video { path, fps })
        }
        (None, None) => Ok(Output::Frames(PathBuf::from("./output/annotated"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyp_eye::{EndoscopeDevice, NullDetector};
    use std::sync::Arc;

    #[test]
    fn test_resolve_output() {
        assert_eq!(
            resolve_output(Some("out".into()), None, 25).unwrap(),
            Output::Frames("out".into())
        );
        assert_eq!(
            resolve_output(None, Some("out.mp4".into()), 25).unwrap(),
            Output::Video {
                path: "out.mp4".into(),
                fps: 25
            }
        );
        assert!(resolve_output(Some("a".into()), Some("b.mp4".into()), 25).is_err());
        assert!(resolve_output(None, Some("b.mp4".into()), 0).is_err());
    }

    #[test]
    fn test_run_image_sequence_to_frames() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        for i in 0..4 {
            image::RgbImage::from_pixel(10, 10, image::Rgb([i * 20, 0, 0]))
                .save(input.path().join(format!("{}.png", i)))
                .unwrap();
        }

        let examination = Examination::new(Arc::new(NullDetector), EndoscopeDevice::default());
        let summary = run(
            &examination,
            input.path(),
            &Output::Frames(output.path().join("annotated")),
            90,
        )
        .unwrap();

        assert_eq!(summary, RunSummary { frames: 4, detections: 0 });
        assert!(output.path().join("annotated/frame_000000.jpg").is_file());
        assert!(output.path().join("annotated/frame_000003.jpg").is_file());
    }

    #[test]
    fn test_run_missing_video_fails() {
        let examination = Examination::new(Arc::new(NullDetector), EndoscopeDevice::default());
        let result = run(
            &examination,
            Path::new("/nonexistent/clip.mp4"),
            &Output::Frames(std::env::temp_dir()),
            90,
        );
        assert!(result.is_err());
    }
}
