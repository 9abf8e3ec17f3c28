//! Video library: bundled examples plus uploads

use crate::error::{ApiError, ApiResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "avi", "mov", "mkv", "webm", "mpg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoOrigin {
    Example,
    Upload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoEntry {
    pub name: String,
    pub origin: VideoOrigin,
    /// Directory of still images fed as a sequence
    pub sequence: bool,
}

/// Where selectable videos live.
#[derive(Debug, Clone)]
pub struct VideoLibrary {
    examples_dir: PathBuf,
    upload_dir: PathBuf,
}

impl VideoLibrary {
    pub fn new(examples_dir: impl Into<PathBuf>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            examples_dir: examples_dir.into(),
            upload_dir: upload_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Uploads first, then examples, each sorted by name. An upload hides an
    /// example of the same name.
    pub fn list(&self) -> Vec<VideoEntry> {
        let mut entries = scan(&self.upload_dir, VideoOrigin::Upload);
        for example in scan(&self.examples_dir, VideoOrigin::Example) {
            if !entries.iter().any(|e| e.name == example.name) {
                entries.push(example);
            }
        }
        entries
    }

    /// Path of a selectable video by name.
    pub fn resolve(&self, name: &str) -> ApiResult<PathBuf> {
        let name = sanitize_name(name)?;
        for dir in [&self.upload_dir, &self.examples_dir] {
            let candidate = dir.join(&name);
            if candidate.exists() && is_selectable(&candidate) {
                return Ok(candidate);
            }
        }
        Err(ApiError::NotFound(format!("video '{}' not found", name)))
    }

    /// Store uploaded bytes under a sanitised name and return that name.
    pub async fn store(&self, name: &str, bytes: &[u8]) -> ApiResult<String> {
        let name = sanitize_name(name)?;
        if !has_video_extension(Path::new(&name)) {
            return Err(ApiError::BadRequest(format!(
                "'{}' is not a supported video file ({})",
                name,
                VIDEO_EXTENSIONS.join(", ")
            )));
        }
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("upload is empty".to_string()));
        }

        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let path = self.upload_dir.join(&name);
        tokio::fs::write(&path, bytes).await?;
        debug!("Stored upload {} ({} bytes)", path.display(), bytes.len());
        Ok(name)
    }
}

/// Reduce a client-supplied name to a single safe path component.
pub fn sanitize_name(name: &str) -> ApiResult<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.starts_with('.') {
        return Err(ApiError::BadRequest(format!("invalid video name '{}'", name)));
    }
    Ok(cleaned)
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_selectable(path: &Path) -> bool {
    path.is_dir() || (path.is_file() && has_video_extension(path))
}

fn scan(dir: &Path, origin: VideoOrigin) -> Vec<VideoEntry> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Cannot list {}: {}", dir.display(), e);
            }
            return Vec::new();
        }
    };

    let mut videos: Vec<VideoEntry> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_selectable(path))
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            if name.starts_with('.') {
                return None;
            }
            Some(VideoEntry {
                name,
                origin,
                sequence: path.is_dir(),
            })
        })
        .collect();
    videos.sort_by(|a, b| a.name.cmp(&b.name));
    videos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("clip.mp4").unwrap(), "clip.mp4");
        assert_eq!(sanitize_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_name("C:\\videos\\case 1.mp4").unwrap(), "case_1.mp4");
        assert_eq!(sanitize_name("polyp#3.avi").unwrap(), "polyp_3.avi");
        assert!(sanitize_name("..").is_err());
        assert!(sanitize_name(".hidden.mp4").is_err());
        assert!(sanitize_name("videos/").is_err());
        assert!(sanitize_name("").is_err());
    }

    #[test]
    fn test_list_merges_and_filters() {
        let examples = tempfile::tempdir().unwrap();
        let uploads = tempfile::tempdir().unwrap();
        std::fs::write(examples.path().join("b.mp4"), b"x").unwrap();
        std::fs::write(examples.path().join("a.mp4"), b"x").unwrap();
        std::fs::write(examples.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(examples.path().join("frames")).unwrap();
        std::fs::write(uploads.path().join("a.mp4"), b"y").unwrap();

        let library = VideoLibrary::new(examples.path(), uploads.path());
        let names: Vec<(String, VideoOrigin)> = library
            .list()
            .into_iter()
            .map(|v| (v.name, v.origin))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a.mp4".to_string(), VideoOrigin::Upload),
                ("b.mp4".to_string(), VideoOrigin::Example),
                ("frames".to_string(), VideoOrigin::Example),
            ]
        );
    }

    #[test]
    fn test_resolve_prefers_upload() {
        let examples = tempfile::tempdir().unwrap();
        let uploads = tempfile::tempdir().unwrap();
        std::fs::write(examples.path().join("a.mp4"), b"x").unwrap();
        std::fs::write(uploads.path().join("a.mp4"), b"y").unwrap();

        let library = VideoLibrary::new(examples.path(), uploads.path());
        assert_eq!(library.resolve("a.mp4").unwrap(), uploads.path().join("a.mp4"));
        assert!(matches!(library.resolve("missing.mp4"), Err(ApiError::NotFound(_))));
    }

    #[test]
    fn test_missing_directories_list_nothing() {
        let library = VideoLibrary::new("/nonexistent/examples", "/nonexistent/uploads");
        assert!(library.list().is_empty());
    }
}
