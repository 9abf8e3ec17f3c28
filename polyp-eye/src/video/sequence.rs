//! Numbered still images read as a video

use super::VideoSource;
use crate::error::VisionError;
use polyp_core::Frame;
use std::path::{Path, PathBuf};
use tracing::debug;

const EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Images in a directory, ordered by the number in their file stem
/// (`1.jpg, 2.jpg, ..., 10.jpg`). Non-numeric stems sort last by name.
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
    released: bool,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, VisionError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            VisionError::Source(format!("cannot read image directory {}: {}", dir.display(), e))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image && path.is_file() {
                files.push(path);
            }
        }
        sort_numerically(&mut files);
        debug!("Found {} images in {}", files.len(), dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            position: 0,
            released: false,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

pub(crate) fn sort_numerically(files: &mut [PathBuf]) {
    files.sort_by_cached_key(|path| sequence_key(path));
}

fn sequence_key(path: &Path) -> (bool, u64, String) {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    match stem.parse::<u64>() {
        Ok(n) => (false, n, stem.to_string()),
        Err(_) => (true, 0, stem.to_string()),
    }
}

impl VideoSource for ImageSequenceSource {
    fn read(&mut self) -> Result<Option<Frame>, VisionError> {
        if self.released || self.position >= self.files.len() {
            return Ok(None);
        }
        let index = self.position;
        self.position += 1;

        let path = &self.files[index];
        let image = image::open(path)
            .map_err(|e| VisionError::FrameRead(format!("{}: {}", path.display(), e)))?;
        Ok(Some(Frame::from_rgb_image(index as u64, image.to_rgb8())))
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_numerically() {
        let mut files: Vec<PathBuf> = ["10.jpg", "2.jpg", "cover.jpg", "1.jpg"]
            .iter()
            .map(PathBuf::from)
            .collect();
        sort_numerically(&mut files);
        let names: Vec<_> = files.iter().map(|p| p.to_str().unwrap()).collect();
        assert_eq!(names, vec!["1.jpg", "2.jpg", "10.jpg", "cover.jpg"]);
    }

    #[test]
    fn test_reads_in_order_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        for (name, shade) in [("2.png", 20u8), ("1.png", 10), ("10.png", 100)] {
            image::RgbImage::from_pixel(3, 2, image::Rgb([shade; 3]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 3);
        let shades: Vec<u8> = std::iter::from_fn(|| source.read().unwrap())
            .map(|f| f.data[0])
            .collect();
        assert_eq!(shades, vec![10, 20, 100]);
    }

    #[test]
    fn test_corrupt_image_is_single_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1.jpg"), b"not a jpeg").unwrap();
        image::RgbImage::new(2, 2).save(dir.path().join("2.png")).unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert!(source.read().is_err());
        let frame = source.read().unwrap().unwrap();
        assert_eq!(frame.index, 1);
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn test_release_stops_reads() {
        let dir = tempfile::tempdir().unwrap();
        image::RgbImage::new(2, 2).save(dir.path().join("1.png")).unwrap();
        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        source.release();
        assert!(source.read().unwrap().is_none());
    }
}
