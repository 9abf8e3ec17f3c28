//! Examination control loop
//!
//! An [`Examination`] owns a shared detector, a device and a set of
//! toggles that the UI flips while a feed is running. [`Examination::perform`]
//! turns a video source into a lazy iterator of annotated frames; each pull
//! reads one frame, detects, renders with the toggles current at that
//! moment and optionally hands the result to a [`FrameSink`].

use crate::detector::Detector;
use crate::device::EndoscopeDevice;
use crate::error::VisionError;
use crate::video::VideoSource;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use parking_lot::{Condvar, Mutex};
use polyp_core::config::ExaminationConfig;
use polyp_core::{
    next_run_id, DetectionSet, Frame, FrameRecord, FrameSink, PersistencePolicy, SessionInfo,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Toggle values at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleSnapshot {
    pub detection_enabled: bool,
    pub segmentation_enabled: bool,
    pub paused: bool,
}

/// Toggles shared between the UI and the running loop.
///
/// Detection and segmentation flags are independent atomics; the loop reads
/// whatever was written last. Pause is guarded by a mutex so the loop can
/// block on a condition variable instead of polling.
pub struct ExaminationControls {
    detection_enabled: AtomicBool,
    segmentation_enabled: AtomicBool,
    paused: Mutex<bool>,
    resumed: Condvar,
    generation: AtomicU64,
}

impl ExaminationControls {
    pub fn new(detection_enabled: bool, segmentation_enabled: bool) -> Self {
        Self {
            detection_enabled: AtomicBool::new(detection_enabled),
            segmentation_enabled: AtomicBool::new(segmentation_enabled),
            paused: Mutex::new(false),
            resumed: Condvar::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn detection_enabled(&self) -> bool {
        self.detection_enabled.load(Ordering::Relaxed)
    }

    pub fn set_detection_enabled(&self, enabled: bool) {
        self.detection_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn segmentation_enabled(&self) -> bool {
        self.segmentation_enabled.load(Ordering::Relaxed)
    }

    pub fn set_segmentation_enabled(&self, enabled: bool) {
        self.segmentation_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    pub fn set_paused(&self, paused: bool) {
        let mut guard = self.paused.lock();
        *guard = paused;
        if !paused {
            self.resumed.notify_all();
        }
    }

    /// Flip the pause flag and return the new value.
    pub fn toggle_paused(&self) -> bool {
        let mut guard = self.paused.lock();
        *guard = !*guard;
        if !*guard {
            self.resumed.notify_all();
        }
        *guard
    }

    pub fn snapshot(&self) -> ToggleSnapshot {
        ToggleSnapshot {
            detection_enabled: self.detection_enabled(),
            segmentation_enabled: self.segmentation_enabled(),
            paused: self.is_paused(),
        }
    }

    /// Start a new run, superseding any previous one.
    fn begin_run(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.wake_all();
        generation
    }

    /// Supersede the current run without starting another.
    fn supersede(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.wake_all();
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn wake_all(&self) {
        // Taking the lock orders the wakeup after any waiter's check.
        let _guard = self.paused.lock();
        self.resumed.notify_all();
    }

    /// Block while paused. Returns `false` if the run was superseded.
    fn wait_while_paused(&self, generation: u64) -> bool {
        let mut paused = self.paused.lock();
        while *paused && self.is_current(generation) {
            self.resumed.wait(&mut paused);
        }
        self.is_current(generation)
    }
}

impl Default for ExaminationControls {
    fn default() -> Self {
        Self::new(true, true)
    }
}

/// One rendered frame ready for display.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    /// Index of the source frame
    pub index: u64,
    pub image: RgbImage,
    pub detections: DetectionSet,
    pub detection_enabled: bool,
    pub segmentation_enabled: bool,
}

impl AnnotatedFrame {
    /// Encode the rendered image as JPEG.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, VisionError> {
        encode_jpeg(&self.image, quality)
    }
}

/// Encode an RGB image as JPEG at `quality` (1-100).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, VisionError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|e| VisionError::Encode(e.to_string()))?;
    Ok(buffer)
}

/// An interactive examination session.
pub struct Examination {
    detector: Arc<dyn Detector>,
    device: EndoscopeDevice,
    controls: Arc<ExaminationControls>,
    sink: Option<Arc<dyn FrameSink>>,
    persistence: PersistencePolicy,
    max_consecutive_read_errors: u32,
}

impl Examination {
    /// Both overlays enabled, not paused, nothing recorded.
    pub fn new(detector: Arc<dyn Detector>, device: EndoscopeDevice) -> Self {
        Self::from_config(detector, device, &ExaminationConfig::default())
    }

    pub fn from_config(
        detector: Arc<dyn Detector>,
        device: EndoscopeDevice,
        config: &ExaminationConfig,
    ) -> Self {
        Self {
            detector,
            device,
            controls: Arc::new(ExaminationControls::new(
                config.detection_enabled,
                config.segmentation_enabled,
            )),
            sink: None,
            persistence: PersistencePolicy::Off,
            max_consecutive_read_errors: config.max_consecutive_read_errors,
        }
    }

    /// Attach a recorder, used according to `policy`.
    pub fn with_recorder(mut self, sink: Arc<dyn FrameSink>, policy: PersistencePolicy) -> Self {
        self.sink = Some(sink);
        self.persistence = policy;
        self
    }

    pub fn device(&self) -> &EndoscopeDevice {
        &self.device
    }

    pub fn detector(&self) -> &Arc<dyn Detector> {
        &self.detector
    }

    /// Shared handle to the toggles, for callers that outlive a borrow.
    pub fn controls(&self) -> Arc<ExaminationControls> {
        Arc::clone(&self.controls)
    }

    pub fn update_detection_state(&self, enabled: bool) {
        self.controls.set_detection_enabled(enabled);
    }

    pub fn update_segmentation_state(&self, enabled: bool) {
        self.controls.set_segmentation_enabled(enabled);
    }

    /// Flip pause and return whether the examination is now paused.
    pub fn toggle_pause_resume(&self) -> bool {
        self.controls.toggle_paused()
    }

    pub fn pause(&self) {
        self.controls.set_paused(true);
    }

    pub fn resume(&self) {
        self.controls.set_paused(false);
    }

    /// End the running feed. It stops before its next read, or right away
    /// if it is waiting in pause.
    pub fn stop(&self) {
        self.controls.supersede();
    }

    pub fn snapshot(&self) -> ToggleSnapshot {
        self.controls.snapshot()
    }

    /// Feed `source` through the examination. Any feed already running is
    /// superseded. Nothing is read until the iterator is pulled.
    pub fn perform<S: VideoSource>(&self, source: S) -> Performance<S> {
        let generation = self.controls.begin_run();
        let sink = self.sink.clone().filter(|_| self.persistence.records_session());
        let name = source.describe();
        info!("Starting examination feed on {}", name);

        let run = next_run_id();
        if let Some(sink) = &sink {
            sink.begin_session(&SessionInfo::now(run, name.clone()));
        }

        Performance {
            source: Some(source),
            name,
            detector: Arc::clone(&self.detector),
            device: self.device.clone(),
            controls: Arc::clone(&self.controls),
            sink,
            persistence: self.persistence,
            max_consecutive_read_errors: self.max_consecutive_read_errors,
            generation,
            run,
            emitted: 0,
            consecutive_errors: 0,
        }
    }
}

/// A running feed. Yields one item per readable frame, in source order,
/// and `None` forever once the source is exhausted, the feed is stopped, or
/// too many reads have failed in a row.
pub struct Performance<S: VideoSource> {
    source: Option<S>,
    name: String,
    detector: Arc<dyn Detector>,
    device: EndoscopeDevice,
    controls: Arc<ExaminationControls>,
    sink: Option<Arc<dyn FrameSink>>,
    persistence: PersistencePolicy,
    max_consecutive_read_errors: u32,
    generation: u64,
    /// Tags every sink event of this feed
    run: u64,
    emitted: u64,
    consecutive_errors: u32,
}

impl<S: VideoSource> Performance<S> {
    /// Frames yielded so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn is_finished(&self) -> bool {
        self.source.is_none()
    }

    fn process(&mut self, frame: Frame) -> AnnotatedFrame {
        let index = frame.index;
        let detections = match self.detector.detect(&frame) {
            Ok(detections) => detections,
            Err(e) => {
                warn!("Detection failed on frame {}, rendering without overlays: {}", index, e);
                DetectionSet::empty()
            }
        };

        let detection_enabled = self.controls.detection_enabled();
        let segmentation_enabled = self.controls.segmentation_enabled();
        let image =
            self.device
                .capture_images(&frame, &detections, detection_enabled, segmentation_enabled);
        debug!(
            "Frame {}: {} detections (boxes: {}, masks: {})",
            index,
            detections.len(),
            detection_enabled,
            segmentation_enabled
        );

        if let Some(sink) = &self.sink {
            if self.persistence.records_frame(index) {
                sink.record(FrameRecord {
                    run: self.run,
                    index,
                    raw: frame,
                    annotated: image.clone(),
                    detection_count: detections.len(),
                    has_masks: detections.has_masks(),
                });
            }
        }

        self.emitted += 1;
        AnnotatedFrame {
            index,
            image,
            detections,
            detection_enabled,
            segmentation_enabled,
        }
    }

    fn finish(&mut self, reason: &str) {
        let Some(mut source) = self.source.take() else {
            return;
        };
        source.release();
        if let Some(sink) = &self.sink {
            sink.end_session(self.run, self.emitted);
        }
        info!(
            "Examination feed on {} ended ({}), {} frames emitted",
            self.name, reason, self.emitted
        );
    }
}

impl<S: VideoSource> Iterator for Performance<S> {
    type Item = Result<AnnotatedFrame, VisionError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.source.as_ref()?;

            if !self.controls.wait_while_paused(self.generation) {
                self.finish("stopped");
                return None;
            }

            let read = match self.source.as_mut() {
                Some(source) => source.read(),
                None => return None,
            };

            match read {
                Ok(Some(frame)) => {
                    self.consecutive_errors = 0;
                    return Some(Ok(self.process(frame)));
                }
                Ok(None) => {
                    self.finish("end of stream");
                    return None;
                }
                Err(e) => {
                    self.consecutive_errors += 1;
                    if self.consecutive_errors > self.max_consecutive_read_errors {
                        self.finish("read failures");
                        return Some(Err(e));
                    }
                    warn!(
                        "Frame read failed on {} ({}/{}): {}",
                        self.name, self.consecutive_errors, self.max_consecutive_read_errors, e
                    );
                }
            }
        }
    }
}

impl<S: VideoSource> std::iter::FusedIterator for Performance<S> {}

impl<S: VideoSource> Drop for Performance<S> {
    fn drop(&mut self) {
        self.finish("dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_controls_defaults() {
        let controls = ExaminationControls::default();
        assert_eq!(
            controls.snapshot(),
            ToggleSnapshot {
                detection_enabled: true,
                segmentation_enabled: true,
                paused: false
            }
        );
    }

    #[test]
    fn test_toggle_paused() {
        let controls = ExaminationControls::default();
        assert!(controls.toggle_paused());
        assert!(controls.is_paused());
        assert!(!controls.toggle_paused());
    }

    #[test]
    fn test_wait_returns_when_not_paused() {
        let controls = ExaminationControls::default();
        let generation = controls.begin_run();
        assert!(controls.wait_while_paused(generation));
    }

    #[test]
    fn test_resume_wakes_waiter() {
        let controls = Arc::new(ExaminationControls::default());
        let generation = controls.begin_run();
        controls.set_paused(true);

        let waiter = {
            let controls = Arc::clone(&controls);
            thread::spawn(move || controls.wait_while_paused(generation))
        };
        thread::sleep(Duration::from_millis(30));
        controls.set_paused(false);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_supersede_wakes_waiter() {
        let controls = Arc::new(ExaminationControls::default());
        let generation = controls.begin_run();
        controls.set_paused(true);

        let waiter = {
            let controls = Arc::clone(&controls);
            thread::spawn(move || controls.wait_while_paused(generation))
        };
        thread::sleep(Duration::from_millis(30));
        controls.supersede();
        assert!(!waiter.join().unwrap());
        assert!(controls.is_paused());
    }

    #[test]
    fn test_encode_jpeg() {
        let image = RgbImage::from_pixel(8, 8, image::Rgb([200, 10, 10]));
        let bytes = encode_jpeg(&image, 80).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
