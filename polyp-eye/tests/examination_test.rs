//! Tests for the examination control loop

use parking_lot::Mutex;
use polyp_core::{
    BoundingBox, ColorOrder, Detection, DetectionSet, Frame, FrameRecord, FrameSink, Mask,
    PersistencePolicy, SessionInfo,
};
use polyp_eye::{
    Detector, EndoscopeDevice, Examination, ModelDescriptor, NullDetector, VideoSource,
    VisionError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const W: u32 = 32;
const H: u32 = 24;

fn frame(index: u64) -> Frame {
    let shade = (index * 10 % 250) as u8;
    Frame::new(index, W, H, ColorOrder::Bgr, vec![shade; (W * H * 3) as usize]).unwrap()
}

enum Step {
    Frame(Frame),
    Fail,
}

/// In-memory source that records reads and release.
struct ScriptedSource {
    steps: VecDeque<Step>,
    reads: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl ScriptedSource {
    fn frames(n: u64) -> Self {
        Self::new((0..n).map(|i| Step::Frame(frame(i))).collect())
    }

    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            reads: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl VideoSource for ScriptedSource {
    fn read(&mut self) -> Result<Option<Frame>, VisionError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.steps.pop_front() {
            Some(Step::Frame(f)) => Ok(Some(f)),
            Some(Step::Fail) => Err(VisionError::FrameRead("scripted failure".to_string())),
            None => Ok(None),
        }
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Finds one masked polyp in every frame.
struct FixedDetector;

impl Detector for FixedDetector {
    fn detect(&self, _frame: &Frame) -> Result<DetectionSet, VisionError> {
        let mut mask = Mask::new(W, H);
        for y in 5..10 {
            for x in 5..10 {
                mask.set(x, y, true);
            }
        }
        Ok(DetectionSet::new(vec![Detection::new(
            BoundingBox::new(4.0, 12.0, 20.0, 20.0),
            0.9,
            0,
        )
        .with_mask(mask)]))
    }

    fn descriptor(&self) -> ModelDescriptor {
        ModelDescriptor::new("fixed", "1")
    }
}

struct FailingDetector;

impl Detector for FailingDetector {
    fn detect(&self, _frame: &Frame) -> Result<DetectionSet, VisionError> {
        Err(VisionError::Model("inference exploded".to_string()))
    }

    fn descriptor(&self) -> ModelDescriptor {
        ModelDescriptor::new("failing", "1")
    }
}

#[derive(Default)]
struct RecordingSink {
    sessions: Mutex<Vec<String>>,
    frames: Mutex<Vec<u64>>,
    ended: Mutex<Vec<u64>>,
    /// Every event as (run, kind) in arrival order
    events: Mutex<Vec<(u64, &'static str)>>,
}

impl FrameSink for RecordingSink {
    fn begin_session(&self, info: &SessionInfo) {
        self.sessions.lock().push(info.source.clone());
        self.events.lock().push((info.run, "begin"));
    }

    fn record(&self, record: FrameRecord) {
        self.frames.lock().push(record.index);
        self.events.lock().push((record.run, "frame"));
    }

    fn end_session(&self, run: u64, frames_emitted: u64) {
        self.ended.lock().push(frames_emitted);
        self.events.lock().push((run, "end"));
    }
}

fn examination(detector: Arc<dyn Detector>) -> Examination {
    Examination::new(detector, EndoscopeDevice::default())
}

#[test]
fn test_three_frame_source_emits_three_and_releases() {
    let exam = examination(Arc::new(FixedDetector));
    let source = ScriptedSource::frames(3);
    let released = Arc::clone(&source.released);

    let mut feed = exam.perform(source);
    let indices: Vec<u64> = feed.by_ref().map(|r| r.unwrap().index).collect();

    assert_eq!(indices, vec![0, 1, 2]);
    assert!(released.load(Ordering::SeqCst));
    assert!(feed.is_finished());
    assert!(feed.next().is_none());
}

#[test]
fn test_n_frames_in_order_despite_toggle_changes() {
    let exam = examination(Arc::new(FixedDetector));
    let mut indices = Vec::new();

    for (i, result) in exam.perform(ScriptedSource::frames(20)).enumerate() {
        let annotated = result.unwrap();
        indices.push(annotated.index);
        exam.update_detection_state(i % 2 == 0);
        exam.update_segmentation_state(i % 3 == 0);
    }

    assert_eq!(indices, (0..20).collect::<Vec<_>>());
}

#[test]
fn test_toggle_applies_to_next_frame() {
    let exam = examination(Arc::new(FixedDetector));
    let mut feed = exam.perform(ScriptedSource::frames(2));

    let first = feed.next().unwrap().unwrap();
    assert!(first.detection_enabled);

    exam.update_detection_state(false);
    exam.update_segmentation_state(false);
    let second = feed.next().unwrap().unwrap();
    assert!(!second.detection_enabled);
    assert!(!second.segmentation_enabled);
    assert_eq!(second.image, frame(1).to_rgb_image());
}

#[test]
fn test_pause_around_frame_does_not_skip_or_duplicate() {
    let exam = examination(Arc::new(NullDetector));
    let source = ScriptedSource::frames(5);
    let reads = Arc::clone(&source.reads);

    let mut feed = exam.perform(source);
    let mut indices = vec![
        feed.next().unwrap().unwrap().index,
        feed.next().unwrap().unwrap().index,
    ];

    exam.pause();
    let consumer = thread::spawn(move || {
        feed.map(|r| r.unwrap().index).collect::<Vec<_>>()
    });
    thread::sleep(Duration::from_millis(50));
    // Paused before frame 2: nothing further was read.
    assert_eq!(reads.load(Ordering::SeqCst), 2);
    assert!(exam.snapshot().paused);

    exam.resume();
    indices.extend(consumer.join().unwrap());
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_paused_before_first_frame_reads_nothing() {
    let exam = examination(Arc::new(NullDetector));
    exam.pause();
    let source = ScriptedSource::frames(1);
    let reads = Arc::clone(&source.reads);

    let feed = exam.perform(source);
    let consumer = thread::spawn(move || feed.count());
    thread::sleep(Duration::from_millis(50));
    assert_eq!(reads.load(Ordering::SeqCst), 0);

    assert!(!exam.toggle_pause_resume());
    assert_eq!(consumer.join().unwrap(), 1);
}

#[test]
fn test_stop_while_paused_ends_feed() {
    let exam = examination(Arc::new(NullDetector));
    let source = ScriptedSource::frames(10);
    let released = Arc::clone(&source.released);
    exam.pause();

    let feed = exam.perform(source);
    let consumer = thread::spawn(move || feed.count());
    thread::sleep(Duration::from_millis(50));
    exam.stop();

    assert_eq!(consumer.join().unwrap(), 0);
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn test_new_feed_supersedes_previous() {
    let exam = examination(Arc::new(NullDetector));
    let mut first = exam.perform(ScriptedSource::frames(5));
    assert!(first.next().is_some());

    let second = exam.perform(ScriptedSource::frames(2));
    assert!(first.next().is_none());
    assert_eq!(second.count(), 2);
}

#[test]
fn test_single_read_failure_is_tolerated() {
    let exam = examination(Arc::new(NullDetector));
    let source = ScriptedSource::new(vec![
        Step::Frame(frame(0)),
        Step::Fail,
        Step::Frame(frame(1)),
    ]);

    let results: Vec<_> = exam.perform(source).collect();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.is_ok()));
}

#[test]
fn test_repeated_read_failures_end_feed() {
    let exam = examination(Arc::new(NullDetector));
    let mut steps = vec![Step::Frame(frame(0))];
    steps.extend((0..4).map(|_| Step::Fail));
    steps.push(Step::Frame(frame(1)));
    let source = ScriptedSource::new(steps);
    let released = Arc::clone(&source.released);

    let results: Vec<_> = exam.perform(source).collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(VisionError::FrameRead(_))));
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn test_detector_failure_renders_plain_frame() {
    let exam = examination(Arc::new(FailingDetector));
    let results: Vec<_> = exam.perform(ScriptedSource::frames(2)).collect();

    assert_eq!(results.len(), 2);
    for (i, result) in results.into_iter().enumerate() {
        let annotated = result.unwrap();
        assert!(annotated.detections.is_empty());
        assert_eq!(annotated.image, frame(i as u64).to_rgb_image());
    }
}

#[test]
fn test_recorder_follows_policy() {
    let sink = Arc::new(RecordingSink::default());
    let exam = examination(Arc::new(FixedDetector))
        .with_recorder(sink.clone(), PersistencePolicy::EveryNFrames(2));

    assert_eq!(exam.perform(ScriptedSource::frames(5)).count(), 5);

    assert_eq!(*sink.sessions.lock(), vec!["scripted".to_string()]);
    assert_eq!(*sink.frames.lock(), vec![0, 2, 4]);
    assert_eq!(*sink.ended.lock(), vec![5]);
}

#[test]
fn test_superseded_feed_events_keep_their_run() {
    let sink = Arc::new(RecordingSink::default());
    let exam = examination(Arc::new(NullDetector))
        .with_recorder(sink.clone(), PersistencePolicy::EveryNFrames(1));

    let mut first = exam.perform(ScriptedSource::frames(5));
    assert!(first.next().is_some());
    let second = exam.perform(ScriptedSource::frames(3));
    assert!(first.next().is_none());
    assert_eq!(second.count(), 3);

    let events = sink.events.lock().clone();
    let (run_a, run_b) = (events[0].0, events[2].0);
    assert_ne!(run_a, run_b);
    assert_eq!(
        events,
        vec![
            (run_a, "begin"),
            (run_a, "frame"),
            (run_b, "begin"),
            // The old feed only learns it was superseded on its next pull.
            (run_a, "end"),
            (run_b, "frame"),
            (run_b, "frame"),
            (run_b, "frame"),
            (run_b, "end"),
        ]
    );
    assert_eq!(*sink.ended.lock(), vec![1, 3]);
}

#[test]
fn test_session_policy_records_no_frames() {
    let sink = Arc::new(RecordingSink::default());
    let exam = examination(Arc::new(FixedDetector))
        .with_recorder(sink.clone(), PersistencePolicy::Session);

    assert_eq!(exam.perform(ScriptedSource::frames(3)).count(), 3);
    assert_eq!(sink.sessions.lock().len(), 1);
    assert!(sink.frames.lock().is_empty());
    assert_eq!(*sink.ended.lock(), vec![3]);
}

#[test]
fn test_off_policy_never_touches_sink() {
    let sink = Arc::new(RecordingSink::default());
    let exam = examination(Arc::new(FixedDetector))
        .with_recorder(sink.clone(), PersistencePolicy::Off);

    assert_eq!(exam.perform(ScriptedSource::frames(3)).count(), 3);
    assert!(sink.sessions.lock().is_empty());
    assert!(sink.ended.lock().is_empty());
}

#[test]
fn test_dropping_feed_releases_source() {
    let exam = examination(Arc::new(NullDetector));
    let source = ScriptedSource::frames(10);
    let released = Arc::clone(&source.released);

    let mut feed = exam.perform(source);
    feed.next();
    drop(feed);
    assert!(released.load(Ordering::SeqCst));
}
