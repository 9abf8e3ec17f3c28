//! Running feed and frame fan-out
//!
//! The examination loop runs on a blocking thread. Each rendered frame is
//! JPEG-encoded once and published to a broadcast channel for live viewers
//! and to a watch slot holding the latest frame. Slow viewers lag and skip;
//! the loop never waits on them.

use bytes::Bytes;
use parking_lot::Mutex;
use polyp_eye::{AnnotatedFrame, Performance, VideoSource, VisionError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

/// Status of the most recent feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedStatus {
    pub video: Option<String>,
    pub running: bool,
    pub frames_emitted: u64,
    pub error: Option<String>,
}

struct FeedState {
    feed_id: u64,
    status: FeedStatus,
}

/// Shared by the HTTP handlers and the feed thread.
pub struct FeedHub {
    frames: Mutex<Option<broadcast::Sender<Bytes>>>,
    latest: watch::Sender<Option<Bytes>>,
    state: Mutex<FeedState>,
    jpeg_quality: u8,
}

impl FeedHub {
    pub fn new(stream_buffer: usize, jpeg_quality: u8) -> Self {
        let (frames, _) = broadcast::channel(stream_buffer.max(1));
        let (latest, _) = watch::channel(None);
        Self {
            frames: Mutex::new(Some(frames)),
            latest,
            state: Mutex::new(FeedState {
                feed_id: 0,
                status: FeedStatus::default(),
            }),
            jpeg_quality,
        }
    }

    pub fn status(&self) -> FeedStatus {
        self.state.lock().status.clone()
    }

    /// Live JPEG frames from now on. `None` once the hub is closed.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Bytes>> {
        self.frames.lock().as_ref().map(|tx| tx.subscribe())
    }

    /// End every live stream. Later frames only update the latest slot.
    pub fn close(&self) {
        if self.frames.lock().take().is_some() {
            debug!("Frame broadcast closed");
        }
    }

    /// The most recently published JPEG, if any.
    pub fn latest(&self) -> Option<Bytes> {
        self.latest.borrow().clone()
    }

    /// Register a new feed and return its id. Updates from older feeds are
    /// ignored from here on.
    pub fn start(&self, video: &str) -> u64 {
        let mut state = self.state.lock();
        state.feed_id += 1;
        state.status = FeedStatus {
            video: Some(video.to_string()),
            running: true,
            frames_emitted: 0,
            error: None,
        };
        state.feed_id
    }

    fn publish(&self, feed_id: u64, frame: &AnnotatedFrame) -> Result<(), VisionError> {
        let jpeg = Bytes::from(frame.encode_jpeg(self.jpeg_quality)?);
        {
            let mut state = self.state.lock();
            if state.feed_id != feed_id {
                return Ok(());
            }
            state.status.frames_emitted += 1;
        }
        self.latest.send_replace(Some(jpeg.clone()));
        if let Some(tx) = self.frames.lock().as_ref() {
            // No receivers is fine; nobody is watching.
            let _ = tx.send(jpeg);
        }
        Ok(())
    }

    fn fail(&self, feed_id: u64, message: String) {
        let mut state = self.state.lock();
        if state.feed_id == feed_id {
            state.status.error = Some(message);
        }
    }

    fn finish(&self, feed_id: u64) {
        let mut state = self.state.lock();
        if state.feed_id == feed_id {
            state.status.running = false;
        }
    }
}

/// Drive a feed to completion, publishing every frame.
pub fn run_feed<S: VideoSource>(hub: Arc<FeedHub>, feed_id: u64, performance: Performance<S>) {
    info!("Feed {} started", feed_id);
    for item in performance {
        match item {
            Ok(frame) => {
                if let Err(e) = hub.publish(feed_id, &frame) {
                    warn!("Could not encode frame {}: {}", frame.index, e);
                } else {
                    debug!("Published frame {} of feed {}", frame.index, feed_id);
                }
            }
            Err(e) => {
                error!("Feed {} aborted: {}", feed_id, e);
                hub.fail(feed_id, e.to_string());
            }
        }
    }
    hub.finish(feed_id);
    info!("Feed {} finished", feed_id);
}
