//! Recording seam between the examination loop and persistence
//!
//! The loop only knows about `FrameSink`; storage backends implement it.
//! Implementations must never block the caller for long and must swallow
//! their own failures.
//!
//! Every event carries the run it belongs to. A superseded feed may still
//! report frames or its end after a newer feed has begun, so sinks match
//! events on the run rather than on arrival order.

use crate::frame::Frame;
use chrono::{DateTime, Utc};
use image::RgbImage;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RUN: AtomicU64 = AtomicU64::new(1);

/// A fresh run id, unique within the process.
pub fn next_run_id() -> u64 {
    NEXT_RUN.fetch_add(1, Ordering::Relaxed)
}

/// Describes one feed of a video source through the examination.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub run: u64,
    /// Human-readable name of the video source
    pub source: String,
    pub started_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn now(run: u64, source: impl Into<String>) -> Self {
        Self {
            run,
            source: source.into(),
            started_at: Utc::now(),
        }
    }
}

/// Everything a recorder needs about one processed frame.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub run: u64,
    pub index: u64,
    pub raw: Frame,
    pub annotated: RgbImage,
    pub detection_count: usize,
    pub has_masks: bool,
}

pub trait FrameSink: Send + Sync {
    fn begin_session(&self, info: &SessionInfo);

    fn record(&self, record: FrameRecord);

    fn end_session(&self, run: u64, frames_emitted: u64);
}
