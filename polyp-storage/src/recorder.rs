//! Background session recorder
//!
//! [`DbFrameSink`] is handed to the examination loop. Events go in order
//! through a channel to a tokio task that writes JPEGs and inserts rows, so
//! the loop never waits on disk or database. Session begin and end are
//! always delivered. Frames are bounded: once `queue` frames are waiting,
//! further frames are dropped and counted.
//!
//! The task keeps at most one open session, keyed by run. A frame or end
//! from any other run is ignored, so a superseded feed finishing late
//! cannot close or feed its successor.

use crate::error::{Result, StorageError};
use crate::models::{CreateColonoscopySession, DbId};
use crate::repositories::{
    ColonoscopyImageRepo, ColonoscopySessionRepo, DetectedPolypsRepo, ModelKind, ModelRepo,
    SegmentationOutputRepo,
};
use crate::DbPool;
use image::RgbImage;
use polyp_core::{FrameRecord, FrameSink, ScopeConfig, SessionInfo};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where and under which ids a session is recorded.
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub raw_dir: PathBuf,
    pub segmented_dir: PathBuf,
    pub doctor_id: DbId,
    pub patient_id: DbId,
    pub device_id: DbId,
    pub detection_model: (String, String),
    pub segmentation_model: (String, String),
    pub queue: usize,
}

impl RecorderSettings {
    pub fn from_config(config: &ScopeConfig) -> Self {
        let storage = &config.storage;
        Self {
            raw_dir: storage.raw_output_dir.clone(),
            segmented_dir: storage.segmented_output_dir.clone(),
            doctor_id: storage.doctor_id,
            patient_id: storage.patient_id,
            device_id: storage.device_id,
            detection_model: (
                config.detector.model_name.clone(),
                config.detector.model_version.clone(),
            ),
            segmentation_model: (
                storage.segmentation_model_name.clone(),
                storage.segmentation_model_version.clone(),
            ),
            queue: storage.recorder_queue.max(1),
        }
    }
}

enum RecorderEvent {
    Begin(SessionInfo),
    Frame(Box<FrameRecord>),
    End { run: u64, frames_emitted: u64 },
}

/// Frame sink that records sessions into the database.
pub struct DbFrameSink {
    tx: mpsc::UnboundedSender<RecorderEvent>,
    backlog: Arc<AtomicUsize>,
    limit: usize,
    dropped: Arc<AtomicU64>,
}

impl DbFrameSink {
    /// Start the recorder task on the current tokio runtime. The task ends
    /// once the sink is dropped and the queue is drained.
    pub fn spawn(pool: DbPool, settings: RecorderSettings) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let backlog = Arc::new(AtomicUsize::new(0));
        let limit = settings.queue.max(1);
        let handle = tokio::spawn(run_recorder(pool, settings, rx, Arc::clone(&backlog)));
        (
            Self {
                tx,
                backlog,
                limit,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            handle,
        )
    }

    /// Frames discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send(&self, event: RecorderEvent) {
        if self.tx.send(event).is_err() {
            warn!("Recorder task has stopped; event discarded");
        }
    }
}

impl FrameSink for DbFrameSink {
    fn begin_session(&self, info: &SessionInfo) {
        self.send(RecorderEvent::Begin(info.clone()));
    }

    fn record(&self, record: FrameRecord) {
        if self.backlog.fetch_add(1, Ordering::AcqRel) >= self.limit {
            self.backlog.fetch_sub(1, Ordering::AcqRel);
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("Recorder queue full, dropped frame {} ({} total)", record.index, dropped);
            return;
        }
        if self.tx.send(RecorderEvent::Frame(Box::new(record))).is_err() {
            self.backlog.fetch_sub(1, Ordering::AcqRel);
            warn!("Recorder task has stopped; frame discarded");
        }
    }

    fn end_session(&self, run: u64, frames_emitted: u64) {
        self.send(RecorderEvent::End {
            run,
            frames_emitted,
        });
    }
}

struct OpenSession {
    run: u64,
    id: DbId,
    detection_model_id: Option<DbId>,
    segmentation_model_id: Option<DbId>,
    frames_recorded: u64,
}

async fn run_recorder(
    pool: DbPool,
    settings: RecorderSettings,
    mut rx: mpsc::UnboundedReceiver<RecorderEvent>,
    backlog: Arc<AtomicUsize>,
) {
    let mut session: Option<OpenSession> = None;

    while let Some(event) = rx.recv().await {
        match event {
            RecorderEvent::Begin(info) => {
                if let Some(previous) = session.take() {
                    info!(
                        "Session {} superseded after {} recorded frames",
                        previous.id, previous.frames_recorded
                    );
                }
                match open_session(&pool, &settings, &info).await {
                    Ok(opened) => {
                        info!("Recording session {} for {}", opened.id, info.source);
                        session = Some(opened);
                    }
                    Err(e) => warn!("Could not open session for {}: {}", info.source, e),
                }
            }
            RecorderEvent::Frame(record) => {
                backlog.fetch_sub(1, Ordering::AcqRel);
                let Some(open) = session.as_mut().filter(|open| open.run == record.run) else {
                    debug!(
                        "Frame {} of run {} has no open session, skipped",
                        record.index, record.run
                    );
                    continue;
                };
                match record_frame(&pool, &settings, open, *record).await {
                    Ok(()) => open.frames_recorded += 1,
                    Err(e) => warn!("Failed to record frame in session {}: {}", open.id, e),
                }
            }
            RecorderEvent::End {
                run,
                frames_emitted,
            } => {
                if session.as_ref().is_some_and(|open| open.run == run) {
                    if let Some(open) = session.take() {
                        info!(
                            "Session {} closed: {} frames shown, {} recorded",
                            open.id, frames_emitted, open.frames_recorded
                        );
                    }
                } else {
                    debug!("End of run {} does not match the open session", run);
                }
            }
        }
    }
    debug!("Recorder task finished");
}

async fn open_session(
    pool: &DbPool,
    settings: &RecorderSettings,
    info: &SessionInfo,
) -> Result<OpenSession> {
    let row = ColonoscopySessionRepo::create(
        pool,
        &CreateColonoscopySession {
            doctor_id: settings.doctor_id,
            patient_id: settings.patient_id,
            device_id: settings.device_id,
            session_date_time: info.started_at.naive_utc(),
        },
    )
    .await?;

    let (name, version) = &settings.detection_model;
    let detection_model_id = resolve_model(pool, ModelKind::Detection, name, version).await;
    let (name, version) = &settings.segmentation_model;
    let segmentation_model_id = resolve_model(pool, ModelKind::Segmentation, name, version).await;

    Ok(OpenSession {
        run: info.run,
        id: row.id,
        detection_model_id,
        segmentation_model_id,
        frames_recorded: 0,
    })
}

async fn resolve_model(pool: &DbPool, kind: ModelKind, name: &str, version: &str) -> Option<DbId> {
    match ModelRepo::find_or_create(pool, kind, name, version).await {
        Ok(row) => Some(row.id),
        Err(e) => {
            warn!("Could not resolve {:?} model {} {}: {}", kind, name, version, e);
            None
        }
    }
}

async fn record_frame(
    pool: &DbPool,
    settings: &RecorderSettings,
    session: &OpenSession,
    record: FrameRecord,
) -> Result<()> {
    let file_name = frame_file_name(session.id, record.index);
    let raw_path = settings.raw_dir.join(&file_name);
    let segmented_path = settings.segmented_dir.join(&file_name);

    let raw = record.raw.to_rgb_image();
    let annotated = record.annotated;
    {
        let raw_path = raw_path.clone();
        let segmented_path = segmented_path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            save_jpeg(&raw, &raw_path)?;
            save_jpeg(&annotated, &segmented_path)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))??;
    }

    let image = ColonoscopyImageRepo::create(pool, session.id, &path_text(&raw_path)).await?;

    let Some(detection_model_id) = session.detection_model_id else {
        return Ok(());
    };
    let polyps = DetectedPolypsRepo::create(
        pool,
        image.id,
        detection_model_id,
        record.detection_count as i64,
    )
    .await?;

    if record.has_masks {
        if let Some(segmentation_model_id) = session.segmentation_model_id {
            SegmentationOutputRepo::create(
                pool,
                polyps.id,
                segmentation_model_id,
                &path_text(&segmented_path),
            )
            .await?;
        }
    }
    Ok(())
}

pub(crate) fn frame_file_name(session_id: DbId, index: u64) -> String {
    format!("session{}_frame{:06}.jpg", session_id, index)
}

fn save_jpeg(image: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    image.save(path)?;
    Ok(())
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_file_name() {
        assert_eq!(frame_file_name(3, 42), "session3_frame000042.jpg");
    }

    #[test]
    fn test_settings_from_config() {
        let config = ScopeConfig::default();
        let settings = RecorderSettings::from_config(&config);
        assert_eq!(settings.segmentation_model.0, "DE-ColonSegNet");
        assert_eq!(settings.doctor_id, 1);
        assert_eq!(settings.queue, 64);
    }
}
