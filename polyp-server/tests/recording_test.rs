//! Session recording across feeds that replace each other

use polyp_core::{PersistencePolicy, ScopeConfig};
use polyp_eye::{open_video, EndoscopeDevice, Examination, NullDetector};
use polyp_storage::repositories::ColonoscopyImageRepo;
use polyp_storage::{create_memory_pool, init_database, DbFrameSink, RecorderSettings};
use std::path::Path;
use std::sync::Arc;

fn write_sequence(dir: &Path, frames: usize) {
    std::fs::create_dir_all(dir).unwrap();
    for i in 0..frames {
        image::RgbImage::from_pixel(16, 12, image::Rgb([30, 60, 90]))
            .save(dir.join(format!("{}.png", i)))
            .unwrap();
    }
}

#[tokio::test]
async fn test_superseding_feed_records_into_its_own_session() {
    let dir = tempfile::tempdir().unwrap();
    write_sequence(&dir.path().join("first"), 5);
    write_sequence(&dir.path().join("second"), 3);

    let pool = create_memory_pool().await.unwrap();
    init_database(&pool).await.unwrap();
    let mut settings = RecorderSettings::from_config(&ScopeConfig::default());
    settings.raw_dir = dir.path().join("raw");
    settings.segmented_dir = dir.path().join("segmented");
    let (sink, handle) = DbFrameSink::spawn(pool.clone(), settings);

    let examination = Examination::new(Arc::new(NullDetector), EndoscopeDevice::default())
        .with_recorder(Arc::new(sink), PersistencePolicy::EveryNFrames(1));

    let mut first = examination.perform(open_video(dir.path().join("first")).unwrap());
    assert!(first.next().is_some());
    let second = examination.perform(open_video(dir.path().join("second")).unwrap());
    assert!(first.next().is_none());
    assert_eq!(second.count(), 3);

    drop(first);
    drop(examination);
    handle.await.unwrap();

    let first_images = ColonoscopyImageRepo::list_for_session(&pool, 1).await.unwrap();
    let second_images = ColonoscopyImageRepo::list_for_session(&pool, 2).await.unwrap();
    assert_eq!(first_images.len(), 1);
    assert_eq!(second_images.len(), 3);
    assert!(dir.path().join("raw/session2_frame000002.jpg").is_file());
}
