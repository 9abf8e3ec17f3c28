//! Seeding and reset of the local database

use crate::error::Result;
use crate::models::{CreateDoctor, CreateEndoscopeDevice, CreatePatient, DbId};
use crate::repositories::{DoctorRepo, EndoscopeDeviceRepo, ModelKind, ModelRepo, PatientRepo};
use crate::schema::init_database;
use crate::{create_pool, DbPool};
use polyp_core::ScopeConfig;
use std::path::Path;
use tracing::{info, warn};

/// Rows inserted by [`seed_defaults`].
#[derive(Debug, Clone)]
pub struct SeedDefaults {
    pub doctor_name: String,
    pub doctor_specialization: String,
    pub device_model: String,
    pub device_location: String,
    pub detection_model: (String, String),
    pub segmentation_model: (String, String),
    pub patient_name: String,
    pub patient_date_of_birth: String,
    pub patient_gender: String,
}

impl SeedDefaults {
    pub fn from_config(config: &ScopeConfig) -> Self {
        Self {
            device_model: config.device.model.clone(),
            device_location: config.device.location.clone(),
            detection_model: (
                config.detector.model_name.clone(),
                config.detector.model_version.clone(),
            ),
            segmentation_model: (
                config.storage.segmentation_model_name.clone(),
                config.storage.segmentation_model_version.clone(),
            ),
            ..Self::default()
        }
    }
}

impl Default for SeedDefaults {
    fn default() -> Self {
        Self {
            doctor_name: "Dr. Demo".to_string(),
            doctor_specialization: "Gastroenterologist".to_string(),
            device_model: "Endoscope Model X".to_string(),
            device_location: "Room 1".to_string(),
            detection_model: ("Yolo".to_string(), "v8".to_string()),
            segmentation_model: ("DE-ColonSegNet".to_string(), "v1".to_string()),
            patient_name: "Demo Patient".to_string(),
            patient_date_of_birth: "2000-01-01".to_string(),
            patient_gender: "Male".to_string(),
        }
    }
}

/// Ids of the seeded rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedIds {
    pub doctor_id: DbId,
    pub device_id: DbId,
    pub detection_model_id: DbId,
    pub segmentation_model_id: DbId,
    pub patient_id: DbId,
}

/// Insert one doctor, device, detection model, segmentation model and
/// patient. Each insert is independent; calling this twice inserts twice.
pub async fn seed_defaults(pool: &DbPool, defaults: &SeedDefaults) -> Result<SeedIds> {
    let doctor = DoctorRepo::create(
        pool,
        &CreateDoctor {
            name: defaults.doctor_name.clone(),
            specialization: defaults.doctor_specialization.clone(),
        },
    )
    .await?;
    let device = EndoscopeDeviceRepo::create(
        pool,
        &CreateEndoscopeDevice {
            model: defaults.device_model.clone(),
            location: defaults.device_location.clone(),
        },
    )
    .await?;
    let (name, version) = &defaults.detection_model;
    let detection = ModelRepo::create(pool, ModelKind::Detection, name, version).await?;
    let (name, version) = &defaults.segmentation_model;
    let segmentation = ModelRepo::create(pool, ModelKind::Segmentation, name, version).await?;
    let patient = PatientRepo::create(
        pool,
        &CreatePatient {
            name: defaults.patient_name.clone(),
            date_of_birth: defaults.patient_date_of_birth.clone(),
            gender: defaults.patient_gender.clone(),
        },
    )
    .await?;

    info!(
        "Seeded doctor {}, device {}, patient {}",
        doctor.id, device.id, patient.id
    );
    Ok(SeedIds {
        doctor_id: doctor.id,
        device_id: device.id,
        detection_model_id: detection.id,
        segmentation_model_id: segmentation.id,
        patient_id: patient.id,
    })
}

/// Delete the database file and the contents of the image output
/// directories, then recreate and seed the database.
pub async fn reset_database(
    database_path: &Path,
    output_dirs: &[&Path],
    defaults: &SeedDefaults,
) -> Result<DbPool> {
    match std::fs::remove_file(database_path) {
        Ok(()) => info!("Removed {}", database_path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    for dir in output_dirs {
        clear_directory(dir)?;
    }

    let pool = create_pool(database_path, true).await?;
    init_database(&pool).await?;
    seed_defaults(&pool, defaults).await?;
    Ok(pool)
}

/// Remove everything inside `dir`, keeping the directory itself.
fn clear_directory(dir: &Path) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let mut removed = 0usize;
    for entry in entries {
        let path = entry?.path();
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => warn!("Could not remove {}: {}", path.display(), e),
        }
    }
    info!("Cleared {} entries from {}", removed, dir.display());
    Ok(())
}
