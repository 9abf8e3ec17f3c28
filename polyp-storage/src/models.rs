//! Row models and creation DTOs for the nine tables.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

pub type DbId = i64;

/// A row from `Doctor`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Doctor {
    pub id: DbId,
    pub name: String,
    pub specialization: String,
}

pub struct CreateDoctor {
    pub name: String,
    pub specialization: String,
}

/// A row from `Patient`. Date of birth is stored as `YYYY-MM-DD` text.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Patient {
    pub id: DbId,
    pub name: String,
    pub date_of_birth: String,
    pub gender: String,
}

pub struct CreatePatient {
    pub name: String,
    pub date_of_birth: String,
    pub gender: String,
}

/// A row from `EndoscopeDevice`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct EndoscopeDeviceRecord {
    pub id: DbId,
    pub model: String,
    pub location: String,
}

pub struct CreateEndoscopeDevice {
    pub model: String,
    pub location: String,
}

/// A row from `ColonoscopySession`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ColonoscopySession {
    pub id: DbId,
    pub doctor_id: DbId,
    pub patient_id: DbId,
    pub device_id: DbId,
    pub session_date_time: NaiveDateTime,
}

pub struct CreateColonoscopySession {
    pub doctor_id: DbId,
    pub patient_id: DbId,
    pub device_id: DbId,
    pub session_date_time: NaiveDateTime,
}

/// A row from `ColonoscopyImage`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ColonoscopyImage {
    pub id: DbId,
    pub session_id: DbId,
    pub image_path: String,
}

/// A row from `DetectionModel` or `SegmentationModel`; both tables share
/// the same columns.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ModelRecord {
    pub id: DbId,
    pub model_name: String,
    pub model_version: String,
}

/// A row from `DetectedPolyps`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct DetectedPolyps {
    pub id: DbId,
    pub image_id: DbId,
    pub detection_model_id: DbId,
    pub count: i64,
}

/// A row from `SegmentationOutput`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct SegmentationOutput {
    pub id: DbId,
    pub polyp_id: DbId,
    pub segmentation_model_id: DbId,
    pub image_path: String,
}
