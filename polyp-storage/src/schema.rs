//! Table definitions
//!
//! Foreign keys are declared but the pool does not enforce them.

use crate::DbPool;
use tracing::info;

/// `(table, CREATE statement)` in dependency order.
pub const TABLES: [(&str, &str); 9] = [
    (
        "Doctor",
        "CREATE TABLE IF NOT EXISTS Doctor (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            Name TEXT,
            Specialization TEXT
        )",
    ),
    (
        "Patient",
        "CREATE TABLE IF NOT EXISTS Patient (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            Name TEXT,
            DateOfBirth DATE,
            Gender TEXT
        )",
    ),
    (
        "EndoscopeDevice",
        "CREATE TABLE IF NOT EXISTS EndoscopeDevice (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            Model TEXT,
            Location TEXT
        )",
    ),
    (
        "ColonoscopySession",
        "CREATE TABLE IF NOT EXISTS ColonoscopySession (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            DoctorID INTEGER,
            PatientID INTEGER,
            DeviceID INTEGER,
            SessionDateTime DATETIME,
            FOREIGN KEY (DoctorID) REFERENCES Doctor(ID),
            FOREIGN KEY (PatientID) REFERENCES Patient(ID),
            FOREIGN KEY (DeviceID) REFERENCES EndoscopeDevice(ID)
        )",
    ),
    (
        "ColonoscopyImage",
        "CREATE TABLE IF NOT EXISTS ColonoscopyImage (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            SessionID INTEGER,
            ImagePath TEXT,
            FOREIGN KEY (SessionID) REFERENCES ColonoscopySession(ID)
        )",
    ),
    (
        "DetectionModel",
        "CREATE TABLE IF NOT EXISTS DetectionModel (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            ModelName TEXT,
            ModelVersion TEXT
        )",
    ),
    (
        "DetectedPolyps",
        "CREATE TABLE IF NOT EXISTS DetectedPolyps (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            ImageID INTEGER,
            DetectionModelID INTEGER,
            Count INTEGER,
            FOREIGN KEY (ImageID) REFERENCES ColonoscopyImage(ID),
            FOREIGN KEY (DetectionModelID) REFERENCES DetectionModel(ID)
        )",
    ),
    (
        "SegmentationModel",
        "CREATE TABLE IF NOT EXISTS SegmentationModel (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            ModelName TEXT,
            ModelVersion TEXT
        )",
    ),
    (
        "SegmentationOutput",
        "CREATE TABLE IF NOT EXISTS SegmentationOutput (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            PolypID INTEGER,
            SegmentationModelID INTEGER,
            ImagePath TEXT,
            FOREIGN KEY (PolypID) REFERENCES DetectedPolyps(ID),
            FOREIGN KEY (SegmentationModelID) REFERENCES SegmentationModel(ID)
        )",
    ),
];

/// Create all tables. Safe to call on an existing database.
pub async fn init_database(pool: &DbPool) -> Result<(), sqlx::Error> {
    for (_, ddl) in TABLES {
        sqlx::query(ddl).execute(pool).await?;
    }
    info!("Database schema ready ({} tables)", TABLES.len());
    Ok(())
}

/// Names of the user tables currently present.
pub async fn existing_tables(pool: &DbPool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )
    .fetch_all(pool)
    .await
}
