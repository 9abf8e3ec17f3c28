//! One repository per table. Every call runs a single statement in its own
//! implicit transaction.

pub mod device_repo;
pub mod doctor_repo;
pub mod image_repo;
pub mod model_repo;
pub mod patient_repo;
pub mod polyp_repo;
pub mod segmentation_output_repo;
pub mod session_repo;

pub use device_repo::EndoscopeDeviceRepo;
pub use doctor_repo::DoctorRepo;
pub use image_repo::ColonoscopyImageRepo;
pub use model_repo::{ModelKind, ModelRepo};
pub use patient_repo::PatientRepo;
pub use polyp_repo::DetectedPolypsRepo;
pub use segmentation_output_repo::SegmentationOutputRepo;
pub use session_repo::ColonoscopySessionRepo;
