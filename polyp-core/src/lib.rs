//! polyp-core: shared types for the polyp-scope workspace
//!
//! Frames, detections, the frame-sink seam used for session recording,
//! the workspace error type and the layered configuration.

pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod sink;

pub use config::{PersistencePolicy, ScopeConfig};
pub use detection::{BoundingBox, Detection, DetectionSet, Mask};
pub use error::{Error, Result};
pub use frame::{ColorOrder, Frame};
pub use sink::{next_run_id, FrameRecord, FrameSink, SessionInfo};
