//! Prelude module for common re-exports.
//!
//! ```rust
//! use ecm_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, NodeConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{CYCLE_TIME_US, MAX_DRIVES, MAX_IOS};

// ─── Messages ───────────────────────────────────────────────────────
pub use crate::messages::{
    DigitalIoCommand, DigitalIoFeedback, DriveCommand, DriveCommandBatch, DriveFeedback,
    DriveFeedbackBatch, DriveSetpoint, IoCommandBatch, IoFeedbackBatch, SdoReply, SdoRequest,
};

// ─── SDO ────────────────────────────────────────────────────────────
pub use crate::sdo::{ConfigAction, SdoConfig, SdoConfigUpdate, RESTORE_TOKEN, SAVE_TOKEN};
