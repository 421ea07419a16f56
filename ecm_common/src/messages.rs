//! Command, feedback and service message types.
//!
//! This module defines the records exchanged with the outside world:
//! - `DriveCommand` / `DriveFeedback` - Per-drive process data
//! - `DigitalIoCommand` / `DigitalIoFeedback` - Per-module process data
//! - Batch aliases - Fixed-capacity, index-ordered collections (RT-safe)
//! - SDO service requests and responses (administrative lane)
//!
//! Batches are correlated with the device pools by position: entry `i`
//! belongs to pool index `i`.

use serde::{Deserialize, Serialize};

use crate::consts::{DRIVE_ANALOG_INPUTS, DRIVE_DIGITAL_INPUTS, IO_CHANNELS, MAX_DRIVES, MAX_IOS};
use crate::sdo::{PositionControllerConfig, TorqueControllerConfig, VelocityControllerConfig};

// ─── Drives ─────────────────────────────────────────────────────────

/// Setpoint payload carried by a drive command.
///
/// Opaque to the control loop; interpreted by the drive according to
/// its operating mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveSetpoint {
    /// Target position [increments]
    pub target_position: i32,
    /// Target velocity [rpm]
    pub target_velocity: i32,
    /// Target torque [‰ of rated torque]
    pub target_torque: i32,
}

/// Command for one drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveCommand {
    /// CiA 402 control word (0x6040).
    pub control_word: u16,
    /// CiA 402 modes of operation (0x6060).
    pub op_mode: i8,
    /// Setpoint payload.
    pub setpoint: DriveSetpoint,
}

impl DriveCommand {
    /// Command with the given control word and mode and a zero setpoint.
    pub const fn new(control_word: u16, op_mode: i8) -> Self {
        Self {
            control_word,
            op_mode,
            setpoint: DriveSetpoint {
                target_position: 0,
                target_velocity: 0,
                target_torque: 0,
            },
        }
    }
}

/// Per-cycle snapshot of one drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveFeedback {
    /// CiA 402 status word (0x6041).
    pub status_word: u16,
    /// Drive is in "operation enabled".
    pub drive_enabled: bool,
    /// Drive error code (0x603F, 0 = no error).
    pub error_code: u16,
    /// Device-local timestamp [ns, wrapping].
    pub slave_timestamp: u32,
    /// Position actual value.
    pub position_value: i32,
    /// Velocity actual value.
    pub velocity_value: i32,
    /// Torque actual value.
    pub torque_value: i32,
    /// Secondary encoder position.
    pub secondary_position_value: i32,
    /// Secondary encoder velocity.
    pub secondary_velocity_value: i32,
    /// Analog inputs [V].
    pub analog_inputs: [f64; DRIVE_ANALOG_INPUTS],
    /// Digital inputs.
    pub digital_inputs: [bool; DRIVE_DIGITAL_INPUTS],
}

// ─── Digital I/O ────────────────────────────────────────────────────

/// Output states for one digital I/O module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalIoCommand {
    /// Digital output states.
    pub digital_outputs: [bool; IO_CHANNELS],
}

/// Per-cycle snapshot of one digital I/O module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalIoFeedback {
    /// Digital input states.
    pub digital_inputs: [bool; IO_CHANNELS],
    /// Output states currently applied by the module.
    pub digital_outputs: [bool; IO_CHANNELS],
}

// ─── Batches ────────────────────────────────────────────────────────

/// Inbound drive commands, index-ordered.
pub type DriveCommandBatch = heapless::Vec<DriveCommand, MAX_DRIVES>;

/// Outbound drive feedback, index-ordered.
pub type DriveFeedbackBatch = heapless::Vec<DriveFeedback, MAX_DRIVES>;

/// Inbound digital output commands, index-ordered.
pub type IoCommandBatch = heapless::Vec<DigitalIoCommand, MAX_IOS>;

/// Outbound digital input feedback, index-ordered.
pub type IoFeedbackBatch = heapless::Vec<DigitalIoFeedback, MAX_IOS>;

// ─── SDO service ────────────────────────────────────────────────────

/// Read the controller configuration of the first `read_cfg.len()` drives.
///
/// `read_cfg[i]` asks drive `i` to refresh its configuration from the
/// device before answering; `false` answers from the cached copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSdoConfigRequest {
    pub read_cfg: Vec<bool>,
}

/// Parallel per-drive lists, in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetSdoConfigResponse {
    pub torque_controller_cfg: Vec<TorqueControllerConfig>,
    pub velocity_controller_cfg: Vec<VelocityControllerConfig>,
    pub position_controller_cfg: Vec<PositionControllerConfig>,
    /// `false` where the refresh failed (the cached block is returned).
    pub success: Vec<bool>,
}

/// Write controller configuration blocks.
///
/// Entry `i` of each list targets drive `i`; a list shorter than the pool
/// leaves that block untouched on the remaining drives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetSdoConfigRequest {
    #[serde(default)]
    pub torque_controller_cfg: Vec<TorqueControllerConfig>,
    #[serde(default)]
    pub velocity_controller_cfg: Vec<VelocityControllerConfig>,
    #[serde(default)]
    pub position_controller_cfg: Vec<PositionControllerConfig>,
}

/// Persist the current configuration of every drive flagged `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveConfigRequest {
    pub save: Vec<bool>,
}

/// Restore factory defaults on every drive flagged `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreConfigRequest {
    pub reset_to_default: Vec<bool>,
}

/// Per-drive outcome of a set/save/restore request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub success: Vec<bool>,
}

impl ConfigResponse {
    /// True if every entry succeeded (vacuously true when empty).
    pub fn all_succeeded(&self) -> bool {
        self.success.iter().all(|ok| *ok)
    }
}

/// One call to the configuration service, tagged by service name.
///
/// ```json
/// {"service": "save_config", "save": [true, false]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "service", rename_all = "snake_case")]
pub enum SdoRequest {
    GetSdoConfig(GetSdoConfigRequest),
    SetSdoConfig(SetSdoConfigRequest),
    SaveConfig(SaveConfigRequest),
    RestoreConfig(RestoreConfigRequest),
}

/// Answer to an [`SdoRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SdoReply {
    Get(GetSdoConfigResponse),
    Config(ConfigResponse),
}
