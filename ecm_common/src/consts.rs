//! System-wide constants for the ECM workspace.
//!
//! Single source of truth for pool limits, topic names and binding names.

use static_assertions::const_assert;

/// Maximum number of drives in one node.
pub const MAX_DRIVES: usize = 64;

/// Maximum number of digital I/O modules in one node.
pub const MAX_IOS: usize = 64;

/// Analog inputs reported by every drive.
pub const DRIVE_ANALOG_INPUTS: usize = 4;

/// Digital inputs reported by every drive.
pub const DRIVE_DIGITAL_INPUTS: usize = 4;

/// Digital channels (inputs and outputs) of one I/O module.
pub const IO_CHANNELS: usize = 8;

/// Default cycle time in microseconds (1 kHz).
pub const CYCLE_TIME_US: u64 = 1000;

/// Lower bound for the configured cycle time [µs].
pub const CYCLE_TIME_US_MIN: u64 = 1;

/// Upper bound for the configured cycle time [µs].
pub const CYCLE_TIME_US_MAX: u64 = 100_000;

/// Default interval between bulk SDO reads [s].
pub const READ_SDO_UPDATE_SEC_DEFAULT: f64 = 1.0;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ecm/node.toml";

// ─── Topics ─────────────────────────────────────────────────────────

/// Inbound drive command batches.
pub const TOPIC_DRIVE_CONTROL: &str = "/drive_control";

/// Inbound digital output batches.
pub const TOPIC_DIGITAL_OUTPUTS: &str = "/digital_outputs";

/// Outbound drive feedback batches.
pub const TOPIC_DRIVE_FEEDBACK: &str = "/drive_feedback";

/// Outbound digital input batches.
pub const TOPIC_DIGITAL_INPUTS: &str = "/digital_inputs";

// ─── Parameter tree names ───────────────────────────────────────────

/// Root module name of the parameter tree.
pub const ROOT_MODULE: &str = "root";

/// Name prefix of pooled drives (`axis1`, `axis2`, ...).
pub const DRIVE_NAME_PREFIX: &str = "axis";

/// Name prefix of pooled I/O modules (`device1`, `device2`, ...).
pub const IO_NAME_PREFIX: &str = "device";

const_assert!(MAX_DRIVES > 0 && MAX_DRIVES <= 256);
const_assert!(MAX_IOS <= 256);
const_assert!(CYCLE_TIME_US >= CYCLE_TIME_US_MIN && CYCLE_TIME_US <= CYCLE_TIME_US_MAX);

/// 1-based positional module name for a pooled device.
///
/// `module_name(DRIVE_NAME_PREFIX, 0)` is `"axis1"`.
pub fn module_name(prefix: &str, index: usize) -> String {
    format!("{prefix}{}", index + 1)
}
