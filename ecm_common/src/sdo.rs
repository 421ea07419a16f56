//! SDO configuration blocks and persistence action tokens.
//!
//! A drive exposes three controller configuration blocks through its
//! object dictionary. Each block lives in one manufacturer-specific
//! object; its entries are REAL32 values starting at sub-index 1.
//!
//! Persisting and restoring the whole configuration follows CiA 301:
//! a 32-bit signature is written to `0x1010:01` (store parameters) or
//! `0x1011:01` (restore default parameters). The device rejects any
//! other signature, so the two tokens must never be swapped.

use serde::{Deserialize, Serialize};
use static_assertions::const_assert_ne;

/// ASCII `"save"` read as a little-endian `u32`.
pub const SAVE_TOKEN: u32 = 0x6576_6173;

/// ASCII `"load"` read as a little-endian `u32`.
pub const RESTORE_TOKEN: u32 = 0x6461_6f6c;

const_assert_ne!(SAVE_TOKEN, RESTORE_TOKEN);

/// Object dictionary address of one sub-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SdoAddress {
    pub index: u16,
    pub sub: u8,
}

impl SdoAddress {
    pub const fn new(index: u16, sub: u8) -> Self {
        Self { index, sub }
    }
}

impl core::fmt::Display for SdoAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:04X}:{:02X}", self.index, self.sub)
    }
}

/// Store parameters, "save all" sub-entry.
pub const STORE_PARAMETERS: SdoAddress = SdoAddress::new(0x1010, 1);

/// Restore default parameters, "restore all" sub-entry.
pub const RESTORE_DEFAULT_PARAMETERS: SdoAddress = SdoAddress::new(0x1011, 1);

/// Whole-configuration persistence action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigAction {
    /// Persist the current configuration to non-volatile storage.
    Save,
    /// Restore the factory default configuration.
    RestoreDefaults,
}

impl ConfigAction {
    /// Signature expected by the device for this action.
    #[inline]
    pub const fn token(self) -> u32 {
        match self {
            Self::Save => SAVE_TOKEN,
            Self::RestoreDefaults => RESTORE_TOKEN,
        }
    }

    /// Object the signature is written to.
    #[inline]
    pub const fn address(self) -> SdoAddress {
        match self {
            Self::Save => STORE_PARAMETERS,
            Self::RestoreDefaults => RESTORE_DEFAULT_PARAMETERS,
        }
    }

    /// Identify an action from its signature. Returns `None` for unknown values.
    pub const fn from_token(token: u32) -> Option<Self> {
        match token {
            SAVE_TOKEN => Some(Self::Save),
            RESTORE_TOKEN => Some(Self::RestoreDefaults),
            _ => None,
        }
    }
}

// ─── Controller blocks ──────────────────────────────────────────────

/// A controller configuration block stored as consecutive REAL32 entries.
pub trait ControllerBlock: Copy + Default + PartialEq + core::fmt::Debug {
    /// Object index holding the block.
    const INDEX: u16;
    /// Number of entries (sub-indices `1..=ENTRIES`).
    const ENTRIES: u8;

    /// Value of sub-entry `sub`. Out-of-range sub-indices read as 0.0.
    fn entry(&self, sub: u8) -> f32;

    /// Set sub-entry `sub`. Out-of-range sub-indices are ignored.
    fn set_entry(&mut self, sub: u8, value: f32);

    /// Addresses of all entries, in sub-index order.
    fn addresses() -> impl Iterator<Item = SdoAddress> {
        (1..=Self::ENTRIES).map(|sub| SdoAddress::new(Self::INDEX, sub))
    }
}

/// Torque (current) controller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TorqueControllerConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Default for TorqueControllerConfig {
    fn default() -> Self {
        Self {
            kp: 40.0,
            ki: 4.0,
            kd: 0.0,
        }
    }
}

impl ControllerBlock for TorqueControllerConfig {
    const INDEX: u16 = 0x2010;
    const ENTRIES: u8 = 3;

    fn entry(&self, sub: u8) -> f32 {
        match sub {
            1 => self.kp,
            2 => self.ki,
            3 => self.kd,
            _ => 0.0,
        }
    }

    fn set_entry(&mut self, sub: u8, value: f32) {
        match sub {
            1 => self.kp = value,
            2 => self.ki = value,
            3 => self.kd = value,
            _ => {}
        }
    }
}

/// Velocity controller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityControllerConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub integral_limit: f32,
}

impl Default for VelocityControllerConfig {
    fn default() -> Self {
        Self {
            kp: 0.8,
            ki: 0.05,
            kd: 0.0,
            integral_limit: 1000.0,
        }
    }
}

impl ControllerBlock for VelocityControllerConfig {
    const INDEX: u16 = 0x2011;
    const ENTRIES: u8 = 4;

    fn entry(&self, sub: u8) -> f32 {
        match sub {
            1 => self.kp,
            2 => self.ki,
            3 => self.kd,
            4 => self.integral_limit,
            _ => 0.0,
        }
    }

    fn set_entry(&mut self, sub: u8, value: f32) {
        match sub {
            1 => self.kp = value,
            2 => self.ki = value,
            3 => self.kd = value,
            4 => self.integral_limit = value,
            _ => {}
        }
    }
}

/// Position controller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionControllerConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub integral_limit: f32,
}

impl Default for PositionControllerConfig {
    fn default() -> Self {
        Self {
            kp: 2.0,
            ki: 0.0,
            kd: 0.0,
            integral_limit: 0.0,
        }
    }
}

impl ControllerBlock for PositionControllerConfig {
    const INDEX: u16 = 0x2012;
    const ENTRIES: u8 = 4;

    fn entry(&self, sub: u8) -> f32 {
        match sub {
            1 => self.kp,
            2 => self.ki,
            3 => self.kd,
            4 => self.integral_limit,
            _ => 0.0,
        }
    }

    fn set_entry(&mut self, sub: u8, value: f32) {
        match sub {
            1 => self.kp = value,
            2 => self.ki = value,
            3 => self.kd = value,
            4 => self.integral_limit = value,
            _ => {}
        }
    }
}

// ─── Aggregate ──────────────────────────────────────────────────────

/// Complete controller configuration of one drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SdoConfig {
    pub torque: TorqueControllerConfig,
    pub velocity: VelocityControllerConfig,
    pub position: PositionControllerConfig,
}

/// Partial configuration write. `None` blocks are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SdoConfigUpdate {
    pub torque: Option<TorqueControllerConfig>,
    pub velocity: Option<VelocityControllerConfig>,
    pub position: Option<PositionControllerConfig>,
}

impl SdoConfigUpdate {
    /// True if no block is present.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.torque.is_none() && self.velocity.is_none() && self.position.is_none()
    }
}

/// Encode a REAL32 entry for transfer.
#[inline]
pub fn real32_to_raw(value: f32) -> u32 {
    value.to_bits()
}

/// Decode a transferred REAL32 entry.
#[inline]
pub fn real32_from_raw(raw: u32) -> f32 {
    f32::from_bits(raw)
}
