//! SDO configuration channel.
//!
//! This module defines:
//! - `SdoTransfer` trait - expedited upload/download on the bus
//! - `SdoAccess` trait - per-drive configuration primitive used by the service
//! - `SdoError` enum - transfer and device errors
//!
//! Everything here runs on the administrative lane. Transfers may block
//! on the bus; nothing in this module is reachable from the cyclic path.

pub mod client;
pub mod service;
pub mod sim;

use ecm_common::sdo::{SdoAddress, SdoConfig, SdoConfigUpdate};
use thiserror::Error;

pub use client::SdoClient;
pub use service::{BulkReadOutcome, SdoService, parse_requests};
pub use sim::{SimProbe, SimulatedSdoTransfer};

/// Object does not exist in the object dictionary.
pub const ABORT_OBJECT_NOT_FOUND: u32 = 0x0602_0000;
/// Sub-index does not exist.
pub const ABORT_SUBINDEX_NOT_FOUND: u32 = 0x0609_0011;
/// Data cannot be transferred or stored to the application.
pub const ABORT_DATA_NOT_STORED: u32 = 0x0800_0020;

/// Error types for SDO operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdoError {
    /// Device answered with an SDO abort
    #[error("SDO abort at {address}: 0x{code:08X}")]
    Abort { address: SdoAddress, code: u32 },

    /// No answer within the transfer timeout
    #[error("SDO transfer timed out at {0}")]
    Timeout(SdoAddress),

    /// Device not reachable
    #[error("device not connected")]
    NotConnected,
}

/// Expedited SDO transfers to one device.
pub trait SdoTransfer: Send {
    /// Read a 32-bit entry.
    fn upload(&mut self, address: SdoAddress) -> Result<u32, SdoError>;

    /// Write a 32-bit entry.
    fn download(&mut self, address: SdoAddress, value: u32) -> Result<(), SdoError>;
}

/// Configuration access to one drive.
pub trait SdoAccess: Send {
    /// Refresh the cached configuration from the device when `read` is set.
    fn request_sdo_update(&mut self, read: bool) -> Result<(), SdoError>;

    /// Last known configuration.
    fn sdo_config(&self) -> SdoConfig;

    /// Write the present blocks of `update`; absent blocks are untouched.
    fn set_sdo_config(&mut self, update: &SdoConfigUpdate) -> Result<(), SdoError>;

    /// Persist the active configuration, signed with `token`.
    fn save_all_config(&mut self, token: u32) -> Result<(), SdoError>;

    /// Restore factory defaults, signed with `token`.
    fn restore_all_config(&mut self, token: u32) -> Result<(), SdoError>;
}
