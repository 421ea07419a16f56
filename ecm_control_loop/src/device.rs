//! Device trait and identity types.
//!
//! This module defines:
//! - `Device` trait - lifecycle and cyclic interface of every pooled unit
//! - `DeviceHandle` - stable identity (kind + pool index)
//! - `DeviceContext` - what a device receives at construction
//! - `TaskTime` - system time handed to `iterate`
//! - `DeviceError` - device-level failures

use thiserror::Error;

use crate::params::{BindingError, BindingScope};

/// Error types for device operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Binding registration failed
    #[error("binding error: {0}")]
    Binding(#[from] BindingError),

    /// Device reported a fault
    #[error("device fault: {0}")]
    Fault(String),

    /// Device not reachable on the bus
    #[error("device unavailable: {0}")]
    Unavailable(String),

    /// Call not allowed in the device's current phase
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

/// Device category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Drive,
    DigitalIo,
}

impl DeviceKind {
    /// Prefix of the positional module name.
    pub const fn name_prefix(self) -> &'static str {
        match self {
            Self::Drive => ecm_common::consts::DRIVE_NAME_PREFIX,
            Self::DigitalIo => ecm_common::consts::IO_NAME_PREFIX,
        }
    }
}

/// Identity of one pooled device. Stable for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    pub kind: DeviceKind,
    pub index: usize,
}

impl DeviceHandle {
    pub const fn new(kind: DeviceKind, index: usize) -> Self {
        Self { kind, index }
    }

    /// 1-based positional name (`axis1`, `device3`).
    pub fn module_name(&self) -> String {
        ecm_common::consts::module_name(self.kind.name_prefix(), self.index)
    }
}

impl core::fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}{}", self.kind.name_prefix(), self.index + 1)
    }
}

/// Construction context of a device.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    pub handle: DeviceHandle,
    /// Binding scope named after the device (`root/axis1`).
    pub scope: BindingScope,
}

/// System time of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskTime {
    /// Cycle counter, starting at 0.
    pub cycle: u64,
    /// Monotonic time at cycle start [ns].
    pub monotonic_ns: u64,
}

impl TaskTime {
    pub const fn new(cycle: u64, monotonic_ns: u64) -> Self {
        Self {
            cycle,
            monotonic_ns,
        }
    }
}

/// Interface of every pooled device.
///
/// # Lifecycle
///
/// 1. `init_phase1()` - register bindings
/// 2. `init_phase2()` - resolve cross-references, prepare state
/// 3. `start()` - enter cyclic operation
/// 4. `iterate()` - called once per cycle while operating
/// 5. `stop()` - leave cyclic operation
///
/// # Timing
/// Lifecycle calls run before or after the RT loop and may block.
/// `iterate()` runs on the RT cycle: no allocation, no blocking.
pub trait Device: Send {
    /// Positional module name.
    fn name(&self) -> &str;

    fn init_phase1(&mut self) -> Result<(), DeviceError>;

    fn init_phase2(&mut self) -> Result<(), DeviceError>;

    fn start(&mut self) -> Result<(), DeviceError>;

    fn stop(&mut self) -> Result<(), DeviceError>;

    /// Advance one cycle with the given system time.
    fn iterate(&mut self, time: TaskTime) -> Result<(), DeviceError>;
}
