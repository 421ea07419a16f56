//! # ECM Control Loop
//!
//! Cyclic orchestrator of an EtherCAT master node. Owns a fixed pool of
//! N drives and M digital I/O modules, sequences their lifecycle, and once
//! per period multiplexes command batches onto the devices and device
//! feedback back into batches.
//!
//! ## Lanes
//!
//! - **Cyclic lane**: [`control_loop::ControlLoop`] driven by
//!   [`cycle::CycleRunner`]. Never blocks, never allocates after startup.
//! - **Administrative lane**: [`sdo::SdoService`] answering Get/Set/Save/
//!   Restore configuration requests and bulk reads requested by the poll
//!   timer. Shares nothing with the cyclic lane except mailboxes and the
//!   [`poll::SdoReadTrigger`] latch.
//!
//! ## Module Structure
//!
//! - [`params`] - Parameter tree with typed, directional bindings
//! - [`mailbox`] - Single-slot latest-value handoff
//! - [`transport`] - Publish/subscribe seam and its in-process implementation
//! - [`device`] / [`drive`] / [`dio`] - Device contracts and binding-backed units
//! - [`pool`] - Fixed-size indexed device pools
//! - [`lifecycle`] - Phase state machine and fail-fast traversal
//! - [`poll`] - SDO poll timer and bulk-read trigger
//! - [`sdo`] - Configuration access, client, simulated endpoint and service

pub mod control_loop;
pub mod cycle;
pub mod device;
pub mod dio;
pub mod drive;
pub mod lifecycle;
pub mod mailbox;
pub mod params;
pub mod poll;
pub mod pool;
pub mod sdo;
pub mod transport;

pub use control_loop::{ControlLoop, ControlLoopError, CycleReport};
pub use lifecycle::LifecyclePhase;
