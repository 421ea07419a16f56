//! ECM Common Library
//!
//! Shared constants, message types and configuration loading for the
//! EtherCAT master control-loop workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Pool limits, default cycle time, topic and binding names
//! - [`messages`] - Command/feedback records, batches and service requests
//! - [`sdo`] - Controller configuration blocks and persistence action tokens
//! - [`cia402`] - CiA 402 control/status word flags
//! - [`config`] - Node configuration and the TOML loader trait
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use ecm_common::prelude::*;
//! ```

pub mod cia402;
pub mod config;
pub mod consts;
pub mod messages;
pub mod prelude;
pub mod sdo;
