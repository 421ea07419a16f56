//! Configuration service handler (administrative lane).
//!
//! Keyed by drive index, returning parallel result lists. Requests longer
//! than the pool are truncated to `min(N, L)`, never rejected. Each drive's
//! configuration state sits behind its own mutex, so concurrent callers
//! are serialized per drive and never contend with the cyclic lane.

use ecm_common::messages::{
    ConfigResponse, GetSdoConfigRequest, GetSdoConfigResponse, RestoreConfigRequest,
    SaveConfigRequest, SdoReply, SdoRequest, SetSdoConfigRequest,
};
use ecm_common::sdo::{ConfigAction, SdoConfigUpdate};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{SdoAccess, SdoError};
use crate::poll::SdoReadTrigger;
use crate::pool::{DevicePool, PoolError};

/// Result of one bulk configuration read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkReadOutcome {
    pub drives: usize,
    pub failed: usize,
}

/// Get/Set/Save/Restore over a pool of per-drive configuration clients.
#[derive(Debug)]
pub struct SdoService<S> {
    drives: DevicePool<Mutex<S>>,
    trigger: Option<SdoReadTrigger>,
}

impl<S: SdoAccess> SdoService<S> {
    /// Service over `count` drives, `make(i)` creating the client of drive `i`.
    pub fn from_fn(count: usize, mut make: impl FnMut(usize) -> S) -> Self {
        Self {
            drives: DevicePool::from_fn(count, |i| Mutex::new(make(i))),
            trigger: None,
        }
    }

    /// Service bulk reads requested by the cyclic poll timer.
    pub fn with_trigger(mut self, trigger: SdoReadTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn len(&self) -> usize {
        self.drives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drives.is_empty()
    }

    /// Run `f` with exclusive access to drive `index`.
    pub fn with_drive<R>(&self, index: usize, f: impl FnOnce(&mut S) -> R) -> Result<R, PoolError> {
        let drive = self.drives.at(index)?;
        Ok(f(&mut drive.lock()))
    }

    /// Read configuration of drives `i < min(N, L)`.
    ///
    /// Drive `i` refreshes its cache only if `read_cfg[i]` is set; the
    /// cached blocks are returned either way.
    pub fn get_config(&self, req: &GetSdoConfigRequest) -> GetSdoConfigResponse {
        let count = self.drives.len().min(req.read_cfg.len());
        debug!("get_sdo_config over {count} drives");

        let mut res = GetSdoConfigResponse::default();
        for (i, (drive, read)) in self.drives.iter().zip(&req.read_cfg).enumerate() {
            let mut drive = drive.lock();
            let outcome = drive.request_sdo_update(*read);
            log_failure("get_sdo_config", i, &outcome);

            let cfg = drive.sdo_config();
            res.torque_controller_cfg.push(cfg.torque);
            res.velocity_controller_cfg.push(cfg.velocity);
            res.position_controller_cfg.push(cfg.position);
            res.success.push(outcome.is_ok());
        }
        res
    }

    /// Write configuration blocks to every drive of the pool.
    ///
    /// Each block is applied to drive `i` only if its request list has an
    /// entry at `i`; missing blocks leave the drive's block unchanged.
    pub fn set_config(&self, req: &SetSdoConfigRequest) -> ConfigResponse {
        let mut res = ConfigResponse::default();
        for (i, drive) in self.drives.iter().enumerate() {
            let update = SdoConfigUpdate {
                torque: req.torque_controller_cfg.get(i).copied(),
                velocity: req.velocity_controller_cfg.get(i).copied(),
                position: req.position_controller_cfg.get(i).copied(),
            };
            if update.is_empty() {
                res.success.push(true);
                continue;
            }
            let outcome = drive.lock().set_sdo_config(&update);
            log_failure("set_sdo_config", i, &outcome);
            res.success.push(outcome.is_ok());
        }
        res
    }

    /// Dispatch one tagged request to its handler.
    pub fn handle(&self, req: &SdoRequest) -> SdoReply {
        match req {
            SdoRequest::GetSdoConfig(r) => SdoReply::Get(self.get_config(r)),
            SdoRequest::SetSdoConfig(r) => SdoReply::Config(self.set_config(r)),
            SdoRequest::SaveConfig(r) => SdoReply::Config(self.save_config(r)),
            SdoRequest::RestoreConfig(r) => SdoReply::Config(self.restore_config(r)),
        }
    }

    /// Persist the configuration of drives `i < min(N, L)` with `save[i]` set.
    pub fn save_config(&self, req: &SaveConfigRequest) -> ConfigResponse {
        self.persist(&req.save, ConfigAction::Save)
    }

    /// Restore defaults on drives `i < min(N, L)` with `reset_to_default[i]` set.
    pub fn restore_config(&self, req: &RestoreConfigRequest) -> ConfigResponse {
        self.persist(&req.reset_to_default, ConfigAction::RestoreDefaults)
    }

    fn persist(&self, flags: &[bool], action: ConfigAction) -> ConfigResponse {
        let count = self.drives.len().min(flags.len());
        info!("{action:?} called for {count} drives");

        let mut res = ConfigResponse::default();
        for (i, (drive, selected)) in self.drives.iter().zip(flags).enumerate() {
            info!("{action:?} drive {i}: {selected}");
            if !*selected {
                res.success.push(true);
                continue;
            }
            let mut drive = drive.lock();
            let outcome = match action {
                ConfigAction::Save => drive.save_all_config(action.token()),
                ConfigAction::RestoreDefaults => drive.restore_all_config(action.token()),
            };
            log_failure("persist", i, &outcome);
            res.success.push(outcome.is_ok());
        }
        res
    }

    /// Refresh the configuration cache of every drive.
    pub fn bulk_read(&self) -> BulkReadOutcome {
        let mut outcome = BulkReadOutcome {
            drives: self.drives.len(),
            failed: 0,
        };
        for (i, drive) in self.drives.iter().enumerate() {
            let result = drive.lock().request_sdo_update(true);
            log_failure("bulk read", i, &result);
            if result.is_err() {
                outcome.failed += 1;
            }
        }
        debug!(
            "bulk SDO read: {} drives, {} failed",
            outcome.drives, outcome.failed
        );
        outcome
    }

    /// Run a bulk read if the poll trigger fired since the last call.
    pub fn poll_bulk_read(&self) -> Option<BulkReadOutcome> {
        let trigger = self.trigger.as_ref()?;
        trigger.take().then(|| self.bulk_read())
    }
}

/// Parse newline-delimited JSON requests, skipping blank lines.
pub fn parse_requests(text: &str) -> Result<Vec<SdoRequest>, serde_json::Error> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(serde_json::from_str)
        .collect()
}

fn log_failure(operation: &str, index: usize, outcome: &Result<(), SdoError>) {
    if let Err(e) = outcome {
        warn!("{operation}: drive {index} failed: {e}");
    }
}
