//! In-memory object dictionary standing in for a drive on the bus.
//!
//! Holds active values, a persisted copy and factory defaults. The store
//! and restore objects check their signature like a real CiA 301 device.
//! A [`SimProbe`] shares the state for inspection and fault injection.

use std::collections::HashMap;
use std::sync::Arc;

use ecm_common::sdo::{
    ControllerBlock, RESTORE_DEFAULT_PARAMETERS, RESTORE_TOKEN, SAVE_TOKEN, STORE_PARAMETERS,
    SdoAddress, SdoConfig, real32_from_raw, real32_to_raw,
};
use parking_lot::Mutex;

use super::{
    ABORT_DATA_NOT_STORED, ABORT_OBJECT_NOT_FOUND, ABORT_SUBINDEX_NOT_FOUND, SdoError,
    SdoTransfer,
};

/// Store/restore objects report "supported on command" when read.
const STORE_RESTORE_CAPABILITY: u32 = 0x0000_0001;

type Dictionary = HashMap<SdoAddress, u32>;

#[derive(Debug, Default)]
struct SimState {
    active: Dictionary,
    persisted: Dictionary,
    defaults: Dictionary,
    downloads: Vec<(SdoAddress, u32)>,
    uploads: u64,
    saves: u64,
    restores: u64,
    offline: bool,
    fault: Option<SdoError>,
}

impl SimState {
    fn check_link(&mut self) -> Result<(), SdoError> {
        if self.offline {
            return Err(SdoError::NotConnected);
        }
        match self.fault.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn missing(&self, address: SdoAddress) -> SdoError {
        let code = if self.active.keys().any(|a| a.index == address.index) {
            ABORT_SUBINDEX_NOT_FOUND
        } else {
            ABORT_OBJECT_NOT_FOUND
        };
        SdoError::Abort { address, code }
    }
}

fn dictionary(config: &SdoConfig) -> Dictionary {
    let mut map = Dictionary::new();
    insert_block(&mut map, &config.torque);
    insert_block(&mut map, &config.velocity);
    insert_block(&mut map, &config.position);
    map
}

fn insert_block<B: ControllerBlock>(map: &mut Dictionary, block: &B) {
    for address in B::addresses() {
        map.insert(address, real32_to_raw(block.entry(address.sub)));
    }
}

/// Simulated SDO endpoint of one drive.
#[derive(Debug)]
pub struct SimulatedSdoTransfer {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedSdoTransfer {
    /// Device holding factory defaults.
    pub fn new() -> (Self, SimProbe) {
        Self::with_config(&SdoConfig::default())
    }

    /// Device whose active and persisted values are `config`.
    pub fn with_config(config: &SdoConfig) -> (Self, SimProbe) {
        let state = SimState {
            active: dictionary(config),
            persisted: dictionary(config),
            defaults: dictionary(&SdoConfig::default()),
            ..Default::default()
        };
        let state = Arc::new(Mutex::new(state));
        (
            Self {
                state: Arc::clone(&state),
            },
            SimProbe { state },
        )
    }
}

impl SdoTransfer for SimulatedSdoTransfer {
    fn upload(&mut self, address: SdoAddress) -> Result<u32, SdoError> {
        let mut state = self.state.lock();
        state.check_link()?;
        state.uploads += 1;
        if address == STORE_PARAMETERS || address == RESTORE_DEFAULT_PARAMETERS {
            return Ok(STORE_RESTORE_CAPABILITY);
        }
        match state.active.get(&address) {
            Some(raw) => Ok(*raw),
            None => Err(state.missing(address)),
        }
    }

    fn download(&mut self, address: SdoAddress, value: u32) -> Result<(), SdoError> {
        let mut state = self.state.lock();
        state.check_link()?;
        state.downloads.push((address, value));

        if address == STORE_PARAMETERS {
            if value != SAVE_TOKEN {
                return Err(SdoError::Abort {
                    address,
                    code: ABORT_DATA_NOT_STORED,
                });
            }
            state.persisted = state.active.clone();
            state.saves += 1;
            return Ok(());
        }

        if address == RESTORE_DEFAULT_PARAMETERS {
            if value != RESTORE_TOKEN {
                return Err(SdoError::Abort {
                    address,
                    code: ABORT_DATA_NOT_STORED,
                });
            }
            state.persisted = state.defaults.clone();
            state.active = state.defaults.clone();
            state.restores += 1;
            return Ok(());
        }

        if !state.active.contains_key(&address) {
            return Err(state.missing(address));
        }
        state.active.insert(address, value);
        Ok(())
    }
}

/// Inspection and fault-injection handle of a [`SimulatedSdoTransfer`].
#[derive(Debug, Clone)]
pub struct SimProbe {
    state: Arc<Mutex<SimState>>,
}

impl SimProbe {
    /// Every download that reached the device, in order.
    pub fn downloads(&self) -> Vec<(SdoAddress, u32)> {
        self.state.lock().downloads.clone()
    }

    /// Signatures written to `address`.
    pub fn tokens_written_to(&self, address: SdoAddress) -> Vec<u32> {
        self.state
            .lock()
            .downloads
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn uploads(&self) -> u64 {
        self.state.lock().uploads
    }

    /// Accepted save commands.
    pub fn saves(&self) -> u64 {
        self.state.lock().saves
    }

    /// Accepted restore commands.
    pub fn restores(&self) -> u64 {
        self.state.lock().restores
    }

    /// Active value of a REAL32 entry.
    pub fn entry(&self, address: SdoAddress) -> Option<f32> {
        self.state.lock().active.get(&address).copied().map(real32_from_raw)
    }

    /// Persisted value of a REAL32 entry.
    pub fn persisted_entry(&self, address: SdoAddress) -> Option<f32> {
        self.state
            .lock()
            .persisted
            .get(&address)
            .copied()
            .map(real32_from_raw)
    }

    /// Change an active value behind the client's back.
    pub fn set_entry(&self, address: SdoAddress, value: f32) {
        self.state.lock().active.insert(address, real32_to_raw(value));
    }

    /// Disconnect or reconnect the device.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Fail the next transfer with `err`.
    pub fn inject_fault(&self, err: SdoError) {
        self.state.lock().fault = Some(err);
    }

    /// Reload active values from the persisted copy.
    pub fn power_cycle(&self) {
        let mut state = self.state.lock();
        state.active = state.persisted.clone();
    }

    pub fn clear_log(&self) {
        self.state.lock().downloads.clear();
    }
}
