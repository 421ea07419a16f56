//! Object-dictionary client for one drive.

use ecm_common::sdo::{
    ConfigAction, ControllerBlock, SdoConfig, SdoConfigUpdate, real32_from_raw, real32_to_raw,
};
use tracing::debug;

use super::{SdoAccess, SdoError, SdoTransfer};

/// Maps controller blocks to object entries and keeps the last read values.
#[derive(Debug)]
pub struct SdoClient<T> {
    transfer: T,
    config: SdoConfig,
    reads: u64,
}

impl<T: SdoTransfer> SdoClient<T> {
    /// Client with factory defaults cached until the first read.
    pub fn new(transfer: T) -> Self {
        Self {
            transfer,
            config: SdoConfig::default(),
            reads: 0,
        }
    }

    /// Completed full configuration reads.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    pub fn transfer(&self) -> &T {
        &self.transfer
    }

    fn read_block<B: ControllerBlock>(&mut self) -> Result<B, SdoError> {
        let mut block = B::default();
        for address in B::addresses() {
            let raw = self.transfer.upload(address)?;
            block.set_entry(address.sub, real32_from_raw(raw));
        }
        Ok(block)
    }

    fn write_block<B: ControllerBlock>(&mut self, block: &B) -> Result<(), SdoError> {
        for address in B::addresses() {
            self.transfer
                .download(address, real32_to_raw(block.entry(address.sub)))?;
        }
        Ok(())
    }

    fn read_all(&mut self) -> Result<(), SdoError> {
        let config = SdoConfig {
            torque: self.read_block()?,
            velocity: self.read_block()?,
            position: self.read_block()?,
        };
        self.config = config;
        self.reads += 1;
        Ok(())
    }

    fn write_action(&mut self, action: ConfigAction, token: u32) -> Result<(), SdoError> {
        debug!("writing 0x{token:08X} to {} ({action:?})", action.address());
        self.transfer.download(action.address(), token)
    }
}

impl<T: SdoTransfer> SdoAccess for SdoClient<T> {
    fn request_sdo_update(&mut self, read: bool) -> Result<(), SdoError> {
        if read {
            self.read_all()?;
        }
        Ok(())
    }

    fn sdo_config(&self) -> SdoConfig {
        self.config
    }

    fn set_sdo_config(&mut self, update: &SdoConfigUpdate) -> Result<(), SdoError> {
        if let Some(torque) = &update.torque {
            self.write_block(torque)?;
            self.config.torque = *torque;
        }
        if let Some(velocity) = &update.velocity {
            self.write_block(velocity)?;
            self.config.velocity = *velocity;
        }
        if let Some(position) = &update.position {
            self.write_block(position)?;
            self.config.position = *position;
        }
        Ok(())
    }

    fn save_all_config(&mut self, token: u32) -> Result<(), SdoError> {
        self.write_action(ConfigAction::Save, token)
    }

    fn restore_all_config(&mut self, token: u32) -> Result<(), SdoError> {
        self.write_action(ConfigAction::RestoreDefaults, token)?;
        // Active values changed on the device; refresh the cache.
        self.read_all()
    }
}
