//! Shared fixtures for the integration tests.

mod multiplexing;
mod properties;
mod sdo_service;
mod startup;

use std::sync::Arc;

use ecm_common::config::ControlLoopConfig;
use ecm_control_loop::ControlLoop;
use ecm_control_loop::CycleReport;
use ecm_control_loop::device::TaskTime;
use ecm_control_loop::dio::DigitalIo;
use ecm_control_loop::drive::Drive;
use ecm_control_loop::params::ParameterTree;
use ecm_control_loop::transport::{MailboxTransport, TransportHandle};

pub fn config(drives: usize, ios: usize) -> ControlLoopConfig {
    ControlLoopConfig {
        drives,
        ios,
        cycle_time_us: 1000,
        read_sdo_update_sec: 1.0,
    }
}

/// Standard loop plus the handles a test needs to observe it.
pub struct Node {
    pub cl: ControlLoop<Drive, DigitalIo>,
    pub tree: Arc<ParameterTree>,
    pub bus: TransportHandle,
    cycle: u64,
}

impl Node {
    /// Loop created but not initialized.
    pub fn created(config: &ControlLoopConfig) -> Self {
        let tree = Arc::new(ParameterTree::new());
        let mut transport = MailboxTransport::new();
        let bus = transport.handle();
        let cl = ControlLoop::standard(config, tree.clone(), &mut transport)
            .expect("valid config");
        Self {
            cl,
            tree,
            bus,
            cycle: 0,
        }
    }

    /// Loop taken through both init phases and started.
    pub fn operating(config: &ControlLoopConfig) -> Self {
        let mut node = Self::created(config);
        node.cl.init_phase1().expect("init phase 1");
        node.cl.init_phase2().expect("init phase 2");
        node.cl.start().expect("start");
        node
    }

    /// Run one cycle with a 1 ms clock.
    pub fn tick(&mut self) -> CycleReport {
        let time = TaskTime::new(self.cycle, self.cycle * 1_000_000);
        self.cycle += 1;
        self.cl.iterate(time).expect("iterate while operating")
    }
}
