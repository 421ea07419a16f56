//! Control-loop orchestrator.
//!
//! Owns the drive and I/O pools, sequences their lifecycle and runs the
//! per-cycle update:
//!
//! 1. Poll timer: set `read_sdo` and fire the bulk-read trigger when due.
//! 2. Apply the newest drive command batch, `batch[i]` → drive `i`.
//! 3. Same for digital outputs when the I/O pool is non-empty.
//! 4. Update every drive; mirror `controlword`/`opmode`, push `statusword`,
//!    collect feedback.
//! 5. Publish the drive feedback batch (always, even when empty).
//! 6. Update every I/O module and publish its batch (non-empty pool only).
//!
//! `iterate` never blocks and never allocates. Batches are fixed-capacity
//! and preallocated and bindings are atomic slots. Commands are taken and
//! feedback is posted with `try_lock`, so a reader holding a topic costs at
//! most one dropped feedback batch.

use std::sync::Arc;
use std::time::Duration;

use ecm_common::config::{ConfigError, ControlLoopConfig};
use ecm_common::consts::{
    MAX_DRIVES, MAX_IOS, ROOT_MODULE, TOPIC_DIGITAL_INPUTS, TOPIC_DIGITAL_OUTPUTS,
    TOPIC_DRIVE_CONTROL, TOPIC_DRIVE_FEEDBACK,
};
use ecm_common::messages::{DriveCommandBatch, DriveFeedbackBatch, IoCommandBatch, IoFeedbackBatch};
use static_assertions::const_assert;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::device::{Device, DeviceContext, DeviceHandle, DeviceKind, TaskTime};
use crate::dio::{DigitalIo, DigitalIoDevice};
use crate::drive::{Drive, DriveDevice};
use crate::lifecycle::{Lifecycle, LifecycleError, LifecycleEvent, LifecyclePhase, traverse};
use crate::params::{BindingRegistry, BindingScope, Direction, Param};
use crate::poll::{SdoPollTimer, SdoReadTrigger};
use crate::pool::{DevicePool, PoolError};
use crate::transport::{Publisher, Subscriber, TransportContext};

// Failure masks hold one bit per device.
const_assert!(MAX_DRIVES <= 64);
const_assert!(MAX_IOS <= 64);

/// Error types for control-loop operations.
#[derive(Debug, Error)]
pub enum ControlLoopError {
    #[error("invalid control loop configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("iterate called in {0:?}")]
    NotOperating(LifecyclePhase),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Drives that received a new command this cycle.
    pub drive_commands_applied: usize,
    /// I/O modules that received new outputs this cycle.
    pub io_commands_applied: usize,
    /// Bit `i` set if drive `i` failed to update.
    pub failed_drives: u64,
    /// Bit `i` set if I/O module `i` failed to update.
    pub failed_ios: u64,
    /// Bulk SDO read requested this cycle.
    pub read_sdo: bool,
}

impl CycleReport {
    #[inline]
    pub const fn all_ok(&self) -> bool {
        self.failed_drives == 0 && self.failed_ios == 0
    }

    #[inline]
    pub const fn drive_failed(&self, index: usize) -> bool {
        index < 64 && self.failed_drives & (1 << index) != 0
    }

    #[inline]
    pub const fn io_failed(&self, index: usize) -> bool {
        index < 64 && self.failed_ios & (1 << index) != 0
    }
}

/// Subscriptions and publications of the I/O pool, present only if M > 0.
struct IoChannels {
    commands: Box<dyn Subscriber<IoCommandBatch>>,
    feedback: Box<dyn Publisher<IoFeedbackBatch>>,
}

/// The orchestrator.
pub struct ControlLoop<D, I> {
    scope: BindingScope,
    lifecycle: Lifecycle,
    cycle_us: u64,
    drives: DevicePool<D>,
    ios: DevicePool<I>,

    controlword: Param<u16>,
    opmode: Param<i8>,
    statusword: Param<u16>,
    read_sdo: Param<bool>,
    read_sdo_update_sec: Param<f64>,

    poll: SdoPollTimer,
    trigger: SdoReadTrigger,

    drive_commands: Box<dyn Subscriber<DriveCommandBatch>>,
    drive_feedback_pub: Box<dyn Publisher<DriveFeedbackBatch>>,
    io_channels: Option<IoChannels>,

    drive_feedback: DriveFeedbackBatch,
    io_feedback: IoFeedbackBatch,
    failed_drives: u64,
    failed_ios: u64,
}

impl ControlLoop<Drive, DigitalIo> {
    /// Control loop over binding-backed [`Drive`] and [`DigitalIo`] units.
    pub fn standard(
        config: &ControlLoopConfig,
        registry: Arc<dyn BindingRegistry>,
        transport: &mut dyn TransportContext,
    ) -> Result<Self, ControlLoopError> {
        Self::new(config, registry, transport, Drive::new, DigitalIo::new)
    }
}

impl<D: DriveDevice, I: DigitalIoDevice> ControlLoop<D, I> {
    /// Allocate pools sized exactly to the configured counts and open the
    /// command/feedback channels. I/O channels are opened only if M > 0.
    ///
    /// Device `i` is created with the binding scope `root/axis<i+1>`
    /// (drives) or `root/device<i+1>` (I/O modules).
    pub fn new(
        config: &ControlLoopConfig,
        registry: Arc<dyn BindingRegistry>,
        transport: &mut dyn TransportContext,
        mut make_drive: impl FnMut(DeviceContext) -> D,
        mut make_io: impl FnMut(DeviceContext) -> I,
    ) -> Result<Self, ControlLoopError> {
        config.validate()?;

        let scope = BindingScope::root(registry, ROOT_MODULE);
        let context = |kind, index| {
            let handle = DeviceHandle::new(kind, index);
            DeviceContext {
                handle,
                scope: scope.child(&handle.module_name()),
            }
        };
        let drives = DevicePool::from_fn(config.drives, |i| make_drive(context(DeviceKind::Drive, i)));
        let ios = DevicePool::from_fn(config.ios, |i| make_io(context(DeviceKind::DigitalIo, i)));

        let drive_commands = transport.subscribe_drive_commands(TOPIC_DRIVE_CONTROL);
        let io_commands = (config.ios > 0).then(|| transport.subscribe_io_commands(TOPIC_DIGITAL_OUTPUTS));
        let drive_feedback_pub = transport.advertise_drive_feedback(TOPIC_DRIVE_FEEDBACK);
        let io_channels = io_commands.map(|commands| IoChannels {
            commands,
            feedback: transport.advertise_io_feedback(TOPIC_DIGITAL_INPUTS),
        });

        info!(
            "control loop created: {} drives, {} I/O modules, cycle {} us",
            config.drives, config.ios, config.cycle_time_us
        );

        Ok(Self {
            scope,
            lifecycle: Lifecycle::new(),
            cycle_us: config.cycle_time_us,
            drives,
            ios,
            controlword: Param::array(config.drives, 0),
            opmode: Param::array(config.drives, 0),
            statusword: Param::array(config.drives, 0),
            read_sdo: Param::scalar(false),
            read_sdo_update_sec: Param::scalar(config.read_sdo_update_sec),
            poll: SdoPollTimer::new(config.cycle_time_us),
            trigger: SdoReadTrigger::new(),
            drive_commands,
            drive_feedback_pub,
            io_channels,
            drive_feedback: DriveFeedbackBatch::new(),
            io_feedback: IoFeedbackBatch::new(),
            failed_drives: 0,
            failed_ios: 0,
        })
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Register the loop's own bindings, then every device's, in pool order.
    ///
    /// Fail-fast: the first failing device aborts the phase and the loop
    /// ends in `Failed`.
    pub fn init_phase1(&mut self) -> Result<(), ControlLoopError> {
        self.run_phase(LifecycleEvent::InitPhase1, |this| {
            this.register_bindings()?;
            traverse(&mut this.drives, DeviceKind::Drive, LifecycleEvent::InitPhase1, |d| {
                d.init_phase1()
            })?;
            traverse(&mut this.ios, DeviceKind::DigitalIo, LifecycleEvent::InitPhase1, |d| {
                d.init_phase1()
            })
        })
    }

    pub fn init_phase2(&mut self) -> Result<(), ControlLoopError> {
        self.run_phase(LifecycleEvent::InitPhase2, |this| {
            traverse(&mut this.drives, DeviceKind::Drive, LifecycleEvent::InitPhase2, |d| {
                d.init_phase2()
            })?;
            traverse(&mut this.ios, DeviceKind::DigitalIo, LifecycleEvent::InitPhase2, |d| {
                d.init_phase2()
            })
        })
    }

    pub fn start(&mut self) -> Result<(), ControlLoopError> {
        self.run_phase(LifecycleEvent::Start, |this| {
            traverse(&mut this.drives, DeviceKind::Drive, LifecycleEvent::Start, |d| d.start())?;
            traverse(&mut this.ios, DeviceKind::DigitalIo, LifecycleEvent::Start, |d| d.start())?;
            this.poll.reset();
            this.failed_drives = 0;
            this.failed_ios = 0;
            Ok(())
        })
    }

    /// Leave cyclic operation. The loop is `Stopped` afterwards even if a
    /// device fails to stop; that failure is still reported.
    pub fn stop(&mut self) -> Result<(), ControlLoopError> {
        self.run_phase(LifecycleEvent::Stop, |this| {
            traverse(&mut this.drives, DeviceKind::Drive, LifecycleEvent::Stop, |d| d.stop())?;
            traverse(&mut this.ios, DeviceKind::DigitalIo, LifecycleEvent::Stop, |d| d.stop())
        })
    }

    fn run_phase(
        &mut self,
        event: LifecycleEvent,
        step: impl FnOnce(&mut Self) -> Result<(), LifecycleError>,
    ) -> Result<(), ControlLoopError> {
        self.lifecycle.begin(event)?;
        let outcome = step(self);
        self.lifecycle.finish(event, outcome)?;
        info!("control loop {:?}", self.lifecycle.phase());
        Ok(())
    }

    fn register_bindings(&self) -> Result<(), LifecycleError> {
        let s = &self.scope;
        s.register("controlword", Direction::Output, &self.controlword)?;
        s.register("opmode", Direction::Output, &self.opmode)?;
        s.register("statusword", Direction::Input, &self.statusword)?;
        s.register("read_sdo", Direction::Output, &self.read_sdo)?;
        s.register("read_sdo_update_sec", Direction::Tunable, &self.read_sdo_update_sec)?;
        debug!("control loop bindings registered under {}", s.path());
        Ok(())
    }

    // ─── Cycle ──────────────────────────────────────────────────────

    /// Run one cycle. Only allowed while `Operating`.
    ///
    /// A device failing to update is flagged in the report; the cycle
    /// continues for the others and the device still contributes its
    /// feedback record.
    pub fn iterate(&mut self, time: TaskTime) -> Result<CycleReport, ControlLoopError> {
        if !self.lifecycle.is_operating() {
            return Err(ControlLoopError::NotOperating(self.lifecycle.phase()));
        }

        let mut report = CycleReport {
            cycle: time.cycle,
            ..Default::default()
        };

        report.read_sdo = self.poll.tick(self.read_sdo_update_sec.value());
        self.read_sdo.store(report.read_sdo);
        if report.read_sdo {
            self.trigger.fire();
        }

        if let Some(batch) = self.drive_commands.receive_latest() {
            for (drive, command) in self.drives.iter_mut().zip(batch.iter()) {
                drive.set_drive_command(command);
                report.drive_commands_applied += 1;
            }
        }

        if let Some(io) = self.io_channels.as_mut() {
            if let Some(batch) = io.commands.receive_latest() {
                for (module, command) in self.ios.iter_mut().zip(batch.iter()) {
                    module.set_digital_outputs(command);
                    report.io_commands_applied += 1;
                }
            }
        }

        self.drive_feedback.clear();
        for (i, drive) in self.drives.iter_mut().enumerate() {
            if let Err(e) = drive.iterate(time) {
                report.failed_drives |= 1 << i;
                if self.failed_drives & (1 << i) == 0 {
                    warn!("{} failed in cycle {}: {e}", drive.name(), time.cycle);
                }
            }
            self.controlword.set(i, drive.control_word());
            self.opmode.set(i, drive.op_mode());
            drive.set_status_word(self.statusword.get(i));
            // Capacity equals MAX_DRIVES, checked by config validation.
            let _ = self.drive_feedback.push(drive.drive_feedback());
        }
        self.failed_drives = report.failed_drives;
        self.drive_feedback_pub.publish(&self.drive_feedback);

        if let Some(io) = self.io_channels.as_mut() {
            self.io_feedback.clear();
            for (i, module) in self.ios.iter_mut().enumerate() {
                if let Err(e) = module.iterate(time) {
                    report.failed_ios |= 1 << i;
                    if self.failed_ios & (1 << i) == 0 {
                        warn!("{} failed in cycle {}: {e}", module.name(), time.cycle);
                    }
                }
                let _ = self.io_feedback.push(module.dio_feedback());
            }
            self.failed_ios = report.failed_ios;
            io.feedback.publish(&self.io_feedback);
        }

        Ok(report)
    }

    // ─── Accessors ──────────────────────────────────────────────────

    #[inline]
    pub fn phase(&self) -> LifecyclePhase {
        self.lifecycle.phase()
    }

    #[inline]
    pub fn drive_count(&self) -> usize {
        self.drives.len()
    }

    #[inline]
    pub fn io_count(&self) -> usize {
        self.ios.len()
    }

    pub fn drive(&self, index: usize) -> Result<&D, PoolError> {
        self.drives.at(index)
    }

    pub fn drive_mut(&mut self, index: usize) -> Result<&mut D, PoolError> {
        self.drives.at_mut(index)
    }

    pub fn io(&self, index: usize) -> Result<&I, PoolError> {
        self.ios.at(index)
    }

    pub fn io_mut(&mut self, index: usize) -> Result<&mut I, PoolError> {
        self.ios.at_mut(index)
    }

    pub fn drives(&self) -> &DevicePool<D> {
        &self.drives
    }

    pub fn ios(&self) -> &DevicePool<I> {
        &self.ios
    }

    #[inline]
    pub fn cycle_period(&self) -> Duration {
        Duration::from_micros(self.cycle_us)
    }

    /// Value of the `read_sdo` binding after the last cycle.
    #[inline]
    pub fn read_sdo(&self) -> bool {
        self.read_sdo.value()
    }

    #[inline]
    pub fn read_sdo_update_sec(&self) -> f64 {
        self.read_sdo_update_sec.value()
    }

    /// Change the bulk-read interval; takes effect on the next cycle.
    pub fn set_read_sdo_update_sec(&self, seconds: f64) {
        self.read_sdo_update_sec.store(seconds);
    }

    /// Trigger handed to the SDO service lane.
    pub fn sdo_read_trigger(&self) -> SdoReadTrigger {
        self.trigger.clone()
    }

    /// Whether the I/O command/feedback channels were opened.
    pub fn has_io_channels(&self) -> bool {
        self.io_channels.is_some()
    }
}

impl<D, I> core::fmt::Debug for ControlLoop<D, I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControlLoop")
            .field("phase", &self.lifecycle.phase())
            .field("drives", &self.drives.len())
            .field("ios", &self.ios.len())
            .field("cycle_us", &self.cycle_us)
            .finish()
    }
}
