//! Digital I/O bank.

use ecm_common::consts::IO_CHANNELS;
use ecm_common::messages::{DigitalIoCommand, DigitalIoFeedback};

use crate::device::{Device, DeviceContext, DeviceError, DeviceHandle, TaskTime};
use crate::lifecycle::{Lifecycle, LifecycleEvent, LifecyclePhase};
use crate::params::{BindingScope, Direction, Param};

/// Cyclic interface of a digital I/O module.
pub trait DigitalIoDevice: Device {
    /// Latch the requested output states.
    fn set_digital_outputs(&mut self, command: &DigitalIoCommand);

    /// Currently requested output states.
    fn digital_outputs(&self) -> DigitalIoCommand;

    /// Current input and output states.
    fn dio_feedback(&self) -> DigitalIoFeedback;
}

/// I/O module with `IO_CHANNELS` inputs and outputs, bound as
/// `digitalInput<K>` (Input) and `digitalOutput<K>` (Output).
#[derive(Debug)]
pub struct DigitalIo {
    handle: DeviceHandle,
    name: String,
    scope: BindingScope,
    lifecycle: Lifecycle,
    last_time: TaskTime,
    inputs: [Param<bool>; IO_CHANNELS],
    outputs: [Param<bool>; IO_CHANNELS],
}

impl DigitalIo {
    pub fn new(ctx: DeviceContext) -> Self {
        Self {
            name: ctx.handle.module_name(),
            handle: ctx.handle,
            scope: ctx.scope,
            lifecycle: Lifecycle::new(),
            last_time: TaskTime::default(),
            inputs: core::array::from_fn(|_| Param::scalar(false)),
            outputs: core::array::from_fn(|_| Param::scalar(false)),
        }
    }

    #[inline]
    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    #[inline]
    pub fn phase(&self) -> LifecyclePhase {
        self.lifecycle.phase()
    }

    #[inline]
    pub fn last_time(&self) -> TaskTime {
        self.last_time
    }
}

impl Device for DigitalIo {
    fn name(&self) -> &str {
        &self.name
    }

    fn init_phase1(&mut self) -> Result<(), DeviceError> {
        if self.lifecycle.phase() != LifecyclePhase::Created {
            return Err(DeviceError::InvalidState("Created: only InitPhase1 allowed"));
        }
        for (i, p) in self.inputs.iter().enumerate() {
            self.scope
                .register(&format!("digitalInput{}", i + 1), Direction::Input, p)?;
        }
        for (i, p) in self.outputs.iter().enumerate() {
            self.scope
                .register(&format!("digitalOutput{}", i + 1), Direction::Output, p)?;
        }
        self.lifecycle.advance(LifecycleEvent::InitPhase1)?;
        Ok(())
    }

    fn init_phase2(&mut self) -> Result<(), DeviceError> {
        self.lifecycle.advance(LifecycleEvent::InitPhase2)?;
        Ok(())
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.lifecycle.advance(LifecycleEvent::Start)?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.lifecycle.advance(LifecycleEvent::Stop)?;
        Ok(())
    }

    fn iterate(&mut self, time: TaskTime) -> Result<(), DeviceError> {
        if !self.lifecycle.is_operating() {
            return Err(DeviceError::InvalidState("iterate outside Operating"));
        }
        self.last_time = time;
        Ok(())
    }
}

impl DigitalIoDevice for DigitalIo {
    fn set_digital_outputs(&mut self, command: &DigitalIoCommand) {
        for (p, on) in self.outputs.iter().zip(command.digital_outputs) {
            p.store(on);
        }
    }

    fn digital_outputs(&self) -> DigitalIoCommand {
        DigitalIoCommand {
            digital_outputs: core::array::from_fn(|i| self.outputs[i].value()),
        }
    }

    fn dio_feedback(&self) -> DigitalIoFeedback {
        DigitalIoFeedback {
            digital_inputs: core::array::from_fn(|i| self.inputs[i].value()),
            digital_outputs: core::array::from_fn(|i| self.outputs[i].value()),
        }
    }
}
