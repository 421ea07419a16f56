//! Motor drive unit.
//!
//! A `Drive` exposes its process image as bindings under `root/axis<N>`:
//! feedback fields are `Input` (written by the bus link), setpoints are
//! `Output`. The control loop owns the drive by value and talks to it
//! through [`DriveDevice`].

use ecm_common::cia402;
use ecm_common::consts::{DRIVE_ANALOG_INPUTS, DRIVE_DIGITAL_INPUTS};
use ecm_common::messages::{DriveCommand, DriveFeedback};
use tracing::debug;

use crate::device::{Device, DeviceContext, DeviceError, DeviceHandle, TaskTime};
use crate::lifecycle::{Lifecycle, LifecycleEvent, LifecyclePhase};
use crate::params::{BindingScope, Direction, Param};

/// Cyclic interface of a drive, on top of its lifecycle.
pub trait DriveDevice: Device {
    /// Latch the command received for this drive.
    fn set_drive_command(&mut self, command: &DriveCommand);

    /// Last latched command.
    fn drive_command(&self) -> DriveCommand;

    #[inline]
    fn control_word(&self) -> u16 {
        self.drive_command().control_word
    }

    #[inline]
    fn op_mode(&self) -> i8 {
        self.drive_command().op_mode
    }

    /// Push the status word read from the bus.
    fn set_status_word(&mut self, status_word: u16);

    /// Current feedback snapshot.
    fn drive_feedback(&self) -> DriveFeedback;
}

/// Drive backed by parameter bindings.
#[derive(Debug)]
pub struct Drive {
    handle: DeviceHandle,
    name: String,
    scope: BindingScope,
    lifecycle: Lifecycle,
    command: DriveCommand,
    last_time: TaskTime,
    cycles: u64,

    // Inputs
    status_word: Param<u16>,
    drive_enabled: Param<bool>,
    error_code: Param<u16>,
    slave_timestamp: Param<u32>,
    position_value: Param<i32>,
    velocity_value: Param<i32>,
    torque_value: Param<i32>,
    secondary_position_value: Param<i32>,
    secondary_velocity_value: Param<i32>,
    analog_inputs: [Param<f64>; DRIVE_ANALOG_INPUTS],
    digital_inputs: [Param<bool>; DRIVE_DIGITAL_INPUTS],

    // Outputs
    target_position: Param<i32>,
    target_velocity: Param<i32>,
    target_torque: Param<i32>,
}

impl Drive {
    pub fn new(ctx: DeviceContext) -> Self {
        Self {
            name: ctx.handle.module_name(),
            handle: ctx.handle,
            scope: ctx.scope,
            lifecycle: Lifecycle::new(),
            command: DriveCommand::default(),
            last_time: TaskTime::default(),
            cycles: 0,
            status_word: Param::scalar(0),
            drive_enabled: Param::scalar(false),
            error_code: Param::scalar(0),
            slave_timestamp: Param::scalar(0),
            position_value: Param::scalar(0),
            velocity_value: Param::scalar(0),
            torque_value: Param::scalar(0),
            secondary_position_value: Param::scalar(0),
            secondary_velocity_value: Param::scalar(0),
            analog_inputs: core::array::from_fn(|_| Param::scalar(0.0)),
            digital_inputs: core::array::from_fn(|_| Param::scalar(false)),
            target_position: Param::scalar(0),
            target_velocity: Param::scalar(0),
            target_torque: Param::scalar(0),
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

    /// System time of the last `iterate`.
    #[inline]
    pub fn last_time(&self) -> TaskTime {
        self.last_time
    }

    /// Cycles run since `start`.
    #[inline]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn register_bindings(&self) -> Result<(), DeviceError> {
        use Direction::{Input, Output};
        let s = &self.scope;

        s.register("statusword", Input, &self.status_word)?;
        s.register("driveEnabled", Input, &self.drive_enabled)?;
        s.register("driveErrorCode", Input, &self.error_code)?;
        s.register("slaveTimestamp", Input, &self.slave_timestamp)?;
        s.register("positionValue", Input, &self.position_value)?;
        s.register("velocityValue", Input, &self.velocity_value)?;
        s.register("torqueValue", Input, &self.torque_value)?;
        s.register("secondaryPositionValue", Input, &self.secondary_position_value)?;
        s.register("secondaryVelocityValue", Input, &self.secondary_velocity_value)?;
        for (i, p) in self.analog_inputs.iter().enumerate() {
            s.register(&format!("analogInput{}", i + 1), Input, p)?;
        }
        for (i, p) in self.digital_inputs.iter().enumerate() {
            s.register(&format!("digitalInput{}", i + 1), Input, p)?;
        }

        s.register("targetPosition", Output, &self.target_position)?;
        s.register("targetVelocity", Output, &self.target_velocity)?;
        s.register("targetTorque", Output, &self.target_torque)?;
        Ok(())
    }
}

impl Device for Drive {
    fn name(&self) -> &str {
        &self.name
    }

    fn init_phase1(&mut self) -> Result<(), DeviceError> {
        if self.lifecycle.phase() != LifecyclePhase::Created {
            return Err(DeviceError::InvalidState("Created: only InitPhase1 allowed"));
        }
        self.register_bindings()?;
        self.lifecycle.advance(LifecycleEvent::InitPhase1)?;
        debug!("{} bindings registered under {}", self.name, self.scope.path());
        Ok(())
    }

    fn init_phase2(&mut self) -> Result<(), DeviceError> {
        self.lifecycle.advance(LifecycleEvent::InitPhase2)?;
        Ok(())
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.lifecycle.advance(LifecycleEvent::Start)?;
        self.cycles = 0;
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
        self.cycles += 1;
        Ok(())
    }
}

impl DriveDevice for Drive {
    fn set_drive_command(&mut self, command: &DriveCommand) {
        self.command = *command;
        self.target_position.store(command.setpoint.target_position);
        self.target_velocity.store(command.setpoint.target_velocity);
        self.target_torque.store(command.setpoint.target_torque);
    }

    #[inline]
    fn drive_command(&self) -> DriveCommand {
        self.command
    }

    fn set_status_word(&mut self, status_word: u16) {
        self.status_word.store(status_word);
        self.drive_enabled.store(cia402::drive_enabled(status_word));
    }

    fn drive_feedback(&self) -> DriveFeedback {
        DriveFeedback {
            status_word: self.status_word.value(),
            drive_enabled: self.drive_enabled.value(),
            error_code: self.error_code.value(),
            slave_timestamp: self.slave_timestamp.value(),
            position_value: self.position_value.value(),
            velocity_value: self.velocity_value.value(),
            torque_value: self.torque_value.value(),
            secondary_position_value: self.secondary_position_value.value(),
            secondary_velocity_value: self.secondary_velocity_value.value(),
            analog_inputs: core::array::from_fn(|i| self.analog_inputs[i].value()),
            digital_inputs: core::array::from_fn(|i| self.digital_inputs[i].value()),
        }
    }
}
