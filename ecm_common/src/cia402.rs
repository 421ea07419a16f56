//! CiA 402 control word and status word flags.
//!
//! Only the bits the control loop inspects are named. The power state
//! machine state is decoded from the status word with the masks of
//! CiA 402 table 30.

use bitflags::bitflags;

bitflags! {
    /// Status word (0x6041) bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusWord: u16 {
        const READY_TO_SWITCH_ON    = 0x0001;
        const SWITCHED_ON           = 0x0002;
        const OPERATION_ENABLED     = 0x0004;
        const FAULT                 = 0x0008;
        const VOLTAGE_ENABLED       = 0x0010;
        const QUICK_STOP            = 0x0020;
        const SWITCH_ON_DISABLED    = 0x0040;
        const WARNING               = 0x0080;
        const REMOTE                = 0x0200;
        const TARGET_REACHED        = 0x0400;
        const INTERNAL_LIMIT_ACTIVE = 0x0800;
    }
}

bitflags! {
    /// Control word (0x6040) bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlWord: u16 {
        const SWITCH_ON        = 0x0001;
        const ENABLE_VOLTAGE   = 0x0002;
        const QUICK_STOP       = 0x0004;
        const ENABLE_OPERATION = 0x0008;
        const FAULT_RESET      = 0x0080;
        const HALT             = 0x0100;
    }
}

/// Power state machine state decoded from the status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveState {
    NotReadyToSwitchOn,
    SwitchOnDisabled,
    ReadyToSwitchOn,
    SwitchedOn,
    OperationEnabled,
    QuickStopActive,
    FaultReactionActive,
    Fault,
    /// Bit pattern matching no state.
    Unknown,
}

impl StatusWord {
    /// Decode the power state machine state.
    pub const fn state(self) -> DriveState {
        let raw = self.bits();
        if raw & 0x004F == 0x0000 {
            DriveState::NotReadyToSwitchOn
        } else if raw & 0x004F == 0x0040 {
            DriveState::SwitchOnDisabled
        } else if raw & 0x006F == 0x0021 {
            DriveState::ReadyToSwitchOn
        } else if raw & 0x006F == 0x0023 {
            DriveState::SwitchedOn
        } else if raw & 0x006F == 0x0027 {
            DriveState::OperationEnabled
        } else if raw & 0x006F == 0x0007 {
            DriveState::QuickStopActive
        } else if raw & 0x004F == 0x000F {
            DriveState::FaultReactionActive
        } else if raw & 0x004F == 0x0008 {
            DriveState::Fault
        } else {
            DriveState::Unknown
        }
    }

    /// True in the "operation enabled" state.
    #[inline]
    pub const fn is_operation_enabled(self) -> bool {
        matches!(self.state(), DriveState::OperationEnabled)
    }
}

/// Decode a raw status word, keeping unnamed bits.
#[inline]
pub const fn drive_enabled(status_word: u16) -> bool {
    StatusWord::from_bits_retain(status_word).is_operation_enabled()
}
