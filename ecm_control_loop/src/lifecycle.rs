//! Lifecycle state machine shared by the control loop and its devices.
//!
//! Strictly linear: Created → Phase1Initialized → Phase2Initialized →
//! Operating → Stopped. A failure before `Operating` lands in the terminal
//! `Failed` phase.

use thiserror::Error;
use tracing::warn;

use crate::device::{DeviceError, DeviceHandle, DeviceKind};
use crate::params::BindingError;
use crate::pool::DevicePool;

/// Lifecycle phase of the control loop (and implicitly of every pooled device).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    Created,
    Phase1Initialized,
    Phase2Initialized,
    Operating,
    Stopped,
    /// Terminal; never reached `Operating`.
    Failed,
}

/// Event that can trigger a phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    InitPhase1,
    InitPhase2,
    Start,
    Stop,
    /// A phase failed before `Operating` was reached.
    Fault,
}

/// Result of a transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition succeeded, new phase.
    Ok(LifecyclePhase),
    /// Transition rejected, reason.
    Rejected(&'static str),
}

/// Errors reported by lifecycle phases.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("{event:?} rejected in {phase:?}: {reason}")]
    InvalidTransition {
        phase: LifecyclePhase,
        event: LifecycleEvent,
        reason: &'static str,
    },

    #[error("{device} failed during {event:?}: {source}")]
    DeviceFailed {
        device: DeviceHandle,
        event: LifecycleEvent,
        #[source]
        source: DeviceError,
    },

    #[error("binding registration failed: {0}")]
    Binding(#[from] BindingError),
}

/// Phase holder.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    phase: LifecyclePhase,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            phase: LifecyclePhase::Created,
        }
    }

    #[inline]
    pub const fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    #[inline]
    pub const fn is_operating(&self) -> bool {
        matches!(self.phase, LifecyclePhase::Operating)
    }

    /// Phase reached from `phase` on `event`, without applying it.
    pub const fn next(phase: LifecyclePhase, event: LifecycleEvent) -> TransitionResult {
        use LifecycleEvent::*;
        use LifecyclePhase::*;

        let next = match (phase, event) {
            (Created, InitPhase1) => Phase1Initialized,
            (Phase1Initialized, InitPhase2) => Phase2Initialized,
            (Phase2Initialized, Start) => Operating,
            (Operating, Stop) => Stopped,

            (Created | Phase1Initialized | Phase2Initialized, Fault) => Failed,

            _ => return TransitionResult::Rejected(invalid_transition_reason(phase, event)),
        };
        TransitionResult::Ok(next)
    }

    /// Attempt a transition and apply it on success.
    pub fn handle_event(&mut self, event: LifecycleEvent) -> TransitionResult {
        let result = Self::next(self.phase, event);
        if let TransitionResult::Ok(next) = result {
            self.phase = next;
        }
        result
    }

    /// Check that `event` is allowed now, without applying it.
    pub fn begin(&self, event: LifecycleEvent) -> Result<LifecyclePhase, LifecycleError> {
        match Self::next(self.phase, event) {
            TransitionResult::Ok(next) => Ok(next),
            TransitionResult::Rejected(reason) => Err(LifecycleError::InvalidTransition {
                phase: self.phase,
                event,
                reason,
            }),
        }
    }

    /// Record the outcome of a phase started with [`begin`](Self::begin).
    ///
    /// Success applies `event`. Failure before `Operating` moves to `Failed`;
    /// a failed `Stop` still leaves the loop stopped.
    pub fn finish<T>(
        &mut self,
        event: LifecycleEvent,
        outcome: Result<T, LifecycleError>,
    ) -> Result<T, LifecycleError> {
        let applied = match (&outcome, event) {
            (Ok(_), _) | (Err(_), LifecycleEvent::Stop) => event,
            (Err(_), _) => LifecycleEvent::Fault,
        };
        self.handle_event(applied);
        outcome
    }

    /// Device-side transition: apply `event` or report the rejection.
    pub fn advance(&mut self, event: LifecycleEvent) -> Result<LifecyclePhase, DeviceError> {
        match self.handle_event(event) {
            TransitionResult::Ok(next) => Ok(next),
            TransitionResult::Rejected(reason) => Err(DeviceError::InvalidState(reason)),
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

const fn invalid_transition_reason(phase: LifecyclePhase, event: LifecycleEvent) -> &'static str {
    use LifecycleEvent::*;
    use LifecyclePhase::*;
    match (phase, event) {
        (Failed, _) => "Failed: terminal phase",
        (Stopped, _) => "Stopped: terminal phase",
        (Operating, Fault) => "Operating: failures are reported by stop",
        (Created, _) => "Created: only InitPhase1 allowed",
        (Phase1Initialized, _) => "Phase1Initialized: only InitPhase2 allowed",
        (Phase2Initialized, _) => "Phase2Initialized: only Start allowed",
        (Operating, _) => "Operating: only Stop allowed",
    }
}

/// Run one lifecycle step over `pool` in order, fail-fast.
///
/// The first failing device aborts the traversal; devices after it are
/// not visited.
pub fn traverse<D>(
    pool: &mut DevicePool<D>,
    kind: DeviceKind,
    event: LifecycleEvent,
    mut step: impl FnMut(&mut D) -> Result<(), DeviceError>,
) -> Result<(), LifecycleError> {
    pool.try_for_each(|_, device| step(device))
        .map_err(|(index, source)| {
            let device = DeviceHandle::new(kind, index);
            warn!("{device} failed during {event:?}: {source}");
            LifecycleError::DeviceFailed {
                device,
                event,
                source,
            }
        })
}

// ─── Tests ──────────────────────────────────────────────────────────
