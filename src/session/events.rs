//! Events for the programming session state machine.
//!
//! This module is private and restricted to the [`session`](crate::session)
//! scope. The public interface of the session state machine is provided by
//! [`session`](crate::session).
//!
//! ```ignore
//! use super::events::*;
//! ```
//!
//! Refer to the [`state_machine`](super::state_machine) module for an overview
//! of states, events and transitions.

use crate::error::SessionError;
use crate::image::{ConfigImage, ProgramImage};
use crate::protocol::{BootloaderVersion, ChipInfo};

use super::SessionReport;

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Everything learned and decided about the module once its configuration
/// is known. Handed from state to state until the session completes.
#[derive(Debug, Clone)]
pub(crate) struct Job {
    pub version: BootloaderVersion,
    pub info: ChipInfo,
    /// The configuration that is, or will be, on the module.
    pub config: ConfigImage,
    /// The program image, once it has been written.
    pub program: Option<ProgramImage>,
    pub locked: bool,
}
impl Job {
    pub fn into_report(self) -> SessionReport {
        SessionReport {
            version: self.version,
            info: self.info,
            config: self.config,
            program_written: self.program.is_some(),
            locked: self.locked,
        }
    }
}

// ConnectedEvent ==============================================================

/// Fired from the `Disconnected` state once the module is in programming mode
/// and its bootloader answered the version request.
#[derive(Debug)]
pub(crate) struct ConnectedEvent {
    pub version: BootloaderVersion,
}

// InfoReadEvent ===============================================================

/// Fired from the `Connected` state after the information page was decoded.
#[derive(Debug)]
pub(crate) struct InfoReadEvent {
    pub version: BootloaderVersion,
    pub info: ChipInfo,
}

// JobEvent ====================================================================

/// Fired after each step that acts on the module once the working
/// configuration is known:
///
///  1. `ConfigReady` from `InfoRead`,
///  2. `ProgramWritten` and `ConfigWritten` from `ConfigReady`,
///  3. `ConfigWritten` from `ProgramWritten`,
///  4. `SelfTested`, `Verified` and `Locked` from their predecessors.
#[derive(Debug)]
pub(crate) struct JobEvent {
    pub job: Job,
}

// FailedEvent =================================================================

/// Fired from any state when its step fails. Triggers the transition to the
/// `Error` state.
#[derive(Debug)]
pub(crate) struct FailedEvent {
    pub error: SessionError,
}

// DoneEvent ===================================================================

/// Fired when the session is over, successfully or not. Triggers the
/// transition to the `Done` state.
#[derive(Debug)]
pub(crate) struct DoneEvent {
    pub outcome: Result<SessionReport, SessionError>,
}

// Events enum ==================================================================

/// Events that can be triggered within the session state machine.
///
/// Each possible value holds an `event`, which in turn may hold additional data
/// for the state transition. Such data is passed by the origin state for
/// potential use by the target state.
#[derive(Debug)]
pub(crate) enum Event {
    Connected(ConnectedEvent),
    InfoRead(InfoReadEvent),
    ConfigReady(JobEvent),
    ProgramWritten(JobEvent),
    ConfigWritten(JobEvent),
    SelfTested(JobEvent),
    Verified(JobEvent),
    Locked(JobEvent),
    Failed(FailedEvent),
    Done(DoneEvent),
}
