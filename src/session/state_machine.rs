//! Programming session state machine.
//!
//! Every state performs one step of the session against the module and fires
//! the event leading to the next state. Any failing step fires a
//! [`FailedEvent`] which takes the machine to the `Error` state, from where
//! the session ends with the error.
//!
//! ```text
//!  Disconnected ──> Connected ──> InfoRead ──> ConfigReady ──────────┐
//!                                                 │   │     nothing  │
//!                                         program │   │ config only  │
//!                                                 v   │   to write   │
//!                                      ProgramWritten │              │
//!                                                 │   │              │
//!                                                 v   v              │
//!                                          ConfigWritten             │
//!                                                 │                  │
//!                                                 v                  │
//!                                           SelfTested               │
//!                                                 │                  │
//!                                                 v     no lock      v
//!                                             Verified ───────────> Done
//!                                                 │                  ^
//!                                            lock v                  │
//!                                              Locked ───────────────┘
//!
//!  any state ──(failure)──> Error ──> Done
//! ```
//!
//! Once `Done` is reached the link is torn down: program-enable released,
//! reset low, link closed, then a reset pulse lets the module start its
//! application. Teardown also runs if the machine is dropped on its way, and
//! never more than once.

use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;

use log::{info, warn};

use super::events::*;
use super::states::*;
use super::{SessionReport, SessionRequest};
use crate::config::BackupStore;
use crate::error::{LinkError, SessionError};
use crate::link::Link;
use crate::protocol::{FlashAccess, TransferObserver, Transport};
use crate::settings::Settings;

// =============================================================================
// Public Interface
// =============================================================================

/// A programming session factory. Configure the optional observer and
/// cancellation flag, then [`run`](Session::run) it against a link.
pub struct Session<'a> {
    settings: &'a Settings,
    observer: Option<&'a dyn TransferObserver>,
    cancel: Option<&'a AtomicBool>,
}
impl<'a> Session<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Session {
            settings,
            observer: None,
            cancel: None,
        }
    }

    /// Report the progress of every bulk transfer to `observer`.
    pub fn observer(mut self, observer: &'a dyn TransferObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Abort the session at the next transfer chunk once `cancel` is set.
    pub fn cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run the session event loop until the `Done` state is reached. The
    /// link is torn down before returning, whatever the outcome.
    pub fn run(
        &self,
        link: &'a mut dyn Link,
        request: &'a SessionRequest,
    ) -> Result<SessionReport, SessionError> {
        let transport = Transport::new(link, self.settings)
            .with_observer(self.observer)
            .with_cancel(self.cancel);
        let ctx = SessionContext {
            flash: FlashAccess::new(transport),
            store: BackupStore::from_settings(self.settings),
            request,
            reset_pulse: self.settings.reset_pulse,
            torn_down: false,
        };
        SessionMachine {
            ctx,
            // The machine naturally starts in the `Disconnected` state.
            sm: SessionStates::Disconnected(SessionSM {
                state: DisconnectedState {},
            }),
        }
        .run()
    }
}

/// Run one programming session over `link` with neither progress reporting
/// nor cancellation.
pub fn run_session<'a>(
    link: &'a mut dyn Link,
    settings: &'a Settings,
    request: &'a SessionRequest,
) -> Result<SessionReport, SessionError> {
    Session::new(settings).run(link, request)
}

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Data shared by all states: the single link to the module, wrapped in the
/// flash access layer, and the inputs of the session.
pub(crate) struct SessionContext<'a> {
    pub flash: FlashAccess<'a>,
    pub store: BackupStore,
    pub request: &'a SessionRequest,
    pub reset_pulse: Duration,
    torn_down: bool,
}
impl SessionContext<'_> {
    /// Return the module to normal run mode. Only the first call has an
    /// effect. Link failures are logged and do not stop the sequence.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        info!("=> Teardown");

        let pulse = self.reset_pulse;
        let link = self.flash.link();
        log_failure(link.set_program_enable(false));
        log_failure(link.set_reset(false));
        if link.is_open() {
            log_failure(link.close());
        }
        thread::sleep(pulse);
        log_failure(link.set_reset(true));
        thread::sleep(pulse);
        log_failure(link.set_reset(false));
    }
}
impl Drop for SessionContext<'_> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn log_failure(result: Result<(), LinkError>) {
    if let Err(e) = result {
        warn!("teardown: {}", e);
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// Owns the context for the whole session and the current state.
struct SessionMachine<'a> {
    ctx: SessionContext<'a>,
    sm: SessionStates,
}
impl SessionMachine<'_> {
    fn run(mut self) -> Result<SessionReport, SessionError> {
        loop {
            self.sm = self.sm.step(&mut self.ctx);
            if let SessionStates::Done(sm) = &mut self.sm {
                let outcome = sm.state.outcome.take();
                self.ctx.teardown();
                return match outcome {
                    Some(outcome) => outcome,
                    None => unreachable!("done state without outcome"),
                };
            }
        }
    }
}

/// The raw state machine, holding the current state.
#[derive(Debug)]
struct SessionSM<S: Runnable> {
    state: S,
}
impl<S: Runnable> SessionSM<S> {
    fn run(&mut self, ctx: &mut SessionContext<'_>) -> Event {
        self.state.run(ctx)
    }
}

/// An enum wrapper around the states of the session state machine.
enum SessionStates {
    Disconnected(SessionSM<DisconnectedState>),
    Connected(SessionSM<ConnectedState>),
    InfoRead(SessionSM<InfoReadState>),
    ConfigReady(SessionSM<ConfigReadyState>),
    ProgramWritten(SessionSM<ProgramWrittenState>),
    ConfigWritten(SessionSM<ConfigWrittenState>),
    SelfTested(SessionSM<SelfTestedState>),
    Verified(SessionSM<VerifiedState>),
    Locked(SessionSM<LockedState>),
    Error(SessionSM<ErrorState>),
    Done(SessionSM<DoneState>),
}
impl SessionStates {
    /// The unit of work in the event loop: run the current state and pick
    /// the transition matching the event it fired. Events not listed for a
    /// state are a bug.
    fn step(&mut self, ctx: &mut SessionContext<'_>) -> Self {
        match self {
            SessionStates::Disconnected(sm) => match sm.run(ctx) {
                Event::Connected(ev) => SessionStates::Connected(ev.into()),
                Event::Failed(ev) => SessionStates::Error(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
            },
            SessionStates::Connected(sm) => match sm.run(ctx) {
                Event::InfoRead(ev) => SessionStates::InfoRead(ev.into()),
                Event::Failed(ev) => SessionStates::Error(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
            },
            SessionStates::InfoRead(sm) => match sm.run(ctx) {
                Event::ConfigReady(ev) => SessionStates::ConfigReady(ev.into()),
                Event::Failed(ev) => SessionStates::Error(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
            },
            SessionStates::ConfigReady(sm) => match sm.run(ctx) {
                Event::ProgramWritten(ev) => SessionStates::ProgramWritten(ev.into()),
                Event::ConfigWritten(ev) => SessionStates::ConfigWritten(ev.into()),
                Event::Done(ev) => SessionStates::Done(ev.into()),
                Event::Failed(ev) => SessionStates::Error(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
            },
            SessionStates::ProgramWritten(sm) => match sm.run(ctx) {
                Event::ConfigWritten(ev) => SessionStates::ConfigWritten(ev.into()),
                Event::Failed(ev) => SessionStates::Error(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
            },
            SessionStates::ConfigWritten(sm) => match sm.run(ctx) {
                Event::SelfTested(ev) => SessionStates::SelfTested(ev.into()),
                Event::Failed(ev) => SessionStates::Error(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
            },
            SessionStates::SelfTested(sm) => match sm.run(ctx) {
                Event::Verified(ev) => SessionStates::Verified(ev.into()),
                Event::Failed(ev) => SessionStates::Error(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
            },
            SessionStates::Verified(sm) => match sm.run(ctx) {
                Event::Locked(ev) => SessionStates::Locked(ev.into()),
                Event::Done(ev) => SessionStates::Done(ev.into()),
                Event::Failed(ev) => SessionStates::Error(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
            },
            SessionStates::Locked(sm) => match sm.run(ctx) {
                Event::Done(ev) => SessionStates::Done(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
            },
            SessionStates::Error(sm) => match sm.run(ctx) {
                Event::Done(ev) => SessionStates::Done(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
            },
            SessionStates::Done(sm) => unreachable!("stepping past {:#?}", sm),
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl From<ConnectedEvent> for SessionSM<ConnectedState> {
    fn from(event: ConnectedEvent) -> SessionSM<ConnectedState> {
        SessionSM {
            state: ConnectedState {
                version: event.version,
            },
        }
    }
}

impl From<InfoReadEvent> for SessionSM<InfoReadState> {
    fn from(event: InfoReadEvent) -> SessionSM<InfoReadState> {
        SessionSM {
            state: InfoReadState {
                version: event.version,
                info: event.info,
            },
        }
    }
}

/// States after `ConfigReady` only carry the job along.
macro_rules! job_transition {
    ($($state:ident),+ $(,)?) => {
        $(
            impl From<JobEvent> for SessionSM<$state> {
                fn from(event: JobEvent) -> SessionSM<$state> {
                    SessionSM {
                        state: $state {
                            job: Some(event.job),
                        },
                    }
                }
            }
        )+
    };
}
job_transition!(
    ConfigReadyState,
    ProgramWrittenState,
    ConfigWrittenState,
    SelfTestedState,
    VerifiedState,
    LockedState,
);

impl From<FailedEvent> for SessionSM<ErrorState> {
    fn from(event: FailedEvent) -> SessionSM<ErrorState> {
        SessionSM {
            state: ErrorState {
                error: Some(event.error),
            },
        }
    }
}

impl From<DoneEvent> for SessionSM<DoneState> {
    fn from(event: DoneEvent) -> SessionSM<DoneState> {
        SessionSM {
            state: DoneState {
                outcome: Some(event.outcome),
            },
        }
    }
}
