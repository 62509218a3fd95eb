//! States for the programming session state machine.
//!
//! This module is private and restricted to the [`session`](crate::session)
//! scope. The public interface of the session state machine is provided by
//! [`session`](crate::session).
//!
//! ```ignore
//! use super::states::*;
//! ```
//!
//! Refer to the [`state_machine`](super::state_machine) module for an overview
//! of states, events and transitions.

use std::thread;

use log::{error, info};

use super::events::*;
use super::state_machine::SessionContext;
use super::SessionReport;
use crate::config::{log_config, merge, obtain_config};
use crate::error::{ConnectError, Result, SessionError, Step};
use crate::image::{
    ConfigImage, ProgramImage, CODE_PROTECT_OFFSET, CODE_PROTECT_ON, CONFIG_PAGE,
};
use crate::protocol::flash::config_address;
use crate::protocol::{BootloaderVersion, ChipInfo};

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Trait adding the ability for a state to be `run` after a transition into it.
pub(crate) trait Runnable {
    /// A state implements this method so it can be `run` after the state
    /// machine transitions into it.
    ///
    /// During this call, the state does the work of its session step and
    /// when finished, requests a transition to a `new state` by returning the
    /// appropriate `event`. The `state` and the `event` are consumed to create
    /// the `new state` using the corresponding [`From`] trait implementation
    /// (provided such implementation exists).
    fn run(&mut self, ctx: &mut SessionContext<'_>) -> Event;
}

/// Turn the outcome of a step into the event leading to the next state, or
/// into a [`FailedEvent`] tagged with `step`.
fn fire<T>(step: Step, result: Result<T>, on_success: impl FnOnce(T) -> Event) -> Event {
    match result {
        Ok(value) => on_success(value),
        Err(error) => Event::Failed(FailedEvent {
            error: SessionError { step, error },
        }),
    }
}

/// Take the job out of a state. States are run exactly once, so the job is
/// always there.
fn take_job(job: &mut Option<Job>) -> Job {
    match job.take() {
        Some(job) => job,
        None => unreachable!("state ran twice"),
    }
}

// Disconnected State ==========================================================

/// The initial state. The link is closed and the module runs its application.
///
/// From the `DisconnectedState`, the state machine can evolve via:
///
///  * **[`ConnectedEvent`] => [`ConnectedState`]** once the module entered
///    programming mode and its bootloader answered with its version,
///  * **[`FailedEvent`] => [`ErrorState`]** otherwise.
#[derive(Debug)]
pub(crate) struct DisconnectedState {}
impl Runnable for DisconnectedState {
    fn run(&mut self, ctx: &mut SessionContext<'_>) -> Event {
        info!("=> Connect");
        fire(Step::Connect, connect(ctx), |version| {
            Event::Connected(ConnectedEvent { version })
        })
    }
}

/// Reset the module into its bootloader with program-enable asserted, then
/// check that it answers.
fn connect(ctx: &mut SessionContext<'_>) -> Result<BootloaderVersion> {
    let pulse = ctx.reset_pulse;
    let gate = ctx.flash.transport().gate();
    let link = ctx.flash.link();

    link.set_program_enable(true)?;
    link.set_reset(true)?;
    link.open()?;
    thread::sleep(pulse);
    link.set_reset(false)?;
    thread::sleep(pulse);

    if !gate.is_ready(link)? {
        return Err(ConnectError::ModuleNotDetected.into());
    }
    link.set_program_enable(false)?;

    let version = ctx.flash.read_sw_version()?;
    info!("bootloader version {}", version);
    Ok(version)
}

// Connected State =============================================================

/// The module is in programming mode.
///
///  * **[`InfoReadEvent`] => [`InfoReadState`]** after the information page
///    was read and decoded,
///  * **[`FailedEvent`] => [`ErrorState`]** otherwise.
#[derive(Debug)]
pub(crate) struct ConnectedState {
    pub version: BootloaderVersion,
}
impl Runnable for ConnectedState {
    fn run(&mut self, ctx: &mut SessionContext<'_>) -> Event {
        info!("=> Read info area");
        let version = self.version;
        fire(Step::ReadInfo, ctx.flash.read_info(), |info| {
            for line in info.to_string().lines() {
                info!("    {}", line);
            }
            Event::InfoRead(InfoReadEvent { version, info })
        })
    }
}

// InfoRead State ==============================================================

/// The module id is known, the working configuration can be assembled.
///
///  * **[`JobEvent`] => [`ConfigReadyState`]** with the working configuration,
///  * **[`FailedEvent`] => [`ErrorState`]** when neither the module nor the
///    backup store provide a configuration, or the override does not fit.
#[derive(Debug)]
pub(crate) struct InfoReadState {
    pub version: BootloaderVersion,
    pub info: ChipInfo,
}
impl Runnable for InfoReadState {
    fn run(&mut self, ctx: &mut SessionContext<'_>) -> Event {
        info!("=> Prepare config");
        let (version, info) = (self.version, self.info);
        fire(Step::PrepareConfig, prepare_config(ctx, &info), |config| {
            Event::ConfigReady(JobEvent {
                job: Job {
                    version,
                    info,
                    config,
                    program: None,
                    locked: false,
                },
            })
        })
    }
}

fn prepare_config(ctx: &mut SessionContext<'_>, info: &ChipInfo) -> Result<ConfigImage> {
    let config = obtain_config(
        &mut ctx.flash,
        &ctx.store,
        info,
        ctx.request.force_backup,
    )?;
    match &ctx.request.config_override {
        Some(overrides) => {
            let merged = merge(&config, overrides)?;
            log_config("merged config", &merged);
            Ok(merged)
        }
        None => Ok(config),
    }
}

// ConfigReady State ===========================================================

/// The working configuration is known. What comes next depends on the
/// request:
///
///  * **[`DoneEvent`] => [`DoneState`]** when nothing is to be written,
///  * **[`JobEvent`] => [`ProgramWrittenState`]** after the program area was
///    written, when a program image was supplied,
///  * **[`JobEvent`] => [`ConfigWrittenState`]** after the config page was
///    written, when only a config override was supplied,
///  * **[`FailedEvent`] => [`ErrorState`]** when the chosen write fails.
#[derive(Debug)]
pub(crate) struct ConfigReadyState {
    pub job: Option<Job>,
}
impl Runnable for ConfigReadyState {
    fn run(&mut self, ctx: &mut SessionContext<'_>) -> Event {
        let mut job = take_job(&mut self.job);

        if !ctx.request.writes_something() {
            info!("Nothing to write");
            return Event::Done(DoneEvent {
                outcome: Ok(job.into_report()),
            });
        }

        if ctx.request.program.is_some() {
            info!("=> Write program area");
            return fire(Step::WriteProgram, write_program(ctx, &job.config), |program| {
                job.program = Some(program);
                Event::ProgramWritten(JobEvent { job })
            });
        }

        info!("=> Write config area");
        fire(Step::WriteConfig, write_config(ctx, &job), |_| {
            Event::ConfigWritten(JobEvent { job })
        })
    }
}

fn write_program(ctx: &mut SessionContext<'_>, config: &ConfigImage) -> Result<ProgramImage> {
    let program = match &ctx.request.program {
        Some(image) => ProgramImage::from_sparse(image)?,
        None => unreachable!("no program image requested"),
    };
    info!(
        "Write {} pages of program area ({} bytes)",
        config.program_pages(),
        program.len()
    );
    ctx.flash
        .write_program_area(config.program_pages(), program.as_bytes())?;
    Ok(program)
}

/// Write the whole config page. When a program was written, the header bytes
/// are also written one by one.
fn write_config(ctx: &mut SessionContext<'_>, job: &Job) -> Result<()> {
    ctx.flash.write_page(CONFIG_PAGE, job.config.as_bytes())?;
    if job.program.is_some() {
        for (offset, value) in job.config.as_bytes()[..4].iter().enumerate() {
            ctx.flash.write_byte(config_address(offset), *value)?;
        }
    }
    Ok(())
}

// ProgramWritten State ========================================================

/// The program area holds the new program.
///
///  * **[`JobEvent`] => [`ConfigWrittenState`]** after the config page was
///    written and its header bytes patched,
///  * **[`FailedEvent`] => [`ErrorState`]** otherwise.
#[derive(Debug)]
pub(crate) struct ProgramWrittenState {
    pub job: Option<Job>,
}
impl Runnable for ProgramWrittenState {
    fn run(&mut self, ctx: &mut SessionContext<'_>) -> Event {
        info!("=> Write config area");
        let job = take_job(&mut self.job);
        fire(Step::WriteConfig, write_config(ctx, &job), |_| {
            Event::ConfigWritten(JobEvent { job })
        })
    }
}

// ConfigWritten State =========================================================

/// Everything requested has been written.
///
///  * **[`JobEvent`] => [`SelfTestedState`]** when the built-in self-test
///    passed,
///  * **[`FailedEvent`] => [`ErrorState`]** otherwise.
#[derive(Debug)]
pub(crate) struct ConfigWrittenState {
    pub job: Option<Job>,
}
impl Runnable for ConfigWrittenState {
    fn run(&mut self, ctx: &mut SessionContext<'_>) -> Event {
        info!("=> Built-in self-test");
        let job = take_job(&mut self.job);
        fire(Step::SelfTest, ctx.flash.run_self_test(), |_| {
            Event::SelfTested(JobEvent { job })
        })
    }
}

// SelfTested State ============================================================

/// The module passed its self-test.
///
///  * **[`JobEvent`] => [`VerifiedState`]** when the config page, and the
///    program area if one was written, read back identical,
///  * **[`FailedEvent`] => [`ErrorState`]** on the first differing byte.
#[derive(Debug)]
pub(crate) struct SelfTestedState {
    pub job: Option<Job>,
}
impl Runnable for SelfTestedState {
    fn run(&mut self, ctx: &mut SessionContext<'_>) -> Event {
        info!("=> Verify");
        let job = take_job(&mut self.job);
        fire(Step::Verify, verify(ctx, &job), |_| {
            Event::Verified(JobEvent { job })
        })
    }
}

fn verify(ctx: &mut SessionContext<'_>, job: &Job) -> Result<()> {
    info!("Verify config area");
    ctx.flash.verify_config(&job.config)?;
    if let Some(program) = &job.program {
        info!("Verify program area");
        ctx.flash
            .verify_program(job.config.program_pages(), program.as_bytes())?;
    }
    Ok(())
}

// Verified State ==============================================================

/// Flash contents are confirmed.
///
///  * **[`JobEvent`] => [`LockedState`]** after code protection was set and
///    read back, when locking was requested,
///  * **[`DoneEvent`] => [`DoneState`]** when it was not,
///  * **[`FailedEvent`] => [`ErrorState`]** when locking fails.
#[derive(Debug)]
pub(crate) struct VerifiedState {
    pub job: Option<Job>,
}
impl Runnable for VerifiedState {
    fn run(&mut self, ctx: &mut SessionContext<'_>) -> Event {
        let mut job = take_job(&mut self.job);
        if !ctx.request.lock {
            return Event::Done(DoneEvent {
                outcome: Ok(job.into_report()),
            });
        }

        info!("=> Lock");
        let result = ctx
            .flash
            .set_code_protect()
            .and_then(|_| ctx.flash.verify_code_protect());
        fire(Step::Lock, result, |_| {
            job.locked = true;
            job.config.set(CODE_PROTECT_OFFSET, CODE_PROTECT_ON);
            Event::Locked(JobEvent { job })
        })
    }
}

// Locked State ================================================================

/// Code protection is set on the module.
///
///  * **[`DoneEvent`] => [`DoneState`]** unconditionally.
#[derive(Debug)]
pub(crate) struct LockedState {
    pub job: Option<Job>,
}
impl Runnable for LockedState {
    fn run(&mut self, _ctx: &mut SessionContext<'_>) -> Event {
        let job = take_job(&mut self.job);
        Event::Done(DoneEvent {
            outcome: Ok(job.into_report()),
        })
    }
}

// Error State =================================================================

/// Absorbs any failure of the steps above.
///
///  * **[`DoneEvent`] => [`DoneState`]** unconditionally, carrying the error.
#[derive(Debug)]
pub(crate) struct ErrorState {
    pub error: Option<SessionError>,
}
impl Runnable for ErrorState {
    fn run(&mut self, _ctx: &mut SessionContext<'_>) -> Event {
        let error = match self.error.take() {
            Some(error) => error,
            None => unreachable!("state ran twice"),
        };
        error!("{}", error);
        Event::Done(DoneEvent {
            outcome: Err(error),
        })
    }
}

// Done State ==================================================================

/// The final state of the session state machine. It is never run; the event
/// loop stops as soon as it is reached and hands out the outcome.
#[derive(Debug)]
pub(crate) struct DoneState {
    pub outcome: Option<std::result::Result<SessionReport, SessionError>>,
}
impl Runnable for DoneState {
    fn run(&mut self, _ctx: &mut SessionContext<'_>) -> Event {
        unreachable!("the done state is terminal")
    }
}
