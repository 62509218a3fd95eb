//! Eoprog programs radio transceiver modules through their serial
//! bootloader. It writes the application image and the configuration page,
//! runs the module self-test, verifies everything written and can lock the
//! flash with the code protection byte.
//!
//! The configuration of every module seen is backed up in a directory, one
//! Intel HEX file per module id, so a module whose configuration page was
//! erased can be restored.
//!
//! The crate is organized bottom-up:
//!
//! * [`link`] abstracts the wiring to the module: a data path and three
//!   control lines (program-enable, reset and ready),
//! * [`protocol`] frames bootloader commands, moves them in readiness gated
//!   chunks and implements the flash primitives,
//! * [`image`] holds the flash layout and the images written to it,
//! * [`config`] assembles the configuration to write from the module, the
//!   backup store and user overrides,
//! * [`session`] sequences a complete programming session as a state
//!   machine.
//!
//! The session state machine follows a few rules:
//!
//! * Can only be in one state at any time.
//! * Each state holds its own data, handed over by the event that led to it.
//! * Transitions between states are triggered via typed **events** and are
//!   implemented with `From` conversions from events to states. Only
//!   transitions for which such a conversion exists are possible, which is
//!   checked at **compile-time**.
//! * Whatever the outcome, the link to the module is torn down exactly once
//!   when the session ends.

pub mod config;
pub mod error;
pub mod image;
pub mod link;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod utils;

pub use error::{Error, Result, SessionError, Step};
pub use link::{Link, SerialLink};
pub use session::{run_session, Session, SessionReport, SessionRequest};
pub use settings::{Settings, SettingsBuilder};
