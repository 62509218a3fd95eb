//! Programming session.
//!
//! A session takes the module from its running application into the
//! bootloader, reads its identity and configuration, writes whatever was
//! requested, checks the result and leaves the module running again. Whatever
//! happens on the way, the link is torn down exactly once, last.
//!
//! **Example** - Programming a module on a serial port:
//! ```ignore
//! let settings = SettingsBuilder::new().path("/dev/ttyUSB0").finalize();
//! let mut link = SerialLink::connect(&settings)?;
//! let request = SessionRequest {
//!     program: Some(ihex::parse(&std::fs::read_to_string("app.hex")?)?),
//!     lock: true,
//!     ..Default::default()
//! };
//! let report = session::run_session(&mut link, &settings, &request)?;
//! println!("{}", report.info);
//! ```

mod events;
mod state_machine;
mod states;

pub use state_machine::{run_session, Session};

use crate::image::{ConfigImage, SparseImage};
use crate::protocol::{BootloaderVersion, ChipInfo};

/// What a session is asked to do.
#[derive(Debug, Clone, Default)]
pub struct SessionRequest {
    /// Bytes to merge on top of the module configuration.
    pub config_override: Option<SparseImage>,
    /// Image for the program area, starting at address 0.
    pub program: Option<SparseImage>,
    /// Take the configuration from the backup store instead of the module.
    pub force_backup: bool,
    /// Set code protection once everything written was verified.
    pub lock: bool,
}

impl SessionRequest {
    /// A request with neither a config override nor a program only reads
    /// (and backs up) the module configuration.
    pub fn writes_something(&self) -> bool {
        self.config_override.is_some() || self.program.is_some()
    }
}

/// What a successful session found and did.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub version: BootloaderVersion,
    pub info: ChipInfo,
    /// The configuration on the module when the session ended.
    pub config: ConfigImage,
    pub program_written: bool,
    pub locked: bool,
}
