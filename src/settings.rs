//! Settings for the link to the module and the programming session timing.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values.

use std::path::PathBuf;
use std::time::Duration;

pub use serialport::{DataBits, Parity, StopBits};

// =============================================================================
// Public Interface
// =============================================================================

/// Groups all settings used by `eoprog` and acts as a
/// [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
/// for the settings.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// The port name, usually the device path.
    pub path: Option<String>,
    /// The baud rate in symbols-per-second.
    pub baud_rate: u32,
    /// Number of bits used to represent a character sent on the line.
    pub data_bits: DataBits,
    /// The type of parity to use for error checking.
    pub parity: Parity,
    /// Number of bits to use to signal the end of a character.
    pub stop_bits: StopBits,

    /// Directory holding one backup config image per module id.
    pub backup_dir: PathBuf,

    /// How many times the readiness line is sampled before a transfer chunk
    /// is given up on.
    pub ready_attempts: u32,
    /// Sleep between two samples of the readiness line.
    pub ready_poll_interval: Duration,
    /// Pause after each transferred chunk.
    pub settle_delay: Duration,
    /// Width of the reset pulses during connect and teardown.
    pub reset_pulse: Duration,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set.
///
/// **Example**
///
/// ```ignore
/// let settings = SettingsBuilder::new().path("/dev/ttyUSB0").finalize();
/// ```
pub struct SettingsBuilder {
    settings: Settings,
}
impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
impl SettingsBuilder {
    /// Start building the settings using default values and no path for the
    /// port.
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings {
                path: None,
                baud_rate: 230_400,
                data_bits: DataBits::Eight,
                parity: Parity::None,
                stop_bits: StopBits::One,
                backup_dir: PathBuf::from("data"),
                ready_attempts: 500,
                ready_poll_interval: Duration::from_millis(1),
                settle_delay: Duration::from_micros(20),
                reset_pulse: Duration::from_millis(1),
                _private_use_builder: (),
            },
        }
    }

    /// Set the path to the serial port
    pub fn path<'a>(mut self, path: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.path = Some(path.into().as_ref().to_owned());
        self
    }

    /// Set the baud rate in symbols-per-second
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.settings.baud_rate = baud_rate;
        self
    }

    /// Set the number of bits used to represent a character sent on the line
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    /// Set the type of parity to use for error checking
    pub fn parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    /// Set the number of bits to use to signal the end of a character
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    /// Set the directory where config backups are kept
    pub fn backup_dir(mut self, backup_dir: impl Into<PathBuf>) -> Self {
        self.settings.backup_dir = backup_dir.into();
        self
    }

    /// Set the number of readiness polls before timing out
    pub fn ready_attempts(mut self, ready_attempts: u32) -> Self {
        self.settings.ready_attempts = ready_attempts;
        self
    }

    pub fn ready_poll_interval(mut self, interval: Duration) -> Self {
        self.settings.ready_poll_interval = interval;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settings.settle_delay = delay;
        self
    }

    pub fn reset_pulse(mut self, pulse: Duration) -> Self {
        self.settings.reset_pulse = pulse;
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
