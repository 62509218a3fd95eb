//! Hardware link to the module.
//!
//! The module is wired through three control lines and a data path:
//!
//! * **program-enable** puts the bootloader in programming mode when it is
//!   asserted during reset,
//! * **reset** holds the module in reset while high,
//! * **ready** is driven by the module when it can accept or produce the
//!   next transfer chunk,
//! * the data path carries command frames and bulk payloads.
//!
//! The session owns exactly one [`Link`] for its whole lifetime and passes it
//! explicitly to the protocol layers.

mod serial;
#[cfg(test)]
pub(crate) mod sim;

pub use serial::SerialLink;

use crate::error::LinkError;

/// Control and data access to the module.
pub trait Link {
    /// Drive the program-enable line.
    fn set_program_enable(&mut self, asserted: bool) -> Result<(), LinkError>;

    /// Drive the reset line.
    fn set_reset(&mut self, high: bool) -> Result<(), LinkError>;

    /// Open the data path.
    fn open(&mut self) -> Result<(), LinkError>;

    /// Close the data path. Closing an already closed link is a no-op.
    fn close(&mut self) -> Result<(), LinkError>;

    fn is_open(&self) -> bool;

    /// Sample the readiness line.
    fn is_ready(&mut self) -> Result<bool, LinkError>;

    /// Transmit one chunk.
    fn write(&mut self, chunk: &[u8]) -> Result<(), LinkError>;

    /// Receive exactly `buf.len()` bytes.
    fn read(&mut self, buf: &mut [u8]) -> Result<(), LinkError>;
}
