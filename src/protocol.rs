//! Bootloader command/response protocol.
//!
//! Layered bottom-up:
//!
//! * [`frame`] builds and validates the 8-byte frames,
//! * [`transport`] moves buffers in 4-byte chunks, each one gated by the
//!   module readiness line,
//! * [`flash`] implements page, byte and program area access on top.

pub mod flash;
pub mod frame;
pub mod transport;

pub use flash::{BootloaderVersion, ChipInfo, FlashAccess};
pub use transport::{ReadinessGate, TransferObserver, Transport};

use hexplay::HexViewBuilder;
use log::{debug, log_enabled, Level::Debug};

/// Dump `data` in a hex table when debug logging is on.
pub(crate) fn hex_dump(label: &str, data: &[u8]) {
    if log_enabled!(Debug) {
        let view = HexViewBuilder::new(data)
            .address_offset(0)
            .row_width(16)
            .finish();
        debug!("{} ({} bytes)\n{}", label, data.len(), view);
    }
}
