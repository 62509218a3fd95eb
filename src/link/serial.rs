//! [`Link`] over a serial port.
//!
//! The data path uses the TX/RX lines of the port. The control lines of the
//! module are wired to the modem control lines of the adapter:
//!
//! | module          | serial adapter |
//! |-----------------|----------------|
//! | program-enable  | RTS (output)   |
//! | reset           | DTR (output)   |
//! | ready           | CTS (input)    |
//!
//! Hardware flow control is therefore never enabled on the port.

use std::io::{Read, Write};
use std::time::Duration;

use log::{debug, info, trace};
use serialport::{ClearBuffer, FlowControl, SerialPort};

use super::Link;
use crate::error::LinkError;
use crate::settings::Settings;

/// Read timeout for a single chunk once the module signalled readiness.
const READ_TIMEOUT: Duration = Duration::from_millis(1000);

pub struct SerialLink {
    port: Box<dyn SerialPort>,
    open: bool,
}

impl SerialLink {
    /// Open the serial port named in `settings`, retrying for a few seconds
    /// in case the adapter is still being enumerated.
    ///
    /// The control lines are usable as soon as this returns; the data path
    /// stays closed until [`Link::open`] is called.
    pub fn connect(settings: &Settings) -> Result<Self, LinkError> {
        use retry::{delay, retry_with_index};

        let path = settings.path.clone().ok_or(LinkError::NoDevice)?;

        let result = retry_with_index(
            delay::Fixed::from_millis(1000).take(4),
            |index| -> Result<Box<dyn SerialPort>, serialport::Error> {
                debug!("Trying to open {} ({})", path, index);
                serialport::new(&path, settings.baud_rate)
                    .data_bits(settings.data_bits)
                    .stop_bits(settings.stop_bits)
                    .parity(settings.parity)
                    .flow_control(FlowControl::None)
                    .timeout(READ_TIMEOUT)
                    .open()
            },
        );

        match result {
            Ok(port) => {
                info!("Opened {} at {} baud", path, settings.baud_rate);
                debug!("data_bits    : {:#?}", settings.data_bits);
                debug!("stop_bits    : {:#?}", settings.stop_bits);
                debug!("parity       : {:#?}", settings.parity);
                Ok(SerialLink { port, open: false })
            }
            Err(retry::Error::Operation {
                error,
                total_delay,
                tries,
            }) => {
                info!(
                    "Failed to open the port after {:?} and {} tries: {}",
                    total_delay, tries, error,
                );
                Err(error.into())
            }
            Err(retry::Error::Internal(description)) => {
                info!("Internal retry error while opening port: {}", description);
                Err(serialport::Error::new(serialport::ErrorKind::Unknown, description).into())
            }
        }
    }
}

impl Link for SerialLink {
    fn set_program_enable(&mut self, asserted: bool) -> Result<(), LinkError> {
        trace!("program-enable <- {}", asserted);
        self.port.write_request_to_send(asserted)?;
        Ok(())
    }

    fn set_reset(&mut self, high: bool) -> Result<(), LinkError> {
        trace!("reset <- {}", high);
        self.port.write_data_terminal_ready(high)?;
        Ok(())
    }

    fn open(&mut self) -> Result<(), LinkError> {
        // Drop whatever the module babbled while coming out of reset.
        self.port.clear(ClearBuffer::All)?;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        if self.open {
            self.port.flush()?;
            self.open = false;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn is_ready(&mut self) -> Result<bool, LinkError> {
        Ok(self.port.read_clear_to_send()?)
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), LinkError> {
        if !self.open {
            return Err(LinkError::NotOpen);
        }
        self.port.write_all(chunk)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), LinkError> {
        if !self.open {
            return Err(LinkError::NotOpen);
        }
        self.port.read_exact(buf)?;
        Ok(())
    }
}
