//! Chunked transfers gated by the module readiness line.
//!
//! The bootloader performs a synchronous flash operation for every 4-byte
//! chunk it receives, so instead of a fixed inter-byte delay every chunk
//! waits for the module to raise its readiness line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::trace;
use retry::{delay, retry, OperationResult};

use super::frame::{Frame, FRAME_SIZE};
use crate::error::{LinkError, Result, TimeoutError};
use crate::link::Link;
use crate::settings::Settings;

/// Size of the unit exchanged between two readiness checks.
pub const CHUNK_SIZE: usize = 4;

/// Receives progress notifications for every transfer.
pub trait TransferObserver {
    /// A transfer of `total` bytes is starting.
    fn begin(&self, sending: bool, total: usize);
    /// `done` bytes out of the announced total have been transferred.
    fn advance(&self, done: usize);
    fn end(&self);
}

/// Bounded polling of the readiness line.
#[derive(Debug, Copy, Clone)]
pub struct ReadinessGate {
    attempts: u32,
    interval: Duration,
}

impl ReadinessGate {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        ReadinessGate { attempts, interval }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.ready_attempts, settings.ready_poll_interval)
    }

    pub fn is_ready(&self, link: &mut dyn Link) -> Result<bool> {
        Ok(link.is_ready()?)
    }

    /// Poll with the configured number of attempts.
    pub fn wait_ready(&self, link: &mut dyn Link) -> Result<()> {
        self.wait_ready_for(link, self.attempts)
    }

    /// Poll the readiness line up to `max_attempts` times, sleeping the poll
    /// interval between two polls. Returns as soon as the line is seen high.
    pub fn wait_ready_for(&self, link: &mut dyn Link, max_attempts: u32) -> Result<()> {
        if max_attempts == 0 {
            return Err(TimeoutError::ModuleNotReady { attempts: 0 }.into());
        }

        // The first poll is immediate, each delay buys one more poll.
        let delays = delay::Fixed::from(self.interval).take(max_attempts as usize - 1);
        let result = retry(delays, || match link.is_ready() {
            Ok(true) => OperationResult::Ok(()),
            Ok(false) => OperationResult::Retry(None),
            Err(e) => OperationResult::Err(Some(e)),
        });

        match result {
            Ok(()) => Ok(()),
            Err(retry::Error::Operation { error: Some(e), .. }) => Err(e.into()),
            Err(retry::Error::Operation {
                error: None, tries, ..
            }) => {
                trace!("module still not ready after {} polls", tries);
                Err(TimeoutError::ModuleNotReady {
                    attempts: tries as u32,
                }
                .into())
            }
            Err(retry::Error::Internal(description)) => Err(LinkError::Io(
                std::io::Error::new(std::io::ErrorKind::Other, description),
            )
            .into()),
        }
    }
}

/// Sends and receives buffers over a [`Link`] in [`CHUNK_SIZE`] units.
pub struct Transport<'a> {
    link: &'a mut dyn Link,
    gate: ReadinessGate,
    settle_delay: Duration,
    observer: Option<&'a dyn TransferObserver>,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Transport<'a> {
    pub fn new(link: &'a mut dyn Link, settings: &Settings) -> Self {
        Transport {
            link,
            gate: ReadinessGate::from_settings(settings),
            settle_delay: settings.settle_delay,
            observer: None,
            cancel: None,
        }
    }

    pub fn with_observer(mut self, observer: Option<&'a dyn TransferObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Abort transfers with [`LinkError::Interrupted`] once `cancel` is set.
    pub fn with_cancel(mut self, cancel: Option<&'a AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Give access to the underlying link, e.g. to drive control lines.
    pub fn link(&mut self) -> &mut dyn Link {
        &mut *self.link
    }

    pub fn gate(&self) -> ReadinessGate {
        self.gate
    }

    pub fn send(&mut self, buffer: &[u8]) -> Result<()> {
        trace!("send {} bytes", buffer.len());
        self.notify_begin(true, buffer.len());

        let mut done = 0;
        for chunk in buffer.chunks(CHUNK_SIZE) {
            self.before_chunk()?;
            self.link.write(chunk)?;
            thread::sleep(self.settle_delay);

            done += chunk.len();
            if let Some(observer) = self.observer {
                observer.advance(done);
            }
        }

        self.notify_end();
        Ok(())
    }

    pub fn receive(&mut self, size: usize) -> Result<Vec<u8>> {
        trace!("receive {} bytes", size);
        self.notify_begin(false, size);

        let mut received = vec![0u8; size];
        let mut done = 0;
        for chunk in received.chunks_mut(CHUNK_SIZE) {
            self.before_chunk()?;
            self.link.read(chunk)?;

            done += chunk.len();
            if let Some(observer) = self.observer {
                observer.advance(done);
            }
        }

        self.notify_end();
        Ok(received)
    }

    pub fn receive_frame(&mut self) -> Result<Frame> {
        let data = self.receive(FRAME_SIZE)?;
        let mut frame = [0u8; FRAME_SIZE];
        frame.copy_from_slice(&data);
        Ok(frame)
    }

    fn before_chunk(&mut self) -> Result<()> {
        if let Some(cancel) = self.cancel {
            if cancel.load(Ordering::SeqCst) {
                return Err(LinkError::Interrupted.into());
            }
        }
        if !self.gate.is_ready(&mut *self.link)? {
            self.gate.wait_ready(&mut *self.link)?;
        }
        Ok(())
    }

    fn notify_begin(&self, sending: bool, total: usize) {
        if let Some(observer) = self.observer {
            observer.begin(sending, total);
        }
    }

    fn notify_end(&self) {
        if let Some(observer) = self.observer {
            observer.end();
        }
    }
}
