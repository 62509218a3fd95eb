//! Progress bars for bulk transfers.

use std::cell::RefCell;

use indicatif::{ProgressBar, ProgressStyle};

use crate::image::PAGE_SIZE;
use crate::protocol::TransferObserver;

/// Renders one progress bar per bulk transfer. Command frames and other
/// transfers shorter than a flash page are not shown.
#[derive(Default)]
pub struct ProgressObserver {
    bar: RefCell<Option<ProgressBar>>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransferObserver for ProgressObserver {
    fn begin(&self, sending: bool, total: usize) {
        if total < PAGE_SIZE {
            return;
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[EO] {msg:8} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .progress_chars("=> "),
        );
        pb.set_message(if sending { "write" } else { "read" });
        *self.bar.borrow_mut() = Some(pb);
    }

    fn advance(&self, done: usize) {
        if let Some(pb) = self.bar.borrow().as_ref() {
            pb.set_position(done as u64);
        }
    }

    fn end(&self) {
        if let Some(pb) = self.bar.borrow_mut().take() {
            pb.finish_and_clear();
        }
    }
}
