//! Terminal helpers for the command line front end.

mod ports;
mod progress;

pub use ports::select_port;
pub use progress::ProgressObserver;
