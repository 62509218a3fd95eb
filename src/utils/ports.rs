//! Serial port discovery and interactive selection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::{thread, time::Duration};

use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Select};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use serialport::{available_ports, SerialPortType};

//==============================================================================
// Public Interface
//==============================================================================

/// Wait until at least one serial port shows up, then let the user pick one.
///
/// Returns the device path of the selected port, or `None` when the user
/// cancelled the selection or `cancel` was raised while waiting.
pub fn select_port(cancel: &AtomicBool) -> Option<String> {
    let waiting_period = Duration::from_secs(1);

    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(120);
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠚", "⠞", "⠖", "⠦", "⠴", "⠲", "⠳", "⠓"])
            .template("[EO] {spinner:.blue} {msg}"),
    );

    // Avoid cursor flicker during the waiting
    let _ = Term::stdout().hide_cursor();
    let found_ports = wait_for_ports(enumerate_serial_ports, cancel, waiting_period, |attempt| {
        pb.set_message(format!(
            "[{:03}s] ⌛ Waiting for a serial adapter to be connected...",
            style(attempt * waiting_period.as_secs()).dim(),
        ))
    });
    let _ = Term::stdout().show_cursor();

    let found_ports = match found_ports {
        Some(ports) => {
            pb.finish_with_message("Select the port the module is wired to:");
            ports
        }
        None => {
            pb.finish_with_message("❌ Waiting for a serial adapter cancelled");
            info!("Port discovery cancelled");
            return None;
        }
    };

    let selection = select_port_interactive(&found_ports);
    match &selection {
        Some(path) => info!("Selected serial port {}", path),
        None => info!("Port selection cancelled"),
    }
    selection
}

//==============================================================================
// Private stuff
//==============================================================================

/// Calls `enumerate` every `period` until it finds a port. `waiting` is told
/// the number of the attempt that came back empty. Gives up with `None` as
/// soon as `cancel` is raised.
fn wait_for_ports(
    mut enumerate: impl FnMut() -> Vec<String>,
    cancel: &AtomicBool,
    period: Duration,
    mut waiting: impl FnMut(u64),
) -> Option<Vec<String>> {
    let mut attempt: u64 = 1;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return None;
        }
        let ports = enumerate();
        if !ports.is_empty() {
            return Some(ports);
        }
        waiting(attempt);
        attempt += 1;
        thread::sleep(period);
    }
}

/// Enumerates serial devices on the system, describing USB adapters with their
/// manufacturer and product names.
fn enumerate_serial_ports() -> Vec<String> {
    match available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|p| match p.port_type {
                SerialPortType::UsbPort(info) => format!(
                    "{}: ({} / {})",
                    p.port_name,
                    info.manufacturer.as_deref().unwrap_or(""),
                    info.product.as_deref().unwrap_or("")
                ),
                _ => p.port_name,
            })
            .collect(),
        Err(ref e) => {
            info!("error: {}", e);
            vec![]
        }
    }
}

fn select_port_interactive(ports: &[String]) -> Option<String> {
    let term = Term::buffered_stderr();
    let theme = ColorfulTheme::default();

    let mut select = Select::with_theme(&theme);
    for item in ports {
        select.item(item);
    }

    let selection = select.default(0).interact_on_opt(&term).ok()??;
    ports.get(selection).map(|item| port_path(item).to_owned())
}

/// The device path of an entry produced by [`enumerate_serial_ports`].
fn port_path(item: &str) -> &str {
    match item.find(": (") {
        Some(end) => &item[..end],
        None => item,
    }
}
