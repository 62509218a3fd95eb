//! Eoprog command line interface.

use std::fs;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_t, App, AppSettings::*, Arg,
};
use console::style;
use log::{debug, trace, LevelFilter};
use simplelog::*;

use eoprog::image::{ihex, SparseImage};
use eoprog::utils::{select_port, ProgressObserver};
use eoprog::{self as eo, SerialLink, Session, SessionRequest};

fn main() {
    println!("[EO] eoprog v{}", crate_version!());

    // Ctrl+C only raises the flag. Port discovery gives up on it, and the
    // session notices it at the next transfer chunk and still tears the link
    // down.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        if let Err(e) = ctrlc::set_handler(move || {
            println!("🛑 received Ctrl+C!");
            cancel.store(true, Ordering::SeqCst);
        }) {
            fail(&format!("failed to install the Ctrl+C handler: {}", e));
        }
    }

    let matches = App::new(crate_name!())
        .version(format!("v{}", crate_version!()).as_str())
        .author(crate_authors!())
        .about(crate_description!())
        .long_about(
            "\n\
            Eoprog puts the module in programming mode through its reset and \
            program-enable lines, then talks to the bootloader over the \
            serial port. Each session:\n\
               \t* reads the module id and its configuration page, and keeps \
                   a backup of the latter in the backup directory \n\
               \t* writes the program image, if given \n\
               \t* writes the configuration, merged with the given \
                   override \n\
               \t* runs the built-in self-test and verifies what was \
                   written \n\
               \t* optionally sets code protection \n\
            \n\
            A module with an erased configuration page is restored from \
            its backup. Without any image to write, the configuration is \
            only read and backed up.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .arg(
            Arg::with_name("DEVICE_TTY")
                .help("the serial device the module is wired to")
                .long_help(
                    "the serial device the module is wired to; when not set, \
                     the available devices are listed for selection.",
                )
                .short("-t")
                .long("--tty")
                .takes_value(true)
                .require_equals(true),
        )
        .arg(
            Arg::with_name("BAUD_RATE")
                .help("serial port baud rate")
                .short("-b")
                .long("--baud-rate")
                .takes_value(true)
                .default_value("230400")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("CONFIG_IMAGE")
                .help("Intel HEX file merged on top of the module configuration")
                .short("-c")
                .long("--conf")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("PROGRAM_IMAGE")
                .help("Intel HEX file written to the program area")
                .short("-p")
                .long("--prog")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("FORCE_BACKUP")
                .help("take the configuration from the backup, not the module")
                .short("-f")
                .long("--force"),
        )
        .arg(
            Arg::with_name("LOCK")
                .help("set code protection after a successful write")
                .short("-l")
                .long("--lock"),
        )
        .arg(
            Arg::with_name("BACKUP_DIR")
                .help("directory holding the configuration backups")
                .long("--backup-dir")
                .takes_value(true)
                .default_value("data"),
        )
        .arg(Arg::with_name("v").short("v").multiple(true).help(
            "Sets the logging level of verbosity, repeat several times for \
                higher verbosity",
        ))
        .get_matches();

    // Vary the output based on how many times the user used the "verbose" flag
    // (i.e. 'eoprog -v -v -v' or 'eoprog -vvv' vs 'eoprog -v'
    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    if let Err(e) = TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        fail(&format!("failed to set up logging: {}", e));
    }

    trace!("{:#?}", matches);

    // Arguments with default values ===========================================

    let baud_rate = value_t!(matches.value_of("BAUD_RATE"), u32).unwrap_or_else(|_| {
        println!(
            "{}: `{}` needs to be a numeric value",
            style("error").red(),
            style("baud-rate").cyan()
        );
        process::exit(-1);
    });
    let backup_dir = matches.value_of("BACKUP_DIR").unwrap_or("data");

    // Arguments with NO default values ========================================

    let request = SessionRequest {
        config_override: matches.value_of("CONFIG_IMAGE").map(load_image),
        program: matches.value_of("PROGRAM_IMAGE").map(load_image),
        force_backup: matches.is_present("FORCE_BACKUP"),
        lock: matches.is_present("LOCK"),
    };

    let path = match matches.value_of("DEVICE_TTY") {
        Some(path) => path.to_owned(),
        None => match select_port(&cancel) {
            Some(path) => path,
            None => fail("no serial port selected"),
        },
    };

    // END - Arguments =========================================================

    let settings = eo::SettingsBuilder::default()
        .path(path)
        .baud_rate(baud_rate)
        .backup_dir(backup_dir)
        .finalize();

    let mut link = match SerialLink::connect(&settings) {
        Ok(link) => link,
        Err(e) => fail(&e.to_string()),
    };

    // Run the session =========================================================

    let observer = ProgressObserver::new();
    let result = Session::new(&settings)
        .observer(&observer)
        .cancel(&cancel)
        .run(&mut link, &request);

    match result {
        Ok(report) => {
            println!("[EO] bootloader {}", report.version);
            for line in report.info.to_string().lines() {
                println!("[EO] {}", line);
            }
            for line in report.config.to_string().lines() {
                println!("[EO] {}", line);
            }
            if report.program_written {
                println!("[EO] {}", style("program written and verified").green());
            }
            if report.locked {
                println!("[EO] {}", style("code protection set").green());
            }
            println!("[EO] 👍 {}", style("done").green());
        }
        Err(e) => {
            debug!("{:?}", e);
            fail(&e.to_string());
        }
    }
}

/// Read an Intel HEX file, or exit with an error.
fn load_image(path: &str) -> SparseImage {
    let parsed = fs::read_to_string(path)
        .map_err(eo::Error::from)
        .and_then(|text| ihex::parse(&text).map_err(eo::Error::from));
    match parsed {
        Ok(image) => image,
        Err(e) => fail(&format!("cannot load `{}`: {}", path, e)),
    }
}

fn fail(message: &str) -> ! {
    println!("{}: {}", style("error").red(), message);
    process::exit(1);
}
