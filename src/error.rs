//! Error types for every stage of a programming session.
//!
//! Each component owns a closed error enum. They all convert into the crate
//! level [`Error`], which the session state machine wraps together with the
//! [`Step`] that failed into a [`SessionError`].

use std::{fmt, io};

use thiserror::Error as TError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Frame level protocol violations.
#[derive(Debug, Clone, PartialEq, Eq, TError)]
pub enum ProtocolError {
    /// The trailing checksum byte does not match the computed one.
    #[error("wrong checksum: frame carries {received:#04x}, computed {computed:#04x}")]
    ChecksumMismatch { received: u8, computed: u8 },

    /// Sync pattern or acknowledgement opcode differ from what was expected.
    #[error("unexpected response {received:02X?}, expected ack opcode {expected_ack:#04x}")]
    UnexpectedResponse { expected_ack: u8, received: [u8; 8] },
}

/// The readiness signal was never observed.
#[derive(Debug, Clone, PartialEq, Eq, TError)]
pub enum TimeoutError {
    #[error("module not ready after {attempts} polls")]
    ModuleNotReady { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, TError)]
pub enum ConnectError {
    /// The readiness line stayed low right after the reset sequence.
    #[error("failed to detect the module or module not ready")]
    ModuleNotDetected,
}

#[derive(Debug, Clone, PartialEq, Eq, TError)]
pub enum ConfigError {
    #[error("backup `{path}` holds {size} bytes, expected 256")]
    WrongBackupSize { path: String, size: usize },

    #[error("empty config area and no backup found for module {id}")]
    EmptyChipNoBackup { id: String },

    #[error("no backup config found for module {id}")]
    BackupMissing { id: String },

    #[error("config override defines offset {offset:#x} outside the config page")]
    OverrideOutOfRange { offset: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, TError)]
pub enum ProgramError {
    /// The program image is not made of whole flash pages.
    #[error("program image size {size} is not a multiple of the page size")]
    WrongImageSize { size: usize },

    /// The program image does not match the page count in the config.
    #[error("program image holds {size} bytes but config announces {pages} pages")]
    ProgramSizeMismatch { pages: u8, size: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, TError)]
pub enum VerifyError {
    #[error("config area mismatch at {0:#X}")]
    ConfigMismatch(usize),

    #[error("program area mismatch at {0:#X}")]
    ProgramMismatch(usize),
}

/// Failures of the physical link to the module.
#[derive(Debug, TError)]
pub enum LinkError {
    #[error("serialport error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("no serial device specified")]
    NoDevice,

    #[error("transport is not open")]
    NotOpen,

    #[error("transfer interrupted")]
    Interrupted,
}

/// Record-format image parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, TError)]
pub enum ImageError {
    #[error("line {line}: record does not start with ':'")]
    MissingStartCode { line: usize },

    #[error("line {line}: invalid hex digits")]
    InvalidHex { line: usize },

    #[error("line {line}: record length does not match its byte count")]
    BadLength { line: usize },

    #[error("line {line}: record checksum mismatch")]
    BadChecksum { line: usize },

    #[error("line {line}: unsupported record type {kind:#04x}")]
    UnsupportedRecord { line: usize, kind: u8 },

    #[error("line {line}: data extends past the 32-bit address space")]
    AddressOverflow { line: usize },

    #[error("no end-of-file record")]
    MissingEof,
}

/// Every error a session can fail with.
#[derive(Debug, TError)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("timeout: {0}")]
    Timeout(#[from] TimeoutError),

    #[error("connect error: {0}")]
    Connect(#[from] ConnectError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("program error: {0}")]
    Program(#[from] ProgramError),

    #[error("verify error: {0}")]
    Verify(#[from] VerifyError),

    #[error("built-in self-test failed with result {0:#04x}")]
    SelfTestFailure(u8),

    #[error("code protection not set, protect byte reads {0:#04x}")]
    CodeProtectVerifyFailure(u8),

    #[error("link error: {0}")]
    Link(#[from] LinkError),

    #[error("image error: {0}")]
    Image(#[from] ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The session step during which an error happened.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Step {
    Connect,
    ReadInfo,
    PrepareConfig,
    WriteProgram,
    WriteConfig,
    SelfTest,
    Verify,
    Lock,
}
impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Connect => "connect",
            Step::ReadInfo => "read info area",
            Step::PrepareConfig => "prepare config",
            Step::WriteProgram => "write program area",
            Step::WriteConfig => "write config area",
            Step::SelfTest => "built-in self-test",
            Step::Verify => "verify",
            Step::Lock => "code protection",
        };
        f.write_str(name)
    }
}

/// The error surfaced by a failed session, after teardown has run.
#[derive(Debug, TError)]
#[error("{step} failed: {error}")]
pub struct SessionError {
    pub step: Step,
    #[source]
    pub error: Error,
}
