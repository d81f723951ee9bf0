use std::path::PathBuf;

pub use crate::acquisition::{
    CalibrationSession, FiringSession, LiveReading, RawSample, RawSeries, SessionEvent,
};
pub use crate::processing::{Converter, MotorConfig, MotorResult, TransducerKind};
pub use crate::protocol::{InboundPacket, OutboundPacket};
pub use crate::transport::{CommandLink, SerialTransport, TransportSettings};

/// Failure to turn a 12-byte frame body into an inbound packet.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame body must be {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },
    #[error("checksum mismatch (byte sum {sum:#04x})")]
    Checksum { sum: u8 },
    #[error("unrecognized packet type {0}")]
    UnknownType(u8),
}

/// Errors raised by the serial transport.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("serial device {port} unavailable: {source}")]
    DeviceUnavailable {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("previous connection to {0} did not close in time")]
    PortBusy(String),
    #[error("failed to start serial worker: {0}")]
    Worker(#[from] std::io::Error),
}

/// Errors raised when issuing commands through an acquisition session.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("board version not yet received")]
    AwaitingVersion,
    #[error("unsupported device (hardware {hardware}, firmware {firmware})")]
    VersionRejected { hardware: u8, firmware: u16 },
}

/// Recoverable failures of a single signal-processing pass.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("no datapoints to process")]
    NoDatapoints,
    #[error("no firing detected above the cutoff threshold")]
    NoFiringDetected,
    #[error("at least one of the force or pressure converters is required")]
    MissingConverter,
    #[error("raw data channels differ in length (time {time}, force {force}, pressure {pressure})")]
    MismatchedChannels {
        time: usize,
        force: usize,
        pressure: usize,
    },
}

/// Failures of an ordinary least-squares fit.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RegressionError {
    #[error("need at least {needed} points, got {got}")]
    InsufficientPoints { needed: usize, got: usize },
    #[error("input has no variance")]
    Degenerate,
    #[error("log regression requires positive values, got {0}")]
    NonPositive(f64),
}

/// Errors from reading or writing firing files.
#[derive(thiserror::Error, Debug)]
pub enum FiringFileError {
    #[error("firing file io: {0}")]
    Io(#[from] std::io::Error),
    #[error("firing file format: {0}")]
    Format(#[from] serde_json::Error),
}

/// Operator mistakes while editing calibration points.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("no transducer reading received yet")]
    NoReading,
    #[error("no calibration point at index {0}")]
    InvalidIndex(usize),
}

/// Errors from CSV export.
#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("csv export: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv export io: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the propellant characterization engine.
#[derive(thiserror::Error, Debug)]
pub enum CharacterizationError {
    #[error("firing {0} is already loaded")]
    AlreadyLoaded(PathBuf),
    #[error("firing {0} has no pressure data")]
    NoPressureData(PathBuf),
    #[error("no firing at index {0}")]
    InvalidIndex(usize),
    #[error("no firings loaded")]
    Empty,
    #[error(transparent)]
    File(#[from] FiringFileError),
    #[error(transparent)]
    Processing(#[from] ProcessingError),
    #[error(transparent)]
    Regression(#[from] RegressionError),
}

pub type TransportResult<T> = Result<T, TransportError>;
pub type ProcessingResult<T> = Result<T, ProcessingError>;
