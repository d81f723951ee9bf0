pub mod board_info;
pub mod calibration;
pub mod firing;
pub mod raw_series;

pub use board_info::{DataAge, ErrorCollector};
pub use calibration::{CalibrationPoint, CalibrationSession, ConverterCandidate};
pub use firing::{FiringSession, LiveReading, SessionEvent, VersionGate, PACKET_STRIDE};
pub use raw_series::{RawSample, RawSeries};
