//! Packet transport, acquisition and signal-processing core for the rocket
//! motor test stand.
//!
//! The stand controller talks over a half-duplex serial radio link using fixed
//! 12-byte frames. This crate frames and decodes that traffic, gates sessions
//! on the board version, buffers firing telemetry and turns raw sensor counts
//! into calibrated thrust/pressure curves and performance metrics.

pub mod acquisition;
pub mod characterization;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod protocol;
pub mod telemetry;
pub mod transport;

pub use prelude::{ProcessingError, SessionError, TransportError};
