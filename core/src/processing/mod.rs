pub mod converter;
pub mod export;
pub mod filter;
pub mod firing_file;
pub mod motor;
pub mod pipeline;

pub use converter::{Converter, TransducerKind};
pub use export::{save_csv, save_raw_csv, write_csv, write_raw_csv, PerformanceSummary};
pub use filter::LowPassFilter;
pub use firing_file::{FiringFile, RawData};
pub use motor::{motor_designation, MotorConfig, MotorOrientation, MotorResult};
pub use pipeline::{burn_window, reject_outliers, SignalProcessor, NUM_CAL_FRAMES};
