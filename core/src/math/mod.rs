pub mod regression;
pub mod stats;

pub use regression::{linear_regression, log_log_regression, LinearFit};
pub use stats::StatsHelper;
