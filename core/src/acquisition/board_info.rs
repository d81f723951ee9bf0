use std::time::{Duration, Instant};

use crate::protocol::board_errors::{format_error_message, is_nominal};

/// Remembers the last per-device error codes and reports only changes.
#[derive(Debug, Clone, Default)]
pub struct ErrorCollector {
    codes: Option<[u8; 3]>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the formatted messages when `codes` differs from the last
    /// report, `None` otherwise.
    pub fn check(&mut self, codes: [u8; 3]) -> Option<Vec<String>> {
        if self.codes == Some(codes) {
            return None;
        }
        self.codes = Some(codes);
        Some(
            codes
                .iter()
                .enumerate()
                .map(|(device, &code)| format_error_message(device, code))
                .collect(),
        )
    }

    pub fn has_faults(&self) -> bool {
        self.codes
            .map(|codes| codes.iter().any(|&code| !is_nominal(code)))
            .unwrap_or(false)
    }

    pub fn codes(&self) -> Option<[u8; 3]> {
        self.codes
    }
}

/// Time since the board was last heard from.
#[derive(Debug, Clone, Copy)]
pub struct DataAge {
    last_packet: Option<Instant>,
}

impl DataAge {
    pub fn new() -> Self {
        Self { last_packet: None }
    }

    pub fn reset(&mut self) {
        self.last_packet = Some(Instant::now());
    }

    /// `None` until the first packet arrives.
    pub fn elapsed(&self) -> Option<Duration> {
        self.last_packet.map(|at| at.elapsed())
    }
}

impl Default for DataAge {
    fn default() -> Self {
        Self::new()
    }
}
