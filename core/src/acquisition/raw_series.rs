use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::processing::RawData;
use crate::protocol::ResultPacket;

/// One recorded sample as received from the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    pub sequence: u16,
    pub time_ms: u16,
    pub force: u32,
    pub pressure: u32,
}

impl From<ResultPacket> for RawSample {
    fn from(packet: ResultPacket) -> Self {
        Self {
            sequence: packet.sequence,
            time_ms: packet.time_ms,
            force: packet.force,
            pressure: packet.pressure,
        }
    }
}

/// Append-only samples keyed by sequence number, iterated in sequence order.
#[derive(Debug, Clone, Default)]
pub struct RawSeries {
    samples: BTreeMap<u16, RawSample>,
}

impl RawSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` and keeps the stored sample when the sequence number is
    /// already present.
    pub fn insert(&mut self, sample: RawSample) -> bool {
        if self.samples.contains_key(&sample.sequence) {
            return false;
        }
        self.samples.insert(sample.sequence, sample);
        true
    }

    pub fn get(&self, sequence: u16) -> Option<&RawSample> {
        self.samples.get(&sequence)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn max_sequence(&self) -> Option<u16> {
        self.samples.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawSample> {
        self.samples.values()
    }

    /// Column copy in sequence order, safe to hand to processing.
    pub fn snapshot(&self) -> RawData {
        let mut raw = RawData::default();
        for sample in self.samples.values() {
            raw.push(
                f64::from(sample.time_ms),
                f64::from(sample.force),
                f64::from(sample.pressure),
            );
        }
        raw
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
