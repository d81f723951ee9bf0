use std::collections::VecDeque;

/// Fixed-length moving average.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    capacity: usize,
    history: VecDeque<f64>,
}

impl LowPassFilter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            history: VecDeque::with_capacity(capacity),
        }
    }

    /// Adds a reading and returns the new average.
    pub fn add(&mut self, value: f64) -> f64 {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(value);
        self.history.iter().sum::<f64>() / self.history.len() as f64
    }

    pub fn value(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        Some(self.history.iter().sum::<f64>() / self.history.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
