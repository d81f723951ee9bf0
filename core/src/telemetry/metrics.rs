use std::sync::Mutex;

/// Counters shared between a transport worker and its owner.
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub frames_decoded: usize,
    pub frames_rejected: usize,
    pub bytes_written: usize,
    pub processing_passes: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_decoded(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.frames_decoded += 1;
        }
    }

    pub fn record_rejected(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.frames_rejected += 1;
        }
    }

    pub fn record_written(&self, bytes: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.bytes_written += bytes;
        }
    }

    pub fn record_processing_pass(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.processing_passes += 1;
        }
    }

    pub fn snapshot(&self) -> Metrics {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            Metrics::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_accumulates_counters() {
        let recorder = MetricsRecorder::new();
        recorder.record_decoded();
        recorder.record_decoded();
        recorder.record_rejected();
        recorder.record_written(14);
        recorder.record_written(14);

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.frames_decoded, 2);
        assert_eq!(snapshot.frames_rejected, 1);
        assert_eq!(snapshot.bytes_written, 28);
        assert_eq!(snapshot.processing_passes, 0);
    }
}
