use serde::Serialize;

use crate::math::linear_regression;
use crate::prelude::CalibrationError;
use crate::processing::{Converter, LowPassFilter, TransducerKind};
use crate::protocol::{InboundPacket, OutboundPacket};
use crate::telemetry::LogManager;
use crate::transport::{CommandLink, SerialTransport};

pub const CALIBRATION_FILTER_LEN: usize = 25;
pub const MIN_CALIBRATION_POINTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationPoint {
    pub raw_reading: f64,
    pub real_value: Option<f64>,
}

impl CalibrationPoint {
    pub fn is_complete(&self) -> bool {
        self.real_value.is_some()
    }
}

/// Regression-derived converter awaiting operator approval.
#[derive(Debug, Clone, PartialEq)]
pub struct ConverterCandidate {
    pub converter: Converter,
    /// Correlation coefficient of the fit.
    pub r: f64,
}

/// Operator-driven calibration of a single transducer against known loads.
pub struct CalibrationSession<L: CommandLink = SerialTransport> {
    link: L,
    kind: TransducerKind,
    name: String,
    filter: LowPassFilter,
    points: Vec<CalibrationPoint>,
    active: bool,
    logger: LogManager,
}

impl<L: CommandLink> CalibrationSession<L> {
    pub fn new(link: L, kind: TransducerKind, name: impl Into<String>) -> Self {
        Self {
            link,
            kind,
            name: name.into(),
            filter: LowPassFilter::new(CALIBRATION_FILTER_LEN),
            points: Vec::new(),
            active: false,
            logger: LogManager::new("calibration"),
        }
    }

    /// Puts the stand into calibration mode.
    pub fn start(&mut self) {
        if !self.active {
            self.active = true;
            self.link.send(OutboundPacket::CalStart);
            self.logger
                .record(&format!("calibrating {} ({})", self.name, self.kind.label()));
        }
    }

    /// Leaves calibration mode and releases the link.
    pub fn close(&mut self) {
        if self.active {
            self.active = false;
            self.link.send(OutboundPacket::CalStop);
        }
        self.link.stop();
    }

    pub fn kind(&self) -> TransducerKind {
        self.kind
    }

    /// Feeds the reading of the channel under calibration through the filter.
    /// Returns the filtered raw value when the packet carried one.
    pub fn handle_packet(&mut self, packet: InboundPacket) -> Option<f64> {
        let InboundPacket::Setup(setup) = packet else {
            return None;
        };
        let counts = match self.kind {
            TransducerKind::LoadCell => setup.force,
            TransducerKind::PressureTransducer => setup.pressure,
        };
        Some(self.filter.add(f64::from(counts)))
    }

    pub fn reading(&self) -> Option<f64> {
        self.filter.value()
    }

    /// Records the current filtered reading as a new point and returns its index.
    pub fn capture(&mut self) -> Result<usize, CalibrationError> {
        let raw_reading = self.filter.value().ok_or(CalibrationError::NoReading)?;
        self.points.push(CalibrationPoint {
            raw_reading,
            real_value: None,
        });
        self.logger.detail(&format!("captured raw {:.1}", raw_reading));
        Ok(self.points.len() - 1)
    }

    pub fn set_real(&mut self, index: usize, value: Option<f64>) -> Result<(), CalibrationError> {
        let point = self
            .points
            .get_mut(index)
            .ok_or(CalibrationError::InvalidIndex(index))?;
        point.real_value = value;
        Ok(())
    }

    pub fn delete(&mut self, index: usize) -> Result<CalibrationPoint, CalibrationError> {
        if index >= self.points.len() {
            return Err(CalibrationError::InvalidIndex(index));
        }
        Ok(self.points.remove(index))
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    /// Least-squares converter over the complete points; `None` until at
    /// least three exist.
    pub fn candidate(&self) -> Option<ConverterCandidate> {
        let (raw, real): (Vec<f64>, Vec<f64>) = self
            .points
            .iter()
            .filter_map(|p| p.real_value.map(|real| (p.raw_reading, real)))
            .unzip();
        if raw.len() < MIN_CALIBRATION_POINTS {
            return None;
        }
        match linear_regression(&raw, &real, MIN_CALIBRATION_POINTS) {
            Ok(fit) => Some(ConverterCandidate {
                converter: Converter::new(self.name.clone(), self.kind, fit.slope, fit.intercept),
                r: fit.r,
            }),
            Err(err) => {
                self.logger.warn(&format!("calibration fit unavailable: {}", err));
                None
            }
        }
    }
}

impl<L: CommandLink> Drop for CalibrationSession<L> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SetupPacket;
    use approx::assert_relative_eq;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingLink {
        sent: Arc<Mutex<Vec<OutboundPacket>>>,
        stopped: Arc<Mutex<usize>>,
    }

    impl CommandLink for RecordingLink {
        fn send(&self, packet: OutboundPacket) {
            self.sent.lock().unwrap().push(packet);
        }

        fn clear_output(&self) {}

        fn stop(&self) {
            *self.stopped.lock().unwrap() += 1;
        }
    }

    fn setup(force: u32, pressure: u32) -> InboundPacket {
        InboundPacket::Setup(SetupPacket {
            force,
            pressure,
            continuity: false,
        })
    }

    /// Replaces the filter history with `counts` and captures it.
    fn capture_at(session: &mut CalibrationSession<RecordingLink>, counts: u32) -> usize {
        for _ in 0..CALIBRATION_FILTER_LEN {
            session.handle_packet(setup(counts, 0));
        }
        session.capture().unwrap()
    }

    #[test]
    fn recovers_linear_relation() {
        let link = RecordingLink::default();
        let mut session = CalibrationSession::new(link.clone(), TransducerKind::LoadCell, "cell");
        session.start();

        for raw in [100u32, 250, 400, 900] {
            let index = capture_at(&mut session, raw);
            session
                .set_real(index, Some(3.0 * f64::from(raw) + 7.0))
                .unwrap();
        }

        let candidate = session.candidate().unwrap();
        assert_relative_eq!(candidate.converter.ratio, 3.0, epsilon = 1e-9);
        assert_relative_eq!(candidate.converter.offset, 7.0, epsilon = 1e-6);
        assert_relative_eq!(candidate.r, 1.0, epsilon = 1e-12);
        assert_eq!(candidate.converter.kind, TransducerKind::LoadCell);

        drop(session);
        assert_eq!(
            *link.sent.lock().unwrap(),
            vec![OutboundPacket::CalStart, OutboundPacket::CalStop]
        );
        assert_eq!(*link.stopped.lock().unwrap(), 1);
    }

    #[test]
    fn candidate_needs_three_complete_points() {
        let mut session =
            CalibrationSession::new(RecordingLink::default(), TransducerKind::PressureTransducer, "pt");
        assert_eq!(session.capture(), Err(CalibrationError::NoReading));

        // Pressure channel is the one being filtered.
        session.handle_packet(setup(999, 40));
        assert_eq!(session.reading(), Some(40.0));

        let a = capture_at_pressure(&mut session, 10);
        let b = capture_at_pressure(&mut session, 20);
        let c = capture_at_pressure(&mut session, 30);
        session.set_real(a, Some(1.0)).unwrap();
        session.set_real(b, Some(2.0)).unwrap();
        assert!(session.candidate().is_none());

        session.set_real(c, Some(3.0)).unwrap();
        assert!(session.candidate().is_some());

        session.delete(b).unwrap();
        assert_eq!(session.points().len(), 2);
        assert!(session.candidate().is_none());
        assert_eq!(session.set_real(7, None), Err(CalibrationError::InvalidIndex(7)));
    }

    fn capture_at_pressure(session: &mut CalibrationSession<RecordingLink>, counts: u32) -> usize {
        for _ in 0..CALIBRATION_FILTER_LEN {
            session.handle_packet(setup(0, counts));
        }
        session.capture().unwrap()
    }
}
