//! One static-fire acquisition: version gate, live readings, result buffering
//! and incremental processing until the board has sent every sample.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

use super::board_info::{DataAge, ErrorCollector};
use super::raw_series::{RawSample, RawSeries};
use crate::prelude::{ProcessingError, SessionError};
use crate::processing::{Converter, LowPassFilter, MotorConfig, MotorResult, SignalProcessor};
use crate::protocol::{versions, InboundPacket, OutboundPacket, ResultPacket, VersionPacket};
use crate::telemetry::{LogManager, Metrics, MetricsRecorder};
use crate::transport::{CommandLink, SerialTransport};

/// The firmware sends results in ten interleaved passes.
pub const PACKET_STRIDE: u16 = 10;
/// Recordings always hold a whole number of these.
pub const RECORDING_BLOCK: usize = 64;
pub const LIVE_FILTER_LEN: usize = 25;
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionGate {
    AwaitingVersion,
    Accepted(VersionPacket),
    Rejected(VersionPacket),
}

/// Instantaneous transducer values for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveReading {
    pub force_counts: u32,
    pub pressure_counts: u32,
    /// Filtered, converted force; absent without a force converter.
    pub force: Option<f64>,
    pub pressure: Option<f64>,
    pub continuity: bool,
    /// Firing clock, only while the motor is burning.
    pub firing_time_ms: Option<u16>,
}

/// Notifications published in packet-arrival order.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    VersionAccepted(VersionPacket),
    VersionRejected { hardware: u8, firmware: u16 },
    Live(LiveReading),
    BoardErrors(Vec<String>),
    FullSizeKnown(usize),
    NewResult(Arc<MotorResult>),
    /// Raised once; the link has already been stopped.
    ResultsAvailable(Result<Arc<MotorResult>, ProcessingError>),
}

pub struct FiringSession<L: CommandLink = SerialTransport> {
    link: L,
    force_conv: Option<Converter>,
    pressure_conv: Option<Converter>,
    config: MotorConfig,
    gate: VersionGate,
    series: RawSeries,
    start_index: Option<u16>,
    last_remainder: Option<u16>,
    last_processed: usize,
    full_size: Option<usize>,
    complete: bool,
    closed: bool,
    latest: Option<Arc<MotorResult>>,
    errors: ErrorCollector,
    age: DataAge,
    force_filter: LowPassFilter,
    pressure_filter: LowPassFilter,
    events: broadcast::Sender<SessionEvent>,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl<L: CommandLink> FiringSession<L> {
    pub fn new(
        link: L,
        force_conv: Option<Converter>,
        pressure_conv: Option<Converter>,
        config: MotorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            link,
            force_conv,
            pressure_conv,
            config,
            gate: VersionGate::AwaitingVersion,
            series: RawSeries::new(),
            start_index: None,
            last_remainder: None,
            last_processed: 0,
            full_size: None,
            complete: false,
            closed: false,
            latest: None,
            errors: ErrorCollector::new(),
            age: DataAge::new(),
            force_filter: LowPassFilter::new(LIVE_FILTER_LEN),
            pressure_filter: LowPassFilter::new(LIVE_FILTER_LEN),
            events,
            metrics: MetricsRecorder::new(),
            logger: LogManager::new("firing"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn gate(&self) -> VersionGate {
        self.gate
    }

    pub fn start_index(&self) -> Option<u16> {
        self.start_index
    }

    pub fn full_size(&self) -> Option<usize> {
        self.full_size
    }

    pub fn received(&self) -> usize {
        self.series.len()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn latest_result(&self) -> Option<Arc<MotorResult>> {
        self.latest.clone()
    }

    pub fn data_age(&self) -> Option<Duration> {
        self.age.elapsed()
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }

    fn ensure_accepted(&self) -> Result<(), SessionError> {
        match self.gate {
            VersionGate::Accepted(_) => Ok(()),
            VersionGate::AwaitingVersion => Err(SessionError::AwaitingVersion),
            VersionGate::Rejected(version) => Err(SessionError::VersionRejected {
                hardware: version.hardware_version,
                firmware: version.firmware_version,
            }),
        }
    }

    /// Starts a new recording, discarding samples from any previous one.
    pub fn fire(&mut self, duration_ms: u16) -> Result<(), SessionError> {
        self.ensure_accepted()?;
        self.series.clear();
        self.start_index = None;
        self.last_remainder = None;
        self.last_processed = 0;
        self.full_size = None;
        self.complete = false;
        self.latest = None;
        self.logger
            .record(&format!("fire command issued ({} ms)", duration_ms));
        self.link.send(OutboundPacket::Fire { duration_ms });
        Ok(())
    }

    /// Cancels any queued commands and asks the stand to stop.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        self.ensure_accepted()?;
        self.link.clear_output();
        self.link.send(OutboundPacket::Stop);
        Ok(())
    }

    /// Releases the serial device. Further packets are ignored.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.link.stop();
        }
    }

    pub fn handle_packet(&mut self, packet: InboundPacket) {
        if self.closed {
            return;
        }
        match self.gate {
            VersionGate::Rejected(_) => return,
            VersionGate::AwaitingVersion => {
                if let InboundPacket::Version(version) = packet {
                    self.check_version(version);
                }
                return;
            }
            VersionGate::Accepted(_) => {}
        }

        self.age.reset();
        match packet {
            InboundPacket::Version(version) => {
                self.logger
                    .detail(&format!("repeated version packet {:?}", version));
            }
            InboundPacket::Setup(setup) => {
                self.report_errors([0, 0, 0]);
                let reading = self.live_reading(setup.force, setup.pressure, setup.continuity, None);
                self.publish(SessionEvent::Live(reading));
            }
            InboundPacket::Firing(firing) => {
                let reading = self.live_reading(
                    firing.force,
                    firing.pressure,
                    firing.continuity,
                    Some(firing.time_ms),
                );
                self.publish(SessionEvent::Live(reading));
            }
            InboundPacket::Error(error) => self.report_errors(error.error_codes()),
            InboundPacket::Result(result) => self.add_result(result),
        }
    }

    fn check_version(&mut self, version: VersionPacket) {
        if versions::is_supported(&version) {
            self.logger.record(&format!(
                "board accepted: hardware {}, firmware {}",
                versions::hardware_revision_name(version.hardware_version),
                versions::firmware_revision_name(version.firmware_version)
            ));
            self.gate = VersionGate::Accepted(version);
            self.publish(SessionEvent::VersionAccepted(version));
        } else {
            self.logger.warn(&format!(
                "unsupported device: hardware {}, firmware {}",
                versions::hardware_revision_name(version.hardware_version),
                versions::firmware_revision_name(version.firmware_version)
            ));
            self.gate = VersionGate::Rejected(version);
            self.publish(SessionEvent::VersionRejected {
                hardware: version.hardware_version,
                firmware: version.firmware_version,
            });
        }
    }

    fn report_errors(&mut self, codes: [u8; 3]) {
        if let Some(messages) = self.errors.check(codes) {
            self.logger.record(&format!("board errors: {:?}", codes));
            self.publish(SessionEvent::BoardErrors(messages));
        }
    }

    fn live_reading(
        &mut self,
        force_counts: u32,
        pressure_counts: u32,
        continuity: bool,
        firing_time_ms: Option<u16>,
    ) -> LiveReading {
        let force = match &self.force_conv {
            Some(conv) => Some(self.force_filter.add(conv.convert(f64::from(force_counts)))),
            None => None,
        };
        let pressure = match &self.pressure_conv {
            Some(conv) => Some(
                self.pressure_filter
                    .add(conv.convert(f64::from(pressure_counts))),
            ),
            None => None,
        };
        LiveReading {
            force_counts,
            pressure_counts,
            force,
            pressure,
            continuity,
            firing_time_ms,
        }
    }

    fn add_result(&mut self, packet: ResultPacket) {
        if self.complete {
            return;
        }
        if !packet.is_plausible() {
            self.logger.warn(&format!(
                "implausible sample seq {} (time {} ms, force {}, pressure {})",
                packet.sequence, packet.time_ms, packet.force, packet.pressure
            ));
        }
        if !self.series.insert(RawSample::from(packet)) {
            return;
        }

        let sequence = packet.sequence;
        let remainder = sequence % PACKET_STRIDE;
        let Some(start) = self.start_index else {
            self.start_index = Some(sequence);
            self.last_remainder = Some(remainder);
            return;
        };

        if self.full_size.is_some_and(|full| self.series.len() >= full) {
            self.finish();
            return;
        }

        let near_start = sequence.abs_diff(start) < PACKET_STRIDE;
        let new_pass = self.last_remainder != Some(remainder);
        if near_start && new_pass && self.series.len() > self.last_processed {
            if self.full_size.is_none() {
                let full = self.infer_full_size();
                self.full_size = Some(full);
                self.logger
                    .record(&format!("recording holds {} samples", full));
                self.publish(SessionEvent::FullSizeKnown(full));
            }
            if let Ok(result) = self.run_pass() {
                self.publish(SessionEvent::NewResult(result));
            }
            self.last_processed = self.series.len();
            self.last_remainder = Some(remainder);
        }
    }

    fn infer_full_size(&self) -> usize {
        let max_sequence = usize::from(self.series.max_sequence().unwrap_or(0));
        let blocks = (max_sequence + RECORDING_BLOCK - 1) / RECORDING_BLOCK;
        blocks.max(1) * RECORDING_BLOCK
    }

    fn run_pass(&mut self) -> Result<Arc<MotorResult>, ProcessingError> {
        self.metrics.record_processing_pass();
        let raw = self.series.snapshot();
        match SignalProcessor::process(
            &raw,
            self.force_conv.as_ref(),
            self.pressure_conv.as_ref(),
            &self.config,
        ) {
            Ok(result) => {
                let result = Arc::new(result);
                self.latest = Some(result.clone());
                Ok(result)
            }
            Err(err) => {
                self.logger.warn(&format!(
                    "processing {} samples failed: {}",
                    raw.len(),
                    err
                ));
                Err(err)
            }
        }
    }

    fn finish(&mut self) {
        let outcome = self.run_pass();
        self.last_processed = self.series.len();
        self.complete = true;
        self.link.stop();
        self.logger.record(&format!(
            "acquisition complete with {} samples",
            self.series.len()
        ));
        self.publish(SessionEvent::ResultsAvailable(outcome));
    }

    fn publish(&self, event: SessionEvent) {
        // Sending only fails when nobody is subscribed.
        let _ = self.events.send(event);
    }
}

impl<L: CommandLink> Drop for FiringSession<L> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::TransducerKind;
    use crate::protocol::{ErrorPacket, FiringPacket, SetupPacket};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Send(OutboundPacket),
        Clear,
        Stop,
    }

    #[derive(Clone, Default)]
    struct RecordingLink {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl RecordingLink {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn stops(&self) -> usize {
            self.calls().iter().filter(|c| **c == Call::Stop).count()
        }
    }

    impl CommandLink for RecordingLink {
        fn send(&self, packet: OutboundPacket) {
            self.calls.lock().unwrap().push(Call::Send(packet));
        }

        fn clear_output(&self) {
            self.calls.lock().unwrap().push(Call::Clear);
        }

        fn stop(&self) {
            self.calls.lock().unwrap().push(Call::Stop);
        }
    }

    fn version(hardware_version: u8, firmware_version: u16) -> InboundPacket {
        InboundPacket::Version(VersionPacket {
            firmware_version,
            hardware_version,
        })
    }

    fn result(sequence: u16) -> InboundPacket {
        let force = if (20..40).contains(&sequence) {
            150_000
        } else {
            50_000
        };
        InboundPacket::Result(ResultPacket {
            sequence,
            time_ms: 10 + 6 * sequence + sequence / 2,
            force,
            pressure: 20_000,
        })
    }

    fn session() -> (FiringSession<RecordingLink>, RecordingLink) {
        let link = RecordingLink::default();
        let force = Converter::new("cell", TransducerKind::LoadCell, 0.01, -10.0);
        let session = FiringSession::new(link.clone(), Some(force), None, MotorConfig::default());
        (session, link)
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Firmware order: every tenth sample, then the next offset.
    fn stride_order(full_size: u16) -> Vec<u16> {
        (0..PACKET_STRIDE)
            .flat_map(|r| (r..full_size).step_by(usize::from(PACKET_STRIDE)))
            .collect()
    }

    #[test]
    fn unsupported_board_processes_nothing() {
        let (mut session, link) = session();
        let mut rx = session.subscribe();
        session.handle_packet(version(9, 5));
        for seq in 0..20 {
            session.handle_packet(result(seq));
        }
        session.handle_packet(InboundPacket::Error(ErrorPacket {
            storage_error: 1,
            adc_error: 0,
        }));
        session.handle_packet(InboundPacket::Setup(SetupPacket {
            force: 1,
            pressure: 2,
            continuity: true,
        }));

        assert_eq!(session.received(), 0);
        assert_eq!(session.data_age(), None);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            SessionEvent::VersionRejected {
                hardware: 9,
                firmware: 5
            }
        ));
        assert_eq!(
            session.fire(1000),
            Err(SessionError::VersionRejected {
                hardware: 9,
                firmware: 5
            })
        );
        assert!(link.calls().is_empty());
    }

    #[test]
    fn packets_before_version_are_discarded() {
        let (mut session, _link) = session();
        session.handle_packet(result(0));
        assert_eq!(session.fire(500), Err(SessionError::AwaitingVersion));
        assert_eq!(session.stop(), Err(SessionError::AwaitingVersion));
        session.handle_packet(version(3, 5));
        assert!(matches!(session.gate(), VersionGate::Accepted(_)));
        assert_eq!(session.received(), 0);
    }

    #[test]
    fn start_index_is_first_inserted_sample() {
        let (mut session, _link) = session();
        session.handle_packet(version(2, 5));
        for seq in [37, 5, 12, 37] {
            session.handle_packet(result(seq));
        }
        assert_eq!(session.start_index(), Some(37));
        assert_eq!(session.received(), 3);
    }

    #[test]
    fn full_recording_completes_once_and_stops_link() {
        let (mut session, link) = session();
        let mut rx = session.subscribe();
        session.handle_packet(version(2, 5));
        session.fire(2000).unwrap();

        for seq in stride_order(64) {
            session.handle_packet(result(seq));
        }
        // Late duplicates after completion change nothing.
        session.handle_packet(result(3));
        session.handle_packet(result(63));

        assert!(session.is_complete());
        assert_eq!(session.full_size(), Some(64));
        assert_eq!(link.stops(), 1);

        let events = drain(&mut rx);
        let full_sizes: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::FullSizeKnown(size) => Some(*size),
                _ => None,
            })
            .collect();
        assert_eq!(full_sizes, vec![64]);

        let finished: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::ResultsAvailable(outcome) => Some(outcome.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(finished.len(), 1);
        let result = finished[0].clone().unwrap();
        assert_eq!(result.num_datapoints(), 20);
        assert_eq!(result.raw().len(), 64);
        assert!(session.metrics().processing_passes >= 2);
        let latest = session.latest_result().unwrap();
        assert!(Arc::ptr_eq(&latest, &result));

        session.fire(2000).unwrap();
        assert!(session.latest_result().is_none());
        drop(session);
        assert_eq!(link.stops(), 2);
    }

    #[test]
    fn stop_clears_queue_before_sending() {
        let (mut session, link) = session();
        session.handle_packet(version(2, 5));
        session.fire(1500).unwrap();
        session.stop().unwrap();
        assert_eq!(
            link.calls(),
            vec![
                Call::Send(OutboundPacket::Fire { duration_ms: 1500 }),
                Call::Clear,
                Call::Send(OutboundPacket::Stop),
            ]
        );
    }

    #[test]
    fn live_readings_and_board_errors() {
        let (mut session, _link) = session();
        let mut rx = session.subscribe();
        session.handle_packet(version(2, 5));
        session.handle_packet(InboundPacket::Setup(SetupPacket {
            force: 2_000,
            pressure: 7,
            continuity: true,
        }));
        session.handle_packet(InboundPacket::Firing(FiringPacket {
            force: 4_000,
            pressure: 9,
            time_ms: 812,
            continuity: false,
        }));
        session.handle_packet(InboundPacket::Error(ErrorPacket {
            storage_error: 3,
            adc_error: 0,
        }));
        session.handle_packet(InboundPacket::Error(ErrorPacket {
            storage_error: 3,
            adc_error: 0,
        }));

        let events = drain(&mut rx);
        let lives: Vec<&LiveReading> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Live(reading) => Some(reading),
                _ => None,
            })
            .collect();
        assert_eq!(lives.len(), 2);
        assert_eq!(lives[0].force, Some(10.0));
        assert_eq!(lives[0].pressure, None);
        // Average of 10 N and 30 N.
        assert_eq!(lives[1].force, Some(20.0));
        assert_eq!(lives[1].firing_time_ms, Some(812));

        let error_reports: Vec<&Vec<String>> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::BoardErrors(messages) => Some(messages),
                _ => None,
            })
            .collect();
        assert_eq!(error_reports.len(), 2);
        assert_eq!(error_reports[1][0], "0.3: SD card full.");
        assert!(session.data_age().is_some());
    }
}
