use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;

use super::device::SerialDevice;
use crate::prelude::{TransportError, TransportResult};
use crate::protocol::{encode_frame, FrameDecoder, InboundPacket, OutboundPacket};
use crate::telemetry::{LogManager, Metrics, MetricsRecorder};

const READ_CHUNK: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Link parameters for one serial transport.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub baud_rate: u32,
    /// Copies queued per logical outbound packet; the link has no acknowledgements.
    pub resend_count: usize,
    /// Sleep between polls when there is nothing to read or write.
    pub idle_poll: Duration,
    pub read_timeout: Duration,
    /// Upper bound on waiting for a previous worker to release the same port.
    pub reconnect_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            resend_count: 5,
            idle_poll: Duration::from_millis(2),
            read_timeout: Duration::from_millis(10),
            reconnect_timeout: Duration::from_secs(2),
        }
    }
}

/// Raw wire frames waiting to be written. Shared by callers (enqueue) and the
/// worker (dequeue).
#[derive(Debug, Clone, Default)]
pub struct OutboundQueue {
    frames: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl OutboundQueue {
    pub fn push_copies(&self, wire: Vec<u8>, copies: usize) {
        let mut frames = lock(&self.frames);
        for _ in 0..copies {
            frames.push_back(wire.clone());
        }
    }

    pub fn pop(&self) -> Option<Vec<u8>> {
        lock(&self.frames).pop_front()
    }

    /// Drops every pending frame, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut frames = lock(&self.frames);
        let dropped = frames.len();
        frames.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        lock(&self.frames).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Termination signal raised by a worker once it has released its device.
#[derive(Debug, Default)]
struct WorkerExit {
    closed: Mutex<bool>,
    signal: Condvar,
}

impl WorkerExit {
    fn mark_closed(&self) {
        *lock(&self.closed) = true;
        self.signal.notify_all();
    }

    fn is_closed(&self) -> bool {
        *lock(&self.closed)
    }

    /// Waits up to `timeout` for the worker to close. Returns whether it did.
    fn wait_closed(&self, timeout: Duration) -> bool {
        let guard = lock(&self.closed);
        match self
            .signal
            .wait_timeout_while(guard, timeout, |closed| !*closed)
        {
            Ok((closed, _)) => *closed,
            Err(poisoned) => *poisoned.into_inner().0,
        }
    }
}

struct Worker {
    port: String,
    running: Arc<AtomicBool>,
    exit: Arc<WorkerExit>,
    handle: Option<JoinHandle<()>>,
}

/// Everything the background loop needs, moved onto its thread.
struct WorkerContext {
    running: Arc<AtomicBool>,
    exit: Arc<WorkerExit>,
    queue: OutboundQueue,
    packets: mpsc::UnboundedSender<InboundPacket>,
    metrics: Arc<MetricsRecorder>,
    idle_poll: Duration,
    logger: LogManager,
}

impl WorkerContext {
    fn run(self, mut device: Box<dyn SerialDevice>) {
        let mut decoder = FrameDecoder::new();
        let mut buffer = [0u8; READ_CHUNK];

        while self.running.load(Ordering::Acquire) {
            // Pending output is written before anything else is read.
            if let Some(wire) = self.queue.pop() {
                match device.write_all(&wire) {
                    Ok(()) => self.metrics.record_written(wire.len()),
                    Err(err) => self.logger.warn(&format!("write failed: {}", err)),
                }
                continue;
            }

            let available = match device.bytes_available() {
                Ok(count) => count,
                Err(err) => {
                    self.logger.warn(&format!("serial device lost: {}", err));
                    break;
                }
            };
            if available == 0 {
                thread::sleep(self.idle_poll);
                continue;
            }

            let len = available.min(buffer.len());
            match device.read(&mut buffer[..len]) {
                Ok(count) => {
                    for &byte in &buffer[..count] {
                        self.handle_byte(&mut decoder, byte);
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {}
                Err(err) => {
                    self.logger.warn(&format!("serial read failed: {}", err));
                    break;
                }
            }
        }

        self.running.store(false, Ordering::Release);
        drop(device);
        self.exit.mark_closed();
        self.logger.record("serial worker closed");
    }

    fn handle_byte(&self, decoder: &mut FrameDecoder, byte: u8) {
        match decoder.push(byte) {
            Some(Ok(packet)) => {
                self.metrics.record_decoded();
                self.logger.detail(&format!("received {} packet", packet.name()));
                if self.packets.send(packet).is_err() {
                    self.logger.detail("packet receiver dropped");
                }
            }
            Some(Err(err)) => {
                self.metrics.record_rejected();
                self.logger.warn(&format!("dropping frame: {}", err));
            }
            None => {}
        }
    }
}

/// Anything that can deliver commands to the stand and be shut down.
pub trait CommandLink: Send {
    fn send(&self, packet: OutboundPacket);
    fn clear_output(&self);
    fn stop(&self);
}

/// Owns one serial device at a time: frames inbound bytes on a background
/// worker and writes queued outbound frames.
pub struct SerialTransport {
    settings: TransportSettings,
    queue: OutboundQueue,
    packets: mpsc::UnboundedSender<InboundPacket>,
    metrics: Arc<MetricsRecorder>,
    worker: Mutex<Option<Worker>>,
    logger: LogManager,
}

impl SerialTransport {
    pub fn new(settings: TransportSettings, packets: mpsc::UnboundedSender<InboundPacket>) -> Self {
        Self {
            settings,
            queue: OutboundQueue::default(),
            packets,
            metrics: Arc::new(MetricsRecorder::new()),
            worker: Mutex::new(None),
            logger: LogManager::new("transport"),
        }
    }

    /// Builds a transport together with the receiver its decoded packets arrive on.
    pub fn channel(settings: TransportSettings) -> (Self, mpsc::UnboundedReceiver<InboundPacket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(settings, tx), rx)
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// Opens `port` and starts the background loop on it.
    pub fn connect(&self, port: &str) -> TransportResult<()> {
        self.release_previous(port)?;
        let device = serialport::new(port, self.settings.baud_rate)
            .timeout(self.settings.read_timeout)
            .open()
            .map_err(|source| TransportError::DeviceUnavailable {
                port: port.to_string(),
                source,
            })?;
        self.logger
            .record(&format!("opened {} at {} baud", port, self.settings.baud_rate));
        self.spawn_worker(port, Box::new(device))
    }

    /// Starts the background loop on an already opened device.
    pub fn connect_device<D>(&self, port: &str, device: D) -> TransportResult<()>
    where
        D: SerialDevice + 'static,
    {
        self.release_previous(port)?;
        self.spawn_worker(port, Box::new(device))
    }

    fn release_previous(&self, port: &str) -> TransportResult<()> {
        let previous = lock(&self.worker).take();
        let Some(mut previous) = previous else {
            return Ok(());
        };

        previous.running.store(false, Ordering::Release);
        if previous.port != port {
            // A different device is not contended; the old loop winds down on its own.
            return Ok(());
        }

        self.logger
            .record(&format!("waiting for {} to close before reopening", port));
        if !previous.exit.wait_closed(self.settings.reconnect_timeout) {
            // Keep the handle so a later connect can still wait on this worker.
            *lock(&self.worker) = Some(previous);
            return Err(TransportError::PortBusy(port.to_string()));
        }
        if let Some(handle) = previous.handle.take() {
            if handle.join().is_err() {
                self.logger.warn("previous serial worker panicked");
            }
        }
        Ok(())
    }

    fn spawn_worker(&self, port: &str, device: Box<dyn SerialDevice>) -> TransportResult<()> {
        let running = Arc::new(AtomicBool::new(true));
        let exit = Arc::new(WorkerExit::default());
        let context = WorkerContext {
            running: running.clone(),
            exit: exit.clone(),
            queue: self.queue.clone(),
            packets: self.packets.clone(),
            metrics: self.metrics.clone(),
            idle_poll: self.settings.idle_poll,
            logger: self.logger,
        };

        let handle = thread::Builder::new()
            .name(format!("rmts-serial-{}", port))
            .spawn(move || context.run(device))?;

        *lock(&self.worker) = Some(Worker {
            port: port.to_string(),
            running,
            exit,
            handle: Some(handle),
        });
        Ok(())
    }

    /// Asks the worker to exit after its current iteration.
    pub fn stop(&self) {
        if let Some(worker) = lock(&self.worker).as_ref() {
            worker.running.store(false, Ordering::Release);
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .map(|worker| worker.running.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// True once the worker has released its device, or if none was started.
    pub fn is_closed(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .map(|worker| worker.exit.is_closed())
            .unwrap_or(true)
    }

    /// Waits up to `timeout` for the current worker to release its device.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        let exit = lock(&self.worker).as_ref().map(|worker| worker.exit.clone());
        exit.map(|exit| exit.wait_closed(timeout)).unwrap_or(true)
    }

    pub fn port(&self) -> Option<String> {
        lock(&self.worker).as_ref().map(|worker| worker.port.clone())
    }

    /// Queues `resend_count` independent copies of the packet.
    pub fn send_packet(&self, packet: OutboundPacket) {
        let wire = encode_frame(&packet.to_frame());
        self.queue.push_copies(wire, self.settings.resend_count);
        self.logger.detail(&format!(
            "queued {:?} x{}",
            packet, self.settings.resend_count
        ));
    }

    pub fn clear_output_buffer(&self) -> usize {
        let dropped = self.queue.clear();
        if dropped > 0 {
            self.logger
                .detail(&format!("cleared {} pending frames", dropped));
        }
        dropped
    }

    pub fn pending_output(&self) -> usize {
        self.queue.len()
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }
}

impl CommandLink for SerialTransport {
    fn send(&self, packet: OutboundPacket) {
        self.send_packet(packet);
    }

    fn clear_output(&self) {
        self.clear_output_buffer();
    }

    fn stop(&self) {
        SerialTransport::stop(self);
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::{ResultPacket, SetupPacket, VersionPacket};
    use crate::transport::device::MemoryDevice;
    use std::time::Instant;

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    fn recv_within(
        rx: &mut mpsc::UnboundedReceiver<InboundPacket>,
        timeout: Duration,
    ) -> Option<InboundPacket> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(packet) = rx.try_recv() {
                return Some(packet);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn queues_resend_copies_and_clears_them() {
        let (transport, _rx) = SerialTransport::channel(TransportSettings::default());
        transport.send_packet(OutboundPacket::Fire { duration_ms: 1000 });
        transport.send_packet(OutboundPacket::Stop);
        assert_eq!(transport.pending_output(), 10);
        assert_eq!(transport.clear_output_buffer(), 10);
        assert_eq!(transport.pending_output(), 0);
    }

    #[test]
    fn worker_writes_every_copy() {
        let (transport, _rx) = SerialTransport::channel(TransportSettings::default());
        let (device, handle) = MemoryDevice::new();
        transport.connect_device("mem0", device).unwrap();

        transport.send(OutboundPacket::Stop);
        let wire = encode_frame(&OutboundPacket::Stop.to_frame());
        let expected: Vec<u8> = wire.iter().copied().cycle().take(wire.len() * 5).collect();
        assert!(wait_until(Duration::from_secs(2), || handle.written()
            == expected));
        assert_eq!(transport.metrics().bytes_written, expected.len());
        transport.stop();
    }

    #[test]
    fn pending_output_is_written_before_reading() {
        let (transport, mut rx) = SerialTransport::channel(TransportSettings::default());
        let (device, handle) = MemoryDevice::new();
        let version = InboundPacket::Version(VersionPacket {
            firmware_version: 5,
            hardware_version: 2,
        });
        handle.inject(&encode_frame(&version.to_frame()));
        transport.send(OutboundPacket::Fire { duration_ms: 1500 });

        transport.connect_device("mem0", device).unwrap();
        assert_eq!(recv_within(&mut rx, Duration::from_secs(2)), Some(version));

        let wire = encode_frame(&OutboundPacket::Fire { duration_ms: 1500 }.to_frame());
        let burst: Vec<u8> = wire.iter().copied().cycle().take(wire.len() * 5).collect();
        assert_eq!(handle.written(), burst);
        assert_eq!(transport.pending_output(), 0);
        transport.stop();
    }

    #[test]
    fn delivers_packets_in_framing_order() {
        let (transport, mut rx) = SerialTransport::channel(TransportSettings::default());
        let (device, handle) = MemoryDevice::new();
        transport.connect_device("mem0", device).unwrap();

        let packets = [
            InboundPacket::Version(VersionPacket {
                firmware_version: 5,
                hardware_version: 2,
            }),
            InboundPacket::Setup(SetupPacket {
                force: 0xAA11BB,
                pressure: 17,
                continuity: true,
            }),
            InboundPacket::Result(ResultPacket {
                sequence: 3,
                time_ms: 30,
                force: 1,
                pressure: 2,
            }),
        ];
        let mut wire = vec![0x42, 0x00];
        for packet in &packets {
            wire.extend(encode_frame(&packet.to_frame()));
        }
        handle.inject(&wire);

        for expected in packets {
            assert_eq!(recv_within(&mut rx, Duration::from_secs(2)), Some(expected));
        }
        assert!(wait_until(Duration::from_secs(1), || transport
            .metrics()
            .frames_decoded
            == 3));
        transport.stop();
    }

    #[test]
    fn corrupt_frames_are_counted_not_delivered() {
        let (transport, mut rx) = SerialTransport::channel(TransportSettings::default());
        let (device, handle) = MemoryDevice::new();
        transport.connect_device("mem0", device).unwrap();

        let packet = InboundPacket::Version(VersionPacket {
            firmware_version: 5,
            hardware_version: 3,
        });
        let mut corrupt = encode_frame(&packet.to_frame());
        let last = corrupt.len() - 1;
        corrupt[last] = corrupt[last].wrapping_add(1);
        handle.inject(&corrupt);
        handle.inject(&encode_frame(&packet.to_frame()));

        assert_eq!(recv_within(&mut rx, Duration::from_secs(2)), Some(packet));
        assert_eq!(transport.metrics().frames_rejected, 1);
        transport.stop();
    }

    #[test]
    fn stop_releases_device() {
        let (transport, _rx) = SerialTransport::channel(TransportSettings::default());
        let (device, handle) = MemoryDevice::new();
        transport.connect_device("mem0", device).unwrap();
        assert!(transport.is_running());

        transport.stop();
        assert!(transport.wait_closed(Duration::from_secs(2)));
        assert!(transport.is_closed());
        assert!(handle.is_released());
    }

    #[test]
    fn reconnecting_same_port_waits_for_previous_worker() {
        let (transport, _rx) = SerialTransport::channel(TransportSettings::default());
        let (first, first_handle) = MemoryDevice::new();
        let (second, second_handle) = MemoryDevice::new();

        transport.connect_device("mem0", first).unwrap();
        transport.connect_device("mem0", second).unwrap();

        assert!(first_handle.is_released());
        assert!(!second_handle.is_released());
        assert!(transport.is_running());
        transport.stop();
        assert!(transport.wait_closed(Duration::from_secs(2)));
    }

    /// Never has input, and takes a while to notice that.
    struct SlowDevice;

    impl SerialDevice for SlowDevice {
        fn bytes_available(&mut self) -> std::io::Result<usize> {
            thread::sleep(Duration::from_millis(300));
            Ok(0)
        }

        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn write_all(&mut self, _buf: &[u8]) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn busy_port_keeps_previous_worker() {
        let settings = TransportSettings {
            reconnect_timeout: Duration::from_millis(20),
            ..TransportSettings::default()
        };
        let (transport, _rx) = SerialTransport::channel(settings);
        transport.connect_device("mem0", SlowDevice).unwrap();
        thread::sleep(Duration::from_millis(10));

        let (second, second_handle) = MemoryDevice::new();
        let err = transport.connect_device("mem0", second).unwrap_err();
        assert!(matches!(err, TransportError::PortBusy(_)));
        assert_eq!(transport.port().as_deref(), Some("mem0"));
        assert!(second_handle.is_released());

        assert!(transport.wait_closed(Duration::from_secs(2)));
        let (third, third_handle) = MemoryDevice::new();
        transport.connect_device("mem0", third).unwrap();
        assert!(!third_handle.is_released());
        transport.stop();
    }

    #[test]
    fn reconnecting_other_port_does_not_wait() {
        let (transport, _rx) = SerialTransport::channel(TransportSettings::default());
        let (first, first_handle) = MemoryDevice::new();
        let (second, _second_handle) = MemoryDevice::new();

        transport.connect_device("mem0", first).unwrap();
        transport.connect_device("mem1", second).unwrap();
        assert_eq!(transport.port().as_deref(), Some("mem1"));
        assert!(wait_until(Duration::from_secs(2), || first_handle
            .is_released()));
        transport.stop();
    }

    #[test]
    fn missing_device_is_fatal_to_connect() {
        let (transport, _rx) = SerialTransport::channel(TransportSettings::default());
        let err = transport
            .connect("/dev/rmts-no-such-port")
            .unwrap_err();
        assert!(matches!(err, TransportError::DeviceUnavailable { .. }));
        assert!(transport.is_closed());
    }
}
