use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

/// Minimal byte-oriented view of a serial device used by the transport worker.
pub trait SerialDevice: Send {
    /// Number of received bytes that can be read without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
}

impl SerialDevice for Box<dyn serialport::SerialPort> {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.bytes_to_read()
            .map(|count| count as usize)
            .map_err(io::Error::from)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        Write::write_all(self, buf)?;
        Write::flush(self)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    dropped: bool,
}

/// In-memory serial device: bytes injected through its [`MemoryDeviceHandle`]
/// are read by the transport, and everything the transport writes is kept.
#[derive(Debug)]
pub struct MemoryDevice {
    state: Arc<Mutex<MemoryState>>,
}

/// Test-side handle onto a [`MemoryDevice`] owned by a transport worker.
#[derive(Debug, Clone)]
pub struct MemoryDeviceHandle {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDevice {
    pub fn new() -> (Self, MemoryDeviceHandle) {
        let state = Arc::new(Mutex::new(MemoryState::default()));
        (
            Self {
                state: state.clone(),
            },
            MemoryDeviceHandle { state },
        )
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl SerialDevice for MemoryDevice {
    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.with_state(|state| state.inbound.len()))
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.with_state(|state| {
            let count = buf.len().min(state.inbound.len());
            for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..count)) {
                *slot = byte;
            }
            count
        }))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.with_state(|state| state.written.extend_from_slice(buf));
        Ok(())
    }
}

impl Drop for MemoryDevice {
    fn drop(&mut self) {
        self.with_state(|state| state.dropped = true);
    }
}

impl MemoryDeviceHandle {
    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn inject(&self, bytes: &[u8]) {
        self.with_state(|state| state.inbound.extend(bytes.iter().copied()));
    }

    pub fn written(&self) -> Vec<u8> {
        self.with_state(|state| state.written.clone())
    }

    pub fn pending_inbound(&self) -> usize {
        self.with_state(|state| state.inbound.len())
    }

    /// Whether the owning transport has released the device.
    pub fn is_released(&self) -> bool {
        self.with_state(|state| state.dropped)
    }
}
