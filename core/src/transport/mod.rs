pub mod device;
pub mod serial;

pub use device::{MemoryDevice, MemoryDeviceHandle, SerialDevice};
pub use serial::{CommandLink, OutboundQueue, SerialTransport, TransportSettings};
