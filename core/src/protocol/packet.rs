use serde::{Deserialize, Serialize};

use crate::prelude::DecodeError;

/// Length of every frame body: type, checksum, two sequence bytes, eight payload bytes.
pub const BODY_LEN: usize = 12;
pub const PAYLOAD_LEN: usize = 8;

/// Largest count a 24-bit ADC channel can legitimately report.
pub const MAX_COUNTS: u32 = (1 << 23) - 1;

pub const SETUP_TYPE: u8 = 0;
pub const ERROR_TYPE: u8 = 1;
pub const RESULT_TYPE: u8 = 2;
pub const VERSION_TYPE: u8 = 3;
pub const FIRING_TYPE: u8 = 4;

pub const FIRE_OPCODE: u8 = 128;
pub const STOP_OPCODE: u8 = 129;
pub const CAL_START_OPCODE: u8 = 130;
pub const CAL_STOP_OPCODE: u8 = 131;

/// A checksummed 12-byte frame body before type-specific interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub kind: u8,
    pub sequence: u16,
    pub payload: [u8; PAYLOAD_LEN],
}

impl Frame {
    pub fn new(kind: u8, sequence: u16, payload: [u8; PAYLOAD_LEN]) -> Self {
        Self {
            kind,
            sequence,
            payload,
        }
    }

    /// Serializes the body, choosing the checksum so all 12 bytes sum to zero mod 256.
    pub fn to_body(&self) -> [u8; BODY_LEN] {
        let mut body = [0u8; BODY_LEN];
        body[0] = self.kind;
        body[2..4].copy_from_slice(&self.sequence.to_le_bytes());
        body[4..].copy_from_slice(&self.payload);
        body[1] = 0u8.wrapping_sub(byte_sum(&body));
        body
    }

    pub fn from_body(body: &[u8]) -> Result<Self, DecodeError> {
        if !is_valid_body(body) {
            if body.len() != BODY_LEN {
                return Err(DecodeError::Length {
                    expected: BODY_LEN,
                    got: body.len(),
                });
            }
            return Err(DecodeError::Checksum {
                sum: byte_sum(body),
            });
        }
        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&body[4..]);
        Ok(Self {
            kind: body[0],
            sequence: u16::from_le_bytes([body[2], body[3]]),
            payload,
        })
    }
}

pub fn byte_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// A body is valid iff it is exactly 12 bytes and its bytes sum to zero mod 256.
pub fn is_valid_body(body: &[u8]) -> bool {
    body.len() == BODY_LEN && byte_sum(body) == 0
}

fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn read_u24(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0])
}

fn write_u24(bytes: &mut [u8], value: u32) {
    bytes.copy_from_slice(&value.to_le_bytes()[..3]);
}

/// Live transducer readings sent while the stand is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupPacket {
    pub force: u32,
    pub pressure: u32,
    pub continuity: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPacket {
    pub storage_error: u8,
    pub adc_error: u8,
}

impl ErrorPacket {
    /// Per-device error codes in device order: storage, ADC, radio.
    pub fn error_codes(&self) -> [u8; 3] {
        [self.storage_error, self.adc_error, 0]
    }
}

/// One recorded sample, sent back after the firing completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPacket {
    pub sequence: u16,
    pub time_ms: u16,
    pub force: u32,
    pub pressure: u32,
}

impl ResultPacket {
    /// Whether the timestamp fits the firmware's sampling cadence and both
    /// channels lie in the ADC range.
    pub fn is_plausible(&self) -> bool {
        let seq = u32::from(self.sequence);
        let time = u32::from(self.time_ms);
        let timing_ok = 5 + 6 * seq < time && time < 15 + 7 * seq;
        timing_ok && self.force <= MAX_COUNTS && self.pressure <= MAX_COUNTS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPacket {
    pub firmware_version: u16,
    pub hardware_version: u8,
}

/// Live readings streamed while the motor is burning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiringPacket {
    pub force: u32,
    pub pressure: u32,
    /// 14-bit firing clock in milliseconds.
    pub time_ms: u16,
    pub continuity: bool,
}

impl FiringPacket {
    pub const TIME_MASK: u16 = 0x3FFF;
}

/// Every packet the stand controller can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboundPacket {
    Setup(SetupPacket),
    Error(ErrorPacket),
    Result(ResultPacket),
    Version(VersionPacket),
    Firing(FiringPacket),
}

impl InboundPacket {
    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        Self::from_frame(&Frame::from_body(body)?)
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, DecodeError> {
        let p = &frame.payload;
        let packet = match frame.kind {
            SETUP_TYPE => InboundPacket::Setup(SetupPacket {
                force: read_u24(&p[0..3]),
                pressure: read_u24(&p[3..6]),
                continuity: p[6] != 0,
            }),
            ERROR_TYPE => InboundPacket::Error(ErrorPacket {
                storage_error: p[0],
                adc_error: p[1],
            }),
            RESULT_TYPE => InboundPacket::Result(ResultPacket {
                sequence: frame.sequence,
                time_ms: read_u16(&p[0..2]),
                force: read_u24(&p[2..5]),
                pressure: read_u24(&p[5..8]),
            }),
            VERSION_TYPE => InboundPacket::Version(VersionPacket {
                firmware_version: read_u16(&p[0..2]),
                hardware_version: p[2],
            }),
            FIRING_TYPE => InboundPacket::Firing(FiringPacket {
                force: read_u24(&p[0..3]),
                pressure: read_u24(&p[3..6]),
                // Low 8 time bits in payload[6], upper 6 in bits 2..8 of payload[7].
                time_ms: u16::from(p[6]) | (u16::from(p[7] >> 2) << 8),
                continuity: p[7] & 0x01 != 0,
            }),
            other => return Err(DecodeError::UnknownType(other)),
        };
        Ok(packet)
    }

    /// Builds the frame the stand would transmit for this packet.
    pub fn to_frame(&self) -> Frame {
        let mut payload = [0u8; PAYLOAD_LEN];
        match self {
            InboundPacket::Setup(setup) => {
                write_u24(&mut payload[0..3], setup.force);
                write_u24(&mut payload[3..6], setup.pressure);
                payload[6] = u8::from(setup.continuity);
                Frame::new(SETUP_TYPE, 0, payload)
            }
            InboundPacket::Error(error) => {
                payload[0] = error.storage_error;
                payload[1] = error.adc_error;
                Frame::new(ERROR_TYPE, 0, payload)
            }
            InboundPacket::Result(result) => {
                payload[0..2].copy_from_slice(&result.time_ms.to_le_bytes());
                write_u24(&mut payload[2..5], result.force);
                write_u24(&mut payload[5..8], result.pressure);
                Frame::new(RESULT_TYPE, result.sequence, payload)
            }
            InboundPacket::Version(version) => {
                payload[0..2].copy_from_slice(&version.firmware_version.to_le_bytes());
                payload[2] = version.hardware_version;
                Frame::new(VERSION_TYPE, 0, payload)
            }
            InboundPacket::Firing(firing) => {
                write_u24(&mut payload[0..3], firing.force);
                write_u24(&mut payload[3..6], firing.pressure);
                let time = firing.time_ms & FiringPacket::TIME_MASK;
                payload[6] = (time & 0xFF) as u8;
                payload[7] = (((time >> 8) as u8) << 2) | u8::from(firing.continuity);
                Frame::new(FIRING_TYPE, 0, payload)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InboundPacket::Setup(_) => "setup",
            InboundPacket::Error(_) => "error",
            InboundPacket::Result(_) => "result",
            InboundPacket::Version(_) => "version",
            InboundPacket::Firing(_) => "firing",
        }
    }
}

/// Commands sent from the ground station to the stand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundPacket {
    Fire { duration_ms: u16 },
    Stop,
    CalStart,
    CalStop,
}

impl OutboundPacket {
    pub fn opcode(&self) -> u8 {
        match self {
            OutboundPacket::Fire { .. } => FIRE_OPCODE,
            OutboundPacket::Stop => STOP_OPCODE,
            OutboundPacket::CalStart => CAL_START_OPCODE,
            OutboundPacket::CalStop => CAL_STOP_OPCODE,
        }
    }

    pub fn to_frame(&self) -> Frame {
        let mut payload = [0u8; PAYLOAD_LEN];
        if let OutboundPacket::Fire { duration_ms } = self {
            // payload[0..2] held the recording duration, which firmware now ignores.
            payload[2..4].copy_from_slice(&duration_ms.to_le_bytes());
        }
        Frame::new(self.opcode(), 0, payload)
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, DecodeError> {
        match frame.kind {
            FIRE_OPCODE => Ok(OutboundPacket::Fire {
                duration_ms: read_u16(&frame.payload[2..4]),
            }),
            STOP_OPCODE => Ok(OutboundPacket::Stop),
            CAL_START_OPCODE => Ok(OutboundPacket::CalStart),
            CAL_STOP_OPCODE => Ok(OutboundPacket::CalStop),
            other => Err(DecodeError::UnknownType(other)),
        }
    }
}
