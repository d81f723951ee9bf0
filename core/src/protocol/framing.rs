//! Byte-level framing for the radio link.
//!
//! On the wire every frame is `0xAA 0xBB` followed by the 12-byte body. Body
//! bytes that collide with a preamble byte or with the escape marker are
//! preceded by `0x11`.

use super::packet::{Frame, InboundPacket, BODY_LEN};
use crate::prelude::DecodeError;

pub const PREAMBLE: [u8; 2] = [0xAA, 0xBB];
pub const ESCAPE: u8 = 0x11;

fn needs_escape(byte: u8) -> bool {
    byte == ESCAPE || PREAMBLE.contains(&byte)
}

/// Produces the escaped wire bytes for one frame, preamble included.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let body = frame.to_body();
    let mut wire = Vec::with_capacity(PREAMBLE.len() + BODY_LEN * 2);
    wire.extend_from_slice(&PREAMBLE);
    for byte in body {
        if needs_escape(byte) {
            wire.push(ESCAPE);
        }
        wire.push(byte);
    }
    wire
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingState {
    Idle,
    InPreamble,
    InFrame,
}

/// Receive-side state machine turning a byte stream into decoded packets.
#[derive(Debug)]
pub struct FrameDecoder {
    state: FramingState,
    escape: bool,
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: FramingState::Idle,
            escape: false,
            buffer: Vec::with_capacity(BODY_LEN),
        }
    }

    pub fn state(&self) -> FramingState {
        self.state
    }

    /// Feeds one received byte. Returns a decode outcome each time a full
    /// 12-byte body has been collected.
    pub fn push(&mut self, byte: u8) -> Option<Result<InboundPacket, DecodeError>> {
        if self.escape {
            self.escape = false;
            return match self.state {
                FramingState::InFrame => self.append(byte),
                _ => {
                    self.state = FramingState::Idle;
                    None
                }
            };
        }

        if byte == ESCAPE {
            self.escape = true;
            if self.state == FramingState::InPreamble {
                self.state = FramingState::Idle;
            }
            return None;
        }

        if byte == PREAMBLE[0] {
            self.state = FramingState::InPreamble;
            return None;
        }

        if byte == PREAMBLE[1] && self.state == FramingState::InPreamble {
            self.state = FramingState::InFrame;
            self.buffer.clear();
            return None;
        }

        match self.state {
            FramingState::InFrame => self.append(byte),
            _ => {
                self.state = FramingState::Idle;
                None
            }
        }
    }

    /// Feeds a chunk of bytes, collecting every completed decode outcome in order.
    pub fn push_all(&mut self, bytes: &[u8]) -> Vec<Result<InboundPacket, DecodeError>> {
        bytes.iter().filter_map(|&byte| self.push(byte)).collect()
    }

    fn append(&mut self, byte: u8) -> Option<Result<InboundPacket, DecodeError>> {
        self.buffer.push(byte);
        if self.buffer.len() < BODY_LEN {
            return None;
        }
        self.state = FramingState::Idle;
        let outcome = InboundPacket::decode(&self.buffer);
        self.buffer.clear();
        Some(outcome)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::{
        ErrorPacket, FiringPacket, ResultPacket, SetupPacket, VersionPacket, PAYLOAD_LEN,
    };

    fn sample_packets() -> Vec<InboundPacket> {
        vec![
            InboundPacket::Setup(SetupPacket {
                force: 0xAABB11,
                pressure: 0x11AA00,
                continuity: true,
            }),
            InboundPacket::Error(ErrorPacket {
                storage_error: 0xAA,
                adc_error: 0x11,
            }),
            InboundPacket::Result(ResultPacket {
                sequence: 0xBBAA,
                time_ms: 0x1111,
                force: 0x00BB00,
                pressure: 42,
            }),
            InboundPacket::Version(VersionPacket {
                firmware_version: 5,
                hardware_version: 3,
            }),
            InboundPacket::Firing(FiringPacket {
                force: 7,
                pressure: 0xAAAAAA & 0x7FFFFF,
                time_ms: 0x11AA & FiringPacket::TIME_MASK,
                continuity: false,
            }),
        ]
    }

    #[test]
    fn escaped_stream_reproduces_packets() {
        let packets = sample_packets();
        let mut wire = Vec::new();
        for packet in &packets {
            wire.extend(encode_frame(&packet.to_frame()));
        }

        let mut decoder = FrameDecoder::new();
        let decoded: Vec<InboundPacket> = decoder
            .push_all(&wire)
            .into_iter()
            .map(|outcome| outcome.unwrap())
            .collect();
        assert_eq!(decoded, packets);
        assert_eq!(decoder.state(), FramingState::Idle);
    }

    #[test]
    fn escape_marker_is_never_buffered() {
        let frame = Frame::new(2, 0x1111, [ESCAPE; PAYLOAD_LEN]);
        let wire = encode_frame(&frame);
        assert!(wire.len() > PREAMBLE.len() + BODY_LEN);

        let mut decoder = FrameDecoder::new();
        let outcomes = decoder.push_all(&wire);
        assert_eq!(outcomes.len(), 1);
        let packet = outcomes[0].clone().unwrap();
        assert_eq!(packet.to_frame(), frame);
    }

    #[test]
    fn noise_before_preamble_is_ignored() {
        let packet = sample_packets()[3];
        let mut wire = vec![0x00, 0xBB, 0x42, 0xAA, 0x01];
        wire.extend(encode_frame(&packet.to_frame()));

        let mut decoder = FrameDecoder::new();
        let outcomes = decoder.push_all(&wire);
        assert_eq!(outcomes, vec![Ok(packet)]);
    }

    #[test]
    fn corrupt_frame_resets_and_next_frame_decodes() {
        let packet = sample_packets()[2];
        let mut corrupt = encode_frame(&packet.to_frame());
        let last = corrupt.len() - 1;
        corrupt[last] = corrupt[last].wrapping_add(1);
        if needs_escape(corrupt[last]) {
            corrupt[last] = corrupt[last].wrapping_add(1);
        }

        let mut wire = corrupt;
        wire.extend(encode_frame(&packet.to_frame()));

        let mut decoder = FrameDecoder::new();
        let outcomes = decoder.push_all(&wire);
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], Err(DecodeError::Checksum { .. })));
        assert_eq!(outcomes[1], Ok(packet));
    }

    #[test]
    fn unknown_type_is_reported_and_framing_resumes() {
        let bogus = Frame::new(77, 0, [1; PAYLOAD_LEN]);
        let good = sample_packets()[0];
        let mut wire = encode_frame(&bogus);
        wire.extend(encode_frame(&good.to_frame()));

        let mut decoder = FrameDecoder::new();
        let outcomes = decoder.push_all(&wire);
        assert_eq!(outcomes, vec![Err(DecodeError::UnknownType(77)), Ok(good)]);
    }

    #[test]
    fn unescaped_preamble_resynchronizes_mid_frame() {
        let packet = sample_packets()[3];
        let mut wire = vec![0xAA, 0xBB, 3, 0, 0];
        wire.extend(encode_frame(&packet.to_frame()));

        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push_all(&wire), vec![Ok(packet)]);
    }
}
