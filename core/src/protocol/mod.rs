pub mod board_errors;
pub mod framing;
pub mod packet;
pub mod versions;

pub use framing::{encode_frame, FrameDecoder, FramingState, ESCAPE, PREAMBLE};
pub use packet::{
    ErrorPacket, FiringPacket, Frame, InboundPacket, OutboundPacket, ResultPacket, SetupPacket,
    VersionPacket, BODY_LEN,
};
