//! Live-room frame layout.
//!
//! Every frame starts with a 16-byte big-endian header:
//!
//! ```text
//! | packet len (4) | header len (2) | protocol version (2) | operation (4) | sequence (4) | body |
//! ```

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::CodecError;

/// Header length used by the current protocol revision.
pub const HEADER_LEN: u16 = 16;

/// Sequence id written into every outgoing frame. One connection carries one
/// logical stream so no multiplexing is needed.
pub const SEQUENCE_ID: u32 = 1;

/// Body encoding tag carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// Body is plain JSON text.
    PlainJson,
    /// Body is a raw big-endian u32 (heartbeat / viewer count).
    RawUint32,
    /// Body is zlib-compressed JSON text.
    ZlibJson,
}

impl ProtocolVersion {
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::PlainJson => 0,
            Self::RawUint32 => 1,
            Self::ZlibJson => 2,
        }
    }
}

impl TryFrom<u16> for ProtocolVersion {
    type Error = CodecError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::PlainJson),
            1 => Ok(Self::RawUint32),
            2 => Ok(Self::ZlibJson),
            other => Err(CodecError::UnsupportedProtocolVersion(other)),
        }
    }
}

/// Operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Heartbeat,
    HeartbeatReply,
    Notification,
    JoinRoom,
    JoinRoomReply,
    /// Any code we do not interpret; kept so the frame can be passed through.
    Other(u32),
}

impl Operation {
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Heartbeat => 2,
            Self::HeartbeatReply => 3,
            Self::Notification => 5,
            Self::JoinRoom => 7,
            Self::JoinRoomReply => 8,
            Self::Other(code) => code,
        }
    }
}

impl From<u32> for Operation {
    fn from(value: u32) -> Self {
        match value {
            2 => Self::Heartbeat,
            3 => Self::HeartbeatReply,
            5 => Self::Notification,
            7 => Self::JoinRoom,
            8 => Self::JoinRoomReply,
            other => Self::Other(other),
        }
    }
}

/// One wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveFramePacket {
    pub packet_len: u32,
    pub header_len: u16,
    /// Raw version tag. Unknown tags are only an error when the body needs
    /// interpreting, so the raw value is kept here.
    pub version: u16,
    pub operation: Operation,
    pub sequence: u32,
    pub body: Bytes,
}

impl LiveFramePacket {
    /// Build a frame around `body`, computing the total length.
    pub fn new(body: impl Into<Bytes>, operation: Operation, version: ProtocolVersion) -> Self {
        let body = body.into();
        Self {
            packet_len: u32::from(HEADER_LEN) + body.len() as u32,
            header_len: HEADER_LEN,
            version: version.as_u16(),
            operation,
            sequence: SEQUENCE_ID,
            body,
        }
    }

    /// Interpret the raw version tag.
    pub fn protocol_version(&self) -> Result<ProtocolVersion, CodecError> {
        ProtocolVersion::try_from(self.version)
    }

    /// Serialize header and body.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.header_len as usize + self.body.len());
        buf.put_u32(self.packet_len);
        buf.put_u16(self.header_len);
        buf.put_u16(self.version);
        buf.put_u32(self.operation.as_u32());
        buf.put_u32(self.sequence);
        // Pad if a future revision advertises a longer header.
        buf.resize(self.header_len.max(HEADER_LEN) as usize, 0);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// Parse one frame from `data`.
    ///
    /// The body is everything after the advertised header length.
    pub fn parse(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < HEADER_LEN as usize {
            return Err(CodecError::malformed_frame(format!(
                "expected at least {} bytes, got {}",
                HEADER_LEN,
                data.len()
            )));
        }

        let packet_len = BigEndian::read_u32(&data[0..4]);
        let header_len = BigEndian::read_u16(&data[4..6]);
        let version = BigEndian::read_u16(&data[6..8]);
        let operation = Operation::from(BigEndian::read_u32(&data[8..12]));
        let sequence = BigEndian::read_u32(&data[12..16]);

        if (header_len as usize) < HEADER_LEN as usize || header_len as usize > data.len() {
            return Err(CodecError::malformed_frame(format!(
                "invalid header length {} for {} byte frame",
                header_len,
                data.len()
            )));
        }

        Ok(Self {
            packet_len,
            header_len,
            version,
            operation,
            sequence,
            body: Bytes::copy_from_slice(&data[header_len as usize..]),
        })
    }
}

/// Encode `payload` into wire bytes.
pub fn encode(payload: &[u8], operation: Operation, version: ProtocolVersion) -> Bytes {
    LiveFramePacket::new(Bytes::copy_from_slice(payload), operation, version).to_bytes()
}

/// Body of the join-room request.
#[derive(Debug, Serialize)]
struct JoinRequest {
    platform: &'static str,
    roomid: u64,
}

/// Join-room frame for `room_id`, carried as plain JSON.
pub fn join_room_frame(room_id: u64) -> Bytes {
    let body = JoinRequest {
        platform: "web",
        roomid: room_id,
    };
    let json = serde_json::to_vec(&body).unwrap_or_default();
    encode(&json, Operation::JoinRoom, ProtocolVersion::PlainJson)
}

/// Heartbeat frame: empty body tagged as raw uint32.
pub fn heartbeat_frame() -> Bytes {
    encode(&[], Operation::Heartbeat, ProtocolVersion::RawUint32)
}
