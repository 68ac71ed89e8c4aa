//! Live-room message protocol codec.
//!
//! - [`packet`] - frame header layout, operation codes and protocol versions
//! - [`notification`] - body interpretation into [`DecodedEvent`]s

pub mod notification;
pub mod packet;

pub use notification::{
    DANMU_MSG_CMD, DecodedEvent, NotificationBatch, NotificationRecord, decode, decode_packet,
    split_documents,
};
pub use packet::{
    HEADER_LEN, LiveFramePacket, Operation, ProtocolVersion, encode, heartbeat_frame,
    join_room_frame,
};
