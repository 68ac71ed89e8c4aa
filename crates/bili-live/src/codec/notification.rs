//! Notification body handling and typed frame decoding.
//!
//! A notification body may hold several JSON documents glued together with
//! runs of ASCII control bytes (the remains of nested packet headers after
//! inflating). The body is split on those runs and every fragment is decoded
//! on its own.

use std::io::Read;
use std::sync::LazyLock;

use byteorder::{BigEndian, ByteOrder};
use flate2::read::ZlibDecoder;
use regex::bytes::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::packet::{LiveFramePacket, Operation, ProtocolVersion};
use crate::error::CodecError;

/// Command tag of a chat message record.
pub const DANMU_MSG_CMD: &str = "DANMU_MSG";

/// Fragments shorter than this are separator leftovers, not documents.
pub const MIN_JSON_LEN: usize = 4;

static SEPARATOR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1f]+").expect("valid separator regex"));

/// One chat record extracted from a `DANMU_MSG` notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    /// Command tag of the record.
    pub cmd: String,
    /// Display name of the speaker.
    pub speaker: String,
    /// Message text.
    pub text: String,
}

/// Result of decoding one notification frame.
#[derive(Debug, Default)]
pub struct NotificationBatch {
    /// Chat records, in body order.
    pub records: Vec<NotificationRecord>,
    /// Records of other commands that were decoded and dropped.
    pub dropped: usize,
    /// Per-fragment / per-record failures. They never abort the batch.
    pub failures: Vec<CodecError>,
}

/// A decoded frame.
#[derive(Debug)]
pub enum DecodedEvent {
    RoomJoinAck,
    ViewerCount(u32),
    ChatNotification(NotificationBatch),
    /// Valid frame with an operation we do not interpret.
    Other(Operation),
}

#[derive(Debug, Deserialize)]
struct RawNotification {
    cmd: String,
    /// Only chat records need an array here; other commands use any shape.
    #[serde(default)]
    info: Option<Value>,
}

/// Decode raw wire bytes into a typed event.
pub fn decode(data: &[u8]) -> Result<DecodedEvent, CodecError> {
    let packet = LiveFramePacket::parse(data)?;
    decode_packet(&packet)
}

/// Interpret an already parsed frame.
pub fn decode_packet(packet: &LiveFramePacket) -> Result<DecodedEvent, CodecError> {
    match packet.operation {
        Operation::JoinRoomReply => Ok(DecodedEvent::RoomJoinAck),
        Operation::HeartbeatReply => decode_viewer_count(&packet.body).map(DecodedEvent::ViewerCount),
        Operation::Notification => {
            let text = notification_text(packet)?;
            Ok(DecodedEvent::ChatNotification(decode_notifications(&text)))
        }
        other => Ok(DecodedEvent::Other(other)),
    }
}

fn decode_viewer_count(body: &[u8]) -> Result<u32, CodecError> {
    if body.len() < 4 {
        return Err(CodecError::malformed_body(format!(
            "viewer count needs 4 bytes, got {}",
            body.len()
        )));
    }
    Ok(BigEndian::read_u32(&body[0..4]))
}

/// Raw (possibly inflated) text of a notification body.
fn notification_text(packet: &LiveFramePacket) -> Result<Vec<u8>, CodecError> {
    match packet.protocol_version()? {
        ProtocolVersion::PlainJson => Ok(packet.body.to_vec()),
        ProtocolVersion::ZlibJson => decompress_zlib(&packet.body),
        ProtocolVersion::RawUint32 => Err(CodecError::UnsupportedProtocolVersion(
            ProtocolVersion::RawUint32.as_u16(),
        )),
    }
}

/// Decompress zlib data.
fn decompress_zlib(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

/// Split a notification body into candidate JSON documents.
pub fn split_documents(text: &[u8]) -> Vec<&[u8]> {
    SEPARATOR_REGEX
        .split(text)
        .filter(|fragment| fragment.len() >= MIN_JSON_LEN)
        .collect()
}

/// Decode every document in `text`, keeping only chat records.
pub fn decode_notifications(text: &[u8]) -> NotificationBatch {
    let mut batch = NotificationBatch::default();

    for fragment in split_documents(text) {
        let raw: RawNotification = match serde_json::from_slice(fragment) {
            Ok(raw) => raw,
            Err(e) => {
                batch.failures.push(CodecError::Json(e));
                continue;
            }
        };

        if raw.cmd != DANMU_MSG_CMD {
            batch.dropped += 1;
            continue;
        }

        match parse_chat_record(&raw) {
            Ok(record) => batch.records.push(record),
            Err(e) => batch.failures.push(e),
        }
    }

    batch
}

/// Pull speaker and content out of the `info` array.
///
/// `info[1]` is the message text and `info[2][1]` the speaker's name.
fn parse_chat_record(raw: &RawNotification) -> Result<NotificationRecord, CodecError> {
    let info = raw
        .info
        .as_ref()
        .and_then(Value::as_array)
        .ok_or_else(|| CodecError::malformed_chat("info is not an array"))?;

    let text = info
        .get(1)
        .and_then(Value::as_str)
        .ok_or_else(|| CodecError::malformed_chat("info[1] is not a string"))?;

    let speaker = info
        .get(2)
        .and_then(Value::as_array)
        .and_then(|user| user.get(1))
        .and_then(Value::as_str)
        .ok_or_else(|| CodecError::malformed_chat("info[2][1] is not a string"))?;

    Ok(NotificationRecord {
        cmd: raw.cmd.clone(),
        speaker: speaker.to_string(),
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    use super::*;
    use crate::codec::packet::encode;

    const SAMPLE: &[u8] =
        b"{\"cmd\":\"DANMU_MSG\",\"info\":[[],\"hi\",[\"\",\"speaker\"]]}\x00\x00{\"cmd\":\"X\"}";

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_split_documents_drops_short_fragments() {
        let body = b"\x00\x10{\"cmd\":\"A\"}\x01\x02ab\x1f{\"cmd\":\"B\"}\x00";
        let fragments = split_documents(body);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], b"{\"cmd\":\"A\"}");
        assert_eq!(fragments[1], b"{\"cmd\":\"B\"}");
    }

    #[test]
    fn test_plain_notification_keeps_chat_and_drops_others() {
        let frame = encode(SAMPLE, Operation::Notification, ProtocolVersion::PlainJson);

        let DecodedEvent::ChatNotification(batch) = decode(&frame).unwrap() else {
            panic!("expected chat notification");
        };
        assert_eq!(
            batch.records,
            vec![NotificationRecord {
                cmd: DANMU_MSG_CMD.to_string(),
                speaker: "speaker".to_string(),
                text: "hi".to_string(),
            }]
        );
        assert_eq!(batch.dropped, 1);
        assert!(batch.failures.is_empty());
    }

    #[test]
    fn test_zlib_notification_with_nested_headers() {
        // Inflated bodies carry the inner packet headers; the separator
        // split must strip them.
        let inner = encode(
            b"{\"cmd\":\"DANMU_MSG\",\"info\":[[0],\"hello\",[7,\"alice\"]]}",
            Operation::Notification,
            ProtocolVersion::PlainJson,
        );
        let frame = encode(&zlib(&inner), Operation::Notification, ProtocolVersion::ZlibJson);

        let DecodedEvent::ChatNotification(batch) = decode(&frame).unwrap() else {
            panic!("expected chat notification");
        };
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].speaker, "alice");
        assert_eq!(batch.records[0].text, "hello");
    }

    #[test]
    fn test_bad_fragment_does_not_abort_batch() {
        let body = b"{not json}\x00{\"cmd\":\"DANMU_MSG\",\"info\":[[],\"ok\",[0,\"bob\"]]}";
        let batch = decode_notifications(body);

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert!(matches!(batch.failures[0], CodecError::Json(_)));
    }

    #[test]
    fn test_chat_record_missing_speaker_is_skipped() {
        let body = b"{\"cmd\":\"DANMU_MSG\",\"info\":[[],\"text only\"]}\x00\
{\"cmd\":\"DANMU_MSG\",\"info\":[[],\"fine\",[1,\"carol\"]]}";
        let batch = decode_notifications(body);

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].speaker, "carol");
        assert!(matches!(
            batch.failures[0],
            CodecError::MalformedChatRecord(_)
        ));
    }

    #[test]
    fn test_non_array_info_only_matters_for_chat() {
        let body = b"{\"cmd\":\"OTHER\",\"info\":{\"a\":1}}\x00\
{\"cmd\":\"DANMU_MSG\",\"info\":{\"text\":\"hi\"}}";
        let batch = decode_notifications(body);

        assert!(batch.records.is_empty());
        assert_eq!(batch.dropped, 1);
        assert_eq!(batch.failures.len(), 1);
        assert!(matches!(
            batch.failures[0],
            CodecError::MalformedChatRecord(_)
        ));
    }

    #[test]
    fn test_viewer_count() {
        let frame = encode(
            &1234u32.to_be_bytes(),
            Operation::HeartbeatReply,
            ProtocolVersion::RawUint32,
        );
        assert!(matches!(decode(&frame), Ok(DecodedEvent::ViewerCount(1234))));

        let short = encode(&[0, 1], Operation::HeartbeatReply, ProtocolVersion::RawUint32);
        assert!(matches!(decode(&short), Err(CodecError::MalformedBody(_))));
    }

    #[test]
    fn test_join_reply_and_unknown_operation() {
        let ack = encode(b"{\"code\":0}", Operation::JoinRoomReply, ProtocolVersion::PlainJson);
        assert!(matches!(decode(&ack), Ok(DecodedEvent::RoomJoinAck)));

        let other = encode(b"", Operation::Other(99), ProtocolVersion::PlainJson);
        assert!(matches!(
            decode(&other),
            Ok(DecodedEvent::Other(Operation::Other(99)))
        ));
    }

    #[test]
    fn test_notification_with_unsupported_version() {
        let frame = encode(SAMPLE, Operation::Notification, ProtocolVersion::RawUint32);
        assert!(matches!(
            decode(&frame),
            Err(CodecError::UnsupportedProtocolVersion(1))
        ));

        let mut raw = encode(SAMPLE, Operation::Notification, ProtocolVersion::PlainJson).to_vec();
        raw[6..8].copy_from_slice(&3u16.to_be_bytes());
        assert!(matches!(
            decode(&raw),
            Err(CodecError::UnsupportedProtocolVersion(3))
        ));
    }
}
