//! Forward protocol message framing.
//!
//! Every record travels as a single "message mode" entry,
//! `[tag, time, record]` or `[tag, time, record, {"chunk": id}]` when an
//! acknowledgement is requested. The collector answers an acknowledged
//! message with `{"ack": id}`.

use std::io::Read;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::Record;
use crate::transport::TransportError;

/// Msgpack extension type of a Forward `EventTime`.
const EVENT_TIME_EXT: i8 = 0;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CodecOptions {
    pub sub_second_precision: bool,
    pub marshal_as_json: bool,
}

#[derive(Deserialize)]
struct AckResponse {
    ack: String,
}

fn encode_err(e: impl std::fmt::Display) -> TransportError {
    TransportError::Encode(e.to_string())
}

pub(crate) fn encode_message(
    tag: &str,
    time: DateTime<Utc>,
    record: &Record,
    chunk: Option<&str>,
    opts: CodecOptions,
) -> Result<Vec<u8>, TransportError> {
    if opts.marshal_as_json {
        encode_json(tag, time, record, chunk)
    } else {
        encode_msgpack(tag, time, record, chunk, opts.sub_second_precision)
    }
}

fn encode_msgpack(
    tag: &str,
    time: DateTime<Utc>,
    record: &Record,
    chunk: Option<&str>,
    sub_second_precision: bool,
) -> Result<Vec<u8>, TransportError> {
    let mut buf = Vec::with_capacity(128);
    let len = if chunk.is_some() { 4 } else { 3 };

    rmp::encode::write_array_len(&mut buf, len).map_err(encode_err)?;
    rmp::encode::write_str(&mut buf, tag).map_err(encode_err)?;

    let secs = unix_seconds(time)?;
    if sub_second_precision {
        rmp::encode::write_ext_meta(&mut buf, 8, EVENT_TIME_EXT).map_err(encode_err)?;
        buf.extend_from_slice(&secs.to_be_bytes());
        buf.extend_from_slice(&time.timestamp_subsec_nanos().to_be_bytes());
    } else {
        rmp::encode::write_uint(&mut buf, u64::from(secs)).map_err(encode_err)?;
    }

    record
        .serialize(&mut rmp_serde::Serializer::new(&mut buf))
        .map_err(encode_err)?;

    if let Some(chunk) = chunk {
        rmp::encode::write_map_len(&mut buf, 1).map_err(encode_err)?;
        rmp::encode::write_str(&mut buf, "chunk").map_err(encode_err)?;
        rmp::encode::write_str(&mut buf, chunk).map_err(encode_err)?;
    }

    Ok(buf)
}

fn encode_json(
    tag: &str,
    time: DateTime<Utc>,
    record: &Record,
    chunk: Option<&str>,
) -> Result<Vec<u8>, TransportError> {
    let secs = unix_seconds(time)?;
    let result = match chunk {
        Some(chunk) => serde_json::to_vec(&(tag, secs, record, serde_json::json!({ "chunk": chunk }))),
        None => serde_json::to_vec(&(tag, secs, record)),
    };
    result.map_err(encode_err)
}

/// Forward timestamps are unsigned 32-bit seconds.
fn unix_seconds(time: DateTime<Utc>) -> Result<u32, TransportError> {
    u32::try_from(time.timestamp())
        .map_err(|_| TransportError::Encode(format!("timestamp {time} is outside the forward time range")))
}

/// Read one `{"ack": id}` response and return the id.
pub(crate) fn read_ack<R: Read>(reader: &mut R, json: bool) -> Result<String, TransportError> {
    let response: AckResponse = if json {
        let mut de = serde_json::Deserializer::from_reader(reader);
        AckResponse::deserialize(&mut de).map_err(|e| ack_err(e.to_string()))?
    } else {
        rmp_serde::from_read(reader).map_err(|e| ack_err(e.to_string()))?
    };
    Ok(response.ack)
}

fn ack_err(reason: String) -> TransportError {
    TransportError::Ack {
        expected: "an ack response".to_string(),
        actual: reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn record() -> Record {
        match json!({"message": "hello", "severity": "info", "count": 3}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn time() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap()
    }

    #[test]
    fn msgpack_message_mode() {
        let bytes = encode_message("app.logs", time(), &record(), None, CodecOptions::default()).unwrap();
        let (tag, secs, body): (String, u64, Value) = rmp_serde::from_slice(&bytes).unwrap();

        assert_eq!(tag, "app.logs");
        assert_eq!(secs, 1_700_000_000);
        assert_eq!(body["message"], "hello");
        assert_eq!(body["count"], 3);
    }

    #[test]
    fn msgpack_event_time_carries_nanoseconds() {
        let opts = CodecOptions {
            sub_second_precision: true,
            ..CodecOptions::default()
        };
        let bytes = encode_message("t", time(), &record(), None, opts).unwrap();

        // fixarray(3), fixstr(1) "t", fixext8 type 0
        assert_eq!(&bytes[..5], &[0x93, 0xa1, b't', 0xd7, 0x00]);
        assert_eq!(&bytes[5..9], &1_700_000_000u32.to_be_bytes());
        assert_eq!(&bytes[9..13], &123_456_789u32.to_be_bytes());
    }

    #[test]
    fn msgpack_chunk_option() {
        let bytes =
            encode_message("t", time(), &record(), Some("abc123"), CodecOptions::default()).unwrap();
        let (_, _, _, option): (String, u64, Value, Value) = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(option, json!({"chunk": "abc123"}));
    }

    #[test]
    fn json_message_mode() {
        let opts = CodecOptions {
            marshal_as_json: true,
            ..CodecOptions::default()
        };
        let bytes = encode_message("t", time(), &record(), Some("c1"), opts).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value[0], "t");
        assert_eq!(value[1], 1_700_000_000u64);
        assert_eq!(value[2]["severity"], "info");
        assert_eq!(value[3]["chunk"], "c1");
    }

    #[test]
    fn timestamps_before_epoch_are_rejected() {
        let before = Utc.timestamp_opt(-1, 0).unwrap();
        let err = encode_message("t", before, &record(), None, CodecOptions::default()).unwrap_err();
        assert!(matches!(err, TransportError::Encode(_)));
    }

    #[test]
    fn reads_ack_responses() {
        let packed = rmp_serde::to_vec_named(&json!({"ack": "abc"})).unwrap();
        assert_eq!(read_ack(&mut packed.as_slice(), false).unwrap(), "abc");

        let text = br#"{"ack":"xyz"}"#;
        assert_eq!(read_ack(&mut &text[..], true).unwrap(), "xyz");

        let garbage = [0xc1u8];
        assert!(read_ack(&mut &garbage[..], false).is_err());
    }
}
