//! Envelope codec for the ICE Bloc JSON protocol.
//!
//! Every message on the wire, in either direction, is a single JSON object:
//!
//! ```text
//! {"message":{"transmission_id":[2],"op":"poll_wave_m","parameters":{"status":[1]}}}
//! ```
//!
//! - `transmission_id` is always a one-element array.
//! - `parameters` is omitted entirely for operations without arguments. An empty
//!   object is a different message and is never produced for "no arguments".
//! - Numeric parameter values are one-element arrays (`"wavelength":[780.0]`),
//!   text values are bare strings. [`ParamValue::to_wire`] applies this rule
//!   uniformly so no caller has to remember it.
//!
//! There is no length prefix or delimiter. A message boundary is whatever one
//! transport read returns; [`split_frames`] additionally splits a read that holds
//! several complete objects back to back.

use crate::error::{IceBlocError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Parameter bag of a request or reply.
///
/// `serde_json::Map` keeps keys sorted, which makes encoding deterministic.
pub type Parameters = Map<String, Value>;

/// Default receive ceiling used by the reference firmware clients.
pub const MAX_FRAME_BYTES: usize = 2048;

/// The inner envelope: operation id, operation name and optional parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Operation identifier, wire-encoded as a one-element sequence.
    pub transmission_id: Vec<u32>,
    /// Operation name.
    pub op: String,
    /// Parameter bag; absent for no-argument operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
}

impl Envelope {
    /// Build an envelope for `op` with the given id.
    pub fn new(transmission_id: u32, op: impl Into<String>, parameters: Option<Parameters>) -> Self {
        Self {
            transmission_id: vec![transmission_id],
            op: op.into(),
            parameters,
        }
    }

    /// First element of `transmission_id`, if any.
    pub fn id(&self) -> Option<u32> {
        self.transmission_id.first().copied()
    }
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    message: Envelope,
}

/// Borrowing twin of [`WireMessage`] so encoding does not clone the envelope.
#[derive(Serialize)]
struct WireMessageRef<'a> {
    message: &'a Envelope,
}

/// Typed argument value, converted to its wire form by the codec.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Floating point quantity (wavelength, voltage, percentage...).
    Number(f64),
    /// Integral quantity (channel number, selection code...).
    Integer(i64),
    /// Enumerated or free text value.
    Text(String),
}

impl ParamValue {
    /// Wire representation: numbers become one-element arrays, text stays bare.
    pub fn to_wire(&self) -> Value {
        match self {
            ParamValue::Number(v) => Value::Array(vec![Value::from(*v)]),
            ParamValue::Integer(v) => Value::Array(vec![Value::from(*v)]),
            ParamValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(v) => write!(f, "{v}"),
            ParamValue::Integer(v) => write!(f, "{v}"),
            ParamValue::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Integer(i64::from(value))
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// Serialize an envelope into its `{"message": ...}` wire form.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&WireMessageRef { message: envelope })?)
}

/// Parse one wire message into an envelope. `parameters` may be absent.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope> {
    let wire: WireMessage = serde_json::from_slice(bytes)
        .map_err(|e| IceBlocError::Protocol(format!("malformed envelope: {e}")))?;
    Ok(wire.message)
}

/// Parse one wire message and return only its `parameters` bag.
///
/// Fails with [`IceBlocError::Protocol`] when the bag is missing.
pub fn decode(bytes: &[u8]) -> Result<Parameters> {
    into_parameters(decode_envelope(bytes)?)
}

/// Unwrap the parameter bag of a reply envelope.
pub fn into_parameters(envelope: Envelope) -> Result<Parameters> {
    envelope.parameters.ok_or_else(|| {
        IceBlocError::Protocol(format!("reply to '{}' has no parameters", envelope.op))
    })
}

/// Decode every complete envelope contained in one transport read.
///
/// Surrounding whitespace is ignored. A trailing incomplete object is a protocol
/// error: reads are never stitched together.
pub fn split_frames(chunk: &[u8]) -> Result<Vec<Envelope>> {
    let mut frames = Vec::new();
    let stream = serde_json::Deserializer::from_slice(chunk).into_iter::<WireMessage>();
    for item in stream {
        let wire =
            item.map_err(|e| IceBlocError::Protocol(format!("malformed envelope: {e}")))?;
        frames.push(wire.message);
    }
    if frames.is_empty() {
        return Err(IceBlocError::Protocol("empty read".to_string()));
    }
    Ok(frames)
}

/// Offset of the first envelope opening in `chunk`, used to resynchronise after
/// the tail of a truncated reply.
pub fn envelope_start(chunk: &[u8]) -> Option<usize> {
    const OPENING: &[u8] = br#"{"message""#;
    chunk.windows(OPENING.len()).position(|w| w == OPENING)
}

/// Unwrap a one-element array to its scalar; any other value is returned as is.
pub fn unwrap_scalar(value: &Value) -> &Value {
    match value {
        Value::Array(items) if items.len() == 1 => &items[0],
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Parameters {
        match value {
            Value::Object(map) => map,
            _ => Parameters::new(),
        }
    }

    #[test]
    fn encodes_message_wrapper_with_stable_order() {
        let env = Envelope::new(
            1,
            "set_wave_m",
            Some(params(json!({"wavelength": [780.5]}))),
        );
        let bytes = encode(&env).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"message":{"transmission_id":[1],"op":"set_wave_m","parameters":{"wavelength":[780.5]}}}"#
        );
    }

    #[test]
    fn no_argument_operation_omits_parameters_key() {
        let env = Envelope::new(2, "poll_wave_m", None);
        let text = String::from_utf8(encode(&env).unwrap()).unwrap();
        assert_eq!(text, r#"{"message":{"transmission_id":[2],"op":"poll_wave_m"}}"#);
        assert!(!text.contains("parameters"));

        let empty = Envelope::new(2, "poll_wave_m", Some(Parameters::new()));
        let text = String::from_utf8(encode(&empty).unwrap()).unwrap();
        assert!(text.contains(r#""parameters":{}"#));
    }

    #[test]
    fn ping_scenario_round_trips_to_parameters() {
        let env = Envelope::new(1, "ping", Some(params(json!({"text_in": "Hello World"}))));
        let decoded = decode(&encode(&env).unwrap()).unwrap();
        assert_eq!(Value::Object(decoded), json!({"text_in": "Hello World"}));
    }

    #[test]
    fn decode_returns_only_inner_parameters() {
        let raw = br#"{"message":{"transmission_id":[2],"op":"poll_wave_m","parameters":{"status":[1]}}}"#;
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.len(), 1);
        assert!(!decoded.contains_key("transmission_id"));
        assert!(!decoded.contains_key("op"));
        assert_eq!(decoded["status"], json!([1]));
    }

    #[test]
    fn decode_rejects_missing_message_or_parameters() {
        let no_message = br#"{"reply":{"transmission_id":[2],"op":"poll_wave_m"}}"#;
        assert!(matches!(decode(no_message), Err(IceBlocError::Protocol(_))));

        let no_parameters = br#"{"message":{"transmission_id":[2],"op":"poll_wave_m"}}"#;
        assert!(matches!(decode(no_parameters), Err(IceBlocError::Protocol(_))));

        assert!(matches!(decode(b"not json"), Err(IceBlocError::Protocol(_))));
    }

    #[test]
    fn numbers_are_wrapped_text_is_bare() {
        assert_eq!(ParamValue::Number(1.5).to_wire(), json!([1.5]));
        assert_eq!(ParamValue::Integer(3).to_wire(), json!([3]));
        assert_eq!(ParamValue::Text("on".into()).to_wire(), json!("on"));
    }

    #[test]
    fn split_frames_handles_coalesced_messages() {
        let chunk = br#"{"message":{"transmission_id":[1],"op":"automatic_output","parameters":{"wavelength":[780.1],"status":"scan"}}}
{"message":{"transmission_id":[29],"op":"scan_stitch_status_reply","parameters":{"status":[1]}}}"#;
        let frames = split_frames(chunk).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].op, "automatic_output");
        assert_eq!(frames[1].id(), Some(29));
    }

    #[test]
    fn split_frames_rejects_partial_trailing_object() {
        let chunk = br#"{"message":{"transmission_id":[1],"op":"ping","parameters":{}}}{"message":{"transm"#;
        assert!(matches!(split_frames(chunk), Err(IceBlocError::Protocol(_))));
        assert!(matches!(split_frames(b"  "), Err(IceBlocError::Protocol(_))));
    }

    #[test]
    fn envelope_start_skips_a_truncated_tail() {
        let chunk = br#"xxxx"}}}{"message":{"transmission_id":[22],"op":"get_status_reply","parameters":{}}}"#;
        let start = envelope_start(chunk).unwrap();
        assert_eq!(start, 8);
        assert_eq!(split_frames(&chunk[start..]).unwrap()[0].op, "get_status_reply");
        assert_eq!(envelope_start(b"xxxxxxxx"), None);
    }

    #[test]
    fn unwrap_scalar_accepts_wrapped_and_bare() {
        assert_eq!(unwrap_scalar(&json!([3])), &json!(3));
        assert_eq!(unwrap_scalar(&json!(3)), &json!(3));
        assert_eq!(unwrap_scalar(&json!([1, 2])), &json!([1, 2]));
    }
}
