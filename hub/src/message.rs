use crate::connection::ConnectionId;
use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Trait for getting the wire name of an envelope
pub trait EventType {
    fn event_type(&self) -> &'static str;
}

/// Server → client wire unit. Every envelope is built fresh for the recipient it is sent to,
/// so `timestamp` is the moment of construction, not of the client's send.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// Greeting sent once to a newly registered connection.
    #[serde(rename = "connection")]
    Connection {
        id: ConnectionId,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Acknowledgement echoed back to the sender of a payload.
    #[serde(rename = "message")]
    Message { data: Value, timestamp: DateTime<Utc> },

    /// A peer's payload relayed to everyone else.
    #[serde(rename = "broadcast")]
    Broadcast {
        from: ConnectionId,
        data: Value,
        timestamp: DateTime<Utc>,
    },
}

impl Envelope {
    pub fn connection(id: ConnectionId, message: impl Into<String>) -> Self {
        Envelope::Connection {
            id,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn message(data: Value) -> Self {
        Envelope::Message {
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn broadcast(from: ConnectionId, data: Value) -> Self {
        Envelope::Broadcast {
            from,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(Error::serialization)
    }
}

impl EventType for Envelope {
    fn event_type(&self) -> &'static str {
        match self {
            Envelope::Connection { .. } => "connection",
            Envelope::Message { .. } => "message",
            Envelope::Broadcast { .. } => "broadcast",
        }
    }
}

/// Decode a raw client payload. Clients may send any JSON value; the hub never looks inside it.
pub fn decode_payload(raw: &str) -> Result<Value, Error> {
    serde_json::from_str(raw).map_err(Error::malformed_payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HubErrorKind;
    use serde_json::json;

    #[test]
    fn test_connection_envelope_wire_shape() {
        let id = ConnectionId::new();
        let wire: Value =
            serde_json::from_str(&Envelope::connection(id, "hello").to_json().unwrap()).unwrap();

        assert_eq!(wire["type"], "connection");
        assert_eq!(wire["id"], id.to_string());
        assert_eq!(wire["message"], "hello");
        assert!(wire["timestamp"].is_string());
        assert!(wire.get("data").is_none());
    }

    #[test]
    fn test_broadcast_envelope_wire_shape() {
        let from = ConnectionId::new();
        let wire: Value = serde_json::from_str(
            &Envelope::broadcast(from, json!({"x": 1})).to_json().unwrap(),
        )
        .unwrap();

        assert_eq!(wire["type"], "broadcast");
        assert_eq!(wire["from"], from.to_string());
        assert_eq!(wire["data"], json!({"x": 1}));
    }

    #[test]
    fn test_message_envelope_timestamp_is_rfc3339() {
        let wire: Value =
            serde_json::from_str(&Envelope::message(json!("hi")).to_json().unwrap()).unwrap();

        assert_eq!(wire["type"], "message");
        let timestamp = wire["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn test_event_type_matches_serialized_tag() {
        let envelope = Envelope::message(Value::Null);
        let wire: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(wire["type"], envelope.event_type());
    }

    #[test]
    fn test_decode_payload_accepts_any_json_value() {
        assert_eq!(decode_payload("42").unwrap(), json!(42));
        assert_eq!(decode_payload(r#"{"message":"hi"}"#).unwrap(), json!({"message": "hi"}));
        assert_eq!(decode_payload("[1,2]").unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_decode_payload_rejects_malformed_input() {
        let err = decode_payload("{\"x\":").unwrap_err();
        assert_eq!(err.error_kind, HubErrorKind::MalformedPayload);

        let err = decode_payload("plain text").unwrap_err();
        assert_eq!(err.error_kind, HubErrorKind::MalformedPayload);
    }
}
