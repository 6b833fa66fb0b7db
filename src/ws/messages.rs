//! WebSocket message types: the `{type, payload}` envelope and the payloads
//! of the reserved control messages.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::IpcError;

/// Message type reserved for client identification.
pub const HANDSHAKE_TYPE: &str = "handshake";

/// Message type a client sends to add broadcast topics.
pub const SUBSCRIBE_TYPE: &str = "subscribe";

/// Message type a client sends to remove broadcast topics.
pub const UNSUBSCRIBE_TYPE: &str = "unsubscribe";

/// Message type of the hub's reply listing the current topics.
pub const SUBSCRIPTIONS_TYPE: &str = "subscriptions";

/// Top-level WebSocket message envelope.
///
/// Every frame on the wire is one JSON text frame of this shape:
/// ```json
/// { "type": "ping", "payload": 42 }
/// ```
///
/// The payload defaults to an untyped [`serde_json::Value`]; listeners that
/// want a concrete type decode it with [`ShellMessage::decode_payload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellMessage<T = serde_json::Value> {
    /// Message type discriminator. Never empty.
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Type-specific payload.
    pub payload: T,
}

impl<T> ShellMessage<T> {
    /// Creates an envelope.
    pub fn new(msg_type: impl Into<String>, payload: T) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload,
        }
    }
}

impl<T: Serialize> ShellMessage<T> {
    /// Serializes the envelope into a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::InvalidType`] if the type is empty, or
    /// [`IpcError::Serialize`] if the payload cannot be represented as JSON.
    pub fn to_json(&self) -> Result<String, IpcError> {
        if self.msg_type.is_empty() {
            return Err(IpcError::InvalidType);
        }
        Ok(serde_json::to_string(self)?)
    }
}

impl ShellMessage {
    /// Parses an inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::MessageParse`] if the text is not JSON, is
    /// missing the `type` or `payload` field, or carries an empty type.
    pub fn parse(text: &str) -> Result<Self, IpcError> {
        let msg: Self =
            serde_json::from_str(text).map_err(|e| IpcError::MessageParse(e.to_string()))?;
        if msg.msg_type.is_empty() {
            return Err(IpcError::MessageParse("empty message type".to_string()));
        }
        Ok(msg)
    }

    /// Decodes the payload into a concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::MessageParse`] if the payload does not match `U`.
    pub fn decode_payload<U: DeserializeOwned>(&self) -> Result<U, IpcError> {
        decode_payload(&self.payload)
    }
}

/// Decodes a raw payload value into `U`.
///
/// # Errors
///
/// Returns [`IpcError::MessageParse`] if the payload does not match `U`.
pub fn decode_payload<U: DeserializeOwned>(payload: &serde_json::Value) -> Result<U, IpcError> {
    U::deserialize(payload).map_err(|e| IpcError::MessageParse(e.to_string()))
}

/// Payload of the `handshake` message a widget sends after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Monitor the widget is displayed on.
    pub monitor_id: i64,
    /// Widget name as configured in the shell.
    pub widget_name: String,
}

/// Payload of the `subscribe`, `unsubscribe` and `subscriptions` messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Topics to add or remove, or the current set in a reply.
    pub topics: Vec<String>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_valid_envelope() {
        let Ok(msg) = ShellMessage::parse(r#"{"type":"ping","payload":42}"#) else {
            panic!("valid envelope rejected");
        };
        assert_eq!(msg.msg_type, "ping");
        assert_eq!(msg.payload, json!(42));
    }

    #[test]
    fn parse_accepts_null_payload() {
        let Ok(msg) = ShellMessage::parse(r#"{"type":"tick","payload":null}"#) else {
            panic!("null payload rejected");
        };
        assert!(msg.payload.is_null());
    }

    #[test]
    fn parse_rejects_non_json() {
        let err = ShellMessage::parse("not-json");
        assert!(matches!(err, Err(IpcError::MessageParse(_))));
    }

    #[test]
    fn parse_rejects_missing_fields() {
        assert!(ShellMessage::parse(r#"{"payload":1}"#).is_err());
        assert!(ShellMessage::parse(r#"{"type":"ping"}"#).is_err());
        assert!(ShellMessage::parse("[1,2,3]").is_err());
    }

    #[test]
    fn parse_rejects_empty_type() {
        let err = ShellMessage::parse(r#"{"type":"","payload":{}}"#);
        assert!(matches!(err, Err(IpcError::MessageParse(_))));
    }

    #[test]
    fn to_json_uses_type_key() {
        let msg = ShellMessage::new("notify", json!({"id": 7}));
        let Ok(text) = msg.to_json() else {
            panic!("serialization failed");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap_or_default();
        assert_eq!(value["type"], "notify");
        assert_eq!(value["payload"]["id"], 7);
    }

    #[test]
    fn to_json_rejects_empty_type() {
        let msg = ShellMessage::new("", 1);
        assert!(matches!(msg.to_json(), Err(IpcError::InvalidType)));
    }

    #[test]
    fn decode_payload_typed() {
        let Ok(msg) = ShellMessage::parse(
            r#"{"type":"handshake","payload":{"monitorId":1,"widgetName":"bar"}}"#,
        ) else {
            panic!("handshake rejected");
        };
        let Ok(hs) = msg.decode_payload::<Handshake>() else {
            panic!("handshake payload did not decode");
        };
        assert_eq!(hs.monitor_id, 1);
        assert_eq!(hs.widget_name, "bar");
        assert!(msg.decode_payload::<u32>().is_err());
    }

    #[test]
    fn subscription_payload_shape() {
        let Ok(msg) = ShellMessage::parse(r#"{"type":"subscribe","payload":{"topics":["a","*"]}}"#)
        else {
            panic!("subscribe rejected");
        };
        let Ok(sub) = msg.decode_payload::<Subscription>() else {
            panic!("subscription payload did not decode");
        };
        assert_eq!(sub.topics, vec!["a", "*"]);
        assert!(msg.decode_payload::<Handshake>().is_err());
    }
}
