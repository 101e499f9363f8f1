use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::constants::MessageType;

/// Messages pushed from the server to a connected client.
///
/// Serialized as a JSON object whose `type` field is the discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Sent exactly once, immediately after the server accepts a connection.
    ///
    /// Any integral JSON number is accepted so that a version this side
    /// cannot speak still reads as a mismatch rather than garbage.
    ConnectionConfirmation {
        #[serde(rename = "scriptVersion", deserialize_with = "integral_number")]
        script_version: i64,
    },
    /// Instructs the client to reload its page.
    Refresh,
}

/// Errors produced while decoding an incoming message.
///
/// None of these are fatal: the receiver logs them and keeps the
/// connection open.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message has no `type` field")]
    MissingType,

    #[error("unrecognized message type `{0}`")]
    UnknownType(String),
}

impl ServerMessage {
    /// Builds the handshake confirmation for the given protocol version.
    pub fn confirmation(script_version: u32) -> Self {
        Self::ConnectionConfirmation {
            script_version: i64::from(script_version),
        }
    }

    /// Returns the wire discriminator of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::ConnectionConfirmation { .. } => MessageType::ConnectionConfirmation,
            Self::Refresh => MessageType::Refresh,
        }
    }

    /// Serializes to a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses a JSON string, classifying the failure when it is not one of
    /// the two known messages.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let Some(name) = value.get("type").and_then(Value::as_str) else {
            return Err(ProtocolError::MissingType);
        };

        let msg_type: MessageType = serde_json::from_value(Value::String(name.to_owned()))?;
        if msg_type == MessageType::Unknown {
            return Err(ProtocolError::UnknownType(name.to_owned()));
        }

        Ok(serde_json::from_value(value)?)
    }
}

/// Reads a JSON number with no fractional part, `1.0` included.
///
/// Values beyond `i64` saturate; they can never match a real version.
fn integral_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = Number::deserialize(deserializer)?;
    if let Some(v) = number.as_i64() {
        return Ok(v);
    }
    if number.is_u64() {
        return Ok(i64::MAX);
    }
    match number.as_f64() {
        Some(f) if f.fract() == 0.0 => Ok(f as i64),
        _ => Err(de::Error::custom(format!(
            "scriptVersion {number} is not an integer"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_wire_format() {
        let json = ServerMessage::confirmation(1).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "connection-confirmation");
        assert_eq!(value["scriptVersion"], 1);
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn refresh_wire_format() {
        let json = ServerMessage::Refresh.to_json().unwrap();
        assert_eq!(json, r#"{"type":"refresh"}"#);
    }

    #[test]
    fn parses_known_messages() {
        let msg =
            ServerMessage::from_json(r#"{"type":"connection-confirmation","scriptVersion":7}"#)
                .unwrap();
        assert_eq!(msg, ServerMessage::ConnectionConfirmation { script_version: 7 });
        assert_eq!(msg.message_type(), MessageType::ConnectionConfirmation);

        let msg = ServerMessage::from_json(r#"{"type":"refresh"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Refresh);
    }

    #[test]
    fn rejects_unparsable_text() {
        let err = ServerMessage::from_json("not json at all").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn rejects_unknown_type() {
        let err = ServerMessage::from_json(r#"{"type":"css","content":"a{}"}"#).unwrap_err();
        match err {
            ProtocolError::UnknownType(name) => assert_eq!(name, "css"),
            other => panic!("expected UnknownType, got {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_or_non_string_type() {
        assert!(matches!(
            ServerMessage::from_json(r#"{"scriptVersion":1}"#).unwrap_err(),
            ProtocolError::MissingType
        ));
        assert!(matches!(
            ServerMessage::from_json(r#"{"type":3}"#).unwrap_err(),
            ProtocolError::MissingType
        ));
        assert!(matches!(
            ServerMessage::from_json("[1,2,3]").unwrap_err(),
            ProtocolError::MissingType
        ));
    }

    #[test]
    fn rejects_confirmation_with_bad_version_field() {
        let err =
            ServerMessage::from_json(r#"{"type":"connection-confirmation","scriptVersion":"1"}"#)
                .unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));

        let err = ServerMessage::from_json(r#"{"type":"connection-confirmation"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));

        let err =
            ServerMessage::from_json(r#"{"type":"connection-confirmation","scriptVersion":1.5}"#)
                .unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn parses_versions_outside_u32() {
        let version = |text: &str| match ServerMessage::from_json(text).unwrap() {
            ServerMessage::ConnectionConfirmation { script_version } => script_version,
            other => panic!("expected confirmation, got {other:?}"),
        };

        assert_eq!(
            version(r#"{"type":"connection-confirmation","scriptVersion":-1}"#),
            -1
        );
        assert_eq!(
            version(r#"{"type":"connection-confirmation","scriptVersion":4294967296}"#),
            4_294_967_296
        );
        assert_eq!(
            version(r#"{"type":"connection-confirmation","scriptVersion":1.0}"#),
            1
        );
        assert_eq!(
            version(r#"{"type":"connection-confirmation","scriptVersion":18446744073709551615}"#),
            i64::MAX
        );
    }
}
