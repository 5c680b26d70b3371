//! Protocol messages.

use crate::ddp_error::{DdpError, ErrorKind};
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The field map of a document: field name to JSON value.
pub type Fields = Map<String, Value>;

/// A message sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Opens a DDP session, optionally resuming a previous one.
    Connect {
        /// Session to resume.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<String>,
        /// Proposed protocol version.
        version: String,
        /// Protocol versions supported by the client, in order of preference.
        support: Vec<String>,
    },
    /// Heartbeat request.
    Ping {
        /// Optional id echoed back by the pong.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Heartbeat reply.
    Pong {
        /// The id of the ping being answered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Subscribes to a record set.
    Sub {
        /// Client-chosen subscription id.
        id: String,
        /// Publication name.
        name: String,
        /// Publication arguments.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        params: Vec<Value>,
    },
    /// Stops a subscription.
    Unsub {
        /// Subscription id.
        id: String,
    },
    /// Invokes a remote method.
    Method {
        /// Method name.
        method: String,
        /// Method arguments.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        params: Vec<Value>,
        /// Client-chosen call id.
        id: String,
    },
}

impl ClientMessage {
    /// Returns the `msg` value of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Connect { .. } => "connect",
            ClientMessage::Ping { .. } => "ping",
            ClientMessage::Pong { .. } => "pong",
            ClientMessage::Sub { .. } => "sub",
            ClientMessage::Unsub { .. } => "unsub",
            ClientMessage::Method { .. } => "method",
        }
    }

    /// Encodes to a JSON text frame.
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes from a JSON text frame.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// A message sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "camelCase")]
pub enum ServerMessage {
    /// The session was established.
    Connected {
        /// Server-issued session id.
        session: String,
    },
    /// None of the proposed protocol versions is supported.
    Failed {
        /// The version the server would accept.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    /// Heartbeat request.
    Ping {
        /// Optional id to echo back.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Heartbeat reply.
    Pong {
        /// The id of the ping being answered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// A subscription ended or failed to start.
    Nosub {
        /// Subscription id.
        id: String,
        /// Why the subscription ended, if it failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
    },
    /// A document was added to a collection.
    Added {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// Initial fields.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Fields>,
    },
    /// Fields of a document changed.
    Changed {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// Fields that were set.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Fields>,
        /// Names of fields that were removed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cleared: Option<Vec<String>>,
    },
    /// A document was removed from a collection.
    Removed {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
    },
    /// A document was added before another one in an ordered collection.
    AddedBefore {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// Initial fields.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Fields>,
        /// The document this one precedes; `None` means the end.
        #[serde(default)]
        before: Option<String>,
    },
    /// A document moved within an ordered collection.
    MovedBefore {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// The document this one now precedes; `None` means the end.
        #[serde(default)]
        before: Option<String>,
    },
    /// Subscriptions sent their initial record sets.
    Ready {
        /// Subscription ids.
        #[serde(default)]
        subs: Vec<String>,
    },
    /// A method returned.
    Result {
        /// Call id.
        id: String,
        /// Return value.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Error thrown by the method.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
    },
    /// All writes made by the listed methods have been sent.
    Updated {
        /// Call ids.
        #[serde(default)]
        methods: Vec<String>,
    },
    /// A connection-level error not tied to any call.
    Error {
        /// Error code.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
        /// Why the error happened.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        /// Undocumented human-readable message.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Undocumented error class name.
        #[serde(
            default,
            rename = "errorType",
            skip_serializing_if = "Option::is_none"
        )]
        error_type: Option<String>,
        /// The client message that caused the error.
        #[serde(
            default,
            rename = "offendingMessage",
            skip_serializing_if = "Option::is_none"
        )]
        offending_message: Option<Value>,
    },
    /// A message kind this client does not know.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Returns the `msg` value of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::Failed { .. } => "failed",
            ServerMessage::Ping { .. } => "ping",
            ServerMessage::Pong { .. } => "pong",
            ServerMessage::Nosub { .. } => "nosub",
            ServerMessage::Added { .. } => "added",
            ServerMessage::Changed { .. } => "changed",
            ServerMessage::Removed { .. } => "removed",
            ServerMessage::AddedBefore { .. } => "addedBefore",
            ServerMessage::MovedBefore { .. } => "movedBefore",
            ServerMessage::Ready { .. } => "ready",
            ServerMessage::Result { .. } => "result",
            ServerMessage::Updated { .. } => "updated",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Unknown => "unknown",
        }
    }

    /// Decodes from a JSON text frame.
    ///
    /// Returns `Ok(None)` for frames without a `msg` field, which carry
    /// nothing the client acts on.
    pub fn decode(text: &str) -> ProtocolResult<Option<Self>> {
        let value: Value = serde_json::from_str(text)?;
        let Some(obj) = value.as_object() else {
            return Err(ProtocolError::invalid("frame is not a JSON object"));
        };

        match obj.get("msg") {
            None => Ok(None),
            Some(Value::String(_)) => Ok(Some(serde_json::from_value(value)?)),
            Some(_) => Err(ProtocolError::invalid("msg is not a string")),
        }
    }

    /// Encodes to a JSON text frame.
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Builds the connection-level error carried by a top-level `error`
    /// message. Returns `None` for any other message.
    pub fn connection_error(&self) -> Option<DdpError> {
        let ServerMessage::Error {
            error,
            reason,
            message,
            error_type,
            offending_message,
        } = self
        else {
            return None;
        };

        let code = error.as_ref().and_then(|code| match code {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Some(DdpError {
            kind: ErrorKind::Server,
            code,
            reason: reason.clone(),
            message: message.clone(),
            error_type: error_type.clone(),
            details: None,
            offending_message: offending_message.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn connect_frame() {
        let msg = ClientMessage::Connect {
            session: None,
            version: "1".into(),
            support: vec!["1".into()],
        };
        let text = msg.encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"msg": "connect", "version": "1", "support": ["1"]})
        );
    }

    #[test]
    fn connect_frame_with_session() {
        let msg = ClientMessage::Connect {
            session: Some("abc".into()),
            version: "1".into(),
            support: vec!["1".into()],
        };
        let value: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["session"], "abc");
    }

    #[test]
    fn empty_params_are_omitted() {
        let sub = ClientMessage::Sub {
            id: "0".into(),
            name: "items".into(),
            params: vec![],
        };
        let value: Value = serde_json::from_str(&sub.encode().unwrap()).unwrap();
        assert_eq!(value, json!({"msg": "sub", "id": "0", "name": "items"}));

        let method = ClientMessage::Method {
            method: "math.add".into(),
            params: vec![json!(2), json!(3)],
            id: "4".into(),
        };
        let value: Value = serde_json::from_str(&method.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"msg": "method", "method": "math.add", "params": [2, 3], "id": "4"})
        );
    }

    #[test]
    fn pong_echoes_id() {
        let value: Value = serde_json::from_str(
            &ClientMessage::Pong { id: Some("7".into()) }.encode().unwrap(),
        )
        .unwrap();
        assert_eq!(value, json!({"msg": "pong", "id": "7"}));

        let value: Value =
            serde_json::from_str(&ClientMessage::Pong { id: None }.encode().unwrap()).unwrap();
        assert_eq!(value, json!({"msg": "pong"}));
    }

    #[test]
    fn decode_data_messages() {
        let msg = ServerMessage::decode(
            r#"{"msg":"changed","collection":"items","id":"a","fields":{"x":2},"cleared":["y"]}"#,
        )
        .unwrap()
        .unwrap();

        match msg {
            ServerMessage::Changed {
                collection,
                id,
                fields,
                cleared,
            } => {
                assert_eq!(collection, "items");
                assert_eq!(id, "a");
                assert_eq!(fields.unwrap()["x"], json!(2));
                assert_eq!(cleared.unwrap(), vec!["y".to_string()]);
            }
            other => panic!("unexpected message: {other:?}"),
        }

        let msg = ServerMessage::decode(r#"{"msg":"addedBefore","collection":"c","id":"b","before":null}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            msg,
            ServerMessage::AddedBefore {
                collection: "c".into(),
                id: "b".into(),
                fields: None,
                before: None,
            }
        );
    }

    #[test]
    fn decode_without_msg_is_ignored() {
        assert_eq!(ServerMessage::decode(r#"{"server_id":"0"}"#).unwrap(), None);
    }

    #[test]
    fn decode_unknown_kind() {
        let msg = ServerMessage::decode(r#"{"msg":"someday","x":1}"#).unwrap();
        assert_eq!(msg, Some(ServerMessage::Unknown));
    }

    #[test]
    fn decode_malformed_frames() {
        assert!(ServerMessage::decode("not json").is_err());
        assert!(ServerMessage::decode("[1,2]").is_err());
        assert!(ServerMessage::decode(r#"{"msg":3}"#).is_err());
        // result without an id cannot be routed
        assert!(ServerMessage::decode(r#"{"msg":"result","result":5}"#).is_err());
    }

    #[test]
    fn decode_ready_without_subs() {
        let msg = ServerMessage::decode(r#"{"msg":"ready"}"#).unwrap().unwrap();
        assert_eq!(msg, ServerMessage::Ready { subs: vec![] });
    }

    #[test]
    fn top_level_error() {
        let msg = ServerMessage::decode(
            r#"{"msg":"error","reason":"Bad request","offendingMessage":{"msg":"x"}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(msg.kind(), "error");

        let err = msg.connection_error().unwrap();
        assert_eq!(err.kind, ErrorKind::Server);
        assert_eq!(err.reason.as_deref(), Some("Bad request"));
        assert_eq!(err.offending_message, Some(json!({"msg": "x"})));

        assert!(ServerMessage::Ready { subs: vec![] }
            .connection_error()
            .is_none());
    }

    proptest::proptest! {
        #[test]
        fn decode_never_panics(text in ".{0,64}") {
            let _ = ServerMessage::decode(&text);
        }

        #[test]
        fn decode_never_panics_on_json_objects(
            kind in "(added|changed|removed|ready|result|updated|nosub|ping|error)",
            key in "[a-z]{1,6}",
            n in proptest::prelude::any::<i64>(),
        ) {
            let text = json!({"msg": kind, key: n}).to_string();
            let _ = ServerMessage::decode(&text);
        }
    }

    #[test]
    fn server_frames_encode_with_camel_case_tags() {
        let text = ServerMessage::MovedBefore {
            collection: "c".into(),
            id: "a".into(),
            before: Some("b".into()),
        }
        .encode()
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"msg": "movedBefore", "collection": "c", "id": "a", "before": "b"})
        );
    }
}
