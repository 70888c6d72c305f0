//! The 11 wire records of spec.md §4.1, as a hand-rolled discriminated
//! union. `message_type` is a JSON integer, which doesn't line up with
//! `serde`'s string-tagged enum representation, so encode/decode is done by
//! hand here — the same shape as the original's
//! `MessageType.resolve_class` lookup table, just exhaustively matched
//! instead of dynamically dispatched (spec.md §9, "Dynamic message
//! dispatch").

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::wire::WireError;

/// `{username, address}` — the client descriptor embedded in `StartSolo`,
/// `StartDual` and `UpdateClient`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDescriptor {
    pub username: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// 0, C→B
    ClientInit { username: String },
    /// 1, B→C
    ClientInitResponse { is_valid: bool, message: String },
    /// 2, C→B
    ClientMessage { text: String },
    /// 3, H→B
    ServerInit,
    /// 4, B→H
    StartSolo { client: ClientDescriptor },
    /// 5, B→H
    StartDual { clients: [ClientDescriptor; 2] },
    /// 6, B→H
    ClientToServer { client_address: String, text: String },
    /// 7, H→B
    ServerToClient { client_address: String, text: String },
    /// 8, H→B
    EndGame {
        is_tie: bool,
        winner_address: Option<String>,
    },
    /// 9, B→H
    ForceTerminate,
    /// 10, B→H
    UpdateClient { client: ClientDescriptor },
}

impl Message {
    pub fn message_type(&self) -> u8 {
        match self {
            Message::ClientInit { .. } => 0,
            Message::ClientInitResponse { .. } => 1,
            Message::ClientMessage { .. } => 2,
            Message::ServerInit => 3,
            Message::StartSolo { .. } => 4,
            Message::StartDual { .. } => 5,
            Message::ClientToServer { .. } => 6,
            Message::ServerToClient { .. } => 7,
            Message::EndGame { .. } => 8,
            Message::ForceTerminate => 9,
            Message::UpdateClient { .. } => 10,
        }
    }

    pub fn to_value(&self) -> Value {
        let message_type = self.message_type();
        match self {
            Message::ClientInit { username } => json!({
                "message_type": message_type,
                "username": username,
            }),
            Message::ClientInitResponse { is_valid, message } => json!({
                "message_type": message_type,
                "is_valid": is_valid,
                "message": message,
            }),
            Message::ClientMessage { text } => json!({
                "message_type": message_type,
                "text": text,
            }),
            Message::ServerInit => json!({ "message_type": message_type }),
            Message::StartSolo { client } => json!({
                "message_type": message_type,
                "client": client,
            }),
            Message::StartDual { clients } => json!({
                "message_type": message_type,
                "clients": clients,
            }),
            Message::ClientToServer { client_address, text } => json!({
                "message_type": message_type,
                "client_address": client_address,
                "text": text,
            }),
            Message::ServerToClient { client_address, text } => json!({
                "message_type": message_type,
                "client_address": client_address,
                "text": text,
            }),
            Message::EndGame { is_tie, winner_address } => json!({
                "message_type": message_type,
                "is_tie": is_tie,
                "winner_address": winner_address,
            }),
            Message::ForceTerminate => json!({ "message_type": message_type }),
            Message::UpdateClient { client } => json!({
                "message_type": message_type,
                "client": client,
            }),
        }
    }

    pub fn from_value(value: Value) -> Result<Message, WireError> {
        let message_type = value
            .get("message_type")
            .and_then(Value::as_u64)
            .ok_or_else(|| serde_json::Error::custom_missing("message_type"))?;

        let field = |name: &'static str| -> Result<Value, WireError> {
            value
                .get(name)
                .cloned()
                .ok_or_else(|| serde_json::Error::custom_missing(name).into())
        };
        let parse = |v: Value| -> Result<_, WireError> { Ok(serde_json::from_value(v)?) };

        Ok(match message_type {
            0 => Message::ClientInit {
                username: parse(field("username")?)?,
            },
            1 => Message::ClientInitResponse {
                is_valid: parse(field("is_valid")?)?,
                message: parse(field("message")?)?,
            },
            2 => Message::ClientMessage {
                text: parse(field("text")?)?,
            },
            3 => Message::ServerInit,
            4 => Message::StartSolo {
                client: parse(field("client")?)?,
            },
            5 => Message::StartDual {
                clients: parse(field("clients")?)?,
            },
            6 => Message::ClientToServer {
                client_address: parse(field("client_address")?)?,
                text: parse(field("text")?)?,
            },
            7 => Message::ServerToClient {
                client_address: parse(field("client_address")?)?,
                text: parse(field("text")?)?,
            },
            8 => Message::EndGame {
                is_tie: parse(field("is_tie")?)?,
                winner_address: parse(field("winner_address")?)?,
            },
            9 => Message::ForceTerminate,
            10 => Message::UpdateClient {
                client: parse(field("client")?)?,
            },
            other => return Err(serde_json::Error::custom_unknown(other).into()),
        })
    }
}

/// Small helpers so `from_value` can build `serde_json::Error`s for
/// protocol-shape problems without reaching for a second error type.
trait CustomJsonError {
    fn custom_missing(field: &'static str) -> Self;
    fn custom_unknown(message_type: u64) -> Self;
}

impl CustomJsonError for serde_json::Error {
    fn custom_missing(field: &'static str) -> Self {
        serde::de::Error::custom(format!("missing field `{field}`"))
    }

    fn custom_unknown(message_type: u64) -> Self {
        serde::de::Error::custom(format!("unknown message_type {message_type}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_message_type_as_integer() {
        let value = Message::ServerInit.to_value();
        assert_eq!(value["message_type"], 3);
    }

    #[test]
    fn round_trips_every_variant() {
        let descriptor = ClientDescriptor {
            username: "alice".into(),
            address: "1.2.3.4:9".into(),
        };
        let variants = vec![
            Message::ClientInit {
                username: "alice".into(),
            },
            Message::ClientInitResponse {
                is_valid: false,
                message: "taken".into(),
            },
            Message::ClientMessage {
                text: "/solo".into(),
            },
            Message::ServerInit,
            Message::StartSolo {
                client: descriptor.clone(),
            },
            Message::StartDual {
                clients: [descriptor.clone(), descriptor.clone()],
            },
            Message::ClientToServer {
                client_address: "a".into(),
                text: "/put (0, 0)".into(),
            },
            Message::ServerToClient {
                client_address: "a".into(),
                text: "board\n".into(),
            },
            Message::EndGame {
                is_tie: false,
                winner_address: Some("a".into()),
            },
            Message::ForceTerminate,
            Message::UpdateClient { client: descriptor },
        ];
        for msg in variants {
            let round_tripped = Message::from_value(msg.to_value()).unwrap();
            assert_eq!(msg, round_tripped);
        }
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let value = json!({ "message_type": 99 });
        assert!(Message::from_value(value).is_err());
    }

    #[test]
    fn missing_field_is_rejected() {
        let value = json!({ "message_type": 0 });
        assert!(Message::from_value(value).is_err());
    }
}
