//! Typed inbound and outbound message schema.
//!
//! # Wire Format
//! ```text
//! inbound:  { streamName, state, data: { id, target?: { nodeName, headers? }, request? }, options? }
//! outbound: { streamName, state, data }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::relay::error::DecodeError;

/// Stream state carried by every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StreamState {
    Noop = 1,
    Data = 2,
    Error = 3,
}

impl TryFrom<u8> for StreamState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            1 => Ok(StreamState::Noop),
            2 => Ok(StreamState::Data),
            3 => Ok(StreamState::Error),
            other => Err(format!("unknown stream state {}", other)),
        }
    }
}

impl From<StreamState> for u8 {
    fn from(state: StreamState) -> Self {
        state as u8
    }
}

/// Destination of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub node_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
}

/// Body of an inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestData {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
}

/// A reassembled, decoded logical message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub stream_name: String,
    pub state: StreamState,
    pub data: RequestData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl InboundMessage {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Serialized shape of an outbound packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketBody {
    pub stream_name: String,
    pub state: StreamState,
    pub data: Value,
}

/// A response waiting in the outbound queue.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundPacket {
    /// Reserved for multi-part responses; always true today.
    pub completed: bool,
    pub body: PacketBody,
}

impl OutboundPacket {
    pub fn new(stream_name: impl Into<String>, state: StreamState, data: Value) -> Self {
        Self {
            completed: true,
            body: PacketBody {
                stream_name: stream_name.into(),
                state,
                data,
            },
        }
    }

    /// JSON text sent as one final text frame.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_minimal_message() {
        let msg = InboundMessage::decode(br#"{"streamName":"S1","state":2,"data":{"id":"42"}}"#)
            .unwrap();
        assert_eq!(msg.stream_name, "S1");
        assert_eq!(msg.state, StreamState::Data);
        assert_eq!(msg.data.id, "42");
        assert!(msg.data.target.is_none());
        assert!(msg.options.is_none());
    }

    #[test]
    fn decodes_full_message() {
        let raw = json!({
            "streamName": "SME-CIM",
            "state": 1,
            "data": {
                "id": "7",
                "target": { "nodeName": "node-a", "headers": { "x": "y" } },
                "request": { "method": "get" }
            },
            "options": { "retry": false }
        });
        let msg = InboundMessage::decode(raw.to_string().as_bytes()).unwrap();
        assert_eq!(msg.state, StreamState::Noop);
        let target = msg.data.target.unwrap();
        assert_eq!(target.node_name, "node-a");
        assert_eq!(target.headers, Some(json!({ "x": "y" })));
        assert_eq!(msg.data.request, Some(json!({ "method": "get" })));
    }

    #[test]
    fn rejects_unknown_state_and_garbage() {
        assert!(InboundMessage::decode(br#"{"streamName":"S","state":9,"data":{"id":"1"}}"#).is_err());
        assert!(InboundMessage::decode(b"not json").is_err());
        assert!(InboundMessage::decode(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn outbound_wire_shape() {
        let packet = OutboundPacket::new("S1", StreamState::Data, json!("ack"));
        assert!(packet.completed);
        let value: Value = serde_json::from_str(&packet.to_text().unwrap()).unwrap();
        assert_eq!(value, json!({ "streamName": "S1", "state": 2, "data": "ack" }));
    }
}
