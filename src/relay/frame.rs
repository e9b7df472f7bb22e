//! Wire-level frame vocabulary shared by the transport and the relay loops.

use std::fmt;

/// Kind of a received or sent fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
    Ping,
    Pong,
}

/// One chunk of a logical message as handed out by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub kind: FrameKind,
    pub payload: Vec<u8>,
    /// Set on the last fragment of a logical message.
    pub is_final: bool,
}

impl Fragment {
    pub fn text(payload: impl Into<Vec<u8>>, is_final: bool) -> Self {
        Self {
            kind: FrameKind::Text,
            payload: payload.into(),
            is_final,
        }
    }

    pub fn binary(payload: impl Into<Vec<u8>>, is_final: bool) -> Self {
        Self {
            kind: FrameKind::Binary,
            payload: payload.into(),
            is_final,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Result of a single receive on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Fragment(Fragment),
    /// The peer started the close handshake.
    Close(CloseInfo),
}

/// WebSocket close status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    pub const NORMAL: CloseCode = CloseCode(1000);
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    pub const PROTOCOL_ERROR: CloseCode = CloseCode(1002);
    pub const UNSUPPORTED_DATA: CloseCode = CloseCode(1003);
    /// No status was present in the close frame.
    pub const EMPTY: CloseCode = CloseCode(1005);
    pub const ABNORMAL: CloseCode = CloseCode(1006);
    pub const INVALID_PAYLOAD: CloseCode = CloseCode(1007);
    pub const POLICY_VIOLATION: CloseCode = CloseCode(1008);
    pub const MESSAGE_TOO_BIG: CloseCode = CloseCode(1009);
    pub const INTERNAL_ERROR: CloseCode = CloseCode(1011);
    pub const TLS: CloseCode = CloseCode(1015);

    /// Codes that must never appear in a close frame on the wire.
    pub fn is_reserved(self) -> bool {
        matches!(self, Self::EMPTY | Self::ABNORMAL | Self::TLS)
    }

    pub fn is_normal(self) -> bool {
        self == Self::NORMAL
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::NORMAL => "NormalClosure",
            Self::GOING_AWAY => "EndpointUnavailable",
            Self::PROTOCOL_ERROR => "ProtocolError",
            Self::UNSUPPORTED_DATA => "InvalidMessageType",
            Self::EMPTY => "Empty",
            Self::ABNORMAL => "Abnormal",
            Self::INVALID_PAYLOAD => "InvalidPayloadData",
            Self::POLICY_VIOLATION => "PolicyViolation",
            Self::MESSAGE_TOO_BIG => "MessageTooBig",
            Self::INTERNAL_ERROR => "InternalServerError",
            Self::TLS => "TlsHandshake",
            _ => return None,
        })
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

/// Status and reason of a close handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: CloseCode,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// The synthesized status reported when the peer vanished without a handshake.
    pub fn empty() -> Self {
        Self::new(CloseCode::EMPTY, String::new())
    }

    pub fn normal(reason: impl Into<String>) -> Self {
        Self::new(CloseCode::NORMAL, reason)
    }

    pub fn internal_error(reason: impl Into<String>) -> Self {
        Self::new(CloseCode::INTERNAL_ERROR, reason)
    }

    /// Reason suitable for logs; blank reasons get a placeholder.
    pub fn display_reason(&self) -> &str {
        if self.reason.trim().is_empty() {
            "<No close reason provided>"
        } else {
            &self.reason
        }
    }
}
