//! Gateway wire envelope: `{"op": .., "d": .., "t": .., "s": ..}`.

use serde_json::{Map, Value};
use snafu::prelude::*;

/// Error when parse a text/binary frame as gateway envelope
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum MalformedFrame {
    /// data is invalid json
    #[snafu(display("parse json failed: {source}"))]
    ParseJSONFailed {
        /// raw data, lossy utf8
        json: String,
        /// source error
        source: serde_json::Error,
    },

    /// data json is not an object
    #[snafu(display("frame is not object: {json}"))]
    FrameNotObject {
        /// json string
        json: String,
    },

    /// data json has no op field
    #[snafu(display("frame has no op field: {json}"))]
    NoOpcode {
        /// json string
        json: String,
    },

    /// op field is not an unsigned integer
    #[snafu(display("frame has non-number op field: {json}"))]
    OpcodeNotNumber {
        /// json string
        json: String,
    },

    /// op field value is not a known opcode
    #[snafu(display("frame has unknown opcode {op}"))]
    UnknownOpcode {
        /// opcode number
        op: u64,
    },

    /// t field exists but is not a string
    #[snafu(display("frame has non-string t field: {json}"))]
    EventNameNotString {
        /// json string
        json: String,
    },

    /// s field exists but is not an unsigned integer
    #[snafu(display("frame has non-number s field: {json}"))]
    SequenceNotNumber {
        /// json string
        json: String,
    },

    /// dispatch frame without event name
    #[snafu(display("dispatch frame has no event name"))]
    DispatchWithoutName,

    /// payload does not match the opcode (or event) it was sent with
    #[snafu(display("parse payload of {kind} failed: {source}"))]
    InvalidPayload {
        /// opcode or event name
        kind: String,
        /// source error
        source: serde_json::Error,
    },
}

impl MalformedFrame {
    /// Frames with an opcode this client does not know are skipped silently
    pub fn is_unknown_opcode(&self) -> bool {
        matches!(self, Self::UnknownOpcode { .. })
    }
}

/// Gateway opcodes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// event dispatch, server -> client
    Dispatch,
    /// heartbeat, both directions
    Heartbeat,
    /// identify, client -> server
    Identify,
    /// presence update, client -> server
    PresenceUpdate,
    /// resume, client -> server
    Resume,
    /// reconnect request, server -> client
    Reconnect,
    /// invalid session, server -> client
    InvalidSession,
    /// hello, server -> client
    Hello,
    /// heartbeat ack, server -> client
    HeartbeatAck,
}

impl Opcode {
    /// Opcode from its wire number
    pub fn from_number(op: u64) -> Option<Self> {
        match op {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            3 => Some(Self::PresenceUpdate),
            6 => Some(Self::Resume),
            7 => Some(Self::Reconnect),
            9 => Some(Self::InvalidSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }

    /// Wire number
    pub fn number(self) -> u64 {
        match self {
            Self::Dispatch => 0,
            Self::Heartbeat => 1,
            Self::Identify => 2,
            Self::PresenceUpdate => 3,
            Self::Resume => 6,
            Self::Reconnect => 7,
            Self::InvalidSession => 9,
            Self::Hello => 10,
            Self::HeartbeatAck => 11,
        }
    }

    /// Name for logging
    pub fn name(self) -> &'static str {
        match self {
            Self::Dispatch => "Dispatch",
            Self::Heartbeat => "Heartbeat",
            Self::Identify => "Identify",
            Self::PresenceUpdate => "PresenceUpdate",
            Self::Resume => "Resume",
            Self::Reconnect => "Reconnect",
            Self::InvalidSession => "InvalidSession",
            Self::Hello => "Hello",
            Self::HeartbeatAck => "HeartbeatAck",
        }
    }
}

/// One gateway envelope
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// opcode
    pub op: Opcode,
    /// payload, `null` when absent
    pub d: Value,
    /// event name, dispatch only
    pub t: Option<String>,
    /// sequence number, dispatch only
    pub s: Option<u64>,
}

impl Frame {
    /// Frame with only opcode and payload
    pub fn new(op: Opcode, d: Value) -> Self {
        Self {
            op,
            d,
            t: None,
            s: None,
        }
    }

    /// Decode raw frame data
    pub fn decode(data: &[u8]) -> Result<Self, MalformedFrame> {
        let lossy = || String::from_utf8_lossy(data).into_owned();

        let mut value: Value =
            serde_json::from_slice(data).with_context(|_| error::ParseJSONFailed { json: lossy() })?;

        let obj = value
            .as_object_mut()
            .with_context(|| error::FrameNotObject { json: lossy() })?;

        let op = obj
            .get("op")
            .with_context(|| error::NoOpcode { json: lossy() })?
            .as_u64()
            .with_context(|| error::OpcodeNotNumber { json: lossy() })?;

        let op = Opcode::from_number(op).context(error::UnknownOpcode { op })?;

        let t = match obj.remove("t") {
            None | Some(Value::Null) => None,
            Some(Value::String(t)) => Some(t),
            Some(_) => return error::EventNameNotString { json: lossy() }.fail(),
        };

        let s = match obj.get("s") {
            None | Some(Value::Null) => None,
            Some(s) => Some(
                s.as_u64()
                    .with_context(|| error::SequenceNotNumber { json: lossy() })?,
            ),
        };

        let d = obj.remove("d").unwrap_or(Value::Null);

        Ok(Self { op, d, t, s })
    }

    /// Encode to text frame, absent `t`/`s` are omitted
    pub fn encode(&self) -> String {
        let mut obj = Map::with_capacity(4);
        obj.insert("op".to_string(), Value::from(self.op.number()));
        obj.insert("d".to_string(), self.d.clone());
        if let Some(ref t) = self.t {
            obj.insert("t".to_string(), Value::String(t.clone()));
        }
        if let Some(s) = self.s {
            obj.insert("s".to_string(), Value::from(s));
        }
        Value::Object(obj).to_string()
    }
}
