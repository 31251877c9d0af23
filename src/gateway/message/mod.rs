//! Typed gateway messages on top of raw [`Frame`]s.

mod types;

pub use types::{
    Activity, ActivityTimestamps, ConnectionProperties, Hello, Identify, Presence, Ready, Resume,
    Status, User,
};

use enum_as_inner::EnumAsInner;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use snafu::prelude::*;

use super::frame::{error, Frame, MalformedFrame, Opcode};

/// Known dispatch event names
#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum EventKind {
    /// READY, session established
    Ready(Box<Ready>),
    /// RESUMED, session resumed
    Resumed,
    /// MESSAGE_CREATE
    MessageCreate,
    /// MESSAGE_UPDATE
    MessageUpdate,
    /// any other event
    Other,
}

/// Dispatched event
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// sequence number
    pub seq: Option<u64>,
    /// event name
    pub name: String,
    /// parsed kind
    pub kind: EventKind,
    /// raw event data
    pub data: Value,
}

impl Dispatch {
    fn new(seq: Option<u64>, name: String, data: Value) -> Result<Self, MalformedFrame> {
        let kind = match name.as_str() {
            "READY" => EventKind::Ready(Box::new(parse_payload(&name, data.clone())?)),
            "RESUMED" => EventKind::Resumed,
            "MESSAGE_CREATE" => EventKind::MessageCreate,
            "MESSAGE_UPDATE" => EventKind::MessageUpdate,
            _ => EventKind::Other,
        };

        Ok(Self {
            seq,
            name,
            kind,
            data,
        })
    }
}

/// Gateway protocol message
#[derive(Debug, Clone, PartialEq, EnumAsInner)]
pub enum Message {
    /// Dispatch, server -> client
    Dispatch(Dispatch),
    /// Heartbeat with last sequence number, both directions
    Heartbeat(Option<u64>),
    /// Identify, client -> server
    Identify(Identify),
    /// PresenceUpdate, client -> server
    PresenceUpdate(Presence),
    /// Resume, client -> server
    Resume(Resume),
    /// Reconnect, server -> client
    Reconnect,
    /// InvalidSession with resumable flag, server -> client
    InvalidSession(bool),
    /// Hello, server -> client
    Hello(Hello),
    /// HeartbeatAck, server -> client
    HeartbeatAck,
}

fn parse_payload<T: DeserializeOwned>(kind: &str, data: Value) -> Result<T, MalformedFrame> {
    serde_json::from_value(data).context(error::InvalidPayload { kind })
}

fn to_payload<T: Serialize>(payload: &T) -> Value {
    match serde_json::to_value(payload) {
        Ok(value) => value,
        Err(err) => {
            log::error!("Encode message payload failed: {}", err);
            Value::Null
        }
    }
}

impl Message {
    /// Parse a frame as typed message
    pub fn from_frame(frame: Frame) -> Result<Self, MalformedFrame> {
        let op = frame.op;
        let message = match op {
            Opcode::Dispatch => {
                let name = frame.t.context(error::DispatchWithoutName)?;
                Self::Dispatch(Dispatch::new(frame.s, name, frame.d)?)
            }
            Opcode::Heartbeat => Self::Heartbeat(frame.d.as_u64()),
            Opcode::Identify => Self::Identify(parse_payload(op.name(), frame.d)?),
            Opcode::PresenceUpdate => Self::PresenceUpdate(parse_payload(op.name(), frame.d)?),
            Opcode::Resume => Self::Resume(parse_payload(op.name(), frame.d)?),
            Opcode::Reconnect => Self::Reconnect,
            Opcode::InvalidSession => Self::InvalidSession(frame.d.as_bool().unwrap_or(false)),
            Opcode::Hello => Self::Hello(parse_payload(op.name(), frame.d)?),
            Opcode::HeartbeatAck => Self::HeartbeatAck,
        };
        Ok(message)
    }

    /// Build the frame to be sent
    pub fn into_frame(self) -> Frame {
        let op = self.opcode();
        match self {
            Self::Dispatch(dispatch) => Frame {
                op,
                d: dispatch.data,
                t: Some(dispatch.name),
                s: dispatch.seq,
            },
            Self::Heartbeat(seq) => Frame::new(op, seq.map(Value::from).unwrap_or(Value::Null)),
            Self::Identify(identify) => Frame::new(op, to_payload(&identify)),
            Self::PresenceUpdate(presence) => Frame::new(op, to_payload(&presence)),
            Self::Resume(resume) => Frame::new(op, to_payload(&resume)),
            Self::Reconnect | Self::HeartbeatAck => Frame::new(op, Value::Null),
            Self::InvalidSession(resumable) => Frame::new(op, Value::Bool(resumable)),
            Self::Hello(hello) => Frame::new(op, to_payload(&hello)),
        }
    }

    /// get opcode
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Dispatch(_) => Opcode::Dispatch,
            Self::Heartbeat(_) => Opcode::Heartbeat,
            Self::Identify(_) => Opcode::Identify,
            Self::PresenceUpdate(_) => Opcode::PresenceUpdate,
            Self::Resume(_) => Opcode::Resume,
            Self::Reconnect => Opcode::Reconnect,
            Self::InvalidSession(_) => Opcode::InvalidSession,
            Self::Hello(_) => Opcode::Hello,
            Self::HeartbeatAck => Opcode::HeartbeatAck,
        }
    }

    /// get type name
    pub fn type_name(&self) -> &'static str {
        self.opcode().name()
    }
}
