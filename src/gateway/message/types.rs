use serde::{Deserialize, Serialize};

/// Hello message data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

/// Client identification properties sent with identify
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    /// operating system
    pub os: String,
    /// library or application name
    pub browser: String,
    /// library or application name
    pub device: String,
}

/// Identify message data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identify {
    /// authorization token
    pub token: String,
    /// client properties
    pub properties: ConnectionProperties,
    /// gateway intents, bot tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intents: Option<u64>,
    /// ask server to compress payloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,
}

/// Resume message data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resume {
    /// authorization token
    pub token: String,
    /// session to resume
    pub session_id: String,
    /// last received sequence number
    pub seq: u64,
}

/// Discord user, as found in the ready payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// user id
    pub id: String,
    /// unique user name
    pub username: String,
    /// display name
    #[serde(default)]
    pub global_name: Option<String>,
    /// is a bot account
    #[serde(default)]
    pub bot: bool,
    /// nitro subscription level, 0 for none
    #[serde(default)]
    pub premium_type: u8,
}

impl User {
    /// Bots and nitro users can use custom emojis everywhere
    pub fn can_use_custom_emojis(&self) -> bool {
        self.bot || self.premium_type > 0
    }
}

/// READY event data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ready {
    /// gateway api version
    #[serde(default)]
    pub v: u8,
    /// current user
    pub user: User,
    /// session id, used for resume
    pub session_id: String,
    /// url hinted for resume, not tracked by the client
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
}

/// Online status
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// online
    Online,
    /// do not disturb
    Dnd,
    /// away
    Idle,
    /// shown as offline
    Invisible,
    /// offline
    Offline,
}

/// Start and end unix timestamps (milliseconds) of an activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTimestamps {
    /// start time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    /// end time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

/// Presence activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// activity name
    pub name: String,
    /// 0 playing, 1 streaming, 2 listening, 3 watching, 4 custom, 5 competing
    #[serde(rename = "type")]
    pub kind: u8,
    /// what the user is doing
    #[serde(default)]
    pub details: Option<String>,
    /// current party status
    #[serde(default)]
    pub state: Option<String>,
    /// activity time range
    #[serde(default)]
    pub timestamps: Option<ActivityTimestamps>,
    /// application id for rich presence assets
    #[serde(default)]
    pub application_id: Option<String>,
}

impl Activity {
    /// Activity with a name and a kind only
    pub fn new<S: Into<String>>(name: S, kind: u8) -> Self {
        Self {
            name: name.into(),
            kind,
            details: None,
            state: None,
            timestamps: None,
            application_id: None,
        }
    }
}

/// Presence update message data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    /// unix time (milliseconds) since when the client is idle
    pub since: Option<u64>,
    /// activities
    pub activities: Vec<Activity>,
    /// status
    pub status: Status,
    /// is afk
    pub afk: bool,
}

impl Presence {
    /// Online presence with given activities
    pub fn online(activities: Vec<Activity>) -> Self {
        Self {
            since: None,
            activities,
            status: Status::Online,
            afk: false,
        }
    }
}
