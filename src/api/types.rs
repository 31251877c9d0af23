//! Clash of Clans HTTP API response envelopes

use serde::Deserialize;

/// Paged list response
#[derive(Debug, Deserialize)]
pub struct ItemList<T> {
    /// listed items, newest first
    pub items: Vec<T>,
}

/// Body of a non successful response
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClientError {
    /// short reason, like `accessDenied` or `notFound`
    pub reason: String,
    /// human readable message
    pub message: Option<String>,
}

impl ClientError {
    pub(crate) fn describe(body: &[u8]) -> String {
        match serde_json::from_slice::<ClientError>(body) {
            Ok(err) => match err.message {
                Some(message) => format!("{} ({})", err.reason, message),
                None => err.reason,
            },
            Err(_) => String::from_utf8_lossy(body).into_owned(),
        }
    }
}
