//! Gateway event subscribers.

use std::future::Future;

use serde_json::Value;

use super::message::Ready;
use crate::BoxError;

/// Result of a subscriber callback, errors are reported to the error sink and swallowed
pub type HandlerResult = Result<(), BoxError>;

/// Subscriber for gateway events.
///
/// Every method has a no-op default, implement only what you need.
/// Callbacks run inside the connection loop, long work should be spawned.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    /// session established
    async fn on_ready(&self, _ready: &Ready) -> HandlerResult {
        Ok(())
    }

    /// every dispatched event, including the ones with a dedicated callback
    async fn on_event(&self, _name: &str, _data: &Value) -> HandlerResult {
        Ok(())
    }

    /// MESSAGE_CREATE event
    async fn on_message_create(&self, _data: &Value) -> HandlerResult {
        Ok(())
    }

    /// MESSAGE_UPDATE event
    async fn on_message_update(&self, _data: &Value) -> HandlerResult {
        Ok(())
    }
}

#[async_trait::async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(String, Value) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn on_event(&self, name: &str, data: &Value) -> HandlerResult {
        self(name.to_string(), data.clone()).await
    }
}

/// Handler ignoring every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl EventHandler for NoopHandler {}
