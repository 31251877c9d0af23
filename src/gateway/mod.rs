//! Persistent gateway connection: framing, typed messages, the session state
//! machine, and the subscriber interface.
//!
//! ```no_run
//! use clanwatch::{config::GatewayConfig, gateway::Client};
//!
//! # async fn demo() {
//! let client = Client::new(GatewayConfig::new("Bot my-token")).with_handler(
//!     |name: String, _data: serde_json::Value| async move {
//!         log::info!("event {}", name);
//!         Ok(())
//!     },
//! );
//! let handle = client.handle();
//! tokio::spawn(client.run());
//! # handle.stop();
//! # }
//! ```

mod client;
mod frame;
mod handler;
mod message;
mod session;
mod transport;

pub use client::{Client, ClientHandle};
pub use frame::{Frame, MalformedFrame, Opcode};
pub use handler::{EventHandler, HandlerResult, NoopHandler};
pub use message::{
    Activity, ActivityTimestamps, ConnectionProperties, Dispatch, EventKind, Hello, Identify,
    Message, Presence, Ready, Resume, Status, User,
};
pub use session::SessionState;
pub use transport::{
    ConnectGatewayError, Connector, FrameStreamSink, Transport, TransportError,
    WebsocketConnector,
};
