//! crate error types

use snafu::prelude::*;

use crate::{
    api::Error as APIError,
    cache::FetchError,
    config::ConfigError,
    gateway::{ConnectGatewayError, TransportError},
};

/// crate result type
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by user callbacks and fetch functions
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// crate error type
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    /// Configuration is missing or invalid
    #[snafu(display("load configuration failed: {source}"))]
    LoadConfigFailed {
        /// source error
        source: ConfigError,
    },

    /// Call clash of clans api failed
    #[snafu(display("call clash of clans api failed: {source}"))]
    CallAPIFailed {
        /// source error
        source: APIError,
    },

    /// Open gateway connection failed
    #[snafu(display("gateway connection attempt failed: {source}"))]
    ConnectGatewayFailed {
        /// source error
        source: ConnectGatewayError,
    },

    /// Gateway connection dropped
    #[snafu(display("gateway connection dropped: {source}"))]
    ConnectionDropped {
        /// source error
        source: TransportError,
    },

    /// Background refresh of a poll cache failed
    #[snafu(display("background refresh failed: {source}"))]
    RefreshFailed {
        /// source error
        source: FetchError,
    },

    /// A subscriber callback returned an error
    #[snafu(display("subscriber callback {callback} failed: {source}"))]
    SubscriberFailed {
        /// callback name
        callback: String,
        /// source error
        source: BoxError,
    },
}
