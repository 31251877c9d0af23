use snafu::prelude::*;

/// Clash of Clans api error
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(variant), context(suffix(false)))]
pub enum Error {
    /// developer token can't be used as an `Authorization` header value
    #[snafu(display("api token is invalid"))]
    TokenInvalid,

    /// base url can't have path segments appended
    #[snafu(display("base url {url} can not be used as api root"))]
    InvalidBaseURL {
        /// the url
        url: String,
    },

    /// building the underlying reqwest client failed
    #[snafu(display("build http client failed: {source}"))]
    ClientCreateFailed {
        /// source error
        source: reqwest::Error,
    },

    /// request could not be sent, or its body could not be read
    #[snafu(display("{} url {url} failed: {source}", method.as_str()))]
    RequestFailed {
        /// http method
        method: reqwest::Method,
        /// target url
        url: String,
        /// source http error
        source: reqwest::Error,
    },

    /// http response of api request is not OK(200), nor a not found
    #[snafu(display("{} url {url} got http status code {status_code}: {reason}", method.as_str()))]
    HTTPStatusNotOK {
        /// http method
        method: reqwest::Method,
        /// request url
        url: String,
        /// received http status code
        status_code: reqwest::StatusCode,
        /// reason given by the api, if any
        reason: String,
    },

    /// response body is not the expected json document
    #[snafu(display("parse response body {body:?} failed: {source}"))]
    ParseBodyFailed {
        /// raw body
        body: bytes::Bytes,
        /// serde error
        source: serde_json::Error,
    },
}
