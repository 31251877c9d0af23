//! Websocket transport carrying gateway [`Frame`]s, and the connector seam used by the client.

use std::{fmt::Debug, pin::Pin, task::Poll};

use futures_util::{ready, Sink, SinkExt, Stream, StreamExt};
use miniz_oxide::inflate::{self, TINFLStatus};
use snafu::prelude::*;
use tokio_tungstenite::{self as websocket, tungstenite};
use url::Url;

use super::frame::{Frame, MalformedFrame};

pub(crate) type WebsocketClient =
    websocket::WebSocketStream<websocket::MaybeTlsStream<tokio::net::TcpStream>>;

/// Close codes after which the server refuses to resume the session
const UNRESUMABLE_CLOSE_CODES: [u16; 8] = [4004, 4007, 4009, 4010, 4011, 4012, 4013, 4014];

/// Error when connect to websocket gateway
#[derive(Debug, Snafu)]
#[snafu(
    display("connect ws gateway {url} failed: {source}"),
    visibility(pub(crate))
)]
pub struct ConnectGatewayError {
    /// connected url
    pub url: String,
    /// source error
    pub source: tungstenite::Error,
}

/// Error when read/write the frame stream/sink
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum TransportError {
    /// underlying websocket stream broken
    #[snafu(display("underlying websocket stream broken: {source}"))]
    Websocket {
        /// source error
        source: tungstenite::Error,
    },

    /// server closed the connection
    #[snafu(display("connection closed by server, code {code:?}: {reason}"))]
    Closed {
        /// close code, if any
        code: Option<u16>,
        /// close reason
        reason: String,
    },

    /// decompress binary frame failed
    #[snafu(display("decompress frame failed: {status:?}"))]
    DecompressFailed {
        /// decompress error status code
        status: TINFLStatus,
    },

    /// frame data is not a valid gateway envelope
    #[snafu(display("malformed frame: {source}"))]
    Malformed {
        /// source error
        source: MalformedFrame,
    },
}

impl TransportError {
    /// Check if this error will make the stream/sink stop
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Websocket { .. } | Self::Closed { .. } => true,
            Self::DecompressFailed { .. } | Self::Malformed { .. } => false,
        }
    }

    /// Check if the session can still be resumed after this error
    pub fn is_resumable(&self) -> bool {
        match self {
            Self::Closed {
                code: Some(code), ..
            } => !UNRESUMABLE_CLOSE_CODES.contains(code),
            _ => true,
        }
    }
}

/// Bidirectional frame transport
pub trait Transport:
    Stream<Item = Result<Frame, TransportError>>
    + Sink<Frame, Error = TransportError>
    + Debug
    + Send
    + Unpin
    + 'static
{
}

impl<T> Transport for T where
    T: Stream<Item = Result<Frame, TransportError>>
        + Sink<Frame, Error = TransportError>
        + Debug
        + Send
        + Unpin
        + 'static
{
}

/// Opens transports to the gateway, one per connection attempt
#[async_trait::async_trait]
pub trait Connector: Debug + Send + Sync + 'static {
    /// transport type produced by this connector
    type Transport: Transport;

    /// open a new connection to the gateway
    async fn connect(&self, url: &Url) -> Result<Self::Transport, ConnectGatewayError>;
}

/// Connector using real websocket connections
#[derive(Debug, Default, Clone, Copy)]
pub struct WebsocketConnector;

#[async_trait::async_trait]
impl Connector for WebsocketConnector {
    type Transport = FrameStreamSink;

    async fn connect(&self, url: &Url) -> Result<FrameStreamSink, ConnectGatewayError> {
        log::debug!("Connecting gateway: {}", url);

        let (ws, _) = websocket::connect_async(url.as_str())
            .await
            .context(ConnectGatewaySnafu { url: url.as_str() })?;

        Ok(FrameStreamSink::new(ws))
    }
}

/// Gateway frame stream/sink over a websocket connection
#[derive(Debug)]
pub struct FrameStreamSink {
    ws: WebsocketClient,
}

impl FrameStreamSink {
    /// Construct a new stream with underlying websocket connection.
    ///
    /// Text frames are decoded directly, binary frames are zlib inflated first.
    pub(crate) fn new(ws: WebsocketClient) -> Self {
        Self { ws }
    }

    fn decode_binary(data: &[u8]) -> Result<Frame, TransportError> {
        let inflated = inflate::decompress_to_vec_zlib(data)
            .map_err(|status| TransportError::DecompressFailed { status })?;
        Frame::decode(&inflated).context(error::Malformed)
    }
}

impl Stream for FrameStreamSink {
    type Item = Result<Frame, TransportError>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        loop {
            let message = match ready!(self.ws.poll_next_unpin(cx)) {
                None => return Poll::Ready(None),
                Some(result) => result.context(error::Websocket)?,
            };

            let result = match message {
                tungstenite::Message::Text(text) => {
                    Frame::decode(text.as_bytes()).context(error::Malformed)
                }
                tungstenite::Message::Binary(data) => Self::decode_binary(&data),
                tungstenite::Message::Close(frame) => {
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.into_owned()))
                        .unwrap_or((None, String::new()));
                    Err(TransportError::Closed { code, reason })
                }
                // ping/pong is answered by tungstenite itself
                _ => continue,
            };

            if let Err(ref err) = result {
                log::trace!("Received frame can't be used: {}", err);
            }

            return Poll::Ready(Some(result));
        }
    }
}

impl Sink<Frame> for FrameStreamSink {
    type Error = TransportError;

    fn poll_ready(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_ready_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn start_send(mut self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        log::trace!("Send {} frame", item.op.name());
        self.ws
            .start_send_unpin(tungstenite::Message::Text(item.encode()))
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_flush_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn poll_close(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_close_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_close_code_resumability() {
        let closed = |code| TransportError::Closed {
            code,
            reason: String::new(),
        };

        assert!(closed(None).is_resumable());
        assert!(closed(Some(1001)).is_resumable());
        assert!(closed(Some(4000)).is_resumable());
        assert!(!closed(Some(4009)).is_resumable());
        assert!(!closed(Some(4004)).is_resumable());
        assert!(closed(Some(4004)).is_fatal());
    }

    #[test]
    fn test_malformed_frame_is_not_fatal() {
        let err = Frame::decode(b"oops")
            .context(error::Malformed)
            .unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.is_resumable());
    }

    #[tokio::test]
    async fn test_connect_refused_keeps_url() {
        let url = Url::parse("ws://127.0.0.1:1/?v=10").unwrap();

        let err = WebsocketConnector.connect(&url).await.unwrap_err();

        assert_eq!(err.url, "ws://127.0.0.1:1/?v=10");
        assert!(err.to_string().starts_with("connect ws gateway ws://127.0.0.1:1/?v=10 failed"));
    }

    #[test]
    fn test_decode_compressed_binary_frame() {
        let text = br#"{"op":11,"d":null}"#;
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(text, 6);

        let frame = FrameStreamSink::decode_binary(&compressed).unwrap();
        assert_eq!(frame.op, crate::gateway::frame::Opcode::HeartbeatAck);

        let err = FrameStreamSink::decode_binary(b"not zlib").unwrap_err();
        assert!(matches!(err, TransportError::DecompressFailed { .. }));
    }
}
