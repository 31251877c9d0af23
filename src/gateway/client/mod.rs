//! Gateway client, keeps one logical session alive across transport reconnects.

mod connection;

use std::{cmp, fmt::Debug, sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, watch},
    time::Instant,
};

use super::{
    handler::{EventHandler, NoopHandler},
    message::Presence,
    session::{Session, SessionState},
    transport::{Connector, TransportError, WebsocketConnector},
};
use crate::{
    config::GatewayConfig,
    scheduler::Scheduler,
    sink::{ErrorSink, LogSink},
    Error,
};

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Ready for at least this long before a drop counts as a healthy connection ending
const STABLE_CONNECTION: Duration = Duration::from_secs(30);

/// Requests posted to the connection task
#[derive(Debug)]
pub(crate) enum Command {
    /// heartbeat timer fired for the given connection
    Heartbeat { connection: u64 },
    UpdatePresence(Presence),
    Stop,
}

/// Why a connection ended
#[derive(Debug)]
pub(crate) enum Disconnect {
    Stopped,
    Reconnect,
    InvalidSession { resumable: bool },
    Zombie,
    /// stream ended or broke, `None` when it ended without a close frame
    Dropped(Option<TransportError>),
}

impl From<TransportError> for Disconnect {
    fn from(err: TransportError) -> Self {
        Self::Dropped(Some(err))
    }
}

impl Disconnect {
    fn keeps_session(&self) -> bool {
        match self {
            Self::InvalidSession { resumable } => *resumable,
            Self::Dropped(Some(err)) => err.is_resumable(),
            Self::Stopped | Self::Reconnect | Self::Zombie | Self::Dropped(None) => true,
        }
    }
}

#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    fn new(max: Duration) -> Self {
        let initial = cmp::min(INITIAL_RECONNECT_DELAY, max);
        Self {
            initial,
            max,
            next: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = cmp::min(self.next * 2, self.max);
        delay
    }

    fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// Cheap handle controlling a running [`Client`]
#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
}

impl ClientHandle {
    /// Ask the client to close the connection and return from [`Client::run`].
    ///
    /// Returns false if the client is already gone.
    pub fn stop(&self) -> bool {
        self.commands.send(Command::Stop).is_ok()
    }

    /// Send a presence update now if connected, and again after every future READY.
    pub fn update_presence(&self, presence: Presence) -> bool {
        self.commands.send(Command::UpdatePresence(presence)).is_ok()
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait for the next state change, returning the new state.
    ///
    /// `None` once the client has been dropped.
    pub async fn changed(&mut self) -> Option<SessionState> {
        self.state.changed().await.ok()?;
        let state = *self.state.borrow();
        Some(state)
    }

    /// Wait until the client reaches `target`, returns false if the client is dropped first
    pub async fn wait_for(&mut self, target: SessionState) -> bool {
        loop {
            if *self.state.borrow() == target {
                return true;
            }
            if self.state.changed().await.is_err() {
                return false;
            }
        }
    }
}

/// Gateway client.
///
/// Build it, take a [`ClientHandle`] if you need to control it, then `run` it
/// (usually in its own task). `run` returns only after a stop request.
pub struct Client<C = WebsocketConnector> {
    connector: C,
    config: GatewayConfig,
    handler: Arc<dyn EventHandler>,
    errors: Arc<dyn ErrorSink>,
    scheduler: Scheduler,
    session: Session,
    presence: Option<Presence>,
    commands: mpsc::UnboundedReceiver<Command>,
    command_tx: mpsc::UnboundedSender<Command>,
    state: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
    ready_since: Option<Instant>,
}

impl<C: Debug> Debug for Client<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("connector", &self.connector)
            .field("url", &self.config.url.as_str())
            .field("state", &*self.state_rx.borrow())
            .field("session", &self.session)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl Client<WebsocketConnector> {
    /// Create a client using real websocket connections and ignoring every event.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime, see [`Scheduler::current`].
    pub fn new(config: GatewayConfig) -> Self {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(SessionState::Disconnected);

        Self {
            connector: WebsocketConnector,
            config,
            handler: Arc::new(NoopHandler),
            errors: Arc::new(LogSink),
            scheduler: Scheduler::current(),
            session: Session::default(),
            presence: None,
            commands,
            command_tx,
            state,
            state_rx,
            ready_since: None,
        }
    }
}

impl<C: Connector> Client<C> {
    /// Replace the connector
    pub fn with_connector<C2: Connector>(self, connector: C2) -> Client<C2> {
        Client {
            connector,
            config: self.config,
            handler: self.handler,
            errors: self.errors,
            scheduler: self.scheduler,
            session: self.session,
            presence: self.presence,
            commands: self.commands,
            command_tx: self.command_tx,
            state: self.state,
            state_rx: self.state_rx,
            ready_since: self.ready_since,
        }
    }

    /// Set event subscriber
    pub fn with_handler<H: EventHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Set a shared event subscriber
    pub fn with_shared_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Set where unhandled errors are reported, defaults to [`LogSink`]
    pub fn with_error_sink(mut self, errors: Arc<dyn ErrorSink>) -> Self {
        self.errors = errors;
        self
    }

    /// Set the scheduler running heartbeat timers
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Presence sent after every READY, same as calling [`ClientHandle::update_presence`] before run
    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = Some(presence);
        self
    }

    /// Get a handle to control this client
    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            commands: self.command_tx.clone(),
            state: self.state_rx.clone(),
        }
    }

    /// Connect and keep the session alive until a stop request
    pub async fn run(mut self) {
        log::info!("Gateway client start, endpoint {}", self.config.url);

        let mut backoff = Backoff::new(self.config.max_reconnect_delay);

        loop {
            self.set_state(SessionState::Connecting);

            let connected = tokio::select! {
                _ = idle_until_stop(&mut self.commands, &mut self.presence) => None,
                result = self.connector.connect(&self.config.url) => Some(result),
            };

            let disconnect = match connected {
                None => break,
                Some(Err(err)) => {
                    log::warn!("{}", err);
                    self.errors
                        .report(&Error::ConnectGatewayFailed { source: err })
                        .await;
                    None
                }
                Some(Ok(transport)) => Some(self.drive(transport).await),
            };

            self.session.end_connection();

            let immediately = match disconnect {
                None => false,
                Some(Disconnect::Stopped) => break,
                Some(disconnect) => {
                    if disconnect.keeps_session() {
                        log::info!("Connection ended ({:?}), session kept", disconnect);
                    } else {
                        log::info!("Connection ended ({:?}), session dropped", disconnect);
                        self.session.invalidate();
                    }

                    let immediately =
                        self.stayed_ready() || matches!(disconnect, Disconnect::Reconnect);

                    if let Disconnect::Dropped(Some(err)) = disconnect {
                        self.errors
                            .report(&Error::ConnectionDropped { source: err })
                            .await;
                    }

                    immediately
                }
            };

            self.set_state(SessionState::Disconnected);

            if immediately {
                backoff.reset();
                continue;
            }

            let delay = backoff.next_delay();
            log::info!("Reconnect in {:?}", delay);

            tokio::select! {
                _ = idle_until_stop(&mut self.commands, &mut self.presence) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.session.end_connection();
        self.set_state(SessionState::Stopped);
        log::info!("Gateway client stopped");
    }

    /// Whether the last connection was ready long enough to skip the backoff
    fn stayed_ready(&self) -> bool {
        match self.ready_since {
            Some(since) if since.elapsed() >= STABLE_CONNECTION => true,
            Some(since) => {
                log::warn!("Connection lost {:?} after ready, back off", since.elapsed());
                false
            }
            None => false,
        }
    }

    fn set_state(&self, state: SessionState) {
        let old = self.state.send_replace(state);
        if old != state {
            log::debug!("Gateway state {} -> {}", old, state);
        }
    }
}

/// Consume commands while no connection is open, returns on stop
async fn idle_until_stop(
    commands: &mut mpsc::UnboundedReceiver<Command>,
    presence: &mut Option<Presence>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Stop => return,
            Command::UpdatePresence(p) => *presence = Some(p),
            // stale tick from a closed connection
            Command::Heartbeat { .. } => {}
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use serde_json::{json, Value};
    use tokio::{task::JoinHandle, time::Instant};

    use super::*;
    use crate::{
        config::DEFAULT_INTENTS,
        gateway::{
            frame::{Frame, Opcode},
            handler::HandlerResult,
            message::{Activity, Hello, Message, Ready},
            transport::fake::{FakeConnector, FakeServer},
        },
        sink::collect::CollectSink,
    };

    const INTERVAL: Duration = Duration::from_millis(41250);

    fn hello() -> Frame {
        Message::Hello(Hello {
            heartbeat_interval: 41250,
        })
        .into_frame()
    }

    fn dispatch(name: &str, seq: u64, data: Value) -> Frame {
        Frame {
            op: Opcode::Dispatch,
            d: data,
            t: Some(name.to_string()),
            s: Some(seq),
        }
    }

    fn ready(seq: u64) -> Frame {
        dispatch(
            "READY",
            seq,
            json!({
                "v": 10,
                "user": {"id": "1", "username": "warden", "bot": true},
                "session_id": "abc",
                "resume_gateway_url": "wss://gateway-us-east1-b.discord.gg",
            }),
        )
    }

    fn close(code: u16) -> TransportError {
        TransportError::Closed {
            code: Some(code),
            reason: String::new(),
        }
    }

    async fn recv(server: &mut FakeServer) -> Message {
        let frame = tokio::time::timeout(Duration::from_secs(300), server.from_client.recv())
            .await
            .expect("client sent nothing")
            .expect("client closed the connection");
        Message::from_frame(frame).unwrap()
    }

    fn send(server: &FakeServer, frame: Frame) {
        server.to_client.send(Ok(frame)).unwrap();
    }

    struct Started {
        handle: ClientHandle,
        task: JoinHandle<()>,
        errors: CollectSink,
    }

    fn start(
        connector: &FakeConnector,
        config: GatewayConfig,
        handler: Arc<dyn EventHandler>,
    ) -> Started {
        let errors = CollectSink::default();
        let client = Client::new(config)
            .with_connector(connector.clone())
            .with_shared_handler(handler)
            .with_error_sink(Arc::new(errors.clone()));
        let handle = client.handle();
        let task = tokio::spawn(client.run());
        Started {
            handle,
            task,
            errors,
        }
    }

    fn bot_config() -> GatewayConfig {
        GatewayConfig::new("Bot token")
    }

    /// Complete hello + identify + ready on a fresh server
    async fn establish(server: &mut FakeServer, seq: u64) {
        send(server, hello());
        assert_eq!(recv(server).await, Message::Heartbeat(None));
        assert!(recv(server).await.as_identify().is_some());
        send(server, ready(seq));
    }

    async fn stop(started: Started) {
        assert!(started.handle.stop());
        started.task.await.unwrap();
        assert_eq!(started.handle.state(), SessionState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hello_sends_heartbeat_then_identify() {
        let connector = FakeConnector::default();
        let mut server = connector.push();
        let started = start(&connector, bot_config(), Arc::new(NoopHandler));

        send(&server, hello());
        assert_eq!(recv(&mut server).await, Message::Heartbeat(None));

        let identify = recv(&mut server).await.into_identify().unwrap();
        assert_eq!(identify.token, "Bot token");
        assert_eq!(identify.intents, Some(DEFAULT_INTENTS));

        send(&server, Message::HeartbeatAck.into_frame());
        tokio::task::yield_now().await;
        let acked = Instant::now();

        assert_eq!(recv(&mut server).await, Message::Heartbeat(None));
        let elapsed = acked.elapsed();
        assert!(elapsed >= INTERVAL, "{:?}", elapsed);
        assert!(elapsed < INTERVAL + Duration::from_millis(10), "{:?}", elapsed);

        stop(started).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_carries_greatest_sequence() {
        let connector = FakeConnector::default();
        let mut server = connector.push();
        let started = start(&connector, bot_config(), Arc::new(NoopHandler));

        establish(&mut server, 1).await;
        send(&server, dispatch("GUILD_CREATE", 5, json!({})));
        send(&server, dispatch("TYPING_START", 3, json!({})));
        send(&server, Message::HeartbeatAck.into_frame());

        assert_eq!(recv(&mut server).await, Message::Heartbeat(Some(5)));

        stop(started).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_heartbeat_request_is_answered_immediately() {
        let connector = FakeConnector::default();
        let mut server = connector.push();
        let started = start(&connector, bot_config(), Arc::new(NoopHandler));

        establish(&mut server, 2).await;
        send(&server, Message::HeartbeatAck.into_frame());
        tokio::task::yield_now().await;

        let before = Instant::now();
        send(&server, Message::Heartbeat(None).into_frame());
        assert_eq!(recv(&mut server).await, Message::Heartbeat(Some(2)));
        assert!(before.elapsed() < Duration::from_secs(1));

        stop(started).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_ack_without_zombie_detection_keeps_beating() {
        let connector = FakeConnector::default();
        let mut server = connector.push();
        let mut config = bot_config();
        config.detect_zombie = false;
        let started = start(&connector, config, Arc::new(NoopHandler));

        establish(&mut server, 1).await;

        // no ack at all, heartbeats keep coming on the same connection
        assert_eq!(recv(&mut server).await, Message::Heartbeat(Some(1)));
        assert_eq!(recv(&mut server).await, Message::Heartbeat(Some(1)));
        assert_eq!(connector.attempts(), 1);

        stop(started).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zombie_connection_is_resumed() {
        let connector = FakeConnector::default();
        let mut first = connector.push();
        let mut second = connector.push();
        let started = start(&connector, bot_config(), Arc::new(NoopHandler));

        establish(&mut first, 2).await;

        // heartbeat due with the first one never acknowledged
        tokio::time::sleep(INTERVAL * 2).await;
        assert_eq!(connector.attempts(), 2);

        send(&second, hello());
        assert_eq!(recv(&mut second).await, Message::Heartbeat(Some(2)));
        let resume = recv(&mut second).await.into_resume().unwrap();
        assert_eq!(resume.session_id, "abc");
        assert_eq!(resume.seq, 2);

        stop(started).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumable_drop_resumes() {
        let connector = FakeConnector::default();
        let mut first = connector.push();
        let mut second = connector.push();
        let mut started = start(&connector, bot_config(), Arc::new(NoopHandler));

        establish(&mut first, 2).await;
        assert!(started.handle.wait_for(SessionState::Ready).await);

        first.to_client.send(Err(close(4000))).unwrap();

        send(&second, hello());
        assert_eq!(recv(&mut second).await, Message::Heartbeat(Some(2)));
        let resume = recv(&mut second).await.into_resume().unwrap();
        assert_eq!(resume.token, "Bot token");
        assert_eq!(resume.session_id, "abc");
        assert_eq!(resume.seq, 2);
        assert_eq!(started.handle.state(), SessionState::Resuming);

        send(&second, dispatch("RESUMED", 3, json!({})));
        assert!(started.handle.wait_for(SessionState::Ready).await);

        assert_eq!(started.errors.reported().len(), 1);
        stop(started).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresumable_close_identifies() {
        let connector = FakeConnector::default();
        let mut first = connector.push();
        let mut second = connector.push();
        let started = start(&connector, bot_config(), Arc::new(NoopHandler));

        establish(&mut first, 2).await;
        first.to_client.send(Err(close(4009))).unwrap();

        send(&second, hello());
        assert_eq!(recv(&mut second).await, Message::Heartbeat(None));
        assert!(recv(&mut second).await.as_identify().is_some());

        stop(started).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_request_resumes_immediately() {
        let connector = FakeConnector::default();
        let mut first = connector.push();
        let mut second = connector.push();
        let started = start(&connector, bot_config(), Arc::new(NoopHandler));

        establish(&mut first, 4).await;
        let before = Instant::now();
        send(&first, Message::Reconnect.into_frame());

        send(&second, hello());
        assert_eq!(recv(&mut second).await, Message::Heartbeat(Some(4)));
        assert!(recv(&mut second).await.as_resume().is_some());
        assert!(before.elapsed() < Duration::from_millis(10));

        stop(started).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_session() {
        let connector = FakeConnector::default();
        let mut first = connector.push();
        let mut second = connector.push();
        let mut third = connector.push();
        let started = start(&connector, bot_config(), Arc::new(NoopHandler));

        establish(&mut first, 4).await;
        send(&first, Message::InvalidSession(true).into_frame());

        send(&second, hello());
        assert_eq!(recv(&mut second).await, Message::Heartbeat(Some(4)));
        assert!(recv(&mut second).await.as_resume().is_some());

        send(&second, Message::InvalidSession(false).into_frame());

        send(&third, hello());
        assert_eq!(recv(&mut third).await, Message::Heartbeat(None));
        assert!(recv(&mut third).await.as_identify().is_some());

        stop(started).await;
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        ready: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EventHandler for Recorder {
        async fn on_ready(&self, ready: &Ready) -> HandlerResult {
            self.ready.fetch_add(1, Ordering::SeqCst);
            self.events
                .lock()
                .unwrap()
                .push(format!("ready {}", ready.session_id));
            Ok(())
        }

        async fn on_event(&self, name: &str, _data: &Value) -> HandlerResult {
            self.events.lock().unwrap().push(name.to_string());
            if name == "BROKEN" {
                return Err("handler failed".into());
            }
            Ok(())
        }

        async fn on_message_create(&self, data: &Value) -> HandlerResult {
            self.events
                .lock()
                .unwrap()
                .push(format!("create {}", data["content"]));
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_reach_handler_in_order() {
        let connector = FakeConnector::default();
        let mut server = connector.push();
        let recorder = Arc::new(Recorder::default());
        let handler = recorder.clone() as Arc<dyn EventHandler>;
        let started = start(&connector, bot_config(), handler);

        establish(&mut server, 1).await;
        send(&server, dispatch("MESSAGE_CREATE", 2, json!({"content": "!war"})));
        send(&server, dispatch("BROKEN", 3, json!({})));
        send(&server, server_garbage());
        send(&server, dispatch("MESSAGE_UPDATE", 4, json!({})));
        send(&server, Message::HeartbeatAck.into_frame());

        // heartbeat after the ack proves everything before it was handled
        assert_eq!(recv(&mut server).await, Message::Heartbeat(Some(4)));

        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![
                "READY",
                "ready abc",
                "MESSAGE_CREATE",
                "create \"!war\"",
                "BROKEN",
                "MESSAGE_UPDATE",
            ]
        );
        assert_eq!(recorder.ready.load(Ordering::SeqCst), 1);

        let reported = started.errors.reported();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].contains("on_event"), "{}", reported[0]);
        assert_eq!(connector.attempts(), 1);

        stop(started).await;
    }

    /// a frame the client can't interpret
    fn server_garbage() -> Frame {
        Frame::new(Opcode::Hello, json!({"interval": "soon"}))
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frames_are_dropped() {
        let connector = FakeConnector::default();
        let mut server = connector.push();
        let started = start(&connector, bot_config(), Arc::new(NoopHandler));

        establish(&mut server, 1).await;
        let malformed = Frame::decode(br#"{"op": 42, "d": null}"#).unwrap_err();
        server
            .to_client
            .send(Err(TransportError::Malformed { source: malformed }))
            .unwrap();
        send(&server, server_garbage());
        send(&server, Message::HeartbeatAck.into_frame());

        assert_eq!(recv(&mut server).await, Message::Heartbeat(Some(1)));
        assert_eq!(connector.attempts(), 1);
        assert!(started.errors.reported().is_empty());

        stop(started).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_presence_is_sent_when_ready() {
        let connector = FakeConnector::default();
        let mut first = connector.push();
        let mut second = connector.push();
        let started = start(&connector, bot_config(), Arc::new(NoopHandler));

        let presence = Presence::online(vec![Activity::new("Clan war", 5)]);
        assert!(started.handle.update_presence(presence.clone()));

        establish(&mut first, 1).await;
        assert_eq!(
            recv(&mut first).await,
            Message::PresenceUpdate(presence.clone())
        );

        let updated = Presence::online(vec![Activity::new("Raid weekend", 5)]);
        started.handle.update_presence(updated.clone());
        assert_eq!(
            recv(&mut first).await,
            Message::PresenceUpdate(updated.clone())
        );

        // lost on reconnect, sent again once resumed
        first.to_client.send(Err(close(1001))).unwrap();
        send(&second, hello());
        assert!(recv(&mut second).await.as_heartbeat().is_some());
        assert!(recv(&mut second).await.as_resume().is_some());
        send(&second, dispatch("RESUMED", 2, json!({})));
        assert_eq!(recv(&mut second).await, Message::PresenceUpdate(updated));

        stop(started).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_connected() {
        let connector = FakeConnector::default();
        let mut server = connector.push();
        let mut started = start(&connector, bot_config(), Arc::new(NoopHandler));

        establish(&mut server, 1).await;
        assert!(started.handle.wait_for(SessionState::Ready).await);

        let handle = started.handle.clone();
        stop(started).await;
        assert!(!handle.stop());

        // transport was closed, no more heartbeats
        assert!(server.from_client.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failures_back_off() {
        let connector = FakeConnector::default();
        let started = start(&connector, bot_config(), Arc::new(NoopHandler));
        let begin = Instant::now();

        // attempts at 0, 1, 3, 7 seconds
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(connector.attempts(), 1);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(connector.attempts(), 2);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(connector.attempts(), 3);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(connector.attempts(), 3);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(connector.attempts(), 4);
        assert!(begin.elapsed() < Duration::from_secs(8));

        assert_eq!(started.errors.reported().len(), 4);
        assert_eq!(started.handle.state(), SessionState::Disconnected);

        // stop honoured during the backoff delay
        stop(started).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_resets_backoff() {
        let connector = FakeConnector::default();
        let started = start(&connector, bot_config(), Arc::new(NoopHandler));

        // fail twice, next delay would be 4s
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(connector.attempts(), 2);

        let mut server = connector.push();
        let mut next = connector.push();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(connector.attempts(), 3);

        establish(&mut server, 1).await;
        tokio::time::sleep(STABLE_CONNECTION).await;
        let dropped = Instant::now();
        server.to_client.send(Err(close(1000))).unwrap();

        send(&next, hello());
        assert!(recv(&mut next).await.as_heartbeat().is_some());
        assert!(dropped.elapsed() < Duration::from_millis(10));

        stop(started).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_right_after_ready_backs_off() {
        let connector = FakeConnector::default();
        let mut first = connector.push();
        let mut second = connector.push();
        let mut third = connector.push();
        let started = start(&connector, bot_config(), Arc::new(NoopHandler));

        establish(&mut first, 1).await;
        tokio::task::yield_now().await;
        let dropped = Instant::now();
        first.to_client.send(Err(close(1000))).unwrap();

        send(&second, hello());
        assert!(recv(&mut second).await.as_heartbeat().is_some());
        let waited = dropped.elapsed();
        assert!(waited >= Duration::from_secs(1), "{:?}", waited);
        assert!(waited < Duration::from_secs(2), "{:?}", waited);

        assert!(recv(&mut second).await.as_resume().is_some());
        send(&second, dispatch("RESUMED", 2, json!({})));
        tokio::task::yield_now().await;
        let dropped = Instant::now();
        second.to_client.send(Err(close(1000))).unwrap();

        // still flapping, the delay keeps growing
        send(&third, hello());
        assert!(recv(&mut third).await.as_heartbeat().is_some());
        let waited = dropped.elapsed();
        assert!(waited >= Duration::from_secs(2), "{:?}", waited);
        assert!(waited < Duration::from_secs(3), "{:?}", waited);

        stop(started).await;
    }

    #[test]
    fn test_backoff_is_capped() {
        let mut backoff = Backoff::new(Duration::from_secs(5));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
