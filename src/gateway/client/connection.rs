use std::{sync::Arc, time::Duration};

use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use tokio::time::Instant;

use super::{Client, Command, Disconnect};
use crate::{
    gateway::{
        frame::Frame,
        handler::HandlerResult,
        message::{Dispatch, EventKind, Message, Resume},
        session::SessionState,
        transport::{Connector, TransportError},
    },
    sink::ErrorSink,
    Error,
};

type FrameSink<C> = SplitSink<<C as Connector>::Transport, Frame>;

/// `Err` ends the connection
type Step = Result<(), Disconnect>;

impl<C: Connector> Client<C> {
    /// Drive one transport until it ends, returning why
    pub(super) async fn drive(&mut self, transport: C::Transport) -> Disconnect {
        let connection = self.session.new_connection();
        self.ready_since = None;
        self.set_state(SessionState::AwaitingHello);

        log::debug!("Connection {} open, waiting for hello", connection);

        let (mut sink, mut stream) = transport.split();

        let disconnect = loop {
            let step = tokio::select! {
                biased;

                Some(command) = self.commands.recv() => {
                    self.handle_command(&mut sink, command).await
                }

                incoming = stream.next() => {
                    match incoming {
                        None => Err(Disconnect::Dropped(None)),
                        Some(Err(err)) => self.handle_transport_error(err),
                        Some(Ok(frame)) => self.handle_frame(&mut sink, frame).await,
                    }
                }
            };

            if let Err(disconnect) = step {
                break disconnect;
            }
        };

        self.session.end_connection();

        if let Err(err) = sink.close().await {
            log::debug!("Close connection {} failed: {}", connection, err);
        }

        log::debug!("Connection {} ended: {:?}", connection, disconnect);

        disconnect
    }

    fn handle_transport_error(&self, err: TransportError) -> Step {
        if err.is_fatal() {
            return Err(err.into());
        }

        match &err {
            TransportError::Malformed { source } if source.is_unknown_opcode() => {
                log::debug!("Ignore frame: {}", err)
            }
            _ => log::warn!("Drop unusable frame: {}", err),
        }

        Ok(())
    }

    async fn handle_command(&mut self, sink: &mut FrameSink<C>, command: Command) -> Step {
        match command {
            Command::Stop => {
                log::info!("Stop requested");
                Err(Disconnect::Stopped)
            }
            Command::UpdatePresence(presence) => {
                let ready = *self.state_rx.borrow() == SessionState::Ready;
                self.presence = Some(presence.clone());
                if ready {
                    send(sink, Message::PresenceUpdate(presence)).await?;
                }
                Ok(())
            }
            Command::Heartbeat { connection } => {
                if connection != self.session.connection {
                    log::trace!("Ignore heartbeat tick of old connection {}", connection);
                    return Ok(());
                }

                if self.session.heartbeat_in_flight && self.config.detect_zombie {
                    log::warn!("Heartbeat not acknowledged in time, connection is zombied");
                    return Err(Disconnect::Zombie);
                }

                self.send_heartbeat(sink).await?;
                self.schedule_heartbeat();
                Ok(())
            }
        }
    }

    async fn handle_frame(&mut self, sink: &mut FrameSink<C>, frame: Frame) -> Step {
        if let Some(seq) = frame.s {
            self.session.record_sequence(seq);
        }

        let message = match Message::from_frame(frame) {
            Ok(message) => message,
            Err(err) => {
                log::warn!("Drop unusable frame: {}", err);
                return Ok(());
            }
        };

        log::trace!("Received {} message", message.type_name());

        match message {
            Message::Hello(hello) => {
                let interval = Duration::from_millis(hello.heartbeat_interval);
                log::debug!("Hello, heartbeat interval {:?}", interval);

                self.session.heartbeat_interval = Some(interval);
                self.send_heartbeat(sink).await?;
                self.schedule_heartbeat();

                let resume = self.session.resume_arguments().map(|(session_id, seq)| Resume {
                    token: self.config.token.clone(),
                    session_id: session_id.to_string(),
                    seq,
                });

                match resume {
                    Some(resume) => {
                        log::info!("Resume session {} at {}", resume.session_id, resume.seq);
                        self.set_state(SessionState::Resuming);
                        send(sink, Message::Resume(resume)).await?;
                    }
                    None => {
                        log::info!("Identify new session");
                        self.set_state(SessionState::Identifying);
                        send(sink, Message::Identify(self.config.identify())).await?;
                    }
                }
                Ok(())
            }
            Message::HeartbeatAck => {
                log::trace!("Heartbeat acknowledged");
                self.session.heartbeat_in_flight = false;
                self.schedule_heartbeat();
                Ok(())
            }
            Message::Heartbeat(_) => {
                log::debug!("Server requested a heartbeat");
                self.send_heartbeat(sink).await
            }
            Message::Reconnect => {
                log::info!("Server requested reconnect");
                Err(Disconnect::Reconnect)
            }
            Message::InvalidSession(resumable) => {
                log::warn!("Session invalidated, resumable: {}", resumable);
                Err(Disconnect::InvalidSession { resumable })
            }
            Message::Dispatch(dispatch) => self.handle_dispatch(sink, dispatch).await,
            other => {
                log::debug!("Ignore unexpected {} message from server", other.type_name());
                Ok(())
            }
        }
    }

    async fn handle_dispatch(&mut self, sink: &mut FrameSink<C>, dispatch: Dispatch) -> Step {
        log::trace!("Dispatch {} seq {:?}", dispatch.name, dispatch.seq);

        match &dispatch.kind {
            EventKind::Ready(ready) => {
                log::info!(
                    "Ready as {}, session {}",
                    ready.user.username,
                    ready.session_id
                );
                self.session.session_id = Some(ready.session_id.clone());
                self.became_ready(sink).await?;
            }
            EventKind::Resumed => {
                log::info!("Session resumed");
                self.became_ready(sink).await?;
            }
            _ => {}
        }

        let handler = Arc::clone(&self.handler);
        let errors = Arc::clone(&self.errors);

        let result = handler.on_event(&dispatch.name, &dispatch.data).await;
        notify(&*errors, "on_event", result).await;

        let (callback, result) = match &dispatch.kind {
            EventKind::Ready(ready) => ("on_ready", handler.on_ready(ready).await),
            EventKind::MessageCreate => (
                "on_message_create",
                handler.on_message_create(&dispatch.data).await,
            ),
            EventKind::MessageUpdate => (
                "on_message_update",
                handler.on_message_update(&dispatch.data).await,
            ),
            EventKind::Resumed | EventKind::Other => return Ok(()),
        };
        notify(&*errors, callback, result).await;

        Ok(())
    }

    async fn became_ready(&mut self, sink: &mut FrameSink<C>) -> Step {
        self.ready_since.get_or_insert_with(Instant::now);
        self.set_state(SessionState::Ready);

        if let Some(presence) = self.presence.clone() {
            log::debug!("Restore presence");
            send(sink, Message::PresenceUpdate(presence)).await?;
        }

        Ok(())
    }

    async fn send_heartbeat(&mut self, sink: &mut FrameSink<C>) -> Step {
        self.session.heartbeat_in_flight = true;
        send(sink, Message::Heartbeat(self.session.sequence)).await?;
        Ok(())
    }

    fn schedule_heartbeat(&mut self) {
        let interval = match self.session.heartbeat_interval {
            Some(interval) => interval,
            None => {
                log::debug!("No heartbeat interval known yet, heartbeat not scheduled");
                return;
            }
        };

        let connection = self.session.connection;
        let commands = self.command_tx.clone();

        let handle = self.scheduler.after(interval, move || {
            if commands.send(Command::Heartbeat { connection }).is_err() {
                log::trace!("Client gone before heartbeat tick");
            }
            std::future::ready(())
        });

        self.session.heartbeat_timer.replace(handle);
    }
}

/// Subscriber errors are logged, reported and swallowed
async fn notify(errors: &dyn ErrorSink, callback: &str, result: HandlerResult) {
    if let Err(source) = result {
        let err = Error::SubscriberFailed {
            callback: callback.to_string(),
            source,
        };
        log::error!("{}", err);
        errors.report(&err).await;
    }
}

async fn send<S>(sink: &mut S, message: Message) -> Result<(), TransportError>
where
    S: futures_util::Sink<Frame, Error = TransportError> + Unpin,
{
    log::trace!("Send {} message", message.type_name());
    sink.send(message.into_frame()).await
}
