//! The session state machine.
//!
//! A [`SessionMachine`] owns the one [`Session`] of a client and is the
//! only thing that mutates it. It reacts to three kinds of input, one at
//! a time and each to completion:
//!
//! - user intents: [`connect`](SessionMachine::connect),
//!   [`disconnect`](SessionMachine::disconnect),
//!   [`send_chat`](SessionMachine::send_chat),
//!   [`teardown`](SessionMachine::teardown)
//! - transport lifecycle events and incoming messages, both delivered
//!   through [`handle_transport_event`](SessionMachine::handle_transport_event)
//!
//! Nothing here blocks. Transport requests are fire-and-forget; their
//! outcomes come back later as more transport events.

use parley_protocol::{decode_identity, ParticipantIdentity, TopicKind};
use parley_transport::{
    return_code, validate_topic, ConnectOptions, Connection, EventSender, Transport,
    TransportEvent,
};

use crate::presence::{Participant, PresenceManager};
use crate::{
    ChatRelay, Clock, ConnectRequest, ConnectionState, SessionConfig, SessionError,
    SessionFault, ViewEvent, ViewSender,
};

/// Everything that lives for one connection attempt.
pub struct Session<C> {
    state: ConnectionState,
    identity: Option<ParticipantIdentity>,
    connection: Option<C>,
}

impl<C> Session<C> {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            identity: None,
            connection: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Our identity, from the moment `connect` is accepted until the
    /// session is back to disconnected.
    pub fn identity(&self) -> Option<&ParticipantIdentity> {
        self.identity.as_ref()
    }
}

/// Drives one client's connection lifecycle.
///
/// Generic over the transport (`T`) and the wall clock (`K`), so tests
/// can swap in an in-process broker and a manual clock.
pub struct SessionMachine<T: Transport, K: Clock> {
    transport: T,
    clock: K,
    config: SessionConfig,
    session: Session<T::Connection>,
    presence: PresenceManager,
    chat: ChatRelay,
    transport_events: EventSender,
    view: ViewSender,
}

impl<T: Transport, K: Clock> SessionMachine<T, K> {
    /// Creates a disconnected machine.
    ///
    /// `transport_events` is handed to every connection the machine opens;
    /// whoever owns the receiving end must feed those events back through
    /// [`handle_transport_event`](Self::handle_transport_event).
    pub fn new(
        transport: T,
        clock: K,
        config: SessionConfig,
        transport_events: EventSender,
        view: ViewSender,
    ) -> Self {
        let presence = PresenceManager::new(config.topics.clone(), config.freshness_window);
        let chat = ChatRelay::new(config.topics.clone());
        Self {
            transport,
            clock,
            config,
            session: Session::new(),
            presence,
            chat,
            transport_events,
            view,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Read access to the session.
    pub fn session(&self) -> &Session<T::Connection> {
        &self.session
    }

    /// Everyone currently listed as present, self first.
    pub fn participants(&self) -> &[Participant] {
        self.presence.participants()
    }

    // -----------------------------------------------------------------
    // User intents
    // -----------------------------------------------------------------

    /// Starts connecting with a freshly generated identity.
    ///
    /// Only valid while disconnected. The outcome arrives later as a
    /// transport event. If the transport rejects the request outright,
    /// the view gets `ConnectionFailed`, the session returns to
    /// disconnected, and the error is also returned here.
    pub fn connect(&mut self, request: ConnectRequest) -> Result<(), SessionError> {
        self.require(ConnectionState::Disconnected, "connect")?;
        request.validate()?;

        let identity = ParticipantIdentity::generate(&request.username, self.clock.now_millis());
        // A custom topic scheme can still produce an unusable presence topic.
        validate_topic(&self.config.topics.presence_topic_for(identity.client_id()))
            .map_err(|e| SessionError::InvalidInput(e.to_string()))?;
        let options = ConnectOptions {
            host: request.host,
            port: request.port,
            client_id: identity.client_id().to_string(),
            username: request.username,
            password: request.password,
            will: Some(self.presence.departure(&identity)),
        };

        tracing::info!(
            client_id = identity.client_id(),
            host = %options.host,
            port = options.port,
            "connecting"
        );
        self.session.identity = Some(identity);
        self.set_state(ConnectionState::Connecting);

        match self.transport.connect(options, self.transport_events.clone()) {
            Ok(connection) => {
                self.session.connection = Some(connection);
                Ok(())
            }
            Err(e) => {
                tracing::info!(error = %e, "connect request rejected by transport");
                self.fault(SessionFault::connection_failed(
                    return_code::SOCKET_ERROR,
                    e.to_string(),
                ));
                self.reset();
                Err(e.into())
            }
        }
    }

    /// Leaves the chat: publishes our tombstone, then asks the transport
    /// to disconnect. Completion arrives as a transport event.
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        self.require(ConnectionState::Connected, "disconnect")?;

        let (Some(identity), Some(connection)) =
            (self.session.identity.as_ref(), self.session.connection.as_mut())
        else {
            self.reset();
            return Ok(());
        };

        tracing::info!(client_id = identity.client_id(), "disconnecting");
        let tombstone = self.presence.departure(identity);
        if let Err(e) = connection.publish(tombstone) {
            tracing::warn!(error = %e, "failed to publish departure");
        }

        match connection.disconnect() {
            Ok(()) => {
                self.set_state(ConnectionState::Disconnecting);
                Ok(())
            }
            Err(e) => {
                // The transport is already gone; finish locally.
                tracing::warn!(error = %e, "disconnect request failed");
                self.reset();
                Ok(())
            }
        }
    }

    /// Publishes a chat line. Only valid while connected.
    pub fn send_chat(&mut self, text: &str) -> Result<(), SessionError> {
        self.require(ConnectionState::Connected, "send a message")?;
        let (Some(identity), Some(connection)) =
            (self.session.identity.as_ref(), self.session.connection.as_mut())
        else {
            return Err(SessionError::InvalidState {
                operation: "send a message",
                state: self.session.state,
            });
        };

        let publish = self.chat.encode(identity, text)?;
        tracing::debug!(client_id = identity.client_id(), len = text.len(), "sending chat");
        connection.publish(publish)?;
        Ok(())
    }

    /// The hosting environment is going away.
    ///
    /// Takes the same path as [`disconnect`](Self::disconnect) when
    /// connected. A pending connect attempt is abandoned. Best effort:
    /// nothing here waits for the broker.
    pub fn teardown(&mut self) {
        match self.session.state {
            ConnectionState::Connected => {
                if let Err(e) = self.disconnect() {
                    tracing::debug!(error = %e, "teardown disconnect failed");
                }
            }
            ConnectionState::Connecting => {
                tracing::debug!("abandoning pending connect");
                self.reset();
            }
            ConnectionState::Disconnecting | ConnectionState::Disconnected => {}
        }
    }

    // -----------------------------------------------------------------
    // Transport events
    // -----------------------------------------------------------------

    /// Reacts to one event from the transport.
    ///
    /// Events that make no sense in the current state (for example a
    /// message arriving after we started disconnecting) are logged and
    /// dropped.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        use ConnectionState as S;

        match (self.session.state, event) {
            (S::Connecting, TransportEvent::Connected) => self.on_connected(),

            (S::Connecting, TransportEvent::ConnectFailed { code, message }) => {
                tracing::info!(code, %message, "connection failed");
                self.fault(SessionFault::connection_failed(code, message));
                self.reset();
            }

            (S::Connected, TransportEvent::MessageArrived { topic, payload, .. }) => {
                self.on_message(&topic, &payload);
            }

            (S::Connecting | S::Connected, TransportEvent::ConnectionLost { code, message }) => {
                tracing::info!(code, %message, "connection lost");
                self.fault(SessionFault::connection_lost(code, message));
                self.reset();
            }

            (S::Disconnecting, TransportEvent::Disconnected) => {
                tracing::info!("disconnected");
                self.reset();
            }

            (S::Disconnecting, TransportEvent::ConnectionLost { code, .. }) => {
                tracing::debug!(code, "connection dropped while disconnecting");
                self.reset();
            }

            (S::Disconnecting, TransportEvent::MessageArrived { topic, .. }) => {
                tracing::debug!(%topic, "dropping message received while disconnecting");
            }

            (state, event) => {
                tracing::warn!(%state, ?event, "ignoring transport event");
            }
        }
    }

    fn on_connected(&mut self) {
        let (Some(identity), Some(connection)) =
            (self.session.identity.as_ref(), self.session.connection.as_mut())
        else {
            tracing::warn!("connected without a pending connection");
            self.reset();
            return;
        };

        tracing::info!(client_id = identity.client_id(), "connected");

        // Subscribe before announcing so our own announcement comes back.
        let chat_topic = self.config.topics.chat_topic();
        let presence_filter = self.config.topics.presence_wildcard();
        let announce = self
            .presence
            .announce(identity, self.clock.now_millis())
            .map_err(SessionError::from)
            .and_then(|publish| {
                connection.subscribe(chat_topic)?;
                connection.subscribe(&presence_filter)?;
                connection.publish(publish)?;
                Ok::<(), SessionError>(())
            });

        match announce {
            Ok(()) => self.set_state(ConnectionState::Connected),
            Err(e) => {
                tracing::warn!(error = %e, "failed to join after connecting");
                self.fault(SessionFault::connection_lost(
                    return_code::SOCKET_ERROR,
                    e.to_string(),
                ));
                self.reset();
            }
        }
    }

    fn on_message(&mut self, topic: &str, payload: &[u8]) {
        let now = self.clock.now_millis();
        let local_client_id = self
            .session
            .identity
            .as_ref()
            .map(|id| id.client_id().to_string())
            .unwrap_or_default();

        match self.config.topics.classify(topic) {
            TopicKind::Presence(client_id) => match self.presence.interpret(client_id, payload) {
                Ok(event) => {
                    for view_event in self.presence.observe(event, &local_client_id, now) {
                        self.emit(view_event);
                    }
                }
                Err(e) => self.malformed(topic, e.to_string()),
            },
            TopicKind::Chat => match self.chat.decode(payload) {
                Ok(message) => {
                    let identity = decode_identity(&message.client_id);
                    let is_self = message.client_id == local_client_id;
                    tracing::debug!(client_id = %message.client_id, "chat received");
                    self.emit(ViewEvent::ChatMessageReceived {
                        identity,
                        text: message.text_reply,
                        is_self,
                    });
                }
                Err(e) => self.malformed(topic, e.to_string()),
            },
            TopicKind::Unrecognized => {
                tracing::debug!(topic, "ignoring message on unrecognized topic");
            }
        }
    }

    // -----------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------

    fn require(
        &self,
        expected: ConnectionState,
        operation: &'static str,
    ) -> Result<(), SessionError> {
        if self.session.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.session.state,
            })
        }
    }

    /// Releases the connection and identity, empties the participant list,
    /// and returns to disconnected.
    fn reset(&mut self) {
        self.session.connection = None;
        self.session.identity = None;
        self.presence.clear();
        self.emit(ViewEvent::ParticipantsCleared);
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.session.state != state {
            tracing::debug!(from = %self.session.state, to = %state, "session state changed");
            self.session.state = state;
            self.emit(ViewEvent::ConnectionStateChanged(state));
        }
    }

    fn malformed(&self, topic: &str, reason: String) {
        tracing::warn!(topic, %reason, "dropping malformed payload");
        self.fault(SessionFault::MalformedPayload {
            topic: topic.to_string(),
            reason,
        });
    }

    fn fault(&self, fault: SessionFault) {
        self.emit(ViewEvent::ErrorOccurred(fault));
    }

    fn emit(&self, event: ViewEvent) {
        if self.view.send(event).is_err() {
            tracing::debug!("view queue closed");
        }
    }
}

impl<T: Transport, K: Clock> Drop for SessionMachine<T, K> {
    fn drop(&mut self) {
        self.teardown();
    }
}
