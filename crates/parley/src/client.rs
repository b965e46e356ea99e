//! `ChatClient` builder and event loop.
//!
//! A client is an actor. The [`SessionMachine`] lives inside a Tokio task
//! together with the transport's event queue; [`ChatClient`] is the handle
//! the application holds to send intents to it. Intents and transport
//! events are handled one at a time, so the machine never sees two inputs
//! at once.

use std::time::Duration;

use parley_protocol::TopicScheme;
use parley_session::{
    view_channel, Clock, ConnectRequest, ConnectionState, Participant, SessionConfig,
    SessionError, SessionMachine, SystemClock, ViewReceiver,
};
use parley_transport::{event_channel, EventReceiver, Transport};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::ParleyError;

/// Default capacity of the intent channel.
pub const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Commands sent to the client actor.
///
/// The `oneshot::Sender` is the reply channel: the handle waits on it for
/// the machine's answer.
enum ClientCommand {
    Connect {
        request: ConnectRequest,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    State {
        reply: oneshot::Sender<ConnectionState>,
    },
    Participants {
        reply: oneshot::Sender<Vec<Participant>>,
    },
    Shutdown,
}

/// Builder for configuring and starting a [`ChatClient`].
///
/// # Example
///
/// ```rust,no_run
/// use parley::prelude::*;
///
/// # async fn run() -> Result<(), ParleyError> {
/// let (client, mut view) = ChatClient::builder()
///     .freshness_window(std::time::Duration::from_secs(5))
///     .build(WebSocketTransport);
///
/// client
///     .connect(ConnectRequest::new("localhost", 8080, "alice"))
///     .await?;
/// while let Some(event) = view.recv().await {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct ChatClientBuilder<K: Clock = SystemClock> {
    config: SessionConfig,
    clock: K,
    channel_size: usize,
}

impl ChatClientBuilder<SystemClock> {
    /// Creates a builder with default settings and the system clock.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            clock: SystemClock,
            channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }
}

impl Default for ChatClientBuilder<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clock> ChatClientBuilder<K> {
    /// Sets how recent a presence announcement must be to count as a
    /// new arrival.
    pub fn freshness_window(mut self, window: Duration) -> Self {
        self.config.freshness_window = window;
        self
    }

    /// Sets the presence prefix and chat topic.
    pub fn topics(mut self, topics: TopicScheme) -> Self {
        self.config.topics = topics;
        self
    }

    /// Replaces the whole session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the capacity of the intent channel.
    pub fn channel_size(mut self, size: usize) -> Self {
        self.channel_size = size.max(1);
        self
    }

    /// Uses `clock` for identity tokens and presence timestamps.
    pub fn clock<C: Clock>(self, clock: C) -> ChatClientBuilder<C> {
        ChatClientBuilder {
            config: self.config,
            clock,
            channel_size: self.channel_size,
        }
    }

    /// Spawns the client actor on `transport`.
    ///
    /// Returns the handle and the view queue. Must be called inside a
    /// Tokio runtime.
    pub fn build<T: Transport>(self, transport: T) -> (ChatClient, ViewReceiver) {
        let (events_tx, events_rx) = event_channel();
        let (view_tx, view_rx) = view_channel();
        let (commands_tx, commands_rx) = mpsc::channel(self.channel_size);

        let machine = SessionMachine::new(transport, self.clock, self.config, events_tx, view_tx);
        let actor = ClientActor {
            machine,
            commands: commands_rx,
            transport_events: events_rx,
        };
        let task = tokio::spawn(actor.run());

        (
            ChatClient {
                commands: commands_tx,
                task: Some(task),
            },
            view_rx,
        )
    }
}

/// Handle to a running chat client.
///
/// Every method waits only for the session to accept or refuse the
/// intent, never for the network. Outcomes (connected, joined, messages,
/// failures) arrive on the [`ViewReceiver`] returned by the builder.
///
/// Dropping the handle tears the session down: a connected client
/// publishes its departure and disconnects.
pub struct ChatClient {
    commands: mpsc::Sender<ClientCommand>,
    task: Option<JoinHandle<()>>,
}

impl ChatClient {
    /// Creates a new builder.
    pub fn builder() -> ChatClientBuilder {
        ChatClientBuilder::new()
    }

    /// Starts a client on `transport` with default settings.
    pub fn new<T: Transport>(transport: T) -> (Self, ViewReceiver) {
        ChatClientBuilder::new().build(transport)
    }

    /// Asks to connect with a fresh identity.
    ///
    /// # Errors
    /// Fails if the session is not disconnected, the request is
    /// incomplete, or the transport refuses immediately.
    pub async fn connect(&self, request: ConnectRequest) -> Result<(), ParleyError> {
        let (reply, rx) = oneshot::channel();
        self.request(ClientCommand::Connect { request, reply }, rx)
            .await?
            .map_err(ParleyError::from)
    }

    /// Asks to leave the chat. Only valid while connected.
    pub async fn disconnect(&self) -> Result<(), ParleyError> {
        let (reply, rx) = oneshot::channel();
        self.request(ClientCommand::Disconnect { reply }, rx)
            .await?
            .map_err(ParleyError::from)
    }

    /// Publishes a chat line. Only valid while connected.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), ParleyError> {
        let (reply, rx) = oneshot::channel();
        let text = text.into();
        self.request(ClientCommand::Send { text, reply }, rx)
            .await?
            .map_err(ParleyError::from)
    }

    /// Returns the current lifecycle state.
    pub async fn state(&self) -> Result<ConnectionState, ParleyError> {
        let (reply, rx) = oneshot::channel();
        self.request(ClientCommand::State { reply }, rx).await
    }

    /// Returns everyone currently present, self first.
    pub async fn participants(&self) -> Result<Vec<Participant>, ParleyError> {
        let (reply, rx) = oneshot::channel();
        self.request(ClientCommand::Participants { reply }, rx).await
    }

    /// Tears the session down and waits for the event loop to finish.
    pub async fn shutdown(mut self) -> Result<(), ParleyError> {
        // A full channel still closes when `self` drops below.
        let _ = self.commands.send(ClientCommand::Shutdown).await;
        if let Some(task) = self.task.take() {
            task.await.map_err(|_| ParleyError::Closed)?;
        }
        Ok(())
    }

    async fn request<R>(
        &self,
        command: ClientCommand,
        reply: oneshot::Receiver<R>,
    ) -> Result<R, ParleyError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ParleyError::Closed)?;
        reply.await.map_err(|_| ParleyError::Closed)
    }
}

/// The event loop. Owns the session machine.
struct ClientActor<T: Transport, K: Clock> {
    machine: SessionMachine<T, K>,
    commands: mpsc::Receiver<ClientCommand>,
    transport_events: EventReceiver,
}

impl<T: Transport, K: Clock> ClientActor<T, K> {
    async fn run(mut self) {
        tracing::debug!("chat client started");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(ClientCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(event) = self.transport_events.recv() => {
                    self.machine.handle_transport_event(event);
                }
            }
        }

        self.machine.teardown();
        tracing::debug!("chat client stopped");
    }

    fn handle_command(&mut self, cmd: ClientCommand) {
        match cmd {
            ClientCommand::Connect { request, reply } => {
                let _ = reply.send(self.machine.connect(request));
            }
            ClientCommand::Disconnect { reply } => {
                let _ = reply.send(self.machine.disconnect());
            }
            ClientCommand::Send { text, reply } => {
                let _ = reply.send(self.machine.send_chat(&text));
            }
            ClientCommand::State { reply } => {
                let _ = reply.send(self.machine.state());
            }
            ClientCommand::Participants { reply } => {
                let _ = reply.send(self.machine.participants().to_vec());
            }
            ClientCommand::Shutdown => {}
        }
    }
}
