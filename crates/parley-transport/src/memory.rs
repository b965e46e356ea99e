//! In-process broker: a Tokio task that owns every client, subscription
//! and retained message.
//!
//! The broker is an actor. [`MemoryBroker`] and [`MemoryConnection`] are
//! cheap handles that push commands onto the actor's channel, so every
//! request returns immediately and its outcome arrives as a
//! [`TransportEvent`] on the client's event queue.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};

use crate::topic::{topic_matches, validate_filter, validate_topic};
use crate::{
    return_code, ConnectOptions, Connection, EventSender, Publish, Transport,
    TransportError, TransportEvent,
};

/// Counter for telling apart successive connections that reuse a client id.
static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Configuration for a [`MemoryBroker`].
#[derive(Debug, Clone, Default)]
pub struct BrokerConfig {
    /// Accepted user name → password pairs. Empty allows anyone.
    pub credentials: HashMap<String, String>,
}

impl BrokerConfig {
    /// Adds an accepted user name and password.
    pub fn with_user(mut self, username: &str, password: &str) -> Self {
        self.credentials
            .insert(username.to_string(), password.to_string());
        self
    }
}

/// A point-in-time view of broker state, for diagnostics and tests.
#[derive(Debug, Clone, Default)]
pub struct BrokerSnapshot {
    /// Client ids of connected clients, sorted.
    pub clients: Vec<String>,
    /// Retained payloads by topic.
    pub retained: BTreeMap<String, Vec<u8>>,
}

enum BrokerCommand {
    Connect {
        session: u64,
        options: ConnectOptions,
        events: EventSender,
    },
    Subscribe {
        session: u64,
        client_id: String,
        filter: String,
    },
    Publish {
        session: u64,
        client_id: String,
        message: Publish,
    },
    Disconnect {
        session: u64,
        client_id: String,
    },
    Drop {
        session: Option<u64>,
        client_id: String,
        code: i32,
        message: String,
    },
    Snapshot {
        reply: oneshot::Sender<BrokerSnapshot>,
    },
    Shutdown,
}

/// Handle to a running in-process broker.
///
/// Cloning is cheap; every clone talks to the same broker task.
#[derive(Clone)]
pub struct MemoryBroker {
    commands: mpsc::UnboundedSender<BrokerCommand>,
}

impl MemoryBroker {
    /// Spawns the broker task. Must be called inside a Tokio runtime.
    pub fn start(config: BrokerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = BrokerActor {
            config,
            clients: HashMap::new(),
            retained: BTreeMap::new(),
        };
        tokio::spawn(actor.run(rx));
        tracing::debug!("memory broker started");
        Self { commands: tx }
    }

    /// Severs a client's connection as if the network failed.
    ///
    /// The client receives [`TransportEvent::ConnectionLost`] and its will,
    /// if any, is published.
    pub fn drop_client(
        &self,
        client_id: &str,
        code: i32,
        message: &str,
    ) -> Result<(), TransportError> {
        self.send(BrokerCommand::Drop {
            session: None,
            client_id: client_id.to_string(),
            code,
            message: message.to_string(),
        })
    }

    /// Returns the current clients and retained messages.
    pub async fn snapshot(&self) -> Result<BrokerSnapshot, TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(BrokerCommand::Snapshot { reply: reply_tx })?;
        reply_rx.await.map_err(|_| TransportError::Shutdown)
    }

    /// Stops the broker task. Connected clients see a connection loss.
    pub fn shutdown(&self) -> Result<(), TransportError> {
        self.send(BrokerCommand::Shutdown)
    }

    fn send(&self, cmd: BrokerCommand) -> Result<(), TransportError> {
        self.commands
            .send(cmd)
            .map_err(|_| TransportError::Shutdown)
    }
}

impl Transport for MemoryBroker {
    type Connection = MemoryConnection;

    fn connect(
        &self,
        options: ConnectOptions,
        events: EventSender,
    ) -> Result<MemoryConnection, TransportError> {
        let session = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        let client_id = options.client_id.clone();
        self.send(BrokerCommand::Connect {
            session,
            options,
            events,
        })?;
        Ok(MemoryConnection {
            session,
            client_id,
            commands: self.commands.clone(),
            closed: false,
        })
    }
}

/// A client's handle onto a [`MemoryBroker`].
///
/// Dropping the handle without calling [`Connection::disconnect`] is a
/// connection loss: the broker publishes the will.
pub struct MemoryConnection {
    session: u64,
    client_id: String,
    commands: mpsc::UnboundedSender<BrokerCommand>,
    closed: bool,
}

impl MemoryConnection {
    fn send(&self, cmd: BrokerCommand) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed(
                "disconnect already requested".into(),
            ));
        }
        self.commands
            .send(cmd)
            .map_err(|_| TransportError::Shutdown)
    }
}

impl Connection for MemoryConnection {
    fn subscribe(&mut self, filter: &str) -> Result<(), TransportError> {
        validate_filter(filter)?;
        self.send(BrokerCommand::Subscribe {
            session: self.session,
            client_id: self.client_id.clone(),
            filter: filter.to_string(),
        })
    }

    fn publish(&mut self, message: Publish) -> Result<(), TransportError> {
        validate_topic(&message.topic)?;
        self.send(BrokerCommand::Publish {
            session: self.session,
            client_id: self.client_id.clone(),
            message,
        })
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.send(BrokerCommand::Disconnect {
            session: self.session,
            client_id: self.client_id.clone(),
        })?;
        self.closed = true;
        Ok(())
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.commands.send(BrokerCommand::Drop {
                session: Some(self.session),
                client_id: self.client_id.clone(),
                code: return_code::SOCKET_CLOSED,
                message: "connection handle dropped".into(),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct ClientEntry {
    session: u64,
    events: EventSender,
    filters: Vec<String>,
    will: Option<Publish>,
}

impl ClientEntry {
    fn deliver(&self, client_id: &str, event: TransportEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!(client_id, "client event queue closed");
        }
    }
}

struct BrokerActor {
    config: BrokerConfig,
    clients: HashMap<String, ClientEntry>,
    retained: BTreeMap<String, Vec<u8>>,
}

impl BrokerActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<BrokerCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                BrokerCommand::Connect {
                    session,
                    options,
                    events,
                } => self.connect(session, options, events),
                BrokerCommand::Subscribe {
                    session,
                    client_id,
                    filter,
                } => self.subscribe(session, &client_id, filter),
                BrokerCommand::Publish {
                    session,
                    client_id,
                    message,
                } => {
                    if self.is_current(&client_id, session) {
                        self.route(message);
                    }
                }
                BrokerCommand::Disconnect { session, client_id } => {
                    if self.is_current(&client_id, session) {
                        if let Some(entry) = self.clients.remove(&client_id) {
                            tracing::info!(%client_id, "client disconnected");
                            entry.deliver(&client_id, TransportEvent::Disconnected);
                        }
                    }
                }
                BrokerCommand::Drop {
                    session,
                    client_id,
                    code,
                    message,
                } => {
                    let applies = match session {
                        Some(s) => self.is_current(&client_id, s),
                        None => self.clients.contains_key(&client_id),
                    };
                    if applies {
                        self.lose(&client_id, code, message);
                    }
                }
                BrokerCommand::Snapshot { reply } => {
                    let mut clients: Vec<String> =
                        self.clients.keys().cloned().collect();
                    clients.sort();
                    let _ = reply.send(BrokerSnapshot {
                        clients,
                        retained: self.retained.clone(),
                    });
                }
                BrokerCommand::Shutdown => break,
            }
        }

        let ids: Vec<String> = self.clients.keys().cloned().collect();
        for client_id in ids {
            self.lose(&client_id, return_code::SOCKET_CLOSED, "broker shut down".into());
        }
        tracing::debug!("memory broker stopped");
    }

    fn is_current(&self, client_id: &str, session: u64) -> bool {
        self.clients
            .get(client_id)
            .is_some_and(|entry| entry.session == session)
    }

    fn connect(&mut self, session: u64, options: ConnectOptions, events: EventSender) {
        let client_id = options.client_id;

        if client_id.is_empty() {
            let _ = events.send(TransportEvent::ConnectFailed {
                code: return_code::IDENTIFIER_REJECTED,
                message: "empty client identifier".into(),
            });
            return;
        }

        if !self.config.credentials.is_empty()
            && self.config.credentials.get(&options.username) != Some(&options.password)
        {
            tracing::info!(%client_id, username = %options.username, "connection refused");
            let _ = events.send(TransportEvent::ConnectFailed {
                code: return_code::NOT_AUTHORIZED,
                message: "not authorized".into(),
            });
            return;
        }

        if let Some(old) = self.clients.remove(&client_id) {
            tracing::info!(%client_id, "client id taken over by new connection");
            old.deliver(
                &client_id,
                TransportEvent::ConnectionLost {
                    code: return_code::SOCKET_CLOSED,
                    message: "session taken over".into(),
                },
            );
        }

        let entry = ClientEntry {
            session,
            events,
            filters: Vec::new(),
            will: options.will,
        };
        entry.deliver(&client_id, TransportEvent::Connected);
        tracing::info!(%client_id, "client connected");
        self.clients.insert(client_id, entry);
    }

    fn subscribe(&mut self, session: u64, client_id: &str, filter: String) {
        let Some(entry) = self.clients.get_mut(client_id) else {
            return;
        };
        if entry.session != session {
            return;
        }

        for (topic, payload) in &self.retained {
            if topic_matches(&filter, topic) {
                entry.deliver(
                    client_id,
                    TransportEvent::MessageArrived {
                        topic: topic.clone(),
                        payload: payload.clone(),
                        retained: true,
                    },
                );
            }
        }

        tracing::debug!(client_id, %filter, "subscribed");
        if !entry.filters.contains(&filter) {
            entry.filters.push(filter);
        }
    }

    fn route(&mut self, message: Publish) {
        if message.retained {
            if message.payload.is_empty() {
                self.retained.remove(&message.topic);
            } else {
                self.retained
                    .insert(message.topic.clone(), message.payload.clone());
            }
        }

        for (client_id, entry) in &self.clients {
            if entry
                .filters
                .iter()
                .any(|f| topic_matches(f, &message.topic))
            {
                entry.deliver(
                    client_id,
                    TransportEvent::MessageArrived {
                        topic: message.topic.clone(),
                        payload: message.payload.clone(),
                        retained: false,
                    },
                );
            }
        }
    }

    fn lose(&mut self, client_id: &str, code: i32, message: String) {
        let Some(entry) = self.clients.remove(client_id) else {
            return;
        };
        tracing::info!(client_id, code, %message, "client connection lost");
        entry.deliver(client_id, TransportEvent::ConnectionLost { code, message });
        if let Some(will) = entry.will {
            tracing::debug!(client_id, topic = %will.topic, "publishing will");
            self.route(will);
        }
    }
}
