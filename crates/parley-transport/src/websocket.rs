//! WebSocket bridge using `tokio-tungstenite`.
//!
//! [`WebSocketBroker`] serves a [`MemoryBroker`] to remote clients and
//! [`WebSocketTransport`] is the matching client. Frames are JSON:
//! clients send [`BrokerRequest`]s, the broker answers with
//! [`TransportEvent`]s. A socket that closes without a `Disconnect`
//! request counts as a lost connection, so the client's will fires.

use std::net::SocketAddr;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::topic::{validate_filter, validate_topic};
use crate::{
    event_channel, return_code, ConnectOptions, Connection, EventSender,
    MemoryBroker, Publish, Transport, TransportError, TransportEvent,
};

/// A frame sent from a client to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BrokerRequest {
    /// Must be the first frame on a socket.
    Connect { options: ConnectOptions },
    Subscribe { filter: String },
    Publish { message: Publish },
    Disconnect,
}

fn encode<T: Serialize>(value: &T) -> Result<Message, TransportError> {
    let bytes = serde_json::to_vec(value).map_err(TransportError::MalformedFrame)?;
    Ok(Message::Binary(bytes.into()))
}

/// Reads the next JSON frame, skipping control frames.
///
/// Returns `None` once the socket is closed or fails.
async fn next_frame<S, T>(stream: &mut SplitStream<WebSocketStream<S>>) -> Option<T>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: DeserializeOwned,
{
    loop {
        let data = match stream.next().await {
            Some(Ok(Message::Binary(data))) => data.to_vec(),
            Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Ok(_)) => continue, // ping/pong/frame
            Some(Err(e)) => {
                tracing::debug!(error = %e, "websocket receive failed");
                return None;
            }
        };
        match serde_json::from_slice(&data) {
            Ok(frame) => return Some(frame),
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed frame");
            }
        }
    }
}

fn is_terminal(event: &TransportEvent) -> bool {
    matches!(
        event,
        TransportEvent::ConnectFailed { .. }
            | TransportEvent::ConnectionLost { .. }
            | TransportEvent::Disconnected
    )
}

// ---------------------------------------------------------------------------
// Broker side
// ---------------------------------------------------------------------------

/// Serves a [`MemoryBroker`] over WebSocket.
pub struct WebSocketBroker {
    listener: TcpListener,
    broker: MemoryBroker,
}

impl WebSocketBroker {
    /// Binds a new WebSocket listener in front of `broker`.
    pub async fn bind(addr: &str, broker: MemoryBroker) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket broker listening");
        Ok(Self { listener, broker })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), TransportError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let broker = self.broker.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_client(stream, broker).await {
                            tracing::debug!(%addr, error = %e, "client socket ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

async fn serve_client(stream: TcpStream, broker: MemoryBroker) -> Result<(), TransportError> {
    let ws = tokio_tungstenite::accept_async(stream).await.map_err(|e| {
        TransportError::AcceptFailed(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            e,
        ))
    })?;
    let (mut sink, mut stream) = ws.split();

    let options = match next_frame::<_, BrokerRequest>(&mut stream).await {
        Some(BrokerRequest::Connect { options }) => options,
        Some(_) => {
            let refusal = TransportEvent::ConnectFailed {
                code: return_code::UNACCEPTABLE_PROTOCOL,
                message: "first frame must be Connect".into(),
            };
            let _ = sink.send(encode(&refusal)?).await;
            let _ = sink.close().await;
            return Ok(());
        }
        None => return Ok(()),
    };

    let client_id = options.client_id.clone();
    let (events_tx, events_rx) = event_channel();
    let mut conn = broker.connect(options, events_tx)?;
    let writer = tokio::spawn(forward_events(sink, events_rx));

    while let Some(request) = next_frame::<_, BrokerRequest>(&mut stream).await {
        let result = match request {
            BrokerRequest::Subscribe { filter } => conn.subscribe(&filter),
            BrokerRequest::Publish { message } => conn.publish(message),
            BrokerRequest::Disconnect => {
                conn.disconnect()?;
                break;
            }
            BrokerRequest::Connect { .. } => {
                tracing::warn!(%client_id, "ignoring repeated Connect frame");
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::debug!(%client_id, error = %e, "request rejected");
        }
    }

    // Dropping a connection that never disconnected fires the will.
    drop(conn);
    let _ = writer.await;
    Ok(())
}

async fn forward_events(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let terminal = is_terminal(&event);
        let frame = match encode(&event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode event");
                continue;
            }
        };
        if sink.send(frame).await.is_err() || terminal {
            break;
        }
    }
    let _ = sink.close().await;
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Client transport that reaches a [`WebSocketBroker`] at
/// `ws://{host}:{port}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;

    fn connect(
        &self,
        options: ConnectOptions,
        events: EventSender,
    ) -> Result<WebSocketConnection, TransportError> {
        let url = format!("ws://{}:{}", options.host, options.port);
        let client_id = options.client_id.clone();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        requests_tx
            .send(BrokerRequest::Connect { options })
            .map_err(|_| TransportError::Shutdown)?;

        tracing::debug!(%url, %client_id, "opening websocket");
        tokio::spawn(run_client(url, requests_rx, events));

        Ok(WebSocketConnection {
            client_id,
            requests: requests_tx,
            closed: false,
        })
    }
}

async fn run_client(
    url: String,
    mut requests: mpsc::UnboundedReceiver<BrokerRequest>,
    events: EventSender,
) {
    let ws = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            let _ = events.send(TransportEvent::ConnectFailed {
                code: return_code::SOCKET_ERROR,
                message: e.to_string(),
            });
            return;
        }
    };
    let (mut sink, mut stream) = ws.split();

    let writer = tokio::spawn(async move {
        let mut disconnecting = false;
        while let Some(request) = requests.recv().await {
            disconnecting = matches!(request, BrokerRequest::Disconnect);
            let frame = match encode(&request) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode request");
                    continue;
                }
            };
            if sink.send(frame).await.is_err() || disconnecting {
                break;
            }
        }
        // After Disconnect the broker closes the socket once it has sent
        // its acknowledgement. A dropped handle closes it from our side.
        if !disconnecting {
            let _ = sink.close().await;
        }
    });

    let mut finished = false;
    while let Some(event) = next_frame::<_, TransportEvent>(&mut stream).await {
        finished = is_terminal(&event);
        if events.send(event).is_err() || finished {
            break;
        }
    }
    if !finished {
        let _ = events.send(TransportEvent::ConnectionLost {
            code: return_code::SOCKET_CLOSED,
            message: describe_close(&url),
        });
    }
    writer.abort();
}

fn describe_close(url: &str) -> String {
    format!("socket to {url} closed")
}

/// A client's handle onto a remote [`WebSocketBroker`].
///
/// Dropping the handle without disconnecting closes the socket, which the
/// broker treats as a connection loss.
pub struct WebSocketConnection {
    client_id: String,
    requests: mpsc::UnboundedSender<BrokerRequest>,
    closed: bool,
}

impl WebSocketConnection {
    fn send(&self, request: BrokerRequest) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed(
                "disconnect already requested".into(),
            ));
        }
        self.requests.send(request).map_err(|_| {
            TransportError::ConnectionClosed("socket task has stopped".into())
        })
    }
}

impl Connection for WebSocketConnection {
    fn subscribe(&mut self, filter: &str) -> Result<(), TransportError> {
        validate_filter(filter)?;
        self.send(BrokerRequest::Subscribe {
            filter: filter.to_string(),
        })
    }

    fn publish(&mut self, message: Publish) -> Result<(), TransportError> {
        validate_topic(&message.topic)?;
        self.send(BrokerRequest::Publish { message })
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.send(BrokerRequest::Disconnect)?;
        self.closed = true;
        Ok(())
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }
}
