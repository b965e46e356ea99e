use std::time::Duration;

use parley::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_BIND: &str = "127.0.0.1:8080";

type DemoResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(who: &str, event: &ViewEvent) -> Option<String> {
    let line = match event {
        ViewEvent::ConnectionStateChanged(state) => format!("[{who}] state: {state}"),
        ViewEvent::ParticipantListed { identity, is_self } => {
            let me = if *is_self { " (you)" } else { "" };
            format!("[{who}] present: {identity}{me}")
        }
        ViewEvent::UserJoined { identity, is_self: true } => {
            format!("[{who}] you joined as {identity}")
        }
        ViewEvent::UserJoined { identity, .. } => format!("[{who}] {identity} joined"),
        ViewEvent::UserLeft { identity, .. } => format!("[{who}] {identity} left"),
        ViewEvent::ParticipantsCleared => return None,
        ViewEvent::ChatMessageReceived { identity, text, is_self } => {
            let name = if *is_self { "you" } else { identity.username() };
            format!("[{who}] {name}: {text}")
        }
        ViewEvent::ErrorOccurred(fault) if fault.is_fatal_to_connection() => {
            format!("[{who}] connection error: {fault}")
        }
        ViewEvent::ErrorOccurred(fault) => format!("[{who}] warning: {fault}"),
    };
    Some(line)
}

fn spawn_printer(who: &'static str, mut view: ViewReceiver) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = view.recv().await {
            if let Some(line) = render(who, &event) {
                println!("{line}");
            }
        }
    })
}

fn split_addr(addr: &str) -> Result<(String, u16), Box<dyn std::error::Error>> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| format!("expected host:port, got {addr:?}"))?;
    Ok((host.to_string(), port.parse()?))
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// Serves an in-process broker over WebSocket until killed.
async fn run_broker(bind: &str) -> DemoResult {
    let broker = MemoryBroker::start(BrokerConfig::default());
    let server = WebSocketBroker::bind(bind, broker).await?;
    tracing::info!(addr = %server.local_addr()?, "broker ready");
    server.run().await?;
    Ok(())
}

/// Joins a remote broker and chats from stdin. An empty line or EOF leaves.
async fn run_join(bind: &str, username: &str) -> DemoResult {
    let (host, port) = split_addr(bind)?;
    let (client, view) = ChatClient::new(WebSocketTransport);
    let printer = spawn_printer("chat", view);

    client
        .connect(ConnectRequest::new(&host, port, username))
        .await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            break;
        }
        if !client.state().await?.can_send() {
            println!("[chat] not connected; message dropped");
            continue;
        }
        if let Err(e) = client.send(line).await {
            println!("[chat] not sent: {e}");
        }
    }

    if client.state().await?.can_send() {
        client.disconnect().await?;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    client.shutdown().await?;
    let _ = printer.await;
    Ok(())
}

/// Two participants chatting through an in-process broker.
async fn run_scripted() -> DemoResult {
    let broker = MemoryBroker::start(BrokerConfig::default());
    let pause = Duration::from_millis(100);

    let (alice, alice_view) = ChatClient::new(broker.clone());
    let alice_printer = spawn_printer("alice", alice_view);
    alice
        .connect(ConnectRequest::new("localhost", 1883, "alice"))
        .await?;
    tokio::time::sleep(pause).await;

    let (bob, bob_view) = ChatClient::new(broker.clone());
    let bob_printer = spawn_printer("bob", bob_view);
    bob.connect(ConnectRequest::new("localhost", 1883, "bob"))
        .await?;
    tokio::time::sleep(pause).await;

    alice.send("hi bob").await?;
    tokio::time::sleep(pause).await;
    bob.send("hey alice, bye alice").await?;
    tokio::time::sleep(pause).await;

    bob.disconnect().await?;
    tokio::time::sleep(pause).await;

    // Dropping the handle publishes alice's departure on the way out.
    alice.shutdown().await?;
    bob.shutdown().await?;
    let _ = tokio::join!(alice_printer, bob_printer);

    let snapshot = broker.snapshot().await?;
    tracing::info!(
        clients = snapshot.clients.len(),
        retained = snapshot.retained.len(),
        "broker state after demo"
    );
    broker.shutdown()?;
    Ok(())
}

#[tokio::main]
async fn main() -> DemoResult {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bind = std::env::var("PARLEY_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["broker"] => run_broker(&bind).await,
        ["join", username] => run_join(&bind, username).await,
        [] => run_scripted().await,
        _ => {
            eprintln!("usage: lobby [broker | join <username>]");
            std::process::exit(2);
        }
    }
}
