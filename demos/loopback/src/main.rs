//! A client and a scripted room server in one process.
//!
//! The server echoes every chat RPC back from an "echo-bot" player and
//! closes the room after three. Run with `RUST_LOG=debug` to watch the
//! session's state changes and frame flow.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use roomwire::RoomError;
use roomwire::prelude::*;
use roomwire::protocol::{AuthToken, ClientInfo, Codec, Event, JoinedRoom, JsonCodec, Msg};
use roomwire::transport::CLOSE_NORMAL;
use roomwire::transport::memory::{self, ClientFrame, MemoryServer};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

/// Answers every handshake with the same room.
struct LocalLobby;

impl Lobby for LocalLobby {
    async fn call(&self, request: LobbyRequest) -> Result<Vec<u8>, LobbyError> {
        tracing::info!(path = %request.path, user = %request.user_id, "lobby: handshake");
        let registry = TypeRegistry::new();
        let me = ClientInfo::new(request.user_id.as_str(), &Dict::new(), &registry)
            .map_err(|e| LobbyError::Unavailable(e.to_string()))?;
        let joined = JoinedRoom {
            room_info: RoomInfo {
                id: RoomId::from("loopback"),
                app_id: request.app_id,
                ..RoomInfo::default()
            },
            url: "memory://loopback".into(),
            auth: AuthToken {
                nonce: "demo-nonce".into(),
                hash: "demo-hash".into(),
            },
            deadline_secs: 10,
            master_id: me.id.clone(),
            players: vec![me],
        };
        JsonCodec
            .encode(&joined)
            .map_err(|e| LobbyError::Unavailable(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Room server
// ---------------------------------------------------------------------------

const ECHO_LIMIT: usize = 3;

async fn run_server(mut server: MemoryServer) -> Result<(), ClientError> {
    let registry = TypeRegistry::new();
    let Some(mut peer) = server.accept().await else {
        return Ok(());
    };
    tracing::info!(user = %peer.request().user_id, "server: client connected");

    let mut seq = 1;
    peer.send_frame(Event::PeerReady { last_msg_seq: 0 }.to_frame(&registry)?)?;
    let joined = Event::Joined {
        seq,
        player: PlayerId::from(peer.request().user_id.as_str()),
        props: Dict::new(),
    };
    peer.send_frame(joined.to_frame(&registry)?)?;

    let mut echoed = 0;
    while let Some(ClientFrame::Data(frame)) = peer.recv().await {
        let (msg_seq, msg) = Msg::parse(&frame, &registry)?;
        let Msg::Rpc {
            rpc_id, payload, ..
        } = msg
        else {
            continue;
        };

        seq += 1;
        let echo = Event::Message {
            seq,
            sender: PlayerId::from("echo-bot"),
            rpc_id,
            payload,
        };
        peer.send_frame(echo.to_frame(&registry)?)?;
        seq += 1;
        peer.send_frame(Event::Succeeded { seq, msg_seq }.to_frame(&registry)?)?;

        echoed += 1;
        if echoed == ECHO_LIMIT {
            peer.close(CLOSE_NORMAL, "demo finished")?;
            break;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

struct Printer {
    done: Arc<AtomicBool>,
}

impl EventReceiver for Printer {
    fn on_joined(&mut self, me: &Player) {
        tracing::info!(player = %me.id, "joined room");
    }

    fn on_error(&mut self, error: &RoomError) {
        tracing::warn!(%error, "room error");
    }

    fn on_closed(&mut self, reason: &str) {
        tracing::info!(reason, "room closed");
        self.done.store(true, Ordering::SeqCst);
    }
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (connector, server) = memory::pair();
    let server = tokio::spawn(run_server(server));

    let mut client = ClientBuilder::new("loopback", "alice")
        .with_bearer("demo-token")
        .build(LocalLobby, connector)?;

    let done = Arc::new(AtomicBool::new(false));
    let closed = Arc::clone(&done);
    let failed = Arc::clone(&done);
    client.create(
        RoomOption::default(),
        &Dict::new(),
        move |room| {
            room.set_event_receiver(Printer { done: closed });
            let chat = match room.register_rpc(|ctx, text: String| {
                tracing::info!(from = %ctx.sender, %text, "chat");
            }) {
                Ok(chat) => chat,
                Err(error) => {
                    tracing::error!(%error, "rpc registration failed");
                    return false;
                }
            };
            // Queued now, sent once the server is ready.
            for n in 1..=ECHO_LIMIT {
                if let Err(error) = room.rpc(&chat, format!("hello #{n}"), RpcTarget::Broadcast) {
                    tracing::error!(%error, "rpc failed");
                }
            }
            true
        },
        move |error| {
            tracing::error!(%error, "create failed");
            failed.store(true, Ordering::SeqCst);
        },
    );

    let mut tick = tokio::time::interval(Duration::from_millis(16));
    while !done.load(Ordering::SeqCst) {
        tick.tick().await;
        client.process_callback()?;
    }

    match server.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "server task panicked");
            Ok(())
        }
    }
}
