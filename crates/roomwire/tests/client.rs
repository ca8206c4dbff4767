//! Integration tests for the client manager with a scripted lobby.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use roomwire::prelude::*;
use roomwire::protocol::{
    AuthToken, ClientInfo, Codec, CreateParams, Event, JoinParams, JoinedRoom, JsonCodec,
    SearchParams, encode_props,
};
use roomwire::transport::memory::{self, MemoryConnector, MemoryPeer, MemoryServer};

// =========================================================================
// Scripted lobby
// =========================================================================

#[derive(Clone, Default)]
struct FakeLobby {
    requests: Arc<Mutex<Vec<LobbyRequest>>>,
    responses: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl FakeLobby {
    fn respond<T: serde::Serialize>(&self, path: &str, body: &T) {
        let bytes = JsonCodec.encode(body).unwrap();
        self.responses.lock().unwrap().insert(path.to_string(), bytes);
    }

    fn requests(&self) -> Vec<LobbyRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Lobby for FakeLobby {
    async fn call(&self, request: LobbyRequest) -> Result<Vec<u8>, LobbyError> {
        let response = self.responses.lock().unwrap().get(&request.path).cloned();
        self.requests.lock().unwrap().push(request);
        response.ok_or(LobbyError::Status {
            code: 404,
            message: "no such room".into(),
        })
    }
}

#[derive(Default, Clone)]
struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl EventReceiver for Log {
    fn on_joined(&mut self, me: &Player) {
        self.push(format!("joined {}", me.id));
    }

    fn on_closed(&mut self, reason: &str) {
        self.push(format!("closed {reason}"));
    }
}

type TestClient = Client<FakeLobby, MemoryConnector>;

fn setup() -> (TestClient, FakeLobby, MemoryConnector, MemoryServer) {
    let lobby = FakeLobby::default();
    let (connector, server) = memory::pair();
    let client = ClientBuilder::new("testapp", "alice")
        .with_bearer("bearer-token")
        .build(lobby.clone(), connector.clone())
        .unwrap();
    (client, lobby, connector, server)
}

fn joined(id: &str) -> JoinedRoom {
    let registry = TypeRegistry::new();
    JoinedRoom {
        room_info: RoomInfo {
            id: RoomId::from(id),
            app_id: "testapp".into(),
            ..RoomInfo::default()
        },
        url: format!("memory://{id}"),
        auth: AuthToken {
            nonce: "nonce".into(),
            hash: "hash".into(),
        },
        deadline_secs: 5,
        players: vec![ClientInfo::new("alice", &Dict::new(), &registry).unwrap()],
        master_id: PlayerId::from("alice"),
    }
}

async fn pump_until(client: &mut TestClient, done: impl Fn(&TestClient) -> bool) {
    for _ in 0..400 {
        client.process_callback().unwrap();
        if done(client) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

async fn accept(server: &mut MemoryServer) -> MemoryPeer {
    tokio::time::timeout(Duration::from_secs(2), server.accept())
        .await
        .expect("no connection within 2s")
        .expect("connector dropped")
}

// =========================================================================
// Handshakes
// =========================================================================

#[tokio::test]
async fn test_create_starts_room_with_handshake_auth() {
    let (mut client, lobby, _connector, mut server) = setup();
    lobby.respond("/rooms", &joined("r1"));
    let log = Log::default();
    let receiver = log.clone();

    client.create(
        RoomOption::default().max_players(4),
        &props([("name", Value::Str("Alice".into()))]),
        move |room| {
            room.set_event_receiver(receiver);
            true
        },
        |err| panic!("create failed: {err}"),
    );
    pump_until(&mut client, |c| c.rooms().len() == 1).await;

    let request = &lobby.requests()[0];
    assert_eq!(request.path, "/rooms");
    assert_eq!(request.app_id, "testapp");
    assert_eq!(request.user_id, "alice");
    assert_eq!(request.bearer, "bearer-token");
    let params: CreateParams = JsonCodec.decode(&request.body).unwrap();
    assert_eq!(params.room_option.max_players, 4);
    assert_eq!(params.client_info.id, PlayerId::from("alice"));
    assert_eq!(
        params.client_info.props,
        encode_props(&props([("name", Value::Str("Alice".into()))]), &TypeRegistry::new())
            .unwrap()
    );

    let peer = accept(&mut server).await;
    assert_eq!(peer.request().url, "memory://r1");
    assert_eq!(peer.request().nonce, "nonce");
    assert_eq!(peer.request().hash, "hash");
    peer.send_frame(
        Event::Joined {
            seq: 1,
            player: PlayerId::from("alice"),
            props: Dict::new(),
        }
        .to_frame(&TypeRegistry::new())
        .unwrap(),
    )
    .unwrap();

    pump_until(&mut client, |_| !log.snapshot().is_empty()).await;
    assert_eq!(log.snapshot(), vec!["joined alice"]);
    assert!(client.room(&RoomId::from("r1")).unwrap().is_master());
}

#[tokio::test]
async fn test_join_failure_reaches_on_failed() {
    let (mut client, lobby, connector, _server) = setup();
    let log = Log::default();
    let failures = log.clone();

    client.join_by_id(
        &RoomId::from("missing"),
        None,
        &Dict::new(),
        |_| panic!("join should fail"),
        move |err| failures.push(err.to_string()),
    );
    pump_until(&mut client, |_| !log.snapshot().is_empty()).await;

    assert_eq!(log.snapshot(), vec!["lobby returned 404: no such room"]);
    assert_eq!(lobby.requests()[0].path, "/rooms/join/id/missing");
    assert!(client.rooms().is_empty());
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn test_random_join_sends_encoded_query() {
    let (mut client, lobby, _connector, _server) = setup();
    lobby.respond("/rooms/join/random/2", &joined("r2"));

    let query = Query::new().equal("mode", "duel".to_string());
    client.random_join(2, &query, &Dict::new(), |_| true, |err| panic!("{err}"));
    pump_until(&mut client, |c| c.rooms().len() == 1).await;

    let params: JoinParams = JsonCodec.decode(&lobby.requests()[0].body).unwrap();
    assert_eq!(params.queries, query.conditions(&TypeRegistry::new()).unwrap());
}

#[tokio::test]
async fn test_rejected_room_is_not_started() {
    let (mut client, lobby, connector, _server) = setup();
    lobby.respond("/rooms/join/number/42", &joined("r3"));
    let log = Log::default();
    let seen = log.clone();

    client.join_by_number(
        42,
        None,
        &Dict::new(),
        move |room| {
            seen.push(room.id().to_string());
            false
        },
        |err| panic!("{err}"),
    );
    pump_until(&mut client, |_| !log.snapshot().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(log.snapshot(), vec!["r3"]);
    assert!(client.rooms().is_empty());
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn test_watch_joins_without_player_seat() {
    let (mut client, lobby, _connector, _server) = setup();
    let mut room = joined("r4");
    room.players.clear();
    room.master_id = PlayerId::from("bob");
    lobby.respond("/rooms/watch/id/r4", &room);

    client.watch_by_id(&RoomId::from("r4"), None, |_| true, |err| panic!("{err}"));
    pump_until(&mut client, |c| c.rooms().len() == 1).await;

    let room = client.room(&RoomId::from("r4")).unwrap();
    assert!(room.me().is_none());
    assert!(!room.is_master());
}

#[tokio::test]
async fn test_search_filters_results_locally() {
    let (mut client, lobby, _connector, _server) = setup();
    let registry = TypeRegistry::new();
    let rooms: Vec<RoomInfo> = [("a", 1u8), ("b", 5), ("c", 7)]
        .into_iter()
        .map(|(id, level)| RoomInfo {
            id: RoomId::from(id),
            public_props: encode_props(&props([("level", Value::U8(level))]), &registry).unwrap(),
            ..RoomInfo::default()
        })
        .collect();
    lobby.respond("/rooms/search", &rooms);

    let found = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&found);
    client.search(
        &Query::new().at_least("level", 5u8),
        SearchOptions {
            search_group: 1,
            limit: 10,
            check_joinable: true,
            ..SearchOptions::default()
        },
        move |rooms| *sink.lock().unwrap() = Some(rooms),
        |err| panic!("{err}"),
    );
    pump_until(&mut client, |_| found.lock().unwrap().is_some()).await;

    let ids: Vec<String> = found
        .lock()
        .unwrap()
        .take()
        .unwrap()
        .into_iter()
        .map(|room| room.id.to_string())
        .collect();
    assert_eq!(ids, vec!["b", "c"]);

    let params: SearchParams = JsonCodec.decode(&lobby.requests()[0].body).unwrap();
    assert_eq!(params.search_group, 1);
    assert_eq!(params.limit, 10);
    assert!(params.check_joinable);
    assert!(!params.check_watchable);
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_closed_room_is_removed() {
    let (mut client, lobby, _connector, mut server) = setup();
    lobby.respond("/rooms", &joined("r5"));
    let log = Log::default();
    let receiver = log.clone();
    client.create(
        RoomOption::default(),
        &Dict::new(),
        move |room| {
            room.set_event_receiver(receiver);
            true
        },
        |err| panic!("{err}"),
    );
    pump_until(&mut client, |c| c.rooms().len() == 1).await;

    let peer = accept(&mut server).await;
    peer.close(1000, "room ended").unwrap();
    pump_until(&mut client, |c| c.rooms().is_empty()).await;
    assert_eq!(log.snapshot(), vec!["closed room ended"]);
}

#[tokio::test]
async fn test_force_disconnect_closes_every_room() {
    let (mut client, lobby, _connector, _server) = setup();
    lobby.respond("/rooms/join/id/r6", &joined("r6"));
    lobby.respond("/rooms/join/id/r7", &joined("r7"));
    for id in ["r6", "r7"] {
        client.join_by_id(&RoomId::from(id), None, &Dict::new(), |_| true, |err| panic!("{err}"));
    }
    pump_until(&mut client, |c| c.rooms().len() == 2).await;

    client.force_disconnect();
    pump_until(&mut client, |c| c.rooms().is_empty()).await;
}

#[test]
fn test_build_without_runtime_fails() {
    let (connector, _server) = memory::pair();
    let result = ClientBuilder::new("testapp", "alice").build(FakeLobby::default(), connector);
    assert!(matches!(result, Err(ClientError::NoRuntime)));
}
