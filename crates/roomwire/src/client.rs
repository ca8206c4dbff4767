//! The client manager.
//!
//! A [`Client`] performs lobby handshakes in the background and turns
//! each successful one into a started [`Room`]. Like rooms, it delivers
//! everything through [`Client::process_callback`], which the application
//! calls once per tick: handshake results first, then each room's own
//! callbacks. Closed rooms are dropped from the managed set there.

use std::sync::Arc;

use roomwire_dispatch::CallbackQueue;
use roomwire_protocol::{
    ClientInfo, Codec, CreateParams, Dict, JoinParams, JoinedRoom, JsonCodec, Query, RoomId,
    RoomInfo, RoomOption, SearchParams, TypeRegistry,
};
use roomwire_room::{Room, RoomConfig};
use roomwire_transport::Connector;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::lobby::{self, Lobby, LobbyRequest};
use crate::ClientError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settings shared by every room the client opens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub room: RoomConfig,
}

/// Filters for [`Client::search`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub search_group: u32,
    /// Most rooms to return.
    pub limit: u32,
    /// Only rooms that can be joined.
    pub check_joinable: bool,
    /// Only rooms that can be watched.
    pub check_watchable: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            search_group: 0,
            limit: 100,
            check_joinable: false,
            check_watchable: false,
        }
    }
}

/// Builder for configuring a [`Client`].
///
/// # Example
///
/// ```rust,ignore
/// let client = ClientBuilder::new("my-app", "alice")
///     .with_bearer(token)
///     .build(lobby, WebSocketConnector::default())?;
/// ```
pub struct ClientBuilder<K: Codec = JsonCodec> {
    app_id: String,
    user_id: String,
    bearer: String,
    config: ClientConfig,
    runtime: Option<Handle>,
    registry: Arc<TypeRegistry>,
    codec: K,
}

impl ClientBuilder<JsonCodec> {
    pub fn new(app_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            user_id: user_id.into(),
            bearer: String::new(),
            config: ClientConfig::default(),
            runtime: None,
            registry: Arc::new(TypeRegistry::new()),
            codec: JsonCodec,
        }
    }
}

impl<K: Codec> ClientBuilder<K> {
    /// Sets the lobby bearer token.
    pub fn with_bearer(mut self, bearer: impl Into<String>) -> Self {
        self.bearer = bearer.into();
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Runtime for handshakes and room sessions. Defaults to the runtime
    /// current at [`build`](Self::build) time.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Custom types carried in properties and RPC payloads.
    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Replaces the handshake body codec.
    pub fn with_codec<K2: Codec>(self, codec: K2) -> ClientBuilder<K2> {
        ClientBuilder {
            app_id: self.app_id,
            user_id: self.user_id,
            bearer: self.bearer,
            config: self.config,
            runtime: self.runtime,
            registry: self.registry,
            codec,
        }
    }

    /// # Errors
    /// [`ClientError::NoRuntime`] if no runtime was set and none is
    /// current.
    pub fn build<L, C>(self, lobby: L, connector: C) -> Result<Client<L, C, K>, ClientError>
    where
        L: Lobby,
        C: Connector + Clone,
    {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| ClientError::NoRuntime)?,
        };
        Ok(Client {
            shared: Arc::new(Shared {
                lobby,
                codec: self.codec,
                registry: self.registry,
                app_id: self.app_id,
                user_id: self.user_id,
                bearer: self.bearer,
            }),
            connector,
            runtime,
            config: self.config,
            completions: CallbackQueue::new(),
            rooms: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

type OnJoined = Box<dyn FnOnce(&mut Room) -> bool + Send>;
type OnSearched = Box<dyn FnOnce(Vec<RoomInfo>) + Send>;
type OnFailed = Box<dyn FnOnce(&ClientError) + Send>;

/// A finished handshake, waiting for `process_callback`.
enum Completion {
    Joined {
        joined: JoinedRoom,
        on_success: OnJoined,
        on_failed: OnFailed,
    },
    Searched {
        rooms: Vec<RoomInfo>,
        on_success: OnSearched,
    },
    Failed {
        error: ClientError,
        on_failed: OnFailed,
    },
}

/// State the background handshake tasks need.
struct Shared<L, K> {
    lobby: L,
    codec: K,
    registry: Arc<TypeRegistry>,
    app_id: String,
    user_id: String,
    bearer: String,
}

impl<L: Lobby, K: Codec> Shared<L, K> {
    async fn call<R: DeserializeOwned>(&self, path: String, body: Vec<u8>) -> Result<R, ClientError> {
        tracing::debug!(%path, user_id = %self.user_id, "lobby request");
        let response = self
            .lobby
            .call(LobbyRequest {
                path,
                app_id: self.app_id.clone(),
                user_id: self.user_id.clone(),
                bearer: self.bearer.clone(),
                body,
            })
            .await?;
        Ok(self.codec.decode(&response)?)
    }
}

/// Owns the lobby connection and every room opened through it.
///
/// Each handshake method takes two callbacks, both run later from
/// [`process_callback`](Self::process_callback). `on_success` receives
/// the new room before it connects, which is the place to set its
/// [`EventReceiver`](roomwire_room::EventReceiver) and register RPCs;
/// returning `false` discards the room.
pub struct Client<L, C, K = JsonCodec> {
    shared: Arc<Shared<L, K>>,
    connector: C,
    runtime: Handle,
    config: ClientConfig,
    completions: CallbackQueue<Completion>,
    rooms: Vec<Room>,
}

impl<L, C, K> Client<L, C, K>
where
    L: Lobby,
    C: Connector + Clone,
    K: Codec,
{
    /// Creates a room and joins it as its master.
    pub fn create(
        &self,
        option: RoomOption,
        my_props: &Dict,
        on_success: impl FnOnce(&mut Room) -> bool + Send + 'static,
        on_failed: impl FnOnce(&ClientError) + Send + 'static,
    ) {
        let body = self.client_info(my_props).and_then(|client_info| {
            self.encode(&CreateParams {
                room_option: option,
                client_info,
            })
        });
        self.spawn_join(lobby::CREATE_PATH.to_string(), body, on_success, on_failed);
    }

    /// Joins the room with `id`. `query`, if given, must hold for the
    /// room's public properties.
    pub fn join_by_id(
        &self,
        id: &RoomId,
        query: Option<&Query>,
        my_props: &Dict,
        on_success: impl FnOnce(&mut Room) -> bool + Send + 'static,
        on_failed: impl FnOnce(&ClientError) + Send + 'static,
    ) {
        let body = self.join_body(query, my_props);
        self.spawn_join(lobby::join_by_id_path(id), body, on_success, on_failed);
    }

    pub fn join_by_number(
        &self,
        number: u32,
        query: Option<&Query>,
        my_props: &Dict,
        on_success: impl FnOnce(&mut Room) -> bool + Send + 'static,
        on_failed: impl FnOnce(&ClientError) + Send + 'static,
    ) {
        let body = self.join_body(query, my_props);
        self.spawn_join(lobby::join_by_number_path(number), body, on_success, on_failed);
    }

    /// Joins any joinable room in `search_group` matching `query`.
    pub fn random_join(
        &self,
        search_group: u32,
        query: &Query,
        my_props: &Dict,
        on_success: impl FnOnce(&mut Room) -> bool + Send + 'static,
        on_failed: impl FnOnce(&ClientError) + Send + 'static,
    ) {
        let body = self.join_body(Some(query), my_props);
        self.spawn_join(lobby::random_join_path(search_group), body, on_success, on_failed);
    }

    /// Watches the room with `id`. A watcher receives events but is not
    /// a player.
    pub fn watch_by_id(
        &self,
        id: &RoomId,
        query: Option<&Query>,
        on_success: impl FnOnce(&mut Room) -> bool + Send + 'static,
        on_failed: impl FnOnce(&ClientError) + Send + 'static,
    ) {
        let body = self.join_body(query, &Dict::new());
        self.spawn_join(lobby::watch_by_id_path(id), body, on_success, on_failed);
    }

    pub fn watch_by_number(
        &self,
        number: u32,
        query: Option<&Query>,
        on_success: impl FnOnce(&mut Room) -> bool + Send + 'static,
        on_failed: impl FnOnce(&ClientError) + Send + 'static,
    ) {
        let body = self.join_body(query, &Dict::new());
        self.spawn_join(lobby::watch_by_number_path(number), body, on_success, on_failed);
    }

    /// Lists rooms matching `query`. Results are checked against the
    /// query again locally.
    pub fn search(
        &self,
        query: &Query,
        options: SearchOptions,
        on_success: impl FnOnce(Vec<RoomInfo>) + Send + 'static,
        on_failed: impl FnOnce(&ClientError) + Send + 'static,
    ) {
        let body = SearchParams::new(options.search_group, query, options.limit, &self.shared.registry)
            .map(|params| SearchParams {
                check_joinable: options.check_joinable,
                check_watchable: options.check_watchable,
                ..params
            })
            .map_err(ClientError::from)
            .and_then(|params| self.encode(&params));

        let query = query.clone();
        let registry = Arc::clone(&self.shared.registry);
        let on_success: OnSearched = Box::new(on_success);
        let on_failed: OnFailed = Box::new(on_failed);
        self.spawn_call(
            lobby::SEARCH_PATH.to_string(),
            body,
            move |result: Result<Vec<RoomInfo>, ClientError>| {
                match result.and_then(|rooms| filter_rooms(rooms, &query, &registry)) {
                    Ok(rooms) => Completion::Searched { rooms, on_success },
                    Err(error) => Completion::Failed { error, on_failed },
                }
            },
        );
    }

    /// Runs finished handshakes, then every room's callbacks. Rooms that
    /// closed are removed afterwards. Returns how many callbacks ran.
    pub fn process_callback(&mut self) -> Result<usize, ClientError> {
        let completions = self.completions.clone();
        let mut count = completions.drain_with(|completion| self.complete(completion))?;
        for room in &mut self.rooms {
            count += room.process_callback()?;
        }
        self.rooms.retain(|room| {
            if room.is_closed() {
                tracing::info!(room_id = %room.id(), "room removed");
            }
            !room.is_closed()
        });
        Ok(count)
    }

    /// Drops every room connection. Each room reports `on_closed` and
    /// leaves the managed set on the next
    /// [`process_callback`](Self::process_callback).
    pub fn force_disconnect(&mut self) {
        for room in &mut self.rooms {
            room.force_disconnect();
        }
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn room(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.iter().find(|room| room.id() == id)
    }

    pub fn room_mut(&mut self, id: &RoomId) -> Option<&mut Room> {
        self.rooms.iter_mut().find(|room| room.id() == id)
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.shared.registry
    }

    pub fn user_id(&self) -> &str {
        &self.shared.user_id
    }

    fn client_info(&self, my_props: &Dict) -> Result<ClientInfo, ClientError> {
        Ok(ClientInfo::new(
            self.shared.user_id.as_str(),
            my_props,
            &self.shared.registry,
        )?)
    }

    fn join_body(&self, query: Option<&Query>, my_props: &Dict) -> Result<Vec<u8>, ClientError> {
        let queries = match query {
            Some(query) => query.conditions(&self.shared.registry)?,
            None => Vec::new(),
        };
        self.encode(&JoinParams {
            queries,
            client_info: self.client_info(my_props)?,
        })
    }

    fn encode<T: Serialize>(&self, body: &T) -> Result<Vec<u8>, ClientError> {
        Ok(self.shared.codec.encode(body)?)
    }

    fn spawn_join(
        &self,
        path: String,
        body: Result<Vec<u8>, ClientError>,
        on_success: impl FnOnce(&mut Room) -> bool + Send + 'static,
        on_failed: impl FnOnce(&ClientError) + Send + 'static,
    ) {
        let on_success: OnJoined = Box::new(on_success);
        let on_failed: OnFailed = Box::new(on_failed);
        self.spawn_call(path, body, move |result: Result<JoinedRoom, ClientError>| match result {
            Ok(joined) => Completion::Joined {
                joined,
                on_success,
                on_failed,
            },
            Err(error) => Completion::Failed { error, on_failed },
        });
    }

    /// Sends `body` to the lobby in the background and queues what
    /// `complete` makes of the response. A body that failed to build is
    /// queued as a failure right away.
    fn spawn_call<R, F>(&self, path: String, body: Result<Vec<u8>, ClientError>, complete: F)
    where
        R: DeserializeOwned + Send + 'static,
        F: FnOnce(Result<R, ClientError>) -> Completion + Send + 'static,
    {
        let body = match body {
            Ok(body) => body,
            Err(err) => {
                self.completions.enqueue(complete(Err(err)));
                return;
            }
        };
        let shared = Arc::clone(&self.shared);
        let completions = self.completions.clone();
        self.runtime.spawn(async move {
            let result = shared.call(path, body).await;
            completions.enqueue(complete(result));
        });
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Joined {
                joined,
                on_success,
                on_failed,
            } => {
                let mut room = match Room::new(
                    joined,
                    self.shared.user_id.as_str(),
                    self.config.room.clone(),
                    Arc::clone(&self.shared.registry),
                ) {
                    Ok(room) => room,
                    Err(err) => return on_failed(&ClientError::from(err)),
                };
                if !on_success(&mut room) {
                    tracing::info!(room_id = %room.id(), "room discarded");
                    return;
                }
                if let Err(err) = room.start(self.connector.clone(), &self.runtime) {
                    return on_failed(&ClientError::from(err));
                }
                tracing::info!(room_id = %room.id(), "room started");
                self.rooms.push(room);
            }
            Completion::Searched { rooms, on_success } => on_success(rooms),
            Completion::Failed { error, on_failed } => {
                tracing::warn!(error = %error, "lobby request failed");
                on_failed(&error);
            }
        }
    }
}

/// Drops rooms whose public properties do not satisfy `query`.
fn filter_rooms(
    rooms: Vec<RoomInfo>,
    query: &Query,
    registry: &TypeRegistry,
) -> Result<Vec<RoomInfo>, ClientError> {
    let mut matching = Vec::with_capacity(rooms.len());
    for room in rooms {
        let props = room.decode_public_props(registry)?;
        if query.matches(&props, registry)? {
            matching.push(room);
        }
    }
    Ok(matching)
}
