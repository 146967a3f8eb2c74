//! Common Test Utilities
//!
//! In-memory collaborators, application state and gateway-backed clients
//! that speak the same envelope as a browser tab.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::mpsc;
use uuid::Uuid;

use call_server::application::{Broadcaster, Collaborators};
use call_server::config::{
    CallSettings, CorsSettings, DatabaseSettings, JwtSettings, PresenceSettings, ServerSettings,
    Settings, WebSocketSettings,
};
use call_server::domain::{
    CallId, CallOutcome, CallRecord, CallRecordRepository, ChatId, ConnectionId, IdentityProvider,
    RelationshipOracle, UserDirectory, UserId, UserProfile,
};
use call_server::presentation::websocket::{dispatcher, OutboundFrame, SessionState};
use call_server::shared::error::AppError;
use call_server::startup::{build_router, AppState};

pub const RING_TIMEOUT: Duration = Duration::from_secs(30);
pub const OFFLINE_GRACE: Duration = Duration::from_secs(5);

pub fn test_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
        database: DatabaseSettings {
            url: "postgres://postgres@127.0.0.1:1/call_server_test".into(),
            max_connections: 1,
            min_connections: 0,
            acquire_timeout: 1,
        },
        jwt: JwtSettings {
            secret: "test-secret-key-that-is-long-enough-32".into(),
        },
        cors: CorsSettings {
            allowed_origins: vec!["http://localhost:3000".into()],
        },
        websocket: WebSocketSettings {
            max_message_size: 65536,
            max_frame_size: 16384,
            heartbeat_interval_ms: 45000,
            identify_timeout_secs: 30,
        },
        calls: CallSettings {
            ring_timeout_secs: RING_TIMEOUT.as_secs(),
        },
        presence: PresenceSettings {
            offline_grace_secs: OFFLINE_GRACE.as_secs(),
            sweep_interval_secs: 60,
            inactivity_threshold_secs: 300,
        },
        environment: "test".into(),
    }
}

/// Users, friendships and chat memberships held in memory.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: Mutex<HashSet<UserId>>,
    friendships: Mutex<HashSet<(UserId, UserId)>>,
    chat_members: Mutex<HashSet<(ChatId, UserId)>>,
}

impl InMemoryDirectory {
    pub fn add_user(&self, user_id: UserId) {
        self.users.lock().insert(user_id);
    }

    pub fn befriend(&self, a: UserId, b: UserId) {
        self.add_user(a);
        self.add_user(b);
        let mut friendships = self.friendships.lock();
        friendships.insert((a, b));
        friendships.insert((b, a));
    }

    pub fn add_to_chat(&self, chat_id: ChatId, user_id: UserId) {
        self.add_user(user_id);
        self.chat_members.lock().insert((chat_id, user_id));
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn find_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, AppError> {
        Ok(self.users.lock().contains(&user_id).then(|| UserProfile {
            id: user_id,
            username: format!("user{}", user_id),
            avatar: None,
        }))
    }
}

#[async_trait]
impl RelationshipOracle for InMemoryDirectory {
    async fn can_call(&self, caller_id: UserId, receiver_id: UserId) -> Result<bool, AppError> {
        Ok(self.friendships.lock().contains(&(caller_id, receiver_id)))
    }

    async fn is_chat_member(&self, chat_id: ChatId, user_id: UserId) -> Result<bool, AppError> {
        Ok(self.chat_members.lock().contains(&(chat_id, user_id)))
    }

    async fn friend_ids(&self, user_id: UserId) -> Result<Vec<UserId>, AppError> {
        Ok(self
            .friendships
            .lock()
            .iter()
            .filter(|(a, _)| *a == user_id)
            .map(|(_, b)| *b)
            .collect())
    }

    async fn chat_ids(&self, user_id: UserId) -> Result<Vec<ChatId>, AppError> {
        Ok(self
            .chat_members
            .lock()
            .iter()
            .filter(|(_, member)| *member == user_id)
            .map(|(chat_id, _)| *chat_id)
            .collect())
    }
}

/// Call history writes, in the order they reached the repository.
#[derive(Default)]
pub struct RecordingRepository {
    writes: Mutex<Vec<String>>,
    outcomes: Mutex<Vec<(CallId, CallOutcome)>>,
}

impl RecordingRepository {
    pub fn outcomes(&self) -> Vec<(CallId, CallOutcome)> {
        self.outcomes.lock().clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl CallRecordRepository for RecordingRepository {
    async fn create(&self, record: &CallRecord) -> Result<(), AppError> {
        self.writes.lock().push(format!("create:{}", record.stored_type()));
        Ok(())
    }

    async fn mark_accepted(&self, _call_id: CallId, _at: DateTime<Utc>) -> Result<(), AppError> {
        self.writes.lock().push("accepted".into());
        Ok(())
    }

    async fn add_participant(
        &self,
        _call_id: CallId,
        user_id: UserId,
        _at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.writes.lock().push(format!("joined:{}", user_id));
        Ok(())
    }

    async fn mark_participant_left(
        &self,
        _call_id: CallId,
        user_id: UserId,
        _at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.writes.lock().push(format!("left:{}", user_id));
        Ok(())
    }

    async fn finish(
        &self,
        call_id: CallId,
        outcome: CallOutcome,
        _at: DateTime<Utc>,
        _duration_secs: Option<i64>,
    ) -> Result<(), AppError> {
        self.writes.lock().push(format!("finish:{}", outcome.as_str()));
        self.outcomes.lock().push((call_id, outcome));
        Ok(())
    }
}

/// Accepts tokens of the form `user-<id>`.
pub struct StaticIdentity;

impl IdentityProvider for StaticIdentity {
    fn verify(&self, token: &str) -> Result<UserId, AppError> {
        token
            .strip_prefix("user-")
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| AppError::Unauthorized("Invalid token".into()))
    }
}

/// Application state over in-memory collaborators.
pub struct TestApp {
    pub state: AppState,
    pub directory: Arc<InMemoryDirectory>,
    pub records: Arc<RecordingRepository>,
}

impl TestApp {
    /// Must run inside a Tokio runtime.
    pub fn new() -> Self {
        let settings = test_settings();
        // Never connects unless a handler touches the database
        let db = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy(&settings.database.url)
            .expect("lazy pool");

        let directory = Arc::new(InMemoryDirectory::default());
        let records = Arc::new(RecordingRepository::default());
        let collaborators = Collaborators {
            users: directory.clone(),
            relationships: directory.clone(),
            records: records.clone(),
        };
        let state = AppState::new(db, collaborators, Arc::new(StaticIdentity), settings);

        Self {
            state,
            directory,
            records,
        }
    }

    pub fn server(&self) -> axum_test::TestServer {
        axum_test::TestServer::new(build_router(self.state.clone())).expect("test server")
    }

    /// Open an authenticated connection for `user_id`.
    pub async fn connect(&self, user_id: UserId) -> TestClient {
        let connection_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut session = SessionState::new(connection_id);
        session.identify(user_id);

        self.state
            .gateway
            .register_connection(connection_id, user_id, tx);
        self.state
            .core
            .presence
            .register_connection(user_id, connection_id)
            .await;

        TestClient {
            state: self.state.clone(),
            user_id,
            session,
            rx,
        }
    }
}

/// One authenticated connection, driven the way the socket handler does.
pub struct TestClient {
    state: AppState,
    pub user_id: UserId,
    session: SessionState,
    rx: mpsc::UnboundedReceiver<OutboundFrame>,
}

impl TestClient {
    pub fn connection_id(&self) -> ConnectionId {
        self.session.connection_id
    }

    /// Send one event and route the direct reply back to this connection.
    pub async fn send(&mut self, event: &str, data: Value) {
        let text = json!({ "event": event, "data": data }).to_string();
        self.send_raw(&text).await;
    }

    pub async fn send_raw(&mut self, text: &str) {
        if let Some(reply) = dispatcher::handle_text(&self.state.core, &mut self.session, text).await
        {
            self.state
                .gateway
                .send_to_connection(self.session.connection_id, reply);
        }
    }

    /// A transport-level ping, as the socket handler sees it.
    pub async fn ping(&mut self) {
        dispatcher::handle_keepalive(&self.state.core, &mut self.session).await;
    }

    /// Every frame queued for this connection so far.
    pub fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(serde_json::from_str(&frame).expect("server frames are JSON"));
        }
        frames
    }

    /// Every queued frame exactly as it would go on the wire.
    pub fn drain_raw(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame.to_string());
        }
        frames
    }

    /// Drain and keep only the event names.
    pub fn event_names(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|frame| frame["event"].as_str().map(str::to_string))
            .collect()
    }

    /// Drain and return the payload of the first frame named `event`.
    pub fn expect_event(&mut self, event: &str) -> Value {
        let frames = self.drain();
        frames
            .iter()
            .find(|frame| frame["event"] == event)
            .map(|frame| frame["data"].clone())
            .unwrap_or_else(|| panic!("no {} frame in {:?}", event, frames))
    }

    /// Close the connection the way the socket handler does on hang-up.
    pub fn disconnect(self) {
        self.state
            .gateway
            .unregister_connection(&self.session.connection_id);
        self.state
            .core
            .presence
            .unregister_connection(self.user_id, self.session.connection_id);
    }
}

/// Let spawned tasks (timeout driver, recorder, grace timers) catch up.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub fn call_id_of(payload: &Value) -> CallId {
    payload["callId"]
        .as_str()
        .and_then(|id| id.parse().ok())
        .expect("payload carries a callId")
}
