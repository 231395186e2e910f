//! Scripted engine double for accessor tests

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sh_auth::{ConnectionState, MemoryTokenStore};
use sh_core::config::{ClientConfig, EngineConfig, DEFAULT_TOKEN_KEY};
use sh_models::Profile;

use crate::client::Database;
use crate::engine::{AuthParams, Engine, EngineError};

type Reply = Result<Value, EngineError>;

/// Engine answering each method from a queue of canned replies.
///
/// Methods without a queued reply succeed with `null`; `query` then returns
/// no statements.
#[derive(Default)]
pub struct ScriptedEngine {
    replies: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
    calls: Mutex<Vec<&'static str>>,
    queries: Mutex<Vec<(String, Value)>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, method: &'static str, reply: Reply) {
        self.replies.lock().entry(method).or_default().push_back(reply);
    }

    /// Queue one query result, one value per statement
    pub fn push_query(&self, statements: Vec<Value>) {
        self.push("query", Ok(Value::Array(statements)));
    }

    /// Queue a query aborted by `THROW message`
    pub fn push_query_err(&self, message: &str) {
        self.push(
            "query",
            Err(EngineError::statement(format!("An error occurred: {}", message))),
        );
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn queries(&self) -> Vec<(String, Value)> {
        self.queries.lock().clone()
    }

    fn next(&self, method: &'static str) -> Reply {
        self.calls.lock().push(method);
        self.replies
            .lock()
            .get_mut(method)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(Value::Null))
    }
}

fn token_of(value: Value) -> Option<String> {
    match value {
        Value::String(token) => Some(token),
        Value::Object(map) => map.get("token").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn connect(&self, _config: &EngineConfig) -> Result<(), EngineError> {
        self.next("connect").map(|_| ())
    }

    async fn use_namespace(&self, _namespace: &str, _database: &str) -> Result<(), EngineError> {
        self.next("use_namespace").map(|_| ())
    }

    async fn signup(&self, _params: &AuthParams) -> Result<Option<String>, EngineError> {
        self.next("signup").map(token_of)
    }

    async fn signin(&self, _params: &AuthParams) -> Result<Option<String>, EngineError> {
        self.next("signin").map(token_of)
    }

    async fn authenticate(&self, _token: &str) -> Result<(), EngineError> {
        self.next("authenticate").map(|_| ())
    }

    async fn invalidate(&self) -> Result<(), EngineError> {
        self.next("invalidate").map(|_| ())
    }

    async fn info(&self) -> Result<Value, EngineError> {
        self.next("info")
    }

    async fn query(&self, sql: &str, vars: Value) -> Result<Vec<Value>, EngineError> {
        self.queries.lock().push((sql.to_string(), vars));
        match self.next("query")? {
            Value::Array(statements) => Ok(statements),
            _ => Ok(Vec::new()),
        }
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.next("close").map(|_| ())
    }
}

pub fn alice_record() -> Value {
    json!({
        "id": "person:alice",
        "username": "alice",
        "emails": [{ "address": "alice@example.com", "is_primary": true }]
    })
}

pub fn alice() -> Profile {
    serde_json::from_value(alice_record()).unwrap()
}

/// A connected database signed in as `person:alice`, without engine traffic
pub fn connected_database(engine: &Arc<ScriptedEngine>) -> Database {
    connected_as(engine, alice())
}

pub fn connected_as(engine: &Arc<ScriptedEngine>, user: Profile) -> Database {
    let db = Database::new(
        engine.clone(),
        ClientConfig::default(),
        Arc::new(MemoryTokenStore::new()),
    );
    db.state().connection.set(ConnectionState::Connected);
    db.state().set_signed_in(user, "tok");
    db
}

/// A database that has not connected yet but holds a persisted session token
pub fn restorable_database(engine: &Arc<ScriptedEngine>, token: &str) -> Database {
    Database::new(
        engine.clone(),
        ClientConfig::default(),
        Arc::new(MemoryTokenStore::with_token(DEFAULT_TOKEN_KEY, token)),
    )
}
