//! Connection and session manager
//!
//! `Database` owns the single engine handle, the observable session state and
//! the persisted token. It is cheap to clone; every repository holds one.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use sh_auth::{ConnectionState, SessionState, TokenStore};
use sh_auth::{FileTokenStore, MemoryTokenStore};
use sh_core::config::{ClientConfig, EngineConfig};
use sh_core::{RecordId, RemoteError, ShError, ShResult};
use sh_models::{Profile, Signup};
use tokio::sync::Mutex;
use validator::Validate;

use crate::engine::{AuthParams, Engine, EngineError};
use crate::envelope::{normalize_one, StatementResults};
use crate::rpc::HttpRpcEngine;

const CONNECT_FAILURE_DETAILS: &str =
    "Check that SurrealDB is running and accessible at the configured URL";

/// Result of a successful signin
#[derive(Debug, Clone, Serialize)]
pub struct SignedIn {
    pub user: Profile,
    pub token: String,
}

struct Inner {
    engine: Arc<dyn Engine>,
    config: RwLock<EngineConfig>,
    token_key: String,
    tokens: Arc<dyn TokenStore>,
    state: SessionState,
    connect_lock: Mutex<()>,
}

/// Connection/session manager
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl Database {
    pub fn new(engine: Arc<dyn Engine>, config: ClientConfig, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                config: RwLock::new(config.engine),
                token_key: config.session.token_key,
                tokens,
                state: SessionState::new(),
                connect_lock: Mutex::new(()),
            }),
        }
    }

    /// HTTP engine plus a file token store when one is configured
    pub fn from_config(config: ClientConfig) -> ShResult<Self> {
        let engine = HttpRpcEngine::new()?;
        let tokens: Arc<dyn TokenStore> = match &config.session.token_file {
            Some(path) => Arc::new(FileTokenStore::new(path)),
            None => Arc::new(MemoryTokenStore::new()),
        };
        Ok(Self::new(Arc::new(engine), config, tokens))
    }

    pub fn state(&self) -> &SessionState {
        &self.inner.state
    }

    pub fn config(&self) -> EngineConfig {
        self.inner.config.read().clone()
    }

    /// Connect, select the namespace and restore a persisted session.
    ///
    /// Returns `false` instead of failing; the reason is left in the error state.
    pub async fn connect(&self) -> bool {
        let _guard = self.inner.connect_lock.lock().await;
        if self.connection_state() == ConnectionState::Connected {
            return true;
        }

        let state = &self.inner.state;
        state.connection.set(ConnectionState::Connecting);
        state.error_message.set(None);

        let config = self.config();
        tracing::info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to SurrealDB"
        );

        let connected = async {
            self.inner.engine.connect(&config).await?;
            self.inner
                .engine
                .use_namespace(&config.namespace, &config.database)
                .await
        }
        .await;

        if let Err(err) = connected {
            tracing::error!(error = %err, "Failed to connect to SurrealDB");
            state.connection.set(ConnectionState::Error);
            state.record_error(RemoteError::new(
                err.message.clone(),
                err.code.unwrap_or(0),
                CONNECT_FAILURE_DETAILS,
            ));
            return false;
        }

        state.connection.set(ConnectionState::Connected);
        tracing::info!("Connected to SurrealDB");

        self.restore_session().await;
        true
    }

    /// Replace the endpoint configuration, then connect
    pub async fn connect_with(&self, config: EngineConfig) -> bool {
        *self.inner.config.write() = config;
        self.connect().await
    }

    pub async fn ensure_connected(&self) -> ShResult<()> {
        if self.connection_state() == ConnectionState::Connected || self.connect().await {
            return Ok(());
        }
        let message = self
            .inner
            .state
            .error_message
            .get()
            .unwrap_or_else(|| "Unable to reach SurrealDB".to_string());
        Err(ShError::Connection { message })
    }

    async fn restore_session(&self) {
        let token = match self.inner.tokens.get(&self.inner.token_key) {
            Ok(Some(token)) => token,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(error = %err, "Could not read persisted session token");
                return;
            }
        };

        match self.authenticate_with(&token).await {
            Ok(profile) => {
                tracing::info!(username = %profile.username, "Session restored");
                self.inner.state.set_signed_in(profile, token);
            }
            Err(err) => {
                tracing::warn!(error = %err, "Persisted session token rejected");
                if let Err(err) = self.inner.tokens.remove(&self.inner.token_key) {
                    tracing::warn!(error = %err, "Failed to remove persisted session token");
                }
                self.inner.state.sign_out_locally();
            }
        }
    }

    async fn authenticate_with(&self, token: &str) -> ShResult<Profile> {
        self.inner.engine.authenticate(token).await?;
        let profile = self.identity().await?;
        if profile.id.is_none() {
            return Err(ShError::shape("Authenticated identity has no id"));
        }
        Ok(profile)
    }

    async fn identity(&self) -> ShResult<Profile> {
        let info = self.inner.engine.info().await?;
        normalize_one::<Profile>(info)?
            .ok_or_else(|| ShError::shape("No authenticated identity returned"))
    }

    /// Create an account through record access, then sign in with it
    pub async fn signup(&self, signup: &Signup) -> ShResult<SignedIn> {
        signup.validate()?;
        self.inner.state.clear_error();
        self.ensure_connected().await?;

        let params = AuthParams::new(&self.config())
            .var("username", signup.username.as_str())
            .var("email", signup.email.trim().to_lowercase())
            .var("password", signup.password.as_str());

        if let Err(err) = self.inner.engine.signup(&params).await {
            let remote = err.to_remote("Failed to sign up", 400, "Unknown error during signup");
            tracing::error!(error = %remote, code = remote.code, "Signup failed");
            self.inner.state.record_error(remote.clone());
            return Err(ShError::Authentication(remote));
        }

        tracing::info!(username = %signup.username, "Account created");
        self.signin(&signup.username, &signup.password).await
    }

    pub async fn signin(&self, username: &str, password: &str) -> ShResult<SignedIn> {
        self.inner.state.clear_error();
        self.ensure_connected().await?;

        match self.signin_inner(username, password).await {
            Ok(signed_in) => Ok(signed_in),
            Err(err) => {
                let remote = match err.remote() {
                    Some(remote) => remote.clone(),
                    None => RemoteError::new(err.to_string(), 400, "Unknown error during signin"),
                };
                tracing::error!(error = %remote, code = remote.code, "Signin failed");
                self.inner.state.record_error(remote.clone());
                Err(ShError::Authentication(remote))
            }
        }
    }

    async fn signin_inner(&self, username: &str, password: &str) -> ShResult<SignedIn> {
        let params = AuthParams::new(&self.config())
            .var("username", username)
            .var("password", password);

        let token = self
            .inner
            .engine
            .signin(&params)
            .await
            .map_err(|err| signin_error(&err))?
            .ok_or_else(|| {
                ShError::Authentication(RemoteError::new(
                    "No authentication token returned",
                    400,
                    "Unknown error during signin",
                ))
            })?;

        self.inner.tokens.set(&self.inner.token_key, &token)?;

        let mut user = self.identity().await?;
        if user.username.is_empty() {
            user.username = username.to_string();
        }

        tracing::info!(username = %user.username, "Signed in");
        self.inner.state.set_signed_in(user.clone(), token.clone());
        Ok(SignedIn { user, token })
    }

    /// Invalidate remotely if possible, then always clear the local session
    pub async fn signout(&self) {
        if let Err(err) = self.inner.engine.invalidate().await {
            tracing::warn!(error = %err, "Remote session invalidation failed");
        }
        if let Err(err) = self.inner.tokens.remove(&self.inner.token_key) {
            tracing::warn!(error = %err, "Failed to remove persisted session token");
        }
        self.inner.state.sign_out_locally();
        tracing::info!("Signed out");
    }

    pub async fn close(&self) -> bool {
        match self.inner.engine.close().await {
            Ok(()) => {
                self.inner.state.connection.set(ConnectionState::Disconnected);
                tracing::info!("Connection closed");
                true
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to close connection");
                false
            }
        }
    }

    /// Run statements verbatim with bound variables
    pub async fn query(&self, sql: &str, vars: Value) -> ShResult<StatementResults> {
        self.ensure_connected().await?;

        tracing::debug!(statements = sql.matches(';').count().max(1), "Running query");

        match self.inner.engine.query(sql, vars).await {
            Ok(results) => Ok(StatementResults::new(results)),
            Err(err) => Err(self.query_failed(err)),
        }
    }

    fn query_failed(&self, err: EngineError) -> ShError {
        let remote = err.to_remote("Query failed", 0, "Unknown error during database query");
        tracing::debug!(error = %remote, kind = ?err.kind, "Query failed");
        self.inner.state.record_error(remote);
        err.into()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.connection_state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.is_authenticated()
    }

    pub fn current_user(&self) -> Option<Profile> {
        self.inner.state.current_user()
    }

    pub fn current_user_id(&self) -> ShResult<RecordId> {
        self.inner
            .state
            .current_user_id()
            .ok_or_else(ShError::unauthenticated)
    }

    /// Id of the signed-in person, connecting first so a persisted session is restored
    pub async fn session_user_id(&self) -> ShResult<RecordId> {
        self.ensure_connected().await?;
        self.current_user_id()
    }

    /// Write a change through to the cached user snapshot
    pub fn update_current_user(&self, f: impl FnOnce(&mut Profile)) {
        self.inner.state.update_user(f);
    }
}

fn signin_error(err: &EngineError) -> ShError {
    ShError::Authentication(err.to_remote("Failed to sign in", 400, "Unknown error during signin"))
}
