//! Observable session state
//!
//! Each value lives in a `StateCell`: reads are synchronous snapshots, writes
//! replace or modify the value atomically, and UI code can `subscribe` to be
//! woken on change.

use std::fmt;

use serde::{Deserialize, Serialize};
use sh_core::{RecordId, RemoteError};
use sh_models::Profile;
use tokio::sync::watch;

/// A synchronously readable value with change notification
pub struct StateCell<T> {
    tx: watch::Sender<T>,
}

impl<T> StateCell<T> {
    pub fn new(value: T) -> Self {
        let (tx, _rx) = watch::channel(value);
        Self { tx }
    }

    /// Borrow the current value for the duration of `f`
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone> StateCell<T> {
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }
}

impl<T: Default> Default for StateCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for StateCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateCell").field(&*self.tx.borrow()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        })
    }
}

/// Authentication snapshot. The default value is the signed-out state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub user: Option<Profile>,
    pub token: Option<String>,
}

impl AuthState {
    pub fn signed_in(user: Profile, token: impl Into<String>) -> Self {
        Self {
            is_authenticated: true,
            user: Some(user),
            token: Some(token.into()),
        }
    }

    pub fn user_id(&self) -> Option<&RecordId> {
        self.user.as_ref().and_then(|u| u.id.as_ref())
    }
}

/// Structured error record shown by the UI
pub type ErrorDetails = RemoteError;

/// All observable state owned by one connection manager
#[derive(Debug, Default)]
pub struct SessionState {
    pub connection: StateCell<ConnectionState>,
    pub auth: StateCell<AuthState>,
    pub error_message: StateCell<Option<String>>,
    pub error_details: StateCell<Option<ErrorDetails>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.read(|a| a.is_authenticated)
    }

    pub fn current_user(&self) -> Option<Profile> {
        self.auth.read(|a| a.user.clone())
    }

    /// Id of the signed-in person, if any
    pub fn current_user_id(&self) -> Option<RecordId> {
        self.auth
            .read(|a| a.is_authenticated.then(|| a.user_id().cloned()).flatten())
    }

    pub fn set_signed_in(&self, user: Profile, token: impl Into<String>) {
        self.auth.set(AuthState::signed_in(user, token));
    }

    pub fn sign_out_locally(&self) {
        self.auth.set(AuthState::default());
    }

    /// Apply `f` to the cached user snapshot; no-op when signed out
    pub fn update_user(&self, f: impl FnOnce(&mut Profile)) {
        self.auth.update(|auth| {
            if let Some(user) = auth.user.as_mut() {
                f(user);
            }
        });
    }

    pub fn record_error(&self, details: ErrorDetails) {
        self.error_message.set(Some(details.message.clone()));
        self.error_details.set(Some(details));
    }

    pub fn clear_error(&self) {
        self.error_message.set(None);
        self.error_details.set(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Profile {
        Profile {
            id: Some(RecordId::new("person", "alice")),
            username: "alice".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_cell_get_set_update() {
        let cell = StateCell::new(1u32);
        assert_eq!(cell.get(), 1);
        cell.set(2);
        cell.update(|v| *v += 3);
        assert_eq!(cell.get(), 5);
        assert_eq!(cell.read(|v| *v * 2), 10);
    }

    #[tokio::test]
    async fn test_cell_subscribe_sees_changes() {
        let cell = StateCell::new(ConnectionState::Disconnected);
        let mut rx = cell.subscribe();
        cell.set(ConnectionState::Connected);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ConnectionState::Connected);
    }

    #[test]
    fn test_signed_in_and_out() {
        let state = SessionState::new();
        assert!(!state.is_authenticated());
        assert_eq!(state.current_user_id(), None);

        state.set_signed_in(alice(), "tok");
        assert!(state.is_authenticated());
        assert_eq!(state.current_user_id(), Some(RecordId::new("person", "alice")));
        assert_eq!(state.auth.get().token.as_deref(), Some("tok"));

        state.sign_out_locally();
        assert_eq!(state.auth.get(), AuthState::default());
    }

    #[test]
    fn test_update_user_is_noop_when_signed_out() {
        let state = SessionState::new();
        state.update_user(|u| u.username = "mallory".into());
        assert!(state.current_user().is_none());

        state.set_signed_in(alice(), "tok");
        state.update_user(|u| u.full_name = Some("Alice".into()));
        assert_eq!(state.current_user().unwrap().full_name.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_record_and_clear_error() {
        let state = SessionState::new();
        state.record_error(RemoteError::new("Failed to sign in", 401, "bad password"));
        assert_eq!(state.error_message.get().as_deref(), Some("Failed to sign in"));
        assert_eq!(state.error_details.get().unwrap().code, 401);

        state.clear_error();
        assert!(state.error_message.get().is_none());
        assert!(state.error_details.get().is_none());
    }
}
