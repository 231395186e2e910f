//! # sh-auth
//!
//! Client-side session handling for SlateHub:
//!
//! - Observable state cells for connection and authentication state
//! - Persisted session token storage
//! - The membership permission policy shared by organizations and productions

pub mod permissions;
pub mod state;
pub mod token;

pub use permissions::{authorize, authorize_removal, authorize_role_change, GroupAction};
pub use state::{AuthState, ConnectionState, ErrorDetails, SessionState, StateCell};
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreError};
