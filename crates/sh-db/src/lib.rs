//! # sh-db
//!
//! SurrealDB access layer for SlateHub.
//!
//! This crate provides:
//!
//! - `Database`, the connection and session manager
//! - `HttpRpcEngine`, the JSON-RPC transport behind it
//! - Domain accessors for organizations, productions, profiles, roles and departments
//!
//! ## Example
//!
//! ```ignore
//! use sh_core::config::ClientConfig;
//! use sh_db::{Database, OrganizationRepository};
//!
//! let db = Database::from_config(ClientConfig::from_env()?)?;
//! db.connect().await;
//! db.signin("alice", "secret").await?;
//!
//! let orgs = OrganizationRepository::new(db.clone());
//! let org = orgs.create("Acme Films").await?;
//! ```

pub mod client;
pub mod departments;
pub mod engine;
pub mod envelope;
pub mod groups;
pub mod profile;
pub mod repository;
pub mod roles;
pub mod rpc;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use client::{Database, SignedIn};
pub use departments::DepartmentRepository;
pub use engine::{AuthParams, Engine, EngineError, EngineErrorKind};
pub use envelope::{normalize_many, normalize_one, StatementResults};
pub use groups::{GroupRepository, OrganizationRepository, ProductionRepository};
pub use profile::ProfileRepository;
pub use repository::ContextExt;
pub use roles::RoleRepository;
pub use rpc::HttpRpcEngine;
