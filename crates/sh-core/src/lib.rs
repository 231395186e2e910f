//! # sh-core
//!
//! Core types shared by every SlateHub crate:
//! - The error taxonomy (`ShError`, `RemoteError`, `ValidationErrors`)
//! - Result type alias
//! - Record identifiers as the remote engine spells them (`table:key`)
//! - Entity traits
//! - Client configuration

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::*;
pub use result::*;
pub use traits::*;
pub use types::*;
