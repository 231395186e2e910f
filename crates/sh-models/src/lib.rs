//! # sh-models
//!
//! Domain records as the remote engine returns them.
//!
//! Every record deserializes tolerantly: optional fields may be missing or
//! `null`, and single related records may arrive wrapped in an array.

pub mod department;
pub mod group;
pub mod person;
pub mod role;
pub mod shape;

pub use department::{Department, PersonDepartment};
pub use group::{Group, MemberPerson, MemberRole, Membership, Organization, Production};
pub use person::{
    validate_email, CredentialsUpdate, Email, Phone, Profile, ProfileImage, ProfileUpdate, Signup,
    Social,
};
pub use role::{CatalogRole, DepartmentRef, PersonRole, Role};
