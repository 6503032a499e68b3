//! # kinship-shared
//!
//! Domain types, error taxonomy and constants shared by the Kinship store and
//! client crates.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{IndexError, MutationError, RemoteError, ResolveError};
pub use types::{FollowEdge, FollowQuery, Identity, ProfileId, RelationshipView};
