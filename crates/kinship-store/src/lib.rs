//! # kinship-store
//!
//! Durable key-value storage for the Kinship client.
//!
//! The session core only ever persists a handful of string values (the active
//! identity index, the cached identity list and the auth tokens).  This crate
//! exposes them through the [`KeyValueStore`] trait, implemented by a
//! SQLite-backed [`Database`] for real use and an in-memory [`MemoryStore`]
//! for tests and ephemeral sessions.

pub mod database;
pub mod kv;
pub mod migrations;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use kv::{KeyValueStore, MemoryStore};
