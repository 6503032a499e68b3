//! # kinship-client
//!
//! Session and relationship state for a social-graph client: which local
//! identity is active, who follows whom (cached, batched and de-duplicated),
//! optimistic follow/unfollow with rollback, and the menus built on top.
//!
//! Most embedders only need [`Client`].

pub mod client;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod menu;
pub mod profile;
pub mod remote;
pub mod resolver;
pub mod session;

#[cfg(test)]
mod testing;

use tracing_subscriber::{fmt, EnvFilter};

pub use client::Client;
pub use config::ClientConfig;
pub use coordinator::{MutationCoordinator, MutationOutcome, PendingMutation};
pub use events::{EventBus, SessionEvent, SettledOutcome};
pub use resolver::RelationshipResolver;
pub use session::{AuthTokens, Session, SessionError};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// filter. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kinship_client=debug,kinship_store=info,warn"));

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
