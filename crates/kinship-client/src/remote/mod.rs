//! Remote collaborators consumed by the session core.
//!
//! The core never speaks a wire protocol itself; it only relies on the
//! contracts below. [`HttpGraphApi`] is the production implementation.

mod http;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use kinship_shared::{FollowQuery, Identity, ProfileId, RemoteError};

pub use http::HttpGraphApi;

/// Bearer token shared between the session, which writes it on sign-in and
/// logout, and the transport, which reads it for every request.
#[derive(Clone, Default)]
pub struct AccessToken(Arc<RwLock<Option<String>>>);

impl AccessToken {
    pub fn get(&self) -> Option<String> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set(&self, token: Option<String>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = token;
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.get().is_some() { "set" } else { "unset" };
        f.debug_tuple("AccessToken").field(&state).finish()
    }
}

#[async_trait]
pub trait GraphApi: Send + Sync {
    /// Answer every lookup in one round trip, in request order.
    async fn does_follow(&self, queries: &[FollowQuery]) -> Result<Vec<bool>, RemoteError>;

    async fn follow(&self, viewer: &ProfileId, target: &ProfileId) -> Result<(), RemoteError>;

    async fn unfollow(&self, viewer: &ProfileId, target: &ProfileId) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Profiles controlled by an external-chain account.
    async fn profiles_owned_by(&self, address: &str) -> Result<Vec<Identity>, RemoteError>;
}
