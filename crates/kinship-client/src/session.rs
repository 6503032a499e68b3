//! Identity store: which local profiles exist and which one is active.
//!
//! A [`Session`] is owned by the [`Client`](crate::Client) behind
//! `Arc<Mutex<>>` and handed to consumers by reference.  It touches exactly
//! two kinds of state: the in-memory identity list / active index, and a few
//! durable keys.  It never talks to the network; refreshing the identity list
//! is done by the caller through a [`ProfileSource`](crate::remote::ProfileSource)
//! and installed with [`Session::replace_identities`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use kinship_shared::constants::{
    KEY_ACCESS_TOKEN, KEY_PROFILES, KEY_REFRESH_TOKEN, KEY_SELECTED_PROFILE,
};
use kinship_shared::{Identity, IndexError, ProfileId, RemoteError};
use kinship_store::{KeyValueStore, StoreError};

use crate::events::{EventBus, SessionEvent};
use crate::remote::AccessToken;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Profile refresh failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Access and refresh tokens issued by the graph API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct Session {
    identities: Vec<Identity>,
    /// Always `None` or a valid index into `identities`.
    active: Option<usize>,
    storage: Box<dyn KeyValueStore>,
    events: EventBus,
    access_token: AccessToken,
    generation: u64,
}

impl Session {
    /// An empty, signed-out session.
    pub fn new(storage: Box<dyn KeyValueStore>, events: EventBus) -> Self {
        Self {
            identities: Vec::new(),
            active: None,
            storage,
            events,
            access_token: AccessToken::default(),
            generation: 0,
        }
    }

    /// Rebuild the session from durable storage.
    ///
    /// Corrupt values are discarded with a warning instead of failing the
    /// start-up; only storage I/O errors are returned.
    pub fn restore(
        storage: Box<dyn KeyValueStore>,
        events: EventBus,
    ) -> Result<Self, SessionError> {
        let identities: Vec<Identity> = match storage.get(KEY_PROFILES)? {
            Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!(error = %e, "Discarding corrupt cached profile list");
                Vec::new()
            }),
            None => Vec::new(),
        };

        let stored_index = match storage.get(KEY_SELECTED_PROFILE)? {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(i) => Some(i),
                Err(e) => {
                    warn!(value = %raw, error = %e, "Ignoring invalid selected profile index");
                    None
                }
            },
            None => None,
        };

        let active = clamp_index(stored_index.unwrap_or(0), identities.len());

        let access_token = AccessToken::default();
        access_token.set(storage.get(KEY_ACCESS_TOKEN)?);

        info!(
            profiles = identities.len(),
            active = ?active,
            "Restored session"
        );

        Ok(Self {
            identities,
            active,
            storage,
            events,
            access_token,
            generation: 0,
        })
    }

    pub fn list_identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn active_identity(&self) -> Option<&Identity> {
        self.active.and_then(|i| self.identities.get(i))
    }

    pub fn active_id(&self) -> Option<&ProfileId> {
        self.active_identity().map(|identity| &identity.id)
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn is_authenticated(&self) -> bool {
        self.active.is_some()
    }

    /// Bumped by every [`Session::clear_session`].
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Switch the active identity.
    pub fn select_identity(&mut self, index: usize) -> Result<(), IndexError> {
        if index >= self.identities.len() {
            return Err(IndexError {
                index,
                len: self.identities.len(),
            });
        }

        let previous = self.active_id().cloned();
        self.active = Some(index);
        self.persist_index();

        let current = self.active_id().cloned();
        info!(index, profile = ?current, "Switched active identity");

        if previous != current {
            self.events
                .publish(SessionEvent::IdentityChanged { previous, current });
        }
        Ok(())
    }

    /// Install a freshly fetched identity list.
    ///
    /// The active index is kept when still valid and clamped otherwise.
    pub fn replace_identities(&mut self, identities: Vec<Identity>) -> Result<(), SessionError> {
        let previous = self.active_id().cloned();

        let json = serde_json::to_string(&identities)?;
        self.storage.set(KEY_PROFILES, &json)?;

        let wanted = self.active.unwrap_or(0);
        self.identities = identities;
        self.active = clamp_index(wanted, self.identities.len());
        self.persist_index();

        let current = self.active_id().cloned();
        debug!(
            profiles = self.identities.len(),
            active = ?self.active,
            "Replaced identity list"
        );

        if previous != current {
            self.events
                .publish(SessionEvent::IdentityChanged { previous, current });
        }
        Ok(())
    }

    /// Handle the transport reads its bearer token from.
    pub fn access_token(&self) -> AccessToken {
        self.access_token.clone()
    }

    pub fn set_tokens(&mut self, tokens: &AuthTokens) -> Result<(), SessionError> {
        self.storage.set(KEY_ACCESS_TOKEN, &tokens.access_token)?;
        self.storage.set(KEY_REFRESH_TOKEN, &tokens.refresh_token)?;
        self.access_token.set(Some(tokens.access_token.clone()));
        Ok(())
    }

    pub fn tokens(&self) -> Result<Option<AuthTokens>, SessionError> {
        let access = self.storage.get(KEY_ACCESS_TOKEN)?;
        let refresh = self.storage.get(KEY_REFRESH_TOKEN)?;
        Ok(match (access, refresh) {
            (Some(access_token), Some(refresh_token)) => Some(AuthTokens {
                access_token,
                refresh_token,
            }),
            _ => None,
        })
    }

    /// Log out: forget every identity, the persisted index and the tokens.
    ///
    /// Idempotent. Always publishes [`SessionEvent::SessionCleared`] so that
    /// results still in flight from before the logout are discarded.
    pub fn clear_session(&mut self) {
        self.identities.clear();
        self.active = None;
        self.access_token.set(None);
        self.generation += 1;

        for key in [
            KEY_SELECTED_PROFILE,
            KEY_PROFILES,
            KEY_ACCESS_TOKEN,
            KEY_REFRESH_TOKEN,
        ] {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "Failed to remove persisted session value");
            }
        }

        info!(generation = self.generation, "Session cleared");
        self.events.publish(SessionEvent::SessionCleared);
    }

    // The index is a convenience for the next start; a failed write is not
    // worth failing the switch over.
    fn persist_index(&mut self) {
        let result = match self.active {
            Some(i) => self.storage.set(KEY_SELECTED_PROFILE, &i.to_string()),
            None => self.storage.remove(KEY_SELECTED_PROFILE),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist selected profile index");
        }
    }
}

fn clamp_index(index: usize, len: usize) -> Option<usize> {
    if len == 0 {
        None
    } else {
        Some(index.min(len - 1))
    }
}

#[cfg(test)]
mod tests {
    use kinship_store::MemoryStore;

    use super::*;
    use crate::events::{drain, Delivery};
    use crate::testing::identity;

    fn session_with(n: usize) -> (Session, EventBus) {
        let bus = EventBus::new(16);
        let mut session = Session::new(Box::new(MemoryStore::new()), bus.clone());
        let ids = (0..n).map(|i| identity(&format!("0x0{i}"))).collect();
        session.replace_identities(ids).unwrap();
        (session, bus)
    }

    #[test]
    fn test_select_then_active_for_every_index() {
        let (mut session, _bus) = session_with(3);
        for i in 0..3 {
            session.select_identity(i).unwrap();
            assert_eq!(session.active_identity(), Some(&session.list_identities()[i]));
        }
    }

    #[test]
    fn test_select_out_of_range_leaves_state() {
        let (mut session, _bus) = session_with(2);
        session.select_identity(1).unwrap();

        let err = session.select_identity(2).unwrap_err();
        assert_eq!(err, IndexError { index: 2, len: 2 });
        assert_eq!(session.active_index(), Some(1));
    }

    #[test]
    fn test_select_publishes_identity_changed() {
        let (mut session, bus) = session_with(2);
        let mut rx = bus.subscribe();

        session.select_identity(1).unwrap();
        // reselecting the same identity is silent
        session.select_identity(1).unwrap();

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![Delivery::Event(SessionEvent::IdentityChanged {
                previous: Some(ProfileId::from("0x00")),
                current: Some(ProfileId::from("0x01")),
            })]
        );
    }

    #[test]
    fn test_empty_session_is_unauthenticated() {
        let session = Session::new(Box::new(MemoryStore::new()), EventBus::new(4));
        assert!(session.list_identities().is_empty());
        assert!(session.active_identity().is_none());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_shrinking_list_clamps_active_index() {
        let (mut session, _bus) = session_with(3);
        session.select_identity(2).unwrap();

        session
            .replace_identities(vec![identity("0x00"), identity("0x01")])
            .unwrap();
        assert_eq!(session.active_index(), Some(1));

        session.replace_identities(Vec::new()).unwrap();
        assert_eq!(session.active_index(), None);
        assert!(session.active_identity().is_none());
    }

    #[test]
    fn test_restore_reads_persisted_index() {
        let mut store = MemoryStore::new();
        let ids = vec![identity("0x00"), identity("0x01")];
        store
            .set(KEY_PROFILES, &serde_json::to_string(&ids).unwrap())
            .unwrap();
        store.set(KEY_SELECTED_PROFILE, "1").unwrap();

        let session = Session::restore(Box::new(store), EventBus::new(4)).unwrap();
        assert_eq!(session.active_id(), Some(&ProfileId::from("0x01")));
    }

    #[test]
    fn test_restore_tolerates_corrupt_values() {
        let mut store = MemoryStore::new();
        store
            .set(KEY_PROFILES, &serde_json::to_string(&vec![identity("0x00")]).unwrap())
            .unwrap();
        store.set(KEY_SELECTED_PROFILE, "seven").unwrap();

        let session = Session::restore(Box::new(store), EventBus::new(4)).unwrap();
        assert_eq!(session.active_index(), Some(0));

        let mut store = MemoryStore::new();
        store.set(KEY_PROFILES, "{not json").unwrap();
        store.set(KEY_SELECTED_PROFILE, "4").unwrap();
        let session = Session::restore(Box::new(store), EventBus::new(4)).unwrap();
        assert!(session.list_identities().is_empty());
        assert_eq!(session.active_index(), None);
    }

    #[test]
    fn test_clear_session_is_idempotent() {
        let (mut session, bus) = session_with(2);
        session
            .set_tokens(&AuthTokens {
                access_token: "a".into(),
                refresh_token: "r".into(),
            })
            .unwrap();
        let mut rx = bus.subscribe();

        session.clear_session();
        assert!(session.list_identities().is_empty());
        assert!(session.active_identity().is_none());
        assert_eq!(session.tokens().unwrap(), None);
        assert_eq!(session.generation(), 1);

        session.clear_session();
        assert!(session.list_identities().is_empty());
        assert_eq!(session.generation(), 2);

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .all(|d| *d == Delivery::Event(SessionEvent::SessionCleared)));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_restore_loads_access_token() {
        let mut store = MemoryStore::new();
        store.set(KEY_ACCESS_TOKEN, "stored").unwrap();

        let session = Session::restore(Box::new(store), EventBus::new(4)).unwrap();
        assert_eq!(session.access_token().get().as_deref(), Some("stored"));
    }

    #[test]
    fn test_tokens_round_trip() {
        let (mut session, _bus) = session_with(1);
        assert_eq!(session.tokens().unwrap(), None);

        let tokens = AuthTokens {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
        };
        session.set_tokens(&tokens).unwrap();
        assert_eq!(session.tokens().unwrap(), Some(tokens));
    }
}
