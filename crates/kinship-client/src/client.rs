//! The [`Client`] ties the identity store, resolver and coordinator together
//! over one event bus.  It is the only type most embedders need.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use kinship_shared::{
    Identity, IndexError, MutationError, ProfileId, RelationshipView, ResolveError,
};
use kinship_store::{Database, KeyValueStore};

use crate::config::ClientConfig;
use crate::coordinator::{MutationCoordinator, MutationOutcome, PendingMutation};
use crate::events::{EventBus, SessionEvent};
use crate::menu::{
    account_control, post_menu_items, AccountControl, AccountMenuFlags, Menu, PostMenuItem,
};
use crate::profile::{profile_controls, ProfileControls};
use crate::remote::{GraphApi, HttpGraphApi, ProfileSource};
use crate::resolver::RelationshipResolver;
use crate::session::{Session, SessionError};

pub struct Client {
    config: ClientConfig,
    events: EventBus,
    session: Arc<Mutex<Session>>,
    resolver: Arc<RelationshipResolver>,
    coordinator: Arc<MutationCoordinator>,
}

impl Client {
    /// Build a client over explicit collaborators, restoring whatever session
    /// `storage` holds.
    pub fn new(
        config: ClientConfig,
        storage: Box<dyn KeyValueStore>,
        api: Arc<dyn GraphApi>,
    ) -> Result<Self, SessionError> {
        let events = EventBus::new(config.event_capacity);
        let session = Session::restore(storage, events.clone())?;
        Ok(Self::assemble(config, events, session, api))
    }

    /// Open the on-disk session and talk to the configured HTTP API.
    pub fn open(config: ClientConfig) -> Result<Self, SessionError> {
        let db = match &config.data_dir {
            Some(dir) => Database::open_in(dir)?,
            None => Database::new()?,
        };

        let events = EventBus::new(config.event_capacity);
        let session = Session::restore(Box::new(db), events.clone())?;

        let api = HttpGraphApi::new(config.api_url.clone())
            .with_access_token(session.access_token());

        info!(api_url = %config.api_url, "Opened kinship client");
        Ok(Self::assemble(config, events, session, Arc::new(api)))
    }

    fn assemble(
        config: ClientConfig,
        events: EventBus,
        session: Session,
        api: Arc<dyn GraphApi>,
    ) -> Self {
        let resolver = Arc::new(RelationshipResolver::new(
            Arc::clone(&api),
            &events,
            config.relationship_ttl,
        ));
        let coordinator = Arc::new(MutationCoordinator::new(
            api,
            Arc::clone(&resolver),
            events.clone(),
            config.mutation_retries,
        ));
        Self {
            config,
            events,
            session: Arc::new(Mutex::new(session)),
            resolver,
            coordinator,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Direct access to the identity store. Do not hold across an `.await`.
    pub fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn resolver(&self) -> &RelationshipResolver {
        &self.resolver
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn active_identity(&self) -> Option<Identity> {
        self.session().active_identity().cloned()
    }

    pub fn identities(&self) -> Vec<Identity> {
        self.session().list_identities().to_vec()
    }

    pub fn select_identity(&self, index: usize) -> Result<(), IndexError> {
        self.session().select_identity(index)
    }

    pub fn logout(&self) {
        self.session().clear_session();
    }

    /// Fetch the identities controlled by `owner` and install them.
    ///
    /// A logout that happens while the fetch is outstanding wins; the fetched
    /// list is dropped.
    pub async fn refresh_identities(
        &self,
        source: &dyn ProfileSource,
        owner: &str,
    ) -> Result<(), SessionError> {
        let generation = self.session().generation();
        let profiles = source.profiles_owned_by(owner).await?;

        let mut session = self.session();
        if session.generation() != generation {
            debug!(owner, "Session cleared during profile refresh, dropping result");
            return Ok(());
        }
        info!(owner, profiles = profiles.len(), "Refreshed identities");
        session.replace_identities(profiles)
    }

    /// The active identity's relationship to `subject`, pending intents included.
    pub async fn relationship(&self, subject: &ProfileId) -> Result<RelationshipView, ResolveError> {
        let viewer = self.active_id();
        self.coordinator.resolve(viewer.as_ref(), subject).await
    }

    pub async fn relationships(
        &self,
        subjects: &[ProfileId],
    ) -> Result<Vec<RelationshipView>, ResolveError> {
        let viewer = self.active_id();
        self.coordinator.resolve_many(viewer.as_ref(), subjects).await
    }

    pub async fn follow(&self, subject: &ProfileId) -> MutationOutcome {
        self.set_following(subject, true).await
    }

    pub async fn unfollow(&self, subject: &ProfileId) -> MutationOutcome {
        self.set_following(subject, false).await
    }

    pub fn pending(&self, subject: &ProfileId) -> Option<PendingMutation> {
        let viewer = self.active_id()?;
        self.coordinator.pending(&viewer, subject)
    }

    pub fn account_control(&self, flags: AccountMenuFlags) -> AccountControl {
        let session = self.session();
        account_control(session.active_identity(), session.list_identities(), flags)
    }

    /// A closed menu for a post written by `author`.
    pub fn post_menu(&self, author: &ProfileId) -> Menu<PostMenuItem> {
        let viewer = self.active_id();
        Menu::new(post_menu_items(viewer.as_ref(), author))
    }

    pub async fn profile_controls(&self, subject: &ProfileId) -> Result<ProfileControls, ResolveError> {
        let viewer = self.active_id();
        let view = self.coordinator.resolve(viewer.as_ref(), subject).await?;
        Ok(profile_controls(viewer.as_ref(), subject, Some(&view)))
    }

    async fn set_following(&self, subject: &ProfileId, desired: bool) -> MutationOutcome {
        let Some(viewer) = self.active_id() else {
            warn!(%subject, desired, "Follow change requested while signed out");
            return MutationOutcome::RolledBack(MutationError::NotSignedIn);
        };
        self.coordinator
            .set_desired_state(&viewer, subject, desired)
            .await
    }

    fn active_id(&self) -> Option<ProfileId> {
        self.session().active_id().cloned()
    }
}
