//! Optimistic follow/unfollow with rollback.
//!
//! A follow intent is visible to readers as soon as it is recorded, before the
//! remote system confirms it.  Intents are numbered in submission order; for
//! any (viewer, target) pair only the most recent one may settle, and a
//! response to an older intent is dropped when it arrives.  A logout bumps the
//! coordinator's generation so that every outstanding response is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use kinship_shared::{MutationError, ProfileId, RelationshipView, ResolveError};

use crate::events::{drain, Delivery, EventBus, SessionEvent, SettledOutcome};
use crate::remote::GraphApi;
use crate::resolver::RelationshipResolver;

/// An optimistic intent waiting for the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    pub target: ProfileId,
    pub desired: bool,
    pub submitted_at: DateTime<Utc>,
    pub retry_count: u32,
    /// Submission order; higher wins.
    pub sequence: u64,
    /// Settled edge value before the first intent of this run. Superseding
    /// intents are compared against it rather than against the overlay.
    pub previous: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Desired state already in effect; nothing was dispatched.
    Unchanged,
    Confirmed,
    /// The overlay was removed and the pre-mutation value restored.
    RolledBack(MutationError),
    /// A newer intent for the same pair arrived first; this response was ignored.
    Superseded,
    /// The session was cleared while the request was in flight.
    Discarded,
}

type PairSlot = (ProfileId, ProfileId);

struct CoordinatorState {
    pending: HashMap<PairSlot, PendingMutation>,
    next_sequence: u64,
    generation: u64,
    events: broadcast::Receiver<SessionEvent>,
}

impl CoordinatorState {
    fn sync_events(&mut self) {
        for delivery in drain(&mut self.events) {
            match delivery {
                Delivery::Event(SessionEvent::SessionCleared) => self.reset(),
                // A missed event may have been a logout.
                Delivery::Lagged(missed) => {
                    warn!(missed, "Mutation coordinator lagged behind session events");
                    self.reset();
                }
                Delivery::Event(_) => {}
            }
        }
    }

    fn reset(&mut self) {
        if !self.pending.is_empty() {
            debug!(dropped = self.pending.len(), "Dropping pending mutations");
        }
        self.pending.clear();
        self.generation += 1;
    }
}

pub struct MutationCoordinator {
    api: Arc<dyn GraphApi>,
    resolver: Arc<RelationshipResolver>,
    events: EventBus,
    max_retries: u32,
    state: Mutex<CoordinatorState>,
}

impl MutationCoordinator {
    pub fn new(
        api: Arc<dyn GraphApi>,
        resolver: Arc<RelationshipResolver>,
        events: EventBus,
        max_retries: u32,
    ) -> Self {
        let rx = events.subscribe();
        Self {
            api,
            resolver,
            events,
            max_retries,
            state: Mutex::new(CoordinatorState {
                pending: HashMap::new(),
                next_sequence: 0,
                generation: 0,
                events: rx,
            }),
        }
    }

    /// Relationship as the UI should show it: resolver truth with any pending
    /// intent of `viewer` laid over the viewer→subject edge.
    pub async fn resolve(
        &self,
        viewer: Option<&ProfileId>,
        subject: &ProfileId,
    ) -> Result<RelationshipView, ResolveError> {
        let view = self.resolver.resolve(viewer, subject).await?;
        Ok(self.overlay(view))
    }

    pub async fn resolve_many(
        &self,
        viewer: Option<&ProfileId>,
        subjects: &[ProfileId],
    ) -> Result<Vec<RelationshipView>, ResolveError> {
        let views = self.resolver.resolve_many(viewer, subjects).await?;
        Ok(views.into_iter().map(|view| self.overlay(view)).collect())
    }

    pub fn pending(&self, viewer: &ProfileId, target: &ProfileId) -> Option<PendingMutation> {
        let mut state = lock(&self.state);
        state.sync_events();
        state
            .pending
            .get(&(viewer.clone(), target.clone()))
            .cloned()
    }

    /// Make `viewer` follow (`true`) or stop following (`false`) `target`.
    ///
    /// Completes when this intent settles or is overtaken by a newer one.
    pub async fn set_desired_state(
        &self,
        viewer: &ProfileId,
        target: &ProfileId,
        desired: bool,
    ) -> MutationOutcome {
        if viewer == target {
            warn!(%viewer, "Refusing to follow own profile");
            return MutationOutcome::RolledBack(MutationError::SelfFollow);
        }
        let slot = (viewer.clone(), target.clone());

        let settled = match self.known_baseline(&slot) {
            Some(value) => value,
            None => match self.resolver.resolve(Some(viewer), target).await {
                Ok(view) => view.viewer_follows_subject,
                Err(e) => {
                    warn!(%viewer, %target, error = %e, "Cannot mutate unresolved relationship");
                    return MutationOutcome::RolledBack(MutationError::Unresolved(e));
                }
            },
        };

        let (sequence, generation) = {
            let mut state = lock(&self.state);
            state.sync_events();

            let previous = match state.pending.get(&slot) {
                Some(existing) if existing.desired == desired => {
                    return MutationOutcome::Unchanged;
                }
                Some(existing) => {
                    debug!(
                        %viewer,
                        %target,
                        superseded = existing.sequence,
                        "Superseding pending mutation"
                    );
                    existing.previous
                }
                None if settled == desired => return MutationOutcome::Unchanged,
                None => settled,
            };

            state.next_sequence += 1;
            let sequence = state.next_sequence;
            state.pending.insert(
                slot.clone(),
                PendingMutation {
                    target: target.clone(),
                    desired,
                    submitted_at: Utc::now(),
                    retry_count: 0,
                    sequence,
                    previous,
                },
            );
            (sequence, state.generation)
        };

        info!(%viewer, %target, desired, sequence, "Recorded optimistic mutation");

        let mut attempt = 0;
        loop {
            let result = if desired {
                self.api.follow(viewer, target).await
            } else {
                self.api.unfollow(viewer, target).await
            };

            let mut state = lock(&self.state);
            state.sync_events();

            if state.generation != generation {
                debug!(%viewer, %target, sequence, "Dropping mutation response after logout");
                return MutationOutcome::Discarded;
            }
            match state.pending.get_mut(&slot) {
                Some(current) if current.sequence == sequence => {
                    if result.is_err() && attempt < self.max_retries {
                        attempt += 1;
                        current.retry_count = attempt;
                        warn!(%viewer, %target, attempt, "Retrying relationship mutation");
                        continue;
                    }
                }
                _ => {
                    debug!(%viewer, %target, sequence, "Dropping stale mutation response");
                    return MutationOutcome::Superseded;
                }
            }

            state.pending.remove(&slot);
            // Published under the lock so no reader sees the overlay gone
            // while the resolver still serves a pair that was just confirmed.
            return match result {
                Ok(()) => {
                    info!(%viewer, %target, desired, "Relationship mutation confirmed");
                    self.events.publish(SessionEvent::MutationSettled {
                        viewer: viewer.clone(),
                        target: target.clone(),
                        outcome: SettledOutcome::Confirmed,
                    });
                    MutationOutcome::Confirmed
                }
                // the resolver keeps its pre-mutation entry, which is the
                // value readers fall back to once the overlay is gone
                Err(e) => {
                    let err = MutationError::Remote(e);
                    warn!(%viewer, %target, desired, error = %err, "Relationship mutation failed, rolled back");
                    self.events.publish(SessionEvent::MutationSettled {
                        viewer: viewer.clone(),
                        target: target.clone(),
                        outcome: SettledOutcome::from(&err),
                    });
                    MutationOutcome::RolledBack(err)
                }
            };
        }
    }

    /// The edge value an intent would be compared against, if known without I/O.
    fn known_baseline(&self, slot: &PairSlot) -> Option<bool> {
        {
            let mut state = lock(&self.state);
            state.sync_events();
            if let Some(existing) = state.pending.get(slot) {
                return Some(existing.previous);
            }
        }
        self.resolver
            .peek(&slot.0, &slot.1)
            .map(|view| view.viewer_follows_subject)
    }

    fn overlay(&self, mut view: RelationshipView) -> RelationshipView {
        let Some(viewer) = view.viewer.clone() else {
            return view;
        };
        let mut state = lock(&self.state);
        state.sync_events();
        if let Some(pending) = state.pending.get(&(viewer, view.subject.clone())) {
            view.viewer_follows_subject = pending.desired;
        }
        view
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
