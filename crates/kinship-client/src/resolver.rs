//! Relationship resolution with caching and request de-duplication.
//!
//! Both directed edges of a (viewer, subject) pair are always fetched in one
//! batched query and cached under the *unordered* pair, so a later lookup in
//! the opposite direction is served from the same entry.  Lookups for a pair
//! that is already being fetched join the outstanding request instead of
//! issuing another one.
//!
//! The cache is invalidated by TTL and by events drained from the
//! [`EventBus`](crate::events::EventBus) before every read and every write.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use kinship_shared::{FollowQuery, ProfileId, RelationshipView, ResolveError};

use crate::events::{drain, Delivery, EventBus, SessionEvent, SettledOutcome};
use crate::remote::GraphApi;

/// How many times a lookup is restarted when its result went stale in flight.
const MAX_STALE_RESTARTS: usize = 2;

/// Unordered pair of profiles; `low <= high`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    low: ProfileId,
    high: ProfileId,
}

impl PairKey {
    pub fn new(a: &ProfileId, b: &ProfileId) -> Self {
        if a <= b {
            Self {
                low: a.clone(),
                high: b.clone(),
            }
        } else {
            Self {
                low: b.clone(),
                high: a.clone(),
            }
        }
    }

    pub fn contains(&self, id: &ProfileId) -> bool {
        &self.low == id || &self.high == id
    }

    /// The two directed lookups for this pair: low→high, then high→low.
    fn queries(&self) -> [FollowQuery; 2] {
        [
            FollowQuery::new(&self.low, &self.high),
            FollowQuery::new(&self.high, &self.low),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PairEdges {
    low_follows_high: bool,
    high_follows_low: bool,
}

impl PairEdges {
    fn view(&self, key: &PairKey, viewer: &ProfileId, subject: &ProfileId) -> RelationshipView {
        let (out, back) = if viewer == &key.low {
            (self.low_follows_high, self.high_follows_low)
        } else {
            (self.high_follows_low, self.low_follows_high)
        };
        RelationshipView {
            viewer: Some(viewer.clone()),
            subject: subject.clone(),
            viewer_follows_subject: out,
            subject_follows_viewer: back,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Lookup {
    edges: PairEdges,
    /// False when the pair was invalidated while the query was outstanding;
    /// such a result was not cached.
    current: bool,
}

type BatchResult = Result<Arc<HashMap<PairKey, Lookup>>, ResolveError>;
type SharedBatch = Shared<BoxFuture<'static, BatchResult>>;

struct CachedPair {
    edges: PairEdges,
    fetched_at: Instant,
}

struct InFlight {
    ticket: u64,
    batch: SharedBatch,
}

struct ResolverState {
    cache: HashMap<PairKey, CachedPair>,
    in_flight: HashMap<PairKey, InFlight>,
    events: broadcast::Receiver<SessionEvent>,
    next_ticket: u64,
}

impl ResolverState {
    fn sync_events(&mut self) {
        for delivery in drain(&mut self.events) {
            match delivery {
                Delivery::Event(SessionEvent::IdentityChanged {
                    previous: Some(previous),
                    ..
                }) => {
                    self.cache.retain(|key, _| !key.contains(&previous));
                    self.in_flight.retain(|key, _| !key.contains(&previous));
                    debug!(profile = %previous, "Dropped relationships of previous identity");
                }
                Delivery::Event(SessionEvent::IdentityChanged { previous: None, .. }) => {}
                Delivery::Event(SessionEvent::SessionCleared) => self.clear(),
                Delivery::Event(SessionEvent::MutationSettled {
                    viewer,
                    target,
                    outcome: SettledOutcome::Confirmed,
                }) => {
                    self.invalidate(&PairKey::new(&viewer, &target));
                }
                // a rejected mutation never reached the graph; the cached
                // value is still the last known-good one
                Delivery::Event(SessionEvent::MutationSettled {
                    outcome: SettledOutcome::Failed(_),
                    ..
                }) => {}
                Delivery::Lagged(missed) => {
                    warn!(missed, "Relationship resolver lagged behind session events");
                    self.clear();
                }
            }
        }
    }

    fn clear(&mut self) {
        self.cache.clear();
        self.in_flight.clear();
    }

    fn invalidate(&mut self, key: &PairKey) {
        self.cache.remove(key);
        self.in_flight.remove(key);
    }

    fn fresh(&self, key: &PairKey, ttl: Duration) -> Option<PairEdges> {
        self.cache
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < ttl)
            .map(|entry| entry.edges)
    }
}

pub struct RelationshipResolver {
    api: Arc<dyn GraphApi>,
    ttl: Duration,
    state: Arc<Mutex<ResolverState>>,
}

impl RelationshipResolver {
    pub fn new(api: Arc<dyn GraphApi>, events: &EventBus, ttl: Duration) -> Self {
        Self {
            api,
            ttl,
            state: Arc::new(Mutex::new(ResolverState {
                cache: HashMap::new(),
                in_flight: HashMap::new(),
                events: events.subscribe(),
                next_ticket: 0,
            })),
        }
    }

    /// Both edges between `viewer` and `subject`.
    ///
    /// A missing viewer (signed out) or a viewer looking at itself yields a
    /// view with no edges and makes no remote call.
    pub async fn resolve(
        &self,
        viewer: Option<&ProfileId>,
        subject: &ProfileId,
    ) -> Result<RelationshipView, ResolveError> {
        let Some(viewer) = viewer else {
            return Ok(RelationshipView::empty(None, subject.clone()));
        };
        if viewer == subject {
            return Ok(RelationshipView::empty(Some(viewer.clone()), subject.clone()));
        }

        let key = PairKey::new(viewer, subject);
        let mut restarts = 0;
        loop {
            let batch = {
                let mut state = lock(&self.state);
                state.sync_events();

                if let Some(edges) = state.fresh(&key, self.ttl) {
                    return Ok(edges.view(&key, viewer, subject));
                }

                match state.in_flight.get(&key) {
                    Some(existing) => {
                        debug!(%viewer, %subject, "Joining in-flight relationship query");
                        existing.batch.clone()
                    }
                    None => self.start_batch(&mut state, vec![key.clone()]),
                }
            };

            let lookup = take(&*batch.await?, &key)?;
            if lookup.current || restarts >= MAX_STALE_RESTARTS {
                return Ok(lookup.edges.view(&key, viewer, subject));
            }
            restarts += 1;
            debug!(%viewer, %subject, restarts, "Relationship went stale in flight, refetching");
        }
    }

    /// Resolve a whole feed of subjects with at most one new round trip.
    ///
    /// Views are returned in `subjects` order.
    pub async fn resolve_many(
        &self,
        viewer: Option<&ProfileId>,
        subjects: &[ProfileId],
    ) -> Result<Vec<RelationshipView>, ResolveError> {
        let Some(viewer) = viewer else {
            return Ok(subjects
                .iter()
                .map(|s| RelationshipView::empty(None, s.clone()))
                .collect());
        };

        let mut ready: HashMap<PairKey, PairEdges> = HashMap::new();
        let mut unresolved: Vec<PairKey> = Vec::new();
        let mut seen = HashSet::new();
        for subject in subjects.iter().filter(|s| *s != viewer) {
            let key = PairKey::new(viewer, subject);
            if seen.insert(key.clone()) {
                unresolved.push(key);
            }
        }

        let mut restarts = 0;
        while !unresolved.is_empty() {
            let mut waiting: Vec<(PairKey, SharedBatch)> = Vec::new();
            {
                let mut state = lock(&self.state);
                state.sync_events();

                let mut missing = Vec::new();
                for key in unresolved.drain(..) {
                    if let Some(edges) = state.fresh(&key, self.ttl) {
                        ready.insert(key, edges);
                    } else if let Some(existing) = state.in_flight.get(&key) {
                        let batch = existing.batch.clone();
                        waiting.push((key, batch));
                    } else {
                        missing.push(key);
                    }
                }

                if !missing.is_empty() {
                    let batch = self.start_batch(&mut state, missing.clone());
                    waiting.extend(missing.into_iter().map(|key| (key, batch.clone())));
                }
            }

            let results =
                futures::future::join_all(waiting.iter().map(|(_, batch)| batch.clone())).await;
            for ((key, _), result) in waiting.into_iter().zip(results) {
                let lookup = take(&*result?, &key)?;
                if lookup.current || restarts >= MAX_STALE_RESTARTS {
                    ready.insert(key, lookup.edges);
                } else {
                    unresolved.push(key);
                }
            }

            if !unresolved.is_empty() {
                restarts += 1;
                debug!(
                    %viewer,
                    stale = unresolved.len(),
                    restarts,
                    "Relationships went stale in flight, refetching"
                );
            }
        }

        Ok(subjects
            .iter()
            .map(|subject| {
                if subject == viewer {
                    return RelationshipView::empty(Some(viewer.clone()), subject.clone());
                }
                let key = PairKey::new(viewer, subject);
                match ready.get(&key) {
                    Some(edges) => edges.view(&key, viewer, subject),
                    None => RelationshipView::empty(Some(viewer.clone()), subject.clone()),
                }
            })
            .collect())
    }

    /// Fresh cached view, without any I/O.
    pub fn peek(&self, viewer: &ProfileId, subject: &ProfileId) -> Option<RelationshipView> {
        if viewer == subject {
            return Some(RelationshipView::empty(Some(viewer.clone()), subject.clone()));
        }
        let key = PairKey::new(viewer, subject);
        let mut state = lock(&self.state);
        state.sync_events();
        state
            .fresh(&key, self.ttl)
            .map(|edges| edges.view(&key, viewer, subject))
    }

    /// Forget the pair; an outstanding query for it will not be cached.
    pub fn invalidate_pair(&self, a: &ProfileId, b: &ProfileId) {
        let mut state = lock(&self.state);
        state.sync_events();
        state.invalidate(&PairKey::new(a, b));
    }

    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.sync_events();
        state.clear();
    }

    pub fn cached_pairs(&self) -> usize {
        let mut state = lock(&self.state);
        state.sync_events();
        state.cache.len()
    }

    /// Register one batched query for `keys` and return its shared handle.
    ///
    /// The query settles the cache itself when it completes, so every joined
    /// waiter sees the same outcome and the write happens exactly once.
    fn start_batch(&self, state: &mut ResolverState, keys: Vec<PairKey>) -> SharedBatch {
        state.next_ticket += 1;
        let ticket = state.next_ticket;

        let queries: Vec<FollowQuery> = keys.iter().flat_map(PairKey::queries).collect();
        debug!(pairs = keys.len(), ticket, "Issuing batched relationship query");

        // weak, so an abandoned in-flight entry cannot keep the state alive
        let batch: SharedBatch = run_batch(
            Arc::clone(&self.api),
            Arc::downgrade(&self.state),
            keys.clone(),
            queries,
            ticket,
        )
        .boxed()
        .shared();

        for key in keys {
            state.in_flight.insert(
                key,
                InFlight {
                    ticket,
                    batch: batch.clone(),
                },
            );
        }
        batch
    }
}

async fn run_batch(
    api: Arc<dyn GraphApi>,
    shared_state: Weak<Mutex<ResolverState>>,
    keys: Vec<PairKey>,
    queries: Vec<FollowQuery>,
    ticket: u64,
) -> BatchResult {
    let answers = match api.does_follow(&queries).await {
        Ok(answers) if answers.len() == queries.len() => answers,
        outcome => {
            let err = match outcome {
                Ok(answers) => ResolveError::MalformedResponse {
                    expected: queries.len(),
                    got: answers.len(),
                },
                Err(e) => ResolveError::Remote(e),
            };
            warn!(error = %err, ticket, "Relationship query failed");

            // release the pairs so the next call can retry
            if let Some(shared_state) = shared_state.upgrade() {
                let mut state = lock(&shared_state);
                state.sync_events();
                for key in &keys {
                    if state.in_flight.get(key).map(|f| f.ticket) == Some(ticket) {
                        state.in_flight.remove(key);
                    }
                }
            }
            return Err(err);
        }
    };

    let pairs = keys.into_iter().zip(answers.chunks_exact(2)).map(|(key, pair)| {
        let edges = PairEdges {
            low_follows_high: pair[0],
            high_follows_low: pair[1],
        };
        (key, edges)
    });

    let Some(shared_state) = shared_state.upgrade() else {
        debug!(ticket, "Resolver dropped before relationship answer arrived");
        return Ok(Arc::new(
            pairs
                .map(|(key, edges)| {
                    (
                        key,
                        Lookup {
                            edges,
                            current: false,
                        },
                    )
                })
                .collect(),
        ));
    };

    let mut state = lock(&shared_state);
    state.sync_events();
    let now = Instant::now();
    let mut lookups = HashMap::new();
    for (key, edges) in pairs {
        let current = state.in_flight.get(&key).map(|f| f.ticket) == Some(ticket);
        if current {
            state.in_flight.remove(&key);
            state.cache.insert(
                key.clone(),
                CachedPair {
                    edges,
                    fetched_at: now,
                },
            );
        } else {
            debug!(ticket, "Discarding stale relationship answer");
        }
        lookups.insert(key, Lookup { edges, current });
    }
    Ok(Arc::new(lookups))
}

fn take(lookups: &HashMap<PairKey, Lookup>, key: &PairKey) -> Result<Lookup, ResolveError> {
    lookups
        .get(key)
        .copied()
        .ok_or(ResolveError::MalformedResponse {
            expected: 2,
            got: 0,
        })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
