//! Scripted collaborators for unit tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;

use kinship_shared::{FollowQuery, Identity, ProfileId, RemoteError};

use crate::remote::{GraphApi, ProfileSource};

pub(crate) fn pid(id: &str) -> ProfileId {
    ProfileId::from(id)
}

pub(crate) fn identity(id: &str) -> Identity {
    Identity {
        id: pid(id),
        handle: format!("{id}.lens"),
        owned_by: "0xowner".to_string(),
        name: None,
    }
}

#[derive(Default)]
struct MockState {
    edges: HashSet<(ProfileId, ProfileId)>,
    query_calls: usize,
    queries_seen: usize,
    mutation_calls: usize,
    fail_queries: bool,
    truncate_answers: bool,
    fail_mutations: bool,
    hold_queries: bool,
    hold_mutations: bool,
    held_queries: Vec<Option<oneshot::Sender<()>>>,
    held_mutations: Vec<Option<oneshot::Sender<()>>>,
    profiles: Vec<Identity>,
}

/// In-memory social graph.
///
/// Requests are applied when they arrive; with holding enabled the *response*
/// is parked until the test releases it, which lets tests reorder arrivals.
#[derive(Default)]
pub(crate) struct MockGraphApi {
    state: Mutex<MockState>,
}

impl MockGraphApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub(crate) fn set_edge(&self, follower: &str, followee: &str, established: bool) {
        self.with(|s| {
            let edge = (pid(follower), pid(followee));
            if established {
                s.edges.insert(edge);
            } else {
                s.edges.remove(&edge);
            }
        });
    }

    pub(crate) fn has_edge(&self, follower: &str, followee: &str) -> bool {
        self.with(|s| s.edges.contains(&(pid(follower), pid(followee))))
    }

    pub(crate) fn set_profiles(&self, profiles: Vec<Identity>) {
        self.with(|s| s.profiles = profiles);
    }

    pub(crate) fn query_calls(&self) -> usize {
        self.with(|s| s.query_calls)
    }

    pub(crate) fn queries_seen(&self) -> usize {
        self.with(|s| s.queries_seen)
    }

    pub(crate) fn mutation_calls(&self) -> usize {
        self.with(|s| s.mutation_calls)
    }

    pub(crate) fn fail_queries(&self, fail: bool) {
        self.with(|s| s.fail_queries = fail);
    }

    pub(crate) fn truncate_answers(&self, truncate: bool) {
        self.with(|s| s.truncate_answers = truncate);
    }

    pub(crate) fn fail_mutations(&self, fail: bool) {
        self.with(|s| s.fail_mutations = fail);
    }

    pub(crate) fn hold_queries(&self, hold: bool) {
        self.with(|s| s.hold_queries = hold);
    }

    pub(crate) fn hold_mutations(&self, hold: bool) {
        self.with(|s| s.hold_mutations = hold);
    }

    pub(crate) async fn wait_for_held_queries(&self, n: usize) {
        while self.with(|s| s.held_queries.len()) < n {
            tokio::task::yield_now().await;
        }
    }

    pub(crate) async fn wait_for_held_mutations(&self, n: usize) {
        while self.with(|s| s.held_mutations.len()) < n {
            tokio::task::yield_now().await;
        }
    }

    pub(crate) fn release_query(&self, index: usize) {
        if let Some(tx) = self.with(|s| s.held_queries[index].take()) {
            let _ = tx.send(());
        }
    }

    pub(crate) fn release_mutation(&self, index: usize) {
        if let Some(tx) = self.with(|s| s.held_mutations[index].take()) {
            let _ = tx.send(());
        }
    }

    async fn mutate(
        &self,
        viewer: &ProfileId,
        target: &ProfileId,
        follow: bool,
    ) -> Result<(), RemoteError> {
        let (outcome, parked) = self.with(|s| {
            s.mutation_calls += 1;
            let outcome = if s.fail_mutations {
                Err(RemoteError::Rejected("mock failure".into()))
            } else {
                let edge = (viewer.clone(), target.clone());
                if follow {
                    s.edges.insert(edge);
                } else {
                    s.edges.remove(&edge);
                }
                Ok(())
            };
            let parked = if s.hold_mutations {
                let (tx, rx) = oneshot::channel();
                s.held_mutations.push(Some(tx));
                Some(rx)
            } else {
                None
            };
            (outcome, parked)
        });

        match parked {
            Some(rx) => {
                let _ = rx.await;
            }
            None => tokio::task::yield_now().await,
        }
        outcome
    }
}

#[async_trait]
impl GraphApi for MockGraphApi {
    async fn does_follow(&self, queries: &[FollowQuery]) -> Result<Vec<bool>, RemoteError> {
        let (outcome, parked) = self.with(|s| {
            s.query_calls += 1;
            s.queries_seen += queries.len();
            let outcome = if s.fail_queries {
                Err(RemoteError::Transport("mock offline".into()))
            } else {
                let mut answers: Vec<bool> = queries
                    .iter()
                    .map(|q| {
                        s.edges
                            .contains(&(q.follower_id.clone(), q.profile_id.clone()))
                    })
                    .collect();
                if s.truncate_answers {
                    answers.pop();
                }
                Ok(answers)
            };
            let parked = if s.hold_queries {
                let (tx, rx) = oneshot::channel();
                s.held_queries.push(Some(tx));
                Some(rx)
            } else {
                None
            };
            (outcome, parked)
        });

        match parked {
            Some(rx) => {
                let _ = rx.await;
            }
            None => tokio::task::yield_now().await,
        }
        outcome
    }

    async fn follow(&self, viewer: &ProfileId, target: &ProfileId) -> Result<(), RemoteError> {
        self.mutate(viewer, target, true).await
    }

    async fn unfollow(&self, viewer: &ProfileId, target: &ProfileId) -> Result<(), RemoteError> {
        self.mutate(viewer, target, false).await
    }
}

#[async_trait]
impl ProfileSource for MockGraphApi {
    async fn profiles_owned_by(&self, address: &str) -> Result<Vec<Identity>, RemoteError> {
        Ok(self.with(|s| {
            s.profiles
                .iter()
                .filter(|p| p.owned_by == address)
                .cloned()
                .collect()
        }))
    }
}
