//! Builds in flight, keyed by task identity.

use ferry_core::{TaskIdentity, TaskOutcome};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error};

type Signal = watch::Sender<Option<TaskOutcome>>;

/// Process-wide table of task identities that currently have a leader.
///
/// Each entry owns a write-once completion signal. Callers never see the
/// table itself: [`PendingRegistry::claim`] either makes them the leader of
/// an identity or hands them a [`Completion`] to wait on. The lock is never
/// held across an await point. Clones share one table.
#[derive(Debug, Default, Clone)]
pub struct PendingRegistry {
    pending: Arc<Mutex<HashMap<TaskIdentity, Signal>>>,
}

/// Result of claiming a task identity.
#[derive(Debug)]
pub enum Claim {
    /// No build was in flight; the caller must do the work.
    Leader(LeaderClaim),
    /// A build is already in flight; wait for its outcome.
    Follower(Completion),
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id`, or join the leader that already holds it.
    ///
    /// The lookup and the insert happen under one lock acquisition, so two
    /// callers can never both become leader of the same identity.
    pub fn claim(&self, id: TaskIdentity) -> Claim {
        let mut pending = self.lock();

        if let Some(signal) = pending.get(&id) {
            return Claim::Follower(Completion {
                signal: signal.subscribe(),
            });
        }

        let (signal, _) = watch::channel(None);
        pending.insert(id.clone(), signal);
        Claim::Leader(LeaderClaim {
            registry: self.clone(),
            id,
            outcome: None,
        })
    }

    pub fn contains(&self, id: &TaskIdentity) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of identities currently in flight.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of followers waiting on `id`, or `None` when it is not in flight.
    pub fn followers(&self, id: &TaskIdentity) -> Option<usize> {
        self.lock().get(id).map(|signal| signal.receiver_count())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskIdentity, Signal>> {
        // The map stays consistent even if a holder panicked.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, id: &TaskIdentity, outcome: TaskOutcome) {
        let signal = self.lock().remove(id);

        match signal {
            Some(signal) => {
                debug!(
                    task = %id,
                    followers = signal.receiver_count(),
                    ?outcome,
                    "Releasing task"
                );
                signal.send_replace(Some(outcome));
            }
            None => {
                error!(task = %id, "Released a task that was not in flight");
                debug_assert!(false, "released a task that was not in flight: {}", id);
            }
        }
    }
}

/// Leadership of one task identity.
///
/// Dropping the claim removes the identity from the registry and then
/// publishes the outcome to every follower. An outcome that was never set is
/// published as [`TaskOutcome::Failed`]. This runs exactly once on every
/// exit path of the leader, including errors and panics.
#[derive(Debug)]
pub struct LeaderClaim {
    registry: PendingRegistry,
    id: TaskIdentity,
    outcome: Option<TaskOutcome>,
}

impl LeaderClaim {
    pub fn identity(&self) -> &TaskIdentity {
        &self.id
    }

    /// Set the outcome published on release.
    pub fn set_outcome(&mut self, outcome: TaskOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for LeaderClaim {
    fn drop(&mut self) {
        let outcome = self.outcome.unwrap_or(TaskOutcome::Failed);
        self.registry.release(&self.id, outcome);
    }
}

/// A follower's view of a leader's outcome.
#[derive(Debug)]
pub struct Completion {
    signal: watch::Receiver<Option<TaskOutcome>>,
}

impl Completion {
    /// Wait for the leader to publish.
    ///
    /// Resolves immediately if the outcome is already published. A signal
    /// that closes without a value counts as a failure.
    pub async fn wait(mut self) -> TaskOutcome {
        match self.signal.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).unwrap_or(TaskOutcome::Failed),
            Err(_) => TaskOutcome::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::BuildId;
    use std::time::Duration;
    use tokio::sync::Barrier;

    fn identity(hash: &str) -> TaskIdentity {
        let repo = ferry_core::Repo::new(ferry_core::UserId::new(1), "github.com", "acme", "app");
        TaskIdentity::new(&repo, hash)
    }

    #[test]
    fn test_first_claim_leads_second_follows() {
        let registry = PendingRegistry::new();

        let leader = registry.claim(identity("a1"));
        assert!(matches!(leader, Claim::Leader(_)));

        let follower = registry.claim(identity("a1"));
        assert!(matches!(follower, Claim::Follower(_)));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.followers(&identity("a1")), Some(1));
    }

    #[test]
    fn test_distinct_identities_lead_independently() {
        let registry = PendingRegistry::new();

        let _a = registry.claim(identity("a1"));
        let b = registry.claim(identity("b2"));

        assert!(matches!(b, Claim::Leader(_)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_drop_releases_entry() {
        let registry = PendingRegistry::new();

        {
            let claim = registry.claim(identity("a1"));
            assert!(matches!(claim, Claim::Leader(_)));
            assert!(registry.contains(&identity("a1")));
        }

        assert!(registry.is_empty());
        assert_eq!(registry.followers(&identity("a1")), None);
    }

    #[test]
    fn test_claim_after_release_leads_again() {
        let registry = PendingRegistry::new();
        drop(registry.claim(identity("a1")));

        assert!(matches!(registry.claim(identity("a1")), Claim::Leader(_)));
    }

    #[tokio::test]
    async fn test_followers_receive_leader_outcome() {
        let registry = PendingRegistry::new();

        let Claim::Leader(mut leader) = registry.claim(identity("a1")) else {
            panic!("expected leader");
        };
        let Claim::Follower(first) = registry.claim(identity("a1")) else {
            panic!("expected follower");
        };
        let Claim::Follower(second) = registry.claim(identity("a1")) else {
            panic!("expected follower");
        };

        leader.set_outcome(TaskOutcome::Completed(BuildId::new(42)));
        drop(leader);

        assert_eq!(first.wait().await, TaskOutcome::Completed(BuildId::new(42)));
        assert_eq!(second.wait().await, TaskOutcome::Completed(BuildId::new(42)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unset_outcome_publishes_failure() {
        let registry = PendingRegistry::new();

        let leader = registry.claim(identity("a1"));
        let Claim::Follower(follower) = registry.claim(identity("a1")) else {
            panic!("expected follower");
        };
        drop(leader);

        assert_eq!(follower.wait().await, TaskOutcome::Failed);
    }

    #[tokio::test]
    async fn test_follower_wakes_when_leader_finishes_later() {
        let registry = PendingRegistry::new();

        let Claim::Leader(mut leader) = registry.claim(identity("a1")) else {
            panic!("expected leader");
        };
        let Claim::Follower(follower) = registry.claim(identity("a1")) else {
            panic!("expected follower");
        };

        let lead = async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            leader.set_outcome(TaskOutcome::Completed(BuildId::new(7)));
        };
        let wait = tokio::time::timeout(Duration::from_secs(1), follower.wait());

        let ((), outcome) = tokio::join!(lead, wait);
        assert_eq!(outcome.unwrap(), TaskOutcome::Completed(BuildId::new(7)));
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_claims_across_threads_elect_one_leader() {
        const CALLERS: usize = 16;
        let registry = PendingRegistry::new();
        let start = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let registry = registry.clone();
                let start = start.clone();
                tokio::spawn(async move {
                    start.wait().await;
                    registry.claim(identity("a1"))
                })
            })
            .collect();

        let mut claims = Vec::new();
        for handle in handles {
            claims.push(handle.await.unwrap());
        }

        let leaders = claims
            .iter()
            .filter(|claim| matches!(claim, Claim::Leader(_)))
            .count();
        assert_eq!(leaders, 1);
        assert_eq!(registry.followers(&identity("a1")), Some(CALLERS - 1));

        drop(claims);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_leader_panic_still_releases() {
        let registry = PendingRegistry::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _claim = registry.claim(identity("a1"));
            panic!("leader blew up");
        }));

        assert!(result.is_err());
        assert!(registry.is_empty());
    }
}
