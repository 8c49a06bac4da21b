//! Periodic reconciliation against GitHub and the ledger

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::BountyError;
use crate::hooks::HookInstaller;
use crate::lifecycle::{BountyLifecycle, BountyRefresh};
use crate::lock::GlobalLock;
use crate::registry::{RepositoryRefresh, RepositoryRegistry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub repositories_updated: usize,
    pub repositories_removed: usize,
    pub repositories_failed: usize,
    pub bounties_updated: usize,
    pub bounties_removed: usize,
    pub bounties_failed: usize,
}

pub struct Reconciler {
    registry: Arc<RepositoryRegistry>,
    bounties: Arc<BountyLifecycle>,
    hooks: Arc<HookInstaller>,
    lock: GlobalLock,
    interval: Duration,
}

impl Reconciler {
    pub fn new(
        registry: Arc<RepositoryRegistry>,
        bounties: Arc<BountyLifecycle>,
        hooks: Arc<HookInstaller>,
        lock: GlobalLock,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            bounties,
            hooks,
            lock,
            interval,
        }
    }

    /// Checks web hooks once, then sweeps forever. Never returns.
    pub async fn run(&self) {
        {
            let _guard = self.lock.acquire().await;
            if let Err(e) = self.hooks.ensure_all().await {
                error!("Initial web hook check failed: {}", e);
            }
        }

        info!("Reconciling every {}s", self.interval.as_secs());
        loop {
            let report = self.sweep().await;
            debug!(?report, "Sweep finished");
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One full pass. Failures are logged per item and never stop the pass.
    pub async fn sweep(&self) -> SweepReport {
        let _guard = self.lock.acquire().await;
        let mut report = SweepReport::default();

        match self.registry.list_all() {
            Ok(repos) => {
                for repo in repos {
                    match self.registry.refresh(&repo).await {
                        Ok(RepositoryRefresh::Updated(_)) => report.repositories_updated += 1,
                        Ok(RepositoryRefresh::Removed) => report.repositories_removed += 1,
                        Err(e @ BountyError::IssuesDisabled(_)) => {
                            warn!(repository_id = repo.id, "{}", e);
                            report.repositories_failed += 1;
                        }
                        Err(e) => {
                            warn!(
                                repository_id = repo.id,
                                "Couldn't sync repository {}: {}",
                                repo.full_name(),
                                e
                            );
                            report.repositories_failed += 1;
                        }
                    }
                }
            }
            Err(e) => error!("Couldn't load repositories: {}", e),
        }

        match self.bounties.list_all() {
            Ok(bounties) => {
                for bounty in bounties {
                    match self.bounties.refresh(&bounty).await {
                        Ok(BountyRefresh::Updated(_)) => report.bounties_updated += 1,
                        Ok(BountyRefresh::Removed) => report.bounties_removed += 1,
                        Err(e) => {
                            warn!(
                                bounty_id = bounty.id,
                                "Couldn't sync bounty #{}: {}",
                                bounty.issue_number,
                                e
                            );
                            report.bounties_failed += 1;
                        }
                    }
                }
            }
            Err(e) => error!("Couldn't load bounties: {}", e),
        }

        if report.repositories_removed > 0 || report.bounties_removed > 0 {
            info!(
                "Sync removed {} repositories and {} bounties",
                report.repositories_removed, report.bounties_removed
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BountyState;
    use crate::testing::TestPlatform;

    #[tokio::test]
    async fn test_sweep_deletes_bounty_of_vanished_issue_and_continues() {
        let t = TestPlatform::new();
        t.track_repository(1, "acme", "widgets").await;
        for number in 1..=3u32 {
            t.tracker
                .add_issue("acme", "widgets", number, 100 + number as i64, "issue");
            t.platform.bounties.create("acme", "widgets", number).await.unwrap();
        }
        t.tracker.remove_issue("acme", "widgets", 2);
        t.tracker.add_issue("acme", "widgets", 3, 103, "renamed issue");

        let report = t.platform.reconciler.sweep().await;
        assert_eq!(report.bounties_removed, 1);
        assert_eq!(report.bounties_updated, 2);
        assert_eq!(report.bounties_failed, 0);

        assert_eq!(t.storage.archived_bounties().unwrap().len(), 1);
        let remaining = t.platform.bounties.list_all().unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(t.platform.bounties.get(103).unwrap().title, "renamed issue");
    }

    #[tokio::test]
    async fn test_sweep_isolates_failures() {
        let t = TestPlatform::new();
        t.track_repository(1, "acme", "widgets").await;
        t.track_repository(2, "acme", "gadgets").await;
        t.tracker.add_issue("acme", "widgets", 1, 101, "one");
        t.tracker.add_issue("acme", "gadgets", 1, 201, "two");
        let failing = t.platform.bounties.create("acme", "widgets", 1).await.unwrap();
        let healthy = t.platform.bounties.create("acme", "gadgets", 1).await.unwrap();
        t.ledger.fail_balance_for(&failing.seed);
        t.ledger.set_balance(&healthy.seed, 77);

        // issues switched off on one repository
        t.tracker.set_has_issues(1, false);

        let report = t.platform.reconciler.sweep().await;
        assert_eq!(report.repositories_failed, 1);
        assert_eq!(report.repositories_updated, 1);
        assert_eq!(report.bounties_failed, 1);
        assert_eq!(report.bounties_updated, 1);
        assert_eq!(t.platform.bounties.get(healthy.id).unwrap().balance, 77);
    }

    #[tokio::test]
    async fn test_sweep_removes_vanished_repository_with_its_bounties() {
        let t = TestPlatform::new();
        t.track_repository(1, "acme", "widgets").await;
        t.tracker.add_issue("acme", "widgets", 1, 101, "one");
        t.platform.bounties.create("acme", "widgets", 1).await.unwrap();
        t.tracker.remove_repository(1);

        let report = t.platform.reconciler.sweep().await;
        assert_eq!(report.repositories_removed, 1);
        assert_eq!(report.bounties_removed + report.bounties_updated, 0);
        assert_eq!(t.storage.archived_repositories().unwrap().len(), 1);
        assert_eq!(t.storage.archived_bounties().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transferred_balance_is_frozen() {
        let t = TestPlatform::new();
        t.track_repository(1, "acme", "widgets").await;
        t.tracker.add_issue("acme", "widgets", 1, 101, "one");
        let bounty = t.platform.bounties.create("acme", "widgets", 1).await.unwrap();
        let released = t.platform.bounties.release(&bounty, 7).await.unwrap();
        t.ledger.set_balance(&bounty.seed, 500);
        t.platform
            .bounties
            .transfer(&released, &crate::testing::valid_address())
            .await
            .unwrap();

        // more funds show up on the pool after payout
        t.ledger.set_balance(&bounty.seed, 40);
        t.platform.reconciler.sweep().await;

        let stored = t.platform.bounties.get(bounty.id).unwrap();
        assert_eq!(stored.state, BountyState::Transferred);
        assert_eq!(stored.balance, 500);
    }

    #[tokio::test]
    async fn test_sweep_waits_for_the_global_lock() {
        let t = TestPlatform::new();
        let guard = t.platform.lock.acquire().await;

        let reconciler = t.platform.reconciler.clone();
        let sweep = tokio::spawn(async move { reconciler.sweep().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sweep.is_finished());

        drop(guard);
        let report = sweep.await.unwrap();
        assert_eq!(report, SweepReport::default());
    }
}
