//! Webhook installation for tracked repositories

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::Repository;
use crate::storage::BountyStorage;
use crate::tracker::{IssueTracker, NewHook};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookReport {
    pub installed: usize,
    pub present: usize,
    pub failed: usize,
}

pub struct HookInstaller {
    tracker: Arc<dyn IssueTracker>,
    storage: Arc<BountyStorage>,
    target_url: String,
    tls: bool,
}

impl HookInstaller {
    /// `target_url` is the full public URL GitHub should deliver events to.
    pub fn new(
        tracker: Arc<dyn IssueTracker>,
        storage: Arc<BountyStorage>,
        target_url: impl Into<String>,
        tls: bool,
    ) -> Self {
        Self {
            tracker,
            storage,
            target_url: target_url.into(),
            tls,
        }
    }

    /// Makes sure every tracked repository delivers comment events to us.
    /// A failing repository is logged and the others are still checked.
    pub async fn ensure_all(&self) -> Result<HookReport> {
        let repos = self.storage.list_repositories()?;
        let mut report = HookReport::default();

        for repo in &repos {
            match self.ensure(repo).await {
                Ok(true) => report.installed += 1,
                Ok(false) => report.present += 1,
                Err(e) => {
                    warn!("Couldn't check web hook of {}: {}", repo.full_name(), e);
                    report.failed += 1;
                }
            }
        }

        if report.installed > 0 || report.failed > 0 {
            info!(
                "Web hooks: {} installed, {} present, {} failed",
                report.installed, report.present, report.failed
            );
        }
        Ok(report)
    }

    /// Returns true if a hook had to be created.
    async fn ensure(&self, repo: &Repository) -> Result<bool> {
        let hooks = self.tracker.hooks(&repo.owner, &repo.name).await?;
        let installed = hooks
            .iter()
            .any(|h| h.config.url.as_deref() == Some(self.target_url.as_str()));
        if installed {
            debug!("Web hook already installed on {}", repo.full_name());
            return Ok(false);
        }

        let hook = NewHook::issue_comments(&self.target_url, self.tls);
        let created = self
            .tracker
            .create_hook(&repo.owner, &repo.name, &hook)
            .await?;
        info!(
            "Installed web hook {} on {}",
            created.id,
            repo.full_name()
        );
        Ok(true)
    }
}
