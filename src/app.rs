//! Composition root
//!
//! Builds the components in dependency order: storage and capabilities first,
//! then lifecycle, hooks, registry, and finally the processor and reconciler
//! that share one [`GlobalLock`]. The production lock sits in `<database>.lock`
//! so the server and the `bounty` CLI exclude each other.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::hooks::HookInstaller;
use crate::ledger::{HttpLedgerAccounts, HttpLedgerSettings, LedgerAccounts, LedgerAdapter};
use crate::lifecycle::{BountyLifecycle, LifecycleSettings};
use crate::lock::GlobalLock;
use crate::notices::{Notifier, Templates};
use crate::processor::EventProcessor;
use crate::reconcile::Reconciler;
use crate::registry::RepositoryRegistry;
use crate::storage::BountyStorage;
use crate::tracker::{GitHubClient, IssueTracker};

pub struct Platform {
    pub storage: Arc<BountyStorage>,
    pub tracker: Arc<dyn IssueTracker>,
    pub lock: GlobalLock,
    pub hooks: Arc<HookInstaller>,
    pub bounties: Arc<BountyLifecycle>,
    pub registry: Arc<RepositoryRegistry>,
    pub processor: Arc<EventProcessor>,
    pub reconciler: Arc<Reconciler>,
}

impl Platform {
    pub fn assemble(
        config: &Config,
        storage: Arc<BountyStorage>,
        tracker: Arc<dyn IssueTracker>,
        accounts: Arc<dyn LedgerAccounts>,
        lock: GlobalLock,
    ) -> Self {
        let ledger = LedgerAdapter::new(accounts);
        let notifier = Notifier::new(
            tracker.clone(),
            Templates::new(&config.ledger.unit, &config.ledger.explorer_url),
        );

        let bounties = Arc::new(BountyLifecycle::new(
            storage.clone(),
            tracker.clone(),
            ledger,
            notifier.clone(),
            LifecycleSettings {
                deposit_window: config.deposit_window(),
                tag: config.ledger.tag.clone(),
            },
        ));
        let hooks = Arc::new(HookInstaller::new(
            tracker.clone(),
            storage.clone(),
            config.github.webhook.target_url(),
            config.github.webhook.tls,
        ));
        let registry = Arc::new(RepositoryRegistry::new(
            storage.clone(),
            tracker.clone(),
            bounties.clone(),
            hooks.clone(),
        ));
        let processor = Arc::new(EventProcessor::new(
            registry.clone(),
            bounties.clone(),
            tracker.clone(),
            notifier,
            lock.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            registry.clone(),
            bounties.clone(),
            hooks.clone(),
            lock.clone(),
            config.sync_interval(),
        ));

        Self {
            storage,
            tracker,
            lock,
            hooks,
            bounties,
            registry,
            processor,
            reconciler,
        }
    }

    /// Production wiring: SQLite file, GitHub REST API, HTTP ledger account service.
    pub fn from_config(config: &Config) -> Result<Self> {
        let db_path = config.database_path();
        let storage = BountyStorage::new(&db_path)
            .with_context(|| format!("Failed to open database {}", db_path))?;
        info!("Database ready at {}", db_path);

        let lock_path = format!("{}.lock", db_path);
        let lock = GlobalLock::with_file(&lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path))?;

        let tracker = GitHubClient::new(&config.github.api_url, config.github_token());
        let accounts = HttpLedgerAccounts::new(HttpLedgerSettings {
            base_url: config.ledger.account_service_url.clone(),
            security_level: config.ledger.security_level,
            mwm: config.ledger.mwm,
            depth: config.ledger.depth,
        });

        Ok(Self::assemble(
            config,
            Arc::new(storage),
            Arc::new(tracker),
            Arc::new(accounts),
            lock,
        ))
    }
}
