//! Bounty lifecycle: creation, release, transfer, deletion and refresh
//!
//! Callers hold the [`GlobalLock`](crate::lock::GlobalLock) around every mutating
//! call here; nothing in this module locks on its own.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use crate::address::{self, Seed};
use crate::error::{BountyError, Result};
use crate::ledger::{LedgerAdapter, SentTransfer};
use crate::models::{Bounty, BountyId, BountyState, Repository, RepositoryId, UserId, NO_RECEIVER};
use crate::notices::Notifier;
use crate::storage::BountyStorage;
use crate::tracker::IssueTracker;

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Validity of a freshly allocated deposit address. Kept short so the
    /// ledger prefers it over older, still valid addresses of the account.
    pub deposit_window: Duration,
    pub tag: String,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            deposit_window: Duration::minutes(3),
            tag: "IOTABOUNTY".to_string(),
        }
    }
}

/// Result of re-deriving a bounty from the tracker and the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BountyRefresh {
    Updated(Bounty),
    /// The linked issue no longer exists; the bounty was archived.
    Removed,
}

pub struct BountyLifecycle {
    storage: Arc<BountyStorage>,
    tracker: Arc<dyn IssueTracker>,
    ledger: LedgerAdapter,
    notifier: Notifier,
    settings: LifecycleSettings,
}

impl BountyLifecycle {
    pub fn new(
        storage: Arc<BountyStorage>,
        tracker: Arc<dyn IssueTracker>,
        ledger: LedgerAdapter,
        notifier: Notifier,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            storage,
            tracker,
            ledger,
            notifier,
            settings,
        }
    }

    pub fn get(&self, id: BountyId) -> Result<Bounty> {
        self.storage
            .get_bounty(id)?
            .ok_or(BountyError::BountyNotFound(id))
    }

    pub fn get_by_repo_and_issue(
        &self,
        repository_id: RepositoryId,
        issue_number: u32,
    ) -> Result<Option<Bounty>> {
        Ok(self.storage.get_bounty_by_issue(repository_id, issue_number)?)
    }

    pub fn list_for_repo(&self, owner: &str, name: &str) -> Result<Vec<Bounty>> {
        let repo = self.registered_repository(owner, name)?;
        Ok(self.storage.list_bounties_of_repository(repo.id)?)
    }

    pub fn list_all(&self) -> Result<Vec<Bounty>> {
        Ok(self.storage.list_bounties()?)
    }

    pub fn repository_of(&self, id: BountyId) -> Result<Repository> {
        let bounty = self.get(id)?;
        self.storage
            .get_repository(bounty.repository_id)?
            .ok_or_else(|| BountyError::repository_id(bounty.repository_id))
    }

    fn registered_repository(&self, owner: &str, name: &str) -> Result<Repository> {
        self.storage
            .get_repository_by_owner_name(owner, name)?
            .ok_or_else(|| BountyError::RepositoryNotRegistered(format!("{}/{}", owner, name)))
    }

    /// Links an issue of a tracked repository to a fresh ledger account.
    pub async fn create(&self, owner: &str, repo_name: &str, issue_number: u32) -> Result<Bounty> {
        let repo = self.registered_repository(owner, repo_name)?;

        let issue = self
            .tracker
            .issue(&repo.owner, &repo.name, issue_number)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    BountyError::IssueNotFound {
                        owner: repo.owner.clone(),
                        name: repo.name.clone(),
                        number: issue_number,
                    }
                } else {
                    e.into()
                }
            })?;

        if self.storage.get_bounty(issue.id)?.is_some()
            || self
                .storage
                .get_bounty_by_issue(repo.id, issue_number)?
                .is_some()
        {
            return Err(BountyError::Validation(format!(
                "issue {}#{} already has a bounty",
                repo.full_name(),
                issue_number
            )));
        }

        let seed = Seed::generate();
        let expires_at = Utc::now() + self.settings.deposit_window;
        let pool_address = self
            .ledger
            .allocate_deposit_address(&seed, Some(expires_at))
            .await?;

        let bounty = Bounty {
            id: issue.id,
            issue_number,
            repository_id: repo.id,
            receiver_id: NO_RECEIVER,
            seed,
            pool_address,
            receiver_address: String::new(),
            bundle_hash: String::new(),
            balance: 0,
            url: issue.html_url.trim().to_string(),
            title: issue.title.trim().to_string(),
            body: issue.body.unwrap_or_default().trim().to_string(),
            state: BountyState::Open,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.storage.insert_bounty(&bounty)?;
        info!(
            bounty_id = bounty.id,
            "Created bounty for {}#{}",
            repo.full_name(),
            issue_number
        );

        let notice = self.notifier.templates().registered(&bounty.pool_address);
        self.notifier.post(&repo, issue_number, &notice).await;

        Ok(bounty)
    }

    /// Open/Released -> Released with `receiver_id`, capturing the current balance.
    pub async fn release(&self, bounty: &Bounty, receiver_id: UserId) -> Result<Bounty> {
        if !bounty.state.can_transition_to(BountyState::Released) {
            return Err(BountyError::AlreadyTerminal(bounty.id));
        }

        let balance = self.ledger.available_balance(&bounty.seed).await?;
        if !self.storage.release_bounty(bounty.id, receiver_id, balance)? {
            return Err(self.guard_failure(bounty.id)?);
        }
        info!(
            bounty_id = bounty.id,
            receiver_id, balance, "Released bounty"
        );

        self.get(bounty.id)
    }

    /// Sends the full pool balance to `address` (90 trytes, checksum included).
    ///
    /// Requires state Released. Checking the sender against the receiver is up to the caller.
    /// On `InsufficientFunds` nothing changes, so the receiver can simply retry.
    pub async fn transfer(&self, bounty: &Bounty, address: &str) -> Result<SentTransfer> {
        match bounty.state {
            BountyState::Released => {}
            BountyState::Transferred => return Err(BountyError::AlreadyTerminal(bounty.id)),
            BountyState::Open => {
                return Err(BountyError::Validation(format!(
                    "bounty {} has not been released",
                    bounty.id
                )))
            }
        }
        address::verify_address_with_checksum(address)
            .map_err(|e| BountyError::Validation(e.to_string()))?;

        let sent = self
            .ledger
            .sweep(&bounty.seed, address, &self.settings.tag)
            .await?
            .ok_or(BountyError::InsufficientFunds)?;

        // From here on the funds are gone; every failure must carry the bundle.
        let recorded = self
            .storage
            .transfer_bounty(bounty.id, address, &sent.bundle_hash, sent.amount);
        if !matches!(recorded, Ok(true)) {
            let reason = match recorded {
                Err(e) => e.to_string(),
                _ => "bounty is no longer released".to_string(),
            };
            error!(
                bounty_id = bounty.id,
                amount = sent.amount,
                bundle = %sent.bundle_hash,
                "Funds were sent but the bounty could not be marked transferred: {}",
                reason
            );
            return Err(BountyError::SentButNotRecorded {
                bounty_id: bounty.id,
                bundle_hash: sent.bundle_hash,
                amount: sent.amount,
            });
        }
        info!(
            bounty_id = bounty.id,
            amount = sent.amount,
            bundle = %sent.bundle_hash,
            "Transferred bounty"
        );

        Ok(sent)
    }

    /// Archives and removes the bounty whatever its state. Unless it was already
    /// paid out, the issue gets a best-effort notice first.
    pub async fn delete(&self, id: BountyId) -> Result<Bounty> {
        let bounty = self.get(id)?;

        if !bounty.is_transferred() {
            match self.storage.get_repository(bounty.repository_id)? {
                Some(repo) => {
                    let notice = self.notifier.templates().deleted();
                    self.notifier.post(&repo, bounty.issue_number, &notice).await;
                }
                None => warn!(
                    bounty_id = id,
                    "Repository {} is gone, skipping deletion notice", bounty.repository_id
                ),
            }
        }

        let deleted = self.storage.delete_bounty(id)?;
        info!(bounty_id = id, "Deleted bounty");
        Ok(deleted)
    }

    /// Mirrors the linked issue and, until paid out, the pool balance.
    pub async fn refresh(&self, bounty: &Bounty) -> Result<BountyRefresh> {
        let repo = self
            .storage
            .get_repository(bounty.repository_id)?
            .ok_or_else(|| BountyError::RepositoryNotRegistered(bounty.repository_id.to_string()))?;

        let issue = match self
            .tracker
            .issue(&repo.owner, &repo.name, bounty.issue_number)
            .await
        {
            Ok(issue) => issue,
            Err(e) if e.is_not_found() => {
                info!(
                    bounty_id = bounty.id,
                    "Issue {}#{} is gone, deleting bounty",
                    repo.full_name(),
                    bounty.issue_number
                );
                self.delete(bounty.id).await?;
                return Ok(BountyRefresh::Removed);
            }
            Err(e) => return Err(e.into()),
        };

        self.storage.update_bounty_issue(
            bounty.id,
            issue.title.trim(),
            issue.body.as_deref().unwrap_or_default().trim(),
            issue.html_url.trim(),
        )?;

        if !bounty.is_transferred() {
            let balance = self.ledger.available_balance(&bounty.seed).await?;
            self.storage.update_bounty_balance(bounty.id, balance)?;
        }

        Ok(BountyRefresh::Updated(self.get(bounty.id)?))
    }

    /// Explains why a guarded storage transition matched no row.
    fn guard_failure(&self, id: BountyId) -> Result<BountyError> {
        Ok(match self.storage.get_bounty(id)? {
            None => BountyError::BountyNotFound(id),
            Some(_) => BountyError::AlreadyTerminal(id),
        })
    }
}
