//! Repository registry: which GitHub repositories are under platform control

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{BountyError, Result};
use crate::hooks::HookInstaller;
use crate::lifecycle::BountyLifecycle;
use crate::models::{Bounty, Repository, RepositoryId};
use crate::storage::BountyStorage;
use crate::tracker::IssueTracker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryRefresh {
    Updated(Repository),
    /// Gone from GitHub; the repository and its bounties were archived.
    Removed,
}

/// What a repository delete actually removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDeletion {
    pub repository: Repository,
    pub bounties_deleted: usize,
    /// Bounties that couldn't be deleted and stay in place.
    pub bounties_failed: usize,
}

pub struct RepositoryRegistry {
    storage: Arc<BountyStorage>,
    tracker: Arc<dyn IssueTracker>,
    bounties: Arc<BountyLifecycle>,
    hooks: Arc<HookInstaller>,
}

impl RepositoryRegistry {
    pub fn new(
        storage: Arc<BountyStorage>,
        tracker: Arc<dyn IssueTracker>,
        bounties: Arc<BountyLifecycle>,
        hooks: Arc<HookInstaller>,
    ) -> Self {
        Self {
            storage,
            tracker,
            bounties,
            hooks,
        }
    }

    pub fn get(&self, id: RepositoryId) -> Result<Repository> {
        self.storage
            .get_repository(id)?
            .ok_or_else(|| BountyError::repository_id(id))
    }

    pub fn get_by_owner_name(&self, owner: &str, name: &str) -> Result<Repository> {
        self.storage
            .get_repository_by_owner_name(owner, name)?
            .ok_or_else(|| BountyError::RepositoryNotFound(format!("{}/{}", owner, name)))
    }

    pub fn list_all(&self) -> Result<Vec<Repository>> {
        Ok(self.storage.list_repositories()?)
    }

    /// Starts tracking a GitHub repository and makes sure its web hook exists.
    pub async fn add(&self, owner: &str, name: &str) -> Result<Repository> {
        let full_name = format!("{}/{}", owner, name);
        let remote = self.tracker.repository(owner, name).await.map_err(|e| {
            if e.is_not_found() {
                BountyError::RepositoryNotFound(full_name.clone())
            } else {
                e.into()
            }
        })?;
        if !remote.has_issues {
            return Err(BountyError::IssuesDisabled(full_name));
        }
        if self.storage.get_repository(remote.id)?.is_some() {
            return Err(BountyError::Validation(format!(
                "repository {} is already added",
                full_name
            )));
        }

        let repo = Repository {
            id: remote.id,
            owner: remote.owner.login.trim().to_string(),
            name: remote.name.trim().to_string(),
            url: remote.html_url.trim().to_string(),
            description: remote.description.unwrap_or_default().trim().to_string(),
            created_at: Utc::now(),
            updated_at: None,
        };
        self.storage.insert_repository(&repo)?;
        info!(repository_id = repo.id, "Added repository {}", repo.full_name());

        if let Err(e) = self.hooks.ensure_all().await {
            warn!("Web hook check after adding {} failed: {}", repo.full_name(), e);
        }

        Ok(repo)
    }

    /// Accepts `https://github.com/<owner>/<name>` with optional trailing parts.
    pub async fn add_via_url(&self, url: &str) -> Result<Repository> {
        let (owner, name) = parse_repository_url(url)?;
        self.add(&owner, &name).await
    }

    /// Deletes every bounty of the repository, then archives the repository.
    /// A bounty that can't be deleted is logged and skipped.
    pub async fn delete(&self, id: RepositoryId) -> Result<RepositoryDeletion> {
        let repo = self.get(id)?;
        let bounties = self.storage.list_bounties_of_repository(id)?;
        let bounties_deleted = self.delete_bounties(&repo, &bounties).await;

        let repository = self.storage.delete_repository(id)?;
        info!(
            repository_id = id,
            bounties_deleted,
            "Deleted repository {}",
            repository.full_name()
        );
        Ok(RepositoryDeletion {
            repository,
            bounties_deleted,
            bounties_failed: bounties.len() - bounties_deleted,
        })
    }

    async fn delete_bounties(&self, repo: &Repository, bounties: &[Bounty]) -> usize {
        let mut deleted = 0;
        for bounty in bounties {
            match self.bounties.delete(bounty.id).await {
                Ok(_) => deleted += 1,
                Err(e) => warn!(
                    bounty_id = bounty.id,
                    "Couldn't delete bounty of {}#{}: {}",
                    repo.full_name(),
                    bounty.issue_number,
                    e
                ),
            }
        }
        deleted
    }

    /// Re-reads the repository from GitHub by id, following renames and transfers.
    pub async fn refresh(&self, repo: &Repository) -> Result<RepositoryRefresh> {
        let remote = match self.tracker.repository_by_id(repo.id).await {
            Ok(remote) => remote,
            Err(e) if e.is_not_found() => {
                info!(
                    repository_id = repo.id,
                    "Repository {} is gone from GitHub, deleting it",
                    repo.full_name()
                );
                self.delete(repo.id).await?;
                return Ok(RepositoryRefresh::Removed);
            }
            Err(e) => return Err(e.into()),
        };

        if !remote.has_issues {
            return Err(BountyError::IssuesDisabled(repo.full_name()));
        }

        self.storage.update_repository(
            repo.id,
            remote.owner.login.trim(),
            remote.name.trim(),
            remote.html_url.trim(),
            remote.description.as_deref().unwrap_or_default().trim(),
        )?;

        Ok(RepositoryRefresh::Updated(self.get(repo.id)?))
    }
}

fn parse_repository_url(url: &str) -> Result<(String, String)> {
    let invalid = || BountyError::Validation(format!("{} is not a GitHub repository URL", url));

    let rest = url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.");
    let path = rest.strip_prefix("github.com/").ok_or_else(invalid)?;

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let owner = segments.next().ok_or_else(invalid)?;
    let name = segments.next().ok_or_else(invalid)?;
    let name = name.trim_end_matches(".git");
    if name.is_empty() {
        return Err(invalid());
    }

    Ok((owner.to_string(), name.to_string()))
}
