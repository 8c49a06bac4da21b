//! Error types
//!
//! `BountyError` is what the registry, the lifecycle store and the event processor
//! return. External collaborators (GitHub, the ledger account service and the
//! SQLite store) each have their own error type which is wrapped as-is.

use thiserror::Error;

use crate::models::{BountyId, RepositoryId};

/// Errors raised while talking to the issue tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("not found on GitHub: {0}")]
    NotFound(String),

    #[error("GitHub API returned {status} for {path}")]
    Status { status: u16, path: String },

    #[error("GitHub request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl TrackerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TrackerError::NotFound(_))
    }
}

/// Errors raised by the ledger account capability.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger account service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("ledger request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("ledger session error: {0}")]
    Session(String),
}

/// Errors raised by the persistent store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{table} record {id} not found")]
    NotFound { table: &'static str, id: i64 },

    #[error("invalid stored value: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum BountyError {
    #[error("repository {0} not found")]
    RepositoryNotFound(String),

    #[error("bounty {0} not found")]
    BountyNotFound(BountyId),

    #[error("issue {owner}/{name}#{number} doesn't exist")]
    IssueNotFound {
        owner: String,
        name: String,
        number: u32,
    },

    #[error("repository {0} not added to platform")]
    RepositoryNotRegistered(String),

    #[error("repository {0} has issues deactivated")]
    IssuesDisabled(String),

    #[error("{0}")]
    Validation(String),

    #[error("the bounty address has no funds")]
    InsufficientFunds,

    #[error("bounty {0} was already transferred")]
    AlreadyTerminal(BountyId),

    /// The ledger accepted the transfer but the store kept the old state.
    #[error("{amount} sent in bundle {bundle_hash} but bounty {bounty_id} could not be marked transferred")]
    SentButNotRecorded {
        bounty_id: BountyId,
        bundle_hash: String,
        amount: u64,
    },

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl BountyError {
    /// True for failures of the tracker, the ledger or the store.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            BountyError::Tracker(_) | BountyError::Ledger(_) | BountyError::Storage(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            BountyError::RepositoryNotFound(_)
            | BountyError::BountyNotFound(_)
            | BountyError::IssueNotFound { .. } => true,
            BountyError::Tracker(e) => e.is_not_found(),
            BountyError::Storage(StorageError::NotFound { .. }) => true,
            _ => false,
        }
    }

    pub(crate) fn repository_id(id: RepositoryId) -> Self {
        BountyError::RepositoryNotFound(id.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BountyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_classification() {
        assert!(BountyError::from(TrackerError::Status {
            status: 502,
            path: "/repos/a/b".into()
        })
        .is_external());
        assert!(BountyError::from(LedgerError::Session("closed".into())).is_external());
        assert!(!BountyError::InsufficientFunds.is_external());
        assert!(!BountyError::Validation("bad".into()).is_external());
        assert!(!BountyError::SentButNotRecorded {
            bounty_id: 7,
            bundle_hash: "BUNDLE1".into(),
            amount: 10
        }
        .is_external());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(BountyError::from(TrackerError::NotFound("/repos/a/b".into())).is_not_found());
        assert!(BountyError::BountyNotFound(7).is_not_found());
        assert!(BountyError::from(StorageError::NotFound {
            table: "bounties",
            id: 7
        })
        .is_not_found());
        assert!(!BountyError::InsufficientFunds.is_not_found());
    }
}
