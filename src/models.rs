//! Persisted records: tracked repositories, bounties and their archived copies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Seed;

/// GitHub assigned repository id.
pub type RepositoryId = i64;
/// GitHub assigned issue id, also the bounty's identity.
pub type BountyId = i64;
/// GitHub assigned user id. `0` means "no receiver yet".
pub type UserId = i64;

pub const NO_RECEIVER: UserId = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub owner: String,
    pub name: String,
    pub url: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Repository {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Lifecycle of a bounty. Ordered by rank: a bounty never moves to a lower rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BountyState {
    Open,
    Released,
    Transferred,
}

impl BountyState {
    pub fn as_i64(self) -> i64 {
        match self {
            BountyState::Open => 0,
            BountyState::Released => 1,
            BountyState::Transferred => 2,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(BountyState::Open),
            1 => Some(BountyState::Released),
            2 => Some(BountyState::Transferred),
            _ => None,
        }
    }

    /// Released -> Released is the only same-rank move (receiver change).
    pub fn can_transition_to(self, next: BountyState) -> bool {
        match (self, next) {
            (BountyState::Open, BountyState::Released) => true,
            (BountyState::Released, BountyState::Released) => true,
            (BountyState::Released, BountyState::Transferred) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == BountyState::Transferred
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounty {
    pub id: BountyId,
    pub issue_number: u32,
    pub repository_id: RepositoryId,
    pub receiver_id: UserId,
    pub seed: Seed,
    pub pool_address: String,
    pub receiver_address: String,
    pub bundle_hash: String,
    pub balance: u64,
    pub url: String,
    pub title: String,
    pub body: String,
    pub state: BountyState,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Bounty {
    pub fn has_receiver(&self) -> bool {
        self.receiver_id != NO_RECEIVER
    }

    pub fn is_transferred(&self) -> bool {
        self.state.is_terminal()
    }
}

/// A record moved out of the live tables on deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum ArchivedRecord {
    Repository(Repository),
    Bounty(Bounty),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archived {
    pub archive_id: i64,
    pub archived_at: DateTime<Utc>,
    pub record: ArchivedRecord,
}
