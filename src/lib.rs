//! Bounty Platform - Link GitHub issues to ledger-backed bounties
//!
//! Repository admins attach a bounty to an issue; anyone can fund it by sending
//! tokens to the bounty's pool address.
//!
//! # How it works
//!
//! 1. An operator adds a repository; the platform installs a comment web hook
//! 2. A bounty is created for an issue and a deposit address is posted on it
//! 3. An admin comments `release bounty to @<user>` to pick the receiver
//! 4. The receiver comments their address (with checksum) and the full pool
//!    balance is sent to it
//! 5. A periodic sweep mirrors renames, deletions and balances
//!
//! Every mutation (web hook, sweep, operator CLI) runs under one global lock.

pub mod address;
pub mod app;
pub mod config;
pub mod error;
pub mod hooks;
pub mod kerl;
pub mod ledger;
pub mod lifecycle;
pub mod lock;
pub mod models;
pub mod notices;
pub mod processor;
pub mod reconcile;
pub mod registry;
pub mod server;
pub mod storage;
pub mod tracker;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

pub use app::Platform;
pub use error::{BountyError, LedgerError, StorageError, TrackerError};
pub use ledger::{LedgerAccounts, LedgerAdapter};
pub use lifecycle::BountyLifecycle;
pub use lock::GlobalLock;
pub use models::{Bounty, BountyState, Repository};
pub use processor::EventProcessor;
pub use registry::RepositoryRegistry;
pub use storage::BountyStorage;
pub use tracker::{GitHubClient, IssueTracker};
