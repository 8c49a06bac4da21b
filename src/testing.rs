//! In-memory stand-ins for GitHub and the ledger account service

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::address::{self, Seed};
use crate::app::Platform;
use crate::config::Config;
use crate::error::{LedgerError, TrackerError};
use crate::ledger::{self, AccountSession, LedgerAccounts, SentTransfer, SessionMode, Transfer};
use crate::lock::GlobalLock;
use crate::models::{Bounty, BountyState, Repository, RepositoryId, NO_RECEIVER};
use crate::storage::BountyStorage;
use crate::tracker::{
    self, Collaborator, Hook, HookConfig, IssueTracker, NewHook, Permissions, TrackerIssue,
    TrackerRepository, TrackerUser,
};

pub fn sample_repository(id: RepositoryId, owner: &str, name: &str) -> Repository {
    Repository {
        id,
        owner: owner.to_string(),
        name: name.to_string(),
        url: format!("https://github.com/{}/{}", owner, name),
        description: String::new(),
        created_at: Utc::now(),
        updated_at: None,
    }
}

pub fn sample_bounty(id: i64, repository_id: RepositoryId, issue_number: u32) -> Bounty {
    Bounty {
        id,
        issue_number,
        repository_id,
        receiver_id: NO_RECEIVER,
        seed: Seed::generate(),
        pool_address: "9".repeat(address::ADDRESS_LENGTH),
        receiver_address: String::new(),
        bundle_hash: String::new(),
        balance: 0,
        url: format!("https://github.com/acme/widgets/issues/{}", issue_number),
        title: format!("Issue {}", issue_number),
        body: String::new(),
        state: BountyState::Open,
        created_at: Utc::now(),
        updated_at: None,
    }
}

/// A receiving address with a correct checksum.
pub fn valid_address() -> String {
    address::with_checksum(
        "RVORZ9SIIP9RCYMREUIXXVPQIPHVCNPQ9HZWYKFWYWZRE9JQKG9REPKIASHUUECPSQO9JT9XNMVKWYGVA",
    )
    .unwrap()
}

// ============================================================================
// TRACKER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedComment {
    pub owner: String,
    pub name: String,
    pub number: u32,
    pub body: String,
}

#[derive(Default)]
struct TrackerState {
    repositories: Vec<TrackerRepository>,
    issues: HashMap<(String, String, u32), TrackerIssue>,
    users: HashMap<String, TrackerUser>,
    collaborators: HashMap<(String, String), Vec<Collaborator>>,
    hooks: HashMap<(String, String), Vec<Hook>>,
    failing_hooks: HashSet<(String, String)>,
    comments: Vec<PostedComment>,
    fail_comments: bool,
    next_hook_id: i64,
}

fn key(owner: &str, name: &str) -> (String, String) {
    (owner.to_string(), name.to_string())
}

#[derive(Clone, Default)]
pub struct MockTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl MockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_repository(&self, id: i64, owner: &str, name: &str) {
        let mut state = self.state.lock();
        state.repositories.retain(|r| r.id != id);
        state.repositories.push(TrackerRepository {
            id,
            owner: TrackerUser {
                id: 1000 + id,
                login: owner.to_string(),
            },
            name: name.to_string(),
            html_url: format!("https://github.com/{}/{}", owner, name),
            description: Some(format!("{} description", name)),
            has_issues: true,
        });
    }

    pub fn rename_repository(&self, id: i64, owner: &str, name: &str) {
        let mut state = self.state.lock();
        if let Some(repo) = state.repositories.iter_mut().find(|r| r.id == id) {
            repo.owner.login = owner.to_string();
            repo.name = name.to_string();
            repo.html_url = format!("https://github.com/{}/{}", owner, name);
        }
    }

    pub fn set_has_issues(&self, id: i64, has_issues: bool) {
        let mut state = self.state.lock();
        if let Some(repo) = state.repositories.iter_mut().find(|r| r.id == id) {
            repo.has_issues = has_issues;
        }
    }

    pub fn remove_repository(&self, id: i64) {
        self.state.lock().repositories.retain(|r| r.id != id);
    }

    /// Adds or replaces the issue `number`.
    pub fn add_issue(&self, owner: &str, name: &str, number: u32, id: i64, title: &str) {
        self.state.lock().issues.insert(
            (owner.to_string(), name.to_string(), number),
            TrackerIssue {
                id,
                number,
                title: title.to_string(),
                body: Some(format!("Body of {}", title)),
                html_url: format!("https://github.com/{}/{}/issues/{}", owner, name, number),
            },
        );
    }

    pub fn remove_issue(&self, owner: &str, name: &str, number: u32) {
        self.state
            .lock()
            .issues
            .remove(&(owner.to_string(), name.to_string(), number));
    }

    pub fn add_user(&self, id: i64, login: &str) {
        self.state.lock().users.insert(
            login.to_string(),
            TrackerUser {
                id,
                login: login.to_string(),
            },
        );
    }

    pub fn add_collaborator(&self, owner: &str, name: &str, id: i64, login: &str, admin: bool) {
        self.state
            .lock()
            .collaborators
            .entry(key(owner, name))
            .or_default()
            .push(Collaborator {
                id,
                login: login.to_string(),
                permissions: Permissions {
                    admin,
                    push: admin,
                    pull: true,
                },
            });
    }

    pub fn add_hook(&self, owner: &str, name: &str, url: &str) {
        let mut state = self.state.lock();
        state.next_hook_id += 1;
        let id = state.next_hook_id;
        state.hooks.entry(key(owner, name)).or_default().push(Hook {
            id,
            config: HookConfig {
                url: Some(url.to_string()),
                ..HookConfig::default()
            },
        });
    }

    /// Hook listing for this repository answers 403 from now on.
    pub fn fail_hooks(&self, owner: &str, name: &str) {
        self.state.lock().failing_hooks.insert(key(owner, name));
    }

    pub fn hooks_of(&self, owner: &str, name: &str) -> Vec<Hook> {
        self.state
            .lock()
            .hooks
            .get(&key(owner, name))
            .cloned()
            .unwrap_or_default()
    }

    pub fn fail_comments(&self, fail: bool) {
        self.state.lock().fail_comments = fail;
    }

    pub fn comments(&self) -> Vec<PostedComment> {
        self.state.lock().comments.clone()
    }

    /// Bodies of the comments posted on issue `number`, oldest first.
    pub fn comments_on(&self, number: u32) -> Vec<String> {
        self.state
            .lock()
            .comments
            .iter()
            .filter(|c| c.number == number)
            .map(|c| c.body.clone())
            .collect()
    }
}

#[async_trait]
impl IssueTracker for MockTracker {
    async fn current_user(&self) -> tracker::Result<TrackerUser> {
        Ok(TrackerUser {
            id: 1,
            login: "bounty-bot".to_string(),
        })
    }

    async fn repository(&self, owner: &str, name: &str) -> tracker::Result<TrackerRepository> {
        self.state
            .lock()
            .repositories
            .iter()
            .find(|r| r.owner.login == owner && r.name == name)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(format!("/repos/{}/{}", owner, name)))
    }

    async fn repository_by_id(&self, id: i64) -> tracker::Result<TrackerRepository> {
        self.state
            .lock()
            .repositories
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(format!("/repositories/{}", id)))
    }

    async fn issue(&self, owner: &str, name: &str, number: u32) -> tracker::Result<TrackerIssue> {
        self.state
            .lock()
            .issues
            .get(&(owner.to_string(), name.to_string(), number))
            .cloned()
            .ok_or_else(|| {
                TrackerError::NotFound(format!("/repos/{}/{}/issues/{}", owner, name, number))
            })
    }

    async fn user(&self, login: &str) -> tracker::Result<TrackerUser> {
        self.state
            .lock()
            .users
            .get(login)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(format!("/users/{}", login)))
    }

    async fn collaborators(&self, owner: &str, name: &str) -> tracker::Result<Vec<Collaborator>> {
        Ok(self
            .state
            .lock()
            .collaborators
            .get(&key(owner, name))
            .cloned()
            .unwrap_or_default())
    }

    async fn hooks(&self, owner: &str, name: &str) -> tracker::Result<Vec<Hook>> {
        let state = self.state.lock();
        if state.failing_hooks.contains(&key(owner, name)) {
            return Err(TrackerError::Status {
                status: 403,
                path: format!("/repos/{}/{}/hooks", owner, name),
            });
        }
        Ok(state.hooks.get(&key(owner, name)).cloned().unwrap_or_default())
    }

    async fn create_hook(&self, owner: &str, name: &str, hook: &NewHook) -> tracker::Result<Hook> {
        let mut state = self.state.lock();
        state.next_hook_id += 1;
        let created = Hook {
            id: state.next_hook_id,
            config: hook.config.clone(),
        };
        state
            .hooks
            .entry(key(owner, name))
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn create_comment(
        &self,
        owner: &str,
        name: &str,
        number: u32,
        body: &str,
    ) -> tracker::Result<()> {
        let mut state = self.state.lock();
        if state.fail_comments {
            return Err(TrackerError::Status {
                status: 502,
                path: format!("/repos/{}/{}/issues/{}/comments", owner, name, number),
            });
        }
        state.comments.push(PostedComment {
            owner: owner.to_string(),
            name: name.to_string(),
            number,
            body: body.to_string(),
        });
        Ok(())
    }
}

// ============================================================================
// LEDGER
// ============================================================================

#[derive(Default)]
struct LedgerState {
    balances: HashMap<String, u64>,
    failing_balances: HashSet<String>,
    send_failure: Option<String>,
    sends: Vec<Transfer>,
    addresses: Vec<(String, Option<DateTime<Utc>>)>,
    opened: usize,
    closed: usize,
}

#[derive(Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, seed: &Seed, balance: u64) {
        self.state
            .lock()
            .balances
            .insert(seed.expose().to_string(), balance);
    }

    pub fn fail_balance_for(&self, seed: &Seed) {
        self.state
            .lock()
            .failing_balances
            .insert(seed.expose().to_string());
    }

    pub fn fail_sends(&self, message: &str) {
        self.state.lock().send_failure = Some(message.to_string());
    }

    pub fn sends(&self) -> Vec<Transfer> {
        self.state.lock().sends.clone()
    }

    /// Deposit addresses handed out so far, with their expiry.
    pub fn addresses(&self) -> Vec<(String, Option<DateTime<Utc>>)> {
        self.state.lock().addresses.clone()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().opened
    }

    pub fn closed(&self) -> usize {
        self.state.lock().closed
    }
}

#[async_trait]
impl LedgerAccounts for MockLedger {
    async fn open(&self, seed: &Seed, mode: SessionMode) -> ledger::Result<Box<dyn AccountSession>> {
        self.state.lock().opened += 1;
        Ok(Box::new(MockSession {
            state: self.state.clone(),
            seed: seed.expose().to_string(),
            mode,
        }))
    }
}

struct MockSession {
    state: Arc<Mutex<LedgerState>>,
    seed: String,
    mode: SessionMode,
}

#[async_trait]
impl AccountSession for MockSession {
    async fn allocate_deposit_address(
        &mut self,
        expires_at: Option<DateTime<Utc>>,
    ) -> ledger::Result<String> {
        let mut state = self.state.lock();
        let n = state.addresses.len();
        let letter = address::TRYTE_ALPHABET.as_bytes()[1 + n % 26] as char;
        let addr: String = std::iter::repeat(letter)
            .take(address::ADDRESS_LENGTH)
            .collect();
        state.addresses.push((addr.clone(), expires_at));
        Ok(addr)
    }

    async fn available_balance(&mut self) -> ledger::Result<u64> {
        let state = self.state.lock();
        if state.failing_balances.contains(&self.seed) {
            return Err(LedgerError::Session("balance unavailable".to_string()));
        }
        Ok(state.balances.get(&self.seed).copied().unwrap_or(0))
    }

    async fn send(&mut self, transfer: &Transfer) -> ledger::Result<SentTransfer> {
        if self.mode != SessionMode::Send {
            return Err(LedgerError::Session("account not loaded for sending".to_string()));
        }
        let mut state = self.state.lock();
        if let Some(message) = &state.send_failure {
            return Err(LedgerError::Session(message.clone()));
        }
        let balance = state.balances.get(&self.seed).copied().unwrap_or(0);
        if transfer.amount > balance {
            return Err(LedgerError::Session("insufficient balance".to_string()));
        }
        state.balances.insert(self.seed.clone(), balance - transfer.amount);
        state.sends.push(transfer.clone());
        Ok(SentTransfer {
            bundle_hash: format!("BUNDLE{}", state.sends.len()),
            amount: transfer.amount,
        })
    }

    async fn close(self: Box<Self>) -> ledger::Result<()> {
        self.state.lock().closed += 1;
        Ok(())
    }
}

// ============================================================================
// PLATFORM
// ============================================================================

/// A fully wired platform on top of the mocks and an in-memory database.
pub struct TestPlatform {
    pub platform: Platform,
    pub storage: Arc<BountyStorage>,
    pub tracker: MockTracker,
    pub ledger: MockLedger,
}

impl TestPlatform {
    pub fn new() -> Self {
        let storage = Arc::new(BountyStorage::in_memory().unwrap());
        let tracker = MockTracker::new();
        let ledger = MockLedger::new();
        let platform = Platform::assemble(
            &Config::default(),
            storage.clone(),
            Arc::new(tracker.clone()),
            Arc::new(ledger.clone()),
            GlobalLock::new(),
        );
        Self {
            platform,
            storage,
            tracker,
            ledger,
        }
    }

    /// Creates the repository on the mock tracker and adds it to the platform.
    pub async fn track_repository(&self, id: i64, owner: &str, name: &str) -> Repository {
        self.tracker.add_repository(id, owner, name);
        self.platform.registry.add(owner, name).await.unwrap()
    }
}
