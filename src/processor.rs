//! Webhook event processing
//!
//! Each `issue_comment` event runs start to finish under the global lock:
//! resolve repository and bounty, classify the comment, then either release the
//! bounty to a user (admin command) or pay it out (receiver posts an address).

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::address;
use crate::error::BountyError;
use crate::ledger::SentTransfer;
use crate::lifecycle::BountyLifecycle;
use crate::lock::GlobalLock;
use crate::models::{Bounty, BountyState, Repository};
use crate::notices::Notifier;
use crate::registry::RepositoryRegistry;
use crate::tracker::IssueTracker;
use crate::webhook::{CommentAction, EventUser, IssueCommentEvent, WebhookEvent};

pub const RELEASE_COMMAND: &str = "release bounty to @";

/// What a comment body asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// A 90 tryte address, not yet checksum-verified.
    Address(&'a str),
    /// Whatever follows the release prefix, trimmed. May be empty.
    Release(&'a str),
    Noise,
}

pub fn classify(body: &str) -> Command<'_> {
    let body = body.trim();
    if address::is_address_with_checksum(body) {
        return Command::Address(body);
    }
    match body.strip_prefix(RELEASE_COMMAND) {
        Some(rest) => Command::Release(rest.trim()),
        None => Command::Noise,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Not a comment event.
    Unhandled(&'static str),
    UnknownRepository,
    UnknownBounty,
    /// Bounty already paid out.
    Terminal,
    /// Comment edits and deletions.
    NotCreated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    InvalidChecksum,
    NotAdmin,
    ReceiverNameInvalid,
    ReceiverNotFound,
    NoFunds,
    TransferFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Dropped(DropReason),
    /// A comment the platform has nothing to do with, or a command whose
    /// preconditions don't hold (silently).
    Ignored,
    Released {
        receiver: String,
        receiver_changed: bool,
    },
    Transferred(SentTransfer),
    /// Answered with a notice on the issue.
    Rejected(Rejection),
    /// Logged only.
    Failed(String),
}

pub struct EventProcessor {
    registry: Arc<RepositoryRegistry>,
    bounties: Arc<BountyLifecycle>,
    tracker: Arc<dyn IssueTracker>,
    notifier: Notifier,
    lock: GlobalLock,
}

impl EventProcessor {
    pub fn new(
        registry: Arc<RepositoryRegistry>,
        bounties: Arc<BountyLifecycle>,
        tracker: Arc<dyn IssueTracker>,
        notifier: Notifier,
        lock: GlobalLock,
    ) -> Self {
        Self {
            registry,
            bounties,
            tracker,
            notifier,
            lock,
        }
    }

    pub async fn process(&self, event: WebhookEvent) -> Outcome {
        match event {
            WebhookEvent::IssueComment(comment) => self.process_comment(comment).await,
            WebhookEvent::Ping(ping) => {
                info!("Received ping for hook {:?}", ping.hook_id);
                Outcome::Dropped(DropReason::Unhandled("ping"))
            }
            WebhookEvent::Meta(meta) => {
                info!("Received meta event '{}' for hook {:?}", meta.action, meta.hook_id);
                Outcome::Dropped(DropReason::Unhandled("meta"))
            }
            WebhookEvent::Issues(issues) => {
                debug!(
                    "Ignoring issues event '{}' on #{}",
                    issues.action, issues.issue.number
                );
                Outcome::Dropped(DropReason::Unhandled("issues"))
            }
        }
    }

    async fn process_comment(&self, event: IssueCommentEvent) -> Outcome {
        let _guard = self.lock.acquire().await;

        let repo = match self.registry.get(event.repository.id) {
            Ok(repo) => repo,
            Err(e) if e.is_not_found() => {
                debug!(
                    "Dropping comment on {}/{}: repository isn't tracked",
                    event.repository.owner.login, event.repository.name
                );
                return Outcome::Dropped(DropReason::UnknownRepository);
            }
            Err(e) => return failed("load repository", e),
        };

        let bounty = match self.bounties.get(event.issue.id) {
            Ok(bounty) => bounty,
            Err(e) if e.is_not_found() => {
                debug!(
                    "Dropping comment on {}#{}: no bounty",
                    repo.full_name(),
                    event.issue.number
                );
                return Outcome::Dropped(DropReason::UnknownBounty);
            }
            Err(e) => return failed("load bounty", e),
        };

        if bounty.is_transferred() {
            debug!(bounty_id = bounty.id, "Dropping comment: bounty already transferred");
            return Outcome::Dropped(DropReason::Terminal);
        }
        if event.action != CommentAction::Created {
            return Outcome::Dropped(DropReason::NotCreated);
        }

        match classify(&event.comment.body) {
            Command::Address(addr) => self.handle_address(&repo, &bounty, &event.sender, addr).await,
            Command::Release(receiver) => {
                self.handle_release(&repo, &bounty, &event.sender, receiver)
                    .await
            }
            Command::Noise => Outcome::Ignored,
        }
    }

    async fn handle_address(
        &self,
        repo: &Repository,
        bounty: &Bounty,
        sender: &EventUser,
        addr: &str,
    ) -> Outcome {
        if bounty.state != BountyState::Released {
            info!(bounty_id = bounty.id, "Ignoring posted address: bounty not released");
            return Outcome::Ignored;
        }
        if sender.id != bounty.receiver_id {
            info!(
                bounty_id = bounty.id,
                sender = %sender.login,
                "Ignoring posted address: sender isn't the receiver"
            );
            return Outcome::Ignored;
        }

        let templates = self.notifier.templates();
        if let Err(e) = address::verify_address_with_checksum(addr) {
            warn!(bounty_id = bounty.id, "Posted address rejected: {}", e);
            self.notifier
                .post(repo, bounty.issue_number, &templates.invalid_checksum())
                .await;
            return Outcome::Rejected(Rejection::InvalidChecksum);
        }

        match self.bounties.transfer(bounty, addr).await {
            Ok(sent) => {
                let notice = templates.sent(&sender.login, sent.amount, &sent.bundle_hash);
                self.notifier.post(repo, bounty.issue_number, &notice).await;
                Outcome::Transferred(sent)
            }
            Err(BountyError::SentButNotRecorded {
                bundle_hash, amount, ..
            }) => {
                // The receiver has been paid; a retry notice would be wrong.
                let notice = templates.sent(&sender.login, amount, &bundle_hash);
                self.notifier.post(repo, bounty.issue_number, &notice).await;
                Outcome::Transferred(SentTransfer {
                    bundle_hash,
                    amount,
                })
            }
            Err(BountyError::InsufficientFunds) => {
                warn!(bounty_id = bounty.id, "Bounty released without funds");
                self.notifier
                    .post(repo, bounty.issue_number, &templates.no_funds())
                    .await;
                Outcome::Rejected(Rejection::NoFunds)
            }
            Err(e) => {
                error!(bounty_id = bounty.id, "Failed to send bounty: {}", e);
                let message = e.to_string();
                self.notifier
                    .post(repo, bounty.issue_number, &templates.transfer_failed(&message))
                    .await;
                Outcome::Rejected(Rejection::TransferFailed(message))
            }
        }
    }

    async fn handle_release(
        &self,
        repo: &Repository,
        bounty: &Bounty,
        sender: &EventUser,
        receiver: &str,
    ) -> Outcome {
        let templates = self.notifier.templates();

        let collaborators = match self.tracker.collaborators(&repo.owner, &repo.name).await {
            Ok(collaborators) => collaborators,
            Err(e) => return failed("fetch collaborators", e.into()),
        };
        let is_admin = collaborators
            .iter()
            .find(|c| c.id == sender.id)
            .is_some_and(|c| c.permissions.admin);
        if !is_admin {
            warn!(
                bounty_id = bounty.id,
                sender = %sender.login,
                "Release command issued by a non-admin"
            );
            self.notifier
                .post(repo, bounty.issue_number, &templates.not_admin())
                .await;
            return Outcome::Rejected(Rejection::NotAdmin);
        }

        if receiver.is_empty() {
            info!(bounty_id = bounty.id, "Couldn't parse receiver of release command");
            self.notifier
                .post(repo, bounty.issue_number, &templates.receiver_name_invalid())
                .await;
            return Outcome::Rejected(Rejection::ReceiverNameInvalid);
        }

        let user = match self.tracker.user(receiver).await {
            Ok(user) => user,
            Err(e) => {
                warn!(bounty_id = bounty.id, "Couldn't fetch receiver {}: {}", receiver, e);
                self.notifier
                    .post(repo, bounty.issue_number, &templates.receiver_not_found())
                    .await;
                return Outcome::Rejected(Rejection::ReceiverNotFound);
            }
        };

        let receiver_changed = bounty.has_receiver();
        let released = match self.bounties.release(bounty, user.id).await {
            Ok(released) => released,
            Err(e) => return failed("release bounty", e),
        };
        info!(
            bounty_id = bounty.id,
            receiver = %user.login,
            receiver_changed,
            "Bounty released"
        );

        let notice = if receiver_changed {
            templates.receiver_updated(released.balance, &user.login)
        } else {
            templates.released(released.balance, &user.login)
        };
        self.notifier.post(repo, bounty.issue_number, &notice).await;

        Outcome::Released {
            receiver: user.login,
            receiver_changed,
        }
    }
}

fn failed(step: &str, e: BountyError) -> Outcome {
    if e.is_external() {
        error!("Couldn't {}: {}", step, e);
    } else {
        warn!("Couldn't {}: {}", step, e);
    }
    Outcome::Failed(e.to_string())
}
