//! Comment templates posted on bounty issues, and the notifier that posts them

use std::sync::Arc;

use tracing::{debug, warn};

use crate::models::Repository;
use crate::tracker::IssueTracker;

const RELEASE_SYNTAX: &str = "`release bounty to @<bounty_receiver_name>`";

#[derive(Debug, Clone)]
pub struct Templates {
    unit: String,
    explorer_url: String,
}

impl Templates {
    pub fn new(unit: impl Into<String>, explorer_url: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            explorer_url: explorer_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn registered(&self, pool_address: &str) -> String {
        format!(
            "This issue has been linked with the bounty platform.\n\
             Help raising the incentive to solve this issue by sending {unit} to the following address:\n\
             [{addr}]({explorer}/address/{addr})\n\
             \n\
             > Please note that the tokens you send to the address can not be recovered\n\
             \n\
             Important:\n\
             **If you move this repository make sure to await for the bounty platform to synchronize the repository state before releasing a bounty.**\n\
             \n\
             #### Releasing the bounty (as a repository admin)\n\
             Release the bounty by issuing following comment:\n\
             {syntax}\n\
             \n\
             #### Receiving the bounty (as the issue solver)\n\
             Simply create a comment with your address (+checksum, must be 90 chars long!) to receive the tokens to after the above 'release comment' has been posted.\n",
            unit = self.unit,
            addr = pool_address,
            explorer = self.explorer_url,
            syntax = RELEASE_SYNTAX,
        )
    }

    pub fn released(&self, balance: u64, receiver: &str) -> String {
        format!(
            "The bounty of {} {} has been released.\n\
             @{} please post your receiving address as a comment.\n\
             The receiver of the bounty can still be changed by issuing the bounty release command again.\n",
            balance, self.unit, receiver
        )
    }

    pub fn receiver_updated(&self, balance: u64, receiver: &str) -> String {
        format!(
            "The receiver of the bounty of {} {} has been updated to {}.\n\
             @{} please post your receiving address as a comment.\n\
             The receiver of the bounty can still be changed by issuing the bounty release command again.\n",
            balance, self.unit, receiver, receiver
        )
    }

    pub fn sent(&self, receiver: &str, amount: u64, bundle_hash: &str) -> String {
        format!(
            "Hey @{}, the bounty of {} {} has been sent off. Bundle: [{}]({}/bundle/{}).\n",
            receiver, amount, self.unit, bundle_hash, self.explorer_url, bundle_hash
        )
    }

    pub fn deleted(&self) -> String {
        "The bounty associated with this issue has been deleted from the bounty platform, \
         therefore the bounty is no longer active.\n"
            .to_string()
    }

    pub fn invalid_checksum(&self) -> String {
        "The posted message has an invalid checksum.".to_string()
    }

    pub fn no_funds(&self) -> String {
        "Unfortunately it seems that the bounty was released but there are no funds on the bounty address. \
         Please reinitiate the sending by posting **your** address again once there are funds on the address."
            .to_string()
    }

    pub fn transfer_failed(&self, error: &str) -> String {
        format!(
            "Unfortunately an error occurred while sending the bounty to your address. \
             Please reinitiate the sending by posting your address again.\n\nError message: {}",
            error
        )
    }

    pub fn not_admin(&self) -> String {
        "Only the repository admins are allowed to issue bounty release commands.".to_string()
    }

    pub fn receiver_name_invalid(&self) -> String {
        format!(
            "Couldn't read out receiver name from the bounty release command.\n\
             Please make sure you use the appropriate syntax of:\n{}",
            RELEASE_SYNTAX
        )
    }

    pub fn receiver_not_found(&self) -> String {
        format!(
            "Couldn't find the user specified in the bounty release command.\n\
             Please make sure you use the appropriate syntax of:\n{}",
            RELEASE_SYNTAX
        )
    }
}

/// Posts notices as issue comments. Failures are logged and swallowed: the
/// state change a notice describes has already been committed.
#[derive(Clone)]
pub struct Notifier {
    tracker: Arc<dyn IssueTracker>,
    templates: Templates,
}

impl Notifier {
    pub fn new(tracker: Arc<dyn IssueTracker>, templates: Templates) -> Self {
        Self { tracker, templates }
    }

    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    /// Returns whether the comment was posted.
    pub async fn post(&self, repo: &Repository, issue_number: u32, body: &str) -> bool {
        match self
            .tracker
            .create_comment(&repo.owner, &repo.name, issue_number, body)
            .await
        {
            Ok(()) => {
                debug!("Notified {}#{}", repo.full_name(), issue_number);
                true
            }
            Err(e) => {
                warn!(
                    "Failed to post notice on {}#{}: {}",
                    repo.full_name(),
                    issue_number,
                    e
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_repository, MockTracker};

    fn templates() -> Templates {
        Templates::new("iotas", "https://thetangle.org/")
    }

    #[test]
    fn test_registered_links_pool_address_twice() {
        let text = templates().registered("POOLADDRESS");
        assert_eq!(text.matches("POOLADDRESS").count(), 2);
        assert!(text.contains("https://thetangle.org/address/POOLADDRESS"));
        assert!(text.contains("release bounty to @<bounty_receiver_name>"));
    }

    #[test]
    fn test_release_and_sent_texts() {
        let t = templates();
        assert!(t
            .released(1000, "bob")
            .starts_with("The bounty of 1000 iotas has been released.\n@bob please post"));
        assert!(t.receiver_updated(5, "carol").contains("updated to carol"));
        assert_eq!(
            t.sent("bob", 1000, "BUNDLE"),
            "Hey @bob, the bounty of 1000 iotas has been sent off. Bundle: [BUNDLE](https://thetangle.org/bundle/BUNDLE).\n"
        );
        assert!(t.transfer_failed("boom").ends_with("Error message: boom"));
    }

    #[tokio::test]
    async fn test_failed_post_is_swallowed() {
        let tracker = MockTracker::new();
        let repo = sample_repository(1, "acme", "widgets");
        let notifier = Notifier::new(Arc::new(tracker.clone()), templates());

        assert!(notifier.post(&repo, 42, "hello").await);
        tracker.fail_comments(true);
        assert!(!notifier.post(&repo, 42, "again").await);

        let comments = tracker.comments();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].body, "hello");
    }
}
