//! Inbound GitHub webhook events
//!
//! Only the fields the platform acts on are decoded. The event kind comes from
//! the `X-GitHub-Event` header; anything other than the four known kinds is
//! rejected at the edge.

use serde::Deserialize;
use thiserror::Error;

pub const EVENT_HEADER: &str = "X-GitHub-Event";

#[derive(Debug, Error)]
pub enum EventError {
    #[error("unsupported event type: {0}")]
    Unsupported(String),

    #[error("malformed {event} payload: {source}")]
    Malformed {
        event: &'static str,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventUser {
    pub id: i64,
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventOwner {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventRepository {
    pub id: i64,
    pub name: String,
    pub owner: EventOwner,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventIssue {
    pub id: i64,
    pub number: u32,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventComment {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentAction {
    Created,
    Edited,
    Deleted,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueCommentEvent {
    pub action: CommentAction,
    pub sender: EventUser,
    pub issue: EventIssue,
    pub comment: EventComment,
    pub repository: EventRepository,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssuesEvent {
    pub action: String,
    pub issue: EventIssue,
    pub repository: EventRepository,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PingEvent {
    #[serde(default)]
    pub zen: Option<String>,
    #[serde(default)]
    pub hook_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetaEvent {
    pub action: String,
    #[serde(default)]
    pub hook_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    Ping(PingEvent),
    Meta(MetaEvent),
    Issues(IssuesEvent),
    IssueComment(IssueCommentEvent),
}

impl WebhookEvent {
    pub fn parse(event_type: &str, body: &[u8]) -> Result<Self, EventError> {
        fn decode<'a, T: Deserialize<'a>>(
            event: &'static str,
            body: &'a [u8],
        ) -> Result<T, EventError> {
            serde_json::from_slice(body).map_err(|source| EventError::Malformed { event, source })
        }

        match event_type.trim() {
            "ping" => decode("ping", body).map(WebhookEvent::Ping),
            "meta" => decode("meta", body).map(WebhookEvent::Meta),
            "issues" => decode("issues", body).map(WebhookEvent::Issues),
            "issue_comment" => decode("issue_comment", body).map(WebhookEvent::IssueComment),
            other => Err(EventError::Unsupported(other.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WebhookEvent::Ping(_) => "ping",
            WebhookEvent::Meta(_) => "meta",
            WebhookEvent::Issues(_) => "issues",
            WebhookEvent::IssueComment(_) => "issue_comment",
        }
    }
}

#[cfg(test)]
pub(crate) fn comment_payload(
    action: &str,
    sender: (i64, &str),
    repository: (i64, &str, &str),
    issue: (i64, u32),
    body: &str,
) -> serde_json::Value {
    serde_json::json!({
        "action": action,
        "sender": {"id": sender.0, "login": sender.1},
        "issue": {"id": issue.0, "number": issue.1, "title": "an issue"},
        "comment": {"id": 1, "body": body},
        "repository": {"id": repository.0, "name": repository.2, "owner": {"login": repository.1}}
    })
}
