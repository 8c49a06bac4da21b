//! Issue tracker capability and its GitHub REST implementation
//!
//! The rest of the crate only talks to [`IssueTracker`]; `GitHubClient` is the
//! production implementation. A 404 from GitHub is reported as
//! [`TrackerError::NotFound`] so callers can tell "gone" apart from "broken".

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::TrackerError;

pub const GITHUB_API_BASE: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("bounty-platform/", env!("CARGO_PKG_VERSION"));
const PER_PAGE: usize = 100;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerUser {
    pub id: i64,
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerRepository {
    pub id: i64,
    pub owner: TrackerUser,
    pub name: String,
    pub html_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub has_issues: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerIssue {
    pub id: i64,
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub html_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub pull: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: i64,
    pub login: String,
    #[serde(default)]
    pub permissions: Permissions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_ssl: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hook {
    pub id: i64,
    #[serde(default)]
    pub config: HookConfig,
}

/// Payload for `POST /repos/{owner}/{repo}/hooks`.
#[derive(Debug, Clone, Serialize)]
pub struct NewHook {
    pub name: String,
    pub active: bool,
    pub events: Vec<String>,
    pub config: HookConfig,
}

impl NewHook {
    /// A JSON `issue_comment` hook. `tls` decides whether GitHub verifies the certificate.
    pub fn issue_comments(url: impl Into<String>, tls: bool) -> Self {
        Self {
            name: "web".to_string(),
            active: true,
            events: vec!["issue_comment".to_string()],
            config: HookConfig {
                url: Some(url.into()),
                content_type: Some("json".to_string()),
                insecure_ssl: Some(if tls { "0" } else { "1" }.to_string()),
            },
        }
    }
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// The authenticated account, used as a connectivity check.
    async fn current_user(&self) -> Result<TrackerUser>;

    async fn repository(&self, owner: &str, name: &str) -> Result<TrackerRepository>;

    async fn repository_by_id(&self, id: i64) -> Result<TrackerRepository>;

    async fn issue(&self, owner: &str, name: &str, number: u32) -> Result<TrackerIssue>;

    async fn user(&self, login: &str) -> Result<TrackerUser>;

    async fn collaborators(&self, owner: &str, name: &str) -> Result<Vec<Collaborator>>;

    async fn hooks(&self, owner: &str, name: &str) -> Result<Vec<Hook>>;

    async fn create_hook(&self, owner: &str, name: &str, hook: &NewHook) -> Result<Hook>;

    async fn create_comment(&self, owner: &str, name: &str, number: u32, body: &str)
        -> Result<()>;
}

pub struct GitHubClient {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Self {
        if token.is_some() {
            info!("GitHub client initialized with authentication token");
        } else {
            warn!("GitHub client initialized WITHOUT token - hook and comment calls will fail");
        }
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn build_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.api_base, path);
        let mut req = self
            .client
            .request(method, url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");

        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        req
    }

    async fn check(path: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TrackerError::NotFound(path.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        warn!("GitHub API error {} for {}: {}", status, path, body);
        Err(TrackerError::Status {
            status: status.as_u16(),
            path: path.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!("GET {}", path);
        let response = self.build_request(reqwest::Method::GET, path).send().await?;
        Ok(Self::check(path, response).await?.json().await?)
    }

    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut all = Vec::new();
        let mut page = 1;

        loop {
            let paged = format!("{}?per_page={}&page={}", path, PER_PAGE, page);
            let items: Vec<T> = self.get(&paged).await?;
            let count = items.len();
            all.extend(items);

            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(all)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        debug!("POST {}", path);
        let response = self
            .build_request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await?;
        Ok(Self::check(path, response).await?.json().await?)
    }
}

fn repo_path(owner: &str, name: &str) -> String {
    format!(
        "/repos/{}/{}",
        urlencoding::encode(owner),
        urlencoding::encode(name)
    )
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn current_user(&self) -> Result<TrackerUser> {
        self.get("/user").await
    }

    async fn repository(&self, owner: &str, name: &str) -> Result<TrackerRepository> {
        self.get(&repo_path(owner, name)).await
    }

    async fn repository_by_id(&self, id: i64) -> Result<TrackerRepository> {
        self.get(&format!("/repositories/{}", id)).await
    }

    async fn issue(&self, owner: &str, name: &str, number: u32) -> Result<TrackerIssue> {
        self.get(&format!("{}/issues/{}", repo_path(owner, name), number))
            .await
    }

    async fn user(&self, login: &str) -> Result<TrackerUser> {
        self.get(&format!("/users/{}", urlencoding::encode(login)))
            .await
    }

    async fn collaborators(&self, owner: &str, name: &str) -> Result<Vec<Collaborator>> {
        self.get_all(&format!("{}/collaborators", repo_path(owner, name)))
            .await
    }

    async fn hooks(&self, owner: &str, name: &str) -> Result<Vec<Hook>> {
        self.get_all(&format!("{}/hooks", repo_path(owner, name)))
            .await
    }

    async fn create_hook(&self, owner: &str, name: &str, hook: &NewHook) -> Result<Hook> {
        self.post(&format!("{}/hooks", repo_path(owner, name)), hook)
            .await
    }

    async fn create_comment(
        &self,
        owner: &str,
        name: &str,
        number: u32,
        body: &str,
    ) -> Result<()> {
        #[derive(Serialize)]
        struct NewComment<'a> {
            body: &'a str,
        }
        #[derive(Deserialize)]
        struct CreatedComment {
            id: i64,
        }

        let path = format!("{}/issues/{}/comments", repo_path(owner, name), number);
        let created: CreatedComment = self.post(&path, &NewComment { body }).await?;
        debug!("Posted comment {} on {}/{}#{}", created.id, owner, name, number);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_comment_hook_payload() {
        let hook = NewHook::issue_comments("https://bounty.example.org/webhooks", true);
        let json = serde_json::to_value(&hook).unwrap();
        assert_eq!(json["name"], "web");
        assert_eq!(json["events"][0], "issue_comment");
        assert_eq!(json["config"]["content_type"], "json");
        assert_eq!(json["config"]["insecure_ssl"], "0");

        let plain = NewHook::issue_comments("http://localhost/webhooks", false);
        assert_eq!(plain.config.insecure_ssl.as_deref(), Some("1"));
    }

    #[test]
    fn test_collaborator_without_permissions_is_not_admin() {
        let c: Collaborator = serde_json::from_str(r#"{"id": 3, "login": "eve"}"#).unwrap();
        assert!(!c.permissions.admin);

        let admin: Collaborator = serde_json::from_str(
            r#"{"id": 1, "login": "alice", "permissions": {"admin": true, "push": true, "pull": true}}"#,
        )
        .unwrap();
        assert!(admin.permissions.admin);
    }

    #[test]
    fn test_repository_decodes_github_shape() {
        let repo: TrackerRepository = serde_json::from_str(
            r#"{
                "id": 10,
                "owner": {"id": 5, "login": "acme", "type": "Organization"},
                "name": "widgets",
                "html_url": "https://github.com/acme/widgets",
                "description": null,
                "has_issues": false,
                "private": false
            }"#,
        )
        .unwrap();
        assert_eq!(repo.owner.login, "acme");
        assert!(repo.description.is_none());
        assert!(!repo.has_issues);
    }

    #[test]
    fn test_repo_path_escapes_segments() {
        assert_eq!(repo_path("acme", "widgets"), "/repos/acme/widgets");
        assert_eq!(repo_path("a b", "c/d"), "/repos/a%20b/c%2Fd");
    }
}
