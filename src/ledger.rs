//! Ledger account capability
//!
//! An account is addressed by its secret seed. Every operation opens a session,
//! does one thing and closes the session again, so nothing stays open across the
//! reconciliation interval or between webhook events.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::address::{
    is_trytes, pad_tag, verify_address_with_checksum, Seed, ADDRESS_LENGTH,
    ADDRESS_WITH_CHECKSUM_LENGTH,
};
use crate::error::LedgerError;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Send-mode sessions get a promoter attached on the account service side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Receive,
    Send,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub address: String,
    pub amount: u64,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransfer {
    pub bundle_hash: String,
    pub amount: u64,
}

#[async_trait]
pub trait LedgerAccounts: Send + Sync {
    async fn open(&self, seed: &Seed, mode: SessionMode) -> Result<Box<dyn AccountSession>>;
}

#[async_trait]
pub trait AccountSession: Send {
    async fn allocate_deposit_address(&mut self, expires_at: Option<DateTime<Utc>>)
        -> Result<String>;

    async fn available_balance(&mut self) -> Result<u64>;

    async fn send(&mut self, transfer: &Transfer) -> Result<SentTransfer>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Scoped open -> operate -> close wrapper around [`LedgerAccounts`].
#[derive(Clone)]
pub struct LedgerAdapter {
    accounts: Arc<dyn LedgerAccounts>,
}

impl LedgerAdapter {
    pub fn new(accounts: Arc<dyn LedgerAccounts>) -> Self {
        Self { accounts }
    }

    pub async fn allocate_deposit_address(
        &self,
        seed: &Seed,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<String> {
        let mut session = self.accounts.open(seed, SessionMode::Receive).await?;
        let result = session.allocate_deposit_address(expires_at).await;
        finish(session, result).await
    }

    pub async fn available_balance(&self, seed: &Seed) -> Result<u64> {
        let mut session = self.accounts.open(seed, SessionMode::Receive).await?;
        let result = session.available_balance().await;
        finish(session, result).await
    }

    /// Not idempotent: a retry after an ambiguous failure may send twice.
    pub async fn send(
        &self,
        seed: &Seed,
        recipient: &str,
        amount: u64,
        tag: &str,
    ) -> Result<SentTransfer> {
        let transfer = Transfer {
            address: recipient.to_string(),
            amount,
            tag: pad_tag(tag),
        };
        let mut session = self.accounts.open(seed, SessionMode::Send).await?;
        let result = session.send(&transfer).await;
        finish(session, result).await
    }

    /// Sends the whole available balance to `recipient` within a single session.
    /// Returns `None` without sending when the balance is zero.
    pub async fn sweep(
        &self,
        seed: &Seed,
        recipient: &str,
        tag: &str,
    ) -> Result<Option<SentTransfer>> {
        let mut session = self.accounts.open(seed, SessionMode::Send).await?;
        let result = sweep_in(session.as_mut(), recipient, tag).await;
        finish(session, result).await
    }
}

async fn sweep_in(
    session: &mut dyn AccountSession,
    recipient: &str,
    tag: &str,
) -> Result<Option<SentTransfer>> {
    let balance = session.available_balance().await?;
    if balance == 0 {
        return Ok(None);
    }
    let transfer = Transfer {
        address: recipient.to_string(),
        amount: balance,
        tag: pad_tag(tag),
    };
    session.send(&transfer).await.map(Some)
}

/// Closes the session on every path. A close failure never masks the result:
/// the operation itself (a send in particular) already happened.
async fn finish<T>(session: Box<dyn AccountSession>, result: Result<T>) -> Result<T> {
    if let Err(e) = session.close().await {
        warn!("Failed to close ledger session: {}", e);
    }
    result
}

// ============================================================================
// HTTP account service
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpLedgerSettings {
    pub base_url: String,
    pub security_level: u8,
    pub mwm: u8,
    pub depth: u8,
}

pub struct HttpLedgerAccounts {
    client: reqwest::Client,
    settings: HttpLedgerSettings,
}

impl HttpLedgerAccounts {
    pub fn new(settings: HttpLedgerSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings: HttpLedgerSettings {
                base_url: settings.base_url.trim_end_matches('/').to_string(),
                ..settings
            },
        }
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(LedgerError::Service {
        status: status.as_u16(),
        message,
    })
}

/// Accepts a bare 81 tryte address or one carrying a valid checksum.
fn deposit_address(address: String) -> Result<String> {
    let well_formed = match address.len() {
        ADDRESS_LENGTH => is_trytes(&address),
        ADDRESS_WITH_CHECKSUM_LENGTH => verify_address_with_checksum(&address).is_ok(),
        _ => false,
    };
    if !well_formed {
        return Err(LedgerError::Session(format!(
            "account service returned a malformed deposit address '{}'",
            address
        )));
    }
    Ok(address)
}

#[async_trait]
impl LedgerAccounts for HttpLedgerAccounts {
    async fn open(&self, seed: &Seed, mode: SessionMode) -> Result<Box<dyn AccountSession>> {
        #[derive(Serialize)]
        struct OpenAccount<'a> {
            seed: &'a str,
            mode: SessionMode,
            security_level: u8,
            mwm: u8,
            depth: u8,
            promote: bool,
        }
        #[derive(Deserialize)]
        struct OpenedAccount {
            id: String,
        }

        let response = self
            .client
            .post(format!("{}/accounts", self.settings.base_url))
            .json(&OpenAccount {
                seed: seed.expose(),
                mode,
                security_level: self.settings.security_level,
                mwm: self.settings.mwm,
                depth: self.settings.depth,
                promote: mode == SessionMode::Send,
            })
            .send()
            .await?;
        let opened: OpenedAccount = check(response).await?.json().await?;
        debug!("Opened ledger session {} ({:?})", opened.id, mode);

        Ok(Box::new(HttpAccountSession {
            client: self.client.clone(),
            url: format!("{}/accounts/{}", self.settings.base_url, opened.id),
            id: opened.id,
        }))
    }
}

struct HttpAccountSession {
    client: reqwest::Client,
    url: String,
    id: String,
}

#[async_trait]
impl AccountSession for HttpAccountSession {
    async fn allocate_deposit_address(
        &mut self,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<String> {
        #[derive(Serialize)]
        struct Request {
            expires_at: Option<DateTime<Utc>>,
        }
        #[derive(Deserialize)]
        struct Response {
            address: String,
        }

        let response = self
            .client
            .post(format!("{}/deposit-addresses", self.url))
            .json(&Request { expires_at })
            .send()
            .await?;
        let allocated: Response = check(response).await?.json().await?;
        deposit_address(allocated.address)
    }

    async fn available_balance(&mut self) -> Result<u64> {
        #[derive(Deserialize)]
        struct Balance {
            available: u64,
        }

        let response = self
            .client
            .get(format!("{}/balance", self.url))
            .send()
            .await?;
        let balance: Balance = check(response).await?.json().await?;
        Ok(balance.available)
    }

    async fn send(&mut self, transfer: &Transfer) -> Result<SentTransfer> {
        #[derive(Serialize)]
        struct Request<'a> {
            address: &'a str,
            value: u64,
            tag: &'a str,
        }
        #[derive(Deserialize)]
        struct Response {
            bundle_hash: String,
            value: u64,
        }

        let response = self
            .client
            .post(format!("{}/transfers", self.url))
            .json(&Request {
                address: &transfer.address,
                value: transfer.amount,
                tag: &transfer.tag,
            })
            .send()
            .await?;
        let sent: Response = check(response).await?.json().await?;
        Ok(SentTransfer {
            bundle_hash: sent.bundle_hash,
            amount: sent.value,
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let response = self.client.delete(&self.url).send().await?;
        check(response).await?;
        debug!("Closed ledger session {}", self.id);
        Ok(())
    }
}
