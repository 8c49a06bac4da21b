//! Local storage for tracked repositories and bounties
//!
//! Live records sit in `repositories` / `bounties`. Deleting a record moves a
//! tagged copy into `deleted_repositories` / `deleted_bounties`, keyed by its own
//! autoincrement id so the same repository or issue may be archived repeatedly.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::address::Seed;
use crate::error::StorageError;
use crate::models::{
    Archived, ArchivedRecord, Bounty, BountyId, BountyState, Repository, RepositoryId, UserId,
};

pub type Result<T> = std::result::Result<T, StorageError>;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY,
    owner TEXT NOT NULL,
    name TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE COLLATE NOCASE,
    description TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT,
    UNIQUE(owner, name)
);

CREATE TABLE IF NOT EXISTS bounties (
    id INTEGER PRIMARY KEY,
    issue_number INTEGER NOT NULL,
    repository_id INTEGER NOT NULL,
    receiver_id INTEGER NOT NULL DEFAULT 0,
    seed TEXT NOT NULL,
    pool_address TEXT NOT NULL,
    receiver_address TEXT NOT NULL DEFAULT '',
    bundle_hash TEXT NOT NULL DEFAULT '',
    balance INTEGER NOT NULL DEFAULT 0,
    url TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT '',
    state INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT,
    UNIQUE(repository_id, issue_number)
);

CREATE INDEX IF NOT EXISTS idx_bounties_repository ON bounties(repository_id);

CREATE TABLE IF NOT EXISTS deleted_repositories (
    archive_id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id INTEGER NOT NULL,
    record TEXT NOT NULL,
    archived_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS deleted_bounties (
    archive_id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id INTEGER NOT NULL,
    record TEXT NOT NULL,
    archived_at TEXT NOT NULL
);
"#;

const REPOSITORY_COLUMNS: &str = "id, owner, name, url, description, created_at, updated_at";

const BOUNTY_COLUMNS: &str = "id, issue_number, repository_id, receiver_id, seed, pool_address, \
     receiver_address, bundle_hash, balance, url, title, body, state, created_at, updated_at";

pub struct BountyStorage {
    conn: Mutex<Connection>,
}

impl BountyStorage {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(SCHEMA)?;

        let applied: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = ?1)",
            params![SCHEMA_VERSION],
            |row| row.get(0),
        )?;
        if !applied {
            conn.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                params![SCHEMA_VERSION, Utc::now().to_rfc3339()],
            )?;
            info!("Applied storage schema version {}", SCHEMA_VERSION);
        }
        Ok(())
    }

    // ========================================================================
    // REPOSITORIES
    // ========================================================================

    pub fn insert_repository(&self, repo: &Repository) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO repositories (id, owner, name, url, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                repo.id,
                repo.owner,
                repo.name,
                repo.url,
                repo.description,
                repo.created_at.to_rfc3339(),
                repo.updated_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get_repository(&self, id: RepositoryId) -> Result<Option<Repository>> {
        let conn = self.conn.lock();
        let repo = conn
            .query_row(
                &format!("SELECT {} FROM repositories WHERE id = ?1", REPOSITORY_COLUMNS),
                params![id],
                repository_from_row,
            )
            .optional()?;
        Ok(repo)
    }

    pub fn get_repository_by_owner_name(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Repository>> {
        let conn = self.conn.lock();
        let repo = conn
            .query_row(
                &format!(
                    "SELECT {} FROM repositories WHERE owner = ?1 AND name = ?2",
                    REPOSITORY_COLUMNS
                ),
                params![owner, name],
                repository_from_row,
            )
            .optional()?;
        Ok(repo)
    }

    pub fn list_repositories(&self) -> Result<Vec<Repository>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM repositories ORDER BY id",
            REPOSITORY_COLUMNS
        ))?;
        let repos = stmt
            .query_map([], repository_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(repos)
    }

    pub fn update_repository(
        &self,
        id: RepositoryId,
        owner: &str,
        name: &str,
        url: &str,
        description: &str,
    ) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE repositories SET owner = ?2, name = ?3, url = ?4, description = ?5, updated_at = ?6
             WHERE id = ?1",
            params![id, owner, name, url, description, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                table: "repositories",
                id,
            });
        }
        Ok(())
    }

    /// Removes the repository and archives it. Bounties are not touched.
    pub fn delete_repository(&self, id: RepositoryId) -> Result<Repository> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let repo = tx
            .query_row(
                &format!("SELECT {} FROM repositories WHERE id = ?1", REPOSITORY_COLUMNS),
                params![id],
                repository_from_row,
            )
            .optional()?
            .ok_or(StorageError::NotFound {
                table: "repositories",
                id,
            })?;

        let deleted = tx.execute("DELETE FROM repositories WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StorageError::NotFound {
                table: "repositories",
                id,
            });
        }

        let record = serde_json::to_string(&ArchivedRecord::Repository(repo.clone()))?;
        tx.execute(
            "INSERT INTO deleted_repositories (record_id, record, archived_at) VALUES (?1, ?2, ?3)",
            params![id, record, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;

        Ok(repo)
    }

    pub fn archived_repositories(&self) -> Result<Vec<Archived>> {
        self.list_archive("deleted_repositories")
    }

    // ========================================================================
    // BOUNTIES
    // ========================================================================

    pub fn insert_bounty(&self, bounty: &Bounty) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO bounties ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                BOUNTY_COLUMNS
            ),
            params![
                bounty.id,
                bounty.issue_number,
                bounty.repository_id,
                bounty.receiver_id,
                bounty.seed.expose(),
                bounty.pool_address,
                bounty.receiver_address,
                bounty.bundle_hash,
                bounty.balance as i64,
                bounty.url,
                bounty.title,
                bounty.body,
                bounty.state.as_i64(),
                bounty.created_at.to_rfc3339(),
                bounty.updated_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get_bounty(&self, id: BountyId) -> Result<Option<Bounty>> {
        let conn = self.conn.lock();
        let bounty = conn
            .query_row(
                &format!("SELECT {} FROM bounties WHERE id = ?1", BOUNTY_COLUMNS),
                params![id],
                bounty_from_row,
            )
            .optional()?;
        Ok(bounty)
    }

    pub fn get_bounty_by_issue(
        &self,
        repository_id: RepositoryId,
        issue_number: u32,
    ) -> Result<Option<Bounty>> {
        let conn = self.conn.lock();
        let bounty = conn
            .query_row(
                &format!(
                    "SELECT {} FROM bounties WHERE repository_id = ?1 AND issue_number = ?2",
                    BOUNTY_COLUMNS
                ),
                params![repository_id, issue_number],
                bounty_from_row,
            )
            .optional()?;
        Ok(bounty)
    }

    pub fn list_bounties(&self) -> Result<Vec<Bounty>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM bounties ORDER BY id", BOUNTY_COLUMNS))?;
        let bounties = stmt
            .query_map([], bounty_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(bounties)
    }

    pub fn list_bounties_of_repository(&self, repository_id: RepositoryId) -> Result<Vec<Bounty>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bounties WHERE repository_id = ?1 ORDER BY issue_number",
            BOUNTY_COLUMNS
        ))?;
        let bounties = stmt
            .query_map(params![repository_id], bounty_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(bounties)
    }

    /// Refreshes the mirrored issue fields.
    pub fn update_bounty_issue(&self, id: BountyId, title: &str, body: &str, url: &str) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE bounties SET title = ?2, body = ?3, url = ?4, updated_at = ?5 WHERE id = ?1",
            params![id, title, body, url, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                table: "bounties",
                id,
            });
        }
        Ok(())
    }

    /// Returns false if the bounty is missing or already transferred.
    pub fn update_bounty_balance(&self, id: BountyId, balance: u64) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE bounties SET balance = ?2, updated_at = ?3 WHERE id = ?1 AND state != ?4",
            params![
                id,
                balance as i64,
                Utc::now().to_rfc3339(),
                BountyState::Transferred.as_i64()
            ],
        )?;
        Ok(changed > 0)
    }

    /// Open/Released -> Released. Returns false if the guard didn't match.
    pub fn release_bounty(&self, id: BountyId, receiver_id: UserId, balance: u64) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE bounties SET state = ?2, receiver_id = ?3, balance = ?4, updated_at = ?5
             WHERE id = ?1 AND state IN (?6, ?7)",
            params![
                id,
                BountyState::Released.as_i64(),
                receiver_id,
                balance as i64,
                Utc::now().to_rfc3339(),
                BountyState::Open.as_i64(),
                BountyState::Released.as_i64(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Released -> Transferred. Returns false if the guard didn't match.
    pub fn transfer_bounty(
        &self,
        id: BountyId,
        receiver_address: &str,
        bundle_hash: &str,
        balance: u64,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE bounties SET state = ?2, receiver_address = ?3, bundle_hash = ?4, balance = ?5, updated_at = ?6
             WHERE id = ?1 AND state = ?7",
            params![
                id,
                BountyState::Transferred.as_i64(),
                receiver_address,
                bundle_hash,
                balance as i64,
                Utc::now().to_rfc3339(),
                BountyState::Released.as_i64(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Makes every later transition to Transferred abort, as a full disk would.
    #[cfg(test)]
    pub(crate) fn fail_transfers(&self) {
        let sql = format!(
            "CREATE TRIGGER fail_transfers BEFORE UPDATE OF state ON bounties
             WHEN NEW.state = {} BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            BountyState::Transferred.as_i64()
        );
        self.conn.lock().execute_batch(&sql).unwrap();
    }

    #[cfg(test)]
    pub(crate) fn fail_deletes_of(&self, id: BountyId) {
        let sql = format!(
            "CREATE TRIGGER fail_delete_{id} BEFORE DELETE ON bounties
             WHEN OLD.id = {id} BEGIN SELECT RAISE(ABORT, 'database is locked'); END;"
        );
        self.conn.lock().execute_batch(&sql).unwrap();
    }

    /// Removes the bounty and archives it, whatever its state.
    pub fn delete_bounty(&self, id: BountyId) -> Result<Bounty> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let bounty = tx
            .query_row(
                &format!("SELECT {} FROM bounties WHERE id = ?1", BOUNTY_COLUMNS),
                params![id],
                bounty_from_row,
            )
            .optional()?
            .ok_or(StorageError::NotFound {
                table: "bounties",
                id,
            })?;

        let deleted = tx.execute("DELETE FROM bounties WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StorageError::NotFound {
                table: "bounties",
                id,
            });
        }

        let record = serde_json::to_string(&ArchivedRecord::Bounty(bounty.clone()))?;
        tx.execute(
            "INSERT INTO deleted_bounties (record_id, record, archived_at) VALUES (?1, ?2, ?3)",
            params![id, record, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;

        Ok(bounty)
    }

    pub fn archived_bounties(&self) -> Result<Vec<Archived>> {
        self.list_archive("deleted_bounties")
    }

    fn list_archive(&self, table: &str) -> Result<Vec<Archived>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT archive_id, record, archived_at FROM {} ORDER BY archive_id",
            table
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    parse_time(row, 2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(archive_id, record, archived_at)| -> Result<Archived> {
                Ok(Archived {
                    archive_id,
                    archived_at,
                    record: serde_json::from_str(&record)?,
                })
            })
            .collect()
    }
}

fn conversion_error(idx: usize, ty: rusqlite::types::Type, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(StorageError::Corrupt(msg)))
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, rusqlite::types::Type::Text, e.to_string()))
}

fn parse_optional_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => parse_time(row, idx).map(Some),
        None => Ok(None),
    }
}

fn repository_from_row(row: &Row<'_>) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        description: row.get(4)?,
        created_at: parse_time(row, 5)?,
        updated_at: parse_optional_time(row, 6)?,
    })
}

fn bounty_from_row(row: &Row<'_>) -> rusqlite::Result<Bounty> {
    let seed: String = row.get(4)?;
    let seed = Seed::from_trytes(seed).ok_or_else(|| {
        conversion_error(4, rusqlite::types::Type::Text, "malformed seed".to_string())
    })?;
    let state: i64 = row.get(12)?;
    let state = BountyState::from_i64(state).ok_or_else(|| {
        conversion_error(
            12,
            rusqlite::types::Type::Integer,
            format!("unknown bounty state {}", state),
        )
    })?;

    Ok(Bounty {
        id: row.get(0)?,
        issue_number: row.get(1)?,
        repository_id: row.get(2)?,
        receiver_id: row.get(3)?,
        seed,
        pool_address: row.get(5)?,
        receiver_address: row.get(6)?,
        bundle_hash: row.get(7)?,
        balance: row.get::<_, i64>(8)? as u64,
        url: row.get(9)?,
        title: row.get(10)?,
        body: row.get(11)?,
        state,
        created_at: parse_time(row, 13)?,
        updated_at: parse_optional_time(row, 14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_bounty, sample_repository};

    #[test]
    fn test_repository_crud() {
        let storage = BountyStorage::in_memory().unwrap();
        let repo = sample_repository(1, "acme", "widgets");
        storage.insert_repository(&repo).unwrap();

        assert_eq!(storage.get_repository(1).unwrap(), Some(repo.clone()));
        assert_eq!(
            storage
                .get_repository_by_owner_name("acme", "widgets")
                .unwrap()
                .map(|r| r.id),
            Some(1)
        );
        assert!(storage.get_repository(2).unwrap().is_none());

        storage
            .update_repository(1, "acme", "gadgets", "https://github.com/acme/gadgets", "new")
            .unwrap();
        let updated = storage.get_repository(1).unwrap().unwrap();
        assert_eq!(updated.name, "gadgets");
        assert_eq!(updated.description, "new");
        assert!(updated.updated_at.is_some());
    }

    #[test]
    fn test_repository_uniqueness() {
        let storage = BountyStorage::in_memory().unwrap();
        storage
            .insert_repository(&sample_repository(1, "acme", "widgets"))
            .unwrap();
        // same owner/name (and url) under a different id
        assert!(storage
            .insert_repository(&sample_repository(2, "acme", "widgets"))
            .is_err());
        storage
            .insert_repository(&sample_repository(3, "acme", "gadgets"))
            .unwrap();
        assert_eq!(storage.list_repositories().unwrap().len(), 2);
    }

    #[test]
    fn test_bounty_lookup_by_issue() {
        let storage = BountyStorage::in_memory().unwrap();
        storage
            .insert_repository(&sample_repository(1, "acme", "widgets"))
            .unwrap();
        let bounty = sample_bounty(100, 1, 42);
        storage.insert_bounty(&bounty).unwrap();

        assert_eq!(storage.get_bounty(100).unwrap(), Some(bounty));
        assert_eq!(
            storage.get_bounty_by_issue(1, 42).unwrap().map(|b| b.id),
            Some(100)
        );
        assert!(storage.get_bounty_by_issue(1, 43).unwrap().is_none());
        // issue numbers are unique per repository
        assert!(storage.insert_bounty(&sample_bounty(101, 1, 42)).is_err());
    }

    #[test]
    fn test_guarded_transitions() {
        let storage = BountyStorage::in_memory().unwrap();
        storage.insert_bounty(&sample_bounty(100, 1, 42)).unwrap();

        // Open -> Transferred is refused
        assert!(!storage.transfer_bounty(100, "ADDR", "BUNDLE", 5).unwrap());

        assert!(storage.release_bounty(100, 7, 10).unwrap());
        assert!(storage.release_bounty(100, 8, 12).unwrap());
        let released = storage.get_bounty(100).unwrap().unwrap();
        assert_eq!(released.state, BountyState::Released);
        assert_eq!(released.receiver_id, 8);
        assert_eq!(released.balance, 12);

        assert!(storage.transfer_bounty(100, "ADDR", "BUNDLE", 12).unwrap());
        let transferred = storage.get_bounty(100).unwrap().unwrap();
        assert_eq!(transferred.state, BountyState::Transferred);
        assert_eq!(transferred.bundle_hash, "BUNDLE");

        // terminal: no release, no second transfer, balance frozen
        assert!(!storage.release_bounty(100, 9, 0).unwrap());
        assert!(!storage.transfer_bounty(100, "OTHER", "B2", 1).unwrap());
        assert!(!storage.update_bounty_balance(100, 999).unwrap());
        let frozen = storage.get_bounty(100).unwrap().unwrap();
        assert_eq!(frozen.balance, 12);
        assert_eq!(frozen.receiver_id, 8);
    }

    #[test]
    fn test_delete_archives_record() {
        let storage = BountyStorage::in_memory().unwrap();
        storage.insert_bounty(&sample_bounty(100, 1, 42)).unwrap();

        let deleted = storage.delete_bounty(100).unwrap();
        assert_eq!(deleted.id, 100);
        assert!(storage.get_bounty(100).unwrap().is_none());

        let archived = storage.archived_bounties().unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].record, ArchivedRecord::Bounty(deleted));

        // the same issue can be registered and archived again
        storage.insert_bounty(&sample_bounty(100, 1, 42)).unwrap();
        storage.delete_bounty(100).unwrap();
        assert_eq!(storage.archived_bounties().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_missing_record_skips_archive() {
        let storage = BountyStorage::in_memory().unwrap();
        let err = storage.delete_bounty(5).unwrap_err();
        assert!(matches!(err, StorageError::NotFound { id: 5, .. }));
        assert!(storage.archived_bounties().unwrap().is_empty());

        assert!(storage.delete_repository(5).is_err());
        assert!(storage.archived_repositories().unwrap().is_empty());
    }
}
