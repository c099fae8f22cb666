//! Whitelist store - phone numbers allowed to send commands
//!
//! A single SQLite table keyed by a random id, with the normalized phone
//! number unique across the table.

use crate::config::Config;
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

const SCHEMA_VERSION: i32 = 2;

/// Normalized numbers accepted for manual entry
static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9]{3,15}$").expect("Invalid phone regex"));

/// A whitelisted sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub id: String,
    pub phone_number: String,
    pub name: String,
}

impl WhitelistEntry {
    /// New entry with a fresh id and a normalized number
    pub fn new(phone_number: &str, name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            phone_number: normalize_number(phone_number),
            name: name.trim().to_string(),
        }
    }
}

/// SQLite-backed whitelist
pub struct WhitelistStore {
    db_path: PathBuf,
}

impl WhitelistStore {
    /// Open the store, creating or migrating the table as needed
    pub fn open(config: &Config) -> Result<Self> {
        if let Some(parent) = config.whitelist_db.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            db_path: config.whitelist_db.clone(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn open_db(&self) -> Result<Connection> {
        Ok(Connection::open(&self.db_path)?)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.open_db()?;
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        let table_exists = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'whitelist'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .is_some();

        if !table_exists {
            conn.execute_batch(
                r#"
                CREATE TABLE whitelist (
                    id TEXT PRIMARY KEY,
                    phone_number TEXT UNIQUE,
                    name TEXT
                );
                "#,
            )?;
        } else if version < SCHEMA_VERSION && !has_name_column(&conn)? {
            info!("Migrating whitelist schema from version {}", version);
            conn.execute_batch("ALTER TABLE whitelist ADD COLUMN name TEXT DEFAULT ''")?;
        }

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// Insert an entry. Duplicate numbers are rejected.
    pub fn insert(&self, entry: &WhitelistEntry) -> Result<()> {
        let conn = self.open_db()?;
        let result = conn.execute(
            "INSERT INTO whitelist (id, phone_number, name) VALUES (?1, ?2, ?3)",
            params![entry.id, entry.phone_number, entry.name],
        );

        match result {
            Ok(_) => {
                debug!("Whitelisted {}", entry.phone_number);
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(Error::DuplicateNumber(entry.phone_number.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Manual entry: validate, normalize and insert
    pub fn add(&self, phone_number: &str, name: &str) -> Result<WhitelistEntry> {
        let entry = WhitelistEntry::new(phone_number, name);
        if !is_valid_number(&entry.phone_number) {
            return Err(Error::InvalidPhoneNumber(phone_number.to_string()));
        }
        self.insert(&entry)?;
        Ok(entry)
    }

    /// Contact import: numbers straight from an address book are normalized
    /// but not length-checked
    pub fn import_contact(&self, name: &str, raw_number: &str) -> Result<WhitelistEntry> {
        let entry = WhitelistEntry::new(raw_number, name);
        if entry.phone_number.trim_start_matches('+').is_empty() {
            return Err(Error::InvalidPhoneNumber(raw_number.to_string()));
        }
        self.insert(&entry)?;
        Ok(entry)
    }

    /// Delete by id. Returns whether a row was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.open_db()?;
        let removed = conn.execute("DELETE FROM whitelist WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    pub fn list_all(&self) -> Result<Vec<WhitelistEntry>> {
        let conn = self.open_db()?;
        let mut stmt =
            conn.prepare("SELECT id, phone_number, name FROM whitelist ORDER BY rowid ASC")?;

        let entries = stmt
            .query_map([], |row| {
                Ok(WhitelistEntry {
                    id: row.get(0)?,
                    phone_number: row.get(1)?,
                    name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Membership check on an already-normalized number
    pub fn exists(&self, normalized_number: &str) -> Result<bool> {
        let conn = self.open_db()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM whitelist WHERE phone_number = ?1 LIMIT 1",
                [normalized_number],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn find_by_number(&self, raw_number: &str) -> Result<Option<WhitelistEntry>> {
        let normalized = normalize_number(raw_number);
        let conn = self.open_db()?;
        let entry = conn
            .query_row(
                "SELECT id, phone_number, name FROM whitelist WHERE phone_number = ?1",
                [normalized],
                |row| {
                    Ok(WhitelistEntry {
                        id: row.get(0)?,
                        phone_number: row.get(1)?,
                        name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }
}

fn has_name_column(conn: &Connection) -> Result<bool> {
    let mut stmt = conn.prepare("PRAGMA table_info(whitelist)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns.iter().any(|c| c == "name"))
}

/// Keep digits, and a `+` only when it is the first character
pub fn normalize_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut normalized = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        normalized.push('+');
    }
    normalized.extend(trimmed.chars().filter(|c| c.is_ascii_digit()));
    normalized
}

pub fn is_valid_number(normalized: &str) -> bool {
    PHONE_PATTERN.is_match(normalized)
}
