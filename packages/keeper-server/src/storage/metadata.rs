//! # Metadata Store
//!
//! SQLite persistence for secret metadata, typed payload rows, and the user
//! registry. The connection sits behind a mutex and every write runs inside a
//! transaction: the `secrets` header row and its typed child commit together
//! or roll back together.
//!
//! Get, list, and delete are scoped to the owning user. Path uniqueness is
//! enforced per secret type at insert time: the same path may exist as both
//! a login and a note, but not twice as a login.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use keeper_core::error::{Error, Result};
use keeper_core::model::{Binary, Card, Login, Note, SecretKind, SecretMetadata};

use super::schema;

/// Lock-wait bound for the underlying SQLite handle.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn db_err(err: rusqlite::Error) -> Error {
    Error::Database(err.to_string())
}

/// Handle to the relational store.
pub struct MetadataStore {
    conn: Arc<Mutex<Connection>>,
}

impl MetadataStore {
    /// Open (or create) the database at `dsn`. `":memory:"` yields an
    /// ephemeral database, used by tests.
    pub fn open(dsn: &str) -> Result<Self> {
        let conn = if dsn == ":memory:" {
            Connection::open_in_memory().map_err(db_err)?
        } else {
            Connection::open(dsn).map_err(db_err)?
        };

        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(db_err)?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES).map_err(db_err)?;
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(db_err)?;
                tracing::info!(version = schema::SCHEMA_VERSION, "database schema created");
            }
            Some(v) => {
                tracing::debug!(version = v, "database schema present");
            }
        }

        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────────────────

    pub fn create_user(&self, login: &str, password_hash: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (login, password_hash) VALUES (?1, ?2)",
            params![login, password_hash],
        )
        .map_err(|e| match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => Error::UserExists(login.to_string()),
            _ => db_err(e),
        })?;

        tracing::info!(login, "user created");
        Ok(())
    }

    pub fn user_exists(&self, login: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE login = ?1",
                params![login],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    pub fn password_hash(&self, login: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT password_hash FROM users WHERE login = ?1",
            params![login],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)
    }

    // ── Create ────────────────────────────────────────────────────────────

    pub fn insert_login(&self, login: &mut Login) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        let secret_id = insert_secret(&tx, SecretKind::Login, &login.meta)?;
        tx.execute(
            "INSERT INTO logins (secret_id, login, password) VALUES (?1, ?2, ?3)",
            params![secret_id, login.login, login.password],
        )
        .map_err(db_err)?;
        let login_id = tx.last_insert_rowid();

        tx.commit().map_err(db_err)?;
        login.meta.secret_id = secret_id;
        login.login_id = login_id;
        Ok(())
    }

    pub fn insert_card(&self, card: &mut Card) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        let secret_id = insert_secret(&tx, SecretKind::Card, &card.meta)?;
        tx.execute(
            "INSERT INTO cards (secret_id, cardholder_name, number, expiry_month, expiry_year, cvc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                secret_id,
                card.cardholder_name,
                card.number,
                card.expiry_month,
                card.expiry_year,
                card.cvc
            ],
        )
        .map_err(db_err)?;
        let card_id = tx.last_insert_rowid();

        tx.commit().map_err(db_err)?;
        card.meta.secret_id = secret_id;
        card.card_id = card_id;
        Ok(())
    }

    pub fn insert_note(&self, note: &mut Note) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        let secret_id = insert_secret(&tx, SecretKind::Note, &note.meta)?;
        tx.execute(
            "INSERT INTO notes (secret_id, text) VALUES (?1, ?2)",
            params![secret_id, note.text],
        )
        .map_err(db_err)?;
        let note_id = tx.last_insert_rowid();

        tx.commit().map_err(db_err)?;
        note.meta.secret_id = secret_id;
        note.note_id = note_id;
        Ok(())
    }

    /// Insert the terminal metadata record of an uploaded binary.
    pub fn insert_binary(&self, binary: &mut Binary) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        let secret_id = insert_secret(&tx, SecretKind::Binary, &binary.meta)?;
        tx.execute(
            "INSERT INTO binaries (secret_id, chunks, hash) VALUES (?1, ?2, ?3)",
            params![secret_id, binary.chunks, binary.hash],
        )
        .map_err(db_err)?;
        let binary_id = tx.last_insert_rowid();

        tx.commit().map_err(db_err)?;
        binary.meta.secret_id = secret_id;
        binary.binary_id = binary_id;
        Ok(())
    }

    // ── Retrieve ──────────────────────────────────────────────────────────

    pub fn load_login(&self, login: &mut Login, owner: &str) -> Result<()> {
        let conn = self.conn.lock();
        let path = login.meta.path.clone();
        conn.query_row(
            "SELECT s.secret_id, s.created_at, s.modified_at, s.created_by, s.modified_by,
                    s.custom_metadata, s.encrypted_data_key, l.login_id, l.login, l.password
             FROM logins l
             INNER JOIN secrets s ON l.secret_id = s.secret_id
             WHERE s.path = ?1 AND s.created_by = ?2",
            params![path, owner],
            |row| {
                fill_metadata(&mut login.meta, row)?;
                login.login_id = row.get(7)?;
                login.login = row.get(8)?;
                login.password = row.get(9)?;
                Ok(())
            },
        )
        .map_err(|e| not_found_or(e, &path))
    }

    pub fn load_card(&self, card: &mut Card, owner: &str) -> Result<()> {
        let conn = self.conn.lock();
        let path = card.meta.path.clone();
        conn.query_row(
            "SELECT s.secret_id, s.created_at, s.modified_at, s.created_by, s.modified_by,
                    s.custom_metadata, s.encrypted_data_key, c.card_id, c.cardholder_name,
                    c.number, c.expiry_month, c.expiry_year, c.cvc
             FROM cards c
             INNER JOIN secrets s ON c.secret_id = s.secret_id
             WHERE s.path = ?1 AND s.created_by = ?2",
            params![path, owner],
            |row| {
                fill_metadata(&mut card.meta, row)?;
                card.card_id = row.get(7)?;
                card.cardholder_name = row.get(8)?;
                card.number = row.get(9)?;
                card.expiry_month = row.get(10)?;
                card.expiry_year = row.get(11)?;
                card.cvc = row.get(12)?;
                Ok(())
            },
        )
        .map_err(|e| not_found_or(e, &path))
    }

    pub fn load_note(&self, note: &mut Note, owner: &str) -> Result<()> {
        let conn = self.conn.lock();
        let path = note.meta.path.clone();
        conn.query_row(
            "SELECT s.secret_id, s.created_at, s.modified_at, s.created_by, s.modified_by,
                    s.custom_metadata, s.encrypted_data_key, n.note_id, n.text
             FROM notes n
             INNER JOIN secrets s ON n.secret_id = s.secret_id
             WHERE s.path = ?1 AND s.created_by = ?2",
            params![path, owner],
            |row| {
                fill_metadata(&mut note.meta, row)?;
                note.note_id = row.get(7)?;
                note.text = row.get(8)?;
                Ok(())
            },
        )
        .map_err(|e| not_found_or(e, &path))
    }

    /// Load the terminal record of a binary: chunk count, whole-file hash,
    /// and the data key shared by all of its chunks.
    pub fn load_binary(&self, binary: &mut Binary, owner: &str) -> Result<()> {
        let conn = self.conn.lock();
        let path = binary.meta.path.clone();
        conn.query_row(
            "SELECT s.secret_id, s.created_at, s.modified_at, s.created_by, s.modified_by,
                    s.custom_metadata, s.encrypted_data_key, b.binary_id, b.chunks, b.hash
             FROM binaries b
             INNER JOIN secrets s ON b.secret_id = s.secret_id
             WHERE s.path = ?1 AND s.created_by = ?2",
            params![path, owner],
            |row| {
                fill_metadata(&mut binary.meta, row)?;
                binary.binary_id = row.get(7)?;
                binary.chunks = row.get(8)?;
                binary.hash = row.get(9)?;
                Ok(())
            },
        )
        .map_err(|e| not_found_or(e, &path))
    }

    // ── List / Delete ─────────────────────────────────────────────────────

    pub fn list_paths(&self, kind: SecretKind, owner: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT s.path FROM {table} t
             INNER JOIN secrets s ON t.secret_id = s.secret_id
             WHERE s.created_by = ?1
             ORDER BY s.path",
            table = typed_table(kind)
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![owner], |row| row.get::<_, String>(0))
            .map_err(db_err)?;

        let mut paths = Vec::new();
        for row in rows {
            paths.push(row.map_err(db_err)?);
        }
        Ok(paths)
    }

    /// Delete the secret of `kind` at `path`; the typed child row goes with
    /// it via the cascade.
    pub fn delete_secret(&self, kind: SecretKind, path: &str, owner: &str) -> Result<()> {
        let conn = self.conn.lock();
        let sql = format!(
            "DELETE FROM secrets
             WHERE path = ?1 AND created_by = ?2
               AND secret_id IN (SELECT secret_id FROM {table})",
            table = typed_table(kind)
        );

        let affected = conn.execute(&sql, params![path, owner]).map_err(db_err)?;
        if affected == 0 {
            return Err(Error::SecretNotFound(path.to_string()));
        }
        Ok(())
    }

    /// Whether any user owns a binary at `path`. Used by the orphan reaper,
    /// which sweeps across owners.
    pub fn binary_exists(&self, path: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM binaries b
                 INNER JOIN secrets s ON b.secret_id = s.secret_id
                 WHERE s.path = ?1",
                params![path],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }
}

/// Table owning the typed payload rows for `kind`.
fn typed_table(kind: SecretKind) -> &'static str {
    match kind {
        SecretKind::Login => "logins",
        SecretKind::Card => "cards",
        SecretKind::Note => "notes",
        SecretKind::Binary => "binaries",
    }
}

/// Insert the shared `secrets` header row, enforcing per-type path
/// uniqueness first. Runs inside the caller's transaction.
fn insert_secret(tx: &Transaction<'_>, kind: SecretKind, meta: &SecretMetadata) -> Result<i64> {
    let exists_sql = format!(
        "SELECT COUNT(*) FROM {table} t
         INNER JOIN secrets s ON t.secret_id = s.secret_id
         WHERE s.path = ?1",
        table = typed_table(kind)
    );
    let count: i64 = tx
        .query_row(&exists_sql, params![meta.path], |row| row.get(0))
        .map_err(db_err)?;
    if count > 0 {
        return Err(Error::SecretExists(meta.path.clone()));
    }

    let custom_meta = serde_json::to_string(&meta.custom_meta)?;
    tx.execute(
        "INSERT INTO secrets (path, created_at, modified_at, custom_metadata,
                              encrypted_data_key, created_by, modified_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            meta.path,
            meta.created_at.to_rfc3339(),
            meta.modified_at.to_rfc3339(),
            custom_meta,
            meta.encrypted_data_key,
            meta.created_by,
            meta.modified_by
        ],
    )
    .map_err(db_err)?;

    Ok(tx.last_insert_rowid())
}

/// Copy the shared header columns (0..=6 of every load query) into `meta`.
fn fill_metadata(meta: &mut SecretMetadata, row: &rusqlite::Row<'_>) -> rusqlite::Result<()> {
    meta.secret_id = row.get(0)?;
    meta.created_at = parse_timestamp(row.get::<_, String>(1)?);
    meta.modified_at = parse_timestamp(row.get::<_, String>(2)?);
    meta.created_by = row.get(3)?;
    meta.modified_by = row.get(4)?;
    meta.custom_meta = serde_json::from_str::<HashMap<String, String>>(&row.get::<_, String>(5)?)
        .unwrap_or_default();
    meta.encrypted_data_key = row.get(6)?;
    Ok(())
}

fn parse_timestamp(raw: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn not_found_or(err: rusqlite::Error, path: &str) -> Error {
    match err {
        rusqlite::Error::QueryReturnedNoRows => Error::SecretNotFound(path.to_string()),
        other => db_err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_core::model::SecretMetadata;

    fn store() -> MetadataStore {
        MetadataStore::open(":memory:").unwrap()
    }

    fn meta(path: &str, owner: &str) -> SecretMetadata {
        SecretMetadata::new(path)
            .with_owner(owner)
            .with_data_key(vec![1, 2, 3])
    }

    #[test]
    fn test_user_registry() {
        let store = store();
        assert!(!store.user_exists("mark").unwrap());
        store.create_user("mark", "hash").unwrap();
        assert!(store.user_exists("mark").unwrap());
        assert_eq!(store.password_hash("mark").unwrap().as_deref(), Some("hash"));
        assert_eq!(store.password_hash("nobody").unwrap(), None);

        assert!(matches!(
            store.create_user("mark", "hash2"),
            Err(Error::UserExists(_))
        ));
    }

    #[test]
    fn test_login_round_trip() {
        let store = store();
        let mut login = Login::new(meta("login0", "mark")).with_credentials("leo", b"ciphertext".to_vec());
        store.insert_login(&mut login).unwrap();
        assert!(login.meta.secret_id > 0);
        assert!(login.login_id > 0);

        let mut loaded = Login::new(SecretMetadata::new("login0"));
        store.load_login(&mut loaded, "mark").unwrap();
        assert_eq!(loaded.login, "leo");
        assert_eq!(loaded.password, b"ciphertext");
        assert_eq!(loaded.meta.encrypted_data_key, vec![1, 2, 3]);
        assert_eq!(loaded.meta.created_by, "mark");
        assert!(loaded.meta.modified_at >= loaded.meta.created_at);
    }

    #[test]
    fn test_owner_scoping() {
        let store = store();
        let mut login = Login::new(meta("login0", "mark")).with_credentials("leo", b"x".to_vec());
        store.insert_login(&mut login).unwrap();

        let mut other = Login::new(SecretMetadata::new("login0"));
        assert!(matches!(
            store.load_login(&mut other, "eve"),
            Err(Error::SecretNotFound(_))
        ));
        assert!(store.list_paths(SecretKind::Login, "eve").unwrap().is_empty());
        assert!(matches!(
            store.delete_secret(SecretKind::Login, "login0", "eve"),
            Err(Error::SecretNotFound(_))
        ));
    }

    #[test]
    fn test_path_unique_per_type_not_across_types() {
        let store = store();
        let mut login = Login::new(meta("shared", "mark")).with_credentials("leo", b"x".to_vec());
        store.insert_login(&mut login).unwrap();

        // Same path as a note is fine.
        let mut note = Note::new(meta("shared", "mark")).with_text(b"ct".to_vec());
        store.insert_note(&mut note).unwrap();

        // Same path as a second login is not.
        let mut dup = Login::new(meta("shared", "mark")).with_credentials("leo", b"x".to_vec());
        assert!(matches!(
            store.insert_login(&mut dup),
            Err(Error::SecretExists(_))
        ));
    }

    #[test]
    fn test_card_round_trip() {
        let store = store();
        let mut card = Card::new(meta("card0", "mark"))
            .with_holder("Leo Tolstoy")
            .with_number(b"ct-number".to_vec())
            .with_expiry(8, 2030)
            .with_cvc(b"ct-cvc".to_vec());
        store.insert_card(&mut card).unwrap();

        let mut loaded = Card::new(SecretMetadata::new("card0"));
        store.load_card(&mut loaded, "mark").unwrap();
        assert_eq!(loaded.cardholder_name, "Leo Tolstoy");
        assert_eq!(loaded.number, b"ct-number");
        assert_eq!(loaded.expiry_month, 8);
        assert_eq!(loaded.expiry_year, 2030);
        assert_eq!(loaded.cvc, b"ct-cvc");
    }

    #[test]
    fn test_binary_terminal_record() {
        let store = store();
        let mut binary = Binary::new(meta("file.bin", "mark")).with_summary(3, "feedface");
        store.insert_binary(&mut binary).unwrap();

        assert!(store.binary_exists("file.bin").unwrap());
        assert!(!store.binary_exists("other.bin").unwrap());

        let mut loaded = Binary::new(SecretMetadata::new("file.bin"));
        store.load_binary(&mut loaded, "mark").unwrap();
        assert_eq!(loaded.chunks, 3);
        assert_eq!(loaded.hash, "feedface");
        assert_eq!(loaded.meta.encrypted_data_key, vec![1, 2, 3]);
    }

    #[test]
    fn test_list_and_delete() {
        let store = store();
        let mut a = Note::new(meta("note-a", "mark")).with_text(b"x".to_vec());
        let mut b = Note::new(meta("note-b", "mark")).with_text(b"y".to_vec());
        store.insert_note(&mut a).unwrap();
        store.insert_note(&mut b).unwrap();

        assert_eq!(
            store.list_paths(SecretKind::Note, "mark").unwrap(),
            vec!["note-a".to_string(), "note-b".to_string()]
        );

        store.delete_secret(SecretKind::Note, "note-a", "mark").unwrap();
        assert_eq!(
            store.list_paths(SecretKind::Note, "mark").unwrap(),
            vec!["note-b".to_string()]
        );

        // Cascade removed the typed row as well: reloading fails.
        let mut gone = Note::new(SecretMetadata::new("note-a"));
        assert!(matches!(
            store.load_note(&mut gone, "mark"),
            Err(Error::SecretNotFound(_))
        ));
    }
}
