//! Relational schema for the metadata store.
//!
//! One `secrets` row per stored secret carries the shared header (path,
//! timestamps, attribution, custom metadata, wrapped data key); each secret
//! type owns a child table holding its payload columns. Deleting a `secrets`
//! row cascades to its typed child. For binaries only the terminal record is
//! kept here, since chunk payloads live in object storage.

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Full schema, applied on a fresh database.
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    login         TEXT PRIMARY KEY,
    password_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS secrets (
    secret_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    path               TEXT NOT NULL,
    created_at         TEXT NOT NULL,
    modified_at        TEXT NOT NULL,
    custom_metadata    TEXT NOT NULL DEFAULT '{}',
    encrypted_data_key BLOB NOT NULL,
    created_by         TEXT NOT NULL,
    modified_by        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS logins (
    login_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    secret_id INTEGER NOT NULL REFERENCES secrets(secret_id) ON DELETE CASCADE,
    login     TEXT NOT NULL,
    password  BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS cards (
    card_id         INTEGER PRIMARY KEY AUTOINCREMENT,
    secret_id       INTEGER NOT NULL REFERENCES secrets(secret_id) ON DELETE CASCADE,
    cardholder_name TEXT NOT NULL,
    number          BLOB NOT NULL,
    expiry_month    INTEGER NOT NULL,
    expiry_year     INTEGER NOT NULL,
    cvc             BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS notes (
    note_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    secret_id INTEGER NOT NULL REFERENCES secrets(secret_id) ON DELETE CASCADE,
    text      BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS binaries (
    binary_id INTEGER PRIMARY KEY AUTOINCREMENT,
    secret_id INTEGER NOT NULL REFERENCES secrets(secret_id) ON DELETE CASCADE,
    chunks    INTEGER NOT NULL,
    hash      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_secrets_path ON secrets(path);
CREATE INDEX IF NOT EXISTS idx_logins_secret ON logins(secret_id);
CREATE INDEX IF NOT EXISTS idx_cards_secret ON cards(secret_id);
CREATE INDEX IF NOT EXISTS idx_notes_secret ON notes(secret_id);
CREATE INDEX IF NOT EXISTS idx_binaries_secret ON binaries(secret_id);
"#;
