// Licensed under the MIT License.

//! The on-disk schema for the reconciliation database.
//!
//! One table per §3 entity. Cascades (`ON DELETE CASCADE`) express the
//! ownership relationships spelled out there: a `Resource` owns its
//! `Entity` rows and `TranslatedResource` rows, an `Entity` owns its
//! `Translation` rows.

use rusqlite::Connection;

use crate::errors::Result;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id       INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS projects (
    id                 INTEGER PRIMARY KEY,
    slug               TEXT NOT NULL UNIQUE,
    configuration_file TEXT,
    checkout_path      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS repositories (
    id                     INTEGER PRIMARY KEY,
    project_id             INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    kind                   TEXT NOT NULL,
    url                    TEXT NOT NULL,
    branch                 TEXT NOT NULL,
    checkout_path          TEXT NOT NULL,
    source_repo            INTEGER NOT NULL,
    last_synced_revisions  TEXT
);

CREATE TABLE IF NOT EXISTS locales (
    id         INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    code       TEXT NOT NULL,
    UNIQUE(project_id, code)
);

CREATE TABLE IF NOT EXISTS resources (
    id            INTEGER PRIMARY KEY,
    project_id    INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    path          TEXT NOT NULL,
    format        TEXT NOT NULL,
    total_strings INTEGER NOT NULL,
    ord           INTEGER NOT NULL,
    UNIQUE(project_id, path)
);

CREATE TABLE IF NOT EXISTS entities (
    id               INTEGER PRIMARY KEY,
    resource_id      INTEGER NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
    string           TEXT NOT NULL,
    string_plural    TEXT,
    key              TEXT NOT NULL,
    comment          TEXT NOT NULL,
    source           TEXT NOT NULL,
    group_comment    TEXT NOT NULL,
    resource_comment TEXT NOT NULL,
    context          TEXT NOT NULL,
    ord              INTEGER NOT NULL,
    obsolete         INTEGER NOT NULL DEFAULT 0,
    date_obsoleted   TEXT,
    date_created     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS entities_resource_idx ON entities(resource_id);

CREATE TABLE IF NOT EXISTS translations (
    id               INTEGER PRIMARY KEY,
    entity_id        INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    locale_id        INTEGER NOT NULL REFERENCES locales(id) ON DELETE CASCADE,
    string           TEXT NOT NULL,
    plural_form      INTEGER,
    active           INTEGER NOT NULL DEFAULT 0,
    approved         INTEGER NOT NULL DEFAULT 0,
    approved_user    INTEGER REFERENCES users(id),
    approved_date    TEXT,
    unapproved_user  INTEGER REFERENCES users(id),
    unapproved_date  TEXT,
    pretranslated    INTEGER NOT NULL DEFAULT 0,
    fuzzy            INTEGER NOT NULL DEFAULT 0,
    rejected         INTEGER NOT NULL DEFAULT 0,
    rejected_user    INTEGER REFERENCES users(id),
    rejected_date    TEXT,
    unrejected_user  INTEGER REFERENCES users(id),
    unrejected_date  TEXT,
    date             TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS translations_entity_locale_idx ON translations(entity_id, locale_id);

CREATE TABLE IF NOT EXISTS translated_resources (
    id            INTEGER PRIMARY KEY,
    resource_id   INTEGER NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
    locale_id     INTEGER NOT NULL REFERENCES locales(id) ON DELETE CASCADE,
    total_strings INTEGER NOT NULL,
    UNIQUE(resource_id, locale_id)
);

CREATE TABLE IF NOT EXISTS changed_entity_locale (
    id        INTEGER PRIMARY KEY,
    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    locale_id INTEGER NOT NULL REFERENCES locales(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS action_log (
    id             INTEGER PRIMARY KEY,
    action_type    TEXT NOT NULL,
    performed_by   INTEGER NOT NULL REFERENCES users(id),
    translation_id INTEGER NOT NULL,
    created_at     TEXT NOT NULL
);
"#;

/// Create every table if it doesn't already exist, and turn on foreign
/// key enforcement (off by default in sqlite).
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
