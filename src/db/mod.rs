// Licensed under the MIT License.

//! The persistence backend: a single sqlite database (via `rusqlite`)
//! holding the tables described in §3.
//!
//! This module owns schema migration and raw queries only; reconciler
//! modules call into [`queries`] directly rather than going through a
//! repository-pattern abstraction, since the query shapes differ enough
//! stage to stage that a generic CRUD layer would just be a detour.

pub mod queries;
pub mod schema;

use std::path::Path;

use rusqlite::Connection;

use crate::errors::Result;

/// Open (creating if necessary) the sync database at `path` and ensure
/// its schema is current. Use `":memory:"` for tests.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Open an in-memory database, migrated and ready. Handy for tests and
/// for the demo CLI's `--scratch` mode.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    schema::migrate(&conn)?;
    Ok(conn)
}
