// Licensed under the MIT License.

//! `tmsync` — the diff-driven reconciliation engine of a translation
//! management platform.
//!
//! Given a project's configured repositories, this crate figures out
//! what changed in version control since the last sync, parses the
//! affected localization resources, and reconciles a relational
//! database of `Resource`/`Entity`/`Translation` rows against them:
//! adding, modifying, and obsoleting entities, and merging target-locale
//! translations with database-wins conflict resolution.
//!
//! [`sync_project`] is the single entry point. Everything upstream of it
//! (the task scheduler, notification dispatch, committing new
//! translations back to version control) is a caller's concern.

pub mod checkout;
pub mod config;
pub mod db;
pub mod entity_reconciler;
pub mod errors;
pub mod models;
pub mod parser;
pub mod path_resolver;
pub mod sync;
pub mod translation_reconciler;
pub mod vcs;

pub use errors::{Error, Result};
pub use sync::{sync_project, SyncReport};
