// Licensed under the MIT License.

//! Error handling for the sync engine.
//!
//! Most of the fallible plumbing in this crate is local: a malformed
//! resource must not abort the sync of its siblings (§7 of the design
//! spec), so parse failures are logged and skipped rather than
//! propagated as an `Error` here. What remains are the conditions that
//! really are fatal to a sync: missing directories, VCS failures, and
//! storage errors.

use thiserror::Error;

/// Errors that can abort a project sync outright.
#[derive(Debug, Error)]
pub enum Error {
    /// The project declares a `configuration_file` but no reference
    /// checkout could be identified for it.
    #[error("project `{0}` has a configuration file but no source checkout could be found")]
    MissingSourceDirectory(String),

    /// More than one candidate target repository was found when exactly
    /// one was required, or no base directory could be discovered.
    #[error("could not determine a unique locale directory for project `{0}`")]
    MissingLocaleDirectory(String),

    /// A git2 operation failed.
    #[error("version control error")]
    Vcs(#[from] git2::Error),

    /// A database operation failed.
    #[error("database error")]
    Database(#[from] rusqlite::Error),

    /// A filesystem operation failed.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// The project's path-resolution configuration file could not be
    /// parsed.
    #[error("could not parse configuration file `{path}`")]
    Configuration {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// No repositories are configured for this project at all.
    #[error("project `{0}` has no configured repositories")]
    NoRepositories(String),
}

pub type Result<T> = std::result::Result<T, Error>;
