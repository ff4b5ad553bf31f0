// Licensed under the MIT License.

//! A small demonstration/ops CLI driving the `tmsync` reconciliation
//! engine. Heavily reduced from the teacher's multi-command `structopt`
//! CLI down to the one operation this engine actually performs: sync one
//! project's database against its configured repositories.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use chrono::Utc;
use structopt::StructOpt;

use tmsync::config::ConfigurationFile;
use tmsync::db;
use tmsync::models::Project;
use tmsync::parser::PoParser;
use tmsync::vcs::Git2VersionControl;

mod logger;

#[derive(Debug, StructOpt)]
#[structopt(about = "diff-driven translation database reconciliation engine")]
struct TmsyncOptions {
    #[structopt(subcommand)]
    command: Commands,
}

trait Command {
    fn execute(self) -> Result<i32>;
}

#[derive(Debug, StructOpt)]
enum Commands {
    #[structopt(name = "sync")]
    /// Reconcile one project's database against its repositories
    Sync(SyncCommand),
}

#[derive(Debug, StructOpt)]
struct SyncCommand {
    /// Path to the project's tmsync.toml
    #[structopt(long, default_value = "tmsync.toml")]
    config: PathBuf,

    /// Path to the sqlite database file
    #[structopt(long, default_value = "tmsync.db")]
    database: PathBuf,

    /// Fetch from each repository's remote before computing deltas
    #[structopt(long)]
    pull: bool,
}

/// Bootstrap (or reload) the `Project`/`Repository`/`Locale` rows a
/// `tmsync.toml` describes. Sync itself never creates these — they are
/// assumed to already exist in a real deployment's database — but the
/// demo CLI has nowhere else to get them from.
fn ensure_project(conn: &rusqlite::Connection, cfg: &ConfigurationFile) -> Result<Project> {
    use tmsync::db::queries;

    let existing_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM projects WHERE slug = ?1",
            rusqlite::params![cfg.project.slug],
            |row| row.get(0),
        )
        .ok();

    let project_id = match existing_id {
        Some(id) => tmsync::models::ProjectId(id),
        None => queries::insert_project(
            conn,
            &cfg.project.slug,
            cfg.project.configuration_file.as_deref(),
            &cfg.project.checkout_path,
        )?,
    };

    for repo in &cfg.repositories {
        let already: Option<i64> = conn
            .query_row(
                "SELECT id FROM repositories WHERE project_id = ?1 AND url = ?2",
                rusqlite::params![project_id.0, repo.url],
                |row| row.get(0),
            )
            .ok();
        if already.is_none() {
            queries::insert_repository(
                conn,
                project_id,
                &repo.url,
                &repo.branch,
                &repo.checkout_path,
                repo.source_repo,
                None,
            )?;
        }
    }

    for code in &cfg.locales {
        let already: Option<i64> = conn
            .query_row(
                "SELECT id FROM locales WHERE project_id = ?1 AND code = ?2",
                rusqlite::params![project_id.0, code],
                |row| row.get(0),
            )
            .ok();
        if already.is_none() {
            queries::insert_locale(conn, project_id, code)?;
        }
    }

    queries::get_project(conn, project_id)
        .map_err(|e| anyhow::anyhow!("failed to reload project after bootstrap: {e}"))
}

impl Command for SyncCommand {
    fn execute(self) -> Result<i32> {
        let cfg = ConfigurationFile::get(&self.config)
            .with_context(|| format!("failed to read `{}`", self.config.display()))?;

        let mut conn = db::open(&self.database).map_err(|e| {
            anyhow::anyhow!("failed to open database `{}`: {e}", self.database.display())
        })?;

        let project = ensure_project(&conn, &cfg)?;

        let vcs = Git2VersionControl::new();
        let parser = PoParser::new();
        let now = Utc::now();

        let report = tmsync::sync_project(&mut conn, &project, self.pull, &vcs, &parser, now)
            .map_err(|e| anyhow::anyhow!("sync failed: {e}"))?;

        logger::Logger::println_highlighted(
            "tmsync: ",
            project.slug.clone(),
            format!(
                " — {} added, {} changed, {} removed resources; {} translations approved, \
                 {} created, {} rejected",
                report.added_resources.len(),
                report.changed_resources.len(),
                report.removed_resources.len(),
                report.translations_approved,
                report.translations_created,
                report.translations_rejected,
            ),
        );

        Ok(0)
    }
}

fn main() {
    log::set_max_level(log::LevelFilter::Info);
    if logger::Logger::init().is_err() {
        eprintln!("warning: could not install logger");
    }

    let opts = TmsyncOptions::from_args();
    let result = match opts.command {
        Commands::Sync(cmd) => cmd.execute(),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            logger::Logger::print_cause(e.root_cause());
            logger::Logger::print_err_note(format!("{e}"));
            process::exit(1)
        }
    }
}
