// Licensed under the MIT License.

//! Top-level orchestration (§2, §4.6): the glue that calls the
//! Checkout Manager, Path Resolver, Entity Reconciler, and Translation
//! Reconciler in order for one project, mirroring `sync_project.py`
//! minus the scheduling/notification concerns that remain a caller's
//! responsibility (§1).

use chrono::{DateTime, Utc};
use log::info;
use rusqlite::Connection;

use crate::checkout::{self, Checkout};
use crate::db::queries;
use crate::entity_reconciler::{self, EntityReconcileReport};
use crate::errors::{Error, Result};
use crate::models::Project;
use crate::parser::ResourceParser;
use crate::path_resolver::{self, ResolvedPaths};
use crate::translation_reconciler::{self, TranslationReconcileReport};
use crate::vcs::VersionControl;

/// What changed in one project sync, for a caller to act on (e.g. to
/// fire notifications) without this crate depending on a notification
/// sink.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub added_resources: Vec<String>,
    pub changed_resources: Vec<String>,
    pub removed_resources: Vec<String>,
    pub translations_approved: usize,
    pub translations_created: usize,
    pub translations_rejected: usize,
}

impl SyncReport {
    fn new(entities: EntityReconcileReport, translations: TranslationReconcileReport) -> Self {
        SyncReport {
            added_resources: entities.added,
            changed_resources: entities.changed,
            removed_resources: entities.removed,
            translations_approved: translations.approved,
            translations_created: translations.created,
            translations_rejected: translations.rejected,
        }
    }
}

/// Run one full reconciliation pass for `project`.
///
/// `pull` controls whether the Checkout Manager fetches from each
/// repository's remote before computing deltas (tests typically pass
/// `false` against a pre-populated working copy). `now` is captured once
/// by the caller and threaded into every timestamp column written during
/// this sync (§5, "ordering guarantees").
pub fn sync_project(
    conn: &mut Connection,
    project: &Project,
    pull: bool,
    vcs: &dyn VersionControl,
    parser: &(dyn ResourceParser + Sync),
    now: DateTime<Utc>,
) -> Result<SyncReport> {
    info!("starting sync for project `{}`", project.slug);

    if queries::list_repositories_for_project(conn, project.id)?.is_empty() {
        return Err(Error::NoRepositories(project.slug.clone()));
    }

    let locales = queries::list_locales_for_project(conn, project.id)?;
    let checkouts: Vec<Checkout> = checkout::get_checkouts(conn, project, pull, vcs)?;

    let ResolvedPaths {
        resolver,
        ref_checkout,
    } = path_resolver::get_paths(project, &checkouts)?;

    let entity_report = entity_reconciler::reconcile_entities(
        conn,
        project,
        &ref_checkout,
        resolver.as_ref(),
        &locales,
        parser,
        now,
    )?;

    let translation_report = translation_reconciler::reconcile_translations(
        conn,
        project,
        &locales,
        &checkouts,
        &ref_checkout,
        resolver.as_ref(),
        parser,
        now,
    )?;

    info!(
        "finished sync for project `{}`: {} added, {} changed, {} removed resources; \
         {} translations approved, {} created, {} rejected",
        project.slug,
        entity_report.added.len(),
        entity_report.changed.len(),
        entity_report.removed.len(),
        translation_report.approved,
        translation_report.created,
        translation_report.rejected,
    );

    Ok(SyncReport::new(entity_report, translation_report))
}
