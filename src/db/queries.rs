// Licensed under the MIT License.

//! Flat, batched queries against the reconciliation database.
//!
//! Every function here takes explicit ids and returns plain row structs —
//! no lazy attribute fetching, no object-graph traversal (see the
//! "object-graph traversal via lazy attribute fetching" redesign note).
//! Callers join data themselves from the returned flat tuples.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

use crate::errors::Result;
use crate::models::*;

fn row_to_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: ProjectId(row.get(0)?),
        slug: row.get(1)?,
        configuration_file: row.get(2)?,
        checkout_path: row.get(3)?,
    })
}

pub fn get_project(conn: &Connection, id: ProjectId) -> Result<Project> {
    let p = conn.query_row(
        "SELECT id, slug, configuration_file, checkout_path FROM projects WHERE id = ?1",
        params![id.0],
        row_to_project,
    )?;
    Ok(p)
}

pub fn insert_project(
    conn: &Connection,
    slug: &str,
    configuration_file: Option<&str>,
    checkout_path: &str,
) -> Result<ProjectId> {
    conn.execute(
        "INSERT INTO projects (slug, configuration_file, checkout_path) VALUES (?1, ?2, ?3)",
        params![slug, configuration_file, checkout_path],
    )?;
    Ok(ProjectId(conn.last_insert_rowid()))
}

fn row_to_repository(row: &rusqlite::Row) -> rusqlite::Result<Repository> {
    let kind: String = row.get(2)?;
    let source_repo: bool = row.get(6)?;
    let revisions_json: Option<String> = row.get(7)?;
    let last_synced_revisions = revisions_json
        .and_then(|s| serde_json::from_str::<HashMap<String, String>>(&s).ok());
    Ok(Repository {
        id: RepositoryId(row.get(0)?),
        project_id: ProjectId(row.get(1)?),
        kind: match kind.as_str() {
            "git" => VcsKind::Git,
            _ => VcsKind::Git,
        },
        url: row.get(3)?,
        branch: row.get(4)?,
        checkout_path: row.get(5)?,
        source_repo,
        last_synced_revisions,
    })
}

pub fn list_repositories_for_project(
    conn: &Connection,
    project_id: ProjectId,
) -> Result<Vec<Repository>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, kind, url, branch, checkout_path, source_repo, last_synced_revisions \
         FROM repositories WHERE project_id = ?1",
    )?;
    let rows = stmt
        .query_map(params![project_id.0], row_to_repository)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn insert_repository(
    conn: &Connection,
    project_id: ProjectId,
    url: &str,
    branch: &str,
    checkout_path: &str,
    source_repo: bool,
    last_synced_revisions: Option<&HashMap<String, String>>,
) -> Result<RepositoryId> {
    let revisions_json = last_synced_revisions.map(|m| serde_json::to_string(m).unwrap());
    conn.execute(
        "INSERT INTO repositories (project_id, kind, url, branch, checkout_path, source_repo, last_synced_revisions) \
         VALUES (?1, 'git', ?2, ?3, ?4, ?5, ?6)",
        params![project_id.0, url, branch, checkout_path, source_repo, revisions_json],
    )?;
    Ok(RepositoryId(conn.last_insert_rowid()))
}

/// Record the revisions synced this run. The core only ever *reads*
/// `last_synced_revisions` (§6); writing it back is the caller's
/// responsibility once a sync completes successfully. Exposed here for
/// that caller, and for test fixtures.
pub fn set_last_synced_revisions(
    conn: &Connection,
    repo_id: RepositoryId,
    revisions: &HashMap<String, String>,
) -> Result<()> {
    let revisions_json = serde_json::to_string(revisions).unwrap();
    conn.execute(
        "UPDATE repositories SET last_synced_revisions = ?1 WHERE id = ?2",
        params![revisions_json, repo_id.0],
    )?;
    Ok(())
}

fn row_to_locale(row: &rusqlite::Row) -> rusqlite::Result<Locale> {
    Ok(Locale {
        id: LocaleId(row.get(0)?),
        project_id: ProjectId(row.get(1)?),
        code: row.get(2)?,
    })
}

pub fn list_locales_for_project(conn: &Connection, project_id: ProjectId) -> Result<Vec<Locale>> {
    let mut stmt =
        conn.prepare("SELECT id, project_id, code FROM locales WHERE project_id = ?1 ORDER BY code")?;
    let rows = stmt
        .query_map(params![project_id.0], row_to_locale)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn insert_locale(conn: &Connection, project_id: ProjectId, code: &str) -> Result<LocaleId> {
    conn.execute(
        "INSERT INTO locales (project_id, code) VALUES (?1, ?2)",
        params![project_id.0, code],
    )?;
    Ok(LocaleId(conn.last_insert_rowid()))
}

fn row_to_resource(row: &rusqlite::Row) -> rusqlite::Result<Resource> {
    let format: String = row.get(3)?;
    Ok(Resource {
        id: ResourceId(row.get(0)?),
        project_id: ProjectId(row.get(1)?),
        path: row.get(2)?,
        format: format_from_str(&format),
        total_strings: row.get(4)?,
        order: row.get(5)?,
    })
}

fn format_from_str(s: &str) -> ResourceFormat {
    match s {
        "po" => ResourceFormat::Po,
        "xliff" => ResourceFormat::Xliff,
        "xml" => ResourceFormat::AndroidXml,
        "ftl" => ResourceFormat::Ftl,
        "properties" => ResourceFormat::Properties,
        _ => ResourceFormat::Other,
    }
}

pub fn find_resources_by_paths(
    conn: &Connection,
    project_id: ProjectId,
    paths: &[String],
) -> Result<Vec<Resource>> {
    if paths.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = (0..paths.len()).map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT id, project_id, path, format, total_strings, ord FROM resources \
         WHERE project_id = ? AND path IN ({placeholders})"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut bind_params: Vec<&dyn rusqlite::ToSql> = vec![&project_id.0];
    for p in paths {
        bind_params.push(p);
    }
    let rows = stmt
        .query_map(bind_params.as_slice(), row_to_resource)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn find_resource_by_path(
    conn: &Connection,
    project_id: ProjectId,
    path: &str,
) -> Result<Option<Resource>> {
    let r = conn
        .query_row(
            "SELECT id, project_id, path, format, total_strings, ord FROM resources \
             WHERE project_id = ?1 AND path = ?2",
            params![project_id.0, path],
            row_to_resource,
        )
        .optional()?;
    Ok(r)
}

/// Delete resources matching the given (already-normalized) paths,
/// cascading to their entities and translated-resource rows. Returns the
/// paths that were actually found and deleted.
pub fn delete_resources_by_paths(
    conn: &Connection,
    project_id: ProjectId,
    paths: &[String],
) -> Result<Vec<String>> {
    if paths.is_empty() {
        return Ok(Vec::new());
    }
    let found = find_resources_by_paths(conn, project_id, paths)?;
    for r in &found {
        conn.execute("DELETE FROM resources WHERE id = ?1", params![r.id.0])?;
    }
    Ok(found.into_iter().map(|r| r.path).collect())
}

pub fn bulk_update_total_strings(conn: &Connection, updates: &[(ResourceId, i64)]) -> Result<()> {
    for (id, total) in updates {
        conn.execute(
            "UPDATE resources SET total_strings = ?1 WHERE id = ?2",
            params![total, id.0],
        )?;
    }
    Ok(())
}

pub fn insert_resource(
    conn: &Connection,
    project_id: ProjectId,
    path: &str,
    format: ResourceFormat,
    total_strings: i64,
) -> Result<ResourceId> {
    conn.execute(
        "INSERT INTO resources (project_id, path, format, total_strings, ord) VALUES (?1, ?2, ?3, ?4, 0)",
        params![project_id.0, path, format.as_str(), total_strings],
    )?;
    Ok(ResourceId(conn.last_insert_rowid()))
}

/// All resources of a project, in lexicographic `path` order — the
/// ranking used to recompute `Resource.order` (§4.3, "Add phase").
pub fn all_resources_ordered_by_path(
    conn: &Connection,
    project_id: ProjectId,
) -> Result<Vec<ResourceId>> {
    let mut stmt =
        conn.prepare("SELECT id FROM resources WHERE project_id = ?1 ORDER BY path")?;
    let rows = stmt
        .query_map(params![project_id.0], |row| Ok(ResourceId(row.get(0)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn bulk_update_order(conn: &Connection, updates: &[(ResourceId, i64)]) -> Result<()> {
    for (id, order) in updates {
        conn.execute(
            "UPDATE resources SET ord = ?1 WHERE id = ?2",
            params![order, id.0],
        )?;
    }
    Ok(())
}

fn row_to_entity(row: &rusqlite::Row) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: EntityId(row.get("id")?),
        resource_id: ResourceId(row.get("resource_id")?),
        string: row.get("string")?,
        string_plural: row.get("string_plural")?,
        key: row.get("key")?,
        comment: row.get("comment")?,
        source: row.get("source")?,
        group_comment: row.get("group_comment")?,
        resource_comment: row.get("resource_comment")?,
        context: row.get("context")?,
        order: row.get("ord")?,
        obsolete: row.get("obsolete")?,
        date_obsoleted: row.get("date_obsoleted")?,
        date_created: row.get("date_created")?,
    })
}

const ENTITY_COLUMNS: &str = "id, resource_id, string, string_plural, key, comment, source, \
     group_comment, resource_comment, context, ord, obsolete, date_obsoleted, date_created";

pub fn get_entity(conn: &Connection, id: EntityId) -> Result<Entity> {
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1");
    let entity = conn.query_row(&sql, params![id.0], row_to_entity)?;
    Ok(entity)
}

/// Non-obsolete entities belonging to the given resources, paired with
/// their resource's path (so callers can key by `(resource_path,
/// identity_key)` without a second round trip).
pub fn list_non_obsolete_entities_with_path(
    conn: &Connection,
    resource_ids: &[ResourceId],
) -> Result<Vec<(String, Entity)>> {
    if resource_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = (0..resource_ids.len())
        .map(|_| "?")
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT r.path, {cols} FROM entities e JOIN resources r ON r.id = e.resource_id \
         WHERE e.resource_id IN ({placeholders}) AND e.obsolete = 0",
        cols = ENTITY_COLUMNS
            .split(", ")
            .map(|c| format!("e.{c}"))
            .collect::<Vec<_>>()
            .join(", "),
    );
    let mut stmt = conn.prepare(&sql)?;
    let bind_params: Vec<&dyn rusqlite::ToSql> =
        resource_ids.iter().map(|id| &id.0 as &dyn rusqlite::ToSql).collect();
    let rows = stmt
        .query_map(bind_params.as_slice(), |row| {
            let path: String = row.get(0)?;
            // Columns 1.. mirror ENTITY_COLUMNS, offset by the leading path.
            let entity = Entity {
                id: EntityId(row.get(1)?),
                resource_id: ResourceId(row.get(2)?),
                string: row.get(3)?,
                string_plural: row.get(4)?,
                key: row.get(5)?,
                comment: row.get(6)?,
                source: row.get(7)?,
                group_comment: row.get(8)?,
                resource_comment: row.get(9)?,
                context: row.get(10)?,
                order: row.get(11)?,
                obsolete: row.get(12)?,
                date_obsoleted: row.get(13)?,
                date_created: row.get(14)?,
            };
            Ok((path, entity))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn bulk_mark_obsolete(
    conn: &Connection,
    ids: &[EntityId],
    now: DateTime<Utc>,
) -> Result<()> {
    for id in ids {
        conn.execute(
            "UPDATE entities SET obsolete = 1, date_obsoleted = ?1 WHERE id = ?2",
            params![now, id.0],
        )?;
    }
    Ok(())
}

/// Update the content columns of an existing entity row, matched by id —
/// never an insert (see the "update phase" Open Question resolution).
pub fn update_entity_content(conn: &Connection, id: EntityId, ent: &Entity) -> Result<()> {
    conn.execute(
        "UPDATE entities SET string = ?1, string_plural = ?2, comment = ?3, source = ?4, \
         group_comment = ?5, resource_comment = ?6, context = ?7 WHERE id = ?8",
        params![
            ent.string,
            ent.string_plural,
            ent.comment,
            ent.source,
            ent.group_comment,
            ent.resource_comment,
            ent.context,
            id.0,
        ],
    )?;
    Ok(())
}

pub fn insert_entity(conn: &Connection, ent: &Entity) -> Result<EntityId> {
    conn.execute(
        "INSERT INTO entities (resource_id, string, string_plural, key, comment, source, \
         group_comment, resource_comment, context, ord, obsolete, date_obsoleted, date_created) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, NULL, ?11)",
        params![
            ent.resource_id.0,
            ent.string,
            ent.string_plural,
            ent.key,
            ent.comment,
            ent.source,
            ent.group_comment,
            ent.resource_comment,
            ent.context,
            ent.order,
            ent.date_created,
        ],
    )?;
    Ok(EntityId(conn.last_insert_rowid()))
}

/// Resolve an entity by `(resource, key)` or, when no explicit key
/// exists on the row, `(resource, string)` — matching §4.4.2 step 6.
pub fn find_entity_by_identity(
    conn: &Connection,
    resource_id: ResourceId,
    identity_key: &str,
) -> Result<Option<EntityId>> {
    let id = conn
        .query_row(
            "SELECT id FROM entities WHERE resource_id = ?1 AND (key = ?2 OR (key = '' AND string = ?2)) \
             LIMIT 1",
            params![resource_id.0, identity_key],
            |row| Ok(EntityId(row.get(0)?)),
        )
        .optional()?;
    Ok(id)
}

pub fn insert_translated_resource(
    conn: &Connection,
    resource_id: ResourceId,
    locale_id: LocaleId,
    total_strings: i64,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO translated_resources (resource_id, locale_id, total_strings) \
         VALUES (?1, ?2, ?3)",
        params![resource_id.0, locale_id.0, total_strings],
    )?;
    Ok(())
}

pub fn delete_translated_resource(
    conn: &Connection,
    resource_id: ResourceId,
    locale_id: LocaleId,
) -> Result<usize> {
    let n = conn.execute(
        "DELETE FROM translated_resources WHERE resource_id = ?1 AND locale_id = ?2",
        params![resource_id.0, locale_id.0],
    )?;
    Ok(n)
}

fn row_to_translation(row: &rusqlite::Row) -> rusqlite::Result<Translation> {
    Ok(Translation {
        id: TranslationId(row.get("id")?),
        entity_id: EntityId(row.get("entity_id")?),
        locale_id: LocaleId(row.get("locale_id")?),
        string: row.get("string")?,
        plural_form: row.get("plural_form")?,
        active: row.get("active")?,
        approved: row.get("approved")?,
        approved_user: row.get::<_, Option<i64>>("approved_user")?.map(UserId),
        approved_date: row.get("approved_date")?,
        unapproved_user: row.get::<_, Option<i64>>("unapproved_user")?.map(UserId),
        unapproved_date: row.get("unapproved_date")?,
        pretranslated: row.get("pretranslated")?,
        fuzzy: row.get("fuzzy")?,
        rejected: row.get("rejected")?,
        rejected_user: row.get::<_, Option<i64>>("rejected_user")?.map(UserId),
        rejected_date: row.get("rejected_date")?,
        unrejected_user: row.get::<_, Option<i64>>("unrejected_user")?.map(UserId),
        unrejected_date: row.get("unrejected_date")?,
        date: row.get("date")?,
    })
}

const TRANSLATION_COLUMNS: &str = "id, entity_id, locale_id, string, plural_form, active, \
     approved, approved_user, approved_date, unapproved_user, unapproved_date, pretranslated, \
     fuzzy, rejected, rejected_user, rejected_date, unrejected_user, unrejected_date, date";

/// Currently approved-or-pretranslated translations for a `(resource,
/// locale)` pair, flattened with the owning entity's identity key and
/// path — used to strip exact no-op updates (§4.4.2 step 4).
pub fn active_translations_for_resource_locale(
    conn: &Connection,
    resource_id: ResourceId,
    locale_id: LocaleId,
) -> Result<Vec<(String, Option<i64>, String)>> {
    let mut stmt = conn.prepare(
        "SELECT CASE WHEN e.key != '' THEN e.key ELSE e.string END AS identity, \
                t.plural_form, t.string \
         FROM translations t JOIN entities e ON e.id = t.entity_id \
         WHERE e.resource_id = ?1 AND t.locale_id = ?2 AND (t.approved = 1 OR t.pretranslated = 1)",
    )?;
    let rows = stmt
        .query_map(params![resource_id.0, locale_id.0], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// `(resource_path, identity_key, locale_id)` for every
/// `ChangedEntityLocale` row of a project — the database-wins conflict
/// signal of §4.4.2 step 5.
pub fn changed_entity_locale_keys(
    conn: &Connection,
    project_id: ProjectId,
) -> Result<Vec<(String, String, LocaleId)>> {
    let mut stmt = conn.prepare(
        "SELECT r.path, CASE WHEN e.key != '' THEN e.key ELSE e.string END, cel.locale_id \
         FROM changed_entity_locale cel \
         JOIN entities e ON e.id = cel.entity_id \
         JOIN resources r ON r.id = e.resource_id \
         WHERE r.project_id = ?1",
    )?;
    let rows = stmt
        .query_map(params![project_id.0], |row| {
            Ok((row.get(0)?, row.get(1)?, LocaleId(row.get(2)?)))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn find_suggestions(
    conn: &Connection,
    entity_id: EntityId,
    locale_id: LocaleId,
) -> Result<Vec<Translation>> {
    let sql = format!(
        "SELECT {TRANSLATION_COLUMNS} FROM translations \
         WHERE entity_id = ?1 AND locale_id = ?2 AND approved = 0 AND pretranslated = 0"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![entity_id.0, locale_id.0], row_to_translation)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn update_translation(conn: &Connection, tx: &Translation) -> Result<()> {
    conn.execute(
        "UPDATE translations SET string = ?1, plural_form = ?2, active = ?3, approved = ?4, \
         approved_user = ?5, approved_date = ?6, unapproved_user = ?7, unapproved_date = ?8, \
         pretranslated = ?9, fuzzy = ?10, rejected = ?11, rejected_user = ?12, rejected_date = ?13, \
         unrejected_user = ?14, unrejected_date = ?15, date = ?16 WHERE id = ?17",
        params![
            tx.string,
            tx.plural_form,
            tx.active,
            tx.approved,
            tx.approved_user.map(|u| u.0),
            tx.approved_date,
            tx.unapproved_user.map(|u| u.0),
            tx.unapproved_date,
            tx.pretranslated,
            tx.fuzzy,
            tx.rejected,
            tx.rejected_user.map(|u| u.0),
            tx.rejected_date,
            tx.unrejected_user.map(|u| u.0),
            tx.unrejected_date,
            tx.date,
            tx.id.0,
        ],
    )?;
    Ok(())
}

pub fn insert_translation(conn: &Connection, tx: &Translation) -> Result<TranslationId> {
    conn.execute(
        "INSERT INTO translations (entity_id, locale_id, string, plural_form, active, approved, \
         approved_user, approved_date, unapproved_user, unapproved_date, pretranslated, fuzzy, \
         rejected, rejected_user, rejected_date, unrejected_user, unrejected_date, date) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            tx.entity_id.0,
            tx.locale_id.0,
            tx.string,
            tx.plural_form,
            tx.active,
            tx.approved,
            tx.approved_user.map(|u| u.0),
            tx.approved_date,
            tx.unapproved_user.map(|u| u.0),
            tx.unapproved_date,
            tx.pretranslated,
            tx.fuzzy,
            tx.rejected,
            tx.rejected_user.map(|u| u.0),
            tx.rejected_date,
            tx.unrejected_user.map(|u| u.0),
            tx.unrejected_date,
            tx.date,
        ],
    )?;
    Ok(TranslationId(conn.last_insert_rowid()))
}

/// Translations for `(entity, locale, plural_form)` other than
/// `exclude_id`, not yet rejected — the sibling set rejected when a new
/// translation becomes active (§4.4.3 step 3).
pub fn find_rejection_candidates(
    conn: &Connection,
    entity_id: EntityId,
    locale_id: LocaleId,
    plural_form: Option<i64>,
    exclude_id: TranslationId,
) -> Result<Vec<Translation>> {
    let sql = format!(
        "SELECT {TRANSLATION_COLUMNS} FROM translations \
         WHERE entity_id = ?1 AND locale_id = ?2 \
         AND ((plural_form IS NULL AND ?3 IS NULL) OR plural_form = ?3) \
         AND id != ?4 AND rejected = 0"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![entity_id.0, locale_id.0, plural_form, exclude_id.0],
            row_to_translation,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn insert_action_log(conn: &Connection, entry: &ActionLogEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO action_log (action_type, performed_by, translation_id, created_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            entry.action_type.as_str(),
            entry.performed_by.0,
            entry.translation_id.0,
            entry.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_or_create_user(conn: &Connection, username: &str) -> Result<UserId> {
    if let Some(id) = conn
        .query_row(
            "SELECT id FROM users WHERE username = ?1",
            params![username],
            |row| Ok(UserId(row.get(0)?)),
        )
        .optional()?
    {
        return Ok(id);
    }
    conn.execute("INSERT INTO users (username) VALUES (?1)", params![username])?;
    Ok(UserId(conn.last_insert_rowid()))
}

pub fn count_action_log(conn: &Connection, project_id: ProjectId) -> Result<i64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM action_log a \
         JOIN translations t ON t.id = a.translation_id \
         JOIN entities e ON e.id = t.entity_id \
         JOIN resources r ON r.id = e.resource_id \
         WHERE r.project_id = ?1",
        params![project_id.0],
        |row| row.get(0),
    )?;
    Ok(n)
}
