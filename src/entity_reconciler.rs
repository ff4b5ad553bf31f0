// Licensed under the MIT License.

//! The Entity Reconciler (§4.3): applies reference-side repository
//! changes to `Resource` and `Entity` rows.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{error, warn};
use rayon::prelude::*;
use rusqlite::Connection;

use crate::checkout::Checkout;
use crate::db::queries;
use crate::errors::Result;
use crate::models::{Entity, EntityId, Locale, Project, Resource, ResourceFormat};
use crate::parser::{ParsedResource, ParsedTranslation, ResourceParser};
use crate::path_resolver::PathResolver;

/// The conventional source-locale code used when asking a
/// [`ResourceParser`] to parse a reference file.
const SOURCE_LOCALE_CODE: &str = "en-US";

/// Resource paths touched by one reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct EntityReconcileReport {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

fn strip_pot(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    if let Some(stripped) = normalized.strip_suffix(".pot") {
        format!("{stripped}.po")
    } else {
        normalized
    }
}

/// §4.3: map one parsed string to an `Entity`, not yet assigned an id or
/// a resource.
fn entity_from_source(now: DateTime<Utc>, index: usize, tx: &ParsedTranslation) -> Entity {
    Entity {
        id: EntityId(0),
        resource_id: crate::models::ResourceId(0),
        string: tx.source_string.clone(),
        string_plural: tx.source_string_plural.clone(),
        key: tx.key.clone(),
        comment: tx.comments.join("\n"),
        source: tx.source.clone(),
        group_comment: tx
            .group_comments
            .as_ref()
            .map(|v| v.join("\n"))
            .unwrap_or_default(),
        resource_comment: tx
            .resource_comments
            .as_ref()
            .map(|v| v.join("\n"))
            .unwrap_or_default(),
        context: tx.context.clone(),
        order: tx.order.unwrap_or(index as i64),
        obsolete: false,
        date_obsoleted: None,
        date_created: now,
    }
}

/// Build the `identity_key -> Entity` map for one parsed resource,
/// collapsing duplicate identity keys last-write-wins (§9, Open
/// Question resolution) with a visible `warn!` on collision.
fn next_entities_by_identity(
    dbpath: &str,
    parsed: &ParsedResource,
    now: DateTime<Utc>,
) -> HashMap<String, Entity> {
    let mut next = HashMap::new();
    for (index, tx) in parsed.translations.iter().enumerate() {
        let entity = entity_from_source(now, index, tx);
        let key = entity.identity_key().to_string();
        if next.insert(key.clone(), entity).is_some() {
            warn!("duplicate entity identity `{key}` in resource `{dbpath}`; keeping the last occurrence");
        }
    }
    next
}

/// Apply reference-side changes for one project (§4.3).
pub fn reconcile_entities(
    conn: &mut Connection,
    project: &Project,
    ref_checkout: &Checkout,
    resolver: &dyn PathResolver,
    locales: &[Locale],
    parser: &(dyn ResourceParser + Sync),
    now: DateTime<Utc>,
) -> Result<EntityReconcileReport> {
    // --- Parse phase (outside the transaction). Each reference file is
    // independent, so parse them in parallel.
    let parsed: Vec<(String, Option<ParsedResource>)> = ref_checkout
        .changed
        .par_iter()
        .map(|path| {
            let db_path = strip_pot(path);
            let abs_path = ref_checkout.path.join(path);
            match parser.parse(&abs_path, None, Some(SOURCE_LOCALE_CODE)) {
                Ok(parsed) => (db_path, Some(parsed)),
                Err(e) => {
                    error!("failed to parse reference resource `{}`: {e}", abs_path.display());
                    (db_path, None)
                }
            }
        })
        .collect();

    let mut updates: HashMap<String, Option<ParsedResource>> = HashMap::new();
    for (db_path, parsed) in parsed {
        updates.insert(db_path, parsed);
    }

    let tx = conn.transaction()?;
    let mut report = EntityReconcileReport::default();

    // --- Remove phase ---
    let removed_db_paths: Vec<String> = ref_checkout.removed.iter().map(|p| strip_pot(p)).collect();
    report.removed = queries::delete_resources_by_paths(&tx, project.id, &removed_db_paths)?;

    // Only resources that actually parsed take part in update/add (§7:
    // a parse failure is "equivalent to no change for this resource").
    let live_paths: Vec<String> = updates
        .iter()
        .filter(|(_, v)| v.is_some())
        .map(|(k, _)| k.clone())
        .collect();

    let existing = queries::find_resources_by_paths(&tx, project.id, &live_paths)?;
    let existing_by_path: HashMap<String, Resource> =
        existing.into_iter().map(|r| (r.path.clone(), r)).collect();

    // --- Update phase ---
    for db_path in &live_paths {
        let resource = match existing_by_path.get(db_path) {
            Some(r) => r,
            None => continue,
        };
        let parsed = updates.get(db_path).unwrap().as_ref().unwrap();

        queries::bulk_update_total_strings(&tx, &[(resource.id, parsed.entity_count() as i64)])?;

        let prev_rows = queries::list_non_obsolete_entities_with_path(&tx, &[resource.id])?;
        let prev: HashMap<String, Entity> = prev_rows
            .into_iter()
            .map(|(_, e)| (e.identity_key().to_string(), e))
            .collect();

        let mut next = next_entities_by_identity(db_path, parsed, now);
        for entity in next.values_mut() {
            entity.resource_id = resource.id;
        }

        let obsolete_ids: Vec<EntityId> = prev
            .iter()
            .filter(|(k, _)| !next.contains_key(*k))
            .map(|(_, e)| e.id)
            .collect();
        if !obsolete_ids.is_empty() {
            queries::bulk_mark_obsolete(&tx, &obsolete_ids, now)?;
        }

        for (key, next_entity) in &next {
            match prev.get(key) {
                Some(prev_entity) => {
                    if !prev_entity.same_content(next_entity) {
                        queries::update_entity_content(&tx, prev_entity.id, next_entity)?;
                    }
                }
                None => {
                    queries::insert_entity(&tx, next_entity)?;
                }
            }
        }

        report.changed.push(db_path.clone());
    }

    // --- Add phase ---
    let new_paths: Vec<String> = live_paths
        .iter()
        .filter(|p| !existing_by_path.contains_key(*p))
        .cloned()
        .collect();

    if !new_paths.is_empty() {
        let mut new_resource_ids = Vec::new();
        for db_path in &new_paths {
            let parsed = updates.get(db_path).unwrap().as_ref().unwrap();
            let resource_id = queries::insert_resource(
                &tx,
                project.id,
                db_path,
                ResourceFormat::from_path(db_path),
                parsed.entity_count() as i64,
            )?;
            new_resource_ids.push((resource_id, db_path.clone()));
        }

        let ordered = queries::all_resources_ordered_by_path(&tx, project.id)?;
        let order_updates: Vec<(crate::models::ResourceId, i64)> = ordered
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i as i64))
            .collect();
        queries::bulk_update_order(&tx, &order_updates)?;

        for (resource_id, db_path) in &new_resource_ids {
            let parsed = updates.get(db_path).unwrap().as_ref().unwrap();
            for (index, tx_item) in parsed.translations.iter().enumerate() {
                let mut entity = entity_from_source(now, index, tx_item);
                entity.resource_id = *resource_id;
                queries::insert_entity(&tx, &entity)?;
            }

            let format = ResourceFormat::from_path(db_path);
            let target_locales = resolver.target_locales(db_path);
            for locale in locales {
                if !target_locales.contains(&locale.code) {
                    continue;
                }
                let seed = if format.is_bilingual() {
                    resolver
                        .target_path(db_path, &locale.code)
                        .map(|p| p.exists())
                        .unwrap_or(false)
                } else {
                    true
                };
                if seed {
                    queries::insert_translated_resource(&tx, *resource_id, locale.id, 0)?;
                }
            }

            report.added.push(db_path.clone());
        }
    }

    tx.commit()?;
    Ok(report)
}
