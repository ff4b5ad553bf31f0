// Licensed under the MIT License.

//! The Translation Reconciler (§4.4): merges target-side repository
//! changes into `Translation` rows with conflict arbitration. This is
//! the largest single component — delete-removed-TranslatedResources,
//! compute-updates (no-op stripping, database-wins, entity resolution),
//! then approve/create/reject — matching `sync_translations_from_repo`
//! step for step.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use log::{error, warn};
use rusqlite::Connection;

use crate::checkout::Checkout;
use crate::db::queries;
use crate::errors::Result;
use crate::models::{
    ActionLogEntry, ActionType, EntityId, LocaleId, Project, ResourceFormat, Translation,
    TranslationId, SYNC_USERNAME,
};
use crate::models::Locale;
use crate::parser::ResourceParser;
use crate::path_resolver::PathResolver;

/// Outcome of one translation-reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct TranslationReconcileReport {
    pub approved: usize,
    pub created: usize,
    pub rejected: usize,
}

fn strip_pot(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    if let Some(stripped) = normalized.strip_suffix(".pot") {
        format!("{stripped}.po")
    } else {
        normalized
    }
}

fn locale_from_vars(vars: &HashMap<String, String>) -> Option<String> {
    vars.get("locale")
        .or_else(|| vars.get("android_locale"))
        .cloned()
}

fn locale_id_for_code<'a>(locales: &'a [Locale], code: &str) -> Option<&'a Locale> {
    locales.iter().find(|l| l.code == code)
}

fn is_bilingual_ext(path: &str) -> bool {
    ResourceFormat::from_path(path).is_bilingual()
}

/// Identity key for a parsed target translation: the explicit key, or
/// the source string when none was given — mirroring `Entity::identity_key`.
fn target_identity_key(tx: &crate::parser::ParsedTranslation) -> String {
    if tx.key.is_empty() {
        tx.source_string.clone()
    } else {
        tx.key.clone()
    }
}

/// §4.4.1: delete `TranslatedResource` rows for target files that were
/// removed from their repository.
fn delete_removed_translated_resources(
    tx: &rusqlite::Transaction,
    project: &Project,
    locales: &[Locale],
    non_reference: &[&Checkout],
    resolver: &dyn PathResolver,
) -> Result<()> {
    for checkout in non_reference {
        for path in &checkout.removed {
            if !is_bilingual_ext(path) {
                continue;
            }
            let abs_path = checkout.path.join(path);
            let (ref_path, vars) = match resolver.find_reference(&abs_path) {
                Some(v) => v,
                None => continue,
            };
            let locale_code = match locale_from_vars(&vars) {
                Some(c) => c,
                None => continue,
            };
            let locale = match locale_id_for_code(locales, &locale_code) {
                Some(l) => l,
                None => continue,
            };
            let db_path = strip_pot(&ref_path);
            if let Some(resource) = queries::find_resource_by_path(tx, project.id, &db_path)? {
                queries::delete_translated_resource(tx, resource.id, locale.id)?;
            }
        }
    }
    Ok(())
}

struct PendingEntry {
    strings: HashMap<Option<i64>, String>,
    fuzzy: bool,
}

/// §4.4.2: collect the repo-side translations that still disagree with
/// the database into `(entityId, localeId) -> (strings, fuzzy)`.
fn compute_updates(
    conn: &Connection,
    project: &Project,
    locales: &[Locale],
    non_reference: &[&Checkout],
    resolver: &dyn PathResolver,
    parser: &dyn ResourceParser,
) -> Result<HashMap<(EntityId, LocaleId), (HashMap<Option<i64>, String>, bool)>> {
    // Step 1-2: parse every changed target file and accumulate by
    // (dbPath, identityKey, localeId).
    let mut translations: HashMap<(String, String, LocaleId), PendingEntry> = HashMap::new();
    let mut resource_paths: HashSet<String> = HashSet::new();
    let mut resource_locale_pairs: HashSet<(String, LocaleId)> = HashSet::new();

    for checkout in non_reference {
        for path in &checkout.changed {
            let abs_path = checkout.path.join(path);
            let (ref_path, vars) = match resolver.find_reference(&abs_path) {
                Some(v) => v,
                None => continue,
            };
            let locale_code = match locale_from_vars(&vars) {
                Some(c) => c,
                None => continue,
            };
            let locale = match locale_id_for_code(locales, &locale_code) {
                Some(l) => l,
                None => continue,
            };
            let db_path = strip_pot(&ref_path);

            let parsed = match parser.parse(&abs_path, Some(std::path::Path::new(&ref_path)), Some(&locale_code)) {
                Ok(p) => p,
                Err(e) => {
                    error!("failed to parse target resource `{}`: {e}", abs_path.display());
                    continue;
                }
            };

            resource_paths.insert(db_path.clone());
            resource_locale_pairs.insert((db_path.clone(), locale.id));

            for tx in &parsed.translations {
                let key = target_identity_key(tx);
                let entry = translations
                    .entry((db_path.clone(), key, locale.id))
                    .or_insert_with(|| PendingEntry {
                        strings: HashMap::new(),
                        fuzzy: tx.fuzzy,
                    });
                entry.fuzzy = tx.fuzzy;
                for (plural_form, string) in &tx.strings {
                    entry.strings.insert(*plural_form, string.clone());
                }
            }
        }
    }

    if translations.is_empty() {
        return Ok(HashMap::new());
    }

    // Step 3: resolve dbPath -> Resource in one query scoped to the project.
    let path_list: Vec<String> = resource_paths.into_iter().collect();
    let resources = queries::find_resources_by_paths(conn, project.id, &path_list)?;
    let resource_by_path: HashMap<String, crate::models::Resource> =
        resources.into_iter().map(|r| (r.path.clone(), r)).collect();

    // Step 4: strip exact no-ops.
    for (db_path, locale_id) in &resource_locale_pairs {
        let resource = match resource_by_path.get(db_path) {
            Some(r) => r,
            None => continue,
        };
        let active = queries::active_translations_for_resource_locale(conn, resource.id, *locale_id)?;
        for (identity_key, plural_form, string) in active {
            if let Some(entry) = translations.get_mut(&(db_path.clone(), identity_key.clone(), *locale_id)) {
                if entry.strings.get(&plural_form) == Some(&string) {
                    entry.strings.remove(&plural_form);
                }
            }
            let now_empty = translations
                .get(&(db_path.clone(), identity_key.clone(), *locale_id))
                .map(|e| e.strings.is_empty())
                .unwrap_or(false);
            if now_empty {
                translations.remove(&(db_path.clone(), identity_key, *locale_id));
            }
        }
    }

    if translations.is_empty() {
        return Ok(HashMap::new());
    }

    // Step 5: database-wins — drop anything with a pending user-side change.
    for (path, key, locale_id) in queries::changed_entity_locale_keys(conn, project.id)? {
        translations.remove(&(path, key, locale_id));
    }

    // Step 6-7: resolve entities, dropping keys that don't resolve.
    let mut res: HashMap<(EntityId, LocaleId), (HashMap<Option<i64>, String>, bool)> = HashMap::new();
    for ((db_path, key, locale_id), entry) in translations {
        if entry.strings.is_empty() {
            continue;
        }
        let resource = match resource_by_path.get(&db_path) {
            Some(r) => r,
            None => continue,
        };
        match queries::find_entity_by_identity(conn, resource.id, &key)? {
            Some(entity_id) => {
                res.insert((entity_id, locale_id), (entry.strings, entry.fuzzy));
            }
            None => {
                warn!("no entity found for identity `{key}` in `{db_path}`; dropping translation update");
            }
        }
    }

    Ok(res)
}

struct RejectionPredicate {
    entity_id: EntityId,
    locale_id: LocaleId,
    plural_form: Option<i64>,
    exclude_id: TranslationId,
}

/// §4.4.3: apply the accumulated repo→DB updates.
fn apply_updates(
    tx: &rusqlite::Transaction,
    mut pending: HashMap<(EntityId, LocaleId), (HashMap<Option<i64>, String>, bool)>,
    now: DateTime<Utc>,
    report: &mut TranslationReconcileReport,
) -> Result<()> {
    let sync_user = queries::get_or_create_user(tx, SYNC_USERNAME)?;
    let mut to_reject: Vec<RejectionPredicate> = Vec::new();

    // Step 1: approve matching suggestions.
    let mut remaining: HashMap<(EntityId, LocaleId), (HashMap<Option<i64>, String>, bool)> = HashMap::new();
    for ((entity_id, locale_id), (strings, fuzzy)) in pending.drain() {
        let suggestions = queries::find_suggestions(tx, entity_id, locale_id)?;
        let matched: Vec<Translation> = suggestions
            .into_iter()
            .filter(|s| strings.get(&s.plural_form) == Some(&s.string))
            .collect();

        if matched.is_empty() {
            remaining.insert((entity_id, locale_id), (strings, fuzzy));
            continue;
        }

        for mut stx in matched {
            if stx.rejected {
                stx.rejected = false;
                stx.unrejected_user = None;
                stx.unrejected_date = Some(now);
                queries::insert_action_log(
                    tx,
                    &ActionLogEntry {
                        action_type: ActionType::TranslationUnrejected,
                        performed_by: sync_user,
                        translation_id: stx.id,
                        created_at: now,
                    },
                )?;
            }

            stx.active = true;
            stx.fuzzy = fuzzy;

            if !fuzzy {
                stx.approved = true;
                stx.approved_user = None;
                stx.approved_date = Some(now);
                stx.pretranslated = false;
                stx.unapproved_user = None;
                stx.unapproved_date = None;

                to_reject.push(RejectionPredicate {
                    entity_id,
                    locale_id,
                    plural_form: stx.plural_form,
                    exclude_id: stx.id,
                });

                queries::insert_action_log(
                    tx,
                    &ActionLogEntry {
                        action_type: ActionType::TranslationApproved,
                        performed_by: sync_user,
                        translation_id: stx.id,
                        created_at: now,
                    },
                )?;
                report.approved += 1;
            }

            queries::update_translation(tx, &stx)?;
        }
    }

    // Step 2: create new translations for whatever wasn't approved above.
    for ((entity_id, locale_id), (strings, fuzzy)) in remaining {
        for (plural_form, string) in strings {
            let new_translation = Translation {
                id: TranslationId(0),
                entity_id,
                locale_id,
                string,
                plural_form,
                active: true,
                approved: !fuzzy,
                approved_user: None,
                approved_date: if fuzzy { None } else { Some(now) },
                unapproved_user: None,
                unapproved_date: None,
                pretranslated: false,
                fuzzy,
                rejected: false,
                rejected_user: None,
                rejected_date: None,
                unrejected_user: None,
                unrejected_date: None,
                date: now,
            };
            let new_id = queries::insert_translation(tx, &new_translation)?;

            to_reject.push(RejectionPredicate {
                entity_id,
                locale_id,
                plural_form,
                exclude_id: new_id,
            });

            queries::insert_action_log(
                tx,
                &ActionLogEntry {
                    action_type: ActionType::TranslationCreated,
                    performed_by: sync_user,
                    translation_id: new_id,
                    created_at: now,
                },
            )?;
            report.created += 1;
        }
    }

    // Step 3: reject siblings.
    for predicate in to_reject {
        let candidates = queries::find_rejection_candidates(
            tx,
            predicate.entity_id,
            predicate.locale_id,
            predicate.plural_form,
            predicate.exclude_id,
        )?;
        for mut candidate in candidates {
            queries::insert_action_log(
                tx,
                &ActionLogEntry {
                    action_type: ActionType::TranslationRejected,
                    performed_by: sync_user,
                    translation_id: candidate.id,
                    created_at: now,
                },
            )?;
            candidate.active = false;
            candidate.approved = false;
            candidate.approved_user = None;
            candidate.approved_date = None;
            candidate.rejected = true;
            candidate.rejected_user = None;
            candidate.rejected_date = Some(now);
            candidate.pretranslated = false;
            candidate.fuzzy = false;
            queries::update_translation(tx, &candidate)?;
            report.rejected += 1;
        }
    }

    Ok(())
}

/// Apply target-side repository changes for one project (§4.4).
pub fn reconcile_translations(
    conn: &mut Connection,
    project: &Project,
    locales: &[Locale],
    checkouts: &[Checkout],
    ref_checkout: &Checkout,
    resolver: &dyn PathResolver,
    parser: &dyn ResourceParser,
    now: DateTime<Utc>,
) -> Result<TranslationReconcileReport> {
    let non_reference: Vec<&Checkout> = checkouts
        .iter()
        .filter(|c| {
            !(c.repository_id == ref_checkout.repository_id && c.locale_code == ref_checkout.locale_code)
        })
        .collect();

    // compute_updates only reads, so it can run outside the write transaction.
    let pending = compute_updates(conn, project, locales, &non_reference, resolver, parser)?;

    let tx = conn.transaction()?;
    delete_removed_translated_resources(&tx, project, locales, &non_reference, resolver)?;

    let mut report = TranslationReconcileReport::default();
    if !pending.is_empty() {
        apply_updates(&tx, pending, now, &mut report)?;
    }
    tx.commit()?;
    Ok(report)
}
