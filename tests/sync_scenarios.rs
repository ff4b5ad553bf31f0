// Licensed under the MIT License.

//! End-to-end reconciliation scenarios (spec §8), run against an
//! in-memory database and a real temp-directory checkout, using the
//! shipped `.po` parser — no VCS involved, since `Checkout`s are
//! constructed directly rather than produced by a `VersionControl`.

use std::collections::HashMap;
use std::fs;

use chrono::{TimeZone, Utc};
use rusqlite::Connection;
use tempfile::TempDir;

use tmsync::checkout::Checkout;
use tmsync::db::{self, queries};
use tmsync::entity_reconciler;
use tmsync::models::*;
use tmsync::parser::PoParser;
use tmsync::path_resolver::{DiscoverPathResolver, PathResolver};
use tmsync::translation_reconciler;

fn fixed_now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

/// Lay out `root/en-US/app.pot` and `root/de/app.po`, seed `project` +
/// the `de` locale, and return everything needed to drive both
/// reconcilers directly.
struct Fixture {
    _dir: TempDir,
    conn: Connection,
    project: Project,
    locales: Vec<Locale>,
    ref_checkout: Checkout,
    target_checkout: Checkout,
    resolver: Box<dyn PathResolver>,
}

fn build_fixture(pot_body: &str, po_body: Option<&str>) -> Fixture {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    fs::create_dir_all(root.join("en-US")).unwrap();
    fs::write(root.join("en-US/app.pot"), pot_body).unwrap();

    if let Some(body) = po_body {
        fs::create_dir_all(root.join("de")).unwrap();
        fs::write(root.join("de/app.po"), body).unwrap();
    }

    let mut conn = db::open_in_memory().unwrap();
    let project_id = queries::insert_project(&conn, "demo", None, &root.to_string_lossy()).unwrap();
    let locale_id = queries::insert_locale(&conn, project_id, "de").unwrap();
    let project = queries::get_project(&conn, project_id).unwrap();
    let locales = vec![Locale {
        id: locale_id,
        project_id,
        code: "de".to_string(),
    }];

    let ref_checkout = Checkout {
        repository_id: RepositoryId(1),
        locale_code: None,
        is_source: true,
        url: String::new(),
        path: root.join("en-US"),
        repo_checkout_path: root.join("en-US"),
        prev_commit: None,
        commit: None,
        changed: vec!["app.pot".to_string()],
        removed: vec![],
    };
    let target_checkout = Checkout {
        repository_id: RepositoryId(2),
        locale_code: Some("de".to_string()),
        is_source: false,
        url: String::new(),
        path: root.join("de"),
        repo_checkout_path: root.clone(),
        prev_commit: None,
        commit: None,
        changed: if po_body.is_some() {
            vec!["app.po".to_string()]
        } else {
            vec![]
        },
        removed: vec![],
    };

    let resolver = DiscoverPathResolver::discover(&root, Some("en-US"), &["de".to_string()]).unwrap();

    Fixture {
        _dir: dir,
        conn,
        project,
        locales,
        ref_checkout,
        target_checkout,
        resolver: Box::new(resolver),
    }
}

const POT_TWO_ENTITIES: &str = "msgctxt \"hello\"\nmsgid \"Hello\"\nmsgstr \"\"\n\nmsgctxt \"bye\"\nmsgid \"Bye\"\nmsgstr \"\"\n";
const PO_HELLO_HALLO: &str = "msgctxt \"hello\"\nmsgid \"Hello\"\nmsgstr \"Hallo\"\n";

#[test]
fn scenario_1_initial_sync_of_new_project() {
    let mut f = build_fixture(POT_TWO_ENTITIES, Some(PO_HELLO_HALLO));
    let now = fixed_now();
    let parser = PoParser::new();

    let entity_report = entity_reconciler::reconcile_entities(
        &mut f.conn,
        &f.project,
        &f.ref_checkout,
        f.resolver.as_ref(),
        &f.locales,
        &parser,
        now,
    )
    .unwrap();

    assert_eq!(entity_report.added, vec!["app.po".to_string()]);
    assert!(entity_report.changed.is_empty());

    let resource = queries::find_resource_by_path(&f.conn, f.project.id, "app.po")
        .unwrap()
        .expect("resource created");
    assert_eq!(resource.total_strings, 2);
    assert_eq!(resource.order, 0);

    let translation_report = translation_reconciler::reconcile_translations(
        &mut f.conn,
        &f.project,
        &f.locales,
        &[f.ref_checkout.clone(), f.target_checkout.clone()],
        &f.ref_checkout,
        f.resolver.as_ref(),
        &parser,
        now,
    )
    .unwrap();

    assert_eq!(translation_report.created, 1);
    assert_eq!(translation_report.approved, 0);
    assert_eq!(translation_report.rejected, 0);
    assert_eq!(count(&f.conn, "entities"), 2);
    assert_eq!(count(&f.conn, "translations"), 1);
    assert_eq!(count(&f.conn, "action_log"), 1);

    let action_type: String = f
        .conn
        .query_row("SELECT action_type FROM action_log", [], |r| r.get(0))
        .unwrap();
    assert_eq!(action_type, "translation_created");
}

#[test]
fn scenario_2_no_op_second_sync() {
    let mut f = build_fixture(POT_TWO_ENTITIES, Some(PO_HELLO_HALLO));
    let now = fixed_now();
    let parser = PoParser::new();

    entity_reconciler::reconcile_entities(
        &mut f.conn,
        &f.project,
        &f.ref_checkout,
        f.resolver.as_ref(),
        &f.locales,
        &parser,
        now,
    )
    .unwrap();
    translation_reconciler::reconcile_translations(
        &mut f.conn,
        &f.project,
        &f.locales,
        &[f.ref_checkout.clone(), f.target_checkout.clone()],
        &f.ref_checkout,
        f.resolver.as_ref(),
        &parser,
        now,
    )
    .unwrap();

    let entities_before = count(&f.conn, "entities");
    let translations_before = count(&f.conn, "translations");
    let actions_before = count(&f.conn, "action_log");

    // Second pass: same files, same checkouts — nothing actually changed
    // in the repository.
    let entity_report = entity_reconciler::reconcile_entities(
        &mut f.conn,
        &f.project,
        &f.ref_checkout,
        f.resolver.as_ref(),
        &f.locales,
        &parser,
        now,
    )
    .unwrap();
    let translation_report = translation_reconciler::reconcile_translations(
        &mut f.conn,
        &f.project,
        &f.locales,
        &[f.ref_checkout.clone(), f.target_checkout.clone()],
        &f.ref_checkout,
        f.resolver.as_ref(),
        &parser,
        now,
    )
    .unwrap();

    assert!(entity_report.added.is_empty());
    assert_eq!(translation_report.created, 0);
    assert_eq!(translation_report.approved, 0);
    assert_eq!(translation_report.rejected, 0);
    assert_eq!(count(&f.conn, "entities"), entities_before);
    assert_eq!(count(&f.conn, "translations"), translations_before);
    assert_eq!(count(&f.conn, "action_log"), actions_before);
}

#[test]
fn scenario_3_source_entity_removal() {
    let mut f = build_fixture(POT_TWO_ENTITIES, None);
    let now = fixed_now();
    let parser = PoParser::new();

    entity_reconciler::reconcile_entities(
        &mut f.conn,
        &f.project,
        &f.ref_checkout,
        f.resolver.as_ref(),
        &f.locales,
        &parser,
        now,
    )
    .unwrap();

    // Rewrite the source file dropping "bye".
    fs::write(
        f.ref_checkout.path.join("app.pot"),
        "msgctxt \"hello\"\nmsgid \"Hello\"\nmsgstr \"\"\n",
    )
    .unwrap();

    let later = fixed_now() + chrono::Duration::hours(1);
    entity_reconciler::reconcile_entities(
        &mut f.conn,
        &f.project,
        &f.ref_checkout,
        f.resolver.as_ref(),
        &f.locales,
        &parser,
        later,
    )
    .unwrap();

    let resource = queries::find_resource_by_path(&f.conn, f.project.id, "app.po")
        .unwrap()
        .unwrap();
    let rows = queries::list_non_obsolete_entities_with_path(&f.conn, &[resource.id]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1.key, "hello");

    let bye_obsolete: bool = f
        .conn
        .query_row(
            "SELECT obsolete FROM entities WHERE key = 'bye'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert!(bye_obsolete);
}

#[test]
fn scenario_4_resource_removed() {
    let mut f = build_fixture(POT_TWO_ENTITIES, Some(PO_HELLO_HALLO));
    let now = fixed_now();
    let parser = PoParser::new();

    entity_reconciler::reconcile_entities(
        &mut f.conn,
        &f.project,
        &f.ref_checkout,
        f.resolver.as_ref(),
        &f.locales,
        &parser,
        now,
    )
    .unwrap();
    translation_reconciler::reconcile_translations(
        &mut f.conn,
        &f.project,
        &f.locales,
        &[f.ref_checkout.clone(), f.target_checkout.clone()],
        &f.ref_checkout,
        f.resolver.as_ref(),
        &parser,
        now,
    )
    .unwrap();

    let mut removal_checkout = f.ref_checkout.clone();
    removal_checkout.changed = vec![];
    removal_checkout.removed = vec!["app.pot".to_string()];

    let report = entity_reconciler::reconcile_entities(
        &mut f.conn,
        &f.project,
        &removal_checkout,
        f.resolver.as_ref(),
        &f.locales,
        &parser,
        now,
    )
    .unwrap();

    assert_eq!(report.removed, vec!["app.po".to_string()]);
    assert_eq!(count(&f.conn, "resources"), 0);
    assert_eq!(count(&f.conn, "entities"), 0);
    assert_eq!(count(&f.conn, "translated_resources"), 0);
}

#[test]
fn scenario_5_approve_existing_suggestion() {
    let mut f = build_fixture(POT_TWO_ENTITIES, Some(PO_HELLO_HALLO));
    let now = fixed_now();
    let parser = PoParser::new();

    entity_reconciler::reconcile_entities(
        &mut f.conn,
        &f.project,
        &f.ref_checkout,
        f.resolver.as_ref(),
        &f.locales,
        &parser,
        now,
    )
    .unwrap();

    let resource = queries::find_resource_by_path(&f.conn, f.project.id, "app.po")
        .unwrap()
        .unwrap();
    let entity_id = queries::find_entity_by_identity(&f.conn, resource.id, "hello")
        .unwrap()
        .unwrap();
    let locale_id = f.locales[0].id;

    let suggestion = Translation {
        id: TranslationId(0),
        entity_id,
        locale_id,
        string: "Hallo".to_string(),
        plural_form: None,
        active: false,
        approved: false,
        approved_user: None,
        approved_date: None,
        unapproved_user: None,
        unapproved_date: None,
        pretranslated: false,
        fuzzy: false,
        rejected: false,
        rejected_user: None,
        rejected_date: None,
        unrejected_user: None,
        unrejected_date: None,
        date: now,
    };
    let suggestion_id = queries::insert_translation(&f.conn, &suggestion).unwrap();

    let report = translation_reconciler::reconcile_translations(
        &mut f.conn,
        &f.project,
        &f.locales,
        &[f.ref_checkout.clone(), f.target_checkout.clone()],
        &f.ref_checkout,
        f.resolver.as_ref(),
        &parser,
        now,
    )
    .unwrap();

    assert_eq!(report.approved, 1);
    assert_eq!(report.created, 0);
    assert_eq!(report.rejected, 0);
    assert_eq!(count(&f.conn, "translations"), 1);

    let (approved, active): (bool, bool) = f
        .conn
        .query_row(
            "SELECT approved, active FROM translations WHERE id = ?1",
            rusqlite::params![suggestion_id.0],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert!(approved);
    assert!(active);
}

#[test]
fn scenario_6_database_wins() {
    let mut f = build_fixture(POT_TWO_ENTITIES, Some("msgctxt \"hello\"\nmsgid \"Hello\"\nmsgstr \"Hallo neu\"\n"));
    let now = fixed_now();
    let parser = PoParser::new();

    entity_reconciler::reconcile_entities(
        &mut f.conn,
        &f.project,
        &f.ref_checkout,
        f.resolver.as_ref(),
        &f.locales,
        &parser,
        now,
    )
    .unwrap();

    let resource = queries::find_resource_by_path(&f.conn, f.project.id, "app.po")
        .unwrap()
        .unwrap();
    let entity_id = queries::find_entity_by_identity(&f.conn, resource.id, "hello")
        .unwrap()
        .unwrap();
    let locale_id = f.locales[0].id;

    f.conn
        .execute(
            "INSERT INTO changed_entity_locale (entity_id, locale_id) VALUES (?1, ?2)",
            rusqlite::params![entity_id.0, locale_id.0],
        )
        .unwrap();

    let report = translation_reconciler::reconcile_translations(
        &mut f.conn,
        &f.project,
        &f.locales,
        &[f.ref_checkout.clone(), f.target_checkout.clone()],
        &f.ref_checkout,
        f.resolver.as_ref(),
        &parser,
        now,
    )
    .unwrap();

    assert_eq!(report.approved, 0);
    assert_eq!(report.created, 0);
    assert_eq!(report.rejected, 0);
    assert_eq!(count(&f.conn, "translations"), 0);
    assert_eq!(count(&f.conn, "action_log"), 0);
}

#[test]
fn scenario_7_approve_new_reject_old() {
    let mut f = build_fixture(POT_TWO_ENTITIES, Some("msgctxt \"hello\"\nmsgid \"Hello\"\nmsgstr \"Hallo neu\"\n"));
    let now = fixed_now();
    let parser = PoParser::new();

    entity_reconciler::reconcile_entities(
        &mut f.conn,
        &f.project,
        &f.ref_checkout,
        f.resolver.as_ref(),
        &f.locales,
        &parser,
        now,
    )
    .unwrap();

    let resource = queries::find_resource_by_path(&f.conn, f.project.id, "app.po")
        .unwrap()
        .unwrap();
    let entity_id = queries::find_entity_by_identity(&f.conn, resource.id, "hello")
        .unwrap()
        .unwrap();
    let locale_id = f.locales[0].id;

    let old_approved = Translation {
        id: TranslationId(0),
        entity_id,
        locale_id,
        string: "Hallo alt".to_string(),
        plural_form: None,
        active: true,
        approved: true,
        approved_user: None,
        approved_date: Some(now),
        unapproved_user: None,
        unapproved_date: None,
        pretranslated: false,
        fuzzy: false,
        rejected: false,
        rejected_user: None,
        rejected_date: None,
        unrejected_user: None,
        unrejected_date: None,
        date: now,
    };
    let old_id = queries::insert_translation(&f.conn, &old_approved).unwrap();

    let later = now + chrono::Duration::hours(1);
    let report = translation_reconciler::reconcile_translations(
        &mut f.conn,
        &f.project,
        &f.locales,
        &[f.ref_checkout.clone(), f.target_checkout.clone()],
        &f.ref_checkout,
        f.resolver.as_ref(),
        &parser,
        later,
    )
    .unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.rejected, 1);
    assert_eq!(count(&f.conn, "action_log"), 2);
    assert_eq!(count(&f.conn, "translations"), 2);

    let (old_rejected, old_active): (bool, bool) = f
        .conn
        .query_row(
            "SELECT rejected, active FROM translations WHERE id = ?1",
            rusqlite::params![old_id.0],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert!(old_rejected);
    assert!(!old_active);

    let new_row: (bool, bool, String) = f
        .conn
        .query_row(
            "SELECT approved, active, string FROM translations WHERE id != ?1",
            rusqlite::params![old_id.0],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .unwrap();
    assert!(new_row.0);
    assert!(new_row.1);
    assert_eq!(new_row.2, "Hallo neu");
}

#[test]
fn at_most_one_active_translation_invariant() {
    let mut f = build_fixture(POT_TWO_ENTITIES, Some(PO_HELLO_HALLO));
    let now = fixed_now();
    let parser = PoParser::new();

    entity_reconciler::reconcile_entities(
        &mut f.conn,
        &f.project,
        &f.ref_checkout,
        f.resolver.as_ref(),
        &f.locales,
        &parser,
        now,
    )
    .unwrap();
    translation_reconciler::reconcile_translations(
        &mut f.conn,
        &f.project,
        &f.locales,
        &[f.ref_checkout.clone(), f.target_checkout.clone()],
        &f.ref_checkout,
        f.resolver.as_ref(),
        &parser,
        now,
    )
    .unwrap();

    let mut per_key: HashMap<i64, i64> = HashMap::new();
    let mut stmt = f
        .conn
        .prepare("SELECT entity_id, active FROM translations")
        .unwrap();
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, bool>(1)?)))
        .unwrap();
    for row in rows {
        let (entity_id, active) = row.unwrap();
        if active {
            *per_key.entry(entity_id).or_insert(0) += 1;
        }
    }
    assert!(per_key.values().all(|&n| n <= 1));
}
