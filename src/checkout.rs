// Licensed under the MIT License.

//! The Checkout Manager (§4.1): expand each project repository into one
//! or more [`Checkout`]s and compute each one's delta since the last
//! sync.

use std::path::{Path, PathBuf};

use log::{info, warn};
use rusqlite::Connection;
use walkdir::WalkDir;

use crate::db::queries;
use crate::errors::Result;
use crate::models::{Project, Repository, SINGLE_LOCALE_SENTINEL};
use crate::vcs::VersionControl;

/// An ephemeral per-sync snapshot of one repository (or one locale's
/// expansion of a multi-locale repository). Discarded once the sync that
/// produced it completes.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub repository_id: crate::models::RepositoryId,
    pub locale_code: Option<String>,
    pub is_source: bool,
    pub url: String,
    pub path: PathBuf,
    /// The owning `Repository`'s raw, un-locale-expanded `checkout_path`
    /// (§4.2: the value a path resolver rebases `base` to — distinct
    /// from `path`, which is already joined with the locale code for a
    /// `{locale_code}`-templated repository).
    pub repo_checkout_path: PathBuf,
    pub prev_commit: Option<String>,
    pub commit: Option<String>,
    /// Paths relative to `path`.
    pub changed: Vec<String>,
    /// Paths relative to `path`.
    pub removed: Vec<String>,
}

fn normalize(path: &Path) -> PathBuf {
    path.components().collect::<PathBuf>()
}

/// Every tracked file under `root` whose name, and every ancestor
/// directory name, does not begin with `.` — the fallback delta used
/// when there is no previous revision to diff against, or the VCS call
/// fails (§4.1, §7).
fn walk_all_files(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            e.file_name()
                .to_str()
                .map(|s| e.depth() == 0 || !s.starts_with('.'))
                .unwrap_or(false)
        })
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_file() {
            if let Ok(rel) = entry.path().strip_prefix(root) {
                out.push(rel.to_string_lossy().into_owned());
            }
        }
    }
    out
}

fn locale_key(locale_code: Option<&str>) -> &str {
    locale_code.unwrap_or(SINGLE_LOCALE_SENTINEL)
}

fn one_checkout(
    vcs: &dyn VersionControl,
    repo: &Repository,
    locale_code: Option<String>,
    is_source: bool,
    url: String,
    path: PathBuf,
    pull: bool,
) -> Checkout {
    let repo_checkout_path = PathBuf::from(&repo.checkout_path);
    let prev_commit = repo
        .last_synced_revisions
        .as_ref()
        .and_then(|m| m.get(locale_key(locale_code.as_deref())))
        .cloned();

    if pull {
        if let Err(e) = vcs.update(&url, &path, &repo.branch) {
            warn!("failed to update checkout at {path:?}: {e}");
        }
    }

    let commit = vcs.revision(&path).unwrap_or(None);

    let (changed, removed) = match &prev_commit {
        Some(rev) => match vcs.changed_files(&path, rev) {
            Ok(delta) => delta,
            Err(e) => {
                warn!("changed_files failed for {path:?} since {rev}: {e}; treating all files as changed");
                (walk_all_files(&path), Vec::new())
            }
        },
        None => (walk_all_files(&path), Vec::new()),
    };

    Checkout {
        repository_id: repo.id,
        locale_code,
        is_source,
        url,
        path,
        repo_checkout_path,
        prev_commit,
        commit,
        changed,
        removed,
    }
}

/// Materialize every [`Checkout`] for `project`. Order is not
/// contractually significant (§4.1).
pub fn get_checkouts(
    conn: &Connection,
    project: &Project,
    pull: bool,
    vcs: &dyn VersionControl,
) -> Result<Vec<Checkout>> {
    let repos = queries::list_repositories_for_project(conn, project.id)?;
    let locales = queries::list_locales_for_project(conn, project.id)?;

    let mut checkouts = Vec::new();
    for repo in &repos {
        if repo.url.contains("{locale_code}") {
            for locale in &locales {
                let url = repo.url.replace("{locale_code}", &locale.code);
                let path = normalize(&Path::new(&repo.checkout_path).join(&locale.code));
                checkouts.push(one_checkout(
                    vcs,
                    repo,
                    Some(locale.code.clone()),
                    false,
                    url,
                    path,
                    pull,
                ));
            }
        } else {
            let path = normalize(Path::new(&repo.checkout_path));
            checkouts.push(one_checkout(
                vcs,
                repo,
                None,
                repo.source_repo,
                repo.url.clone(),
                path,
                pull,
            ));
        }
    }

    info!(
        "project `{}`: materialized {} checkout(s)",
        project.slug,
        checkouts.len()
    );
    Ok(checkouts)
}
