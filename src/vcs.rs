// Licensed under the MIT License.

//! The `VersionControl` capability (§6): an external collaborator this
//! crate treats as swappable. `Git2VersionControl` is a reference
//! implementation backed by `git2`, generalizing the teacher's
//! `Repository` wrapper (`src/repository.rs`) from "one concrete repo
//! type" into "one trait any VCS backend can implement" — VCS transport
//! internals beyond this thin layer are explicitly out of scope.

use std::path::Path;

use git2::{FetchOptions, Repository as GitRepository};
use log::{debug, warn};

use crate::errors::{Error, Result};

/// Bring a working copy up to date, read its current revision, and list
/// what changed since a previous revision. Implementations other than
/// [`Git2VersionControl`] (Mercurial, a test double, ...) only need to
/// satisfy this contract.
pub trait VersionControl {
    /// Bring the working copy at `path` to `branch`'s head, cloning from
    /// `url` first if `path` does not yet hold a repository. Idempotent
    /// when there is nothing new to fetch.
    fn update(&self, url: &str, path: &Path, branch: &str) -> Result<()>;

    /// The current HEAD revision at `path`, or `None` if `path` holds no
    /// repository (or has no commits yet).
    fn revision(&self, path: &Path) -> Result<Option<String>>;

    /// Paths relative to `path` that changed or were removed since
    /// `since_rev`, excluding dot-prefixed files and directories.
    fn changed_files(&self, path: &Path, since_rev: &str) -> Result<(Vec<String>, Vec<String>)>;
}

/// `git2`-backed [`VersionControl`].
pub struct Git2VersionControl;

impl Git2VersionControl {
    pub fn new() -> Self {
        Git2VersionControl
    }

    fn open_or_clone(&self, url: &str, path: &Path, branch: &str) -> Result<GitRepository> {
        if path.join(".git").exists() {
            return Ok(GitRepository::open(path)?);
        }
        std::fs::create_dir_all(path)?;
        let fo = FetchOptions::new();
        let repo = git2::build::RepoBuilder::new()
            .branch(branch)
            .fetch_options(fo)
            .clone(url, path)?;
        Ok(repo)
    }
}

impl Default for Git2VersionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionControl for Git2VersionControl {
    fn update(&self, url: &str, path: &Path, branch: &str) -> Result<()> {
        let repo = self.open_or_clone(url, path, branch)?;
        let mut remote = repo
            .find_remote("origin")
            .or_else(|_| repo.remote_anonymous(url))?;
        remote.fetch(&[branch], None, None)?;

        let refname = format!("refs/remotes/origin/{branch}");
        let oid = match repo.refname_to_id(&refname) {
            Ok(oid) => oid,
            Err(_) => {
                debug!("no remote-tracking ref for {branch} at {path:?}; treating as up to date");
                return Ok(());
            }
        };
        let commit = repo.find_annotated_commit(oid)?;
        let (analysis, _) = repo.merge_analysis(&[&commit])?;
        if analysis.is_up_to_date() {
            return Ok(());
        }
        let obj = repo.find_object(oid, None)?;
        repo.checkout_tree(&obj, None)?;
        repo.set_head(&format!("refs/heads/{branch}"))
            .or_else(|_| repo.set_head_detached(oid))?;
        Ok(())
    }

    fn revision(&self, path: &Path) -> Result<Option<String>> {
        if !path.join(".git").exists() {
            return Ok(None);
        }
        let repo = GitRepository::open(path)?;
        match repo.head() {
            Ok(head) => Ok(head.target().map(|oid| oid.to_string())),
            Err(_) => Ok(None),
        }
    }

    fn changed_files(&self, path: &Path, since_rev: &str) -> Result<(Vec<String>, Vec<String>)> {
        let repo = match GitRepository::open(path) {
            Ok(r) => r,
            Err(e) => {
                warn!("could not open repository at {path:?}: {e}");
                return Err(Error::Vcs(e));
            }
        };
        let since_oid = git2::Oid::from_str(since_rev)?;
        let old_tree = repo.find_commit(since_oid)?.tree()?;
        let new_tree = repo.head()?.peel_to_tree()?;
        let diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), None)?;

        let mut changed = Vec::new();
        let mut removed = Vec::new();
        for delta in diff.deltas() {
            let file = match delta.status() {
                git2::Delta::Deleted => delta.old_file(),
                _ => delta.new_file(),
            };
            let rel = match file.path() {
                Some(p) => p,
                None => continue,
            };
            if is_dotted(rel) {
                continue;
            }
            let rel_str = rel.to_string_lossy().into_owned();
            match delta.status() {
                git2::Delta::Deleted => removed.push(rel_str),
                _ => changed.push(rel_str),
            }
        }
        Ok((changed, removed))
    }
}

fn is_dotted(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
    })
}
