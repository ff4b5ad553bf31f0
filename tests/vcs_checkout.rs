// Licensed under the MIT License.

//! `Git2VersionControl` exercised against a throwaway local repository.
//! `update()` is not covered here since it requires a real remote;
//! `revision()`/`changed_files()` only need commits, which we make
//! directly with `git2`.

use std::fs;

use git2::{Repository, Signature};
use tempfile::TempDir;

use tmsync::vcs::{Git2VersionControl, VersionControl};

fn commit_all(repo: &Repository, message: &str) -> git2::Oid {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::now("Test", "test@example.com").unwrap();

    let parents: Vec<git2::Commit> = match repo.head() {
        Ok(head) => vec![head.peel_to_commit().unwrap()],
        Err(_) => vec![],
    };
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
        .unwrap()
}

#[test]
fn revision_reports_none_without_a_repository() {
    let dir = TempDir::new().unwrap();
    let vcs = Git2VersionControl::new();
    assert_eq!(vcs.revision(dir.path()).unwrap(), None);
}

#[test]
fn revision_tracks_head_across_commits() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    fs::write(dir.path().join("app.pot"), "msgid \"Hello\"\nmsgstr \"\"\n").unwrap();
    let first = commit_all(&repo, "add app.pot");

    let vcs = Git2VersionControl::new();
    assert_eq!(vcs.revision(dir.path()).unwrap(), Some(first.to_string()));

    fs::write(dir.path().join("app.pot"), "msgid \"Bye\"\nmsgstr \"\"\n").unwrap();
    let second = commit_all(&repo, "change app.pot");
    assert_ne!(first, second);
    assert_eq!(vcs.revision(dir.path()).unwrap(), Some(second.to_string()));
}

#[test]
fn changed_files_reports_additions_modifications_and_deletions() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    fs::write(dir.path().join("app.pot"), "msgid \"Hello\"\nmsgstr \"\"\n").unwrap();
    fs::write(dir.path().join("stale.pot"), "msgid \"Old\"\nmsgstr \"\"\n").unwrap();
    let base = commit_all(&repo, "initial");

    fs::write(
        dir.path().join("app.pot"),
        "msgid \"Hello\"\nmsgid_plural \"Hellos\"\nmsgstr[0] \"\"\n",
    )
    .unwrap();
    fs::remove_file(dir.path().join("stale.pot")).unwrap();
    fs::write(dir.path().join("new.pot"), "msgid \"New\"\nmsgstr \"\"\n").unwrap();
    commit_all(&repo, "update");

    let vcs = Git2VersionControl::new();
    let (changed, removed) = vcs.changed_files(dir.path(), &base.to_string()).unwrap();

    assert!(changed.contains(&"app.pot".to_string()));
    assert!(changed.contains(&"new.pot".to_string()));
    assert!(removed.contains(&"stale.pot".to_string()));
    assert!(!changed.contains(&"stale.pot".to_string()));
}

#[test]
fn changed_files_excludes_dotted_paths() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    fs::write(dir.path().join("app.pot"), "msgid \"Hello\"\nmsgstr \"\"\n").unwrap();
    let base = commit_all(&repo, "initial");

    fs::create_dir_all(dir.path().join(".hidden")).unwrap();
    fs::write(dir.path().join(".hidden/secret.pot"), "msgid \"X\"\nmsgstr \"\"\n").unwrap();
    fs::write(dir.path().join("visible.pot"), "msgid \"Y\"\nmsgstr \"\"\n").unwrap();
    commit_all(&repo, "add files");

    let vcs = Git2VersionControl::new();
    let (changed, _removed) = vcs.changed_files(dir.path(), &base.to_string()).unwrap();

    assert!(changed.contains(&"visible.pot".to_string()));
    assert!(!changed.iter().any(|p| p.contains("secret")));
}
