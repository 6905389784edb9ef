use std::path::{Path, PathBuf};

use git2::{Oid, Repository, RepositoryInitOptions, Signature};
use pretty_assertions::assert_eq;

use repofetch::{
    engine::{Classify, Evaluator, Transience},
    fetch::{FetchError, GitCloneNode, CHECKOUT_BRANCH},
    git::Git2Connector,
    model::descriptor::FetchDescriptor,
};

struct Source {
    path: PathBuf,
    first: Oid,
    feature: Oid,
}

fn init_repo(path: &Path) -> Repository {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    Repository::init_opts(path, &opts).unwrap()
}

fn commit(repo: &Repository, files: &[(&str, &str)], message: &str) -> Oid {
    let workdir = repo.workdir().unwrap().to_path_buf();
    let mut index = repo.index().unwrap();
    for (name, contents) in files {
        std::fs::write(workdir.join(name), contents).unwrap();
        index.add_path(Path::new(name)).unwrap();
    }
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let signature = Signature::now("repofetch", "repofetch@example.com").unwrap();
    let parent = repo.head().ok().map(|head| head.peel_to_commit().unwrap());
    let parents: Vec<_> = parent.iter().collect();
    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .unwrap()
}

/// `main` and tag `v1.0` at the first commit, `feature` one commit ahead.
fn source(root: &Path) -> Source {
    let path = root.join("source");
    let repo = init_repo(&path);
    let first = commit(&repo, &[("README.md", "first")], "first");
    repo.tag_lightweight("v1.0", &repo.find_object(first, None).unwrap(), false)
        .unwrap();

    let first_commit = repo.find_commit(first).unwrap();
    repo.branch("feature", &first_commit, false).unwrap();
    repo.set_head("refs/heads/feature").unwrap();
    let feature = commit(&repo, &[("FEATURE.md", "feature")], "feature");
    repo.set_head("refs/heads/main").unwrap();
    repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
        .unwrap();

    Source {
        path,
        first,
        feature,
    }
}

fn remote(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}

fn head_of(path: &Path) -> (String, Oid) {
    let repo = Repository::open(path).unwrap();
    let head = repo.head().unwrap();
    let name = head.name().unwrap().to_string();
    let id = head.peel_to_commit().unwrap().id();
    (name, id)
}

fn node() -> GitCloneNode<Git2Connector> {
    GitCloneNode::new(Git2Connector::new(vec![]))
}

#[test]
fn fetch_branch_onto_internal_branch() {
    let dir = tempfile::tempdir().unwrap();
    let source = source(dir.path());
    let destination = dir.path().join("fetched");
    let descriptor =
        FetchDescriptor::new(remote(&source.path), "main", false, &destination).unwrap();

    let result = node().compute(&descriptor).unwrap();

    assert_eq!(result.path(), destination.as_path());
    assert!(destination.join("README.md").is_file());
    assert_eq!(
        head_of(&destination),
        (format!("refs/heads/{CHECKOUT_BRANCH}"), source.first)
    );
}

#[test]
fn fetch_tag_commit_and_remote_branch() {
    let dir = tempfile::tempdir().unwrap();
    let source = source(dir.path());
    let checkouts = [
        ("v1.0".to_string(), source.first),
        (source.feature.to_string(), source.feature),
        ("feature".to_string(), source.feature),
    ];

    for (index, (checkout, expected)) in checkouts.into_iter().enumerate() {
        let destination = dir.path().join(format!("fetched-{index}"));
        let descriptor =
            FetchDescriptor::new(remote(&source.path), checkout, false, &destination).unwrap();

        node().compute(&descriptor).unwrap();

        assert_eq!(head_of(&destination).1, expected);
    }
}

#[test]
fn unknown_checkout_fails_persistently_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let source = source(dir.path());
    let destination = dir.path().join("fetched");
    let descriptor =
        FetchDescriptor::new(remote(&source.path), "does-not-exist", false, &destination)
            .unwrap();

    let error = node().compute(&descriptor).unwrap_err();

    assert!(matches!(error, FetchError::InvalidCheckout { .. }));
    assert_eq!(error.transience(), Transience::Persistent);
    assert!(!destination.exists());
}

#[test]
fn populated_destination_is_a_transient_vcs_failure() {
    let dir = tempfile::tempdir().unwrap();
    let source = source(dir.path());
    let destination = dir.path().join("fetched");
    std::fs::create_dir_all(&destination).unwrap();
    std::fs::write(destination.join("KEEP"), "user data").unwrap();
    let descriptor =
        FetchDescriptor::new(remote(&source.path), "main", false, &destination).unwrap();

    let error = node().compute(&descriptor).unwrap_err();

    assert!(matches!(error, FetchError::Vcs { .. }), "{error:?}");
    assert_eq!(error.transience(), Transience::Transient);
    assert_eq!(
        std::fs::read_to_string(destination.join("KEEP")).unwrap(),
        "user data"
    );
}

#[test]
fn unsupported_scheme_is_invalid_remote() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("fetched");
    let descriptor =
        FetchDescriptor::new("ftp://example.com/repo.git", "main", false, &destination).unwrap();

    let error = node().compute(&descriptor).unwrap_err();

    assert!(matches!(error, FetchError::InvalidRemote { .. }));
    assert!(!destination.exists());
}

#[test]
fn missing_local_remote_fails_without_result() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("fetched");
    let descriptor = FetchDescriptor::new(
        remote(&dir.path().join("nowhere")),
        "main",
        false,
        &destination,
    )
    .unwrap();

    assert!(node().compute(&descriptor).is_err());
    assert!(!destination.exists());
}

#[test]
fn submodules_are_materialized_one_level_deep() {
    let dir = tempfile::tempdir().unwrap();

    // `outer` includes `inner`, which in turn includes `outer` again.
    let outer_path = dir.path().join("outer");
    let outer = init_repo(&outer_path);
    commit(&outer, &[("README.md", "outer")], "outer");

    let inner_path = dir.path().join("inner");
    let inner = init_repo(&inner_path);
    commit(&inner, &[("INNER.md", "inner")], "inner");
    let mut back_reference = inner
        .submodule(&remote(&outer_path), Path::new("outer"), true)
        .unwrap();
    back_reference.clone(None).unwrap();
    back_reference.add_finalize().unwrap();
    commit(&inner, &[], "add outer");

    let mut submodule = outer
        .submodule(&remote(&inner_path), Path::new("inner"), true)
        .unwrap();
    submodule.clone(None).unwrap();
    submodule.add_finalize().unwrap();
    commit(&outer, &[], "add inner");

    let destination = dir.path().join("fetched");
    let descriptor = FetchDescriptor::new(remote(&outer_path), "main", true, &destination).unwrap();

    node().compute(&descriptor).unwrap();

    assert!(destination.join("inner").join("INNER.md").is_file());
    assert!(!destination
        .join("inner")
        .join("outer")
        .join("README.md")
        .exists());
}

#[test]
fn submodules_are_left_alone_unless_requested() {
    let dir = tempfile::tempdir().unwrap();
    let inner_path = dir.path().join("inner");
    let inner = init_repo(&inner_path);
    commit(&inner, &[("INNER.md", "inner")], "inner");

    let outer_path = dir.path().join("outer");
    let outer = init_repo(&outer_path);
    commit(&outer, &[("README.md", "outer")], "outer");
    let mut submodule = outer
        .submodule(&remote(&inner_path), Path::new("inner"), true)
        .unwrap();
    submodule.clone(None).unwrap();
    submodule.add_finalize().unwrap();
    commit(&outer, &[], "add inner");

    let destination = dir.path().join("fetched");
    let descriptor =
        FetchDescriptor::new(remote(&outer_path), "main", false, &destination).unwrap();

    node().compute(&descriptor).unwrap();

    assert!(destination.join("README.md").is_file());
    assert!(!destination.join("inner").join("INNER.md").exists());
}

#[test]
fn evaluator_reuses_fetched_repository() {
    let dir = tempfile::tempdir().unwrap();
    let source = source(dir.path());
    let destination = dir.path().join("fetched");
    let descriptor =
        FetchDescriptor::new(remote(&source.path), "main", false, &destination).unwrap();
    let evaluator = Evaluator::new(node());

    let first = evaluator.evaluate(&descriptor).unwrap();
    // A second clone into the populated destination would fail.
    let second = evaluator.evaluate(&descriptor).unwrap();
    assert_eq!(first, second);

    evaluator.invalidate(&descriptor);
    std::fs::remove_dir_all(&destination).unwrap();
    let third = evaluator.evaluate(&descriptor).unwrap();
    assert_eq!(first, third);
}
