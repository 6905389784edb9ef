use std::{
    collections::BTreeMap,
    future::Future,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{anyhow, bail};
use log::{debug, info, warn};
use tokio::task::JoinSet;

use crate::{
    engine::{EvaluationError, Evaluator, Transience},
    fetch::{FetchError, GitCloneNode},
    flock::DirectoryLock,
    git::VcsConnector,
    model::{
        descriptor::{FetchDescriptor, FetchResult},
        manifest::{Manifest, RepositoryName, RepositoryRule},
    },
};

/// Outcome of one `fetch` run, ordered by repository name.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub fetched: Vec<(RepositoryName, FetchResult)>,
    pub failed: Vec<(RepositoryName, EvaluationError<FetchError>)>,
}

impl FetchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn configuration_errors(&self) -> impl Iterator<Item = &RepositoryName> {
        self.failed
            .iter()
            .filter(|(_, error)| error.transience() == Transience::Persistent)
            .map(|(name, _)| name)
    }

    fn sort(&mut self) {
        self.fetched.sort_by(|a, b| a.0.cmp(&b.0));
        self.failed.sort_by(|a, b| a.0.cmp(&b.0));
    }
}

/// Handler to fetch command
///
/// Every selected repository is evaluated on its own blocking task. A
/// repository whose stamp matches its rule is reused; one whose rule changed
/// since the last run is removed and fetched again.
pub async fn do_fetch<C>(
    evaluator: Arc<Evaluator<GitCloneNode<C>>>,
    manifest: &Manifest,
    names: &[RepositoryName],
    output_dir: &Path,
    force: bool,
) -> anyhow::Result<FetchReport>
where
    C: VcsConnector + 'static,
{
    fetch_until(
        evaluator,
        manifest,
        names,
        output_dir,
        force,
        tokio::signal::ctrl_c(),
    )
    .await
}

/// Runs a fetch until every task is done or `shutdown` resolves.
///
/// Blocking tasks cannot be aborted once started, so on shutdown the running
/// ones are drained while the directory lock is still held, and none of them
/// writes a stamp.
async fn fetch_until<C, S>(
    evaluator: Arc<Evaluator<GitCloneNode<C>>>,
    manifest: &Manifest,
    names: &[RepositoryName],
    output_dir: &Path,
    force: bool,
    shutdown: S,
) -> anyhow::Result<FetchReport>
where
    C: VcsConnector + 'static,
    S: Future,
{
    let _lock = DirectoryLock::acquire(output_dir)?;
    let mut report = FetchReport::default();
    let mut tasks = JoinSet::new();
    let cancelled = Arc::new(AtomicBool::new(false));

    for (name, rule) in select(manifest, names)? {
        let descriptor = FetchDescriptor::for_rule(&name, &rule, output_dir)?;
        let stamp = stamp_path(output_dir, &name);

        if descriptor.destination().exists() {
            if !force && is_up_to_date(&stamp, &descriptor) {
                info!("{} is up to date at {}", name, descriptor.destination().display());
                let path = descriptor.destination().to_path_buf();
                report.fetched.push((name, FetchResult::new(path)));
                continue;
            }
            info!("Removing stale checkout of {}", name);
            std::fs::remove_dir_all(descriptor.destination())?;
        }
        remove_if_exists(&stamp)?;
        // The checkout is gone from disk, so is any value remembered for it.
        evaluator.invalidate(&descriptor);

        let evaluator = Arc::clone(&evaluator);
        let cancelled = Arc::clone(&cancelled);
        tasks.spawn_blocking(move || {
            let outcome = evaluator.evaluate(&descriptor);
            if outcome.is_ok() && !cancelled.load(Ordering::SeqCst) {
                if let Err(error) = std::fs::write(&stamp, descriptor.to_string()) {
                    warn!("Could not write {}: {}", stamp.display(), error);
                }
            }
            (name, outcome)
        });
    }

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                Some(Ok((name, Ok(result)))) => report.fetched.push((name, result)),
                Some(Ok((name, Err(error)))) => report.failed.push((name, error)),
                Some(Err(error)) => {
                    while tasks.join_next().await.is_some() {}
                    return Err(error.into());
                }
                None => break,
            },
            _ = &mut shutdown => {
                cancelled.store(true, Ordering::SeqCst);
                tasks.abort_all();
                warn!("Interrupted, waiting for running fetches to finish");
                while tasks.join_next().await.is_some() {}
                bail!("Interrupted while fetching, destinations may be incomplete");
            }
        }
    }

    report.sort();
    Ok(report)
}

/// Handler to clean command
pub fn do_clean(
    manifest: &Manifest,
    names: &[RepositoryName],
    output_dir: &Path,
) -> anyhow::Result<()> {
    let _lock = DirectoryLock::acquire(output_dir)?;

    for (name, _) in select(manifest, names)? {
        let destination = output_dir.join(name.as_str());
        info!("Cleaning {} at {}.", name, destination.display());
        match std::fs::remove_dir_all(&destination) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("{} is already removed, nothing to do", destination.display());
            }
            otherwise => otherwise?,
        }
        remove_if_exists(&stamp_path(output_dir, &name))?;
    }

    Ok(())
}

/// The named repositories, or all of them when no name is given.
fn select(
    manifest: &Manifest,
    names: &[RepositoryName],
) -> anyhow::Result<BTreeMap<RepositoryName, RepositoryRule>> {
    if names.is_empty() {
        return Ok(manifest.repositories.clone());
    }
    names
        .iter()
        .map(|name| {
            manifest
                .repositories
                .get(name)
                .map(|rule| (name.clone(), rule.clone()))
                .ok_or_else(|| anyhow!("No repository named {} in the manifest", name))
        })
        .collect()
}

fn stamp_path(output_dir: &Path, name: &RepositoryName) -> PathBuf {
    output_dir.join(format!(".{}.stamp", name))
}

fn is_up_to_date(stamp: &Path, descriptor: &FetchDescriptor) -> bool {
    match std::fs::read_to_string(stamp) {
        Ok(contents) => contents == descriptor.to_string(),
        Err(error) => {
            debug!("No usable stamp at {}: {}", stamp.display(), error);
            false
        }
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        otherwise => otherwise,
    }
}
