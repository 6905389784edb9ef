use std::{env, path::PathBuf, sync::Arc};

use anyhow::anyhow;
use home::home_dir;

use crate::{
    config::RepofetchConfig, engine::Evaluator, fetch::GitCloneNode, git::Git2Connector,
    Repofetch,
};

const DEFAULT_RETRIES: u32 = 2;

#[derive(Default)]
pub struct RepofetchBuilder {
    // All other paths are relative to `root`
    root: Option<PathBuf>,
    manifest_file_name: Option<PathBuf>,
    output_directory: Option<PathBuf>,
    retries: Option<u32>,
    cleanup_on_failure: Option<bool>,
}

impl RepofetchBuilder {
    /// Project root directory.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Name of the manifest toml file.
    ///
    /// Defaults to `repofetch.toml`.
    pub fn manifest_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_file_name = Some(path.into());
        self
    }

    /// Directory repositories are materialized into, one subdirectory each.
    ///
    /// Defaults to `REPOFETCH_OUTPUT_DIR`, then `$HOME/.repofetch/repositories`.
    pub fn output_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(path.into());
        self
    }

    /// Extra attempts after a transient failure.
    ///
    /// Defaults to `REPOFETCH_FETCH_RETRIES`, then 2.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Whether a destination written by a failed fetch is removed.
    ///
    /// Defaults to `REPOFETCH_FETCH_CLEANUP`, then `true`.
    pub fn cleanup_on_failure(mut self, enabled: bool) -> Self {
        self.cleanup_on_failure = Some(enabled);
        self
    }

    pub fn try_build(self) -> anyhow::Result<Repofetch> {
        let Self {
            root,
            manifest_file_name,
            output_directory,
            retries,
            cleanup_on_failure,
        } = self;
        let config = RepofetchConfig::load()?;

        // Destinations must be absolute.
        let root = match root {
            Some(root) if root.is_absolute() => root,
            Some(root) => env::current_dir()?.join(root),
            None => env::current_dir()?,
        };

        let manifest_file_name =
            manifest_file_name.unwrap_or_else(|| PathBuf::from("repofetch.toml"));

        let output_directory = match output_directory.or(config.output_dir) {
            Some(output_directory) => root.join(output_directory),
            None => default_output_directory()?,
        };

        let node = GitCloneNode::new(Git2Connector::default())
            .cleanup_on_failure(cleanup_on_failure.or(config.cleanup).unwrap_or(true));
        let evaluator = Evaluator::new(node)
            .with_max_retries(retries.or(config.retries).unwrap_or(DEFAULT_RETRIES));

        Ok(Repofetch {
            evaluator: Arc::new(evaluator),
            root,
            manifest_file_name,
            output_directory,
        })
    }
}

fn default_output_directory() -> anyhow::Result<PathBuf> {
    let mut output_directory = home_dir()
        .ok_or_else(|| anyhow!("Could not find home dir. Please define $HOME env variable."))?;
    output_directory.push(".repofetch/repositories");
    Ok(output_directory)
}
