use std::{path::PathBuf, sync::Arc};

use crate::{
    cli::command_handlers::{do_clean, do_fetch, FetchReport},
    engine::Evaluator,
    fetch::GitCloneNode,
    git::Git2Connector,
    model::manifest::{Manifest, RepositoryName},
};

mod builder;

pub use builder::RepofetchBuilder;

pub struct Repofetch {
    evaluator: Arc<Evaluator<GitCloneNode<Git2Connector>>>,
    root: PathBuf,
    manifest_file_name: PathBuf,
    output_directory: PathBuf,
}

impl Repofetch {
    pub fn builder() -> RepofetchBuilder {
        RepofetchBuilder::default()
    }

    /// Fetches the named repositories, or every repository of the manifest
    pub async fn fetch(
        &self,
        names: &[RepositoryName],
        force: bool,
    ) -> anyhow::Result<FetchReport> {
        let manifest = self.load_manifest()?;
        do_fetch(
            Arc::clone(&self.evaluator),
            &manifest,
            names,
            &self.output_directory,
            force,
        )
        .await
    }

    /// Deletes fetched repositories
    pub fn clean(&self, names: &[RepositoryName]) -> anyhow::Result<()> {
        let manifest = self.load_manifest()?;
        do_clean(&manifest, names, &self.output_directory)
    }

    pub fn output_directory(&self) -> &std::path::Path {
        &self.output_directory
    }

    fn load_manifest(&self) -> anyhow::Result<Manifest> {
        Ok(Manifest::from_file(&self.root.join(&self.manifest_file_name))?)
    }
}
