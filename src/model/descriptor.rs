use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use crate::model::{
    manifest::{RepositoryName, RepositoryRule},
    ParseError,
};

/// Identifies one desired repository state.
///
/// Used as the cache key of the evaluation engine, so equality and hashing are
/// structural over every field and the fields cannot be changed once built.
/// No normalization happens: `https://host/repo` and `https://host/repo.git`
/// are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchDescriptor {
    remote: String,
    checkout: String,
    init_submodules: bool,
    destination: PathBuf,
}

impl FetchDescriptor {
    pub fn new(
        remote: impl Into<String>,
        checkout: impl Into<String>,
        init_submodules: bool,
        destination: impl Into<PathBuf>,
    ) -> Result<FetchDescriptor, ParseError> {
        let remote = remote.into();
        let checkout = checkout.into();
        let destination = destination.into();

        if remote.is_empty() {
            return Err(ParseError::MissingValue("remote"));
        }
        if checkout.is_empty() {
            return Err(ParseError::MissingValue("checkout"));
        }
        if !destination.is_absolute() {
            return Err(ParseError::RelativeDestination(
                destination.to_string_lossy().to_string(),
            ));
        }

        Ok(FetchDescriptor {
            remote,
            checkout,
            init_submodules,
            destination,
        })
    }

    /// Builds the key for a manifest rule, materialized under `output_dir/name`.
    pub fn for_rule(
        name: &RepositoryName,
        rule: &RepositoryRule,
        output_dir: &Path,
    ) -> Result<FetchDescriptor, ParseError> {
        FetchDescriptor::new(
            rule.remote.clone(),
            rule.checkout.clone(),
            rule.init_submodules,
            output_dir.join(name.as_str()),
        )
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn checkout(&self) -> &str {
        &self.checkout
    }

    pub fn init_submodules(&self) -> bool {
        self.init_submodules
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

impl Display for FetchDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{} -> {} (submodules: {})",
            self.remote,
            self.checkout,
            self.destination.display(),
            self.init_submodules
        )
    }
}

/// The materialized repository, as seen by dependents in the build graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchResult {
    path: PathBuf,
}

impl FetchResult {
    pub(crate) fn new(path: PathBuf) -> FetchResult {
        FetchResult { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}
