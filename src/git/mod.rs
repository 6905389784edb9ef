pub mod client;

use std::{collections::BTreeSet, path::Path};

use thiserror::Error;

pub use client::{Git2Client, Git2Connector};

/// Failures reported by a [`VcsClient`].
///
/// The variants mirror what the fetch node needs to tell apart; everything
/// that is not about the remote locator or the requested ref is `Operation`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VcsError {
    #[error("{0}")]
    InvalidRemote(String),
    #[error("{0}")]
    RefNotFound(String),
    #[error("{0}")]
    InvalidRefName(String),
    #[error("{0}")]
    Operation(String),
    #[error("Repository handle is not open")]
    Closed,
}

impl From<git2::Error> for VcsError {
    fn from(error: git2::Error) -> Self {
        VcsError::Operation(error.message().to_string())
    }
}

impl From<std::io::Error> for VcsError {
    fn from(error: std::io::Error) -> Self {
        VcsError::Operation(error.to_string())
    }
}

/// A stateful handle on one repository, opened per fetch.
///
/// `close` releases whatever the handle holds. Callers are expected to call it
/// exactly once, after which every other operation fails with
/// [`VcsError::Closed`].
pub trait VcsClient {
    fn clone_repository(
        &mut self,
        remote: &str,
        destination: &Path,
        clone_submodules: bool,
    ) -> Result<(), VcsError>;

    fn create_and_checkout_branch(&mut self, name: &str, start_point: &str)
        -> Result<(), VcsError>;

    /// Registers the submodules of the checked out tree and returns their names.
    fn submodule_init(&mut self) -> Result<BTreeSet<String>, VcsError>;

    /// Fetches and checks out registered submodules, one level deep.
    fn submodule_update(&mut self) -> Result<(), VcsError>;

    fn close(&mut self);
}

/// Opens a fresh [`VcsClient`] for every fetch.
pub trait VcsConnector: Send + Sync {
    type Client: VcsClient;

    fn connect(&self) -> Self::Client;
}
