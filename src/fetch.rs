use std::{
    fmt::Display,
    ops::{Deref, DerefMut},
    path::Path,
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    engine::{Classify, NodeFunction, Transience},
    git::{VcsClient, VcsConnector, VcsError},
    model::descriptor::{FetchDescriptor, FetchResult},
};

/// Computation-kind identifier the node is registered under.
pub const GIT_CLONE: &str = "GIT_CLONE";

/// Local branch every fetched working tree ends up on.
pub const CHECKOUT_BRANCH: &str = "repofetch-checkout";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Cloning,
    CheckingOut,
    SubmoduleInit,
    SubmoduleUpdate,
}

impl Display for FetchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStage::Cloning => f.write_str("cloning"),
            FetchStage::CheckingOut => f.write_str("checking out"),
            FetchStage::SubmoduleInit => f.write_str("initializing submodules"),
            FetchStage::SubmoduleUpdate => f.write_str("updating submodules"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Invalid Git repository URI {remote}: {message}")]
    InvalidRemote { remote: String, message: String },
    #[error("Invalid branch, tag, or commit {checkout}: {message}")]
    InvalidCheckout { checkout: String, message: String },
    #[error("Git error while {stage}: {message}")]
    Vcs { stage: FetchStage, message: String },
}

impl FetchError {
    fn classify(stage: FetchStage, descriptor: &FetchDescriptor, error: VcsError) -> FetchError {
        match error {
            VcsError::InvalidRemote(message) => FetchError::InvalidRemote {
                remote: descriptor.remote().to_string(),
                message,
            },
            VcsError::RefNotFound(message) | VcsError::InvalidRefName(message) => {
                FetchError::InvalidCheckout {
                    checkout: descriptor.checkout().to_string(),
                    message,
                }
            }
            other @ (VcsError::Operation(_) | VcsError::Closed) => FetchError::Vcs {
                stage,
                message: other.to_string(),
            },
        }
    }

    pub fn is_transient(&self) -> bool {
        self.transience() == Transience::Transient
    }
}

impl Classify for FetchError {
    fn transience(&self) -> Transience {
        match self {
            FetchError::InvalidRemote { .. } | FetchError::InvalidCheckout { .. } => {
                Transience::Persistent
            }
            FetchError::Vcs { .. } => Transience::Transient,
        }
    }
}

/// Closes the wrapped client when dropped, whichever way the fetch ends.
struct Session<C: VcsClient> {
    client: C,
}

impl<C: VcsClient> Deref for Session<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.client
    }
}

impl<C: VcsClient> DerefMut for Session<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.client
    }
}

impl<C: VcsClient> Drop for Session<C> {
    fn drop(&mut self) {
        self.client.close();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DestinationState {
    Absent,
    Empty,
    Populated,
}

impl DestinationState {
    fn of(path: &Path) -> DestinationState {
        match std::fs::read_dir(path) {
            Ok(mut entries) => match entries.next() {
                None => DestinationState::Empty,
                Some(_) => DestinationState::Populated,
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                DestinationState::Absent
            }
            // Unreadable or not a directory: leave it alone.
            Err(_) => DestinationState::Populated,
        }
    }
}

/// Materializes a git repository at the destination of a [`FetchDescriptor`].
///
/// The node performs one clone, one checkout onto [`CHECKOUT_BRANCH`] and, when
/// asked for, a single level of submodules. It never retries; failures are
/// classified so the caller can tell a flaky network from a broken rule.
pub struct GitCloneNode<C> {
    connector: C,
    cleanup_on_failure: bool,
}

impl<C: VcsConnector> GitCloneNode<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            cleanup_on_failure: true,
        }
    }

    /// Whether a destination created by a failed fetch is removed again.
    pub fn cleanup_on_failure(mut self, enabled: bool) -> Self {
        self.cleanup_on_failure = enabled;
        self
    }

    pub fn compute(&self, descriptor: &FetchDescriptor) -> Result<FetchResult, FetchError> {
        let destination = descriptor.destination();
        let initial_state = DestinationState::of(destination);
        info!("Fetching {}", descriptor);

        let outcome = {
            let mut session = Session {
                client: self.connector.connect(),
            };
            materialize(&mut *session, descriptor)
        };

        match outcome {
            Ok(()) => {
                info!("Fetched {} into {}", descriptor.remote(), destination.display());
                Ok(FetchResult::new(destination.to_path_buf()))
            }
            Err(error) => {
                debug!("Fetch of {} failed: {}", descriptor, error);
                if self.cleanup_on_failure && initial_state != DestinationState::Populated {
                    remove_partial_destination(destination, initial_state);
                }
                Err(error)
            }
        }
    }

    pub fn extract_tag(&self, _descriptor: &FetchDescriptor) -> Option<String> {
        None
    }
}

impl<C: VcsConnector> NodeFunction for GitCloneNode<C> {
    const NAME: &'static str = GIT_CLONE;

    type Key = FetchDescriptor;
    type Value = FetchResult;
    type Error = FetchError;

    fn compute(&self, key: &FetchDescriptor) -> Result<FetchResult, FetchError> {
        GitCloneNode::compute(self, key)
    }

    fn extract_tag(&self, key: &FetchDescriptor) -> Option<String> {
        GitCloneNode::extract_tag(self, key)
    }
}

fn materialize<C: VcsClient>(
    client: &mut C,
    descriptor: &FetchDescriptor,
) -> Result<(), FetchError> {
    let fail = |stage: FetchStage| {
        move |error: VcsError| FetchError::classify(stage, descriptor, error)
    };

    debug!("{}: {}", FetchStage::Cloning, descriptor.remote());
    // Submodules are handled below; recursive clones loop forever on
    // repositories that include themselves as a submodule.
    client
        .clone_repository(descriptor.remote(), descriptor.destination(), false)
        .map_err(fail(FetchStage::Cloning))?;

    debug!("{}: {}", FetchStage::CheckingOut, descriptor.checkout());
    client
        .create_and_checkout_branch(CHECKOUT_BRANCH, descriptor.checkout())
        .map_err(fail(FetchStage::CheckingOut))?;

    if descriptor.init_submodules() {
        debug!("{}", FetchStage::SubmoduleInit);
        let submodules = client
            .submodule_init()
            .map_err(fail(FetchStage::SubmoduleInit))?;
        if !submodules.is_empty() {
            debug!("{}: {:?}", FetchStage::SubmoduleUpdate, submodules);
            client
                .submodule_update()
                .map_err(fail(FetchStage::SubmoduleUpdate))?;
        }
    }

    Ok(())
}

fn remove_partial_destination(destination: &Path, initial_state: DestinationState) {
    let result = std::fs::remove_dir_all(destination).and_then(|_| {
        if initial_state == DestinationState::Empty {
            std::fs::create_dir(destination)
        } else {
            Ok(())
        }
    });
    match result {
        Ok(()) => debug!("Removed partial checkout at {}", destination.display()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => warn!(
            "Could not remove partial checkout at {}: {}",
            destination.display(),
            error
        ),
    }
}
