use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    cert::Cert,
    CertificateCheckStatus, Config, Cred, CredentialType, ErrorClass, ErrorCode, FetchOptions,
    Object, RemoteCallbacks, Repository, SubmoduleUpdateOptions,
};
use log::{debug, trace};
use ssh_key::{known_hosts::HostPatterns, KnownHosts};

use super::{VcsClient, VcsConnector, VcsError};

const GLOBAL_KNOWN_HOSTS: &str = "/etc/ssh/ssh_known_hosts";
const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "ssh", "git", "file"];

/// Opens [`Git2Client`]s backed by libgit2.
#[derive(Debug, Clone)]
pub struct Git2Connector {
    known_hosts: Vec<PathBuf>,
}

impl Git2Connector {
    pub fn new(known_hosts: Vec<PathBuf>) -> Self {
        Self { known_hosts }
    }
}

impl Default for Git2Connector {
    fn default() -> Self {
        let mut known_hosts = vec![PathBuf::from(GLOBAL_KNOWN_HOSTS)];
        if let Some(home) = home::home_dir() {
            known_hosts.push(home.join(".ssh").join("known_hosts"));
        }
        Self::new(known_hosts)
    }
}

impl VcsConnector for Git2Connector {
    type Client = Git2Client;

    fn connect(&self) -> Git2Client {
        Git2Client::new(self.known_hosts.clone())
    }
}

pub struct Git2Client {
    repo: Option<Repository>,
    git_config: Option<Config>,
    known_hosts: Vec<PathBuf>,
}

impl Git2Client {
    pub fn new(known_hosts: Vec<PathBuf>) -> Self {
        Self {
            repo: None,
            git_config: None,
            known_hosts,
        }
    }

    fn repository(&self) -> Result<&Repository, VcsError> {
        self.repo.as_ref().ok_or(VcsError::Closed)
    }

    fn fetch_options(&self) -> FetchOptions<'_> {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |url, username, allowed_types| {
            trace!(
                "Requested credentials for {}, username {:?}, allowed types {:?}",
                url,
                username,
                allowed_types
            );
            // Asking for ssh username
            if allowed_types.contains(CredentialType::USERNAME) {
                return Cred::username("git");
            }
            // SSH auth
            if allowed_types.contains(CredentialType::SSH_KEY) {
                return Cred::ssh_key_from_agent(username.unwrap_or("git"));
            }
            // HTTP auth
            if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
                if let Some(git_config) = &self.git_config {
                    return Cred::credential_helper(git_config, url, username);
                }
            }
            Err(git2::Error::from_str("no valid authentication available"))
        });

        callbacks.certificate_check(|certificate, host| self.check_certificate(certificate, host));

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(callbacks);
        fetch_options
    }

    fn check_certificate(
        &self,
        certificate: &Cert<'_>,
        host: &str,
    ) -> Result<CertificateCheckStatus, git2::Error> {
        let Some(hostkey) = certificate.as_hostkey().and_then(|h| h.hostkey()) else {
            return Ok(CertificateCheckStatus::CertificatePassthrough);
        };
        for known_hosts in &self.known_hosts {
            trace!("Loading {}", known_hosts.display());
            match KnownHosts::read_file(known_hosts) {
                Ok(entries) => {
                    let matched = entries.iter().any(|entry| {
                        host_matches_patterns(host, entry.host_patterns())
                            && entry.public_key().to_bytes().as_deref() == Ok(hostkey)
                    });
                    if matched {
                        trace!("Known host entry for {} matches the host key", host);
                        return Ok(CertificateCheckStatus::CertificateOk);
                    }
                }
                Err(error) => trace!("Could not load {}: {}", known_hosts.display(), error),
            }
        }
        trace!("No known host entry matched the host key of {}", host);
        Ok(CertificateCheckStatus::CertificatePassthrough)
    }

    fn resolve<'r>(repo: &'r Repository, start_point: &str) -> Result<Object<'r>, VcsError> {
        match repo.revparse_single(start_point) {
            Ok(object) => Ok(object),
            // Branches other than the default one only exist as remote-tracking refs.
            Err(error) if error.code() == ErrorCode::NotFound => repo
                .revparse_single(&format!("origin/{start_point}"))
                .map_err(|_| ref_error(error)),
            Err(error) => Err(ref_error(error)),
        }
    }
}

impl VcsClient for Git2Client {
    fn clone_repository(
        &mut self,
        remote: &str,
        destination: &Path,
        clone_submodules: bool,
    ) -> Result<(), VcsError> {
        validate_scheme(remote)?;

        self.git_config = match Config::open_default() {
            Ok(config) => Some(config),
            Err(error) => {
                debug!("Could not open the default git config: {}", error);
                None
            }
        };

        trace!("Cloning {} into {}", remote, destination.display());
        let repo = {
            let mut builder = RepoBuilder::new();
            builder.fetch_options(self.fetch_options());
            builder.clone(remote, destination).map_err(clone_error)?
        };
        self.repo = Some(repo);

        if clone_submodules && !self.submodule_init()?.is_empty() {
            self.submodule_update()?;
        }
        Ok(())
    }

    fn create_and_checkout_branch(
        &mut self,
        name: &str,
        start_point: &str,
    ) -> Result<(), VcsError> {
        let repo = self.repository()?;
        let commit = Self::resolve(repo, start_point)?
            .peel_to_commit()
            .map_err(ref_error)?;
        trace!("Creating branch {} at {}", name, commit.id());

        repo.branch(name, &commit, false).map_err(ref_error)?;
        repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
        repo.set_head(&format!("refs/heads/{name}"))?;
        Ok(())
    }

    fn submodule_init(&mut self) -> Result<BTreeSet<String>, VcsError> {
        let repo = self.repository()?;
        let mut initialized = BTreeSet::new();
        for mut submodule in repo.submodules()? {
            submodule.init(false)?;
            let name = match submodule.name() {
                Some(name) => name.to_string(),
                None => submodule.path().to_string_lossy().to_string(),
            };
            trace!("Initialized submodule {}", name);
            initialized.insert(name);
        }
        Ok(initialized)
    }

    fn submodule_update(&mut self) -> Result<(), VcsError> {
        let repo = self.repository()?;
        for mut submodule in repo.submodules()? {
            trace!("Updating submodule {}", submodule.path().display());
            let mut options = SubmoduleUpdateOptions::new();
            options.fetch(self.fetch_options());
            submodule.update(true, Some(&mut options))?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(repo) = self.repo.take() {
            trace!("Closing repository at {}", repo.path().display());
        }
        self.git_config = None;
    }
}

fn validate_scheme(remote: &str) -> Result<(), VcsError> {
    match remote.split_once("://") {
        Some((scheme, _)) if !SUPPORTED_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) => {
            Err(VcsError::InvalidRemote(format!(
                "unsupported URL protocol `{scheme}` in {remote}"
            )))
        }
        _ => Ok(()),
    }
}

fn clone_error(error: git2::Error) -> VcsError {
    let message = error.message().to_string();
    match (error.code(), error.class()) {
        // The destination is already populated, nothing wrong with the remote.
        (ErrorCode::Exists, _) => VcsError::Operation(message),
        (
            ErrorCode::Auth | ErrorCode::Certificate | ErrorCode::InvalidSpec | ErrorCode::NotFound,
            _,
        ) => VcsError::InvalidRemote(message),
        (_, ErrorClass::Net | ErrorClass::Invalid) if is_url_error(&message) => {
            VcsError::InvalidRemote(message)
        }
        (_, ErrorClass::Http) if http_status(&message).is_some_and(is_locator_status) => {
            VcsError::InvalidRemote(message)
        }
        _ => VcsError::Operation(message),
    }
}

fn is_url_error(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("url") || message.contains("unsupported protocol")
}

fn http_status(message: &str) -> Option<u16> {
    let (_, rest) = message.split_once("status code: ")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Answers that will not change until the remote locator or credentials do.
/// 408 and 429 are timeouts and throttling and stay retryable.
fn is_locator_status(status: u16) -> bool {
    matches!(status, 400 | 401 | 403 | 404 | 410)
}

fn ref_error(error: git2::Error) -> VcsError {
    let message = error.message().to_string();
    match error.code() {
        ErrorCode::NotFound | ErrorCode::Ambiguous => VcsError::RefNotFound(message),
        ErrorCode::InvalidSpec => VcsError::InvalidRefName(message),
        _ => VcsError::Operation(message),
    }
}

fn host_matches_patterns(host: &str, patterns: &HostPatterns) -> bool {
    match patterns {
        HostPatterns::Patterns(patterns) => {
            let mut match_found = false;
            for pattern in patterns {
                let pattern = pattern.to_lowercase();
                // * and ? wildcards are not yet supported
                if let Some(pattern) = pattern.strip_prefix('!') {
                    if pattern == host {
                        return false;
                    }
                } else {
                    match_found |= pattern == host;
                }
            }
            match_found
        }
        // Not yet supported
        HostPatterns::HashedName { .. } => false,
    }
}
