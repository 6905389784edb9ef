use std::{
    fs::File,
    path::{Path, PathBuf},
};

use fs4::fs_std::FileExt;
use log::{debug, info};
use thiserror::Error;

const LOCK_FILE_NAME: &str = ".lock";

/// Exclusive lock over an output directory, held until dropped.
///
/// Two `repofetch` processes sharing an output directory would otherwise race
/// on the same destinations.
pub struct DirectoryLock {
    _file: File,
    path: PathBuf,
}

#[derive(Error, Debug)]
#[error("Could not lock {path}: {source}")]
pub struct Error {
    path: String,
    source: std::io::Error,
}

impl DirectoryLock {
    pub fn acquire(directory: &Path) -> Result<Self, Error> {
        let path = directory.join(LOCK_FILE_NAME);
        let error = |source| Error {
            path: path.display().to_string(),
            source,
        };

        std::fs::create_dir_all(directory).map_err(error)?;
        let file = File::create(&path).map_err(error)?;

        debug!("Acquiring a lock on {}", path.display());
        FileExt::lock_exclusive(&file).map_err(error)?;
        info!("Acquired a lock on {}", directory.display());

        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
