use thiserror::Error;

pub mod descriptor;
pub mod manifest;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading manifest: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Missing value for `{0}`")]
    MissingValue(&'static str),
    #[error("Destination `{0}` is not an absolute path")]
    RelativeDestination(String),
    #[error("Repository name `{0}` is not a valid directory name")]
    InvalidRepositoryName(String),
}
