use std::{collections::HashMap, path::PathBuf};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

pub struct RepofetchConfig {
    pub output_dir: Option<PathBuf>,
    pub retries: Option<u32>,
    pub cleanup: Option<bool>,
}

impl RepofetchConfig {
    pub fn load() -> anyhow::Result<Self> {
        let raw_config = RawConfig::load(None)?;

        Ok(Self {
            output_dir: raw_config.output.dir,
            retries: raw_config.fetch.retries,
            cleanup: raw_config.fetch.cleanup,
        })
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    output: OutputConfig,
    #[serde(default)]
    fetch: FetchConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct OutputConfig {
    dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct FetchConfig {
    retries: Option<u32>,
    cleanup: Option<bool>,
}

impl RawConfig {
    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("REPOFETCH")
                    .separator("_")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
