use std::{collections::BTreeMap, fmt::Display, path::Path};

use serde::{Deserialize, Serialize};

use crate::model::ParseError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryName {
    value: String,
}

impl RepositoryName {
    pub fn new(value: impl Into<String>) -> RepositoryName {
        RepositoryName {
            value: value.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    // Names become a single directory under the output directory, next to
    // the dot-files repofetch keeps there.
    fn validate(&self) -> Result<(), ParseError> {
        let value = self.value.as_str();
        if value.is_empty() || value.starts_with('.') || value.contains(['/', '\\']) {
            return Err(ParseError::InvalidRepositoryName(self.value.clone()));
        }
        Ok(())
    }
}

impl From<&str> for RepositoryName {
    fn from(value: &str) -> Self {
        RepositoryName::new(value)
    }
}

impl Display for RepositoryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// Attributes of one `[repositories.<name>]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRule {
    pub remote: String,
    pub checkout: String,
    #[serde(default)]
    pub init_submodules: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub repositories: BTreeMap<RepositoryName, RepositoryRule>,
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Manifest, ParseError> {
        log::debug!("Attempting to read manifest from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Manifest::from_toml_str(&contents)
    }

    pub fn from_toml_str(data: &str) -> Result<Manifest, ParseError> {
        let manifest = toml::from_str::<Manifest>(data)?;
        for (name, rule) in &manifest.repositories {
            name.validate()?;
            if rule.remote.is_empty() {
                return Err(ParseError::MissingValue("remote"));
            }
            if rule.checkout.is_empty() {
                return Err(ParseError::MissingValue("checkout"));
            }
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn load_valid_manifest() {
        let str = r#"
            [repositories.rules_rust]
            remote = "https://github.com/bazelbuild/rules_rust.git"
            checkout = "0.40.0"

            [repositories.installer]
            remote = "https://github.com/rust-lang/rust-installer.git"
            checkout = "main"
            init_submodules = true
        "#;
        let expected = Manifest {
            repositories: BTreeMap::from([
                (
                    RepositoryName::from("rules_rust"),
                    RepositoryRule {
                        remote: "https://github.com/bazelbuild/rules_rust.git".to_string(),
                        checkout: "0.40.0".to_string(),
                        init_submodules: false,
                    },
                ),
                (
                    RepositoryName::from("installer"),
                    RepositoryRule {
                        remote: "https://github.com/rust-lang/rust-installer.git".to_string(),
                        checkout: "main".to_string(),
                        init_submodules: true,
                    },
                ),
            ]),
        };
        assert_eq!(Manifest::from_toml_str(str).unwrap(), expected);
    }

    #[test]
    fn load_empty_manifest() {
        assert_eq!(Manifest::from_toml_str("").unwrap(), Manifest::default());
    }

    #[test]
    fn load_missing_checkout() {
        let str = r#"
            [repositories.foo]
            remote = "https://example/foo.git"
        "#;
        assert!(matches!(
            Manifest::from_toml_str(str),
            Err(ParseError::Toml(_))
        ));
    }

    #[test]
    fn load_empty_remote() {
        let str = r#"
            [repositories.foo]
            remote = ""
            checkout = "main"
        "#;
        assert!(matches!(
            Manifest::from_toml_str(str),
            Err(ParseError::MissingValue("remote"))
        ));
    }

    #[test]
    fn load_invalid_name() {
        let str = r#"
            [repositories."../escape"]
            remote = "https://example/foo.git"
            checkout = "main"
        "#;
        assert!(matches!(
            Manifest::from_toml_str(str),
            Err(ParseError::InvalidRepositoryName(_))
        ));
    }
}
