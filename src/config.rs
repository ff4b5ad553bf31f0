// Licensed under the MIT License.

//! The `tmsync` project configuration file: how this engine itself is
//! told which project, repositories, and locales to reconcile. Distinct
//! from the per-project path-mapping configuration consumed by
//! [`crate::path_resolver::ConfigPathResolver`], which lives inside the
//! localization repository being synced, not this file.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::errors::{Error, Result};

/// The configuration file structures as explicitly serialized into the
/// TOML format.
mod syntax {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct SerializedConfiguration {
        pub project: ProjectConfig,
        #[serde(default)]
        pub repositories: Vec<RepositoryConfig>,
        #[serde(default)]
        pub locales: Vec<String>,
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct ProjectConfig {
        pub slug: String,
        #[serde(default)]
        pub configuration_file: Option<String>,
        pub checkout_path: String,
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct RepositoryConfig {
        pub url: String,
        #[serde(default = "default_branch")]
        pub branch: String,
        pub checkout_path: String,
        #[serde(default)]
        pub source_repo: bool,
    }

    fn default_branch() -> String {
        "main".to_owned()
    }
}

pub use syntax::{ProjectConfig, RepositoryConfig};

/// The normalized, runtime form of the on-disk configuration file.
#[derive(Clone, Debug)]
pub struct ConfigurationFile {
    pub project: ProjectConfig,
    pub repositories: Vec<RepositoryConfig>,
    pub locales: Vec<String>,
}

impl Default for ConfigurationFile {
    fn default() -> Self {
        ConfigurationFile {
            project: ProjectConfig {
                slug: "default".to_owned(),
                configuration_file: None,
                checkout_path: ".".to_owned(),
            },
            repositories: Vec::new(),
            locales: Vec::new(),
        }
    }
}

impl ConfigurationFile {
    /// Load `path`, falling back to [`Default`] if it does not exist —
    /// the same "missing file is not an error" convention the teacher's
    /// own `ConfigurationFile::get` uses.
    pub fn get<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut f = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut text = String::new();
        f.read_to_string(&mut text)?;

        let sercfg: syntax::SerializedConfiguration =
            toml::from_str(&text).map_err(|source| Error::Configuration {
                path: path.as_ref().to_string_lossy().into_owned(),
                source,
            })?;

        Ok(ConfigurationFile {
            project: sercfg.project,
            repositories: sercfg.repositories,
            locales: sercfg.locales,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_default() {
        let cfg = ConfigurationFile::get("/nonexistent/tmsync.toml").unwrap();
        assert_eq!(cfg.project.slug, "default");
    }

    #[test]
    fn parses_a_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tmsync.toml");
        std::fs::write(
            &path,
            r#"
            [project]
            slug = "demo"
            checkout_path = "checkouts/demo"

            [[repositories]]
            url = "https://example.com/demo-l10n.git"
            checkout_path = "checkouts/demo/en-US"
            source_repo = true

            locales = ["de", "fr"]
            "#,
        )
        .unwrap();

        let cfg = ConfigurationFile::get(&path).unwrap();
        assert_eq!(cfg.project.slug, "demo");
        assert_eq!(cfg.repositories.len(), 1);
        assert_eq!(cfg.locales, vec!["de".to_string(), "fr".to_string()]);
    }
}
