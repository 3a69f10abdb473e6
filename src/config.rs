//! Service definitions loaded from YAML.

use std::{collections::BTreeMap, fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    service::{Restart, ServiceDefinition},
};

/// The on-disk form of a [`ServiceDefinition`].
///
/// ```yaml
/// name: webd
/// command: /usr/bin/webd --port 8080
/// description: Web daemon
/// working_dir: /srv/webd
/// dependencies: [network.target]
/// environment: { PORT: "8080" }
/// log_file: /var/log/webd.log
/// restart: on-failure
/// restart_sec: 10
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub name: String,

    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// systemd only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<Restart>,

    /// systemd only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_sec: Option<u64>,
}

impl ServiceConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(Error::fs(path))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Loads and validates a definition in one go.
    pub fn load_definition<P: AsRef<Path>>(path: P) -> Result<ServiceDefinition> {
        Self::load(path)?.try_into()
    }
}

impl TryFrom<ServiceConfig> for ServiceDefinition {
    type Error = Error;

    fn try_from(config: ServiceConfig) -> Result<Self> {
        let ServiceConfig {
            name,
            command,
            description,
            working_dir,
            dependencies,
            environment,
            log_file,
            log_dir,
            restart,
            restart_sec,
        } = config;

        let mut builder = ServiceDefinition::builder(name)
            .command(command)
            .description(description)
            .dependencies(dependencies)
            .environment(environment);

        if let Some(dir) = working_dir {
            builder = builder.working_dir(dir);
        }

        builder = match (log_file, log_dir) {
            (Some(_), Some(_)) => {
                return Err(Error::InvalidDefinition(
                    "log_file and log_dir are mutually exclusive".to_string(),
                ))
            }
            (Some(file), None) => builder.log_file(file),
            (None, Some(dir)) => builder.log_dir(dir),
            (None, None) => builder,
        };

        if let Some(restart) = restart {
            builder = builder.restart(restart);
        }
        if let Some(secs) = restart_sec {
            builder = builder.restart_sec(secs);
        }

        builder.build()
    }
}
