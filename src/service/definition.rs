use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_WORKING_DIR: &str = "/";
const DEFAULT_LOG_DIR: &str = "/var/log";
const DEFAULT_RESTART_SEC: u64 = 10;

/// The logical attributes of a managed service.
///
/// Immutable once built; every backend renders its unit artifact from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    name: String,
    command: String,
    description: String,
    working_dir: PathBuf,
    dependencies: Vec<String>,
    environment: BTreeMap<String, String>,
    log: LogTarget,
    restart: Restart,
    restart_sec: u64,
}

/// Where the managed process's stdout and stderr end up.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogTarget {
    /// `/var/log/<name>.log`
    #[default]
    Default,
    File(PathBuf),
    /// `<dir>/<name>.log`
    Directory(PathBuf),
}

/// systemd `Restart=` policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Restart {
    No,
    Always,
    OnSuccess,
    #[default]
    OnFailure,
    OnAbnormal,
    OnAbort,
    OnWatchdog,
}

impl Restart {
    pub fn as_str(&self) -> &'static str {
        match self {
            Restart::No => "no",
            Restart::Always => "always",
            Restart::OnSuccess => "on-success",
            Restart::OnFailure => "on-failure",
            Restart::OnAbnormal => "on-abnormal",
            Restart::OnAbort => "on-abort",
            Restart::OnWatchdog => "on-watchdog",
        }
    }
}

impl fmt::Display for Restart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Restart {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim() {
            "no" => Restart::No,
            "always" => Restart::Always,
            "on-success" => Restart::OnSuccess,
            "on-failure" => Restart::OnFailure,
            "on-abnormal" => Restart::OnAbnormal,
            "on-abort" => Restart::OnAbort,
            "on-watchdog" => Restart::OnWatchdog,
            other => {
                return Err(Error::InvalidDefinition(format!(
                    "unknown restart policy {other:?}"
                )))
            }
        })
    }
}

impl ServiceDefinition {
    pub fn builder<S: Into<String>>(name: S) -> ServiceDefinitionBuilder {
        ServiceDefinitionBuilder {
            definition: ServiceDefinition {
                name: name.into(),
                command: String::new(),
                description: String::new(),
                working_dir: PathBuf::from(DEFAULT_WORKING_DIR),
                dependencies: vec![],
                environment: Default::default(),
                log: Default::default(),
                restart: Default::default(),
                restart_sec: DEFAULT_RESTART_SEC,
            },
        }
    }

    /// A definition carrying nothing but a name, enough to drive an already
    /// installed unit.
    pub fn named<S: Into<String>>(name: S) -> Result<Self> {
        Self::builder(name).build()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    #[inline]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    #[inline]
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    #[inline]
    pub fn restart(&self) -> Restart {
        self.restart
    }

    #[inline]
    pub fn restart_sec(&self) -> u64 {
        self.restart_sec
    }

    #[inline]
    pub fn log_target(&self) -> &LogTarget {
        &self.log
    }

    /// The concrete file receiving the process output.
    pub fn log_file(&self) -> PathBuf {
        let file_name = format!("{}.log", self.name);
        match &self.log {
            LogTarget::Default => Path::new(DEFAULT_LOG_DIR).join(file_name),
            LogTarget::File(path) => path.clone(),
            LogTarget::Directory(dir) => dir.join(file_name),
        }
    }

    /// `<working_dir>/<name>.env`, read by systemd if it exists.
    pub fn environment_file(&self) -> PathBuf {
        self.working_dir.join(format!("{}.env", self.name))
    }

    /// A copy of this definition with its environment replaced.
    pub fn with_environment(&self, environment: BTreeMap<String, String>) -> Result<Self> {
        let mut definition = self.clone();
        definition.environment = environment;
        definition.validate()?;
        Ok(definition)
    }

    /// Fails unless the definition carries something to execute.
    pub(crate) fn require_command(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(Error::InvalidDefinition(format!(
                "service {:?} has no command",
                self.name
            )));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;

        for dep in self.dependencies.iter() {
            validate_name(dep)?;
        }

        for (field, value) in [
            ("command", self.command.as_str()),
            ("description", self.description.as_str()),
        ] {
            reject_control_chars(field, value)?;
        }

        for (field, path) in [
            ("working_dir", Some(self.working_dir.as_path())),
            (
                "log",
                match &self.log {
                    LogTarget::Default => None,
                    LogTarget::File(p) | LogTarget::Directory(p) => Some(p.as_path()),
                },
            ),
        ] {
            if let Some(path) = path {
                let text = path.to_str().ok_or_else(|| {
                    Error::InvalidDefinition(format!("{field} {path:?} is not valid UTF-8"))
                })?;
                reject_control_chars(field, text)?;
            }
        }

        for (key, value) in self.environment.iter() {
            validate_env_key(key)?;
            reject_control_chars(key, value)?;
        }

        Ok(())
    }
}

pub struct ServiceDefinitionBuilder {
    definition: ServiceDefinition,
}

impl ServiceDefinitionBuilder {
    pub fn command<S: Into<String>>(mut self, command: S) -> Self {
        self.definition.command = command.into();
        self
    }

    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.definition.description = description.into();
        self
    }

    pub fn working_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.definition.working_dir = dir.into();
        self
    }

    pub fn dependency<S: Into<String>>(mut self, name: S) -> Self {
        self.definition.dependencies.push(name.into());
        self
    }

    pub fn dependencies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.definition
            .dependencies
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.definition.environment.insert(key.into(), value.into());
        self
    }

    pub fn environment<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.definition
            .environment
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn log_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.definition.log = LogTarget::File(path.into());
        self
    }

    pub fn log_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.definition.log = LogTarget::Directory(dir.into());
        self
    }

    pub fn restart(mut self, restart: Restart) -> Self {
        self.definition.restart = restart;
        self
    }

    pub fn restart_sec(mut self, secs: u64) -> Self {
        self.definition.restart_sec = secs;
        self
    }

    pub fn build(self) -> Result<ServiceDefinition> {
        self.definition.validate()?;
        Ok(self.definition)
    }
}

/// Names end up in file names, unit names and shell scripts.
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | ':'));

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidDefinition(format!(
            "{name:?} is not a valid service name"
        )))
    }
}

fn validate_env_key(key: &str) -> Result<()> {
    let mut chars = key.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidDefinition(format!(
            "{key:?} is not a valid environment variable name"
        )))
    }
}

fn reject_control_chars(field: &str, value: &str) -> Result<()> {
    if value.chars().any(|c| c.is_control()) {
        return Err(Error::InvalidDefinition(format!(
            "{field} contains control characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let def = ServiceDefinition::builder("webd")
            .command("/usr/bin/webd")
            .build()
            .unwrap();

        assert_eq!(def.working_dir(), Path::new("/"));
        assert_eq!(def.restart(), Restart::OnFailure);
        assert_eq!(def.restart_sec(), 10);
        assert_eq!(def.log_file(), Path::new("/var/log/webd.log"));
        assert_eq!(def.environment_file(), Path::new("/webd.env"));
    }

    #[test]
    fn test_log_dir() {
        let def = ServiceDefinition::builder("webd")
            .log_dir("/var/log/apps")
            .build()
            .unwrap();
        assert_eq!(def.log_file(), Path::new("/var/log/apps/webd.log"));
    }

    #[test]
    fn test_reject_bad_names() {
        for name in ["", ".", "..", "a/b", "a b", "-x", "x;rm -rf /", "x\ny"] {
            assert!(
                matches!(
                    ServiceDefinition::named(name),
                    Err(Error::InvalidDefinition(_))
                ),
                "{name:?} accepted"
            );
        }
        assert!(ServiceDefinition::named("getty@tty1.service").is_ok());
    }

    #[test]
    fn test_reject_bad_environment() {
        let res = ServiceDefinition::builder("webd").env("1BAD", "x").build();
        assert!(matches!(res, Err(Error::InvalidDefinition(_))));

        let res = ServiceDefinition::builder("webd").env("OK", "a\nb").build();
        assert!(matches!(res, Err(Error::InvalidDefinition(_))));
    }

    #[test]
    fn test_with_environment_keeps_original() {
        let def = ServiceDefinition::builder("webd")
            .env("A", "1")
            .build()
            .unwrap();
        let updated = def
            .with_environment(BTreeMap::from([("B".to_string(), "2".to_string())]))
            .unwrap();

        assert_eq!(def.environment().get("A").map(String::as_str), Some("1"));
        assert_eq!(updated.environment().len(), 1);
        assert!(updated.environment().contains_key("B"));
    }

    #[test]
    fn test_require_command() {
        let def = ServiceDefinition::named("webd").unwrap();
        assert!(matches!(
            def.require_command(),
            Err(Error::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_restart_from_str() {
        assert_eq!("always".parse::<Restart>().unwrap(), Restart::Always);
        assert_eq!(Restart::OnAbnormal.to_string(), "on-abnormal");
        assert!("sometimes".parse::<Restart>().is_err());
    }
}
