use std::{io, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not installed")]
    NotInstalled,
    #[error("already installed")]
    AlreadyInstalled,
    #[error("service is not running")]
    NotRunning,
    #[error("permission denied")]
    PermissionDenied,
    #[error("OS not supported")]
    OsNotSupported,
    #[error("invalid service definition: {0}")]
    InvalidDefinition(String),
    /// The control command could not be executed at all.
    #[error("{command:?} failed to run: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    /// The control command ran but did not satisfy the success policy.
    #[error("{command:?} failed: {reason}")]
    Command { command: String, reason: String },
    #[error("{path:?}: {source}")]
    Fs {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    #[inline]
    pub(crate) fn fs<P: Into<PathBuf>>(path: P) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Fs { path, source }
    }
}
