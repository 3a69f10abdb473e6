//!
//! Service Manager
//!
//! A uniform lifecycle interface (install, start, stop, restart, status, pid,
//! remove) over the host's init system. The backend is chosen once, when the
//! [`Service`] is built, by probing the host.

use std::{collections::BTreeMap, fmt, path::PathBuf, thread, time::Duration};

use crate::{
    error::{Error, Result},
    log::{info, warn},
};

mod command;
mod definition;
mod detect;
mod host;
mod render;
mod status;

pub mod linux;
pub mod macos;

pub use command::{CommandOutput, CommandRunner, ServiceCommand, SystemCommandRunner};
pub use definition::{LogTarget, Restart, ServiceDefinition, ServiceDefinitionBuilder};
pub use detect::{
    select_backend, BackendKind, HostProbe, Platform, PROCD_MARKER, SYSTEMD_MARKER,
    UPSTART_MARKER,
};
pub use host::Host;
pub use render::{render, render_for_host, CommandLine};
pub use status::{ServiceStatus, StatusParser};

/// The outcome of a lifecycle operation; displays as its result label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Installed,
    Started,
    Stopped,
    Restarted,
    Removed,
    Updated,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Installed => "installed",
            Action::Started => "started",
            Action::Stopped => "stopped",
            Action::Restarted => "restarted",
            Action::Removed => "removed",
            Action::Updated => "updated",
        })
    }
}

/// One init-system integration.
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn definition(&self) -> &ServiceDefinition;

    fn host(&self) -> &Host;

    /// The canonical artifact; its existence is the "installed" predicate.
    fn unit_path(&self) -> PathBuf;

    /// The on-disk unit identifier, e.g. `webd.service`.
    fn service_name(&self) -> String;

    fn install(&self, args: &[String]) -> Result<Action>;

    fn remove(&self) -> Result<Action>;

    fn start(&self) -> Result<Action>;

    fn stop(&self) -> Result<Action>;

    fn restart(&self) -> Result<Action>;

    fn status(&self) -> Result<ServiceStatus>;

    /// `-1` when the service is stopped or its PID cannot be determined.
    fn pid(&self) -> Result<i32>;

    fn update_environ(&self, env: &BTreeMap<String, String>) -> Result<Action>;

    /// Whether lifecycle operations require the root group.
    fn privileged(&self) -> bool {
        true
    }

    fn is_installed(&self) -> bool {
        self.unit_path().exists()
    }

    /// The privilege gate followed by the installed check.
    fn require_installed(&self) -> Result<()> {
        if self.privileged() {
            self.host().require_root()?;
        }
        if self.is_installed() {
            Ok(())
        } else {
            Err(Error::NotInstalled)
        }
    }

    /// The privilege gate followed by the not-installed check.
    fn require_not_installed(&self) -> Result<()> {
        if self.privileged() {
            self.host().require_root()?;
        }
        if self.is_installed() {
            Err(Error::AlreadyInstalled)
        } else {
            Ok(())
        }
    }
}

/// Restart for backends without a native restart command: stop, wait, start.
/// A failed stop is logged and does not prevent the start.
pub(crate) fn stop_then_start<B: Backend + ?Sized>(backend: &B, delay: Duration) -> Result<Action> {
    if let Err(err) = backend.stop() {
        warn!("stopping {} failed, starting anyway: {}", backend.service_name(), err);
    }
    if !delay.is_zero() {
        thread::sleep(delay);
    }
    backend.start()?;
    Ok(Action::Restarted)
}

/// Builds the backend for `kind`. This is the only place a kind becomes
/// behavior.
pub fn create_backend(
    kind: BackendKind,
    definition: ServiceDefinition,
    host: Host,
) -> Box<dyn Backend> {
    match kind {
        BackendKind::Systemd => Box::new(linux::systemd::Systemd::new(definition, host)),
        BackendKind::SysV => Box::new(linux::initd::SysV::new(definition, host)),
        BackendKind::Upstart => Box::new(linux::upstart::Upstart::new(definition, host)),
        BackendKind::Procd => Box::new(linux::initd::openwrt::Procd::new(definition, host)),
        BackendKind::Launchd => Box::new(macos::Launchd::new(definition, host)),
    }
}

/// A managed service, bound to the backend detected when it was created.
pub struct Service {
    backend: Box<dyn Backend>,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("kind", &self.kind())
            .field("name", &self.definition().name())
            .finish()
    }
}

impl Service {
    /// Binds `definition` to the init system of the local host.
    pub fn new(definition: ServiceDefinition) -> Self {
        Self::with_host(definition, Host::system())
    }

    /// Binds `definition` to the init system detected on `host`.
    pub fn with_host(definition: ServiceDefinition, host: Host) -> Self {
        let kind = select_backend(&host);
        Self::with_backend(kind, definition, host)
    }

    /// Skips detection and uses `kind`.
    pub fn with_backend(kind: BackendKind, definition: ServiceDefinition, host: Host) -> Self {
        info!("Service {} uses {}", definition.name(), kind);
        Self {
            backend: create_backend(kind, definition, host),
        }
    }

    /// Attaches to an already installed service knowing only its name.
    /// Installing or updating through it fails.
    pub fn attach(name: &str) -> Result<Self> {
        Self::attach_with_host(name, Host::system())
    }

    pub fn attach_with_host(name: &str, host: Host) -> Result<Self> {
        Ok(Self::with_host(ServiceDefinition::named(name)?, host))
    }

    /// A systemd unit named the way older releases wrote it, spaces replaced
    /// with underscores.
    pub fn legacy_unit(name: &str, host: Host) -> Result<Self> {
        let name = name.replace(' ', "_");
        Ok(Self::with_backend(
            BackendKind::Systemd,
            ServiceDefinition::named(name)?,
            host,
        ))
    }

    #[inline]
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    #[inline]
    pub fn definition(&self) -> &ServiceDefinition {
        self.backend.definition()
    }

    #[inline]
    pub fn unit_path(&self) -> PathBuf {
        self.backend.unit_path()
    }

    pub fn status(&self) -> Result<ServiceStatus> {
        self.backend.status()
    }

    pub fn restart(&self) -> Result<Action> {
        self.backend.restart()
    }

    pub fn start(&self) -> Result<Action> {
        self.backend.start()
    }

    pub fn stop(&self) -> Result<Action> {
        self.backend.stop()
    }

    pub fn update_environ(&self, env: &BTreeMap<String, String>) -> Result<Action> {
        self.backend.update_environ(env)
    }

    pub fn install(&self, args: &[String]) -> Result<Action> {
        self.backend.install(args)
    }

    pub fn remove(&self) -> Result<Action> {
        self.backend.remove()
    }

    pub fn pid(&self) -> Result<i32> {
        self.backend.pid()
    }

    pub fn is_installed(&self) -> bool {
        self.backend.is_installed()
    }

    pub fn service_name(&self) -> String {
        self.backend.service_name()
    }
}
