use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{command::ServiceCommand, detect::BackendKind, host::Host};
use crate::error::{Error, Result};

static SYSTEMD_RUNNING: Lazy<Regex> = Lazy::new(|| Regex::new(r"Active: active").unwrap());
static SYSTEMD_PID: Lazy<Regex> = Lazy::new(|| Regex::new(r"Main PID: ([0-9]+)").unwrap());
static SYSV_PID: Lazy<Regex> = Lazy::new(|| Regex::new(r"pid +([0-9]+)").unwrap());
static UPSTART_PID: Lazy<Regex> = Lazy::new(|| Regex::new(r"process ([0-9]+)").unwrap());
static PROCD_RUNNING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\brunning\b").unwrap());
static PROCD_PID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)running +([0-9]+)").unwrap());
static NOT_RUNNING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bnot running\b").unwrap());
static LAUNCHD_PID: Lazy<Regex> = Lazy::new(|| Regex::new(r#""PID" = ([0-9]+);"#).unwrap());

/// What a status query says about the managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Running; the PID is `None` when the output did not carry one.
    Running(Option<u32>),
    Stopped,
}

impl ServiceStatus {
    #[inline]
    pub fn pid(&self) -> Option<u32> {
        match self {
            ServiceStatus::Running(pid) => *pid,
            ServiceStatus::Stopped => None,
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Running(Some(pid)) => write!(f, "running(pid: {pid})"),
            ServiceStatus::Running(None) => f.write_str("running"),
            ServiceStatus::Stopped => f.write_str("stopped"),
        }
    }
}

/// Recognizes a running service in a backend's status output.
#[derive(Debug, Clone)]
pub struct StatusParser {
    running: Marker,
    pid: &'static Lazy<Regex>,
    /// Init scripts report a stopped service as "<name> is not running".
    negated: bool,
}

#[derive(Debug, Clone)]
enum Marker {
    Shared(&'static Lazy<Regex>),
    Owned(Regex),
}

impl Marker {
    fn is_match(&self, text: &str) -> bool {
        match self {
            Marker::Shared(re) => re.is_match(text),
            Marker::Owned(re) => re.is_match(text),
        }
    }
}

impl StatusParser {
    /// `name` is the logical service name; some backends echo it back.
    pub fn new(kind: BackendKind, name: &str) -> Self {
        let name = regex::escape(name);
        let owned = |pattern: String| {
            Marker::Owned(Regex::new(&pattern).expect("escaped service name is a valid pattern"))
        };

        match kind {
            BackendKind::Systemd => Self {
                running: Marker::Shared(&SYSTEMD_RUNNING),
                pid: &SYSTEMD_PID,
                negated: false,
            },
            BackendKind::SysV => Self {
                running: owned(format!(r"{name}.*\brunning\b")),
                pid: &SYSV_PID,
                negated: true,
            },
            BackendKind::Upstart => Self {
                running: owned(format!(r"{name} start/running")),
                pid: &UPSTART_PID,
                negated: false,
            },
            BackendKind::Procd => Self {
                running: Marker::Shared(&PROCD_RUNNING),
                pid: &PROCD_PID,
                negated: true,
            },
            BackendKind::Launchd => Self {
                running: owned(name),
                pid: &LAUNCHD_PID,
                negated: false,
            },
        }
    }

    /// Looks for the running marker, then for a PID. A marker without a PID
    /// is still a running service.
    pub fn parse(&self, output: &str) -> ServiceStatus {
        if self.negated && NOT_RUNNING.is_match(output) {
            return ServiceStatus::Stopped;
        }
        if !self.running.is_match(output) {
            return ServiceStatus::Stopped;
        }

        let pid = self
            .pid
            .captures(output)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok());

        ServiceStatus::Running(pid)
    }

    /// Runs `cmd` and parses its output.
    ///
    /// Fails with [`Error::NotRunning`] if the command exits non-zero or its
    /// output lacks the running marker; a command that cannot be executed at
    /// all fails with [`Error::Spawn`].
    pub fn probe(&self, host: &Host, cmd: &ServiceCommand) -> Result<Option<u32>> {
        let output = match host.run_with_output(cmd) {
            Ok(output) => output,
            Err(Error::Command { .. }) => return Err(Error::NotRunning),
            Err(err) => return Err(err),
        };

        match self.parse(&output) {
            ServiceStatus::Running(pid) => Ok(pid),
            ServiceStatus::Stopped => Err(Error::NotRunning),
        }
    }

    /// Like [`probe`](Self::probe), but maps "not running" to a status.
    pub fn status(&self, host: &Host, cmd: &ServiceCommand) -> Result<ServiceStatus> {
        match self.probe(host, cmd) {
            Ok(pid) => Ok(ServiceStatus::Running(pid)),
            Err(Error::NotRunning) => Ok(ServiceStatus::Stopped),
            Err(err) => Err(err),
        }
    }

    /// PID of the running service, `-1` if it is stopped or the PID is unknown.
    pub fn pid(&self, host: &Host, cmd: &ServiceCommand) -> Result<i32> {
        Ok(self
            .status(host, cmd)?
            .pid()
            .and_then(|pid| i32::try_from(pid).ok())
            .unwrap_or(-1))
    }
}
