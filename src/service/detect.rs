//!
//! Picks the init system that manages services on this host.

use std::{fmt, path::Path, str::FromStr};

use cfg_if::cfg_if;

use crate::error::Error;

/// Present on hosts booted with systemd.
pub const SYSTEMD_MARKER: &str = "/run/systemd/system";
/// Upstart's control binary.
pub const UPSTART_MARKER: &str = "/sbin/initctl";
/// OpenWrt's process manager.
pub const PROCD_MARKER: &str = "/sbin/procd";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Systemd,
    SysV,
    Upstart,
    Procd,
    Launchd,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Systemd,
        BackendKind::SysV,
        BackendKind::Upstart,
        BackendKind::Procd,
        BackendKind::Launchd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Systemd => "systemd",
            BackendKind::SysV => "sysv",
            BackendKind::Upstart => "upstart",
            BackendKind::Procd => "procd",
            BackendKind::Launchd => "launchd",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(Error::OsNotSupported)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux and every other non-Apple Unix.
    Linux,
    MacOs,
}

impl Platform {
    pub fn current() -> Self {
        cfg_if! {
            if #[cfg(target_os = "macos")] {
                Platform::MacOs
            } else {
                Platform::Linux
            }
        }
    }
}

/// Read-only view of the host used for backend selection.
pub trait HostProbe {
    fn exists(&self, path: &Path) -> bool;

    fn platform(&self) -> Platform;

    #[inline]
    fn is_systemd(&self) -> bool {
        self.exists(Path::new(SYSTEMD_MARKER))
    }

    #[inline]
    fn is_upstart(&self) -> bool {
        self.exists(Path::new(UPSTART_MARKER))
    }

    #[inline]
    fn is_procd(&self) -> bool {
        self.exists(Path::new(PROCD_MARKER))
    }
}

/// Decides the backend for this host. The probe order is fixed: a host
/// carrying several markers resolves to the first one found.
pub fn select_backend<P: HostProbe + ?Sized>(probe: &P) -> BackendKind {
    if probe.platform() == Platform::MacOs {
        return BackendKind::Launchd;
    }

    if probe.is_systemd() {
        BackendKind::Systemd
    } else if probe.is_upstart() {
        BackendKind::Upstart
    } else if probe.is_procd() {
        BackendKind::Procd
    } else {
        BackendKind::SysV
    }
}
