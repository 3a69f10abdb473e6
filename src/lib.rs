//! Install and drive a long-running process as a service of whichever init
//! system the host runs: systemd, SysV init, Upstart, OpenWrt's procd or
//! launchd.
//!
//! ```no_run
//! use initsvc::{Service, ServiceDefinition};
//!
//! let definition = ServiceDefinition::builder("webd")
//!     .command("/usr/bin/webd --port 8080")
//!     .description("Web daemon")
//!     .build()?;
//!
//! let service = Service::new(definition);
//! service.install(&[])?;
//! service.start()?;
//! println!("{}", service.status()?);
//! # Ok::<(), initsvc::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod log;
pub mod service;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use service::{
    Action, Backend, BackendKind, Host, LogTarget, Restart, Service, ServiceDefinition,
    ServiceStatus,
};

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
