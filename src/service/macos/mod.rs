//!
//! macOS's [launchd](https://en.wikipedia.org/wiki/Launchd)

use std::{collections::BTreeMap, ffi::OsString, path::PathBuf, time::Duration};

use crate::{
    error::Result,
    log::{info, warn},
    service::{
        render::{xml_escape, CommandLine, Template},
        stop_then_start, Action, Backend, BackendKind, Host, ServiceCommand, ServiceDefinition,
        ServiceStatus, StatusParser,
    },
};

const AGENT_DIR: &str = "Library/LaunchAgents";
const DAEMON_DIR: &str = "/Library/LaunchDaemons";
const LAUNCH_CTL: &str = "launchctl";
const PROPERTY_LIST: Template = Template::new(include_str!(
    "files/Library/LaunchAgents/template.plist"
));

/// Pause between unload and load on restart.
const RESTART_DELAY: Duration = Duration::from_millis(50);

pub struct Launchd {
    definition: ServiceDefinition,
    host: Host,
    parser: StatusParser,
}

impl Launchd {
    pub fn new(definition: ServiceDefinition, host: Host) -> Self {
        let parser = StatusParser::new(BackendKind::Launchd, definition.name());
        Self {
            definition,
            host,
            parser,
        }
    }

    fn ctl<A: Into<OsString>>(&self, verb: &str, arg: A) -> ServiceCommand {
        ServiceCommand::new(LAUNCH_CTL, [OsString::from(verb), arg.into()])
    }

    fn install_definition(&self, definition: &ServiceDefinition, args: &[String]) -> Result<Action> {
        self.require_not_installed()?;
        definition.require_command()?;
        let plist = render(definition, args);
        self.host.write_unit(&self.unit_path(), &plist, 0o644)?;
        info!("Service {} successfully installed", definition.name());
        Ok(Action::Installed)
    }
}

impl Backend for Launchd {
    fn kind(&self) -> BackendKind {
        BackendKind::Launchd
    }

    fn definition(&self) -> &ServiceDefinition {
        &self.definition
    }

    fn host(&self) -> &Host {
        &self.host
    }

    /// A per-user agent when the home directory is known, a system daemon
    /// otherwise.
    fn unit_path(&self) -> PathBuf {
        let dir = match self.host.home() {
            Some(home) => self.host.path(home.join(AGENT_DIR)),
            None => self.host.path(DAEMON_DIR),
        };
        dir.join(self.service_name())
    }

    fn service_name(&self) -> String {
        [self.definition.name(), ".plist"].concat()
    }

    fn privileged(&self) -> bool {
        false
    }

    fn install(&self, args: &[String]) -> Result<Action> {
        self.install_definition(&self.definition, args)
    }

    fn remove(&self) -> Result<Action> {
        self.require_installed()?;
        if let Err(err) = self.host.run(&self.ctl("remove", self.definition.name())) {
            warn!("launchctl remove {}: {}", self.definition.name(), err);
        }
        self.host.remove_unit(&self.unit_path())?;
        info!("Service {} successfully removed", self.definition.name());
        Ok(Action::Removed)
    }

    fn start(&self) -> Result<Action> {
        self.require_installed()?;
        self.host.run(&self.ctl("load", self.unit_path()))?;
        Ok(Action::Started)
    }

    fn stop(&self) -> Result<Action> {
        self.require_installed()?;
        self.host.run(&self.ctl("unload", self.unit_path()))?;
        Ok(Action::Stopped)
    }

    fn restart(&self) -> Result<Action> {
        stop_then_start(self, RESTART_DELAY)
    }

    fn status(&self) -> Result<ServiceStatus> {
        self.require_installed()?;
        self.parser
            .status(&self.host, &self.ctl("list", self.definition.name()))
    }

    fn pid(&self) -> Result<i32> {
        self.parser
            .pid(&self.host, &self.ctl("list", self.definition.name()))
    }

    /// Reinstalls the agent with `env`; a failed removal does not stop the
    /// install.
    fn update_environ(&self, env: &BTreeMap<String, String>) -> Result<Action> {
        let definition = self.definition.with_environment(env.clone())?;
        if let Err(err) = self.remove() {
            warn!("reinstalling {}: {}", self.service_name(), err);
        }
        self.install_definition(&definition, &[])?;
        Ok(Action::Updated)
    }
}

/// Renders the property list.
pub fn render(definition: &ServiceDefinition, args: &[String]) -> String {
    let cmd = CommandLine::new(definition.command(), args).resolve();

    let environment: String = definition
        .environment()
        .iter()
        .map(|(k, v)| {
            format!(
                "        <key>{}</key>\n        <string>{}</string>\n",
                xml_escape(k),
                xml_escape(v)
            )
        })
        .collect();

    let arguments: String = std::iter::once(cmd.program())
        .chain(cmd.args())
        .map(|arg| format!("        <string>{}</string>\n", xml_escape(arg)))
        .collect();

    let log_file = definition.log_file();

    PROPERTY_LIST.fill(&[
        ("LABEL", &xml_escape(definition.name())),
        ("ENVIRONMENT", &environment),
        ("PROGRAM_ARGUMENTS", &arguments),
        (
            "WORKING_DIR",
            &xml_escape(&definition.working_dir().to_string_lossy()),
        ),
        ("LOG_FILE", &xml_escape(&log_file.to_string_lossy())),
    ])
}
