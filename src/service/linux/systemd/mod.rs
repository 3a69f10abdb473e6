//!
//! Linux's [systemd](https://en.wikipedia.org/wiki/Systemd)

use std::{collections::BTreeMap, path::PathBuf};

use crate::{
    error::Result,
    log::info,
    service::{
        render::{double_quote_escape, shell_quote, systemd_escape, CommandLine, Template},
        Action, Backend, BackendKind, Host, ServiceCommand, ServiceDefinition, ServiceStatus,
        StatusParser,
    },
};

const UNIT_DIR: &str = "/etc/systemd/system";
const SERVICE_CTL: &str = "systemctl";
const UNIT_FILE: Template = Template::new(include_str!(
    "files/etc/systemd/system/template.service"
));

pub struct Systemd {
    definition: ServiceDefinition,
    host: Host,
    parser: StatusParser,
}

impl Systemd {
    pub fn new(definition: ServiceDefinition, host: Host) -> Self {
        let parser = StatusParser::new(BackendKind::Systemd, definition.name());
        Self {
            definition,
            host,
            parser,
        }
    }

    fn ctl(&self, verb: &str) -> ServiceCommand {
        ServiceCommand::new(SERVICE_CTL, [verb.to_string(), self.service_name()])
    }

    fn daemon_reload(&self) -> Result<()> {
        self.host.run(&ServiceCommand::new(SERVICE_CTL, ["daemon-reload"]))
    }

    fn write_and_enable(&self, definition: &ServiceDefinition, args: &[String]) -> Result<()> {
        definition.require_command()?;
        let unit = render(definition, args);
        self.host.write_unit(&self.unit_path(), &unit, 0o644)?;
        self.daemon_reload()?;
        self.host.run(&self.ctl("enable"))
    }
}

impl Backend for Systemd {
    fn kind(&self) -> BackendKind {
        BackendKind::Systemd
    }

    fn definition(&self) -> &ServiceDefinition {
        &self.definition
    }

    fn host(&self) -> &Host {
        &self.host
    }

    fn unit_path(&self) -> PathBuf {
        self.host.path(UNIT_DIR).join(self.service_name())
    }

    fn service_name(&self) -> String {
        [self.definition.name(), ".service"].concat()
    }

    fn install(&self, args: &[String]) -> Result<Action> {
        self.require_not_installed()?;
        self.write_and_enable(&self.definition, args)?;
        info!("Service {} successfully installed", self.definition.name());
        Ok(Action::Installed)
    }

    fn remove(&self) -> Result<Action> {
        self.require_installed()?;
        self.host.run(&self.ctl("disable"))?;
        self.host.remove_unit(&self.unit_path())?;
        self.daemon_reload()?;
        info!("Service {} successfully removed", self.definition.name());
        Ok(Action::Removed)
    }

    fn start(&self) -> Result<Action> {
        self.require_installed()?;
        self.host.run(&self.ctl("start"))?;
        Ok(Action::Started)
    }

    fn stop(&self) -> Result<Action> {
        self.require_installed()?;
        self.host.run(&self.ctl("stop"))?;
        Ok(Action::Stopped)
    }

    fn restart(&self) -> Result<Action> {
        self.require_installed()?;
        self.host.run(&self.ctl("restart"))?;
        Ok(Action::Restarted)
    }

    fn status(&self) -> Result<ServiceStatus> {
        self.require_installed()?;
        self.parser.status(&self.host, &self.ctl("status"))
    }

    fn pid(&self) -> Result<i32> {
        self.parser.pid(&self.host, &self.ctl("status"))
    }

    /// Rewrites the unit with `env`, then reloads and re-enables it.
    fn update_environ(&self, env: &BTreeMap<String, String>) -> Result<Action> {
        self.require_installed()?;
        let definition = self.definition.with_environment(env.clone())?;
        self.write_and_enable(&definition, &[])?;
        Ok(Action::Updated)
    }
}

/// Renders the unit file.
pub fn render(definition: &ServiceDefinition, args: &[String]) -> String {
    let cmd = CommandLine::new(definition.command(), args).resolve();

    let dependencies = definition.dependencies().join(" ");
    let environment = definition
        .environment()
        .iter()
        .map(|(k, v)| double_quote_escape(&format!("{k}={v}")))
        .map(|kv| format!("\"{}\"", specifier_escape(&kv)))
        .collect::<Vec<_>>()
        .join(" ");

    let log_file = definition.log_file();
    let log_file = shell_quote(&log_file.to_string_lossy()).into_owned();

    UNIT_FILE.fill(&[
        ("NAME", definition.name()),
        ("DESCRIPTION", &specifier_escape(definition.description())),
        ("DEPENDENCIES", &dependencies),
        ("COMMAND", &systemd_escape(&cmd.shell_command())),
        ("ARGS", &systemd_escape(&cmd.shell_args())),
        ("LOG_FILE", &systemd_escape(&log_file)),
        (
            "WORKING_DIR",
            &specifier_escape(&definition.working_dir().to_string_lossy()),
        ),
        ("ENVIRONMENT", &environment),
        (
            "ENVIRONMENT_FILE",
            &specifier_escape(&definition.environment_file().to_string_lossy()),
        ),
        ("RESTART", definition.restart().as_str()),
        ("RESTART_SEC", &definition.restart_sec().to_string()),
    ])
}

/// `%` starts a unit specifier.
fn specifier_escape(s: &str) -> String {
    s.replace('%', "%%")
}
