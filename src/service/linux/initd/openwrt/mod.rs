//!
//! OpenWrt's procd

use std::{collections::BTreeMap, path::PathBuf};

use super::shell_exports;
use crate::{
    error::Result,
    log::info,
    service::{
        render::{shell_quote, CommandLine, Template},
        Action, Backend, BackendKind, Host, ServiceCommand, ServiceDefinition, ServiceStatus,
        StatusParser,
    },
};

/// The one service rendered as a native `rc.common` procd script and enabled
/// at boot.
pub const AGENT_SERVICE_NAME: &str = "isaax-agent";

const SCRIPT_DIR: &str = "/etc/init.d";
const APP_FILE: Template = Template::new(include_str!("files/etc/init.d/app.sh"));
const AGENT_FILE: Template = Template::new(include_str!("files/etc/init.d/agent.sh"));

pub struct Procd {
    definition: ServiceDefinition,
    host: Host,
    parser: StatusParser,
}

impl Procd {
    pub fn new(definition: ServiceDefinition, host: Host) -> Self {
        let parser = StatusParser::new(BackendKind::Procd, definition.name());
        Self {
            definition,
            host,
            parser,
        }
    }

    #[inline]
    fn is_agent(&self) -> bool {
        self.definition.name() == AGENT_SERVICE_NAME
    }

    /// The script is its own control program.
    fn ctl(&self, verb: &str) -> ServiceCommand {
        ServiceCommand::new(self.unit_path(), [verb])
    }

    fn write_script(&self, definition: &ServiceDefinition, args: &[String]) -> Result<()> {
        definition.require_command()?;
        let script = render(definition, args);
        self.host.write_unit(&self.unit_path(), &script, 0o755)
    }
}

impl Backend for Procd {
    fn kind(&self) -> BackendKind {
        BackendKind::Procd
    }

    fn definition(&self) -> &ServiceDefinition {
        &self.definition
    }

    fn host(&self) -> &Host {
        &self.host
    }

    fn unit_path(&self) -> PathBuf {
        self.host.path(SCRIPT_DIR).join(self.definition.name())
    }

    fn service_name(&self) -> String {
        self.definition.name().to_string()
    }

    fn install(&self, args: &[String]) -> Result<Action> {
        self.require_not_installed()?;
        self.write_script(&self.definition, args)?;
        if self.is_agent() {
            self.host.run(&self.ctl("enable"))?;
        }
        info!("Service {} successfully installed", self.definition.name());
        Ok(Action::Installed)
    }

    fn remove(&self) -> Result<Action> {
        self.require_installed()?;
        self.host.remove_unit(&self.unit_path())?;
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

    fn update_environ(&self, env: &BTreeMap<String, String>) -> Result<Action> {
        self.require_installed()?;
        let definition = self.definition.with_environment(env.clone())?;
        self.write_script(&definition, &[])?;
        Ok(Action::Updated)
    }
}

/// Renders the procd script, the `rc.common` flavour for the agent.
pub fn render(definition: &ServiceDefinition, args: &[String]) -> String {
    let cmd = CommandLine::new(definition.command(), args).resolve();

    if definition.name() == AGENT_SERVICE_NAME {
        let dependencies: String = definition
            .dependencies()
            .iter()
            .map(|dep| {
                format!("  if [ -r /etc/init.d/{dep} ]; then\n    /etc/init.d/{dep} start\n  fi\n")
            })
            .collect();

        let environment = if definition.environment().is_empty() {
            String::new()
        } else {
            let vars = definition
                .environment()
                .iter()
                .map(|(k, v)| shell_quote(&format!("{k}={v}")).into_owned())
                .collect::<Vec<_>>();
            format!("  procd_set_param env {}", vars.join(" "))
        };

        return AGENT_FILE.fill(&[
            ("NAME", definition.name()),
            // header comment, raw; control characters are rejected upstream
            ("DESCRIPTION", definition.description()),
            ("DEPENDENCIES", &dependencies),
            ("COMMAND", &cmd.shell_command()),
            ("ARGS", &cmd.shell_args()),
            ("ENVIRONMENT", &environment),
        ]);
    }

    APP_FILE.fill(&[
        ("NAME", definition.name()),
        (
            "WORKING_DIR",
            &shell_quote(&definition.working_dir().to_string_lossy()),
        ),
        ("ENVIRONMENT", &shell_exports(definition.environment())),
        ("LOG_FILE", &shell_quote(&definition.log_file().to_string_lossy())),
        ("COMMAND", &cmd.shell_command()),
        ("ARGS", &cmd.shell_args()),
    ])
}
