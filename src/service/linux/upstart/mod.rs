//!
//! Ubuntu's [Upstart](https://upstart.ubuntu.com/)

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use crate::{
    error::Result,
    log::info,
    service::{
        render::{double_quote_escape, shell_quote, single_quote, CommandLine, Template},
        stop_then_start, Action, Backend, BackendKind, Host, ServiceCommand, ServiceDefinition,
        ServiceStatus, StatusParser,
    },
};

const JOB_DIR: &str = "/etc/init";
const JOB_FILE: Template = Template::new(include_str!("files/etc/init/template.conf"));

pub struct Upstart {
    definition: ServiceDefinition,
    host: Host,
    parser: StatusParser,
}

impl Upstart {
    pub fn new(definition: ServiceDefinition, host: Host) -> Self {
        let parser = StatusParser::new(BackendKind::Upstart, definition.name());
        Self {
            definition,
            host,
            parser,
        }
    }

    /// `start`, `stop` and `status` are programs of their own.
    fn ctl(&self, program: &str) -> ServiceCommand {
        ServiceCommand::new(program, [self.definition.name()])
    }

    fn write_job(&self, definition: &ServiceDefinition, args: &[String]) -> Result<()> {
        definition.require_command()?;
        let job = render(definition, args);
        self.host.write_unit(&self.unit_path(), &job, 0o644)
    }
}

impl Backend for Upstart {
    fn kind(&self) -> BackendKind {
        BackendKind::Upstart
    }

    fn definition(&self) -> &ServiceDefinition {
        &self.definition
    }

    fn host(&self) -> &Host {
        &self.host
    }

    fn unit_path(&self) -> PathBuf {
        self.host.path(JOB_DIR).join(self.service_name())
    }

    fn service_name(&self) -> String {
        [self.definition.name(), ".conf"].concat()
    }

    fn install(&self, args: &[String]) -> Result<Action> {
        self.require_not_installed()?;
        self.write_job(&self.definition, args)?;
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

    /// Stop's failure is ignored and start is attempted regardless.
    fn restart(&self) -> Result<Action> {
        stop_then_start(self, Duration::ZERO)
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
        self.write_job(&definition, &[])?;
        Ok(Action::Updated)
    }
}

/// Renders the job file.
pub fn render(definition: &ServiceDefinition, args: &[String]) -> String {
    let cmd = CommandLine::new(definition.command(), args).resolve();

    let start_on = std::iter::once("start on runlevel [2345]".to_string())
        .chain(
            definition
                .dependencies()
                .iter()
                .map(|dep| format!("started {dep}")),
        )
        .collect::<Vec<_>>()
        .join(" and ");

    let environment: String = definition
        .environment()
        .iter()
        .map(|(k, v)| format!("env {}=\"{}\"\n", k, double_quote_escape(v)))
        .collect();

    let log_file = definition.log_file();
    let script = format!(
        "{} {} >> {} 2>&1",
        cmd.shell_command(),
        cmd.shell_args(),
        shell_quote(&log_file.to_string_lossy())
    );

    JOB_FILE.fill(&[
        ("NAME", definition.name()),
        ("DESCRIPTION", definition.description()),
        (
            "DESCRIPTION_QUOTED",
            &double_quote_escape(definition.description()),
        ),
        ("START_ON", &start_on),
        (
            "WORKING_DIR",
            &double_quote_escape(&definition.working_dir().to_string_lossy()),
        ),
        ("ENVIRONMENT", &environment),
        ("SCRIPT", &single_quote(&script)),
    ])
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{
        error::Error,
        service::{testing::*, Service},
    };

    fn upstart(sandbox: &Sandbox) -> Service {
        Service::with_backend(BackendKind::Upstart, webd(), sandbox.host())
    }

    #[test]
    fn test_render_job() {
        let job = render(&webd(), &[]);
        assert!(job.starts_with("# webd Web daemon\n"));
        assert!(job.contains("description     \"Web daemon\"\n"));
        assert!(job.contains("start on runlevel [2345] and started network.target\n"));
        assert!(job.contains("stop on runlevel [016]\n"));
        assert!(job.contains("respawn\n"));
        assert!(job.contains("chdir \"/srv/webd\"\n"));
        assert!(job.contains("env PORT=\"8080\"\n"));
        assert!(job.contains(
            "exec /bin/sh -c '/usr/bin/webd --port 8080  >> /var/log/webd.log 2>&1'\n"
        ));
    }

    #[test]
    fn test_render_without_dependencies() {
        let def = ServiceDefinition::builder("worker")
            .command("/usr/bin/worker")
            .description(r#"The "worker""#)
            .build()
            .unwrap();
        let job = render(&def, &["it's".to_string()]);
        assert!(job.contains("\nstart on runlevel [2345]\n"));
        assert!(job.contains(r#"description     "The \"worker\"""#));
        assert!(job.contains(r"exec /bin/sh -c '/usr/bin/worker '\''it'\''\'\'''\''s'\'' >> "));
    }

    #[test]
    fn test_render_working_dir_with_space() {
        let def = ServiceDefinition::builder("webd")
            .command("/usr/bin/webd")
            .working_dir(r#"/srv/my "app""#)
            .build()
            .unwrap();
        let job = render(&def, &[]);
        assert!(job.contains("\nchdir \"/srv/my \\\"app\\\"\"\n"), "{job}");
    }

    #[test]
    fn test_install_mode_and_path() {
        let sandbox = Sandbox::new();
        let service = upstart(&sandbox);
        assert_eq!(service.service_name(), "webd.conf");

        service.install(&[]).unwrap();
        assert_eq!(service.unit_path(), sandbox.path("/etc/init/webd.conf"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(service.unit_path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o644);
        }
    }

    #[test]
    fn test_status_running() {
        let sandbox = Sandbox::new();
        let service = upstart(&sandbox);
        service.install(&[]).unwrap();

        sandbox
            .runner
            .reply("status webd", 0, "webd start/running, process 4321\n");
        assert_eq!(service.status().unwrap(), ServiceStatus::Running(Some(4321)));
        assert_eq!(service.pid().unwrap(), 4321);

        sandbox.runner.reply("status webd", 0, "webd stop/waiting\n");
        assert_eq!(service.status().unwrap().to_string(), "stopped");
    }

    #[test]
    fn test_restart_ignores_stop_failure() {
        let sandbox = Sandbox::new();
        let service = upstart(&sandbox);
        service.install(&[]).unwrap();

        sandbox
            .runner
            .reply_stderr("stop webd", 1, "stop: Unknown instance:\n");
        assert_eq!(service.restart().unwrap(), Action::Restarted);
        assert_eq!(sandbox.runner.control_calls(), ["stop webd", "start webd"]);
    }

    #[test]
    fn test_restart_surfaces_start_failure() {
        let sandbox = Sandbox::new();
        let service = upstart(&sandbox);
        service.install(&[]).unwrap();

        sandbox
            .runner
            .reply_stderr("start webd", 1, "start: Job failed to start\n");
        assert!(matches!(service.restart(), Err(Error::Command { .. })));
    }

    #[test]
    fn test_restart_not_installed() {
        let sandbox = Sandbox::new();
        let service = upstart(&sandbox);
        assert!(matches!(service.restart(), Err(Error::NotInstalled)));
        assert!(sandbox.runner.control_calls().is_empty());
    }
}
