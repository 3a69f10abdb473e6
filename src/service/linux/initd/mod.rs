//!
//! sysvinit

use std::{collections::BTreeMap, fs, io, path::PathBuf};

use crate::{
    error::{Error, Result},
    log::{info, warn},
    service::{
        render::{shell_quote, CommandLine, Template},
        Action, Backend, BackendKind, Host, ServiceCommand, ServiceDefinition, ServiceStatus,
        StatusParser,
    },
};

pub mod openwrt;

const SCRIPT_DIR: &str = "/etc/init.d";
const SERVICE_CTL: &str = "service";
const SERVICE_FILE: Template = Template::new(include_str!("files/etc/init.d/template.sh"));

/// Runlevels that start the service, and the ones that stop it.
const START_LEVELS: [u8; 4] = [2, 3, 4, 5];
const KILL_LEVELS: [u8; 3] = [0, 1, 6];
const START_PREFIX: &str = "S87";
const KILL_PREFIX: &str = "K17";

pub struct SysV {
    definition: ServiceDefinition,
    host: Host,
    parser: StatusParser,
}

impl SysV {
    pub fn new(definition: ServiceDefinition, host: Host) -> Self {
        let parser = StatusParser::new(BackendKind::SysV, definition.name());
        Self {
            definition,
            host,
            parser,
        }
    }

    fn ctl(&self, verb: &str) -> ServiceCommand {
        ServiceCommand::new(SERVICE_CTL, [self.definition.name(), verb])
    }

    /// `rcN.d` entries, start links first.
    fn boot_links(&self) -> Vec<PathBuf> {
        let name = self.definition.name();
        START_LEVELS
            .iter()
            .map(|level| (level, START_PREFIX))
            .chain(KILL_LEVELS.iter().map(|level| (level, KILL_PREFIX)))
            .map(|(level, prefix)| self.host.path(format!("/etc/rc{level}.d/{prefix}{name}")))
            .collect()
    }

    fn write_script(&self, definition: &ServiceDefinition, args: &[String]) -> Result<()> {
        definition.require_command()?;
        let script = render(definition, args);
        self.host.write_unit(&self.unit_path(), &script, 0o755)
    }

    #[cfg(unix)]
    fn link_boot_order(&self) {
        let target = PathBuf::from("../init.d").join(self.definition.name());
        for link in self.boot_links() {
            if let Err(err) = std::os::unix::fs::symlink(&target, &link) {
                warn!("failed to link {:?}: {}", link, err);
            }
        }
    }

    #[cfg(not(unix))]
    fn link_boot_order(&self) {}

    fn unlink_boot_order(&self) -> Result<()> {
        for link in self.boot_links() {
            match fs::remove_file(&link) {
                Ok(()) => (),
                Err(err) if err.kind() == io::ErrorKind::NotFound => (),
                Err(err) => return Err(Error::fs(&link)(err)),
            }
        }
        Ok(())
    }
}

impl Backend for SysV {
    fn kind(&self) -> BackendKind {
        BackendKind::SysV
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
        self.link_boot_order();
        info!("Service {} successfully installed", self.definition.name());
        Ok(Action::Installed)
    }

    fn remove(&self) -> Result<Action> {
        self.require_installed()?;
        self.host.remove_unit(&self.unit_path())?;
        self.unlink_boot_order()?;
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

    /// Boot-order links are left alone.
    fn update_environ(&self, env: &BTreeMap<String, String>) -> Result<Action> {
        self.require_installed()?;
        let definition = self.definition.with_environment(env.clone())?;
        self.write_script(&definition, &[])?;
        Ok(Action::Updated)
    }
}

/// Renders the init script.
pub fn render(definition: &ServiceDefinition, args: &[String]) -> String {
    let cmd = CommandLine::new(definition.command(), args).resolve();

    SERVICE_FILE.fill(&[
        ("NAME", definition.name()),
        ("DESCRIPTION", definition.description()),
        ("LOG_FILE", &shell_quote(&definition.log_file().to_string_lossy())),
        (
            "WORKING_DIR",
            &shell_quote(&definition.working_dir().to_string_lossy()),
        ),
        ("ENVIRONMENT", &shell_exports(definition.environment())),
        ("COMMAND", &cmd.shell_command()),
        ("ARGS", &cmd.shell_args()),
    ])
}

/// One `export KEY=value` line per variable.
pub(crate) fn shell_exports(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(key, value)| format!("export {}={}\n", key, shell_quote(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{testing::*, Service};

    fn sysv(sandbox: &Sandbox) -> Service {
        Service::with_backend(BackendKind::SysV, webd(), sandbox.host())
    }

    const ARTIFACTS: [&str; 8] = [
        "etc/init.d/webd",
        "etc/rc0.d/K17webd",
        "etc/rc1.d/K17webd",
        "etc/rc2.d/S87webd",
        "etc/rc3.d/S87webd",
        "etc/rc4.d/S87webd",
        "etc/rc5.d/S87webd",
        "etc/rc6.d/K17webd",
    ];

    #[test]
    fn test_render_script() {
        let script = render(&webd(), &["--verbose".to_string()]);
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("# Provides: webd\n"));
        assert!(script.contains("# Description: Web daemon\n"));
        assert!(script.contains("proc=\"webd\"\n"));
        assert!(script.contains("logfile=/var/log/webd.log\n"));
        assert!(script.contains("dir=/srv/webd\n"));
        assert!(script.contains("export PORT=8080\n"));
        assert!(script.contains(
            "    /usr/bin/webd --port 8080 --verbose >> \"$logfile\" 2>&1 &\n"
        ));
        assert!(script.contains("echo \"$proc (pid  $(get_pid)) is running...\""));
    }

    #[test]
    fn test_render_quotes_values() {
        let def = ServiceDefinition::builder("webd")
            .command("/opt/my-app/run")
            .working_dir("/srv/my app")
            .env("GREETING", "it's $HOME")
            .build()
            .unwrap();
        let script = render(&def, &["a b".to_string()]);
        assert!(script.contains("dir='/srv/my app'\n"));
        assert!(script.contains(r"export GREETING='it'\''s $HOME'"));
        assert!(script.contains("/opt/my-app/run 'a b' >>"));
    }

    #[test]
    fn test_install_creates_boot_links() {
        let sandbox = Sandbox::new();
        let service = sysv(&sandbox);
        assert_eq!(service.install(&[]).unwrap(), Action::Installed);

        let snapshot = sandbox.snapshot();
        assert_eq!(
            snapshot,
            ARTIFACTS.iter().map(PathBuf::from).collect::<Vec<_>>()
        );

        let link = fs::read_link(sandbox.path("/etc/rc3.d/S87webd")).unwrap();
        assert_eq!(link, PathBuf::from("../init.d/webd"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(service.unit_path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }

        assert_eq!(service.remove().unwrap(), Action::Removed);
        assert!(sandbox.snapshot().is_empty());
    }

    #[test]
    fn test_missing_runlevel_dir_is_ignored() {
        let sandbox = Sandbox::new();
        fs::remove_dir(sandbox.path("/etc/rc6.d")).unwrap();
        let service = sysv(&sandbox);

        service.install(&[]).unwrap();
        assert_eq!(sandbox.snapshot().len(), 7);
        service.remove().unwrap();
        assert!(sandbox.snapshot().is_empty());
    }

    #[test]
    fn test_service_commands() {
        let sandbox = Sandbox::new();
        let service = sysv(&sandbox);
        service.install(&[]).unwrap();

        service.start().unwrap();
        service.stop().unwrap();
        service.restart().unwrap();
        assert_eq!(
            sandbox.runner.control_calls(),
            ["service webd start", "service webd stop", "service webd restart"]
        );
    }

    #[test]
    fn test_status() {
        let sandbox = Sandbox::new();
        let service = sysv(&sandbox);
        service.install(&[]).unwrap();

        sandbox.runner.reply("service webd status", 3, "webd is stopped\n");
        assert_eq!(service.status().unwrap(), ServiceStatus::Stopped);
        assert_eq!(service.pid().unwrap(), -1);

        sandbox
            .runner
            .reply("service webd status", 0, "webd (pid  4321) is running...\n");
        assert_eq!(service.status().unwrap().to_string(), "running(pid: 4321)");
        assert_eq!(service.pid().unwrap(), 4321);
    }

    #[test]
    fn test_update_environ_keeps_links() {
        let sandbox = Sandbox::new();
        let service = sysv(&sandbox);
        service.install(&[]).unwrap();
        let snapshot = sandbox.snapshot();

        let env = BTreeMap::from([("MODE".to_string(), "prod".to_string())]);
        assert_eq!(service.update_environ(&env).unwrap(), Action::Updated);

        let script = fs::read_to_string(service.unit_path()).unwrap();
        assert!(script.contains("export MODE=prod\n"));
        assert!(!script.contains("PORT"));
        assert_eq!(sandbox.snapshot(), snapshot);
        // the stored definition keeps its own environment
        assert!(service.definition().environment().contains_key("PORT"));
    }
}
