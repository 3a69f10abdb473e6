use clap::Parser;
use clap::Subcommand;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;
use std::str::FromStr;

use initsvc::log;

type LogLevelDefault = InfoLevel;

/// Manage a program as a service of the host's init system.
///
#[derive(Parser, Debug)]
#[command(author, version=initsvc::version(), about, long_about = None)]
pub struct Cli {
    /// Service definition file (YAML)
    #[arg(short = 'c', long, conflicts_with = "name")]
    pub conf: Option<PathBuf>,

    /// Name of an already installed service
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    verbose: Verbosity<LogLevelDefault>,
}

impl Cli {
    pub fn log_level(&self) -> Option<log::Level> {
        self.verbose
            .log_level()
            .map(|s| s.to_string())
            .and_then(|s| log::Level::from_str(&s).ok())
    }
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Write the unit file and register it with the init system.
    Install {
        /// Extra arguments appended to the command
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Unregister the service and delete its unit file.
    Remove,

    /// Start the service.
    Start,

    /// Stop the service.
    Stop,

    /// Restart the service.
    Restart,

    /// Print whether the service is running.
    Status,

    /// Print the PID of the service, -1 if it is not running.
    Pid,

    /// Rewrite the unit with a new environment.
    UpdateEnv {
        /// KEY=VALUE pairs
        #[arg(required = true, value_parser = parse_env)]
        vars: Vec<(String, String)>,
    },

    /// Print the init system in use.
    Detect,
}

fn parse_env(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{s}`"))?;
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_cli_args_parse_install() {
        let cli = Cli::parse_from(["initsvc", "-c", "/etc/webd.yaml", "install"]);
        assert_eq!(cli.conf, Some(PathBuf::from("/etc/webd.yaml")));
        assert_eq!(cli.command, Commands::Install { args: vec![] });

        let cli = Cli::parse_from([
            "initsvc", "--conf", "/etc/webd.yaml", "install", "--", "--port", "9090",
        ]);
        assert_eq!(
            cli.command,
            Commands::Install {
                args: vec!["--port".to_string(), "9090".to_string()]
            }
        );
    }

    #[test]
    fn test_cli_args_parse_by_name() {
        let cli = Cli::parse_from(["initsvc", "-n", "webd", "status"]);
        assert_eq!(cli.name.as_deref(), Some("webd"));
        assert_eq!(cli.command, Commands::Status);

        let cli = Cli::parse_from(["initsvc", "--name", "webd", "pid"]);
        assert_eq!(cli.command, Commands::Pid);
    }

    #[test]
    fn test_cli_args_conf_conflicts_with_name() {
        assert!(
            Cli::try_parse_from(["initsvc", "-c", "/etc/webd.yaml", "-n", "webd", "start"])
                .is_err()
        );
    }

    #[test]
    fn test_cli_args_parse_update_env() {
        let cli = Cli::parse_from(["initsvc", "-n", "webd", "update-env", "A=1", "B=x=y"]);
        assert_eq!(
            cli.command,
            Commands::UpdateEnv {
                vars: vec![
                    ("A".to_string(), "1".to_string()),
                    ("B".to_string(), "x=y".to_string())
                ]
            }
        );

        assert!(Cli::try_parse_from(["initsvc", "-n", "webd", "update-env", "A"]).is_err());
        assert!(Cli::try_parse_from(["initsvc", "-n", "webd", "update-env"]).is_err());
    }

    #[test]
    fn test_cli_args_parse_verbose() {
        let cli = Cli::parse_from(["initsvc", "detect"]);
        assert_eq!(cli.log_level(), Some(log::Level::INFO));

        let cli = Cli::parse_from(["initsvc", "detect", "-q"]);
        assert_eq!(cli.log_level(), Some(log::Level::WARN));

        let cli = Cli::parse_from(["initsvc", "detect", "-v"]);
        assert_eq!(cli.log_level(), Some(log::Level::DEBUG));

        let cli = Cli::parse_from(["initsvc", "detect", "-qqqqq"]);
        assert_eq!(cli.log_level(), None);
    }
}
