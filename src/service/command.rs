use std::{
    ffi::OsString,
    fmt::Display,
    path::PathBuf,
    process::{Command, Stdio},
};

use crate::{
    error::{Error, Result},
    log::debug,
};

/// `launchctl` may report a failure on stderr while exiting with status 0.
const STDERR_IS_FAILURE: &[&str] = &["launchctl"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCommand {
    /// Path to the service manager program to run
    ///
    /// E.g. `systemctl`, `/etc/init.d/webd`
    pub program: PathBuf,

    /// Arguments to use for the program
    ///
    /// E.g. `status`, `webd.service`
    pub args: Vec<OsString>,
}

impl ServiceCommand {
    pub fn new<P, I, A>(program: P, args: I) -> Self
    where
        P: Into<PathBuf>,
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The program's file name, used to pick the success policy.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn stderr_is_failure(&self) -> bool {
        STDERR_IS_FAILURE.contains(&self.program_name().as_str())
    }
}

impl Display for ServiceCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in self.args.iter() {
            write!(f, " {}", arg.to_string_lossy())?
        }
        Ok(())
    }
}

impl From<&ServiceCommand> for Command {
    fn from(cmd: &ServiceCommand) -> Self {
        let mut command = Command::new(cmd.program.as_path());
        command.args(cmd.args.iter());
        command
    }
}

/// What a finished control command left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    #[inline]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, lossily decoded.
    pub fn combined(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text
    }

    fn failure_reason(&self) -> String {
        [&self.stderr, &self.stdout]
            .into_iter()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
            .find(|s| !s.is_empty())
            .unwrap_or_else(|| match self.code {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            })
    }
}

/// The single seam through which host control commands are executed.
///
/// Implementations block until the command finishes.
pub trait CommandRunner: Send + Sync {
    /// Runs `cmd` to completion and captures its output. Only fails if the
    /// command could not be executed.
    fn output(&self, cmd: &ServiceCommand) -> Result<CommandOutput>;

    /// Runs `cmd` and applies the success policy: exit status 0 and, for
    /// `launchctl`, an empty stderr.
    fn run(&self, cmd: &ServiceCommand) -> Result<()> {
        let output = self.output(cmd)?;

        let failed = !output.success() || (cmd.stderr_is_failure() && !output.stderr.is_empty());

        if failed {
            let reason = output.failure_reason();
            debug!("{}: {}", cmd, reason);
            Err(Error::Command {
                command: cmd.program_name(),
                reason,
            })
        } else {
            Ok(())
        }
    }

    /// Runs `cmd` and returns stdout+stderr, failing on spawn errors or a
    /// non-zero exit status.
    fn run_with_output(&self, cmd: &ServiceCommand) -> Result<String> {
        let output = self.output(cmd)?;
        if output.success() {
            Ok(output.combined())
        } else {
            Err(Error::Command {
                command: cmd.program_name(),
                reason: output.failure_reason(),
            })
        }
    }
}

/// Executes commands on the local host with [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn output(&self, cmd: &ServiceCommand) -> Result<CommandOutput> {
        debug!("># {}", cmd);
        let output = Command::from(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| Error::Spawn {
                command: cmd.program_name(),
                source,
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
