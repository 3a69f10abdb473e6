use std::{
    fmt,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{
    command::{CommandRunner, ServiceCommand, SystemCommandRunner},
    detect::{HostProbe, Platform},
};
use crate::{
    error::{Error, Result},
    log::info,
};

/// Everything a backend touches outside the process: the filesystem (under
/// `root`), the command runner, the caller's home directory and the platform.
#[derive(Clone)]
pub struct Host {
    root: PathBuf,
    runner: Arc<dyn CommandRunner>,
    home: Option<PathBuf>,
    platform: Platform,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("root", &self.root)
            .field("home", &self.home)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::system()
    }
}

impl Host {
    /// The local machine.
    pub fn system() -> Self {
        Self {
            root: PathBuf::from("/"),
            runner: Arc::new(SystemCommandRunner),
            home: current_home(),
            platform: Platform::current(),
        }
    }

    pub fn with_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_runner<R: CommandRunner + 'static>(mut self, runner: R) -> Self {
        self.runner = Arc::new(runner);
        self
    }

    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    /// Maps an absolute host path below `root`.
    pub fn path<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        self.root.join(path.strip_prefix("/").unwrap_or(path))
    }

    #[inline]
    pub fn run(&self, cmd: &ServiceCommand) -> Result<()> {
        self.runner.run(cmd)
    }

    #[inline]
    pub fn run_with_output(&self, cmd: &ServiceCommand) -> Result<String> {
        self.runner.run_with_output(cmd)
    }

    /// Checks that the caller's effective group is root by asking `id -g`.
    pub fn require_root(&self) -> Result<()> {
        let gid = self
            .runner
            .run_with_output(&ServiceCommand::new("id", ["-g"]))
            .ok()
            .and_then(|out| out.trim().parse::<u32>().ok())
            .ok_or(Error::OsNotSupported)?;

        if gid == 0 {
            Ok(())
        } else {
            Err(Error::PermissionDenied)
        }
    }

    /// Writes a unit artifact, replacing any previous content, and sets its mode.
    pub(crate) fn write_unit(&self, path: &Path, content: &str, mode: u32) -> Result<()> {
        let mut opts = OpenOptions::new();
        opts.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(mode);
        }

        let mut file = opts.open(path).map_err(Error::fs(path))?;
        file.write_all(content.as_bytes())
            .map_err(Error::fs(path))?;

        // Ensure that the data/metadata is synced and catch errors before dropping
        file.sync_all().map_err(Error::fs(path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(mode))
                .map_err(Error::fs(path))?;
        }

        info!("Installed to {:?}", path);
        Ok(())
    }

    pub(crate) fn remove_unit(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).map_err(Error::fs(path))?;
        info!("file {:?} removed", path);
        Ok(())
    }
}

impl HostProbe for Host {
    #[inline]
    fn exists(&self, path: &Path) -> bool {
        self.path(path).exists()
    }

    #[inline]
    fn platform(&self) -> Platform {
        self.platform
    }
}

#[cfg(unix)]
fn current_home() -> Option<PathBuf> {
    use users::os::unix::UserExt;
    users::get_user_by_uid(users::get_current_uid()).map(|user| user.home_dir().to_path_buf())
}

#[cfg(not(unix))]
fn current_home() -> Option<PathBuf> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::command::testing::MockRunner;

    #[test]
    fn test_path_under_root() {
        let host = Host::system().with_root("/tmp/chroot");
        assert_eq!(
            host.path("/etc/init.d/webd"),
            Path::new("/tmp/chroot/etc/init.d/webd")
        );
        assert_eq!(Host::system().path("/etc/init.d/webd"), Path::new("/etc/init.d/webd"));
    }

    #[test]
    fn test_require_root() {
        let runner = MockRunner::root();
        let host = Host::system().with_runner(runner);
        assert!(host.require_root().is_ok());
    }

    #[test]
    fn test_require_root_denied() {
        let runner = MockRunner::default();
        runner.reply("id -g", 0, "1000\n");
        let host = Host::system().with_runner(runner);
        assert!(matches!(host.require_root(), Err(Error::PermissionDenied)));
    }

    #[test]
    fn test_require_root_unsupported() {
        let runner = MockRunner::default();
        runner.missing("id -g");
        let host = Host::system().with_runner(runner.clone());
        assert!(matches!(host.require_root(), Err(Error::OsNotSupported)));

        runner.reply("id -g", 0, "wheel\n");
        assert!(matches!(host.require_root(), Err(Error::OsNotSupported)));

        runner.reply("id -g", 1, "");
        assert!(matches!(host.require_root(), Err(Error::OsNotSupported)));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_unit_mode_and_remove() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let host = Host::system().with_root(dir.path());
        let path = host.path("/script");

        host.write_unit(&path, "#!/bin/sh\n", 0o755).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "#!/bin/sh\n");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        host.write_unit(&path, "x", 0o644).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "x");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);

        host.remove_unit(&path).unwrap();
        assert!(!path.exists());
        assert!(matches!(host.remove_unit(&path), Err(Error::Fs { .. })));
    }
}
