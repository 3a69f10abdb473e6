//!
//! Shared pieces for rendering unit artifacts: command line handling,
//! per-format escaping and `{{KEY}}` placeholder templates.

use std::borrow::Cow;

use super::{definition::ServiceDefinition, detect::BackendKind, host::Host};
use crate::error::Result;

/// The executable plus its arguments, split out of the definition's command
/// string and the extra arguments given to `install`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    leading: Vec<String>,
    extra: Vec<String>,
}

impl CommandLine {
    /// Splits `command` on whitespace: the first token is the executable, the
    /// rest are placed before `extra`.
    pub fn new(command: &str, extra: &[String]) -> Self {
        let mut tokens = command.split_whitespace().map(str::to_string);
        Self {
            program: tokens.next().unwrap_or_default(),
            leading: tokens.collect(),
            extra: extra.to_vec(),
        }
    }

    /// Resolves a bare executable name against `PATH`, so the rendered unit
    /// does not depend on the search path of the init daemon.
    pub fn resolve(mut self) -> Self {
        if !self.program.is_empty() && !self.program.contains('/') {
            if let Ok(path) = which::which(&self.program) {
                self.program = path.to_string_lossy().into_owned();
            }
        }
        self
    }

    #[inline]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Leading arguments followed by extra arguments.
    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.leading
            .iter()
            .chain(self.extra.iter())
            .map(String::as_str)
    }

    /// Executable and leading arguments as shell words.
    pub fn shell_command(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.leading.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Extra arguments as shell words.
    pub fn shell_args(&self) -> String {
        self.extra
            .iter()
            .map(|a| shell_quote(a))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Renders the native artifact of `kind` for `definition`.
pub fn render(
    kind: BackendKind,
    definition: &ServiceDefinition,
    args: &[String],
) -> Result<String> {
    use super::{linux, macos};

    definition.require_command()?;

    Ok(match kind {
        BackendKind::Systemd => linux::systemd::render(definition, args),
        BackendKind::SysV => linux::initd::render(definition, args),
        BackendKind::Upstart => linux::upstart::render(definition, args),
        BackendKind::Procd => linux::initd::openwrt::render(definition, args),
        BackendKind::Launchd => macos::render(definition, args),
    })
}

/// Renders and returns the artifact for the backend `host` selects.
pub fn render_for_host(
    host: &Host,
    definition: &ServiceDefinition,
    args: &[String],
) -> Result<String> {
    render(super::detect::select_backend(host), definition, args)
}

/// A template whose `{{KEY}}` placeholders are replaced in a single pass, so
/// substituted values are never scanned for further placeholders.
pub struct Template(&'static str);

impl Template {
    pub const fn new(text: &'static str) -> Self {
        Self(text)
    }

    pub fn fill(&self, vars: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(self.0.len() + 256);
        let mut rest = self.0;

        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            let key = &rest[start + 2..start + 2 + len];

            match vars.iter().find(|(k, _)| *k == key) {
                Some((_, value)) => {
                    out.push_str(&rest[..start]);
                    out.push_str(value);
                }
                None => out.push_str(&rest[..start + 2 + len + 2]),
            }
            rest = &rest[start + 2 + len + 2..];
        }

        out.push_str(rest);
        out
    }
}

/// Quotes `s` as a single POSIX shell word, leaving safe words untouched.
pub fn shell_quote(s: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(s))
}

/// Wraps a shell script in single quotes for `sh -c`.
pub fn single_quote(script: &str) -> String {
    format!("'{}'", script.replace('\'', r"'\''"))
}

/// Escapes a string for a systemd unit value: backslash and quotes get C
/// escapes, `%` specifiers and `$` expansions are doubled.
pub fn systemd_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str(r"\\"),
            '\'' => out.push_str(r"\'"),
            '"' => out.push_str("\\\""),
            '%' => out.push_str("%%"),
            '$' => out.push_str("$$"),
            c => out.push(c),
        }
    }
    out
}

/// Escapes a string for the inside of a double-quoted value.
pub fn double_quote_escape(s: &str) -> String {
    s.replace('\\', r"\\").replace('"', "\\\"")
}

#[inline]
pub fn xml_escape(s: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command() {
        let cmd = CommandLine::new("/usr/bin/webd --port 8080", &["-v".to_string()]);
        assert_eq!(cmd.program(), "/usr/bin/webd");
        assert_eq!(cmd.args().collect::<Vec<_>>(), ["--port", "8080", "-v"]);
        assert_eq!(cmd.shell_command(), "/usr/bin/webd --port 8080");
        assert_eq!(cmd.shell_args(), "-v");
    }

    #[test]
    fn test_resolve_bare_name() {
        let cmd = CommandLine::new("sh -c true", &[]).resolve();
        assert!(cmd.program().starts_with('/'), "{}", cmd.program());
        assert!(cmd.program().ends_with("/sh"));

        let cmd = CommandLine::new("./bin/webd", &[]).resolve();
        assert_eq!(cmd.program(), "./bin/webd");

        let cmd = CommandLine::new("initsvc-surely-not-on-path", &[]).resolve();
        assert_eq!(cmd.program(), "initsvc-surely-not-on-path");
    }

    #[test]
    fn test_shell_words_are_quoted() {
        let cmd = CommandLine::new("/opt/app/run", &["a b".to_string(), "it's".to_string()]);
        assert_eq!(cmd.shell_args(), r"'a b' 'it'\''s'");
    }

    #[test]
    fn test_template_fill() {
        let t = Template::new("[{{A}}] {{B}} {{MISSING}} {{A}}");
        assert_eq!(t.fill(&[("A", "1"), ("B", "{{A}}")]), "[1] {{A}} {{MISSING}} 1");
    }

    #[test]
    fn test_template_unterminated() {
        let t = Template::new("x {{A");
        assert_eq!(t.fill(&[("A", "1")]), "x {{A");
    }

    #[test]
    fn test_escapes() {
        assert_eq!(single_quote("echo 'hi'"), r"'echo '\''hi'\'''");
        assert_eq!(systemd_escape(r#"a'b"c\d%e$f"#), r#"a\'b\"c\\d%%e$$f"#);
        assert_eq!(double_quote_escape(r#"say "hi" \o/"#), r#"say \"hi\" \\o/"#);
        assert_eq!(xml_escape("<a & 'b'>"), "&lt;a &amp; &apos;b&apos;&gt;");
    }

    #[test]
    fn test_render_dispatches_per_backend() {
        use crate::service::{linux, macos, testing::webd};

        let def = webd();
        let args = ["-v".to_string()];
        for (kind, expected) in [
            (BackendKind::Systemd, linux::systemd::render(&def, &args)),
            (BackendKind::SysV, linux::initd::render(&def, &args)),
            (BackendKind::Upstart, linux::upstart::render(&def, &args)),
            (BackendKind::Procd, linux::initd::openwrt::render(&def, &args)),
            (BackendKind::Launchd, macos::render(&def, &args)),
        ] {
            assert_eq!(render(kind, &def, &args).unwrap(), expected, "{kind}");
        }
    }

    #[test]
    fn test_render_without_command() {
        use crate::error::Error;

        let def = ServiceDefinition::named("webd").unwrap();
        for kind in BackendKind::ALL {
            assert!(
                matches!(render(kind, &def, &[]), Err(Error::InvalidDefinition(_))),
                "{kind}"
            );
        }
    }

    #[test]
    fn test_render_for_host() {
        use crate::service::{detect::Platform, testing::webd};

        let dir = tempfile::tempdir().unwrap();
        let host = Host::system()
            .with_root(dir.path())
            .with_platform(Platform::Linux);
        assert_eq!(
            render_for_host(&host, &webd(), &[]).unwrap(),
            render(BackendKind::SysV, &webd(), &[]).unwrap()
        );

        std::fs::create_dir_all(host.path(crate::service::detect::SYSTEMD_MARKER)).unwrap();
        assert_eq!(
            render_for_host(&host, &webd(), &[]).unwrap(),
            render(BackendKind::Systemd, &webd(), &[]).unwrap()
        );
    }
}
