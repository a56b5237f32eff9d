//! Run dispatch
//!
//! The `run` field of a command is parsed once at load time into a
//! [`RunSpec`]: an alias argv, an inline shell script (`$sh(...)`) or a
//! shebang script. [`RunSpec::prepare`] turns it into a process ready to spawn.

use std::process::{Command as Process, ExitStatus, Output, Stdio};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::action::Context;
use crate::command::Command;
use crate::error::{SpecError, SpecResult};
use crate::expr::SEPARATOR;
use crate::macros::parse_call;
use crate::modifier::resolve_chdir;
use crate::shebang::Shebang;
use crate::shell::{script_file, Shell};
use crate::{slog_info, slog_warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RunField", into = "RunField")]
pub enum RunSpec {
    /// Program and leading arguments
    Alias(Vec<String>),
    Macro(MacroScript),
    Shebang(Shebang),
}

/// Raw shape of the `run` field
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunField {
    Argv(Vec<String>),
    Text(String),
}

impl TryFrom<RunField> for RunSpec {
    type Error = SpecError;

    fn try_from(field: RunField) -> Result<Self, Self::Error> {
        match field {
            RunField::Argv(argv) => alias(argv),
            RunField::Text(text) => RunSpec::parse(&text),
        }
    }
}

impl From<RunSpec> for RunField {
    fn from(spec: RunSpec) -> Self {
        match spec {
            RunSpec::Alias(argv) => RunField::Argv(argv),
            RunSpec::Macro(script) => RunField::Text(script.to_source()),
            RunSpec::Shebang(shebang) => RunField::Text(shebang.to_source()),
        }
    }
}

fn alias(argv: Vec<String>) -> SpecResult<RunSpec> {
    if argv.is_empty() {
        return Err(SpecError::InvalidRun("empty alias".to_string()));
    }
    Ok(RunSpec::Alias(argv))
}

impl RunSpec {
    /// Parse the textual form: `[...]` alias, `$...` macro or `#!...` script
    pub fn parse(text: &str) -> SpecResult<RunSpec> {
        if text.starts_with('[') {
            let argv: Vec<String> = serde_yaml::from_str(text)
                .map_err(|e| SpecError::InvalidRun(format!("malformed alias: {}", e)))?;
            alias(argv)
        } else if text.starts_with('$') {
            Ok(RunSpec::Macro(MacroScript::parse(text)?))
        } else if text.starts_with("#!") {
            Ok(RunSpec::Shebang(Shebang::parse(text)?))
        } else {
            Err(SpecError::InvalidRun(format!("{:?}", text)))
        }
    }

    /// Build the process running this spec with positional `args`. The
    /// context supplies directory and environment (`C_FLAG_*`).
    pub fn prepare(&self, c: &Context, args: &[String]) -> SpecResult<PreparedRun> {
        match self {
            RunSpec::Alias(argv) => {
                let mut full = Vec::with_capacity(argv.len() + args.len());
                for arg in &argv[1..] {
                    full.push(c.envsubst(arg)?);
                }
                full.extend_from_slice(args);
                Ok(PreparedRun::new(c.command(&argv[0], &full), &argv[0], None))
            }
            RunSpec::Macro(script) => script.prepare(c, args),
            RunSpec::Shebang(shebang) => {
                let (suffix, extra) = shebang.file_convention();
                let file = script_file(suffix, &shebang.script)?;

                let mut argv = shebang.args.clone();
                argv.extend(extra.map(String::from));
                argv.push(file.path().to_string_lossy().into_owned());
                argv.extend_from_slice(args);
                Ok(PreparedRun::new(
                    c.command(&shebang.command, &argv),
                    &shebang.command,
                    Some(file),
                ))
            }
        }
    }
}

/// Inline script run by a shell, e.g. `$bash(echo $1) ||| $chdir($gitworktree)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroScript {
    /// `None` for `$(...)`, the platform default
    pub shell: Option<Shell>,
    pub body: String,
    /// `$chdir(...)` arguments applied in order
    pub chdir: Vec<String>,
}

impl MacroScript {
    pub fn parse(text: &str) -> SpecResult<MacroScript> {
        let mut parts = text.split(SEPARATOR);
        let head = parts.next().unwrap_or_default();
        let (name, body) = parse_call(head)?;
        let shell = if name.is_empty() {
            None
        } else {
            Some(name.parse::<Shell>()?)
        };

        let mut chdir = Vec::new();
        for suffix in parts {
            if !suffix.starts_with("$chdir(") {
                return Err(SpecError::InvalidRun(format!("invalid modifier: {:?}", suffix)));
            }
            let (_, arg) = parse_call(suffix)?;
            chdir.push(arg.to_string());
        }

        Ok(MacroScript {
            shell,
            body: body.to_string(),
            chdir,
        })
    }

    pub fn shell(&self) -> Shell {
        self.shell.unwrap_or_else(Shell::default_run)
    }

    fn prepare(&self, c: &Context, args: &[String]) -> SpecResult<PreparedRun> {
        let mut c = c.clone();
        c.args = args.to_vec();
        for arg in &self.chdir {
            c.dir = resolve_chdir(arg, &c)?;
        }

        let invocation = self.shell().invocation(&self.body, args)?;
        let command = invocation.command(&c);
        let program = invocation.program.clone();
        Ok(PreparedRun::new(command, &program, invocation.into_script()))
    }

    pub fn to_source(&self) -> String {
        let name = self.shell.map(|s| s.name()).unwrap_or_default();
        let mut source = format!("${}({})", name, self.body);
        for arg in &self.chdir {
            source.push_str(SEPARATOR);
            source.push_str(&format!("$chdir({})", arg));
        }
        source
    }
}

/// A process ready to spawn; keeps the temporary script file alive until dropped
#[derive(Debug)]
pub struct PreparedRun {
    command: Process,
    program: String,
    _script: Option<NamedTempFile>,
}

impl PreparedRun {
    fn new(command: Process, program: &str, script: Option<NamedTempFile>) -> Self {
        Self {
            command,
            program: program.to_string(),
            _script: script,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn command(&self) -> &Process {
        &self.command
    }

    /// Run with inherited standard streams
    pub fn status(mut self) -> SpecResult<ExitStatus> {
        slog_info!("RUN", "spawn", serde_json::json!({"program": self.program}));
        self.command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| SpecError::process(&self.program, e))
    }

    /// Run capturing stdout and stderr
    pub fn output(mut self) -> SpecResult<Output> {
        slog_info!("RUN", "spawn", serde_json::json!({"program": self.program}));
        self.command
            .stdin(Stdio::null())
            .output()
            .map_err(|e| SpecError::process(&self.program, e))
    }
}

impl Command {
    /// Resolve `args` to a runnable command and prepare its process
    pub fn prepare_run(&self, base: &Context, args: &[String]) -> SpecResult<PreparedRun> {
        if let Some(error) = &self.build_error {
            return Err(SpecError::Usage(error.clone()));
        }
        let walk = self.parse(args)?;
        let cmd = walk.command;
        let run = cmd.run.as_ref().ok_or_else(|| {
            SpecError::Usage(format!("command {:?} is not runnable", cmd.name))
        })?;

        let mut positional = walk.positional.clone();
        if let Some(dash) = &walk.dash {
            positional.extend(dash.iter().cloned());
        }
        let c = walk.context(base);
        run.prepare(&c, &positional)
    }

    /// Run with inherited standard streams and return the child's exit code
    pub fn execute(&self, base: &Context, args: &[String]) -> SpecResult<i32> {
        let prepared = self.prepare_run(base, args)?;
        let program = prepared.program().to_string();
        let status = prepared.status()?;
        let code = status.code().unwrap_or(1);
        if code != 0 {
            slog_warn!(
                "RUN",
                "exit",
                "child exited with non-zero status",
                Some(serde_json::json!({"program": program, "code": code}))
            );
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        assert_eq!(
            RunSpec::parse("[git, log]").unwrap(),
            RunSpec::Alias(vec!["git".into(), "log".into()])
        );
        match RunSpec::parse("$bash(echo $1) ||| $chdir($gitworktree)").unwrap() {
            RunSpec::Macro(script) => {
                assert_eq!(script.shell, Some(Shell::Bash));
                assert_eq!(script.body, "echo $1");
                assert_eq!(script.chdir, vec!["$gitworktree"]);
                assert_eq!(script.to_source(), "$bash(echo $1) ||| $chdir($gitworktree)");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(RunSpec::parse("#!sh\necho"), Ok(RunSpec::Shebang(_))));
        assert!(matches!(RunSpec::parse("echo"), Err(SpecError::InvalidRun(_))));
        assert!(matches!(RunSpec::parse("[]"), Err(SpecError::InvalidRun(_))));
        assert!(matches!(
            RunSpec::parse("$(echo) ||| $filter(a)"),
            Err(SpecError::InvalidRun(_))
        ));
        assert!(RunSpec::parse("$csh(echo)").unwrap_err().is_unknown());
    }

    #[test]
    fn test_deserialize_field() {
        let spec: RunSpec = serde_yaml::from_str("[echo, hi]").unwrap();
        assert_eq!(spec, RunSpec::Alias(vec!["echo".into(), "hi".into()]));
        let spec: RunSpec = serde_yaml::from_str(r#""$(echo a)""#).unwrap();
        assert!(matches!(spec, RunSpec::Macro(MacroScript { shell: None, .. })));
        let spec: RunSpec = serde_yaml::from_str("\"#!sh\\necho\"").unwrap();
        assert!(matches!(spec, RunSpec::Shebang(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_alias_substitutes_flags() {
        let mut c = Context::default();
        c.setenv("C_FLAG_NAME", "world");
        let run = RunSpec::parse(r#"[sh, -c, "echo hello ${C_FLAG_NAME} $1", --]"#).unwrap();
        let output = run.prepare(&c, &["x".to_string()]).unwrap().output().unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hello world x\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_macro_script_chdir() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("inner")).unwrap();
        let c = Context::default().with_dir(tmp.path());
        let run = RunSpec::parse("$sh(basename \"$(pwd -P)\"; echo $1) ||| $chdir(inner)").unwrap();
        let output = run.prepare(&c, &["arg".to_string()]).unwrap().output().unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "inner\narg\n");

        let run = RunSpec::parse("$sh(true) ||| $chdir($unknown)").unwrap();
        assert!(run.prepare(&c, &[]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_shebang_temp_file_is_removed() {
        let run = RunSpec::parse("#!sh\necho \"$0\"").unwrap();
        let prepared = run.prepare(&Context::default(), &[]).unwrap();
        let output = prepared.output().unwrap();
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        assert!(path.contains(crate::shell::TEMP_PREFIX));
        assert!(!std::path::Path::new(&path).exists());
    }
}
