//! Interpreters usable by shell macros and macro run scripts

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::process::Command as Process;
use std::str::FromStr;

use tempfile::NamedTempFile;

use crate::action::{exec_command, parse_value, Action, Completion, Context};
use crate::error::{SpecError, SpecResult};

/// Prefix of temporary script files
pub const TEMP_PREFIX: &str = "compspec_run_";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shell {
    Bash,
    Cmd,
    Elvish,
    Fish,
    Ion,
    Nu,
    Osh,
    Pwsh,
    Sh,
    Xonsh,
    Zsh,
}

impl Shell {
    pub const ALL: [Shell; 11] = [
        Shell::Bash,
        Shell::Cmd,
        Shell::Elvish,
        Shell::Fish,
        Shell::Ion,
        Shell::Nu,
        Shell::Osh,
        Shell::Pwsh,
        Shell::Sh,
        Shell::Xonsh,
        Shell::Zsh,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Shell::Bash => "bash",
            Shell::Cmd => "cmd",
            Shell::Elvish => "elvish",
            Shell::Fish => "fish",
            Shell::Ion => "ion",
            Shell::Nu => "nu",
            Shell::Osh => "osh",
            Shell::Pwsh => "pwsh",
            Shell::Sh => "sh",
            Shell::Xonsh => "xonsh",
            Shell::Zsh => "zsh",
        }
    }

    /// Interpreter for `$(...)` completion macros
    pub fn default_completion() -> Shell {
        if cfg!(windows) {
            Shell::Cmd
        } else {
            Shell::Sh
        }
    }

    /// Interpreter for `$(...)` run scripts
    pub fn default_run() -> Shell {
        if cfg!(windows) {
            Shell::Pwsh
        } else {
            Shell::Sh
        }
    }

    pub fn supported_on_windows(self) -> bool {
        matches!(
            self,
            Shell::Cmd | Shell::Elvish | Shell::Nu | Shell::Pwsh | Shell::Xonsh
        )
    }

    /// Build the process invocation running `script` with positional `args`.
    ///
    /// `pwsh` and `nu` get the script in a temporary file since they mangle
    /// arguments trailing an inline script.
    pub fn invocation(self, script: &str, args: &[String]) -> SpecResult<ShellInvocation> {
        if cfg!(windows) && !self.supported_on_windows() {
            return Err(SpecError::process(
                self.name(),
                format!("unsupported shell [{}]", std::env::consts::OS),
            ));
        }

        let program = self.name().to_string();
        let invocation = match self {
            Shell::Cmd => {
                let mut argv = vec!["/c".to_string(), script.to_string()];
                argv.extend_from_slice(args);
                ShellInvocation::inline(program, argv)
            }
            Shell::Pwsh => {
                let file = script_file(".ps1", script)?;
                let mut argv = vec![
                    "-NoProfile".to_string(),
                    "-File".to_string(),
                    path_arg(file.path()),
                ];
                argv.extend_from_slice(args);
                ShellInvocation::with_script(program, argv, file)
            }
            Shell::Nu => {
                let wrapped = format!("def --wrapped main [...args] {{ {} }}\n", script);
                let file = script_file(".nu", &wrapped)?;
                let mut argv = vec![path_arg(file.path())];
                argv.extend_from_slice(args);
                ShellInvocation::with_script(program, argv, file)
            }
            _ => {
                let mut argv = vec!["-c".to_string(), script.to_string(), "--".to_string()];
                argv.extend_from_slice(args);
                ShellInvocation::inline(program, argv)
            }
        };
        Ok(invocation)
    }

    /// Completion action running `script` and reading one candidate per output line
    pub fn action(self, script: String) -> Action {
        Action::callback(move |c| {
            let invocation = match self.invocation(&script, &c.args) {
                Ok(invocation) => invocation,
                Err(e) => return Completion::message(e.to_string()),
            };
            let shell = self;
            // invocation (and its script file) outlives the process run here
            exec_command(&invocation.program, invocation.args.clone(), move |output| {
                shell.parse_output(output)
            })
            .invoke(c)
        })
    }

    fn parse_output(self, output: &[u8]) -> Completion {
        let output = String::from_utf8_lossy(output);
        let suggestions = output
            .split('\n')
            .map(|line| match self {
                Shell::Cmd | Shell::Pwsh => line.trim_end_matches('\r'),
                _ => line,
            })
            .filter(|line| !line.is_empty())
            .map(parse_value)
            .collect();
        Completion::from_suggestions(suggestions)
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Shell {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Shell::ALL
            .iter()
            .copied()
            .find(|shell| shell.name() == s)
            .ok_or_else(|| SpecError::UnknownMacro(format!("${}", s)))
    }
}

/// A ready to spawn interpreter call; holds the temporary script file (if
/// any) until dropped.
#[derive(Debug)]
pub struct ShellInvocation {
    pub program: String,
    pub args: Vec<String>,
    script: Option<NamedTempFile>,
}

impl ShellInvocation {
    fn inline(program: String, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            script: None,
        }
    }

    fn with_script(program: String, args: Vec<String>, script: NamedTempFile) -> Self {
        Self {
            program,
            args,
            script: Some(script),
        }
    }

    /// Process builder in the context's directory and environment
    pub fn command(&self, c: &Context) -> Process {
        c.command(&self.program, &self.args)
    }

    pub fn script_path(&self) -> Option<&Path> {
        self.script.as_ref().map(|f| f.path())
    }

    /// Hand over the temporary script file so it outlives this invocation
    pub fn into_script(self) -> Option<NamedTempFile> {
        self.script
    }
}

/// Write `content` to a fresh owner-only temporary file ending in `suffix`
pub(crate) fn script_file(suffix: &str, content: &str) -> SpecResult<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(suffix)
        .tempfile()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_inline_invocation() {
        let inv = Shell::Bash.invocation("echo $1", &args(&["a", "b"])).unwrap();
        assert_eq!(inv.program, "bash");
        assert_eq!(inv.args, args(&["-c", "echo $1", "--", "a", "b"]));
        assert!(inv.script_path().is_none());

        let inv = Shell::Cmd.invocation("echo %1", &args(&["a"])).unwrap();
        assert_eq!(inv.args, args(&["/c", "echo %1", "a"]));
    }

    #[test]
    fn test_temp_file_invocation() {
        let inv = Shell::Nu.invocation("print $args", &args(&["x"])).unwrap();
        let path = inv.script_path().unwrap().to_path_buf();
        assert!(path.to_string_lossy().ends_with(".nu"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "def --wrapped main [...args] { print $args }\n");
        assert_eq!(inv.args, vec![path.to_string_lossy().to_string(), "x".to_string()]);

        drop(inv);
        assert!(!path.exists());

        let inv = Shell::Pwsh.invocation("$args", &[]).unwrap();
        assert_eq!(&inv.args[..2], &args(&["-NoProfile", "-File"])[..]);
        assert!(inv.args[2].ends_with(".ps1"));
    }

    #[test]
    fn test_parse_output_lines() {
        let result = Shell::Sh.parse_output(b"one\ttwo\n\nthree\n");
        assert_eq!(result.values(), vec!["one", "three"]);
        assert_eq!(result.suggestions[0].description, "two");

        let result = Shell::Pwsh.parse_output(b"a\r\nb\r\n");
        assert_eq!(result.values(), vec!["a", "b"]);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("zsh".parse::<Shell>().unwrap(), Shell::Zsh);
        assert!("csh".parse::<Shell>().unwrap_err().is_unknown());
    }

    #[cfg(unix)]
    #[test]
    fn test_action_runs_script() {
        let c = Context::default().with_args(["first"]);
        let result = Shell::Sh
            .action(r#"echo "$1"; printf 'b\tdesc\n'"#.to_string())
            .invoke(&c);
        assert_eq!(result.values(), vec!["first", "b"]);
        assert_eq!(result.suggestions[1].description, "desc");

        let result = Shell::Sh
            .action("echo broken >&2; exit 3".to_string())
            .invoke(&c);
        assert_eq!(result.messages, vec!["broken"]);
    }
}
