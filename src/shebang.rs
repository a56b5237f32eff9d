//! `#!interpreter [args]` scripts

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{SpecError, SpecResult};

lazy_static! {
    static ref HEADER: Regex = Regex::new(r"^#!(?P<command>[^ ]+)( (?P<arg>.*))?$").unwrap();
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shebang {
    /// Interpreter
    pub command: String,
    /// Inline interpreter arguments (more than one allowed)
    pub args: Vec<String>,
    /// Script without the header line
    pub script: String,
}

impl Shebang {
    pub fn parse(s: &str) -> SpecResult<Shebang> {
        let (first_line, script) = s
            .split_once('\n')
            .ok_or_else(|| SpecError::ShebangFormat("missing shebang header".to_string()))?;

        let caps = HEADER
            .captures(first_line.trim())
            .ok_or_else(|| SpecError::ShebangFormat("invalid shebang header".to_string()))?;

        let args = match caps.name("arg").map(|m| m.as_str()).filter(|a| !a.is_empty()) {
            Some(arg) => shlex::split(arg).ok_or_else(|| {
                SpecError::ShebangFormat(format!("invalid shebang arguments: {}", arg))
            })?,
            None => Vec::new(),
        };

        Ok(Shebang {
            command: caps["command"].to_string(),
            args,
            script: script.to_string(),
        })
    }

    /// Interpreter name without directory and `.exe` suffix
    pub fn interpreter(&self) -> &str {
        let base = self
            .command
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(&self.command);
        base.strip_suffix(".exe").unwrap_or(base)
    }

    /// Temporary file suffix and extra interpreter arguments the interpreter needs
    pub fn file_convention(&self) -> (&'static str, Option<&'static str>) {
        match self.interpreter() {
            "cmd" => (".cmd", Some("/c")),
            "pwsh" => (".ps1", Some("-f")),
            _ => ("", None),
        }
    }

    /// Render back into script form
    pub fn to_source(&self) -> String {
        let mut header = format!("#!{}", self.command);
        if !self.args.is_empty() {
            let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
            header.push(' ');
            header.push_str(&shlex::try_join(args).unwrap_or_else(|_| self.args.join(" ")));
        }
        format!("{}\n{}", header, self.script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let s = Shebang::parse("#!/usr/bin/env -S python3 -u\nprint(1)\n").unwrap();
        assert_eq!(s.command, "/usr/bin/env");
        assert_eq!(s.args, vec!["-S", "python3", "-u"]);
        assert_eq!(s.script, "print(1)\n");

        let s = Shebang::parse("#!sh\necho $1").unwrap();
        assert_eq!(s.command, "sh");
        assert!(s.args.is_empty());
        assert_eq!(s.to_source(), "#!sh\necho $1");
    }

    #[test]
    fn test_format_errors() {
        let err = Shebang::parse("echo $1").unwrap_err();
        assert_eq!(err.to_string(), "missing shebang header");
        let err = Shebang::parse("echo\n$1").unwrap_err();
        assert_eq!(err.to_string(), "invalid shebang header");
        assert!(matches!(Shebang::parse("#!\nx"), Err(SpecError::ShebangFormat(_))));
    }

    #[test]
    fn test_file_convention() {
        let s = Shebang::parse("#!C:\\tools\\pwsh.exe\nx").unwrap();
        assert_eq!(s.interpreter(), "pwsh");
        assert_eq!(s.file_convention(), (".ps1", Some("-f")));
        let s = Shebang::parse("#!/bin/bash\nx").unwrap();
        assert_eq!(s.file_convention(), ("", None));
    }
}
