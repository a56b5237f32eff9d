//! Core macro set
//!
//! Registered into every [`MacroRegistry`] built with
//! [`MacroRegistry::with_core`]. Names shared with modifiers (`chdir`, `list`,
//! ...) are placeholders so signature listings are complete; their behaviour
//! lives in [`crate::modifier`].

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::action::{directories, executables, files, message, values, Action, Completion};
use crate::command::{Builder, CommandSpec};
use crate::error::{SpecError, SpecResult};
use crate::macros::{Macro, MacroArg, MacroRegistry};
use crate::shell::Shell;
use crate::{slog_debug, slog_warn};

pub fn register(registry: &mut MacroRegistry) {
    for name in ["chdir", "list", "multiparts", "nospace", "uniquelist"] {
        registry.add_core(name, Macro::single(|_: String| values(Vec::<String>::new())));
    }

    registry.add_core(
        "directories",
        Macro::none(directories).described("directories below the typed path"),
    );
    registry.add_core(
        "files",
        Macro::variadic(files).described("files, optionally restricted to suffixes"),
    );
    registry.add_core(
        "executables",
        Macro::variadic(executables).described("executables in PATH or the given directories"),
    );
    registry.add_core(
        "message",
        Macro::single(|s: String| message(s)).described("show a message"),
    );
    registry.add_core(
        "spec",
        Macro::single(spec)
            .no_flag_parsing()
            .described("complete with a nested spec file"),
    );

    registry.add_core(
        "",
        Macro::single(|s: String| Shell::default_completion().action(s))
            .described("run a script in the default shell"),
    );
    for shell in Shell::ALL {
        registry.add_core(
            shell.name(),
            Macro::single(move |s: String| shell.action(s))
                .described(format!("run a script in {}", shell.name())),
        );
    }
}

/// Argument of `$spec(path[, offset])`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecTarget {
    pub path: String,
    /// Leading positional arguments hidden from the nested spec
    pub offset: usize,
}

impl MacroArg for SpecTarget {
    fn decode(text: &str) -> SpecResult<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(decode_error(text, "missing path"));
        }
        if trimmed.starts_with('{') {
            return serde_yaml::from_str(trimmed).map_err(|e| decode_error(text, e.to_string()));
        }
        if trimmed.starts_with('[') {
            let (path, offset): (String, i64) = match serde_yaml::from_str::<Vec<Value>>(trimmed)
                .map_err(|e| decode_error(text, e.to_string()))?
                .as_slice()
            {
                [Value::String(path)] => (path.clone(), 0),
                [Value::String(path), Value::Number(n)] if n.is_i64() || n.is_u64() => {
                    (path.clone(), n.as_i64().unwrap_or(i64::MAX))
                }
                _ => return Err(decode_error(text, "expected [path] or [path, offset]")),
            };
            return target(text, path, offset);
        }

        if let Some((path, offset)) = trimmed.rsplit_once(',') {
            if let Ok(offset) = offset.trim().parse::<i64>() {
                return target(text, path.trim().to_string(), offset);
            }
        }
        Ok(SpecTarget {
            path: trimmed.to_string(),
            offset: 0,
        })
    }
}

fn target(text: &str, path: String, offset: i64) -> SpecResult<SpecTarget> {
    let offset =
        usize::try_from(offset).map_err(|_| decode_error(text, "offset must not be negative"))?;
    Ok(SpecTarget { path, offset })
}

fn decode_error(text: &str, reason: impl Into<String>) -> SpecError {
    SpecError::Decode {
        text: text.to_string(),
        expected: SpecTarget::signature(),
        reason: reason.into(),
    }
}

/// Complete with the spec at `target.path`, relative to the context directory
pub fn spec(target: SpecTarget) -> Action {
    Action::callback(move |c| {
        let path = c.abs(&target.path);
        slog_debug!(
            "SPEC",
            "load",
            serde_json::json!({"path": path, "offset": target.offset})
        );
        let command = CommandSpec::load(&path).and_then(|spec| Builder::new(c.registry()).build(&spec));
        let command = match command {
            Ok(command) => command,
            Err(e) => {
                slog_warn!("SPEC", "load_failed", &e.to_string(), None);
                return Completion::message(e.to_string());
            }
        };

        let mut args: Vec<String> = c.args.iter().skip(target.offset).cloned().collect();
        args.push(c.value.clone());
        command.complete(c, &args)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(text: &str) -> SpecResult<SpecTarget> {
        SpecTarget::decode(text)
    }

    #[test]
    fn test_spec_target_decoding() {
        assert_eq!(
            decode("nested.yaml").unwrap(),
            SpecTarget {
                path: "nested.yaml".into(),
                offset: 0
            }
        );
        assert_eq!(decode("nested.yaml, 1").unwrap().offset, 1);
        assert_eq!(decode("a,b.yaml").unwrap().path, "a,b.yaml");
        assert_eq!(
            decode("{path: x.yaml, offset: 2}").unwrap(),
            SpecTarget {
                path: "x.yaml".into(),
                offset: 2
            }
        );
        assert_eq!(
            decode("[nested.yaml, 1]").unwrap(),
            SpecTarget {
                path: "nested.yaml".into(),
                offset: 1
            }
        );
        assert_eq!(decode("[nested.yaml]").unwrap().offset, 0);
        assert!(matches!(decode("[nested.yaml, -2]"), Err(SpecError::Decode { .. })));
        assert!(matches!(decode("[nested.yaml, x]"), Err(SpecError::Decode { .. })));
        assert!(matches!(decode(""), Err(SpecError::Decode { .. })));
        assert!(matches!(decode("x.yaml, -1"), Err(SpecError::Decode { .. })));
    }

    #[test]
    fn test_registered_names() {
        let registry = MacroRegistry::with_core("compspec");
        for name in ["", "sh", "nu", "ion", "files", "spec", "chdir", "message"] {
            assert!(registry.get(name).is_some(), "missing core macro {:?}", name);
        }
        assert!(registry.get("spec").unwrap().disables_flag_parsing());
        assert!(!registry.get("sh").unwrap().disables_flag_parsing());
        assert_eq!(registry.get("files").unwrap().signature(), r#"[""]"#);
        assert_eq!(
            registry.get("spec").unwrap().signature(),
            r#"{path: "", offset: 0}"#
        );
    }

    #[test]
    fn test_placeholders_are_empty() {
        let registry = MacroRegistry::with_core("compspec");
        let action = registry.lookup("$list(,)").unwrap().parse("$list(,)").unwrap();
        assert!(action.invoke(&crate::action::Context::default()).is_empty());
    }
}
