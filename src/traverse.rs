//! Argument traversal
//!
//! Walks a command line through the [`Command`] tree the way a flag parser
//! would: descending into subcommands, consuming flags and their values and
//! collecting positional and dash (`--`) arguments. Completion then picks the
//! slot the last argument falls into.

use std::collections::BTreeMap;

use crate::action::{Completion, Context, Suggestion};
use crate::command::{Command, ParsingMode};
use crate::error::{SpecError, SpecResult};
use crate::flag::FlagSpec;
use crate::slog_debug;

/// Outcome of walking the arguments of a command line
#[derive(Debug)]
pub struct Walk<'a> {
    /// Deepest command reached
    pub command: &'a Command,
    /// Values of every flag that was set, by flag name
    pub flags: BTreeMap<String, Vec<String>>,
    pub positional: Vec<String>,
    /// Arguments after `--`
    pub dash: Option<Vec<String>>,
    /// Flag that ran out of arguments, with the values it got so far
    pub pending: Option<(&'a FlagSpec, Vec<String>)>,
    /// Flag tokens matching no known flag
    pub unknown: Vec<String>,
}

impl<'a> Walk<'a> {
    /// Whether the next token may still be a flag
    pub fn flags_active(&self) -> bool {
        match self.command.parsing {
            ParsingMode::Disabled => false,
            ParsingMode::NonInterspersed => self.positional.is_empty(),
            _ => true,
        }
    }

    /// Context with `C_FLAG_<NAME>` set for every set flag. Variables exported
    /// by an enclosing evaluation (a parent spec) are not carried over.
    pub fn context(&self, base: &Context) -> Context {
        let mut c = base.clone();
        c.clear_completion_env();
        for (name, values) in &self.flags {
            c.setenv(format!("C_FLAG_{}", name.to_uppercase()), values.join(","));
        }
        c.args = self.positional.clone();
        c.parts.clear();
        c
    }

    fn set(&mut self, flag: &FlagSpec, values: Vec<String>) {
        let entry = self.flags.entry(flag.name().to_string()).or_default();
        if !flag.repeatable {
            entry.clear();
        }
        entry.extend(values);
    }
}

impl Command {
    /// Walk `tokens` starting at this command
    pub fn walk(&self, tokens: &[String]) -> Walk<'_> {
        let mut walk = Walk {
            command: self,
            flags: BTreeMap::new(),
            positional: Vec::new(),
            dash: None,
            pending: None,
            unknown: Vec::new(),
        };

        let mut index = 0;
        while index < tokens.len() {
            let token = &tokens[index];
            index += 1;

            if let Some(dash) = walk.dash.as_mut() {
                dash.push(token.clone());
                continue;
            }
            if !walk.flags_active() {
                walk.positional.push(token.clone());
                continue;
            }
            if token == "--" {
                walk.dash = Some(Vec::new());
                continue;
            }
            if walk.positional.is_empty() {
                if let Some(sub) = walk.command.find(token) {
                    walk.command = sub;
                    continue;
                }
            }
            if token.len() > 1 && token.starts_with('-') {
                if let Some(pending) = walk_flag(&mut walk, token, tokens, &mut index) {
                    walk.pending = Some(pending);
                    break;
                }
                continue;
            }
            walk.positional.push(token.clone());
        }
        walk
    }

    /// Complete the last element of `args`, the preceding ones being already
    /// typed arguments. Directory, environment and registry come from `base`.
    pub fn complete(&self, base: &Context, args: &[String]) -> Completion {
        let (value, tokens) = match args.split_last() {
            Some((value, tokens)) => (value.clone(), tokens),
            None => (String::new(), args),
        };
        let walk = self.walk(tokens);
        let cmd = walk.command;
        let mut c = walk.context(base);
        c.value = value.clone();
        slog_debug!(
            "COMPLETE",
            "walk",
            serde_json::json!({
                "command": cmd.name,
                "positional": walk.positional,
                "flags": walk.flags,
                "dash": walk.dash,
                "pending": walk.pending.as_ref().map(|(f, _)| f.name()),
            })
        );

        if let Some((flag, _)) = &walk.pending {
            return flag_value(cmd, flag, &c);
        }

        if let Some(dash) = &walk.dash {
            c.args = dash.clone();
            return cmd
                .dash
                .get(dash.len())
                .or(cmd.dash_any.as_ref())
                .map(|a| a.invoke(&c))
                .unwrap_or_default();
        }

        if value.starts_with('-') && walk.flags_active() {
            if let Some((name, partial)) = value.split_once('=') {
                if let Some(flag) = cmd.lookup_token(name).filter(|f| f.takes_value) {
                    c.value = partial.to_string();
                    let mut result = flag_value(cmd, flag, &c);
                    result.prefix_values(&format!("{}=", name));
                    return result;
                }
            }
            return flag_names(&walk, &value);
        }

        let index = walk.positional.len();
        let positional = cmd
            .positional
            .get(index)
            .or(cmd.positional_any.as_ref())
            .map(|a| a.invoke(&c))
            .unwrap_or_default();
        if index == 0 {
            Completion::merge([subcommands(cmd), positional])
        } else {
            positional
        }
    }

    /// Walk `args` for execution: every argument must be consumed and the
    /// required and exclusive flag constraints hold.
    pub fn parse<'a>(&'a self, args: &[String]) -> SpecResult<Walk<'a>> {
        let walk = self.walk(args);
        if let Some((flag, _)) = &walk.pending {
            return Err(SpecError::Usage(format!(
                "flag needs an argument: {}",
                flag.long_form().or_else(|| flag.short_form()).unwrap_or_default()
            )));
        }

        if let Some(token) = walk.unknown.first() {
            return Err(SpecError::Usage(format!("unknown flag: {}", token)));
        }

        let cmd = walk.command;
        if cmd.parses_flags() {
            let missing: Vec<&str> = cmd
                .all_flags()
                .filter(|f| f.required && !walk.flags.contains_key(f.name()))
                .map(|f| f.name())
                .collect();
            if !missing.is_empty() {
                return Err(SpecError::Usage(format!(
                    "required flag(s) {} not set",
                    missing
                        .iter()
                        .map(|m| format!("{:?}", m))
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
        }

        for group in &cmd.exclusive_flags {
            let set: Vec<&String> = group.iter().filter(|n| walk.flags.contains_key(*n)).collect();
            if set.len() > 1 {
                return Err(SpecError::Usage(format!(
                    "if any flags in the group [{}] are set none of the others can be; [{}] were all set",
                    group.join(" "),
                    set.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" ")
                )));
            }
        }
        Ok(walk)
    }
}

/// Consume a flag token (and its values); returns the flag if it ran out of
/// arguments.
fn walk_flag<'a>(
    walk: &mut Walk<'a>,
    token: &str,
    tokens: &[String],
    index: &mut usize,
) -> Option<(&'a FlagSpec, Vec<String>)> {
    let cmd = walk.command;
    let (name, inline) = match token.split_once('=') {
        Some((name, value)) => (name, Some(value.to_string())),
        None => (token, None),
    };

    // --long, -long or a multi-character shorthand
    if token.starts_with("--") || cmd.lookup_token(name).is_some() {
        let Some(flag) = cmd.lookup_token(name) else {
            walk.unknown.push(name.to_string());
            return None;
        };
        return assign(walk, flag, inline, tokens, index);
    }

    // POSIX shorthand chain: -abc, -ovalue, -o=value
    let chars: Vec<(usize, char)> = token.char_indices().skip(1).collect();
    for (offset, ch) in chars {
        let shorthand = format!("-{}", ch);
        let Some(flag) = cmd.lookup_token(&shorthand) else {
            walk.unknown.push(shorthand);
            return None;
        };
        if !flag.takes_value {
            walk.set(flag, vec!["true".to_string()]);
            continue;
        }
        let rest = &token[offset + ch.len_utf8()..];
        let rest = rest.strip_prefix('=').unwrap_or(rest);
        let inline = if rest.is_empty() { None } else { Some(rest.to_string()) };
        return assign(walk, flag, inline, tokens, index);
    }
    None
}

fn assign<'a>(
    walk: &mut Walk<'a>,
    flag: &'a FlagSpec,
    inline: Option<String>,
    tokens: &[String],
    index: &mut usize,
) -> Option<(&'a FlagSpec, Vec<String>)> {
    if let Some(value) = inline {
        walk.set(flag, vec![value]);
        return None;
    }
    if !flag.takes_value {
        walk.set(flag, vec!["true".to_string()]);
        return None;
    }
    if flag.optional_arg {
        walk.set(flag, vec![String::new()]);
        return None;
    }

    let mut values = Vec::new();
    if flag.nargs < 0 {
        while *index < tokens.len() && !tokens[*index].starts_with('-') {
            values.push(tokens[*index].clone());
            *index += 1;
        }
        if *index >= tokens.len() {
            return Some((flag, values));
        }
    } else {
        let wanted = flag.nargs.max(1) as usize;
        while values.len() < wanted {
            if *index >= tokens.len() {
                return Some((flag, values));
            }
            values.push(tokens[*index].clone());
            *index += 1;
        }
    }
    walk.set(flag, values);
    None
}

fn flag_value(cmd: &Command, flag: &FlagSpec, c: &Context) -> Completion {
    let mut result = cmd
        .flag_completion
        .get(flag.name())
        .map(|a| a.invoke(c))
        .unwrap_or_default();
    if result.usage.is_empty() {
        result.usage = flag.description.clone();
    }
    result
}

fn flag_names(walk: &Walk<'_>, value: &str) -> Completion {
    let cmd = walk.command;
    let long_only = value.starts_with("--");
    let mut suggestions = Vec::new();

    for flag in cmd.all_flags() {
        if flag.hidden || (walk.flags.contains_key(flag.name()) && !flag.repeatable) {
            continue;
        }
        let excluded = cmd.exclusive_flags.iter().any(|group| {
            group.iter().any(|n| n == flag.name())
                && group.iter().any(|n| n != flag.name() && walk.flags.contains_key(n))
        });
        if excluded {
            continue;
        }

        let style = if flag.optional_arg {
            "yellow"
        } else if flag.takes_value && flag.repeatable {
            "magenta"
        } else if flag.takes_value {
            "blue"
        } else {
            ""
        };

        if let Some(long) = flag.long_form() {
            if !long_only || long.starts_with("--") {
                suggestions.push(
                    Suggestion::described(long, flag.description.clone())
                        .styled(style)
                        .tagged("longhand flags"),
                );
            }
        }
        if let Some(short) = flag.short_form() {
            if !long_only {
                suggestions.push(
                    Suggestion::described(short, flag.description.clone())
                        .styled(style)
                        .tagged("shorthand flags"),
                );
            }
        }
    }

    let mut result = Completion::from_suggestions(suggestions);
    result.add_nospace(".");
    result
}

fn subcommands(cmd: &Command) -> Completion {
    let mut suggestions = Vec::new();
    for sub in cmd.commands.iter().filter(|s| !s.hidden) {
        for name in std::iter::once(&sub.name).chain(sub.aliases.iter()) {
            suggestions.push(Suggestion::described(name.clone(), sub.description.clone()).tagged("commands"));
        }
    }
    Completion::from_suggestions(suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Builder, CommandSpec};
    use crate::macros::MacroRegistry;
    use std::rc::Rc;

    const SPEC: &str = r#"
name: tool
persistentflags:
  -v, --verbose: verbose output
flags:
  -o, --output=: output file
  -t, --tag=*: tags
  --color?: colorize
  --pair={2}: two values
  --secret&: hidden
  --json: json output
  --yaml: yaml output
exclusiveflags:
  - [json, yaml]
completion:
  flag:
    output: [out.txt, out.json]
    color: [always, never]
    pair: ["${C_FLAG_TAG}"]
  positional:
    - [first]
    - [second]
  positionalany: [any]
  dash:
    - [dash1]
  dashany: ["${C_ARG0}"]
commands:
  - name: sub
    aliases: [s]
    description: a subcommand
    completion:
      positional:
        - ["${C_FLAG_VERBOSE}"]
  - name: secret
    hidden: true
"#;

    fn tool() -> Command {
        let registry = MacroRegistry::with_core("compspec");
        Builder::new(&registry)
            .build(&CommandSpec::from_yaml(SPEC).unwrap())
            .unwrap()
    }

    fn complete(args: &[&str]) -> Completion {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let c = Context::new(Rc::new(MacroRegistry::with_core("compspec")));
        tool().complete(&c, &args)
    }

    #[test]
    fn test_first_positional_with_subcommands() {
        let result = complete(&[""]);
        assert_eq!(result.values(), vec!["sub", "s", "first"]);
        assert_eq!(result.suggestions[0].tag, "commands");
        assert_eq!(result.suggestions[0].description, "a subcommand");
    }

    #[test]
    fn test_positional_index_and_overflow() {
        assert_eq!(complete(&["a", ""]).values(), vec!["second"]);
        assert_eq!(complete(&["a", "-o", "x", "b", ""]).values(), vec!["any"]);
        assert_eq!(complete(&["a", "--json", ""]).values(), vec!["second"]);
    }

    #[test]
    fn test_flag_values() {
        let result = complete(&["-o", ""]);
        assert_eq!(result.values(), vec!["out.txt", "out.json"]);
        assert_eq!(result.usage, "output file");

        assert_eq!(complete(&["--output", ""]).values(), vec!["out.txt", "out.json"]);
        assert_eq!(
            complete(&["--color=n"]).values(),
            vec!["--color=always", "--color=never"]
        );
        // optional argument never consumes the next token
        assert_eq!(complete(&["--color", ""]).values(), vec!["sub", "s", "first"]);
    }

    #[test]
    fn test_flag_env_and_nargs() {
        let result = complete(&["-t", "a", "--tag=b", "--pair", "x", ""]);
        assert_eq!(result.values(), vec!["a,b"]);

        let result = complete(&["-v", "sub", ""]);
        assert_eq!(result.values(), vec!["true"]);
        let result = complete(&["s", "--verbose", ""]);
        assert_eq!(result.values(), vec!["true"]);
    }

    #[test]
    fn test_flag_names() {
        let result = complete(&["--"]);
        assert_eq!(
            result.values(),
            vec!["--color", "--json", "--pair", "--yaml", "--output", "--tag", "--verbose"]
        );
        assert_eq!(result.suggestions[0].style, "yellow");
        assert_eq!(result.suggestions[2].style, "blue");
        assert_eq!(result.suggestions[5].style, "magenta");
        assert_eq!(result.suggestions[1].tag, "longhand flags");
        assert_eq!(result.suggestions[1].description, "json output");

        let result = complete(&["--json", "-o", "x", "-"]);
        assert!(!result.values().contains(&"--yaml"));
        assert!(!result.values().contains(&"--output"));
        assert!(!result.values().contains(&"-o"));
        assert!(result.values().contains(&"-t"));
        assert!(!result.values().contains(&"--secret"));

        let result = complete(&["-t", "x", "--"]);
        assert!(result.values().contains(&"--tag"));
    }

    #[test]
    fn test_shorthand_chain() {
        let t = tool();
        let walk = t.walk(&["-vofile".to_string()]);
        assert_eq!(walk.flags.get("verbose"), Some(&vec!["true".to_string()]));
        assert_eq!(walk.flags.get("output"), Some(&vec!["file".to_string()]));
    }

    #[test]
    fn test_dash_arguments() {
        assert_eq!(complete(&["--", ""]).values(), vec!["dash1"]);
        assert_eq!(complete(&["a", "--", "x", ""]).values(), vec!["x"]);
    }

    #[test]
    fn test_parse_validation() {
        let cmd = tool();
        let args = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(cmd.parse(&args(&["--json", "a"])).is_ok());
        let err = cmd.parse(&args(&["--json", "--yaml"])).unwrap_err();
        assert!(err.to_string().contains("[json yaml] were all set"));
        let err = cmd.parse(&args(&["--output"])).unwrap_err();
        assert_eq!(err.to_string(), "flag needs an argument: --output");
    }

    #[test]
    fn test_unknown_flags() {
        let cmd = tool();
        let args = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let err = cmd.parse(&args(&["--nope=1", "a"])).unwrap_err();
        assert_eq!(err.to_string(), "unknown flag: --nope");
        let err = cmd.parse(&args(&["-vz"])).unwrap_err();
        assert_eq!(err.to_string(), "unknown flag: -z");

        // completion keeps going past them
        assert_eq!(complete(&["--nope", "a", ""]).values(), vec!["second"]);
    }

    #[test]
    fn test_required_flags() {
        let registry = MacroRegistry::with_core("compspec");
        let spec = CommandSpec::from_yaml("name: x\nflags:\n  --must=!: required").unwrap();
        let cmd = Builder::new(&registry).build(&spec).unwrap();
        let err = cmd.parse(&[]).unwrap_err();
        assert_eq!(err.to_string(), r#"required flag(s) "must" not set"#);
        assert!(cmd.parse(&["--must".to_string(), "v".to_string()]).is_ok());
    }
}
