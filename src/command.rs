//! Command tree
//!
//! [`CommandSpec`] is the serde shape of a spec file; [`Builder`] turns it into
//! an immutable [`Command`] tree with parsed flags, resolved parsing modes and
//! completion actions bound to their slots.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::action::{message, Action};
use crate::error::{SpecError, SpecResult};
use crate::expr::ExpressionList;
use crate::flag::{Capabilities, FlagSet, FlagSpec};
use crate::macros::MacroRegistry;
use crate::run::RunSpec;
use crate::{slog_debug, slog_warn};

/// How flags are recognised among the arguments of a command
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ParsingMode {
    /// Interspersed, but may be tightened by the completions bound to positionals
    #[default]
    Default,
    Interspersed,
    /// Flags stop at the first positional argument
    NonInterspersed,
    /// Every argument is positional
    Disabled,
}

impl ParsingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ParsingMode::Default => "",
            ParsingMode::Interspersed => "interspersed",
            ParsingMode::NonInterspersed => "non-interspersed",
            ParsingMode::Disabled => "disabled",
        }
    }
}

impl fmt::Display for ParsingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ParsingMode {
    type Error = SpecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "" => Ok(ParsingMode::Default),
            "interspersed" => Ok(ParsingMode::Interspersed),
            "non-interspersed" => Ok(ParsingMode::NonInterspersed),
            "disabled" => Ok(ParsingMode::Disabled),
            _ => Err(SpecError::ParsingMode(value)),
        }
    }
}

impl From<ParsingMode> for String {
    fn from(mode: ParsingMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Value of a `flags` entry: a description or `{description, nargs}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagEntry {
    Description(String),
    Extended {
        #[serde(default)]
        description: String,
        #[serde(default)]
        nargs: i32,
    },
}

impl FlagEntry {
    pub fn to_flag(&self, id: &str) -> SpecResult<FlagSpec> {
        match self {
            FlagEntry::Description(description) => FlagSpec::parse(id, description),
            FlagEntry::Extended { description, nargs } => {
                let mut flag = FlagSpec::parse(id, description)?;
                if *nargs != 0 {
                    flag.nargs = *nargs;
                }
                Ok(flag)
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSpec {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub flag: BTreeMap<String, ExpressionList>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub positional: Vec<ExpressionList>,
    #[serde(skip_serializing_if = "ExpressionList::is_empty")]
    pub positionalany: ExpressionList,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dash: Vec<ExpressionList>,
    #[serde(skip_serializing_if = "ExpressionList::is_empty")]
    pub dashany: ExpressionList,
}

/// A command node as written in a spec file
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
    pub parsing: ParsingMode,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, FlagEntry>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub persistentflags: BTreeMap<String, FlagEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclusiveflags: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunSpec>,
    pub completion: CompletionSpec,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandSpec>,
}

impl CommandSpec {
    pub fn from_yaml(content: &str) -> SpecResult<CommandSpec> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: &Path) -> SpecResult<CommandSpec> {
        let load_error = |reason: String| SpecError::Load {
            path: path.display().to_string(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        Self::from_yaml(&content).map_err(|e| load_error(e.to_string()))
    }
}

/// A built command node
#[derive(Debug)]
pub struct Command {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub group: String,
    pub hidden: bool,
    /// Resolved parsing mode
    pub parsing: ParsingMode,
    pub flags: FlagSet,
    pub persistent_flags: FlagSet,
    /// Persistent flags of ancestors
    pub inherited_flags: Vec<FlagSpec>,
    pub exclusive_flags: Vec<Vec<String>>,
    pub run: Option<RunSpec>,
    pub flag_completion: BTreeMap<String, Action>,
    pub positional: Vec<Action>,
    pub positional_any: Option<Action>,
    pub dash: Vec<Action>,
    pub dash_any: Option<Action>,
    /// Groups registered by the subcommands, in order of first use
    pub groups: Vec<String>,
    pub commands: Vec<Command>,
    /// Set on the fallback command of a failed build
    pub build_error: Option<String>,
}

impl Command {
    /// Subcommand called `name` or aliased as such
    pub fn find(&self, name: &str) -> Option<&Command> {
        self.commands
            .iter()
            .find(|c| c.name == name || c.aliases.iter().any(|a| a == name))
    }

    /// Every flag usable on this command, local ones first
    pub fn all_flags(&self) -> impl Iterator<Item = &FlagSpec> {
        self.flags
            .iter()
            .chain(self.persistent_flags.iter())
            .chain(self.inherited_flags.iter())
    }

    /// Flag addressed by a dashed token such as `--long`, `-s` or `-long`
    pub fn lookup_token(&self, token: &str) -> Option<&FlagSpec> {
        self.all_flags().find(|f| f.matches(token))
    }

    pub fn lookup_flag(&self, name: &str) -> Option<&FlagSpec> {
        self.all_flags().find(|f| f.name() == name)
    }

    /// Whether flags are recognised at all
    pub fn parses_flags(&self) -> bool {
        self.parsing != ParsingMode::Disabled
    }
}

#[derive(Clone, Default)]
struct Inherited {
    flags: Vec<FlagSpec>,
    completion: BTreeMap<String, Action>,
    /// Closest explicitly declared parsing mode
    parsing: ParsingMode,
}

/// Assembles [`Command`] trees, resolving macros against `registry`
pub struct Builder<'a> {
    registry: &'a MacroRegistry,
    capabilities: Capabilities,
}

impl<'a> Builder<'a> {
    pub fn new(registry: &'a MacroRegistry) -> Self {
        Self {
            registry,
            capabilities: Capabilities::default(),
        }
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn build(&self, spec: &CommandSpec) -> SpecResult<Command> {
        self.build_node(spec, &Inherited::default())
    }

    /// Build, or on failure a command that only reports the error
    pub fn build_or_fallback(&self, spec: &CommandSpec) -> Command {
        match self.build(spec) {
            Ok(command) => command,
            Err(e) => {
                slog_warn!(
                    "BUILD",
                    "failed",
                    &e.to_string(),
                    Some(serde_json::json!({"command": spec.name}))
                );
                fallback(&spec.name, e.to_string())
            }
        }
    }

    fn build_node(&self, spec: &CommandSpec, inherited: &Inherited) -> SpecResult<Command> {
        let flags = self.flag_set(&spec.flags, None)?;
        let persistent_flags = self.flag_set(&spec.persistentflags, Some(&flags))?;

        let mut command = Command {
            name: spec.name.clone(),
            aliases: spec.aliases.clone(),
            description: spec.description.clone(),
            group: spec.group.clone(),
            hidden: spec.hidden,
            parsing: ParsingMode::Default,
            flags,
            persistent_flags,
            inherited_flags: inherited.flags.clone(),
            exclusive_flags: spec.exclusiveflags.clone(),
            run: spec.run.clone(),
            flag_completion: inherited.completion.clone(),
            positional: spec.completion.positional.iter().map(|l| l.to_action()).collect(),
            positional_any: action_for(&spec.completion.positionalany),
            dash: spec.completion.dash.iter().map(|l| l.to_action()).collect(),
            dash_any: action_for(&spec.completion.dashany),
            groups: Vec::new(),
            commands: Vec::new(),
            build_error: None,
        };

        for group in &command.exclusive_flags {
            if let Some(unknown) = group.iter().find(|name| command.lookup_flag(name).is_none()) {
                return Err(SpecError::flag_syntax(
                    unknown,
                    "exclusive group references an unknown flag",
                ));
            }
        }

        for (name, list) in &spec.completion.flag {
            command.flag_completion.insert(name.clone(), list.to_action());
        }

        let declared = if spec.parsing == ParsingMode::Default {
            inherited.parsing
        } else {
            spec.parsing
        };
        command.parsing = self.resolve_parsing(spec, declared);
        slog_debug!(
            "BUILD",
            "command",
            serde_json::json!({"name": spec.name, "parsing": command.parsing.as_str()})
        );

        let mut child_inherited = Inherited {
            flags: inherited.flags.clone(),
            completion: inherited.completion.clone(),
            parsing: declared,
        };
        for flag in command.persistent_flags.iter() {
            child_inherited.flags.push(flag.clone());
            if let Some(action) = command.flag_completion.get(flag.name()) {
                child_inherited
                    .completion
                    .insert(flag.name().to_string(), action.clone());
            }
        }

        for child in &spec.commands {
            if !child.group.is_empty() && !command.groups.contains(&child.group) {
                command.groups.push(child.group.clone());
            }
            command.commands.push(self.build_node(child, &child_inherited)?);
        }
        Ok(command)
    }

    fn flag_set(
        &self,
        entries: &BTreeMap<String, FlagEntry>,
        siblings: Option<&FlagSet>,
    ) -> SpecResult<FlagSet> {
        let mut set = FlagSet::new(self.capabilities);
        for (id, entry) in entries {
            let flag = entry.to_flag(id)?;
            if siblings.and_then(|s| s.lookup(flag.name())).is_some() {
                return Err(SpecError::UnsupportedBinding(format!(
                    "flag redefined: {}",
                    flag.name()
                )));
            }
            set.add(flag)?;
        }
        Ok(set)
    }

    /// Apply the run rule and, for an undeclared mode, infer it from the
    /// positional completions
    fn resolve_parsing(&self, spec: &CommandSpec, declared: ParsingMode) -> ParsingMode {
        if spec.run.is_some() && spec.flags.is_empty() && spec.persistentflags.is_empty() {
            return ParsingMode::Disabled;
        }
        if declared != ParsingMode::Default {
            return declared;
        }

        let positional = &spec.completion.positional;
        if let Some(index) = positional
            .iter()
            .position(|l| l.disables_flag_parsing(self.registry))
        {
            return if index == 0 {
                ParsingMode::Disabled
            } else {
                ParsingMode::NonInterspersed
            };
        }
        if spec.completion.positionalany.disables_flag_parsing(self.registry) {
            return if positional.is_empty() {
                ParsingMode::Disabled
            } else {
                ParsingMode::NonInterspersed
            };
        }
        ParsingMode::Default
    }
}

fn action_for(list: &ExpressionList) -> Option<Action> {
    if list.is_empty() {
        None
    } else {
        Some(list.to_action())
    }
}

fn fallback(name: &str, error: String) -> Command {
    Command {
        name: name.to_string(),
        aliases: Vec::new(),
        description: String::new(),
        group: String::new(),
        hidden: false,
        parsing: ParsingMode::Disabled,
        flags: FlagSet::default(),
        persistent_flags: FlagSet::default(),
        inherited_flags: Vec::new(),
        exclusive_flags: Vec::new(),
        run: None,
        flag_completion: BTreeMap::new(),
        positional: Vec::new(),
        positional_any: Some(message(error.clone())),
        dash: Vec::new(),
        dash_any: None,
        groups: Vec::new(),
        commands: Vec::new(),
        build_error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::Macro;
    use crate::action::values;

    fn registry() -> MacroRegistry {
        let mut registry = MacroRegistry::with_core("compspec");
        registry.add_custom("raw", Macro::single(|s: String| values([s])).no_flag_parsing());
        registry
    }

    fn build(yaml: &str) -> SpecResult<Command> {
        let spec = CommandSpec::from_yaml(yaml)?;
        Builder::new(&registry()).build(&spec)
    }

    #[test]
    fn test_parsing_mode_strings() {
        let spec = CommandSpec::from_yaml("name: x\nparsing: non-interspersed").unwrap();
        assert_eq!(spec.parsing, ParsingMode::NonInterspersed);
        assert!(CommandSpec::from_yaml("name: x\nparsing: sometimes").is_err());
        assert_eq!(String::from(ParsingMode::Disabled), "disabled");
    }

    #[test]
    fn test_flag_entries() {
        let cmd = build(
            r#"
name: cmd
flags:
  -b, --bool: bool flag
  --many=: {description: takes two, nargs: 2}
persistentflags:
  -p, --persistent=: persistent flag
"#,
        )
        .unwrap();
        assert_eq!(cmd.flags.len(), 2);
        assert_eq!(cmd.lookup_flag("many").map(|f| f.nargs), Some(2));
        assert_eq!(
            cmd.lookup_token("-p").map(|f| f.description.as_str()),
            Some("persistent flag")
        );
    }

    #[test]
    fn test_persistent_flags_are_inherited() {
        let cmd = build(
            r#"
name: root
persistentflags:
  --global=: global
completion:
  flag:
    global: [one, two]
commands:
  - name: sub
    commands:
      - name: leaf
"#,
        )
        .unwrap();
        let leaf = cmd.find("sub").and_then(|s| s.find("leaf")).unwrap();
        assert!(leaf.lookup_token("--global").is_some());
        assert!(leaf.flag_completion.contains_key("global"));
    }

    #[test]
    fn test_redefined_and_unsupported_flags() {
        let err = build("name: x\nflags:\n  --a: a\npersistentflags:\n  --a: b").unwrap_err();
        assert!(matches!(err, SpecError::UnsupportedBinding(_)));

        let spec = CommandSpec::from_yaml("name: x\nflags:\n  -short: s").unwrap();
        let reg = registry();
        let posix = Builder::new(&reg).capabilities(Capabilities::posix());
        assert!(matches!(
            posix.build(&spec),
            Err(SpecError::UnsupportedBinding(_))
        ));

        let err = build("name: x\nflags:\n  --a: a\nexclusiveflags: [[a, b]]").unwrap_err();
        assert!(matches!(err, SpecError::FlagSyntax { .. }));
    }

    #[test]
    fn test_run_without_flags_disables_parsing() {
        let cmd = build("name: x\nrun: \"$(echo a)\"").unwrap();
        assert_eq!(cmd.parsing, ParsingMode::Disabled);

        let cmd = build("name: x\nrun: \"$(echo a)\"\nflags:\n  --a: a").unwrap();
        assert_eq!(cmd.parsing, ParsingMode::Default);
    }

    #[test]
    fn test_inference_from_positionals() {
        let cmd = build("name: x\ncompletion:\n  positional:\n    - [\"$spec(other.yaml)\"]").unwrap();
        assert_eq!(cmd.parsing, ParsingMode::Disabled);

        let cmd = build("name: x\ncompletion:\n  positional:\n    - [a]\n    - [\"$_.raw\"]").unwrap();
        assert_eq!(cmd.parsing, ParsingMode::NonInterspersed);

        let cmd = build("name: x\ncompletion:\n  positionalany: [\"$compspec.raw\"]").unwrap();
        assert_eq!(cmd.parsing, ParsingMode::Disabled);

        let cmd = build("name: x\ncompletion:\n  positional:\n    - [a]\n  positionalany: [\"$_.raw\"]").unwrap();
        assert_eq!(cmd.parsing, ParsingMode::NonInterspersed);

        let cmd = build("name: x\ncompletion:\n  positional:\n    - [\"$(echo a)\"]").unwrap();
        assert_eq!(cmd.parsing, ParsingMode::Default);

        let cmd = build(
            "name: x\nparsing: interspersed\ncompletion:\n  positional:\n    - [\"$_.raw\"]",
        )
        .unwrap();
        assert_eq!(cmd.parsing, ParsingMode::Interspersed);
    }

    #[test]
    fn test_explicit_mode_is_inherited() {
        let cmd = build(
            r#"
name: root
parsing: non-interspersed
commands:
  - name: sub
  - name: own
    parsing: interspersed
"#,
        )
        .unwrap();
        assert_eq!(cmd.find("sub").map(|c| c.parsing), Some(ParsingMode::NonInterspersed));
        assert_eq!(cmd.find("own").map(|c| c.parsing), Some(ParsingMode::Interspersed));
    }

    #[test]
    fn test_groups_registered_once() {
        let cmd = build(
            r#"
name: root
commands:
  - {name: a, group: main, aliases: [alpha]}
  - {name: b, group: main}
  - {name: c, group: other}
"#,
        )
        .unwrap();
        assert_eq!(cmd.groups, vec!["main", "other"]);
        assert_eq!(cmd.find("alpha").map(|c| c.name.as_str()), Some("a"));
    }

    #[test]
    fn test_fallback_reports_error() {
        let spec = CommandSpec::from_yaml("name: broken\nflags:\n  \"=\": nothing").unwrap();
        let cmd = Builder::new(&registry()).build_or_fallback(&spec);
        assert_eq!(cmd.name, "broken");
        assert_eq!(cmd.parsing, ParsingMode::Disabled);
        let message = cmd.build_error.clone().unwrap();
        assert!(message.starts_with("flag syntax invalid"));
        let result = cmd
            .positional_any
            .as_ref()
            .unwrap()
            .invoke(&crate::action::Context::default());
        assert_eq!(result.messages, vec![message]);
    }
}
