//! Flag identifier grammar
//!
//! `[-shorthand][, ][-[-]longhand][modifiers][{nargs}]` where modifiers are any
//! combination of `=` (takes a value), `*` (repeatable), `?` (optional value),
//! `&` (hidden) and `!` (required). A longhand written with a single dash is a
//! non-POSIX multi-character name.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{SpecError, SpecResult};

lazy_static! {
    static ref FLAG_ID: Regex = Regex::new(
        r"^(?P<shorthand>-[^-][^ =*?&!{}]*)?(, )?(?P<longhand>-[-]?[^ =*?&!{}]*)?(?P<modifier>[=*?&!]*)(\{(?P<nargs>-?\d+)\})?$"
    )
    .unwrap();
}

/// A parsed flag identifier
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSpec {
    pub shorthand: String,
    pub longhand: String,
    pub description: String,
    /// Longhand was written with a single dash (`-long`)
    pub name_as_shorthand: bool,
    pub repeatable: bool,
    pub optional_arg: bool,
    pub takes_value: bool,
    pub hidden: bool,
    pub required: bool,
    /// Number of tokens consumed by the flag (0 = default)
    pub nargs: i32,
}

impl FlagSpec {
    /// Parse a flag identifier such as `-s, --long=` or `-short*`
    pub fn parse(id: &str, description: &str) -> SpecResult<FlagSpec> {
        let caps = FLAG_ID
            .captures(id)
            .ok_or_else(|| SpecError::flag_syntax(id, "does not match flag grammar"))?;

        let group = |name: &str| caps.name(name).map(|m| m.as_str()).unwrap_or("");
        let longhand = group("longhand");
        let modifier = group("modifier");

        let mut flag = FlagSpec {
            shorthand: group("shorthand").trim_start_matches('-').to_string(),
            longhand: longhand.trim_start_matches('-').to_string(),
            description: description.to_string(),
            name_as_shorthand: !longhand.is_empty() && !longhand.starts_with("--"),
            repeatable: modifier.contains('*'),
            optional_arg: modifier.contains('?'),
            takes_value: false,
            hidden: modifier.contains('&'),
            required: modifier.contains('!'),
            nargs: 0,
        };
        flag.takes_value = flag.optional_arg || modifier.contains('=');

        if let Some(nargs) = caps.name("nargs") {
            flag.nargs = nargs
                .as_str()
                .parse()
                .map_err(|e| SpecError::flag_syntax(id, format!("invalid nargs: {}", e)))?;
        }

        if flag.longhand.is_empty() && flag.shorthand.is_empty() {
            return Err(SpecError::flag_syntax(id, "neither shorthand nor longhand"));
        }
        Ok(flag)
    }

    /// Canonical name: the longhand if present, the shorthand otherwise
    pub fn name(&self) -> &str {
        if self.longhand.is_empty() {
            &self.shorthand
        } else {
            &self.longhand
        }
    }

    /// `--long` (or `-long` for non-POSIX names)
    pub fn long_form(&self) -> Option<String> {
        if self.longhand.is_empty() {
            return None;
        }
        Some(if self.name_as_shorthand {
            format!("-{}", self.longhand)
        } else {
            format!("--{}", self.longhand)
        })
    }

    pub fn short_form(&self) -> Option<String> {
        if self.shorthand.is_empty() {
            None
        } else {
            Some(format!("-{}", self.shorthand))
        }
    }

    /// Whether `token` (without any `=value`) names this flag
    pub fn matches(&self, token: &str) -> bool {
        self.long_form().as_deref() == Some(token) || self.short_form().as_deref() == Some(token)
    }

    /// Render the flag back into identifier syntax
    pub fn format(&self) -> String {
        let mut s = String::new();

        if let Some(short) = self.short_form() {
            s.push_str(&short);
            if !self.longhand.is_empty() {
                s.push_str(", ");
            }
        }
        if let Some(long) = self.long_form() {
            s.push_str(&long);
        }

        if self.optional_arg {
            s.push('?');
        } else if self.takes_value {
            s.push('=');
        }
        if self.repeatable {
            s.push('*');
        }
        if self.required {
            s.push('!');
        }
        if self.hidden {
            s.push('&');
        }
        if self.nargs != 0 {
            s.push_str(&format!("{{{}}}", self.nargs));
        }
        s
    }
}

/// Features a flag set implementation offers beyond plain POSIX flags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Shorthands longer than one character
    pub long_shorthand: bool,
    /// Flags without a longhand
    pub shorthand_only: bool,
    pub nargs: bool,
}

impl Capabilities {
    pub fn extended() -> Self {
        Self {
            long_shorthand: true,
            shorthand_only: true,
            nargs: true,
        }
    }

    pub fn posix() -> Self {
        Self {
            long_shorthand: false,
            shorthand_only: false,
            nargs: false,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::extended()
    }
}

/// Ordered set of flags bound to one command
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlagSet {
    flags: Vec<FlagSpec>,
    capabilities: Capabilities,
}

impl FlagSet {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            flags: Vec::new(),
            capabilities,
        }
    }

    /// Bind a flag, rejecting features the flag set cannot express
    pub fn add(&mut self, flag: FlagSpec) -> SpecResult<()> {
        if flag.shorthand.chars().count() > 1 && !self.capabilities.long_shorthand {
            return Err(SpecError::UnsupportedBinding(format!(
                "long shorthand only supported with an extended flag set: {}",
                flag.shorthand
            )));
        }
        if flag.longhand.is_empty() && !self.capabilities.shorthand_only {
            return Err(SpecError::UnsupportedBinding(format!(
                "shorthand-only only supported with an extended flag set: {}",
                flag.shorthand
            )));
        }
        if flag.nargs != 0 && !self.capabilities.nargs {
            return Err(SpecError::UnsupportedBinding(format!(
                "nargs only supported with an extended flag set: {}",
                flag.name()
            )));
        }
        if self.lookup(flag.name()).is_some() {
            return Err(SpecError::UnsupportedBinding(format!(
                "flag redefined: {}",
                flag.name()
            )));
        }
        self.flags.push(flag);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&FlagSpec> {
        self.flags.iter().find(|f| f.name() == name)
    }

    /// Find the flag addressed by a dashed token such as `--long`, `-s` or `-long`
    pub fn lookup_token(&self, token: &str) -> Option<&FlagSpec> {
        self.flags.iter().find(|f| f.matches(token))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlagSpec> {
        self.flags.iter()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(id: &str) -> FlagSpec {
        FlagSpec::parse(id, "").unwrap()
    }

    #[test]
    fn test_shorthand_only() {
        let f = parse("-s*=");
        assert_eq!(f.shorthand, "s");
        assert!(f.longhand.is_empty());
        assert!(f.repeatable);
        assert!(f.takes_value);
        assert!(!f.optional_arg);
    }

    #[test]
    fn test_both_slice_optarg() {
        let f = parse("-s, --long*?");
        assert_eq!(f.shorthand, "s");
        assert_eq!(f.longhand, "long");
        assert!(f.takes_value);
        assert!(f.repeatable);
        assert!(f.optional_arg);
        assert!(!f.name_as_shorthand);
    }

    #[test]
    fn test_nonposix() {
        let f = parse("-short?");
        assert_eq!(f.shorthand, "short");
        assert!(f.optional_arg);

        let f = parse("-short, -long*");
        assert_eq!(f.shorthand, "short");
        assert_eq!(f.longhand, "long");
        assert!(f.name_as_shorthand);
        assert_eq!(f.long_form().as_deref(), Some("-long"));

        let f = parse("-short, --long");
        assert!(!f.name_as_shorthand);
    }

    #[test]
    fn test_hidden_required_nargs() {
        let f = parse("--long=&!{2}");
        assert!(f.hidden);
        assert!(f.required);
        assert_eq!(f.nargs, 2);
        assert_eq!(f.name(), "long");
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(
            FlagSpec::parse("", ""),
            Err(SpecError::FlagSyntax { .. })
        ));
        assert!(matches!(
            FlagSpec::parse("--long with space", ""),
            Err(SpecError::FlagSyntax { .. })
        ));
        assert!(matches!(
            FlagSpec::parse("=", ""),
            Err(SpecError::FlagSyntax { .. })
        ));
    }

    #[test]
    fn test_format_round_trip() {
        for id in [
            "-s",
            "--long",
            "-s, --long=",
            "-s, --long?*",
            "--long=*!&{3}",
            "-short, -long*",
            "-v*",
        ] {
            let flag = parse(id);
            assert_eq!(flag.format(), id);
            assert_eq!(parse(&flag.format()), flag);
        }
    }

    #[test]
    fn test_format_reorders_modifiers() {
        insta::assert_snapshot!(parse("-s, --long*?").format(), @"-s, --long?*");
    }

    #[test]
    fn test_posix_binding_rejects_extensions() {
        let mut fs = FlagSet::new(Capabilities::posix());
        assert!(fs.add(parse("-s, --long")).is_ok());
        assert!(matches!(
            fs.add(parse("-short, --other")),
            Err(SpecError::UnsupportedBinding(_))
        ));
        assert!(matches!(fs.add(parse("-x")), Err(SpecError::UnsupportedBinding(_))));
        assert!(matches!(
            fs.add(parse("--many={2}")),
            Err(SpecError::UnsupportedBinding(_))
        ));
    }

    #[test]
    fn test_extended_binding() {
        let mut fs = FlagSet::new(Capabilities::extended());
        fs.add(parse("-short, -long*")).unwrap();
        fs.add(parse("-x")).unwrap();
        assert_eq!(fs.len(), 2);
        assert_eq!(fs.lookup_token("-long").map(|f| f.name()), Some("long"));
        assert_eq!(fs.lookup_token("-short").map(|f| f.name()), Some("long"));
        assert_eq!(fs.lookup("x").map(|f| f.shorthand.as_str()), Some("x"));
        assert!(fs.add(parse("--long")).is_err());
    }
}
