//! Modifier chain
//!
//! The closed set of `$name(arg)` transformers applied to an existing action,
//! either as a ` ||| ` suffix of one expression or as a bare element wrapping the
//! whole expression list.

use std::path::PathBuf;
use std::str::FromStr;

use crate::action::modify::export_parts;
use crate::action::{Action, Completion, Context};
use crate::error::{SpecError, SpecResult};
use crate::macros::{decode_variadic, parse_call, MacroArg};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Modifier {
    Chdir,
    Filter,
    FilterArgs,
    List,
    MultiParts,
    NoSpace,
    Prefix,
    Retain,
    Shift,
    Split,
    SplitP,
    Suffix,
    Suppress,
    Style,
    Tag,
    UniqueList,
    Usage,
}

impl Modifier {
    pub const ALL: [Modifier; 17] = [
        Modifier::Chdir,
        Modifier::Filter,
        Modifier::FilterArgs,
        Modifier::List,
        Modifier::MultiParts,
        Modifier::NoSpace,
        Modifier::Prefix,
        Modifier::Retain,
        Modifier::Shift,
        Modifier::Split,
        Modifier::SplitP,
        Modifier::Suffix,
        Modifier::Suppress,
        Modifier::Style,
        Modifier::Tag,
        Modifier::UniqueList,
        Modifier::Usage,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Modifier::Chdir => "chdir",
            Modifier::Filter => "filter",
            Modifier::FilterArgs => "filterargs",
            Modifier::List => "list",
            Modifier::MultiParts => "multiparts",
            Modifier::NoSpace => "nospace",
            Modifier::Prefix => "prefix",
            Modifier::Retain => "retain",
            Modifier::Shift => "shift",
            Modifier::Split => "split",
            Modifier::SplitP => "splitp",
            Modifier::Suffix => "suffix",
            Modifier::Suppress => "suppress",
            Modifier::Style => "style",
            Modifier::Tag => "tag",
            Modifier::UniqueList => "uniquelist",
            Modifier::Usage => "usage",
        }
    }

    /// Modifier named by the head of a `$name(arg)` call
    pub fn from_call(call: &str) -> Option<Modifier> {
        let head = call.split('(').next()?;
        head.strip_prefix('$')?.parse().ok()
    }

    /// Layer the modifier with its raw argument text on top of `action`
    pub fn apply(self, action: Action, arg: &str) -> SpecResult<Action> {
        Ok(match self {
            Modifier::Chdir => chdir(action, arg)?,
            Modifier::Filter => action.filter(decode_variadic(arg)?),
            Modifier::FilterArgs => action.filter_args(),
            Modifier::List => action.list(arg),
            Modifier::MultiParts => action.multi_parts(decode_variadic(arg)?),
            Modifier::NoSpace => action.no_space(arg),
            Modifier::Prefix => action.prefix(arg.to_string()),
            Modifier::Retain => action.retain(decode_variadic(arg)?),
            Modifier::Shift => action.shift(usize::decode(arg)?),
            Modifier::Split => action.split(),
            Modifier::SplitP => action.split_p(),
            Modifier::Suffix => action.suffix(arg.to_string()),
            Modifier::Suppress => action.suppress(arg.to_string()),
            Modifier::Style => action.style(arg.to_string()),
            Modifier::Tag => action.tag(arg.to_string()),
            Modifier::UniqueList => action.unique_list(arg),
            Modifier::Usage => action.usage(arg.to_string()),
        })
    }
}

impl FromStr for Modifier {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Modifier::ALL
            .iter()
            .copied()
            .find(|m| m.name() == s)
            .ok_or_else(|| SpecError::UnknownMacro(format!("${}", s)))
    }
}

/// Wrap `action` with the modifier `call`; the call text is environment
/// substituted at invocation, after `C_PART<i>` and `C_VALUE` are exported.
pub fn modify(action: Action, call: &str) -> Action {
    let inner = action.update_env();
    let call = call.to_string();
    Action::callback(move |c| {
        let mut env = c.clone();
        export_parts(&mut env);
        match resolve(inner.clone(), &call, &env) {
            Ok(action) => action.invoke(c),
            Err(e) => Completion::message(e.to_string()),
        }
    })
}

fn resolve(action: Action, call: &str, c: &Context) -> SpecResult<Action> {
    let call = c.envsubst(call)?;
    let modifier = Modifier::from_call(&call).ok_or_else(|| SpecError::UnknownMacro(call.clone()))?;
    let (_, arg) = parse_call(&call)?;
    modifier.apply(action, arg)
}

/// Directory lookups usable as `$chdir($name)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Traversal {
    GitDir,
    GitWorkTree,
    /// N-th parent when given a single number, otherwise the closest ancestor
    /// containing one of the names
    Parent(Vec<String>),
    TempDir,
    UserCacheDir,
    UserConfigDir,
    UserHomeDir,
    XdgCacheHome,
    XdgConfigHome,
}

impl Traversal {
    pub fn parse(call: &str) -> SpecResult<Traversal> {
        let (name, arg) = parse_call(call)?;
        Ok(match name {
            "gitdir" => Traversal::GitDir,
            "gitworktree" => Traversal::GitWorkTree,
            "parent" => Traversal::Parent(decode_variadic(arg)?),
            "tempdir" => Traversal::TempDir,
            "usercachedir" => Traversal::UserCacheDir,
            "userconfigdir" => Traversal::UserConfigDir,
            "userhomedir" => Traversal::UserHomeDir,
            "xdgcachehome" => Traversal::XdgCacheHome,
            "xdgconfighome" => Traversal::XdgConfigHome,
            _ => return Err(SpecError::UnknownMacro(call.to_string())),
        })
    }

    pub fn resolve(&self, c: &Context) -> Result<PathBuf, String> {
        match self {
            Traversal::GitWorkTree => ancestor_containing(c, &[".git".to_string()]),
            Traversal::GitDir => match c.getenv("GIT_DIR").filter(|d| !d.is_empty()) {
                Some(dir) => Ok(c.abs(&dir)),
                None => ancestor_containing(c, &[".git".to_string()]).map(|d| d.join(".git")),
            },
            Traversal::Parent(names) => {
                let levels = match names.as_slice() {
                    [] => Some(1),
                    [single] => single.parse::<usize>().ok(),
                    _ => None,
                };
                match levels {
                    Some(n) => c
                        .dir
                        .ancestors()
                        .nth(n)
                        .map(|p| p.to_path_buf())
                        .ok_or_else(|| format!("no parent directory {} levels above {}", n, c.dir.display())),
                    None => ancestor_containing(c, names),
                }
            }
            Traversal::TempDir => Ok(std::env::temp_dir()),
            Traversal::UserCacheDir => dirs::cache_dir().ok_or_else(|| "unknown user cache dir".to_string()),
            Traversal::UserConfigDir => dirs::config_dir().ok_or_else(|| "unknown user config dir".to_string()),
            Traversal::UserHomeDir => dirs::home_dir().ok_or_else(|| "unknown user home dir".to_string()),
            Traversal::XdgCacheHome => xdg_dir(c, "XDG_CACHE_HOME", ".cache"),
            Traversal::XdgConfigHome => xdg_dir(c, "XDG_CONFIG_HOME", ".config"),
        }
    }
}

fn ancestor_containing(c: &Context, names: &[String]) -> Result<PathBuf, String> {
    c.dir
        .ancestors()
        .find(|dir| names.iter().any(|name| dir.join(name).exists()))
        .map(|dir| dir.to_path_buf())
        .ok_or_else(|| format!("no parent directory containing any of {:?}", names))
}

fn xdg_dir(c: &Context, var: &str, fallback: &str) -> Result<PathBuf, String> {
    match c.getenv(var).filter(|v| !v.is_empty()) {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => dirs::home_dir()
            .map(|home| home.join(fallback))
            .ok_or_else(|| "unknown user home dir".to_string()),
    }
}

/// Resolve a `$chdir` argument (literal path or traversal macro) against `c`
pub fn resolve_chdir(arg: &str, c: &Context) -> SpecResult<PathBuf> {
    if !arg.starts_with('$') {
        return Ok(c.abs(arg));
    }
    Traversal::parse(arg)?
        .resolve(c)
        .map_err(SpecError::Usage)
}

fn chdir(action: Action, arg: &str) -> SpecResult<Action> {
    if !arg.starts_with('$') {
        return Ok(action.chdir(arg.to_string()));
    }
    let traversal = Traversal::parse(arg)?;
    Ok(action.chdir_with(move |c| traversal.resolve(c)))
}
