//! Deferred completion actions
//!
//! An [`Action`] is invoked against a [`Context`] (arguments consumed so far, the
//! partial value under the cursor, directory and a local environment) and yields
//! a [`Completion`]. Actions compose through the combinators in [`modify`].

pub mod modify;
mod tokenize;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command as Process, Stdio};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::envsubst::envsubst;
use crate::error::{SpecError, SpecResult};
use crate::macros::MacroRegistry;
use crate::slog_debug;

/// Per-request evaluation state
#[derive(Clone)]
pub struct Context {
    /// Positional arguments consumed so far
    pub args: Vec<String>,
    /// Partial value being completed
    pub value: String,
    /// Completed segments of a multi-part value
    pub parts: Vec<String>,
    pub dir: PathBuf,
    env: BTreeMap<String, String>,
    registry: Rc<MacroRegistry>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("args", &self.args)
            .field("value", &self.value)
            .field("parts", &self.parts)
            .field("dir", &self.dir)
            .field("env", &self.env)
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Rc::new(MacroRegistry::default()))
    }
}

impl Context {
    pub fn new(registry: Rc<MacroRegistry>) -> Self {
        Self {
            args: Vec::new(),
            value: String::new(),
            parts: Vec::new(),
            dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env: BTreeMap::new(),
            registry,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn registry(&self) -> &MacroRegistry {
        &self.registry
    }

    pub fn shared_registry(&self) -> Rc<MacroRegistry> {
        Rc::clone(&self.registry)
    }

    /// Set a variable in the context-local environment
    pub fn setenv(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    /// Local environment first, then the process environment
    pub fn getenv(&self, key: &str) -> Option<String> {
        self.env
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    }

    /// Drop the `C_*` variables exported for an enclosing evaluation
    pub fn clear_completion_env(&mut self) {
        self.env.retain(|key, _| !key.starts_with("C_"));
    }

    /// Variables set on this context (not the inherited process environment)
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn envsubst(&self, s: &str) -> SpecResult<String> {
        envsubst(s, |name| self.getenv(name))
    }

    /// Resolve `path` against the context directory, expanding `~`
    pub fn abs(&self, path: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path);
        let path = Path::new(expanded.as_ref());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        }
    }

    /// Process builder running in the context directory with the local environment applied
    pub fn command(&self, program: &str, args: &[String]) -> Process {
        let mut cmd = Process::new(program);
        cmd.args(args).current_dir(&self.dir).envs(&self.env);
        cmd
    }
}

/// A single completion candidate
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Text inserted on the command line
    pub value: String,
    /// Text shown in the candidate list
    #[serde(default)]
    pub display: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub style: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
}

impl Suggestion {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            display: value.clone(),
            value,
            ..Default::default()
        }
    }

    pub fn described(value: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::new(value)
        }
    }

    pub fn styled(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

/// Result of invoking an action
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    /// Characters after which no space is inserted (`*` = all)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nospace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub usage: String,
}

impl Completion {
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            suggestions: values.into_iter().map(Suggestion::new).collect(),
            ..Default::default()
        }
    }

    pub fn from_suggestions(suggestions: Vec<Suggestion>) -> Self {
        Self {
            suggestions,
            ..Default::default()
        }
    }

    pub fn message(msg: impl Into<String>) -> Self {
        Self {
            messages: vec![msg.into()],
            ..Default::default()
        }
    }

    /// Merge results in order: first occurrence of a value wins, messages are
    /// appended, no-space characters are unioned and the last usage is kept.
    pub fn merge<I>(results: I) -> Completion
    where
        I: IntoIterator<Item = Completion>,
    {
        let mut merged = Completion::default();
        for result in results {
            for suggestion in result.suggestions {
                if !merged.suggestions.iter().any(|s| s.value == suggestion.value) {
                    merged.suggestions.push(suggestion);
                }
            }
            merged.messages.extend(result.messages);
            merged.add_nospace(&result.nospace);
            if !result.usage.is_empty() {
                merged.usage = result.usage;
            }
        }
        merged
    }

    pub fn values(&self) -> Vec<&str> {
        self.suggestions.iter().map(|s| s.value.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty() && self.messages.is_empty()
    }

    pub fn add_nospace(&mut self, chars: &str) {
        if self.nospace == "*" {
            return;
        }
        if chars.contains('*') {
            self.nospace = "*".to_string();
            return;
        }
        for c in chars.chars() {
            if !self.nospace.contains(c) {
                self.nospace.push(c);
            }
        }
    }

    /// Whether a space should be withheld after inserting `value`
    pub fn suppresses_space(&self, value: &str) -> bool {
        if self.nospace == "*" {
            return true;
        }
        value
            .chars()
            .last()
            .map(|c| self.nospace.contains(c))
            .unwrap_or(false)
    }

    /// Keep only candidates starting with `prefix`
    pub fn filter_prefix(mut self, prefix: &str) -> Self {
        self.suggestions.retain(|s| s.value.starts_with(prefix));
        self
    }

    pub(crate) fn prefix_values(&mut self, prefix: &str) {
        if prefix.is_empty() {
            return;
        }
        for s in &mut self.suggestions {
            s.value = format!("{}{}", prefix, s.value);
        }
    }

    pub fn to_json(&self) -> SpecResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &[u8]) -> SpecResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Deferred computation producing a [`Completion`]
#[derive(Clone)]
pub struct Action(Rc<dyn Fn(&Context) -> Completion>);

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Action(..)")
    }
}

impl Action {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&Context) -> Completion + 'static,
    {
        Action(Rc::new(f))
    }

    pub fn invoke(&self, c: &Context) -> Completion {
        (self.0)(c)
    }
}

impl From<Completion> for Action {
    fn from(completion: Completion) -> Self {
        Action::callback(move |_| completion.clone())
    }
}

pub fn values<I, S>(values: I) -> Action
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Completion::from_values(values).into()
}

pub fn suggestions(suggestions: Vec<Suggestion>) -> Action {
    Completion::from_suggestions(suggestions).into()
}

pub fn message(msg: impl Into<String>) -> Action {
    Completion::message(msg).into()
}

/// Invoke each action in order and merge the results
pub fn batch(actions: Vec<Action>) -> Action {
    Action::callback(move |c| Completion::merge(actions.iter().map(|a| a.invoke(c))))
}

/// Complete one `divider`-separated segment at a time.
///
/// `f` sees the already completed segments in `parts` and only the current
/// segment as `value`; its candidates are prefixed with the completed text.
pub fn multi_parts<F>(divider: &str, f: F) -> Action
where
    F: Fn(&Context) -> Completion + 'static,
{
    let divider = divider.to_string();
    Action::callback(move |c| {
        let (prefix, current) = split_parts(&c.value, &divider);

        let mut inner = c.clone();
        inner.parts = if divider.is_empty() {
            prefix.chars().map(String::from).collect()
        } else if prefix.is_empty() {
            Vec::new()
        } else {
            prefix[..prefix.len() - divider.len()]
                .split(divider.as_str())
                .map(String::from)
                .collect()
        };
        inner.value = current.to_string();

        let mut result = f(&inner);
        result.prefix_values(prefix);
        if let Some(last) = divider.chars().last() {
            result.add_nospace(&last.to_string());
        }
        result
    })
}

fn split_parts<'a>(value: &'a str, divider: &str) -> (&'a str, &'a str) {
    if divider.is_empty() {
        return (value, "");
    }
    match value.rfind(divider) {
        Some(idx) => value.split_at(idx + divider.len()),
        None => ("", value),
    }
}

/// Run `program` and convert its stdout with `f`; failures become messages
pub fn exec_command<F>(program: &str, args: Vec<String>, f: F) -> Action
where
    F: Fn(&[u8]) -> Completion + 'static,
{
    let program = program.to_string();
    Action::callback(move |c| {
        slog_debug!(
            "ACTION",
            "exec",
            serde_json::json!({"program": program, "args": args, "dir": c.dir})
        );
        let output = c
            .command(&program, &args)
            .stdin(Stdio::null())
            .output();
        match output {
            Err(e) => Completion::message(SpecError::process(&program, e).to_string()),
            Ok(out) if !out.status.success() => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                match stderr.lines().find(|l| !l.trim().is_empty()) {
                    Some(line) => Completion::message(line.trim().to_string()),
                    None => Completion::message(
                        SpecError::process(&program, out.status).to_string(),
                    ),
                }
            }
            Ok(out) => f(&out.stdout),
        }
    })
}

/// Interpret JSON exported by another process
pub fn import(output: &[u8]) -> Completion {
    Completion::from_json(output).unwrap_or_else(|e| Completion::message(e.to_string()))
}

/// Files and directories below the typed path, optionally restricted to file suffixes
pub fn files(suffixes: Vec<String>) -> Action {
    Action::callback(move |c| list_path(c, Some(&suffixes)))
}

pub fn directories() -> Action {
    Action::callback(|c| list_path(c, None))
}

fn list_path(c: &Context, suffixes: Option<&[String]>) -> Completion {
    let (typed_dir, base) = match c.value.rfind('/') {
        Some(idx) => c.value.split_at(idx + 1),
        None => ("", c.value.as_str()),
    };
    let search = if typed_dir.is_empty() {
        c.dir.clone()
    } else {
        c.abs(typed_dir)
    };

    let entries = match fs::read_dir(&search) {
        Ok(entries) => entries,
        Err(e) => return Completion::message(format!("{}: {}", search.display(), e)),
    };

    let tag = if suffixes.is_some() { "files" } else { "directories" };
    let mut suggestions = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') && !base.starts_with('.') {
            continue;
        }
        // follow symlinks so linked directories stay traversable
        let is_dir = fs::metadata(entry.path()).map(|m| m.is_dir()).unwrap_or(false);
        if is_dir {
            suggestions.push(Suggestion {
                display: format!("{}/", name),
                ..Suggestion::new(format!("{}{}/", typed_dir, name))
            }.tagged(tag));
        } else if let Some(suffixes) = suffixes {
            if suffixes.is_empty() || suffixes.iter().any(|s| name.ends_with(s.as_str())) {
                suggestions.push(Suggestion {
                    display: name.clone(),
                    ..Suggestion::new(format!("{}{}", typed_dir, name))
                }.tagged(tag));
            }
        }
    }
    suggestions.sort_by(|a, b| a.value.cmp(&b.value));

    let mut completion = Completion::from_suggestions(suggestions);
    completion.add_nospace("/");
    completion
}

/// Executables found in `dirs`, or in `PATH` when empty
pub fn executables(dirs: Vec<String>) -> Action {
    Action::callback(move |c| {
        let search: Vec<PathBuf> = if dirs.is_empty() {
            c.getenv("PATH")
                .map(|p| std::env::split_paths(&p).collect())
                .unwrap_or_default()
        } else {
            dirs.iter().map(|d| c.abs(d)).collect()
        };

        let mut suggestions: Vec<Suggestion> = Vec::new();
        for dir in search {
            let Ok(entries) = fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if suggestions.iter().any(|s| s.value == name) || !is_executable(&entry.path()) {
                    continue;
                }
                suggestions.push(
                    Suggestion::described(name, dir.display().to_string()).tagged("executables"),
                );
            }
        }
        suggestions.sort_by(|a, b| a.value.cmp(&b.value));
        Completion::from_suggestions(suggestions)
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Parse `value[\tdescription[\tstyle]]`
pub fn parse_value(s: &str) -> Suggestion {
    let mut fields = s.splitn(3, '\t');
    let value = fields.next().unwrap_or_default();
    let description = fields.next().unwrap_or_default();
    let style = fields.next().unwrap_or_default();
    Suggestion::described(value, description).styled(style)
}
