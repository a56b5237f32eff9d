//! Combinators layering behaviour on top of an existing [`Action`]

use std::path::PathBuf;

use regex::Regex;

use super::tokenize::{current_pipeline, tokenize, TokenKind};
use super::{multi_parts, Action, Completion, Context, Suggestion};

impl Action {
    /// Invoke with the working directory changed to `dir`
    pub fn chdir(self, dir: String) -> Action {
        self.chdir_with(move |c| Ok(c.abs(&dir)))
    }

    /// Invoke with the working directory resolved by `f`
    pub fn chdir_with<F>(self, f: F) -> Action
    where
        F: Fn(&Context) -> Result<PathBuf, String> + 'static,
    {
        Action::callback(move |c| {
            let dir = match f(c) {
                Ok(dir) => dir,
                Err(e) => return Completion::message(e),
            };
            match std::fs::metadata(&dir) {
                Err(_) => Completion::message(format!("{} does not exist", dir.display())),
                Ok(m) if !m.is_dir() => {
                    Completion::message(format!("{} is not a directory", dir.display()))
                }
                Ok(_) => {
                    let mut inner = c.clone();
                    inner.dir = dir;
                    self.invoke(&inner)
                }
            }
        })
    }

    /// Drop candidates whose value is in `values`
    pub fn filter(self, values: Vec<String>) -> Action {
        self.map(move |mut result, _| {
            result.suggestions.retain(|s| !values.contains(&s.value));
            result
        })
    }

    /// Keep only candidates whose value is in `values`
    pub fn retain(self, values: Vec<String>) -> Action {
        self.map(move |mut result, _| {
            result.suggestions.retain(|s| values.contains(&s.value));
            result
        })
    }

    /// Drop candidates already consumed as positional arguments
    pub fn filter_args(self) -> Action {
        self.map(|mut result, c| {
            result.suggestions.retain(|s| !c.args.contains(&s.value));
            result
        })
    }

    /// Drop candidates already typed as earlier segments
    pub fn filter_parts(self) -> Action {
        self.map(|mut result, c| {
            result.suggestions.retain(|s| !c.parts.contains(&s.value));
            result
        })
    }

    /// Complete the last entry of a `divider`-separated list
    pub fn list(self, divider: &str) -> Action {
        multi_parts(divider, move |c| {
            let mut inner = c.clone();
            inner.parts.clear();
            self.invoke(&inner)
        })
        .no_space("*")
    }

    /// Like [`Action::list`] but skipping entries already in the list
    pub fn unique_list(self, divider: &str) -> Action {
        let action = self.filter_parts();
        multi_parts(divider, move |c| action.invoke(c)).no_space("*")
    }

    /// Split candidate values on `dividers` and complete one segment at a time
    pub fn multi_parts(self, dividers: Vec<String>) -> Action {
        self.map(move |result, c| to_multi_parts(result, &c.value, &dividers))
    }

    /// Withhold the trailing space after candidates ending in one of `chars` (empty = all)
    pub fn no_space(self, chars: &str) -> Action {
        let chars = if chars.is_empty() { "*".to_string() } else { chars.to_string() };
        self.map(move |mut result, _| {
            result.add_nospace(&chars);
            result
        })
    }

    /// Prepend `prefix` to every candidate, matching the typed text beyond it
    pub fn prefix(self, prefix: String) -> Action {
        Action::callback(move |c| {
            let mut inner = c.clone();
            if let Some(rest) = c.value.strip_prefix(prefix.as_str()) {
                inner.value = rest.to_string();
            } else if prefix.starts_with(c.value.as_str()) {
                inner.value = String::new();
            } else {
                return Completion::default();
            }
            let mut result = self.invoke(&inner);
            result.prefix_values(&prefix);
            result
        })
    }

    pub fn suffix(self, suffix: String) -> Action {
        self.map(move |mut result, _| {
            for s in &mut result.suggestions {
                s.value.push_str(&suffix);
            }
            result
        })
    }

    /// Drop the first `n` positional arguments before invoking
    pub fn shift(self, n: usize) -> Action {
        Action::callback(move |c| {
            let mut inner = c.clone();
            inner.args = c.args.iter().skip(n).cloned().collect();
            self.invoke(&inner)
        })
    }

    /// Complete the last whitespace separated word of the value
    pub fn split(self) -> Action {
        self.split_words(false)
    }

    /// Like [`Action::split`] but only considering the current pipeline segment
    pub fn split_p(self) -> Action {
        self.split_words(true)
    }

    fn split_words(self, pipelines: bool) -> Action {
        Action::callback(move |c| {
            let tokens = tokenize(&c.value);
            let tokens = if pipelines {
                current_pipeline(&tokens)
            } else {
                &tokens[..]
            };
            let words: Vec<_> = tokens.iter().filter(|t| t.kind == TokenKind::Word).collect();
            let Some((current, previous)) = words.split_last() else {
                return Completion::default();
            };

            let mut inner = c.clone();
            inner.args = previous.iter().map(|t| t.text.clone()).collect();
            inner.parts.clear();
            inner.value = current.text.clone();
            let prefix = &c.value[..current.start];

            let mut result = self.invoke(&inner);
            for s in &mut result.suggestions {
                let quoted = match current.quote {
                    Some(q) => format!("{}{}{}", q, s.value, q),
                    None => shlex::try_quote(&s.value)
                        .map(|q| q.into_owned())
                        .unwrap_or_else(|_| s.value.clone()),
                };
                let space = if result.nospace == "*"
                    || s.value.chars().last().map(|l| result.nospace.contains(l)).unwrap_or(false)
                {
                    ""
                } else {
                    " "
                };
                s.value = format!("{}{}{}", prefix, quoted, space);
            }
            result.nospace = "*".to_string();
            result
        })
    }

    pub fn style(self, style: String) -> Action {
        self.map(move |mut result, _| {
            for s in &mut result.suggestions {
                s.style = style.clone();
            }
            result
        })
    }

    pub fn tag(self, tag: String) -> Action {
        self.map(move |mut result, _| {
            for s in &mut result.suggestions {
                s.tag = tag.clone();
            }
            result
        })
    }

    /// Drop the messages matching `pattern` (all of them when empty); the
    /// candidates are kept.
    pub fn suppress(self, pattern: String) -> Action {
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => return super::message(e.to_string()),
        };
        self.map(move |mut result, _| {
            result.messages.retain(|m| !re.is_match(m));
            result
        })
    }

    pub fn usage(self, usage: String) -> Action {
        self.map(move |mut result, _| {
            result.usage = usage.clone();
            result
        })
    }

    /// Export `C_PART<i>` and `C_VALUE` before invoking
    pub fn update_env(self) -> Action {
        Action::callback(move |c| {
            let mut inner = c.clone();
            export_parts(&mut inner);
            self.invoke(&inner)
        })
    }

    fn map<F>(self, f: F) -> Action
    where
        F: Fn(Completion, &Context) -> Completion + 'static,
    {
        Action::callback(move |c| f(self.invoke(c), c))
    }
}

/// Set `C_PART<i>` and `C_VALUE` from the context's parts and value
pub fn export_parts(c: &mut Context) {
    for index in 0..c.parts.len() {
        let part = c.parts[index].clone();
        c.setenv(format!("C_PART{}", index), part);
    }
    let value = c.value.clone();
    c.setenv("C_VALUE", value);
}

/// Reduce full candidate values to the segment following the typed value
fn to_multi_parts(result: Completion, value: &str, dividers: &[String]) -> Completion {
    let prefix = typed_prefix(value, dividers);

    let mut out = Completion {
        suggestions: Vec::new(),
        messages: result.messages,
        nospace: result.nospace,
        usage: result.usage,
    };
    for s in result.suggestions {
        let Some(rest) = s.value.strip_prefix(prefix) else {
            continue;
        };
        let candidate = match next_divider(rest, dividers) {
            Some(end) => {
                let segment = &rest[..end];
                if let Some(last) = segment.chars().last() {
                    out.add_nospace(&last.to_string());
                }
                Suggestion {
                    value: format!("{}{}", prefix, segment),
                    display: segment.to_string(),
                    style: s.style,
                    tag: s.tag,
                    description: String::new(),
                }
            }
            None => Suggestion {
                display: rest.to_string(),
                ..s
            },
        };
        if !out.suggestions.iter().any(|o| o.value == candidate.value) {
            out.suggestions.push(candidate);
        }
    }
    out
}

/// Text up to and including the last divider in `value`
fn typed_prefix<'a>(value: &'a str, dividers: &[String]) -> &'a str {
    if dividers.is_empty() {
        return match value.char_indices().last() {
            Some((idx, c)) => &value[..idx + c.len_utf8()],
            None => "",
        };
    }
    let end = dividers
        .iter()
        .filter(|d| !d.is_empty())
        .filter_map(|d| value.rfind(d.as_str()).map(|idx| idx + d.len()))
        .max()
        .unwrap_or(0);
    &value[..end]
}

/// End offset (divider included) of the first segment in `rest`, if another segment follows
fn next_divider(rest: &str, dividers: &[String]) -> Option<usize> {
    if dividers.is_empty() {
        let first = rest.chars().next()?;
        return (rest.len() > first.len_utf8()).then_some(first.len_utf8());
    }
    dividers
        .iter()
        .filter(|d| !d.is_empty())
        .filter_map(|d| rest.find(d.as_str()).map(|idx| idx + d.len()))
        .filter(|&end| end < rest.len())
        .min()
}
