//! Braced environment substitution for expression text
//!
//! Only `${NAME}`, `${NAME:-default}` and `${NAME-default}` are expanded. A bare
//! `$name` is left alone since that is macro syntax.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{SpecError, SpecResult};

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\$\{(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?:(?P<op>:?-)(?P<default>[^}]*))?\}")
            .unwrap();
}

/// Expand `${...}` placeholders using `lookup`; unset variables expand to ""
pub fn envsubst<F>(input: &str, lookup: F) -> SpecResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(input.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(input) {
        let Some(full) = caps.get(0) else { continue };
        let literal = &input[last..full.start()];
        if literal.contains("${") {
            return Err(SpecError::Envsubst(input.to_string()));
        }
        result.push_str(literal);

        let value = lookup(&caps["name"]);
        let replacement = match caps.name("op").map(|m| m.as_str()) {
            // `:-` also falls back on empty values
            Some(":-") => value.filter(|v| !v.is_empty()),
            Some(_) => value,
            None => Some(value.unwrap_or_default()),
        }
        .unwrap_or_else(|| caps.name("default").map(|m| m.as_str()).unwrap_or("").to_string());

        result.push_str(&replacement);
        last = full.end();
    }

    let rest = &input[last..];
    if rest.contains("${") {
        return Err(SpecError::Envsubst(input.to_string()));
    }
    result.push_str(rest);
    Ok(result)
}
