//! Value expressions
//!
//! An [`ExpressionList`] is the ordered set of expressions bound to one
//! completion slot. Each element is a literal (`value[\tdescription[\tstyle]]`),
//! a macro call (`$name(arg)`) or a bare modifier (`$filter(...)`) wrapping the
//! whole list, optionally followed by ` ||| `-separated modifier suffixes.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::action::{batch, exec_command, import, message, parse_value, suggestions, Action, Completion, Context};
use crate::error::SpecResult;
use crate::macros::{parse_call, MacroRegistry, CUSTOM_PREFIX};
use crate::modifier::{modify, Modifier};
use crate::slog_debug;

/// Separator between an expression and its modifier suffixes
pub const SEPARATOR: &str = " ||| ";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Vec<String>")]
pub struct ExpressionList(pub Vec<String>);

/// A single expression or a sequence of them; numbers and booleans are taken
/// as their literal text
impl TryFrom<Value> for ExpressionList {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(ExpressionList::default()),
            Value::Sequence(seq) => seq
                .into_iter()
                .map(scalar)
                .collect::<Result<Vec<_>, _>>()
                .map(ExpressionList),
            other => Ok(ExpressionList(vec![scalar(other)?])),
        }
    }
}

fn scalar(value: Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Tagged(tagged) => scalar(tagged.value),
        other => Err(format!("expected a string expression, got {:?}", other)),
    }
}

impl From<ExpressionList> for Vec<String> {
    fn from(list: ExpressionList) -> Self {
        list.0
    }
}

impl ExpressionList {
    pub fn new<I, S>(elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExpressionList(elements.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// Action evaluating the list; macros resolve through the context's registry
    pub fn to_action(&self) -> Action {
        let elements = self.0.clone();
        Action::callback(move |c| evaluate(&elements, c))
    }

    /// Whether any element calls a macro that consumes raw arguments
    pub fn disables_flag_parsing(&self, registry: &MacroRegistry) -> bool {
        self.0.iter().any(|element| {
            let head = element.split(SEPARATOR).next().unwrap_or_default();
            if !head.starts_with('$') || Modifier::from_call(head).is_some() {
                return false;
            }
            let call = local_call(head, registry.program());
            registry
                .lookup(&call)
                .map(|m| m.disables_flag_parsing())
                .unwrap_or(false)
        })
    }
}

fn evaluate(elements: &[String], c: &Context) -> Completion {
    let mut c = c.clone();
    for index in 0..c.args.len() {
        let arg = c.args[index].clone();
        c.setenv(format!("C_ARG{}", index), arg);
    }
    let value = c.value.clone();
    c.setenv("C_VALUE", value.clone());
    c.setenv("C_CALLBACK", value);

    let mut actions = Vec::new();
    let mut literals = Vec::new();
    let mut wrappers: Vec<String> = Vec::new();

    for element in elements {
        let substituted = match c.envsubst(element) {
            Ok(s) => s,
            Err(e) => {
                actions.push(message(format!("{}: {:?}", e, element)));
                continue;
            }
        };

        let mut split = substituted.split(SEPARATOR);
        let head = split.next().unwrap_or_default();
        let suffixes: Vec<&str> = split.collect();

        if head.starts_with('$') && Modifier::from_call(head).is_some() {
            wrappers.push(head.to_string());
            wrappers.extend(suffixes.iter().map(|s| s.to_string()));
        } else if head.starts_with('$') {
            actions.push(with_suffixes(macro_action(head), &suffixes));
        } else if suffixes.is_empty() {
            literals.push(parse_value(head));
        } else {
            actions.push(with_suffixes(suggestions(vec![parse_value(head)]), &suffixes));
        }
    }

    if !literals.is_empty() {
        actions.push(suggestions(literals));
    }
    let action = wrappers
        .iter()
        .fold(batch(actions), |action, call| modify(action, call));
    action.invoke(&c)
}

fn with_suffixes(action: Action, suffixes: &[&str]) -> Action {
    suffixes
        .iter()
        .fold(action, |action, call| modify(action, call))
}

/// `$<program>.name` refers to the custom macro `$_.name`
fn local_call(call: &str, program: &str) -> String {
    if program.is_empty() {
        return call.to_string();
    }
    match call.strip_prefix(&format!("${}.", program)) {
        Some(rest) => format!("${}{}", CUSTOM_PREFIX, rest),
        None => call.to_string(),
    }
}

/// Action for a single macro call.
///
/// `$other.name(arg)` is delegated to the program `other`, which is expected
/// to answer `other _carapace macro name(arg) <args>... <value>` with exported
/// JSON.
pub fn macro_action(call: &str) -> Action {
    let call = call.to_string();
    Action::callback(move |c| match resolve_macro(&call, c) {
        Ok(action) => action.invoke(c),
        Err(e) => {
            slog_debug!("MACRO", "resolve_failed", &e.to_string(), Some(serde_json::json!({"call": call})));
            Completion::message(e.to_string())
        }
    })
}

fn resolve_macro(call: &str, c: &Context) -> SpecResult<Action> {
    let registry = c.registry();
    let program = registry.program();
    let (name, _) = parse_call(call)?;

    if name.starts_with('_') && !name.starts_with(CUSTOM_PREFIX) {
        return Ok(message(format!(
            r#""$_" deprecated: replace {:?} with {:?}"#,
            format!("${}", name),
            format!("${}.{}", program, &name[1..])
        )));
    }

    let own = format!("${}.", program);
    if !name.starts_with(CUSTOM_PREFIX) && name.contains('.') && (program.is_empty() || !call.starts_with(&own)) {
        if let Some((other, rest)) = call[1..].split_once('.') {
            let mut args = vec!["_carapace".to_string(), "macro".to_string(), rest.to_string()];
            args.extend(c.args.iter().cloned());
            args.push(c.value.clone());
            return Ok(exec_command(other, args, import));
        }
    }

    let call = local_call(call, program);
    registry.lookup(&call)?.parse(&call)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::values;
    use crate::macros::Macro;
    use std::rc::Rc;

    fn context() -> Context {
        let mut registry = MacroRegistry::with_core("compspec");
        registry.add_custom("hosts", Macro::none(|| values(["alpha", "beta"])));
        registry.add_custom(
            "raw",
            Macro::single(|s: String| values([s])).no_flag_parsing(),
        );
        Context::new(Rc::new(registry))
    }

    fn eval(elements: &[&str], c: &Context) -> Completion {
        ExpressionList::new(elements.iter().copied()).to_action().invoke(c)
    }

    #[test]
    fn test_literals_keep_order() {
        let result = eval(&["one", "two", "three"], &context());
        assert_eq!(result.values(), vec!["one", "two", "three"]);
        assert!(result.suggestions.iter().all(|s| s.style.is_empty()));

        let result = eval(&["a\tfirst\tblue", "b\tsecond"], &context());
        assert_eq!(result.suggestions[0].description, "first");
        assert_eq!(result.suggestions[0].style, "blue");
        assert_eq!(result.suggestions[1].description, "second");
        assert_eq!(result.suggestions[1].style, "");
    }

    #[test]
    fn test_batch_modifier_wraps_all_elements() {
        let result = eval(&["one", "two", "three", "$filter([one, three])"], &context());
        assert_eq!(result.values(), vec!["two"]);

        let result = eval(&["$_.hosts", "gamma", "$retain(beta, gamma) ||| $style(red)"], &context());
        assert_eq!(result.values(), vec!["beta", "gamma"]);
        assert!(result.suggestions.iter().all(|s| s.style == "red"));
    }

    #[test]
    fn test_suffix_applies_to_element_only() {
        let result = eval(&["a ||| $style(blue)", "b", "$_.hosts ||| $tag(hosts)"], &context());
        assert_eq!(result.values(), vec!["a", "alpha", "beta", "b"]);
        assert_eq!(result.suggestions[0].style, "blue");
        assert_eq!(result.suggestions[1].tag, "hosts");
        assert_eq!(result.suggestions[3].style, "");
        assert_eq!(result.suggestions[3].tag, "");
    }

    #[test]
    fn test_errors_do_not_blank_siblings() {
        let result = eval(&["$nope", "x", "${broken"], &context());
        assert_eq!(result.values(), vec!["x"]);
        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[0], r#"unknown macro: "$nope""#);
        assert!(result.messages[1].starts_with("bad substitution"));
        assert!(result.messages[1].ends_with(r#": "${broken""#));
    }

    #[test]
    fn test_program_namespace() {
        let c = context();
        assert_eq!(eval(&["$compspec.hosts"], &c).values(), vec!["alpha", "beta"]);

        let result = eval(&["$_hosts"], &c);
        insta::assert_snapshot!(
            result.messages[0].as_str(),
            @r#""$_" deprecated: replace "$_hosts" with "$compspec.hosts""#
        );

        let result = eval(&["$compspec-missing-program-for-tests.hosts"], &c);
        assert!(result.values().is_empty());
        assert!(result.messages[0].starts_with("failed to execute"));
    }

    #[test]
    fn test_context_variables() {
        let c = context().with_args(["first"]).with_value("pa");
        let result = eval(&["${C_ARG0}-${C_VALUE}", "${C_CALLBACK}", "${C_ARG1:-none}"], &c);
        assert_eq!(result.values(), vec!["first-pa", "pa", "none"]);
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let c = context().with_value("x");
        let action = ExpressionList::new(["one", "$_.hosts ||| $prefix(h:)", "$uniquelist(,)"]).to_action();
        assert_eq!(action.invoke(&c), action.invoke(&c));
    }

    #[test]
    fn test_disables_flag_parsing() {
        let c = context();
        let registry = c.registry();
        assert!(ExpressionList::new(["$spec(nested.yaml)"]).disables_flag_parsing(registry));
        assert!(ExpressionList::new(["one", "$compspec.raw(x) ||| $shift(1)"]).disables_flag_parsing(registry));
        assert!(!ExpressionList::new(["$(echo a)", "$files", "$_.hosts"]).disables_flag_parsing(registry));
        assert!(!ExpressionList::new(["$list(,)", "spec"]).disables_flag_parsing(registry));
    }

    #[test]
    fn test_deserialize_scalars_and_sequences() {
        let list: ExpressionList = serde_yaml::from_str("one").unwrap();
        assert_eq!(list, ExpressionList::new(["one"]));
        let list: ExpressionList = serde_yaml::from_str("[a, $files]").unwrap();
        assert_eq!(list.0, vec!["a", "$files"]);
        let list: ExpressionList = serde_yaml::from_str("[1, 2, 5]").unwrap();
        assert_eq!(list.0, vec!["1", "2", "5"]);
        let list: ExpressionList = serde_yaml::from_str("[true, false]").unwrap();
        assert_eq!(list.0, vec!["true", "false"]);
        let list: ExpressionList = serde_yaml::from_str("42").unwrap();
        assert_eq!(list.0, vec!["42"]);
        assert!(serde_yaml::from_str::<ExpressionList>("[[nested]]").is_err());
    }
}
