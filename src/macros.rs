//! Macro registry
//!
//! Macros are named constructors of [`Action`]s called as `$name` or
//! `$name(arg)`. Each declares an [`ArgShape`]; typed arguments are decoded from
//! YAML flow syntax except plain strings, which are taken verbatim.
//!
//! Core macros live under their bare name, macros registered by the embedding
//! program under `_.name` so the two can never collide.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_yaml::Value;

use crate::action::Action;
use crate::error::{SpecError, SpecResult};

lazy_static! {
    static ref MACRO_CALL: Regex = Regex::new(r"^\$(?P<macro>[^(]*)(\((?P<arg>.*)\))?$").unwrap();
}

/// Namespace prefix of custom macros
pub const CUSTOM_PREFIX: &str = "_.";

/// Split `$name(arg)` into name and raw argument text
pub fn parse_call(call: &str) -> SpecResult<(&str, &str)> {
    let caps = MACRO_CALL
        .captures(call)
        .ok_or_else(|| SpecError::MalformedExpression(call.to_string()))?;
    let name = caps.name("macro").map(|m| m.as_str()).unwrap_or("");
    let arg = caps.name("arg").map(|m| m.as_str()).unwrap_or("");
    Ok((name, arg))
}

/// A typed macro argument
///
/// The default implementation decodes YAML and applies [`MacroArg::with_defaults`]
/// when the argument text is empty.
pub trait MacroArg: Sized + Default + Serialize + DeserializeOwned {
    /// Populate defaults for a call without argument (`$macro`)
    fn with_defaults(self) -> Self {
        self
    }

    fn decode(text: &str) -> SpecResult<Self> {
        if text.is_empty() {
            return Ok(Self::default().with_defaults());
        }
        serde_yaml::from_str(text).map_err(|e| SpecError::Decode {
            text: text.to_string(),
            expected: Self::signature(),
            reason: e.to_string(),
        })
    }

    fn signature() -> String {
        match serde_yaml::to_value(Self::default()) {
            Ok(value) => flow(&value),
            Err(e) => e.to_string(),
        }
    }
}

impl MacroArg for String {
    fn decode(text: &str) -> SpecResult<Self> {
        Ok(text.to_string())
    }

    fn signature() -> String {
        r#""""#.to_string()
    }
}

impl MacroArg for bool {}
impl MacroArg for i32 {}
impl MacroArg for i64 {}
impl MacroArg for u32 {}
impl MacroArg for u64 {}
impl MacroArg for usize {}
impl MacroArg for f64 {}

impl<T: MacroArg> MacroArg for Vec<T> {
    fn signature() -> String {
        format!("[{}]", T::signature())
    }
}

/// Decode a variadic argument: empty text is no elements, a bare `a, b` list is
/// read as a flow sequence.
pub fn decode_variadic<T: MacroArg>(text: &str) -> SpecResult<Vec<T>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let sequence = if text.trim_start().starts_with('[') {
        text.to_string()
    } else {
        format!("[{}]", text)
    };
    serde_yaml::from_str(&sequence).map_err(|e| SpecError::Decode {
        text: text.to_string(),
        expected: Vec::<T>::signature(),
        reason: e.to_string(),
    })
}

/// Render a YAML value in flow style
fn flow(value: &Value) -> String {
    match value {
        Value::Mapping(map) => {
            let fields: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", flow(k).trim_matches('"'), flow(v)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
        Value::Sequence(seq) => {
            let items: Vec<String> = seq.iter().map(flow).collect();
            format!("[{}]", items.join(", "))
        }
        Value::String(s) if s.is_empty() => r#""""#.to_string(),
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Tagged(tagged) => flow(&tagged.value),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgShape {
    None,
    Single,
    Variadic,
}

type Invoke = Rc<dyn Fn(&str) -> SpecResult<Action>>;

/// Registry entry producing an [`Action`] from a raw argument
#[derive(Clone)]
pub struct Macro {
    shape: ArgShape,
    signature: String,
    description: String,
    disables_flag_parsing: bool,
    invoke: Invoke,
}

impl fmt::Debug for Macro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Macro")
            .field("shape", &self.shape)
            .field("signature", &self.signature)
            .field("disables_flag_parsing", &self.disables_flag_parsing)
            .finish()
    }
}

impl Macro {
    /// Macro without argument
    pub fn none<F>(f: F) -> Self
    where
        F: Fn() -> Action + 'static,
    {
        Self::with_shape(ArgShape::None, String::new(), Rc::new(move |_: &str| Ok(f())))
    }

    /// Macro with a single typed argument
    pub fn single<A, F>(f: F) -> Self
    where
        A: MacroArg + 'static,
        F: Fn(A) -> Action + 'static,
    {
        Self::with_shape(
            ArgShape::Single,
            A::signature(),
            Rc::new(move |text: &str| Ok(f(A::decode(text)?))),
        )
    }

    /// Macro with any number of typed arguments
    pub fn variadic<A, F>(f: F) -> Self
    where
        A: MacroArg + 'static,
        F: Fn(Vec<A>) -> Action + 'static,
    {
        Self::with_shape(
            ArgShape::Variadic,
            Vec::<A>::signature(),
            Rc::new(move |text: &str| Ok(f(decode_variadic(text)?))),
        )
    }

    fn with_shape(shape: ArgShape, signature: String, invoke: Invoke) -> Self {
        Self {
            shape,
            signature,
            description: String::new(),
            disables_flag_parsing: false,
            invoke,
        }
    }

    /// Mark the macro as consuming raw arguments, so flag parsing gets disabled for
    /// positions it completes
    pub fn no_flag_parsing(mut self) -> Self {
        self.disables_flag_parsing = true;
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Build the action for a raw argument text
    pub fn invoke(&self, arg: &str) -> SpecResult<Action> {
        match self.shape {
            ArgShape::None => (self.invoke)(""),
            _ => (self.invoke)(arg),
        }
    }

    /// Build the action for a full `$name(arg)` call
    pub fn parse(&self, call: &str) -> SpecResult<Action> {
        let (_, arg) = parse_call(call)?;
        self.invoke(arg)
    }

    pub fn shape(&self) -> ArgShape {
        self.shape
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn disables_flag_parsing(&self) -> bool {
        self.disables_flag_parsing
    }
}

/// Name to macro map, built once per invocation
#[derive(Clone, Debug, Default)]
pub struct MacroRegistry {
    macros: BTreeMap<String, Macro>,
    program: String,
}

impl MacroRegistry {
    /// Empty registry; `program` is the name `$<program>.name` calls resolve against
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            macros: BTreeMap::new(),
            program: program.into(),
        }
    }

    /// Registry holding the core macro set
    pub fn with_core(program: impl Into<String>) -> Self {
        let mut registry = Self::new(program);
        crate::core::register(&mut registry);
        registry
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn add_core(&mut self, name: &str, m: Macro) {
        self.macros.insert(name.to_string(), m);
    }

    /// Register a macro of the embedding program, reachable as `$_.name`
    pub fn add_custom(&mut self, name: &str, m: Macro) {
        self.macros.insert(format!("{}{}", CUSTOM_PREFIX, name), m);
    }

    /// Find the macro a `$name(arg)` call refers to
    pub fn lookup(&self, call: &str) -> SpecResult<&Macro> {
        let (name, _) = parse_call(call)?;
        self.macros
            .get(name)
            .ok_or_else(|| SpecError::UnknownMacro(call.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    pub fn get_custom(&self, name: &str) -> Option<&Macro> {
        self.macros.get(&format!("{}{}", CUSTOM_PREFIX, name))
    }

    /// Names of custom macros without namespace prefix, sorted
    pub fn custom_names(&self) -> Vec<&str> {
        self.macros
            .keys()
            .filter_map(|k| k.strip_prefix(CUSTOM_PREFIX))
            .collect()
    }

    /// All registered names with their signatures, sorted
    pub fn signatures(&self) -> Vec<(String, String)> {
        self.macros
            .iter()
            .map(|(name, m)| (name.clone(), m.signature().to_string()))
            .collect()
    }
}
