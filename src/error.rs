//! Error types shared by the flag grammar, the macro language and run dispatch.

use thiserror::Error;

pub type SpecResult<T> = Result<T, SpecError>;

#[derive(Debug, Error)]
pub enum SpecError {
    /// The `$name(...)` call syntax itself does not parse
    #[error("malformed macro: {0:?}")]
    MalformedExpression(String),

    /// Well-formed call naming a macro or modifier that is not registered
    #[error("unknown macro: {0:?}")]
    UnknownMacro(String),

    /// Structured argument could not be decoded into the declared shape
    #[error("malformed macro arg: '{text}', expected '{expected}': {reason}")]
    Decode {
        text: String,
        expected: String,
        reason: String,
    },

    #[error("flag syntax invalid: {id}: {reason}")]
    FlagSyntax { id: String, reason: String },

    /// Flag needs a capability the target flag set lacks
    #[error("{0}")]
    UnsupportedBinding(String),

    #[error("{0}")]
    ShebangFormat(String),

    #[error("failed to execute {command}: {reason}")]
    Process { command: String, reason: String },

    #[error("invalid run field: {0}")]
    InvalidRun(String),

    #[error("unknown parsing mode: {0:?}")]
    ParsingMode(String),

    #[error("bad substitution: {0:?}")]
    Envsubst(String),

    #[error("{0}")]
    Usage(String),

    #[error("failed to load {path}: {reason}")]
    Load { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SpecError {
    pub fn flag_syntax(id: &str, reason: impl Into<String>) -> Self {
        SpecError::FlagSyntax {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn process(command: &str, reason: impl ToString) -> Self {
        SpecError::Process {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error is a lookup miss rather than a syntax problem
    pub fn is_unknown(&self) -> bool {
        matches!(self, SpecError::UnknownMacro(_))
    }
}
