//! compspec_core - declarative shell completion specs
//!
//! Modules:
//! - flag: Flag identifier grammar and flag sets
//! - action: Completion actions, results and their combinators
//! - macros: Macro registry with typed argument decoding
//! - modifier: The closed set of `$name(arg)` action modifiers
//! - expr: Value expression lists evaluated into actions
//! - core: Core macros (files, shell scripts, nested specs, ...)
//! - command: Spec file model and command tree assembly
//! - traverse: Argument walking and completion slot selection
//! - run: Alias, shell script and shebang dispatch
//! - shell / shebang: Interpreter invocations
//! - envsubst: `${VAR}` substitution
//! - config / structured_log: Environment configuration and JSON logging

pub mod action;
pub mod command;
pub mod config;
pub mod core;
pub mod envsubst;
pub mod error;
pub mod expr;
pub mod flag;
pub mod macros;
pub mod modifier;
pub mod run;
pub mod shebang;
pub mod shell;
pub mod structured_log;
pub mod traverse;

// Re-export key types for convenience
pub use action::{Action, Completion, Context, Suggestion};

pub use command::{Builder, Command, CommandSpec, ParsingMode};

pub use config::Config;

pub use error::{SpecError, SpecResult};

pub use expr::ExpressionList;

pub use flag::{Capabilities, FlagSet, FlagSpec};

pub use macros::{ArgShape, Macro, MacroArg, MacroRegistry};

pub use modifier::Modifier;

pub use run::{PreparedRun, RunSpec};

pub use shell::Shell;

pub use traverse::Walk;
