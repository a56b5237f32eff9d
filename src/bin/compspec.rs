/*!
 * compspec - complete and run commands described by a YAML spec
 *
 * `complete` prints the candidates for the last argument, `run` dispatches the
 * command's run field and `macro` lists or invokes registered macros.
 */

use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, bail, Context as _, Result};
use clap::{Parser, Subcommand};
use compspec_core::config::Config;
use compspec_core::structured_log::{init_logger, LogLevel};
use compspec_core::{Builder, Command, CommandSpec, Completion, Context, MacroRegistry};

#[derive(Parser)]
#[command(name = "compspec")]
#[command(about = "Declarative shell completion specs", long_about = None)]
struct Cli {
    /// Log level (debug, info, warn); overrides COMPSPEC_LOG
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Complete the last argument against a spec
    Complete {
        /// Export the result as JSON
        #[arg(long)]
        json: bool,

        /// Spec file
        spec: PathBuf,

        /// Arguments typed so far, the last one being completed
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run the command described by a spec
    Run {
        /// Spec file
        spec: PathBuf,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// List macros, show a signature or invoke one
    Macro {
        /// Macro call without `$`, e.g. `files([.rs])`
        name: Option<String>,

        /// Arguments and the value being completed
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Delegation protocol used by `$program.macro` calls
    #[command(name = "_carapace", hide = true)]
    Protocol {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(level) = cli.log.as_deref().and_then(LogLevel::parse) {
        config.log.enabled = true;
        config.log.min_level = level;
    }
    init_logger(config.log.clone());
    let registry = Rc::new(MacroRegistry::with_core(config.program.clone()));

    let result = match cli.command {
        Commands::Complete { json, spec, args } => complete(&config, &registry, &spec, &args, json),
        Commands::Run { spec, args } => run(&config, &registry, &spec, &args),
        Commands::Macro { name, args } => invoke_macro(&registry, name, &args),
        Commands::Protocol { args } => protocol(&registry, &args),
        Commands::Version => {
            println!("compspec v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load(config: &Config, registry: &MacroRegistry, path: &Path) -> Result<Command> {
    let spec = CommandSpec::load(path)?;
    Ok(Builder::new(registry)
        .capabilities(config.capabilities)
        .build_or_fallback(&spec))
}

fn context(registry: &Rc<MacroRegistry>) -> Context {
    Context::new(Rc::clone(registry))
}

fn complete(
    config: &Config,
    registry: &Rc<MacroRegistry>,
    spec: &Path,
    args: &[String],
    json: bool,
) -> Result<()> {
    let command = load(config, registry, spec)?;
    let mut args = args.to_vec();
    if args.is_empty() {
        args.push(String::new());
    }
    let value = args.last().cloned().unwrap_or_default();
    let result = command
        .complete(&context(registry), &args)
        .filter_prefix(&value);
    print_completion(&result, json)
}

fn run(config: &Config, registry: &Rc<MacroRegistry>, spec: &Path, args: &[String]) -> Result<()> {
    let command = load(config, registry, spec)?;
    let code = command.execute(&context(registry), args)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn invoke_macro(registry: &Rc<MacroRegistry>, name: Option<String>, args: &[String]) -> Result<()> {
    let Some(name) = name else {
        for (name, signature) in registry.signatures() {
            let description = registry.get(&name).map(|m| m.description()).unwrap_or_default();
            println!("${}({})\t{}", name, signature, description);
        }
        return Ok(());
    };

    let call = format!("${}", name);
    let m = registry.lookup(&call)?;
    if args.is_empty() {
        println!("${}({})", name.split('(').next().unwrap_or_default(), m.signature());
        return Ok(());
    }
    let action = m.parse(&call)?;
    let (value, previous) = args
        .split_last()
        .ok_or_else(|| anyhow!("missing value to complete"))?;
    let c = context(registry).with_args(previous.iter().cloned()).with_value(value.clone());
    print_completion(&action.invoke(&c), true)
}

/// `_carapace macro <name(arg)> [args]... <value>`
fn protocol(registry: &Rc<MacroRegistry>, args: &[String]) -> Result<()> {
    let (kind, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("missing protocol command"))?;
    if kind != "macro" {
        bail!("unknown protocol command: {}", kind);
    }
    let (name, rest) = rest
        .split_first()
        .ok_or_else(|| anyhow!("missing macro name"))?;

    let call = format!("$_.{}", name);
    let result = match registry.lookup(&call) {
        Ok(m) => {
            let action = m.parse(&call)?;
            let (value, previous) = match rest.split_last() {
                Some((value, previous)) => (value.clone(), previous),
                None => (String::new(), rest),
            };
            let c = context(registry)
                .with_args(previous.iter().cloned())
                .with_value(value);
            action.invoke(&c)
        }
        Err(e) => Completion::message(e.to_string()),
    };
    print_completion(&result, true)
}

fn print_completion(result: &Completion, json: bool) -> Result<()> {
    if json {
        println!("{}", result.to_json().context("failed to export completion")?);
        return Ok(());
    }
    for s in &result.suggestions {
        if s.description.is_empty() {
            println!("{}", s.value);
        } else {
            println!("{}\t{}", s.value, s.description);
        }
    }
    for message in &result.messages {
        eprintln!("{}", message);
    }
    Ok(())
}
