use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::executor::types::ast::for_each_in_body;
use crate::executor::types::Flow;
use crate::init::InitBuilder;

#[derive(Parser)]
#[command(name = "jurist")]
#[command(about = "Jurist - run and check compiled rule programs", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Upper bound on background worker threads
    #[arg(long, global = true)]
    pub max_workers: Option<usize>,

    /// Re-raise host panics instead of reporting them as internal errors
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a program's main statements
    Run {
        /// Serialized program (JSON)
        program: PathBuf,
    },

    /// Compile every expression of a program and report all errors
    Check {
        /// Serialized program (JSON)
        program: PathBuf,

        /// Print the postfix form of every main expression
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },

    /// Evaluate a single expression against an optional program
    Eval {
        /// Expression text
        expression: String,

        /// Serialized program (JSON) providing procedures, classes and records
        #[arg(short = 'p', long = "program")]
        program: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli)
}

/// Run the CLI with provided arguments
pub fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli)
}

fn init_tracing() {
    // A second initialization (tests, embedding hosts) is not an error
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn builder(cli: &Cli) -> InitBuilder {
    let mut builder = InitBuilder::new();
    if cli.debug {
        builder = builder.debug(true);
    }
    if let Some(path) = &cli.config {
        builder = builder.config_path(path);
    }
    if let Some(max_workers) = cli.max_workers {
        builder = builder.max_workers(max_workers);
    }
    builder
}

/// Internal function that handles CLI commands
fn run_cli_with_args(cli: Cli) -> Result<()> {
    init_tracing();

    // Eagerly load and validate configuration before executing any command
    let config = builder(&cli).load_config()?;

    match &cli.command {
        Commands::Run { program } => {
            let runtime = builder(&cli).program_file(program).build()?;
            let flow = runtime.run_main();
            runtime.shutdown();
            match flow {
                Ok(Flow::Return(value)) => println!("{}", value),
                Ok(_) => {}
                Err(err) => bail!(err.report()),
            }
        }

        Commands::Check { program, verbose } => {
            let program = builder(&cli).program_file(program).load_program()?;
            let errors = program.check();

            if *verbose {
                for_each_in_body(program.main(), &mut |expr| {
                    if let Ok(compiled) = expr.compiled() {
                        println!("{:>4}  {}", expr.location().line, compiled.postfix());
                    }
                });
            }

            if errors.is_empty() {
                println!("✓ {} compiled without errors", program.file());
            } else {
                for err in &errors {
                    eprintln!("{}", err.report());
                }
                bail!("{} error(s) in {}", errors.len(), program.file());
            }
        }

        Commands::Eval {
            expression,
            program,
        } => {
            let mut init = builder(&cli);
            if let Some(program) = program {
                init = init.program_file(program);
            }
            let runtime = init.build()?;
            match runtime.evaluate(expression) {
                Ok(value) => println!("{}", value),
                Err(err) => bail!(err.report()),
            }
        }

        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check_command() {
        let cli = Cli::parse_from(["jurist", "check", "rules.json", "--verbose"]);
        match cli.command {
            Commands::Check { program, verbose } => {
                assert_eq!(program, PathBuf::from("rules.json"));
                assert!(verbose);
            }
            _ => panic!("expected the check command"),
        }
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::parse_from(["jurist", "run", "rules.json", "--max-workers", "3", "--debug"]);
        assert_eq!(cli.max_workers, Some(3));
        assert!(cli.debug);
    }

    #[test]
    fn test_eval_command() {
        let args = vec!["jurist".to_string(), "eval".to_string(), "2 + 3 * 4".to_string()];
        assert!(run_cli_from_args(args).is_ok());
    }
}
