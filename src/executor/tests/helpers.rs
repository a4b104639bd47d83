//! Test helpers for executor tests
//!
//! Common utilities for decoding programs and building runtimes

use std::sync::Arc;

use crate::application::Runtime;
use crate::config::RuntimeConfig;
use crate::executor::errors::LangError;
use crate::executor::types::{Flow, Val};
use crate::output::CaptureOutput;
use crate::program::{ProgramBuilder, ProgramSource};

/// Configuration used by every helper: small pool, short sleeps
pub fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        max_workers: 2,
        wait_sleep_every: 8,
        wait_sleep_us: 50,
        ..RuntimeConfig::default()
    }
}

/// Decode a serialized program and create a runtime that captures its output
///
/// This helper:
/// - Decodes the program JSON the parser layer would hand over
/// - Builds the registry (built-in error classes and standard extensions included)
/// - Attaches `test.law` as the file of every expression location
/// - Creates a runtime printing into a [`CaptureOutput`]
///
/// # Arguments
/// * `source` - Program JSON (`procedures`, `classes`, `records`, `main`)
/// * `config` - Runtime configuration
///
/// # Returns
/// The runtime and its captured output
pub fn parse_program_and_build_runtime(
    source: &str,
    config: RuntimeConfig,
) -> (Runtime, Arc<CaptureOutput>) {
    let source = ProgramSource::from_json(source).expect("Program decoding failed");
    let program = ProgramBuilder::from_source(source)
        .file("test.law")
        .build()
        .expect("Program registry failed");
    let output = Arc::new(CaptureOutput::new());
    let runtime = Runtime::new(program, config, output.clone());
    (runtime, output)
}

/// Run the main statements; the outcome and every printed line
pub fn run_program(source: &str) -> (Result<Flow, LangError>, Vec<String>) {
    run_program_with(source, test_config())
}

pub fn run_program_with(
    source: &str,
    config: RuntimeConfig,
) -> (Result<Flow, LangError>, Vec<String>) {
    let (runtime, output) = parse_program_and_build_runtime(source, config);
    let flow = runtime.run_main();
    runtime.shutdown();
    (flow, output.take())
}

/// Printed lines of a program that must succeed
pub fn run_ok(source: &str) -> Vec<String> {
    let (flow, lines) = run_program(source);
    if let Err(err) = flow {
        panic!("program failed: {}\noutput: {:?}", err.report(), lines);
    }
    lines
}

/// The error of a program that must fail
pub fn run_err(source: &str) -> LangError {
    let (flow, lines) = run_program(source);
    match flow {
        Err(err) => err,
        Ok(flow) => panic!("expected an error, got {:?}\noutput: {:?}", flow, lines),
    }
}

/// Evaluate expression text with an empty program
pub fn eval(text: &str) -> Result<Val, LangError> {
    let (runtime, _) = parse_program_and_build_runtime("{}", test_config());
    runtime.evaluate(text)
}

/// Evaluate expression text against a program's registry
pub fn eval_in(source: &str, text: &str) -> Result<Val, LangError> {
    let (runtime, _) = parse_program_and_build_runtime(source, test_config());
    runtime.evaluate(text)
}

pub fn lines(expected: &[&str]) -> Vec<String> {
    expected.iter().map(|line| line.to_string()).collect()
}
