//! Initialization of a runtime
//!
//! Loads configuration and a serialized program and wires them into a [`Runtime`].
//!
//! # Example
//!
//! ```no_run
//! use jurist_core::init::InitBuilder;
//!
//! let runtime = InitBuilder::new()
//!     .program_file("contracts.json")
//!     .max_workers(2)
//!     .build()?;
//! runtime.run_main()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::application::Runtime;
use crate::config::RuntimeConfig;
use crate::executor::stdlib::Extension;
use crate::output::{Output, StdoutOutput};
use crate::program::{Program, ProgramBuilder, ProgramSource};

/// Options for initializing a runtime
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Config file path (overrides default search)
    pub config_path: Option<PathBuf>,

    /// Serialized program to load; an empty program when unset
    pub program_file: Option<PathBuf>,

    /// Ignore `.env` and `JURIST_*` variables
    pub ignore_env: bool,

    pub max_workers: Option<usize>,
    pub recursion_limit: Option<usize>,
    pub debug: Option<bool>,
}

/// Builder for constructing a [`Runtime`]
pub struct InitBuilder {
    options: InitOptions,
    output: Option<Arc<dyn Output>>,
    extensions: Vec<Arc<dyn Extension>>,
}

impl InitBuilder {
    /// Create a new builder with default options
    pub fn new() -> Self {
        Self {
            options: InitOptions::default(),
            output: None,
            extensions: Vec::new(),
        }
    }

    pub fn from_options(options: InitOptions) -> Self {
        Self {
            options,
            ..Self::new()
        }
    }

    /// Set the config file path
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    /// Set the program to load
    pub fn program_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.program_file = Some(path.into());
        self
    }

    pub fn ignore_env(mut self) -> Self {
        self.options.ignore_env = true;
        self
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.options.max_workers = Some(max_workers);
        self
    }

    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.options.recursion_limit = Some(limit);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.options.debug = Some(debug);
        self
    }

    /// Where `print` writes (stdout by default)
    pub fn output(mut self, output: Arc<dyn Output>) -> Self {
        self.output = Some(output);
        self
    }

    /// Register a host extension next to the standard library
    pub fn extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Resolve configuration from the configured sources
    pub fn load_config(&self) -> Result<RuntimeConfig> {
        let options = &self.options;
        let mut builder = RuntimeConfig::builder().config_path(options.config_path.clone());
        if options.ignore_env {
            builder = builder.without_env();
        }
        if let Some(max_workers) = options.max_workers {
            builder = builder.max_workers(max_workers);
        }
        if let Some(limit) = options.recursion_limit {
            builder = builder.recursion_limit(limit);
        }
        if let Some(debug) = options.debug {
            builder = builder.debug(debug);
        }
        builder.build().context("Failed to load configuration")
    }

    /// Load the configured program without creating a runtime
    pub fn load_program(&self) -> Result<Program> {
        let builder = match &self.options.program_file {
            Some(path) => {
                let source = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read program {}", path.display()))?;
                let source = ProgramSource::from_json(&source)
                    .with_context(|| format!("Failed to decode program {}", path.display()))?;
                ProgramBuilder::from_source(source).file(path.display().to_string())
            }
            None => ProgramBuilder::new(),
        };
        let builder = self
            .extensions
            .iter()
            .fold(builder, |builder, ext| builder.extension(Arc::clone(ext)));
        builder
            .build()
            .map_err(|err| anyhow!(err.report()))
            .context("Failed to build program registry")
    }

    /// Load configuration and program, and create the runtime
    pub fn build(self) -> Result<Runtime> {
        let config = self.load_config()?;
        let program = self.load_program()?;
        debug!(?config, file = %program.file(), "runtime initialized");
        let output = self
            .output
            .unwrap_or_else(|| Arc::new(StdoutOutput) as Arc<dyn Output>);
        Ok(Runtime::new(program, config, output))
    }
}

impl Default for InitBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::types::Flow;
    use crate::output::CaptureOutput;
    use std::io::Write;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", uuid::Uuid::new_v4(), name));
        let mut file = std::fs::File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes()).expect("write temp file");
        path
    }

    #[test]
    fn test_build_runs_program_file() {
        let program = temp_file(
            "hello.json",
            r#"{ "main": [ { "t": "Print", "value": "\"hello\"" } ] }"#,
        );
        let output = Arc::new(CaptureOutput::new());
        let runtime = InitBuilder::new()
            .ignore_env()
            .program_file(&program)
            .output(output.clone())
            .build()
            .expect("runtime builds");

        assert_eq!(runtime.run_main().unwrap(), Flow::Stop);
        assert_eq!(output.lines(), vec!["hello"]);
        let _ = std::fs::remove_file(program);
    }

    #[test]
    fn test_overrides_reach_the_runtime() {
        let runtime = InitBuilder::new()
            .ignore_env()
            .max_workers(2)
            .recursion_limit(16)
            .build()
            .expect("runtime builds");
        assert_eq!(runtime.context().config.max_workers, 2);
        assert_eq!(runtime.context().config.recursion_limit, 16);
    }

    #[test]
    fn test_missing_program_file() {
        let err = InitBuilder::new()
            .ignore_env()
            .program_file("/definitely/not/here.json")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read program"));
    }

    #[test]
    fn test_duplicate_names_fail_initialization() {
        let program = temp_file(
            "dupes.json",
            r#"{ "procedures": [ { "name": "max" } ] }"#,
        );
        let err = InitBuilder::new()
            .ignore_env()
            .program_file(&program)
            .build()
            .unwrap_err();
        assert!(format!("{:#}", err).contains("already defined"));
        let _ = std::fs::remove_file(program);
    }
}
