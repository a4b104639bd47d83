pub mod application;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod executor;
pub mod init;
pub mod output;
pub mod parser;
pub mod program;
pub mod scheduler;

// Re-export main types
pub use application::{Runtime, RuntimeContext};
pub use config::RuntimeConfig;
pub use executor::{ErrorKind, Flow, LangError, LangResult, Val};
pub use program::{Program, ProgramBuilder, ProgramSource};

// Re-export init API for convenience
pub use init::{InitBuilder, InitOptions};
