/// Jurist command line
///
/// Runs and checks serialized rule programs.
use jurist_core::cli;

fn main() {
    if let Err(e) = cli::run_cli() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
