//! Where `print` statements write

use parking_lot::Mutex;
use std::io::Write;

pub trait Output: Send + Sync {
    fn print(&self, line: &str);
}

/// Writes each line to standard output
#[derive(Debug, Default)]
pub struct StdoutOutput;

impl Output for StdoutOutput {
    fn print(&self, line: &str) {
        let mut stdout = std::io::stdout().lock();
        // A closed stdout must not abort the program
        let _ = writeln!(stdout, "{}", line);
    }
}

/// Keeps printed lines in memory
#[derive(Debug, Default)]
pub struct CaptureOutput {
    lines: Mutex<Vec<String>>,
}

impl CaptureOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }
}

impl Output for CaptureOutput {
    fn print(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}
