//! Reading prompt answers from the controlling terminal.
use std::fs::File;
use std::io::{self, BufRead as _, BufReader};

#[cfg(windows)]
const CONTROLLING_TERMINAL: &str = "CONIN$";
#[cfg(not(windows))]
const CONTROLLING_TERMINAL: &str = "/dev/tty";

/// Source of interactive answers.
///
/// Prompts never read from stdin, which may be a pipe (`curl ... | sh`).
#[cfg_attr(test, mockall::automock)]
pub trait Terminal: Send {
    /// Read one line of input, without the trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be opened or read.
    fn read_line(&self) -> io::Result<String>;
}

/// The real controlling terminal (`/dev/tty`, `CONIN$` on Windows).
#[derive(Debug, Default, Clone, Copy)]
pub struct TtyTerminal;

impl Terminal for TtyTerminal {
    fn read_line(&self) -> io::Result<String> {
        let tty = File::open(CONTROLLING_TERMINAL)?;
        let mut line = String::new();
        BufReader::new(tty).read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}
