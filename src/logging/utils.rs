//! Utility functions for ANSI stripping and time formatting.

/// Width of the separator line that marks section boundaries in the log.
pub const SEPARATOR_WIDTH: usize = 72;

/// Strip ANSI escape sequences from a string.
///
/// Handles SGR sequences (ending in `m`) and other CSI sequences (ending
/// in any letter in the `@`..`~` range), so cursor movement, erase, etc.
/// are also stripped without consuming unrelated text.
#[must_use]
pub fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if let Some(next) = chars.next()
                && next == '['
            {
                for inner in chars.by_ref() {
                    if ('@'..='~').contains(&inner) {
                        break;
                    }
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Format the current local time as `YYYY-MM-DD HH:MM:SS`.
#[must_use]
pub fn format_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// The fixed-width line separating log sections.
#[must_use]
pub fn separator() -> String {
    "=".repeat(SEPARATOR_WIDTH)
}
