//! Logging infrastructure: the dual-channel reporter, the audit log sink,
//! and the tracing subscriber that feeds internal diagnostics into it.

mod reporter;
mod sink;
mod subscriber;
mod terminal;
mod types;
mod utils;

pub use reporter::{Reporter, accepts_default_no, accepts_default_yes};
pub use sink::{LogSink, SharedBuffer};
pub use subscriber::{FileLayer, init_subscriber};
pub use terminal::{Terminal, TtyTerminal};
pub use types::{StageEntry, StageStatus};
pub use utils::strip_ansi;
