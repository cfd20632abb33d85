//! Tracing subscriber setup: file layer, console formatter, and initialisation.
use super::sink::LogSink;

/// Events from this crate at `DEBUG` and above reach the log file.
const FILE_FILTER: &str = "dotfiles_bootstrap=debug";

/// Extracts the `message` field from a [`tracing::Event`].
#[derive(Default)]
struct MessageExtractor {
    message: String,
}

impl tracing::field::Visit for MessageExtractor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

/// A [`tracing_subscriber::Layer`] that appends events to the audit log
/// shared with the [`Reporter`](super::reporter::Reporter).
#[derive(Debug, Clone)]
pub struct FileLayer {
    sink: LogSink,
}

impl FileLayer {
    /// Create a layer writing into `sink`.
    #[must_use]
    pub const fn new(sink: LogSink) -> Self {
        Self { sink }
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let level = *event.metadata().level();
        let mut extractor = MessageExtractor::default();
        event.record(&mut extractor);

        let tag = match level {
            tracing::Level::ERROR => "ERROR",
            tracing::Level::WARN => "WARN",
            tracing::Level::INFO => "INFO",
            tracing::Level::DEBUG => "DEBUG",
            tracing::Level::TRACE => "TRACE",
        };
        self.sink.event(tag, &extractor.message);
    }
}

/// A [`tracing_subscriber::fmt::FormatEvent`] for `--verbose` console output.
struct VerboseFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for VerboseFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let mut extractor = MessageExtractor::default();
        event.record(&mut extractor);
        let msg = &extractor.message;

        match *event.metadata().level() {
            tracing::Level::ERROR => writeln!(writer, "\x1b[31mERROR\x1b[0m {msg}"),
            tracing::Level::WARN => writeln!(writer, "\x1b[33mWARN\x1b[0m  {msg}"),
            _ => writeln!(writer, "  \x1b[2m{msg}\x1b[0m"),
        }
    }
}

/// Initialise the global [`tracing`] subscriber.
///
/// Internal diagnostics always go to `sink`; with `verbose` they are also
/// echoed to stderr. Must be called once at program startup.
pub fn init_subscriber(verbose: bool, sink: &LogSink) {
    use tracing_subscriber::{
        EnvFilter, Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let file_layer = FileLayer::new(sink.clone()).with_filter(EnvFilter::new(FILE_FILTER));

    let console_layer = verbose.then(|| {
        fmt::layer()
            .event_format(VerboseFormatter)
            .with_writer(std::io::stderr)
            .with_filter(LevelFilter::DEBUG)
    });

    let result = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init();
    if result.is_err() {
        sink.event("WARN", "tracing subscriber already initialised");
    }
}
