//! Console logging for the SDK.
//!
//! A `tracing` layer that writes every event as one prefixed line to the
//! browser console at the matching console level. Off wasm the line goes to
//! stderr, so host tests and tools see the same text.

use std::fmt::Write as FmtWrite;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Prefix of every console line.
pub const LOG_PREFIX: &str = "[playlight]";

/// Writes one rendered line at a level.
pub type ConsoleSink = fn(Level, &str);

/// A tracing layer writing to the browser console.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleLayer {
    max_level: Level,
    sink: ConsoleSink,
}

impl ConsoleLayer {
    /// Create a layer passing events up to `max_level`.
    #[must_use]
    pub fn new(max_level: Level) -> Self {
        Self::with_sink(max_level, write_console)
    }

    /// Create a layer with a custom sink.
    #[must_use]
    pub fn with_sink(max_level: Level, sink: ConsoleSink) -> Self {
        Self { max_level, sink }
    }

    /// Most verbose level passed through.
    #[must_use]
    pub const fn max_level(&self) -> Level {
        self.max_level
    }
}

impl<S> Layer<S> for ConsoleLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn enabled(&self, metadata: &Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        *metadata.level() <= self.max_level
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let spans = ctx
            .event_scope(event)
            .map(|scope| {
                scope
                    .from_root()
                    .map(|span| span.name())
                    .collect::<Vec<_>>()
                    .join(" > ")
            })
            .unwrap_or_default();

        let line = render_line(&spans, visitor.message.as_deref().unwrap_or_default(), &visitor.fields);
        (self.sink)(*event.metadata().level(), &line);
    }
}

/// Render one console line: prefix, span path, message, then `key=value` fields.
#[must_use]
pub fn render_line(spans: &str, message: &str, fields: &[(String, String)]) -> String {
    let mut line = String::from(LOG_PREFIX);
    if !spans.is_empty() {
        let _ = write!(line, " {spans}:");
    }
    if !message.is_empty() {
        let _ = write!(line, " {message}");
    }
    for (name, value) in fields {
        let _ = write!(line, " {name}={value}");
    }
    line
}

/// Install the console layer as the global subscriber. False when a
/// subscriber was already installed.
pub fn init(max_level: Level) -> bool {
    let subscriber = tracing_subscriber::registry().with(ConsoleLayer::new(max_level));
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

#[cfg(target_arch = "wasm32")]
fn write_console(level: Level, line: &str) {
    let line = wasm_bindgen::JsValue::from_str(line);
    match level {
        Level::ERROR => web_sys::console::error_1(&line),
        Level::WARN => web_sys::console::warn_1(&line),
        Level::INFO => web_sys::console::info_1(&line),
        _ => web_sys::console::debug_1(&line),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn write_console(level: Level, line: &str) {
    eprintln!("{level:>5} {line}");
}

#[derive(Default)]
struct LineVisitor {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl Visit for LineVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let mut buf = String::new();
        let _ = write!(buf, "{value:?}");
        self.record(field, buf);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_string());
    }
}

impl LineVisitor {
    fn record(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use std::cell::RefCell;

    thread_local! {
        static LINES: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
    }

    fn capture(level: Level, line: &str) {
        LINES.with(|lines| lines.borrow_mut().push((level, line.to_string())));
    }

    fn captured() -> Vec<(Level, String)> {
        LINES.with(|lines| std::mem::take(&mut *lines.borrow_mut()))
    }

    #[test]
    fn test_render_line() {
        let fields = vec![
            ("href".to_string(), "https://cdn.io/a.css".to_string()),
            ("phase".to_string(), "mount".to_string()),
        ];
        assert_eq!(
            render_line("", "cross-origin stylesheet skipped", &fields),
            "[playlight] cross-origin stylesheet skipped href=https://cdn.io/a.css phase=mount"
        );
        assert_eq!(render_line("graft", "", &[]), "[playlight] graft:");
    }

    #[test]
    fn test_layer_routes_levels_and_filters() {
        let subscriber =
            tracing_subscriber::registry().with(ConsoleLayer::with_sink(Level::INFO, capture));
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(phase = "unwrap", "phase failed, continuing");
            tracing::warn!("sheet skipped");
            tracing::debug!("refresh pass");
        });

        let lines = captured();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, Level::ERROR);
        assert_eq!(lines[0].1, "[playlight] phase failed, continuing phase=unwrap");
        assert_eq!(lines[1].0, Level::WARN);
    }

    #[test]
    fn test_span_path_included() {
        let subscriber =
            tracing_subscriber::registry().with(ConsoleLayer::with_sink(Level::DEBUG, capture));
        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::debug_span!("refresh");
            let _guard = span.enter();
            tracing::debug!(managed = 3, "stylesheets rewritten");
        });
        assert_eq!(
            captured()[0].1,
            "[playlight] refresh: stylesheets rewritten managed=3"
        );
    }
}
