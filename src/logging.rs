//! Diagnostic logging to stderr.
//!
//! Lines look like `[2026-01-05T10:00:00.000Z] [WorkflowCoordinator] [WARN] message`.
//! The component is the event target, so `RUST_LOG=LockStore=debug` narrows
//! output to one component. stdout is reserved for command results.

use chrono::{SecondsFormat, Utc};
use tracing::{Event, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Renders `[timestamp] [COMPONENT] [LEVEL] message`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentFormat;

impl<S, N> FormatEvent<S, N> for ComponentFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        write!(
            writer,
            "[{}] [{}] [{}] ",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            metadata.target(),
            metadata.level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install the global subscriber.
///
/// WARN and above by default, DEBUG with `verbose`; `RUST_LOG` overrides both.
/// Calling this more than once is harmless.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(filter)
        .event_format(ComponentFormat)
        .try_init();
}
