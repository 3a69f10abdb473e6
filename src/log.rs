use std::{env, fmt, io};

use tracing::{dispatcher::set_default, subscriber::DefaultGuard, Dispatch, Event, Subscriber};
use tracing_subscriber::{
    fmt::{format, FmtContext, FormatEvent, FormatFields, FormattedFields, MakeWriter},
    prelude::__tracing_subscriber_SubscriberExt,
    registry::LookupSpan,
    EnvFilter,
};

pub use tracing::*;

/// Installs a console logger for the current thread.
///
/// `filter` overrides the default directive `initsvc={level},{env}`, where
/// `{env}` expands to `RUST_LOG`.
pub fn default(console_level: Level, filter: Option<&str>) -> DefaultGuard {
    set_default(&make_dispatch(console_level, filter, io::stderr))
}

#[inline]
fn make_dispatch<W: for<'writer> MakeWriter<'writer> + 'static + Send + Sync>(
    level: Level,
    filter: Option<&str>,
    writer: W,
) -> Dispatch {
    let layer = tracing_subscriber::fmt::layer()
        .event_format(LineFormatter)
        .with_writer(writer);

    Dispatch::from(
        tracing_subscriber::registry()
            .with(layer)
            .with(make_filter(level, filter)),
    )
}

#[inline]
fn make_filter(level: Level, filter: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(Level::WARN.into())
        .parse_lossy(all_initsvc(level, filter))
}

#[inline]
fn all_initsvc(level: impl ToString, filter: Option<&str>) -> String {
    filter
        .unwrap_or("initsvc={level},{env}")
        .replace("{level}", level.to_string().to_uppercase().as_str())
        .replace("{env}", get_env().as_str())
}

#[inline]
fn get_env() -> String {
    env::var("RUST_LOG").unwrap_or_default()
}

struct LineFormatter;

impl<S, N> FormatEvent<S, N> for LineFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let now = chrono::Local::now();
        let now_msecs = now.timestamp_millis() % 1000;
        let date = now.format("%Y-%m-%d %H:%M:%S");

        let metadata = event.metadata();

        if metadata.level() == &Level::INFO {
            write!(&mut writer, "{}.{:03}:{}", date, now_msecs, metadata.level())?;
        } else {
            write!(
                &mut writer,
                "{}.{:03}:{}:{}",
                date,
                now_msecs,
                metadata.level(),
                metadata.target()
            )?;
            if let Some(line) = metadata.line() {
                write!(&mut writer, ":{}", line)?;
            }
        }

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, ":{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{}}}", fields)?;
                    }
                }
            }
        }

        write!(writer, ": ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}
