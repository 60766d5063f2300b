use core::fmt;
use std::fs::OpenOptions;
use std::sync::Once;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, fmt as tracingfmt};

/// if `cond` is false, logs a warning with your message.
#[macro_export]
macro_rules! assert_warn {
    ($cond:expr, $($arg:tt)+) => {{
        if !$cond {
            tracing::warn!(
                target: module_path!(),
                "assertion warning: `{}` failed: {} at {}:{}",
                stringify!($cond),
                format_args!($($arg)+),
                file!(),
                line!(),
            );
        }
    }};
}

struct AlignedFormatter;

/// Visitor to pull the `tti` field out of an event so it can lead the line
struct TtiVisitor {
    tti: Option<String>,
}

impl tracing::field::Visit for TtiVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "tti" {
            self.tti = Some(format!("{:?}", value));
        }
    }
}

impl<S, N> FormatEvent<S, N> for AlignedFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let mut visitor = TtiVisitor { tti: None };
        event.record(&mut visitor);
        let has_tti = visitor.tti.is_some();
        let tti_str = visitor.tti.unwrap_or_else(|| "            ".to_string());

        let (color_level, color_reset) = match *metadata.level() {
            tracing::Level::ERROR => ("\x1b[31m", "\x1b[0m"),
            tracing::Level::WARN => ("\x1b[33m", "\x1b[0m"),
            tracing::Level::INFO => ("\x1b[32m", "\x1b[0m"),
            tracing::Level::DEBUG => ("\x1b[34m", "\x1b[0m"),
            tracing::Level::TRACE => ("\x1b[35m", "\x1b[0m"),
        };

        // Target "enb_sched::testing::checker" is shown as "[sched::testing] checker"
        let target = metadata.target().strip_prefix("enb_").unwrap_or(metadata.target());
        let formatted_path = match target.rsplit_once("::") {
            Some((module, leaf)) => format!("{} [{}] {}", tti_str, module, leaf),
            None => format!("{} [{}]", tti_str, target),
        };

        let location = format!("{}{:<5}{} {}:{}:", color_level, metadata.level(), color_reset, formatted_path, metadata.line().unwrap_or(0));

        let mut message_buf = String::new();
        let message_writer = format::Writer::new(&mut message_buf);
        ctx.field_format().format_fields(message_writer, event)?;

        // The tti already leads the line, drop it from the field list
        if has_tti {
            if let Some(tti_idx) = message_buf.find("tti=") {
                if let Some(space_idx) = message_buf[tti_idx..].find(' ') {
                    message_buf.replace_range(tti_idx..tti_idx + space_idx + 1, "");
                } else {
                    message_buf.truncate(tti_idx);
                }
            }
        }

        // Grant and feedback traces start with "->" or "<-"
        let mut padding = 70;
        if message_buf.starts_with("->") || message_buf.starts_with("<-") {
            padding -= 3;
        }

        write!(writer, "{:<width$} {}", location, message_buf, width = padding)?;
        writeln!(writer)
    }
}

static INIT_LOG: Once = Once::new();

/// Sets up logging with maximum verbosity (trace level)
/// Mainly for unit tests
pub fn setup_logging_verbose() {
    setup_logging(EnvFilter::new("trace"), None);
}

/// Sets up logging at warning level, for long randomized test runs
pub fn setup_logging_quiet() {
    setup_logging(EnvFilter::new("warn"), None);
}

/// Sets up default logging to stdout and optionally, a verbose log file
/// Returns a guard, that needs to be kept alive for logging to file to work
pub fn setup_logging_default(verbose_logfile: Option<String>) -> Option<WorkerGuard> {
    let stdout_filter = get_default_stdout_filter();
    let logfile_and_filter = verbose_logfile.map(|file| (file, get_default_logfile_filter()));
    setup_logging(stdout_filter, logfile_and_filter)
}

pub fn get_default_stdout_filter() -> EnvFilter {
    let mut filter = EnvFilter::new("info");
    // Per-TTI allocation traces are too chatty for stdout, RA and facade events are not
    for directive in [
        "enb_sched::dl_alloc=info",
        "enb_sched::ul_alloc=info",
        "enb_sched::harq=info",
        "enb_core::byte_buffer=warn",
        "enb_sched::ra=debug",
        "enb_sched::sched=debug",
        "enb_sched::testing=info",
        "enb_pcap=info",
    ] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }
    filter
}

fn get_default_logfile_filter() -> EnvFilter {
    EnvFilter::new("debug")
}

/// Installs the global subscriber once. Later calls are no-ops.
/// With a log file, returns the guard of its non-blocking writer; the file
/// stops receiving lines when the guard is dropped.
fn setup_logging(stdout_filter: EnvFilter, outfile: Option<(String, EnvFilter)>) -> Option<WorkerGuard> {
    let file = outfile.and_then(|(path, filter)| match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(f) => Some((f, filter)),
        Err(e) => {
            eprintln!("Failed to open log file {}: {}, logging to stdout only", path, e);
            None
        }
    });

    let Some((file, file_filter)) = file else {
        INIT_LOG.call_once(|| {
            let stdout_layer = tracingfmt::layer().event_format(AlignedFormatter);
            tracing_subscriber::registry().with(stdout_layer.with_filter(stdout_filter)).init();
        });
        return None;
    };

    let (file_writer, guard) = tracing_appender::non_blocking(file);
    INIT_LOG.call_once(|| {
        let file_layer = tracingfmt::layer().event_format(AlignedFormatter).with_writer(file_writer).with_ansi(false);
        let stdout_layer = tracingfmt::layer().event_format(AlignedFormatter);
        tracing_subscriber::registry()
            .with(file_layer.with_filter(file_filter))
            .with(stdout_layer.with_filter(stdout_filter))
            .init();
    });
    Some(guard)
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_warn_does_not_panic() {
        super::setup_logging_verbose();
        crate::assert_warn!(1 + 1 == 3, "arithmetic is {}", "broken");
        crate::assert_warn!(true, "never logged");
    }

    #[test]
    fn test_default_filter_parses() {
        let filter = super::get_default_stdout_filter();
        assert!(filter.to_string().contains("enb_pcap=info"));
    }
}
