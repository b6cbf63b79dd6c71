//! Console output: the tracing formatter, a progress-bar aware writer and spinners.

use std::io;
use std::str::FromStr;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_core::{Event, Subscriber};
use tracing_subscriber::{
    EnvFilter,
    filter::Directive,
    fmt::{
        FmtContext, FormatEvent, FormatFields, MakeWriter,
        format::{self, Format},
    },
    registry::LookupSpan,
};

/// Writes to stderr without tearing the progress bars of a [`MultiProgress`].
#[derive(Clone)]
pub struct IndicatifWriter {
    progress_bars: MultiProgress,
}

impl IndicatifWriter {
    /// Create a writer that suspends `pb` while writing.
    pub fn new(pb: MultiProgress) -> Self {
        Self { progress_bars: pb }
    }
}

impl io::Write for IndicatifWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.progress_bars.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.progress_bars.suspend(|| io::stderr().flush())
    }
}

impl<'a> MakeWriter<'a> for IndicatifWriter {
    type Writer = IndicatifWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Prints this crate's INFO events as bare messages and everything else in
/// the default format.
pub struct TracingFormatter;

impl<S, N> FormatEvent<S, N> for TracingFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();

        if *metadata.level() == tracing_core::metadata::Level::INFO
            && metadata.target().starts_with("whey_conda")
        {
            ctx.format_fields(writer.by_ref(), event)?;
            writeln!(writer)
        } else {
            Format::default().format_event(ctx, writer, event)
        }
    }
}

/// Constructs a default [`EnvFilter`] that is used when the user did not specify a custom RUST_LOG.
pub fn get_default_env_filter(
    verbose: clap_verbosity_flag::log::LevelFilter,
) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
    let level = match verbose {
        clap_verbosity_flag::log::LevelFilter::Off => "off",
        clap_verbosity_flag::log::LevelFilter::Error => "error",
        clap_verbosity_flag::log::LevelFilter::Warn => "warn",
        clap_verbosity_flag::log::LevelFilter::Info => "info",
        clap_verbosity_flag::log::LevelFilter::Debug => "debug",
        clap_verbosity_flag::log::LevelFilter::Trace => "trace",
    };

    let mut result = EnvFilter::new(format!("whey_conda={level},whey_conda_package={level}"));

    if verbose >= clap_verbosity_flag::log::LevelFilter::Trace {
        result = result.add_directive(Directive::from_str("rattler_repodata_gateway=info")?);
    } else {
        result = result.add_directive(Directive::from_str("rattler_repodata_gateway=warn")?);
    }

    Ok(result)
}

/// Add a ticking spinner with `message` to `multi_progress`.
pub fn spinner(multi_progress: &MultiProgress, message: &'static str) -> ProgressBar {
    let style = ProgressStyle::with_template("{spinner:.green} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let pb = multi_progress.add(
        ProgressBar::new_spinner()
            .with_style(style)
            .with_message(message),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
