use std::io::{self, Stdout};

use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::Layer as LayerTrait,
    registry::LookupSpan,
};

use crate::logging::config::{LogFormat, LoggingConfig};

/// Слой форматирования с выводом в stdout.
pub fn build_formatter_from_config<S>(config: &LoggingConfig) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let writer: fn() -> Stdout = io::stdout;
    build_formatter_with_writer(config, writer)
}

/// Слой форматирования с произвольным writer.
///
/// Формат (json, pretty или compact) выбирается по конфигурации; тип слоя
/// стирается до trait-объекта.
pub fn build_formatter_with_writer<S, W>(
    config: &LoggingConfig,
    writer: W,
) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match config.format {
        LogFormat::Json => {
            let json_fmt = fmt::format().json().with_current_span(true);
            let layer = fmt::layer()
                .event_format(json_fmt)
                .fmt_fields(fmt::format::JsonFields::new())
                .with_writer(writer)
                .with_ansi(false)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_line_number(config.with_line_numbers);
            Box::new(layer)
        }
        LogFormat::Pretty => {
            let pretty_fmt = fmt::format().pretty();
            let layer = fmt::layer()
                .event_format(pretty_fmt)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(writer)
                .with_ansi(config.with_ansi)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_line_number(config.with_line_numbers);
            Box::new(layer)
        }
        LogFormat::Compact => {
            let compact_fmt = fmt::format().compact();
            let layer = fmt::layer()
                .event_format(compact_fmt)
                .with_writer(writer)
                .with_ansi(config.with_ansi)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_line_number(config.with_line_numbers);
            Box::new(layer)
        }
    }
}
