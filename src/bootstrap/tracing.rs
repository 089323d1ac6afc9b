//! Setup for the application tracing.
//!
//! It redirects the tracing info to the standard output with the threshold
//! and the style defined in the `[logging]` section of the configuration.
//!
//! - `off` (i.e. don't load any subscriber...)
//! - `error`
//! - `warn`
//! - `info`
//! - `debug`
//! - `trace`
use std::sync::Once;

use hxe_configuration::{Logging, Threshold, TraceStyle};
use tracing::level_filters::LevelFilter;

static INIT: Once = Once::new();

/// It redirects the tracing info to the standard output.
pub fn setup(cfg: &Logging) {
    let filter = map_to_tracing_level_filter(cfg.threshold);

    if filter == LevelFilter::OFF {
        return;
    }

    INIT.call_once(|| {
        tracing_stdout_init(filter, cfg.style);
    });
}

fn map_to_tracing_level_filter(threshold: Threshold) -> LevelFilter {
    match threshold {
        Threshold::Off => LevelFilter::OFF,
        Threshold::Error => LevelFilter::ERROR,
        Threshold::Warn => LevelFilter::WARN,
        Threshold::Info => LevelFilter::INFO,
        Threshold::Debug => LevelFilter::DEBUG,
        Threshold::Trace => LevelFilter::TRACE,
    }
}

fn tracing_stdout_init(filter: LevelFilter, style: TraceStyle) {
    let builder = tracing_subscriber::fmt().with_max_level(filter);

    let () = match style {
        TraceStyle::Default => builder.init(),
        TraceStyle::Pretty => builder.pretty().init(),
        TraceStyle::Compact => builder.compact().init(),
        TraceStyle::Json => builder.json().init(),
    };

    tracing::info!("Logging initialized ({style})");
}
