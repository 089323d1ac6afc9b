//! Logging configuration.
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
pub struct Logging {
    /// Logging level. Possible values are: `off`, `error`, `warn`, `info`,
    /// `debug` and `trace`. Default is `info`.
    #[serde(default)]
    pub threshold: Threshold,

    /// Output format of the log lines. Possible values are: `default`,
    /// `pretty`, `compact` and `json`.
    #[serde(default)]
    pub style: TraceStyle,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum Threshold {
    /// A threshold lower than all security levels.
    Off,
    /// Corresponds to the `Error` security level.
    Error,
    /// Corresponds to the `Warn` security level.
    Warn,
    /// Corresponds to the `Info` security level.
    #[default]
    Info,
    /// Corresponds to the `Debug` security level.
    Debug,
    /// Corresponds to the `Trace` security level.
    Trace,
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let display_str = match self {
            Threshold::Off => "off",
            Threshold::Error => "error",
            Threshold::Warn => "warn",
            Threshold::Info => "info",
            Threshold::Debug => "debug",
            Threshold::Trace => "trace",
        };
        write!(f, "{display_str}")
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Hash, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum TraceStyle {
    #[default]
    Default,
    Pretty,
    Compact,
    Json,
}

impl fmt::Display for TraceStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let style = match self {
            TraceStyle::Default => "Default Style",
            TraceStyle::Pretty => "Pretty Style",
            TraceStyle::Compact => "Compact Style",
            TraceStyle::Json => "Json Style",
        };

        f.write_str(style)
    }
}
