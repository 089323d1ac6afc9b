//! Control protocol gateway configuration.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

#[serde_as]
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct Gateway {
    /// The first segment of every subject the gateway answers on, e.g.
    /// `hxe.service.start`.
    #[serde(default = "Gateway::default_subject_prefix")]
    pub subject_prefix: String,

    /// Upper bound for one request. When it elapses the caller gets a
    /// `TIMEOUT` error, while the command itself still completes.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "request_timeout_ms", default = "Gateway::default_request_timeout")]
    pub request_timeout: Duration,

    /// Maximum number of requests handled concurrently.
    #[serde(default = "Gateway::default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for Gateway {
    fn default() -> Self {
        Self {
            subject_prefix: Self::default_subject_prefix(),
            request_timeout: Self::default_request_timeout(),
            max_in_flight: Self::default_max_in_flight(),
        }
    }
}

impl Gateway {
    fn default_subject_prefix() -> String {
        String::from("hxe")
    }

    fn default_request_timeout() -> Duration {
        Duration::from_secs(5)
    }

    fn default_max_in_flight() -> usize {
        64
    }
}
