//! Supervisor configurations for testing.
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use hxe_configuration::{Configuration, Driver, Threshold};

use crate::random;

/// This configuration is used for testing. It generates random config values
/// so they do not collide if you run more than one supervisor at the same time.
///
/// - The Health Check API binds to a free port chosen by the operating system.
/// - The `sqlite3` database lives in a temporary file with a random name.
/// - Grace periods and retry delays are short, so the lifecycle tests are fast.
///
/// # Panics
///
/// Will panic if it can't convert the temp file path to string.
#[must_use]
pub fn ephemeral() -> Configuration {
    let mut config = Configuration::default();

    config.logging.threshold = Threshold::Off;

    // Ephemeral socket address for the Health Check API
    config.health_check_api.bind_address = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 0);

    // Ephemeral sqlite database
    let temp_directory = env::temp_dir();
    let temp_file = temp_directory.join(format!("data_{}.db", random::string(16)));
    temp_file.to_str().unwrap().clone_into(&mut config.core.database.path);

    config.core.supervisor.grace_period = Duration::from_millis(500);
    config.core.supervisor.kill_timeout = Duration::from_millis(500);
    config.core.supervisor.healthy_after = Duration::from_secs(60);
    config.core.supervisor.liveness_interval = Duration::from_millis(50);

    config.core.retry.base_delay = Duration::from_millis(20);
    config.core.retry.max_delay = Duration::from_millis(100);

    config.gateway.subject_prefix = format!("hxe-{}", random::string(8));
    config.gateway.request_timeout = Duration::from_secs(5);

    config
}

/// Ephemeral configuration with a volatile store.
#[must_use]
pub fn ephemeral_with_memory_store() -> Configuration {
    let mut config = ephemeral();

    config.core.database.driver = Driver::Memory;

    config
}

/// Ephemeral configuration with a request timeout shorter than the grace period.
#[must_use]
pub fn ephemeral_with_short_request_timeout() -> Configuration {
    let mut config = ephemeral_with_memory_store();

    config.gateway.request_timeout = Duration::from_millis(50);
    config.core.supervisor.grace_period = Duration::from_millis(500);

    config
}
