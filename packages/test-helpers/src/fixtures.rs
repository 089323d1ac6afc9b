//! Service specs used across the test suites.
use hxe_primitives::{ServiceId, ServiceSpec};

/// A long running service.
#[must_use]
pub fn sleeper(id: ServiceId) -> ServiceSpec {
    ServiceSpec::new(id, "Sleeper", "sleep 100")
}

/// A service that exits immediately with code `1`.
#[must_use]
pub fn crasher(id: ServiceId, max_retries: u32) -> ServiceSpec {
    let mut spec = ServiceSpec::new(id, "Crasher", "exit 1");
    spec.max_retries = max_retries;
    spec
}

/// A one-shot service that completes successfully.
#[must_use]
pub fn oneshot(id: ServiceId) -> ServiceSpec {
    let mut spec = ServiceSpec::new(id, "One shot", "true");
    spec.oneshot = true;
    spec
}

/// A long running service that prints a few lines first.
#[must_use]
pub fn chatty(id: ServiceId) -> ServiceSpec {
    ServiceSpec::new(id, "Chatty", "echo one; echo two; echo three >&2; sleep 100")
}

/// A service whose pre-exec hook fails.
#[must_use]
pub fn broken_pre_exec(id: ServiceId) -> ServiceSpec {
    let mut spec = sleeper(id);
    spec.pre_exec = Some("exit 3".to_owned());
    spec
}

/// A long running service that ignores the termination signal, so stopping it
/// takes the whole grace period.
#[must_use]
pub fn stubborn(id: ServiceId) -> ServiceSpec {
    ServiceSpec::new(id, "Stubborn", "trap '' TERM; sleep 100")
}
