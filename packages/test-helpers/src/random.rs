//! Random data generators for testing.
use hxe_primitives::ServiceId;

/// Returns a random lowercase alphanumeric string of the given length (at
/// most 32 characters).
#[must_use]
pub fn string(length: usize) -> String {
    uuid::Uuid::new_v4().simple().to_string().chars().take(length).collect()
}

/// Returns a fresh service id, unique across the test run.
///
/// # Panics
///
/// Will panic if the generated id is not a valid service id.
#[must_use]
pub fn service_id(prefix: &str) -> ServiceId {
    ServiceId::new(format!("{prefix}-{}", string(8))).expect("it should generate a valid service id")
}
