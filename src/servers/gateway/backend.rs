//! The execution backend behind the `shell` operation.
//!
//! The gateway does not emulate terminals. It asks a backend for a session
//! and hands the token to the caller, who attaches to the session through the
//! backend itself.
use std::time::Duration;

use dashmap::DashMap;
use hxe_primitives::{ServiceId, ServiceSpec};
use tokio::time::Instant;
use uuid::Uuid;

/// How long a token stays valid when nobody closes its session.
pub const SESSION_TTL: Duration = Duration::from_secs(15 * 60);

pub trait ExecutionBackend: Send + Sync + 'static {
    /// Opens a session in the environment of the service and returns its
    /// token.
    ///
    /// # Errors
    ///
    /// Will return a reason if the backend refuses the session.
    fn open_session(&self, spec: &ServiceSpec) -> Result<String, String>;
}

/// Issues session tokens and remembers which service each one belongs to.
///
/// An external attachment layer looks the token up and closes the session
/// when the caller detaches. A token it never closes expires after the
/// session TTL and is forgotten the next time a session is opened.
#[derive(Debug)]
pub struct Sessions {
    ttl: Duration,
    open: DashMap<String, (ServiceId, Instant)>,
}

impl Default for Sessions {
    fn default() -> Self {
        Self::new(SESSION_TTL)
    }
}

impl Sessions {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            open: DashMap::new(),
        }
    }

    /// The service a token was issued for, while the token is valid.
    #[must_use]
    pub fn service(&self, token: &str) -> Option<ServiceId> {
        self.open
            .get(token)
            .filter(|session| session.1.elapsed() < self.ttl)
            .map(|session| session.0.clone())
    }

    /// Forgets a session. Returns `false` for an unknown token.
    pub fn close(&self, token: &str) -> bool {
        self.open.remove(token).is_some()
    }

    /// The number of sessions remembered, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.open.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    fn forget_expired(&self) {
        self.open.retain(|_, session| session.1.elapsed() < self.ttl);
    }
}

impl ExecutionBackend for Sessions {
    fn open_session(&self, spec: &ServiceSpec) -> Result<String, String> {
        self.forget_expired();

        let token = Uuid::new_v4().simple().to_string();

        self.open.insert(token.clone(), (spec.id.clone(), Instant::now()));

        Ok(token)
    }
}
