//! A client of the control protocol.
//!
//! Used by the health check and by the tests. It sends one request on the
//! subject of the operation and decodes the [`Response`].
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::protocol::{Operation, Response};
use crate::bus::{self, Bus};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("the request failed: {source}")]
    Bus { source: bus::Error },

    #[error("unable to encode or decode the message: {source}")]
    Codec { source: serde_json::Error },
}

pub struct Client {
    bus: Arc<dyn Bus>,
    prefix: String,
    timeout: Duration,
}

impl Client {
    #[must_use]
    pub fn new(bus: Arc<dyn Bus>, prefix: String, timeout: Duration) -> Self {
        Self { bus, prefix, timeout }
    }

    /// Requests an operation and waits for its response.
    ///
    /// # Errors
    ///
    /// Will return an error if nobody answers within the timeout or the
    /// answer is not a response.
    pub async fn call<T: Serialize + ?Sized>(&self, operation: Operation, request: &T) -> Result<Response, Error> {
        let payload = serde_json::to_vec(request).map_err(|source| Error::Codec { source })?;

        let answer = self
            .bus
            .request(&operation.subject(&self.prefix), payload, self.timeout)
            .await
            .map_err(|source| Error::Bus { source })?;

        serde_json::from_slice(&answer).map_err(|source| Error::Codec { source })
    }
}
