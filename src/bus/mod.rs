//! Message bus.
//!
//! The supervisor is controlled through request/reply messages exchanged over
//! a subject based message bus, in the style of NATS:
//!
//! - Subjects are dot separated tokens, for example `hxe.service.start`.
//! - A subscription pattern may use `*` to match exactly one token and a
//!   trailing `>` to match one or more tokens, for example `hxe.service.>`.
//! - A request carries a reply subject. The responder publishes its answer on
//!   that subject.
//!
//! The [`Bus`] trait is the boundary. [`LocalBus`] is an in-process broker used
//! when the supervisor embeds its own bus.
pub mod local;

use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;

pub use local::LocalBus;

pub const BUS_LOG_TARGET: &str = "BUS";

/// A message delivered to a subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub payload: Vec<u8>,
    /// Where the answer goes, if the sender expects one.
    pub reply: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("the subject \"{subject}\" is not valid")]
    InvalidSubject { subject: String },

    #[error("nobody is listening on \"{subject}\"")]
    NoResponders { subject: String },

    #[error("no reply on \"{subject}\" after {timeout:?}")]
    Timeout { subject: String, timeout: Duration },

    #[error("the message has no reply subject")]
    NoReplySubject,
}

/// A stream of the messages published on the subjects matching a pattern.
///
/// Dropping it ends the subscription.
pub struct Subscription {
    pattern: String,
    rx: mpsc::UnboundedReceiver<Message>,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    #[must_use]
    pub fn new(pattern: String, rx: mpsc::UnboundedReceiver<Message>) -> Self {
        Self { pattern, rx, release: None }
    }

    /// Like [`Subscription::new`], running `release` when the subscription is
    /// dropped so the bus can forget the subscriber right away.
    #[must_use]
    pub fn with_release(
        pattern: String,
        rx: mpsc::UnboundedReceiver<Message>,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            pattern,
            rx,
            release: Some(Box::new(release)),
        }
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Waits for the next message. Returns `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("pattern", &self.pattern).finish_non_exhaustive()
    }
}

pub trait Bus: Send + Sync + 'static {
    /// Publishes a message to every current subscriber of the subject.
    ///
    /// # Errors
    ///
    /// Will return an error if the subject is not valid.
    fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), Error>;

    /// Subscribes to the subjects matching the pattern.
    ///
    /// # Errors
    ///
    /// Will return an error if the pattern is not valid.
    fn subscribe(&self, pattern: &str) -> Result<Subscription, Error>;

    /// Sends a request and waits for the first reply.
    fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> BoxFuture<'_, Result<Vec<u8>, Error>>;

    /// Answers a request.
    ///
    /// # Errors
    ///
    /// Will return an error if the message does not expect a reply.
    fn respond(&self, request: &Message, payload: Vec<u8>) -> Result<(), Error> {
        let reply = request.reply.as_deref().ok_or(Error::NoReplySubject)?;

        self.publish(reply, payload)
    }
}

/// Returns `true` if the subject is a non-empty sequence of non-empty tokens
/// without wildcards.
#[must_use]
pub fn is_valid_subject(subject: &str) -> bool {
    !subject.is_empty()
        && subject
            .split('.')
            .all(|token| !token.is_empty() && token != "*" && token != ">" && !token.contains(char::is_whitespace))
}

/// Returns `true` if the pattern is valid: `>` may only be the last token.
#[must_use]
pub fn is_valid_pattern(pattern: &str) -> bool {
    let tokens: Vec<&str> = pattern.split('.').collect();

    !pattern.is_empty()
        && tokens.iter().enumerate().all(|(position, token)| {
            !token.is_empty() && !token.contains(char::is_whitespace) && (*token != ">" || position == tokens.len() - 1)
        })
}

/// Matches a subject against a subscription pattern.
#[must_use]
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut subject = subject.split('.');

    for token in pattern.split('.') {
        match (token, subject.next()) {
            (">", Some(_)) => return true,
            (_, None) => return false,
            ("*", Some(_)) => continue,
            (expected, Some(found)) if expected == found => continue,
            _ => return false,
        }
    }

    subject.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::{is_valid_pattern, is_valid_subject, matches};

    #[test]
    fn it_should_match_exact_subjects() {
        assert!(matches("hxe.service.start", "hxe.service.start"));
        assert!(!matches("hxe.service.start", "hxe.service.stop"));
        assert!(!matches("hxe.service", "hxe.service.stop"));
        assert!(!matches("hxe.service.stop", "hxe.service"));
    }

    #[test]
    fn it_should_match_a_single_token_wildcard() {
        assert!(matches("hxe.*.start", "hxe.service.start"));
        assert!(!matches("hxe.*", "hxe.service.start"));
    }

    #[test]
    fn it_should_match_the_remaining_tokens_with_a_trailing_wildcard() {
        assert!(matches("hxe.event.>", "hxe.event.web"));
        assert!(matches("hxe.event.>", "hxe.event.web.v2"));
        assert!(!matches("hxe.event.>", "hxe.event"));
    }

    #[test]
    fn it_should_validate_subjects_and_patterns() {
        assert!(is_valid_subject("hxe.service.list"));
        assert!(!is_valid_subject("hxe..list"));
        assert!(!is_valid_subject("hxe.service.>"));

        assert!(is_valid_pattern("hxe.service.>"));
        assert!(is_valid_pattern("hxe.*.list"));
        assert!(!is_valid_pattern("hxe.>.list"));
        assert!(!is_valid_pattern(""));
    }
}
