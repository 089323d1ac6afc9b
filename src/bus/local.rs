//! In-process message broker.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt as _;
use tokio::sync::mpsc;

use super::{is_valid_pattern, is_valid_subject, matches, Bus, Error, Message, Subscription, BUS_LOG_TARGET};

const INBOX_PREFIX: &str = "_INBOX";

/// A message broker living in the supervisor process.
///
/// Delivery is at-most-once: a message published while nobody listens is
/// dropped.
#[derive(Debug, Default)]
pub struct LocalBus {
    next_subscriber: AtomicU64,
    subscribers: Arc<DashMap<u64, (String, mpsc::UnboundedSender<Message>)>>,
}

impl LocalBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers the message and returns the number of subscribers reached.
    fn deliver(&self, message: &Message) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for subscriber in self.subscribers.iter() {
            let (pattern, tx) = subscriber.value();

            if !matches(pattern, &message.subject) {
                continue;
            }

            if tx.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(*subscriber.key());
            }
        }

        for key in closed {
            self.subscribers.remove(&key);
        }

        tracing::trace!(target: BUS_LOG_TARGET, subject = message.subject, delivered, "published");

        delivered
    }

    fn has_listener(&self, subject: &str) -> bool {
        self.subscribers
            .iter()
            .any(|subscriber| !subscriber.value().1.is_closed() && matches(&subscriber.value().0, subject))
    }
}

impl Bus for LocalBus {
    fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), Error> {
        if !is_valid_subject(subject) {
            return Err(Error::InvalidSubject {
                subject: subject.to_owned(),
            });
        }

        self.deliver(&Message {
            subject: subject.to_owned(),
            payload,
            reply: None,
        });

        Ok(())
    }

    fn subscribe(&self, pattern: &str) -> Result<Subscription, Error> {
        if !is_valid_pattern(pattern) {
            return Err(Error::InvalidSubject {
                subject: pattern.to_owned(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let key = self.next_subscriber.fetch_add(1, Ordering::Relaxed);

        self.subscribers.insert(key, (pattern.to_owned(), tx));

        tracing::debug!(target: BUS_LOG_TARGET, pattern, "subscribed");

        let subscribers = Arc::downgrade(&self.subscribers);

        Ok(Subscription::with_release(pattern.to_owned(), rx, move || {
            if let Some(subscribers) = subscribers.upgrade() {
                subscribers.remove(&key);
            }
        }))
    }

    fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> BoxFuture<'_, Result<Vec<u8>, Error>> {
        let subject = subject.to_owned();

        async move {
            if !is_valid_subject(&subject) {
                return Err(Error::InvalidSubject { subject });
            }

            if !self.has_listener(&subject) {
                return Err(Error::NoResponders { subject });
            }

            let inbox = format!("{INBOX_PREFIX}.{}", uuid::Uuid::new_v4().simple());
            let mut replies = self.subscribe(&inbox)?;

            let delivered = self.deliver(&Message {
                subject: subject.clone(),
                payload,
                reply: Some(inbox),
            });

            if delivered == 0 {
                return Err(Error::NoResponders { subject });
            }

            match tokio::time::timeout(timeout, replies.next()).await {
                Ok(Some(reply)) => Ok(reply.payload),
                Ok(None) | Err(_) => Err(Error::Timeout { subject, timeout }),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::LocalBus;
    use crate::bus::{Bus, Error};

    #[tokio::test]
    async fn it_should_deliver_to_every_matching_subscriber() {
        let bus = LocalBus::new();

        let mut exact = bus.subscribe("hxe.event.web").unwrap();
        let mut wildcard = bus.subscribe("hxe.event.>").unwrap();
        let mut other = bus.subscribe("hxe.event.db").unwrap();

        bus.publish("hxe.event.web", b"changed".to_vec()).unwrap();

        assert_eq!(exact.next().await.unwrap().payload, b"changed");
        assert_eq!(wildcard.next().await.unwrap().subject, "hxe.event.web");
        assert!(other.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn it_should_answer_a_request() {
        let bus = std::sync::Arc::new(LocalBus::new());

        let mut service = bus.subscribe("hxe.service.list").unwrap();

        let responder = bus.clone();
        tokio::spawn(async move {
            let request = service.next().await.unwrap();
            responder.respond(&request, b"[]".to_vec()).unwrap();
        });

        let reply = bus
            .request("hxe.service.list", b"{}".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(reply, b"[]");
    }

    #[tokio::test]
    async fn it_should_fail_a_request_nobody_listens_to() {
        let bus = LocalBus::new();

        let result = bus.request("hxe.service.list", b"{}".to_vec(), Duration::from_secs(1)).await;

        assert_eq!(
            result,
            Err(Error::NoResponders {
                subject: "hxe.service.list".to_owned()
            })
        );
    }

    #[tokio::test]
    async fn it_should_time_out_a_request_nobody_answers() {
        let bus = LocalBus::new();

        let _silent = bus.subscribe("hxe.service.list").unwrap();

        let result = bus.request("hxe.service.list", b"{}".to_vec(), Duration::from_millis(20)).await;

        assert!(matches!(result, Err(Error::Timeout { .. })));
    }

    #[tokio::test]
    async fn it_should_forget_a_dropped_subscription() {
        let bus = LocalBus::new();

        drop(bus.subscribe("hxe.service.list").unwrap());

        let result = bus.request("hxe.service.list", b"{}".to_vec(), Duration::from_secs(1)).await;

        assert!(matches!(result, Err(Error::NoResponders { .. })));
        assert!(bus.subscribers.is_empty());
    }

    #[tokio::test]
    async fn it_should_forget_the_reply_inbox_after_a_request() {
        let bus = std::sync::Arc::new(LocalBus::new());

        let mut service = bus.subscribe("hxe.service.list").unwrap();

        let responder = bus.clone();
        tokio::spawn(async move {
            while let Some(request) = service.next().await {
                responder.respond(&request, b"[]".to_vec()).unwrap();
            }
        });

        for _ in 0..100 {
            bus.request("hxe.service.list", b"{}".to_vec(), Duration::from_secs(1))
                .await
                .unwrap();
        }

        let _silent = bus.subscribe("hxe.service.stop").unwrap();
        let _ = bus.request("hxe.service.stop", b"{}".to_vec(), Duration::from_millis(10)).await;

        assert_eq!(bus.subscribers.len(), 2);
    }

    #[test]
    fn it_should_reject_publishing_on_a_pattern() {
        let bus = LocalBus::new();

        assert!(matches!(
            bus.publish("hxe.service.>", Vec::new()),
            Err(Error::InvalidSubject { .. })
        ));
    }
}
