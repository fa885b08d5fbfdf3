//! Outbound email events
//!
//! The auth service hands email events to an [`EmailPublisher`] and never
//! waits on delivery. [`ChannelEmailPublisher`] queues events on a bounded
//! channel drained by a background task; the mail sender itself lives outside
//! this crate, so the default consumer only logs what it would send.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default capacity of the email queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Template name for confirmation emails
pub const EMAIL_CONFIRMATION_TEMPLATE: &str = "email_confirmation";

/// Messaging error types
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Email queue is full")]
    QueueFull,

    #[error("Email queue is closed")]
    Closed,

    #[error("Failed to publish email event: {0}")]
    Publish(String),
}

/// A templated email to be rendered and sent by the mail service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailEvent {
    pub to: String,
    pub template: String,
    pub subject: String,
    pub data: HashMap<String, serde_json::Value>,
}

impl EmailEvent {
    pub fn confirmation(to: &str, confirmation_url: &str) -> Self {
        let data = HashMap::from([
            (
                "confirmation_url".to_string(),
                serde_json::Value::from(confirmation_url),
            ),
            ("user_email".to_string(), serde_json::Value::from(to)),
        ]);

        Self {
            to: to.to_string(),
            template: EMAIL_CONFIRMATION_TEMPLATE.to_string(),
            subject: "Confirm your email".to_string(),
            data,
        }
    }
}

#[async_trait]
pub trait EmailPublisher: Send + Sync {
    async fn publish_email(&self, event: EmailEvent) -> Result<(), MessagingError>;
}

/// Fire-and-forget publisher over a bounded tokio channel
#[derive(Clone)]
pub struct ChannelEmailPublisher {
    tx: mpsc::Sender<EmailEvent>,
}

impl ChannelEmailPublisher {
    /// Create a publisher and the receiving half of its queue
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EmailEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EmailPublisher for ChannelEmailPublisher {
    async fn publish_email(&self, event: EmailEvent) -> Result<(), MessagingError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MessagingError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => MessagingError::Closed,
        })
    }
}

/// Drain the queue, logging each event. Ends when every publisher is dropped.
pub fn spawn_email_logger(mut rx: mpsc::Receiver<EmailEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Email consumer started");
        while let Some(event) = rx.recv().await {
            tracing::info!(
                to = %event.to,
                template = %event.template,
                subject = %event.subject,
                "Email event dequeued"
            );
        }
        tracing::info!("Email consumer stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_event() {
        let event = EmailEvent::confirmation("a@x.com", "https://example.com/confirm?token=t");

        assert_eq!(event.to, "a@x.com");
        assert_eq!(event.template, EMAIL_CONFIRMATION_TEMPLATE);
        assert_eq!(
            event.data["confirmation_url"],
            "https://example.com/confirm?token=t"
        );
        assert_eq!(event.data["user_email"], "a@x.com");
    }

    #[test]
    fn test_email_event_serialization() {
        let event = EmailEvent::confirmation("a@x.com", "https://example.com/c");
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains(r#""template":"email_confirmation""#));
        assert!(json.contains("https://example.com/c"));
    }

    #[tokio::test]
    async fn test_channel_publisher_delivers() {
        let (publisher, mut rx) = ChannelEmailPublisher::new(4);
        let event = EmailEvent::confirmation("a@x.com", "https://example.com/c");

        publisher.publish_email(event.clone()).await.unwrap();

        assert_eq!(rx.recv().await, Some(event));
    }

    #[tokio::test]
    async fn test_channel_publisher_full_queue() {
        let (publisher, _rx) = ChannelEmailPublisher::new(1);
        let event = EmailEvent::confirmation("a@x.com", "https://example.com/c");

        publisher.publish_email(event.clone()).await.unwrap();
        let result = publisher.publish_email(event).await;

        assert!(matches!(result, Err(MessagingError::QueueFull)));
    }

    #[tokio::test]
    async fn test_channel_publisher_closed_queue() {
        let (publisher, rx) = ChannelEmailPublisher::new(1);
        drop(rx);

        let result = publisher
            .publish_email(EmailEvent::confirmation("a@x.com", "u"))
            .await;

        assert!(matches!(result, Err(MessagingError::Closed)));
    }

    #[tokio::test]
    async fn test_email_logger_stops_when_publishers_dropped() {
        let (publisher, rx) = ChannelEmailPublisher::new(4);
        let handle = spawn_email_logger(rx);

        publisher
            .publish_email(EmailEvent::confirmation("a@x.com", "u"))
            .await
            .unwrap();
        drop(publisher);

        handle.await.unwrap();
    }
}
