use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::forms::ValidationErrors;
use crate::models::{Ad, AdSearch, UserId};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A user wrote to the owner of an ad.
    UserMessage {
        ad: Ad,
        sender: UserId,
        recipient: UserId,
        message: String,
    },
    /// An ad owner invites the owner of a matching saved search to get in touch.
    VendorMessage {
        ad: Ad,
        ad_search: AdSearch,
        buyer: UserId,
        message: String,
    },
    /// An ad submission failed validation; operators get the errors.
    InvalidAdForm {
        user: UserId,
        errors: ValidationErrors,
    },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Pushes onto an in-process queue.
#[derive(Clone)]
pub struct QueueNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

/// New queue; the receiver goes to [`spawn_delivery`] (or a test).
pub fn queue() -> (QueueNotifier, NotificationReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueNotifier { tx }, rx)
}

impl Notifier for QueueNotifier {
    fn notify(&self, notification: Notification) {
        if let Err(e) = self.tx.send(notification) {
            warn!("Notification dropped, delivery worker is gone: {:?}", e.0);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Drains `rx` into `delivery` until every sender is dropped.
pub fn spawn_delivery(mut rx: NotificationReceiver, delivery: Arc<dyn Delivery>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            if let Err(e) = delivery.deliver(&notification).await {
                warn!("Notification not delivered: {}", e);
            }
        }
        info!("Notification queue closed");
    })
}

/// An outgoing e-mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Composes the e-mail for each notification and writes it to the log.
pub struct LogMailer {
    site_name: String,
    operator_email: String,
}

impl LogMailer {
    pub fn new(site_name: impl Into<String>, operator_email: impl Into<String>) -> Self {
        Self {
            site_name: site_name.into(),
            operator_email: operator_email.into(),
        }
    }

    pub fn compose(&self, notification: &Notification) -> Mail {
        match notification {
            Notification::UserMessage {
                ad,
                sender,
                recipient,
                message,
            } => Mail {
                to: format!("user:{}", recipient),
                subject: format!("[{}] New message about {}", self.site_name, ad.slug),
                body: format!("User {} wrote about your ad {}:\n\n{}", sender, ad.slug, message),
            },
            Notification::VendorMessage {
                ad,
                ad_search,
                buyer,
                message,
            } => Mail {
                to: format!("user:{}", buyer),
                subject: format!(
                    "[{}] An ad matches your saved search #{}",
                    self.site_name, ad_search.id
                ),
                body: format!(
                    "The owner of {} thinks it matches your search.\n\n{}",
                    ad.slug, message
                ),
            },
            Notification::InvalidAdForm { user, errors } => Mail {
                to: self.operator_email.clone(),
                subject: format!(
                    "[{}] user {} invalid form while creating an ad",
                    self.site_name, user
                ),
                body: errors.to_string(),
            },
        }
    }
}

#[async_trait]
impl Delivery for LogMailer {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let mail = self.compose(notification);
        info!("Mail to {}: {}\n{}", mail.to, mail.subject, mail.body);
        Ok(())
    }
}
