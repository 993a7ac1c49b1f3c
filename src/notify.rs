use chrono::{DateTime, Utc};
use rocket::tokio;
use rocket::tokio::sync::broadcast;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;

/// Capacity of the in-process notification channel. Slow SSE consumers that
/// lag behind this many events miss the older ones.
const NOTIFICATION_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    ApplicationReceived { class_id: Uuid, applicant: Uuid },
    ApplicationApproved { class_id: Uuid, lesson_id: Uuid },
    ApplicationRejected { class_id: Uuid },
    LessonUpdated { lesson_id: Uuid },
    LessonRemoved { lesson_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub recipient: Uuid,
    #[serde(flatten)]
    pub kind: NotificationKind,
    pub message: String,
    pub created: DateTime<Utc>,
}

impl Notification {
    pub fn new(recipient: Uuid, kind: NotificationKind, message: impl ToString) -> Notification {
        Notification {
            recipient,
            kind,
            message: message.to_string(),
            created: Utc::now(),
        }
    }
}

/// Best-effort mail delivery through a JSON mail API. No retries; failures
/// are logged and swallowed.
#[derive(Debug, Clone)]
pub struct Mailer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Debug, Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

impl Mailer {
    pub fn from_config(c: &Config) -> Option<Mailer> {
        let api_url = c.mail_api_url.clone()?;
        Some(Mailer {
            client: reqwest::Client::new(),
            api_url,
            api_key: c.mail_api_key.clone(),
            from: c.mail_from.clone(),
        })
    }

    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), reqwest::Error> {
        let mut request = self.client.post(&self.api_url).json(&MailRequest {
            from: &self.from,
            to,
            subject,
            body,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        request.send().await?.error_for_status()?;
        Ok(())
    }
}

/// Fans events out to the real-time push channel and, when addressed, the
/// mail channel. Fire-and-forget: dispatch failures never affect the outcome
/// of the mutation that triggered them.
#[derive(Debug)]
pub struct Notifier {
    events: broadcast::Sender<Notification>,
    mailer: Option<Mailer>,
}

impl Notifier {
    pub fn new(mailer: Option<Mailer>) -> Notifier {
        let (events, _receiver) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        Notifier { events, mailer }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }

    pub fn push(&self, notification: Notification) {
        tracing::debug!(
            "notifying {}: {}",
            notification.recipient,
            notification.message
        );
        if self.events.send(notification).is_err() {
            // No connected receivers; nothing to deliver to.
            tracing::trace!("notification dropped, no active subscribers");
        }
    }

    pub fn push_with_email(&self, notification: Notification, to: impl ToString, subject: impl ToString) {
        if let Some(mailer) = self.mailer.clone() {
            let to = to.to_string();
            let subject = subject.to_string();
            let body = notification.message.clone();
            tokio::spawn(async move {
                if let Err(e) = mailer.send(&to, &subject, &body).await {
                    tracing::warn!("unable to deliver mail to {}: {}", to, e);
                }
            });
        }

        self.push(notification);
    }

    /// Plain mail without an attached push event (password recovery).
    pub fn email(&self, to: impl ToString, subject: impl ToString, body: impl ToString) {
        let Some(mailer) = self.mailer.clone() else {
            tracing::debug!("mail delivery not configured, skipping message to {}", to.to_string());
            return;
        };

        let to = to.to_string();
        let subject = subject.to_string();
        let body = body.to_string();
        tokio::spawn(async move {
            if let Err(e) = mailer.send(&to, &subject, &body).await {
                tracing::warn!("unable to deliver mail to {}: {}", to, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_without_subscribers_is_a_noop() {
        let notifier = Notifier::new(None);
        let recipient = Uuid::new_v4();

        notifier.push(Notification::new(
            recipient,
            NotificationKind::ApplicationRejected {
                class_id: Uuid::new_v4(),
            },
            "Your application was rejected.",
        ));
    }

    #[rocket::async_test]
    async fn subscribers_receive_pushed_notifications() {
        let notifier = Notifier::new(None);
        let recipient = Uuid::new_v4();
        let mut events = notifier.subscribe();

        notifier.push(Notification::new(
            recipient,
            NotificationKind::LessonUpdated {
                lesson_id: Uuid::new_v4(),
            },
            "Your lesson was rescheduled.",
        ));

        let received = events.recv().await.expect("notification arrives");
        assert_eq!(received.recipient, recipient);
        assert_eq!(received.message, "Your lesson was rescheduled.");
    }

    #[test]
    fn notification_serializes_with_kind_tag() {
        let n = Notification::new(
            Uuid::new_v4(),
            NotificationKind::ApplicationReceived {
                class_id: Uuid::new_v4(),
                applicant: Uuid::new_v4(),
            },
            "New application.",
        );

        let value = serde_json::to_value(&n).expect("notification serializes");
        assert_eq!(value["kind"], "application_received");
        assert!(value["class_id"].is_string());
    }
}
