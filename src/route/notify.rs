use rocket::response::stream::{Event, EventStream};
use rocket::tokio::select;
use rocket::tokio::sync::broadcast::error::RecvError;
use rocket::{Shutdown, State};

use crate::notify::Notifier;
use crate::resp::jwt::UserRoleToken;

/// Server-sent event stream of notifications addressed to the authenticated
/// user. Events carry the serialized [`Notification`](crate::notify::Notification).
#[get("/notifications")]
pub fn notification_stream(
    auth: UserRoleToken,
    notifier: &State<Notifier>,
    mut end: Shutdown,
) -> EventStream![] {
    let mut events = notifier.subscribe();

    EventStream! {
        loop {
            let notification = select! {
                event = events.recv() => match event {
                    Ok(notification) => notification,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("notification stream lagged, skipped {} events", skipped);
                        continue;
                    },
                    Err(RecvError::Closed) => break,
                },
                _ = &mut end => break,
            };

            if notification.recipient != auth.user {
                continue;
            }

            match serde_json::to_string(&notification) {
                Ok(json) => yield Event::data(json),
                Err(e) => tracing::error!("unable to serialize notification: {}", e),
            }
        }
    }
}
