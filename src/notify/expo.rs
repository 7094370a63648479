use reqwest::{header::ACCEPT, Client};
use rocket::serde::json::Value;
use serde::Serialize;
use thiserror::Error;

use crate::error::Error;
use crate::store::PushTokens;

use super::{Notification, Notifier};

/// Expo's push notification endpoint.
pub const EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

/// Expo rejects requests carrying more messages than this.
const MAX_MESSAGES_PER_REQUEST: usize = 100;

#[derive(Debug, Error)]
enum DeliveryError {
    #[error("Failed to look up push tokens: {0}")]
    Tokens(#[from] Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// One message in an Expo push request.
#[derive(Debug, Serialize)]
struct PushMessage {
    to: String,
    sound: &'static str,
    title: &'static str,
    body: String,
    data: Value,
    priority: &'static str,
}

/// Build one message per device token.
fn push_messages(notification: &Notification, tokens: Vec<String>) -> Vec<PushMessage> {
    let body = notification.body();
    let data = notification.data();
    tokens
        .into_iter()
        .map(|to| PushMessage {
            to,
            sound: "default",
            title: notification.title(),
            body: body.clone(),
            data: data.clone(),
            priority: "high",
        })
        .collect()
}

/// Sends notifications to members' devices through Expo.
///
/// Each dispatch runs in its own task; failures are logged, never returned.
#[derive(Clone)]
pub struct ExpoPushNotifier {
    http: Client,
    url: String,
    tokens: PushTokens,
}

impl ExpoPushNotifier {
    pub fn new(url: impl Into<String>, tokens: PushTokens) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
            tokens,
        }
    }

    /// Deliver a notification, returning how many devices it was sent to.
    ///
    /// Messages go out in batches; a failed batch is logged and does not
    /// stop the others.
    async fn deliver(&self, notification: &Notification) -> Result<usize, DeliveryError> {
        let kind = notification.kind();
        let tokens = self.tokens.tokens_for(notification.recipients()).await?;
        if tokens.is_empty() {
            debug!("No push tokens registered for {kind} recipients");
            return Ok(0);
        }

        let messages = push_messages(notification, tokens);
        let mut sent = 0;
        for batch in messages.chunks(MAX_MESSAGES_PER_REQUEST) {
            match self.send(batch).await {
                Ok(()) => sent += batch.len(),
                Err(e) => warn!(
                    "Failed to deliver {kind} notification to {} device(s): {e}",
                    batch.len()
                ),
            }
        }
        Ok(sent)
    }

    async fn send(&self, batch: &[PushMessage]) -> Result<(), DeliveryError> {
        self.http
            .post(&self.url)
            .header(ACCEPT, "application/json")
            .json(batch)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl Notifier for ExpoPushNotifier {
    fn dispatch(&self, notification: Notification) {
        let notifier = self.clone();
        rocket::tokio::spawn(async move {
            let kind = notification.kind();
            match notifier.deliver(&notification).await {
                Ok(0) => {}
                Ok(sent) => info!("Sent {kind} notification to {sent} device(s)"),
                Err(e) => warn!("Failed to deliver {kind} notification: {e}"),
            }
        });
    }
}
