//! Outbound push gateway.
//!
//! The wire format follows the Expo push service: a JSON array of messages
//! in, `{ "data": [ticket, ...] }` out, one ticket per message in order.

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PushError;

pub const EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

/// Ticket error codes meaning the token will never work again.
const DEAD_TOKEN_ERRORS: &[&str] = &["DeviceNotRegistered", "InvalidCredentials"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    pub channel_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TicketDetails {
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushTicket {
    pub status: TicketStatus,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<TicketDetails>,
}

impl PushTicket {
    pub fn ok() -> Self {
        Self {
            status: TicketStatus::Ok,
            id: None,
            message: None,
            details: None,
        }
    }

    pub fn error(code: &str) -> Self {
        Self {
            status: TicketStatus::Error,
            id: None,
            message: Some(code.to_string()),
            details: Some(TicketDetails {
                error: Some(code.to_string()),
            }),
        }
    }

    /// True when the gateway reports the target as permanently undeliverable.
    pub fn is_dead_token(&self) -> bool {
        self.status == TicketStatus::Error
            && self
                .details
                .as_ref()
                .and_then(|d| d.error.as_deref())
                .is_some_and(|code| DEAD_TOKEN_ERRORS.contains(&code))
    }
}

pub trait PushGateway: Send + Sync {
    /// Whether this gateway can address `token` at all.
    fn accepts_token(&self, _token: &str) -> bool {
        true
    }

    /// Submits one batch; returns one ticket per message, in order.
    fn send_batch<'a>(
        &'a self,
        messages: &'a [PushMessage],
    ) -> BoxFuture<'a, Result<Vec<PushTicket>, PushError>>;
}

#[derive(Debug, Deserialize)]
struct ExpoResponse {
    #[serde(default)]
    data: Option<Vec<PushTicket>>,
    #[serde(default)]
    errors: Option<Vec<ExpoRequestError>>,
}

#[derive(Debug, Deserialize)]
struct ExpoRequestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub struct ExpoPushGateway {
    client: reqwest::Client,
    url: String,
    access_token: Option<String>,
}

impl ExpoPushGateway {
    pub fn new(url: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            access_token,
        }
    }

    async fn post(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>, PushError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(messages);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("Push gateway answered {} ({} bytes)", status, body.len());

        if !status.is_success() {
            return Err(PushError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        parse_tickets(&body, messages.len())
    }
}

impl PushGateway for ExpoPushGateway {
    fn accepts_token(&self, token: &str) -> bool {
        token.starts_with("ExponentPushToken[") || token.starts_with("ExpoPushToken[")
    }

    fn send_batch<'a>(
        &'a self,
        messages: &'a [PushMessage],
    ) -> BoxFuture<'a, Result<Vec<PushTicket>, PushError>> {
        Box::pin(self.post(messages))
    }
}

fn parse_tickets(body: &str, expected: usize) -> Result<Vec<PushTicket>, PushError> {
    let parsed: ExpoResponse =
        serde_json::from_str(body).map_err(|e| PushError::Decode(e.to_string()))?;

    if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
        let first = &errors[0];
        return Err(PushError::Rejected(format!(
            "{}: {}",
            first.code.as_deref().unwrap_or("UNKNOWN"),
            first.message.as_deref().unwrap_or("")
        )));
    }

    // Tickets line up with messages by index; a short list still covers
    // the messages it has entries for.
    let tickets = parsed.data.unwrap_or_default();
    if tickets.len() != expected {
        warn!("Push service returned {} tickets for {} messages", tickets.len(), expected);
    }
    Ok(tickets)
}
