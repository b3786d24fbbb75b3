//! Outbound sends. Stateless apart from recipient normalization; delivery is
//! whatever the protocol client reports. Sends are never retried here because
//! a repeated send is a second message.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info};

use crate::protocol::Session;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("recipient must not be empty")]
    EmptyRecipient,
    #[error("'{0}' is neither a phone number nor a full chat id")]
    InvalidRecipient(String),
    #[error("message text must not be empty")]
    EmptyMessage,
    #[error("session is not available ({0})")]
    SessionClosed(String),
    #[error("send timed out after {0}")]
    Timeout(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected by protocol client: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub success: bool,
    pub message: String,
}

/// Maps a recipient to a destination id. Anything with `@` is already fully
/// qualified; otherwise it must be a phone number (`+`, spaces and dashes are
/// tolerated) and gets the individual-chat suffix.
pub fn normalize_recipient(recipient: &str, individual_suffix: &str) -> Result<String, DispatchError> {
    let trimmed = recipient.trim();
    if trimmed.is_empty() {
        return Err(DispatchError::EmptyRecipient);
    }
    if trimmed.contains('@') {
        return Ok(trimmed.to_string());
    }

    let digits: String = trimmed
        .trim_start_matches('+')
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(DispatchError::InvalidRecipient(trimmed.to_string()));
    }
    Ok(format!("{}@{}", digits, individual_suffix))
}

pub struct Dispatcher {
    session: Arc<Session>,
    individual_suffix: String,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(session: Arc<Session>, individual_suffix: impl Into<String>, send_timeout: Duration) -> Self {
        Self {
            session,
            individual_suffix: individual_suffix.into(),
            send_timeout,
        }
    }

    pub async fn send(&self, recipient: &str, text: &str) -> SendOutcome {
        match self.try_send(recipient, text).await {
            Ok(detail) => SendOutcome {
                success: true,
                message: detail,
            },
            Err(e) => {
                error!("Dispatch: send to '{}' failed: {}", recipient, e);
                SendOutcome {
                    success: false,
                    message: e.to_string(),
                }
            }
        }
    }

    async fn try_send(&self, recipient: &str, text: &str) -> Result<String, DispatchError> {
        let destination = normalize_recipient(recipient, &self.individual_suffix)?;
        if text.trim().is_empty() {
            return Err(DispatchError::EmptyMessage);
        }
        let client = self
            .session
            .client()
            .ok_or_else(|| DispatchError::SessionClosed(format!("{:?}", self.session.state())))?;

        let receipt = timeout(self.send_timeout, client.send_text(&destination, text))
            .await
            .map_err(|_| DispatchError::Timeout(humantime::format_duration(self.send_timeout).to_string()))?
            .map_err(|e| DispatchError::Transport(format!("{:#}", e)))?;

        if !receipt.ok {
            return Err(DispatchError::Rejected(receipt.detail));
        }

        info!("Dispatch: message sent to {}", destination);
        Ok(if receipt.detail.is_empty() {
            format!("Message sent to {}", destination)
        } else {
            format!("Message sent to {}: {}", destination, receipt.detail)
        })
    }
}
