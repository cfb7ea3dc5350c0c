use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Template variables handed to the mail renderer
pub type EmailLocals = BTreeMap<String, String>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to send email: {0}")]
    SendFailed(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Delivers one templated message to one recipient.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, template: &str, address: &str, locals: &EmailLocals) -> Result<(), TransportError>;
}

/// Writes every message to the log instead of delivering it
#[derive(Debug, Default, Clone)]
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    async fn send(&self, template: &str, address: &str, locals: &EmailLocals) -> Result<(), TransportError> {
        info!(template, to = address, ?locals, "Email notification");
        Ok(())
    }
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    template: &'a str,
    to: &'a str,
    locals: &'a EmailLocals,
}

/// POSTs `{template, to, locals}` as JSON to a mail relay
pub struct WebhookTransport {
    client: Client,
    url: String,
}

impl WebhookTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { client: Client::new(), url: url.into() }
    }
}

#[async_trait]
impl EmailTransport for WebhookTransport {
    async fn send(&self, template: &str, address: &str, locals: &EmailLocals) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.url)
            .json(&RelayPayload { template, to: address, locals })
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::SendFailed(format!("relay answered {}", response.status())))
        }
    }
}

/// A message captured by [`RecordingTransport`]
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub template: String,
    pub address: String,
    pub locals: EmailLocals,
}

/// Keeps every message in memory; addresses listed in `failing` are rejected
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentEmail>>,
    failing: Vec<String>,
}

#[cfg(test)]
impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(addresses: &[&str]) -> Self {
        Self { sent: Mutex::default(), failing: addresses.iter().map(|a| a.to_string()).collect() }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl EmailTransport for RecordingTransport {
    async fn send(&self, template: &str, address: &str, locals: &EmailLocals) -> Result<(), TransportError> {
        if self.failing.iter().any(|a| a == address) {
            return Err(TransportError::SendFailed(format!("mailbox {address} unavailable")));
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentEmail { template: template.into(), address: address.into(), locals: locals.clone() });
        }
        Ok(())
    }
}
