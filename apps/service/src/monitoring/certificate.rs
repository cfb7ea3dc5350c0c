use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::database::models::SslInfo;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Fields read from a peer's leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub issuer: String,
    pub subject: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

impl Certificate {
    /// Snapshot of this certificate as seen at `now`
    pub fn snapshot(&self, now: DateTime<Utc>) -> SslInfo {
        SslInfo {
            issuer: self.issuer.clone(),
            subject: self.subject.clone(),
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            days_remaining: days_remaining(now, self.valid_to, now),
        }
    }
}

/// Whole days between `start` and `end`, negative when `end` is before `now`.
pub fn days_remaining(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let span = (end - start).num_milliseconds().abs() as f64;
    let days = (span / MILLIS_PER_DAY).round() as i64;
    if end < now { -days } else { days }
}

#[async_trait]
pub trait CertificateProber: Send + Sync {
    /// Fetch the leaf certificate presented by `target`.
    async fn fetch(&self, target: &str) -> Result<Certificate>;
}

/// Reads certificates over a real TLS handshake
///
/// Validation is disabled so that expired or self-signed certificates can still
/// be inspected.
#[derive(Debug, Clone)]
pub struct TlsCertificateProber {
    timeout: Duration,
}

impl TlsCertificateProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TlsCertificateProber {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

/// Watches are often registered as bare hostnames
fn https_url(target: &str) -> String {
    let target = target.trim();
    if target.contains("://") { target.to_string() } else { format!("https://{target}") }
}

#[async_trait]
impl CertificateProber for TlsCertificateProber {
    async fn fetch(&self, target: &str) -> Result<Certificate> {
        let url = https_url(target);
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(true)
            .tls_info(true)
            .build()?;

        let response = client.head(&url).send().await.with_context(|| format!("TLS handshake with {url} failed"))?;

        let der = response
            .extensions()
            .get::<reqwest::tls::TlsInfo>()
            .and_then(|info| info.peer_certificate())
            .ok_or_else(|| anyhow!("{url} did not present a certificate"))?;

        parse_certificate(der)
    }
}

/// Decode a DER encoded X.509 certificate
pub fn parse_certificate(der: &[u8]) -> Result<Certificate> {
    let (_, cert) =
        x509_parser::parse_x509_certificate(der).map_err(|e| anyhow!("Failed to parse certificate: {e}"))?;

    let validity = cert.validity();
    let valid_from = DateTime::from_timestamp(validity.not_before.timestamp(), 0)
        .ok_or_else(|| anyhow!("Certificate notBefore out of range"))?;
    let valid_to = DateTime::from_timestamp(validity.not_after.timestamp(), 0)
        .ok_or_else(|| anyhow!("Certificate notAfter out of range"))?;

    Ok(Certificate {
        issuer: cert.issuer().to_string(),
        subject: cert.subject().to_string(),
        valid_from,
        valid_to,
    })
}
