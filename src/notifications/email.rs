//! Outbound email delivery over SMTP.
//!
//! The mailer is optional: [`Mailer::from_config`] returns `None` when no
//! SMTP host is configured, and callers treat an absent mailer as "email
//! disabled". Delivery is at-most-once with no retry queue.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SmtpConfig;
use crate::metrics;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build email message: {0}")]
    Build(String),
}

/// SMTP mailer for transactional messages.
#[derive(Clone)]
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl Mailer {
    /// Builds a mailer from application config. Returns `Ok(None)` when no
    /// SMTP host is configured so callers can treat email as disabled.
    pub fn from_config(config: &SmtpConfig) -> Result<Option<Self>, EmailError> {
        let Some(host) = config.host.as_deref().filter(|h| !h.is_empty()) else {
            info!("SMTP host not configured, email delivery disabled");
            return Ok(None);
        };

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        info!(host = %host, port = config.port, "SMTP mailer configured");
        Ok(Some(Self {
            transport: builder.build(),
            from_address: config.from_address.clone(),
        }))
    }

    /// Sends a plain-text message to a single recipient.
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(self.from_address.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| EmailError::Build(e.to_string()))?;

        if let Err(e) = self.transport.send(email).await {
            metrics::EMAILS_FAILED_TOTAL.inc();
            return Err(e.into());
        }
        metrics::EMAILS_SENT_TOTAL.inc();
        debug!(to = %to, subject = %subject, "email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailer_disabled_without_host() {
        let config = SmtpConfig::default();
        let mailer = Mailer::from_config(&config).unwrap();
        assert!(mailer.is_none());
    }

    #[test]
    fn mailer_enabled_with_host() {
        let config = SmtpConfig {
            host: Some("smtp.shop.example.com".into()),
            port: 587,
            username: Some("mailer".into()),
            password: Some("secret".into()),
            from_address: "no-reply@shop.example.com".into(),
        };
        let mailer = Mailer::from_config(&config).unwrap();
        assert!(mailer.is_some());
    }

    #[test]
    fn blank_host_counts_as_disabled() {
        let config = SmtpConfig {
            host: Some(String::new()),
            ..SmtpConfig::default()
        };
        let mailer = Mailer::from_config(&config).unwrap();
        assert!(mailer.is_none());
    }
}
