//! SMTP notifier (STARTTLS relay, e.g. Gmail on port 587)

use crate::io::notifier::{Notification, Notifier, NotifyError};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Display name on the From header
    pub from_name: String,
    pub destination: String,
    pub timeout: Duration,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from_name: "Home Alerts".to_string(),
            destination: String::new(),
            timeout: Duration::from_secs(20),
        }
    }
}

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let from_address: Address = config
            .username
            .parse()
            .map_err(|e| NotifyError::Message(format!("sender {:?}: {}", config.username, e)))?;
        let to_address: Address = config
            .destination
            .parse()
            .map_err(|e| NotifyError::Message(format!("destination {:?}: {}", config.destination, e)))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .port(config.port)
            .credentials(Credentials::new(config.username.clone(), config.password.clone()))
            .timeout(Some(config.timeout))
            .build();

        info!(host = %config.host, port = %config.port, to = %config.destination, "smtp_notifier_initialized");

        Ok(Self {
            transport,
            from: Mailbox::new(Some(config.from_name.clone()), from_address),
            to: Mailbox::new(None, to_address),
        })
    }

    fn build_message(&self, notification: &Notification) -> Result<Message, NotifyError> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(notification.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|e| NotifyError::Message(e.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = self.build_message(notification)?;
        self.transport.send(message).await.map_err(|e| NotifyError::Transport(e.to_string()))?;
        info!(to = %self.to, subject = %notification.subject, "email_sent");
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "smtp"
    }
}
