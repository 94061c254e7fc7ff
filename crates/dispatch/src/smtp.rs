//! Email dispatcher (SMTP submission via lettre).

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::extension::ClientId;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as Email, Tokio1Executor};
use uuid::Uuid;

use herald_common::types::{
    LABEL_NOTIFICATION_TYPE, LABEL_RECIPIENT, LABEL_TITLE, Labels, NotificationMethod,
};

use crate::{Dispatcher, SendError};

/// SMTP smarthost settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Smarthost to submit through.
    pub host: String,
    /// Smarthost port.
    pub port: u16,
    /// Sender address for all outbound mail.
    pub from: String,
    /// Hostname sent in the HELO/EHLO.
    pub hello: String,
    /// Optional credentials.
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Sends notifications as email through a configured smarthost, embedding
/// the message ID as the `Message-ID` correlation header.
pub struct SmtpDispatcher {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpDispatcher {
    pub fn new(config: SmtpConfig) -> Self {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.host.as_str())
                .port(config.port)
                .hello_name(ClientId::Domain(config.hello.clone()));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let transport = builder.build();
        Self { config, transport }
    }

    fn build_body(&self, input: &Labels) -> String {
        let mut body = format!(
            "{}\n\nNotification: {}\n",
            input.get(LABEL_TITLE),
            input.get(LABEL_NOTIFICATION_TYPE)
        );
        for (key, value) in input.iter() {
            if matches!(key, LABEL_RECIPIENT | LABEL_TITLE | LABEL_NOTIFICATION_TYPE) {
                continue;
            }
            body.push_str(&format!("{key}: {value}\n"));
        }
        body
    }
}

#[async_trait]
impl Dispatcher for SmtpDispatcher {
    fn method(&self) -> NotificationMethod {
        NotificationMethod::Smtp
    }

    fn validate(&self, input: &Labels) -> Result<(), Vec<String>> {
        let missing = input.missing(&[LABEL_RECIPIENT]);
        if missing.is_empty() { Ok(()) } else { Err(missing) }
    }

    async fn send(&self, msg_id: Uuid, input: &Labels) -> Result<(), SendError> {
        // Address problems cannot be fixed by retrying.
        let from: Mailbox = self
            .config
            .from
            .parse()
            .map_err(|e| SendError::Permanent(format!("invalid from address: {e}")))?;
        let to: Mailbox = input
            .get(LABEL_RECIPIENT)
            .parse()
            .map_err(|e| SendError::Permanent(format!("invalid recipient address: {e}")))?;

        let email = Email::builder()
            .from(from)
            .to(to)
            .subject(input.get(LABEL_TITLE))
            .message_id(Some(msg_id.to_string()))
            .header(ContentType::TEXT_PLAIN)
            .body(self.build_body(input))
            .map_err(|e| SendError::Permanent(format!("build email: {e}")))?;

        match self.transport.send(email).await {
            Ok(_) => {
                tracing::debug!(msg_id = %msg_id, "Email submitted");
                Ok(())
            }
            Err(e) if e.is_permanent() => Err(SendError::Permanent(format!("SMTP send: {e}"))),
            Err(e) => Err(SendError::Retryable(format!("SMTP send: {e}"))),
        }
    }
}
