use std::{collections::VecDeque, sync::Arc};

use askama::Template;
use lettre::{
    message::Mailbox,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tokio::sync::Mutex;

use crate::{
    config::{Config, Env},
    errors::AppError,
    log_and_wrap_custom_internal,
};

/// Older emails fall out of the outbox once it is full.
const OUTBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone)]
enum Transport {
    Smtp(Arc<AsyncSmtpTransport<Tokio1Executor>>),
    Outbox(Arc<Mutex<VecDeque<SentEmail>>>),
}

#[derive(Clone)]
pub struct Mailer {
    transport: Transport,
    sender: String,
    subject_prefix: String,
}

impl Mailer {
    pub fn new(config: &Config) -> Self {
        let transport = match config.env {
            Env::Production => {
                let creds =
                    Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());
                let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_relay)
                    .expect("Something went wrong with the smtp transport for the Mailer")
                    .port(config.smtp_port)
                    .credentials(creds)
                    .build();
                Transport::Smtp(Arc::new(mailer))
            }
            Env::Development | Env::Test => Transport::Outbox(Arc::default()),
        };
        Self {
            transport,
            sender: config.mail_sender.clone(),
            subject_prefix: config.mail_subject_prefix.clone(),
        }
    }

    pub async fn send_template<T: Template>(
        &self,
        to: &str,
        subject: &str,
        template: &T,
    ) -> Result<(), AppError> {
        let body = template.render()?;
        self.send(to, subject, body).await
    }

    pub async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), AppError> {
        let subject = format!("{} {}", self.subject_prefix, subject);
        let from: Mailbox = self
            .sender
            .parse()
            .map_err(|e: lettre::address::AddressError| log_and_wrap_custom_internal!(e))?;
        let recipient: Mailbox = to
            .parse()
            .map_err(|_| AppError::custom_bad_request("Invalid email address"))?;

        match &self.transport {
            Transport::Smtp(smtp) => {
                let message = Message::builder()
                    .from(from)
                    .to(recipient)
                    .subject(subject)
                    .body(body)
                    .map_err(|e| log_and_wrap_custom_internal!(e))?;
                smtp.send(message)
                    .await
                    .map_err(|e| log_and_wrap_custom_internal!(e))?;
            }
            Transport::Outbox(outbox) => {
                tracing::info!(%to, %subject, "email kept in the outbox");
                tracing::debug!(%body);
                let mut outbox = outbox.lock().await;
                if outbox.len() == OUTBOX_CAPACITY {
                    outbox.pop_front();
                }
                outbox.push_back(SentEmail {
                    to: to.to_owned(),
                    subject,
                    body,
                });
            }
        }
        Ok(())
    }

    /// Emails kept in memory, empty when sending through SMTP.
    pub async fn outbox(&self) -> Vec<SentEmail> {
        match &self.transport {
            Transport::Smtp(_) => Vec::new(),
            Transport::Outbox(outbox) => outbox.lock().await.iter().cloned().collect(),
        }
    }
}
