//! Outbound letters: SMTP when credentials exist, the log otherwise.

use crate::config::Config;
use crate::estimator::format_transit_time;
use crate::registry::EmailJob;
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("could not build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("smtp transport: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// A rendered letter, ready to hand to a [`Mailer`].
#[derive(Debug, Clone, PartialEq)]
pub struct Letter {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub transit_time: String,
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

impl Letter {
    pub fn for_job(job: &EmailJob) -> Self {
        let transit_time = format_transit_time(job.delivery_time_seconds);
        let body = escape_html(&job.message).replace('\n', "<br>");
        let html = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <div style="background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); padding: 20px; text-align: center;">
    <h1 style="color: white; margin: 0;">SnailMail Delivery</h1>
  </div>
  <div style="padding: 20px; background: #f9f9f9;">
    <p style="font-size: 14px; color: #666;">
      Delivered via: <strong>{mode}</strong><br>
      Delivery time: <strong>{transit_time}</strong>
    </p>
    <div style="background: white; padding: 20px; border-radius: 8px; margin-top: 20px;">
      {body}
    </div>
    <p style="font-size: 12px; color: #999; margin-top: 20px; text-align: center;">
      Because sometimes, anticipation is better than instant gratification.
    </p>
  </div>
</div>"#,
            mode = job.transport_mode,
        );

        Letter {
            from: job.from.clone(),
            to: job.to.clone(),
            subject: format!("[SnailMail via {}] {}", job.transport_mode, job.subject),
            text: job.message.clone(),
            html,
            transit_time,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, letter: &Letter) -> Result<(), MailError>;

    /// Whether the transport is configured and reachable.
    async fn verify(&self) -> Result<bool, MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(host: &str, port: u16, user: &str, pass: &str) -> Result<Self, MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
            .port(port)
            .credentials(Credentials::new(user.to_string(), pass.to_string()))
            .build();
        Ok(SmtpMailer { transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, letter: &Letter) -> Result<(), MailError> {
        let message = Message::builder()
            .from(letter.from.parse::<Mailbox>()?)
            .to(letter.to.parse::<Mailbox>()?)
            .subject(letter.subject.as_str())
            .multipart(MultiPart::alternative_plain_html(
                letter.text.clone(),
                letter.html.clone(),
            ))?;

        self.transport.send(message).await?;
        Ok(())
    }

    async fn verify(&self) -> Result<bool, MailError> {
        Ok(self.transport.test_connection().await?)
    }
}

/// Prints letters to the log instead of sending them.
pub struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn send(&self, letter: &Letter) -> Result<(), MailError> {
        info!(
            from = %letter.from,
            to = %letter.to,
            subject = %letter.subject,
            delivery_time = %letter.transit_time,
            "SnailMail delivery\n{}",
            letter.text
        );
        Ok(())
    }

    async fn verify(&self) -> Result<bool, MailError> {
        Ok(false)
    }
}

pub fn from_config(config: &Config) -> Result<Arc<dyn Mailer>, MailError> {
    match config.smtp_credentials() {
        Some((user, pass)) => Ok(Arc::new(SmtpMailer::new(
            &config.smtp_host,
            config.smtp_port,
            user,
            pass,
        )?)),
        None => {
            warn!("Email credentials not configured, letters will only be logged");
            Ok(Arc::new(ConsoleMailer))
        }
    }
}
