//! Transactional mail dispatch
//!
//! Course-reserve requests are delivered over the configured SMTP relay. In
//! dev mode the rendered message is logged instead of sent.

use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;

/// A fully-specified outbound message
#[derive(Debug, Clone)]
pub struct EmailRequest {
    pub subject: String,
    pub to: Vec<String>,
    pub reply_to: Option<String>,
    pub cc: Option<String>,
    pub from: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Mailer {
    cfg: SmtpConfig,
}

impl Mailer {
    pub fn new(cfg: SmtpConfig) -> Self {
        Self { cfg }
    }

    pub async fn send(&self, request: &EmailRequest) -> Result<()> {
        if self.cfg.dev_mode {
            tracing::info!("email is in dev mode; logging message instead of sending");
            tracing::info!("==================================================");
            tracing::info!("Subject: {}", request.subject);
            tracing::info!("To: {}", request.to.join(", "));
            tracing::info!("From: {}", request.from);
            if let Some(cc) = &request.cc {
                tracing::info!("Cc: {cc}");
            }
            tracing::info!("{}", request.body);
            tracing::info!("==================================================");
            return Ok(());
        }

        let mut builder = Message::builder()
            .subject(request.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .from(request.from.parse().context("invalid from address")?);
        for to in &request.to {
            builder = builder.to(to.parse().context("invalid to address")?);
        }
        if let Some(reply_to) = &request.reply_to {
            builder = builder.reply_to(reply_to.parse().context("invalid reply-to address")?);
        }
        if let Some(cc) = &request.cc {
            if !cc.is_empty() {
                builder = builder.cc(cc.parse().context("invalid cc address")?);
            }
        }
        let message = builder.body(request.body.clone())?;

        tracing::info!(
            "sending {} email to {}",
            request.subject,
            request.to.join(",")
        );
        let mut transport =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(self.cfg.host.as_str())
                .port(self.cfg.port);
        if !self.cfg.password.is_empty() {
            transport = transport.credentials(Credentials::new(
                self.cfg.user.clone(),
                self.cfg.password.clone(),
            ));
        } else {
            tracing::info!("sending email with no auth");
        }
        transport.build().send(message).await?;
        Ok(())
    }
}
