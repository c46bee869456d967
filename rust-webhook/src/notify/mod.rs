//! Completion notification sender.
//!
//! Sends the one-time archive-complete email through the Mailgun HTTP API.
//! Behind a trait so the aggregator can be tested with a recording fake, and
//! so send failures stay a logged-only concern for callers.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::info;

/// A file attached to an outbound notification.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Outbound notification sender.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: &str,
        attachments: Vec<Attachment>,
    ) -> Result<()>;
}

/// Mailgun HTTP API sender.
pub struct MailgunNotifier {
    client: Client,
    base_url: String,
    domain: String,
    api_key: String,
    from: String,
}

impl MailgunNotifier {
    pub fn new(
        client: Client,
        base_url: String,
        domain: String,
        api_key: String,
        from: String,
    ) -> Self {
        Self {
            client,
            base_url,
            domain,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Notifier for MailgunNotifier {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: &str,
        attachments: Vec<Attachment>,
    ) -> Result<()> {
        let url = format!(
            "{}/v3/{}/messages",
            self.base_url.trim_end_matches('/'),
            self.domain
        );

        let mut form = Form::new()
            .text("from", self.from.clone())
            .text("to", to.to_string())
            .text("subject", subject.to_string())
            .text("text", text.to_string())
            .text("html", html.to_string());

        let attachment_count = attachments.len();
        for attachment in attachments {
            let part = Part::bytes(attachment.data)
                .file_name(attachment.file_name)
                .mime_str(&attachment.content_type)
                .context("Invalid attachment content type")?;
            form = form.part("attachment", part);
        }

        let response = self
            .client
            .post(&url)
            .basic_auth("api", Some(&self.api_key))
            .multipart(form)
            .send()
            .await
            .context("Failed to reach Mailgun")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Mailgun rejected message: {status} {body}"));
        }

        info!(
            to = %to,
            subject = %subject,
            attachments = attachment_count,
            "notification_sent"
        );

        Ok(())
    }
}
