//! Email delivery of lending notifications

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};

use super::effects::{Notification, NotificationSink};
use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
    repository::UsersStore,
};

#[derive(Clone)]
pub struct EmailNotifier {
    config: EmailConfig,
    users: Arc<dyn UsersStore>,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig, users: Arc<dyn UsersStore>) -> Self {
        Self { config, users }
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> AppResult<Message> {
        let from_name = self.config.smtp_from_name.as_deref().unwrap_or("Campus Library");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Internal(format!("Invalid to address: {}", e)))?;

        Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body(body)),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))
    }

    fn transport(&self) -> AppResult<SmtpTransport> {
        let builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let builder = match (&self.config.smtp_username, &self.config.smtp_password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(builder.build())
    }
}

#[async_trait]
impl NotificationSink for EmailNotifier {
    async fn notify(&self, n: &Notification) -> AppResult<()> {
        let user = self
            .users
            .get(n.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", n.user_id)))?;

        let Some(address) = user.email.as_deref() else {
            tracing::debug!(user_id = user.id, "no email address, notification not sent");
            return Ok(());
        };

        let body = format!("Hello {},\n\n{}\n", user.display_name(), n.message);
        let message = self.build_message(address, n.kind.subject(), &body)?;
        let mailer = self.transport()?;

        // lettre's SMTP transport is blocking
        tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .map_err(|e| AppError::Internal(format!("Email task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?;

        Ok(())
    }
}

fn html_body(text: &str) -> String {
    format!(
        r#"<html><body><p>{}</p></body></html>"#,
        html_escape(text).replace('\n', "<br>")
    )
}

/// Escape HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_in_messages_is_escaped() {
        let html = html_body("Hello <b>Ana</b>,\n\nFees & fines: \"Atlas\"");
        assert_eq!(
            html,
            "<html><body><p>Hello &lt;b&gt;Ana&lt;/b&gt;,<br><br>Fees &amp; fines: &quot;Atlas&quot;</p></body></html>"
        );
    }

    #[test]
    fn ampersands_are_escaped_once() {
        assert_eq!(html_escape("&lt;"), "&amp;lt;");
        assert_eq!(html_escape("O'Brien"), "O&#x27;Brien");
    }
}
