//! Outbound email collaborator.
//!
//! Delivery mechanics live outside this service; the domain only composes
//! messages and hands them to a [`Mailer`].

use async_trait::async_trait;
use serde::Serialize;

/// An email addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub title: String,
    pub username: String,
    pub message: String,
}

impl Email {
    /// Render the HTML body shared by every transactional email.
    pub fn html(&self) -> String {
        let year = crate::utils::now().year();
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{subject}</title>
</head>
<body style="font-family: Arial, sans-serif; background-color: #f4f4f4;">
    <div style="max-width: 600px; margin: 20px auto; background: #ffffff; padding: 20px; border-radius: 8px;">
        <div style="background: #007bff; color: white; text-align: center; padding: 10px;">
            <h2>{title}</h2>
        </div>
        <div style="padding: 20px; font-size: 16px; color: #333;">
            <p>Hello <b>{username}</b>,</p>
            <p>{message}</p>
        </div>
        <div style="text-align: center; padding: 10px; font-size: 14px; color: #666;">
            <p>&copy; {year} Online Bookstore. All rights reserved.</p>
        </div>
    </div>
</body>
</html>
"#,
            subject = self.subject,
            title = self.title,
            username = self.username,
            message = self.message,
        )
    }
}

/// Sends transactional email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> anyhow::Result<()>;
}

/// Mailer that records deliveries in the log instead of talking to an SMTP
/// relay.
#[derive(Debug, Clone)]
pub struct LogMailer {
    from: String,
    enabled: bool,
}

impl LogMailer {
    pub fn new(from: impl Into<String>, enabled: bool) -> Self {
        Self {
            from: from.into(),
            enabled,
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        if email.to.trim().is_empty() {
            anyhow::bail!("No recipient email provided");
        }
        if !self.enabled {
            tracing::debug!(
                to = %email.to,
                subject = %email.subject,
                "mail disabled, message dropped"
            );
            return Ok(());
        }

        let body = email.html();
        tracing::info!(
            target: "bookstore::mail",
            from = %self.from,
            to = %email.to,
            subject = %email.subject,
            bytes = body.len(),
            "email dispatched"
        );
        Ok(())
    }
}
