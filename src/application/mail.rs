//! Outbound mail: the sender contract and the contact-form messages.

use askama::Template;
use async_trait::async_trait;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;

use crate::domain::Record;
use crate::domain::documents::ContactMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub reply_to: Option<String>,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport failed: {0}")]
    Transport(String),
    #[error("mail provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("failed to render mail template: {0}")]
    Template(#[from] askama::Error),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

#[derive(Template)]
#[template(path = "mail/contact_notification.txt")]
struct NotificationText<'a> {
    id: String,
    name: &'a str,
    email: &'a str,
    subject: &'a str,
    message: &'a str,
    received_at: String,
}

#[derive(Template)]
#[template(path = "mail/contact_notification.html")]
struct NotificationHtml<'a> {
    id: String,
    name: &'a str,
    email: &'a str,
    subject: &'a str,
    message: &'a str,
    received_at: String,
}

#[derive(Template)]
#[template(path = "mail/contact_auto_reply.txt")]
struct AutoReplyText<'a> {
    name: &'a str,
    subject: &'a str,
    signature: &'a str,
}

#[derive(Template)]
#[template(path = "mail/contact_auto_reply.html")]
struct AutoReplyHtml<'a> {
    name: &'a str,
    subject: &'a str,
    signature: &'a str,
}

/// Notice to the site owner about a new contact message.
pub fn contact_notification(
    message: &Record<ContactMessage>,
    admin_address: &str,
) -> Result<OutgoingMail, MailError> {
    let received_at = message
        .created_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| message.created_at.to_string());
    let data = &message.data;

    let text = NotificationText {
        id: message.id.to_string(),
        name: &data.name,
        email: &data.email,
        subject: &data.subject,
        message: &data.message,
        received_at: received_at.clone(),
    }
    .render()?;
    let html = NotificationHtml {
        id: message.id.to_string(),
        name: &data.name,
        email: &data.email,
        subject: &data.subject,
        message: &data.message,
        received_at,
    }
    .render()?;

    Ok(OutgoingMail {
        to: admin_address.to_string(),
        subject: format!("New contact message: {}", data.subject),
        text,
        html,
        reply_to: Some(data.email.clone()),
    })
}

/// Acknowledgement sent back to whoever filled in the contact form.
pub fn contact_auto_reply(
    message: &Record<ContactMessage>,
    signature: &str,
) -> Result<OutgoingMail, MailError> {
    let data = &message.data;
    let text = AutoReplyText {
        name: &data.name,
        subject: &data.subject,
        signature,
    }
    .render()?;
    let html = AutoReplyHtml {
        name: &data.name,
        subject: &data.subject,
        signature,
    }
    .render()?;

    Ok(OutgoingMail {
        to: data.email.clone(),
        subject: format!("Re: {}", data.subject),
        text,
        html,
        reply_to: None,
    })
}
