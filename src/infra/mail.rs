//! Mail senders.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::info;

use crate::application::mail::{MailError, Mailer, OutgoingMail};

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

/// Delivers mail through a transactional mail API that accepts a JSON POST
/// authorised with a bearer key.
#[derive(Clone, Debug)]
pub struct HttpMailer {
    client: Client,
    endpoint: Url,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(endpoint: Url, api_key: String, from: String) -> Result<Self, MailError> {
        let client = Client::builder()
            .user_agent(concat!("portfolio/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|err| MailError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let body = SendRequest {
            from: &self.from,
            to: [&mail.to],
            subject: &mail.subject,
            text: &mail.text,
            html: &mail.html,
            reply_to: mail.reply_to.as_deref(),
        };

        let resp = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| MailError::Transport(err.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            target = "portfolio::mail",
            to = %mail.to,
            subject = %mail.subject,
            "mail delivered"
        );
        Ok(())
    }
}

/// Logs outgoing mail instead of sending it.
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        info!(
            target = "portfolio::mail",
            to = %mail.to,
            subject = %mail.subject,
            bytes = mail.text.len() + mail.html.len(),
            "mail delivery disabled; message logged only"
        );
        Ok(())
    }
}
