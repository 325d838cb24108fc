//! Contact form submissions and the admin inbox.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::application::content::ContentService;
use crate::application::error::AppError;
use crate::application::mail::{self, Mailer, OutgoingMail};
use crate::domain::Record;
use crate::domain::documents::ContactMessage;
use portfolio_api_types::ContactSubmission;

/// Where contact notifications go and how auto-replies are signed.
#[derive(Debug, Clone)]
pub struct ContactNotices {
    /// Site owner's inbox. Notifications are skipped when unset.
    pub admin_address: Option<String>,
    pub signature: String,
    pub auto_reply: bool,
}

#[derive(Clone)]
pub struct ContactService {
    messages: ContentService<ContactMessage>,
    mailer: Arc<dyn Mailer>,
    notices: ContactNotices,
}

impl ContactService {
    pub fn new(
        messages: ContentService<ContactMessage>,
        mailer: Arc<dyn Mailer>,
        notices: ContactNotices,
    ) -> Self {
        Self {
            messages,
            mailer,
            notices,
        }
    }

    /// Validate and store a submission, then send the notification and the
    /// auto-reply in the background. Mail failures never reach the caller.
    pub async fn submit(
        &self,
        submission: ContactSubmission,
    ) -> Result<Record<ContactMessage>, AppError> {
        let record = self
            .messages
            .create(ContactMessage {
                name: submission.name,
                email: submission.email,
                subject: submission.subject,
                message: submission.message,
                read: false,
            })
            .await?;

        info!(
            target = "portfolio::contact",
            id = %record.id,
            "contact message stored"
        );

        let outgoing = self.compose(&record);
        if !outgoing.is_empty() {
            let mailer = Arc::clone(&self.mailer);
            let id = record.id;
            tokio::spawn(async move {
                for mail in outgoing {
                    let to = mail.to.clone();
                    if let Err(err) = mailer.send(mail).await {
                        warn!(
                            target = "portfolio::contact",
                            %id,
                            to = %to,
                            error = %err,
                            "failed to deliver contact mail"
                        );
                    }
                }
            });
        }

        Ok(record)
    }

    pub async fn inbox(&self) -> Result<Vec<Record<ContactMessage>>, AppError> {
        self.messages.list().await
    }

    pub async fn mark_read(&self, id: Uuid) -> Result<Record<ContactMessage>, AppError> {
        let mut message = self.messages.get(id).await?.data;
        message.read = true;
        self.messages.update(id, message).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.messages.delete(id).await
    }

    fn compose(&self, record: &Record<ContactMessage>) -> Vec<OutgoingMail> {
        let mut outgoing = Vec::with_capacity(2);

        if let Some(admin) = self.notices.admin_address.as_deref() {
            match mail::contact_notification(record, admin) {
                Ok(mail) => outgoing.push(mail),
                Err(err) => warn!(
                    target = "portfolio::contact",
                    id = %record.id,
                    error = %err,
                    "failed to render contact notification"
                ),
            }
        }

        if self.notices.auto_reply {
            match mail::contact_auto_reply(record, &self.notices.signature) {
                Ok(mail) => outgoing.push(mail),
                Err(err) => warn!(
                    target = "portfolio::contact",
                    id = %record.id,
                    error = %err,
                    "failed to render contact auto-reply"
                ),
            }
        }

        outgoing
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::application::mail::MailError;
    use crate::cache::{CacheConfig, ServerCache};
    use crate::domain::error::DomainError;
    use crate::infra::db::InMemoryDocumentStore;

    struct ChannelMailer {
        sent: mpsc::UnboundedSender<OutgoingMail>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for ChannelMailer {
        async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
            let _ = self.sent.send(mail);
            if self.fail {
                return Err(MailError::Transport("connection reset".into()));
            }
            Ok(())
        }
    }

    fn service(fail: bool) -> (ContactService, mpsc::UnboundedReceiver<OutgoingMail>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let messages = ContentService::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(ServerCache::new(CacheConfig::default())),
        );
        let service = ContactService::new(
            messages,
            Arc::new(ChannelMailer { sent: tx, fail }),
            ContactNotices {
                admin_address: Some("owner@example.com".into()),
                signature: "Ada".into(),
                auto_reply: true,
            },
        );
        (service, rx)
    }

    fn submission(email: &str) -> ContactSubmission {
        ContactSubmission {
            name: "Grace".into(),
            email: email.into(),
            subject: "Hello".into(),
            message: "Let's talk".into(),
        }
    }

    #[tokio::test]
    async fn submit_stores_and_notifies() {
        let (service, mut sent) = service(false);
        let record = service
            .submit(submission("grace@example.com"))
            .await
            .expect("submit");
        assert!(!record.data.read);

        let first = sent.recv().await.expect("notification");
        let second = sent.recv().await.expect("auto reply");
        assert_eq!(first.to, "owner@example.com");
        assert_eq!(second.to, "grace@example.com");

        let inbox = service.inbox().await.expect("inbox");
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, record.id);
    }

    #[tokio::test]
    async fn mail_failures_do_not_fail_the_submission() {
        let (service, mut sent) = service(true);
        service
            .submit(submission("grace@example.com"))
            .await
            .expect("submit");
        assert!(sent.recv().await.is_some());
        assert_eq!(service.inbox().await.expect("inbox").len(), 1);
    }

    #[tokio::test]
    async fn invalid_submission_is_rejected_without_mail() {
        let (service, mut sent) = service(false);
        let err = service
            .submit(submission("not-an-email"))
            .await
            .expect_err("invalid email");
        assert!(matches!(
            err,
            AppError::Domain(DomainError::Validation { field: "email", .. })
        ));
        drop(service);
        assert!(sent.recv().await.is_none());
    }

    #[tokio::test]
    async fn mark_read_updates_inbox() {
        let (service, _sent) = service(false);
        let record = service
            .submit(submission("grace@example.com"))
            .await
            .expect("submit");
        service.mark_read(record.id).await.expect("mark read");
        assert!(service.inbox().await.expect("inbox")[0].data.read);

        service.delete(record.id).await.expect("delete");
        assert!(service.inbox().await.expect("inbox").is_empty());
    }
}
