use axum::Json;
use axum::extract::State;
use portfolio_api_types::{ContactAccepted, ContactSubmission, SuccessResponse};
use uuid::Uuid;

use crate::application::contact::ContactService;
use crate::domain::Record;
use crate::domain::documents::ContactMessage;

use super::{ApiJson, ApiPath};
use crate::infra::http::error::ApiError;

const ACCEPTED_MESSAGE: &str = "Thanks for your message! I'll get back to you soon.";

pub async fn submit_contact(
    State(contact): State<ContactService>,
    ApiJson(submission): ApiJson<ContactSubmission>,
) -> Result<Json<ContactAccepted>, ApiError> {
    let record = contact.submit(submission).await?;
    Ok(Json(ContactAccepted {
        success: true,
        id: record.id,
        message: ACCEPTED_MESSAGE.to_string(),
    }))
}

pub async fn list_contact_messages(
    State(contact): State<ContactService>,
) -> Result<Json<Vec<Record<ContactMessage>>>, ApiError> {
    Ok(Json(contact.inbox().await?))
}

pub async fn mark_contact_read(
    State(contact): State<ContactService>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Record<ContactMessage>>, ApiError> {
    Ok(Json(contact.mark_read(id).await?))
}

pub async fn delete_contact_message(
    State(contact): State<ContactService>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<SuccessResponse>, ApiError> {
    contact.delete(id).await?;
    Ok(Json(SuccessResponse { success: true }))
}
