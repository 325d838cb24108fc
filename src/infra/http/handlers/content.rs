//! Handlers shared by the plain collections (projects, skills, competencies).

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use portfolio_api_types::SuccessResponse;
use uuid::Uuid;

use crate::application::content::ContentService;
use crate::domain::{Document, Record};

use super::{ApiJson, ApiPath};
use crate::infra::http::error::ApiError;

pub async fn list_documents<T: Document>(
    State(service): State<ContentService<T>>,
) -> Result<Json<Vec<Record<T>>>, ApiError> {
    Ok(Json(service.list().await?))
}

pub async fn get_document<T: Document>(
    State(service): State<ContentService<T>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Record<T>>, ApiError> {
    Ok(Json(service.get(id).await?))
}

pub async fn create_document<T: Document>(
    State(service): State<ContentService<T>>,
    ApiJson(data): ApiJson<T>,
) -> Result<(StatusCode, Json<Record<T>>), ApiError> {
    let record = service.create(data).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update_document<T: Document>(
    State(service): State<ContentService<T>>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(data): ApiJson<T>,
) -> Result<Json<Record<T>>, ApiError> {
    Ok(Json(service.update(id, data).await?))
}

pub async fn delete_document<T: Document>(
    State(service): State<ContentService<T>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<SuccessResponse>, ApiError> {
    service.delete(id).await?;
    Ok(Json(SuccessResponse { success: true }))
}
