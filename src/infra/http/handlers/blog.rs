use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use portfolio_api_types::SuccessResponse;
use uuid::Uuid;

use crate::application::content::BlogService;
use crate::domain::Record;
use crate::domain::documents::BlogPost;

use super::{ApiJson, ApiPath};
use crate::infra::http::error::ApiError;

pub async fn list_published_posts(
    State(blog): State<BlogService>,
) -> Result<Json<Vec<Record<BlogPost>>>, ApiError> {
    Ok(Json(blog.published().await?))
}

pub async fn get_published_post(
    State(blog): State<BlogService>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<Record<BlogPost>>, ApiError> {
    Ok(Json(blog.published_by_slug(&slug).await?))
}

pub async fn list_all_posts(
    State(blog): State<BlogService>,
) -> Result<Json<Vec<Record<BlogPost>>>, ApiError> {
    Ok(Json(blog.all().await?))
}

pub async fn get_post(
    State(blog): State<BlogService>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Record<BlogPost>>, ApiError> {
    Ok(Json(blog.get(id).await?))
}

pub async fn create_post(
    State(blog): State<BlogService>,
    ApiJson(post): ApiJson<BlogPost>,
) -> Result<(StatusCode, Json<Record<BlogPost>>), ApiError> {
    let record = blog.create(post).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update_post(
    State(blog): State<BlogService>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(post): ApiJson<BlogPost>,
) -> Result<Json<Record<BlogPost>>, ApiError> {
    Ok(Json(blog.update(id, post).await?))
}

pub async fn delete_post(
    State(blog): State<BlogService>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<SuccessResponse>, ApiError> {
    blog.delete(id).await?;
    Ok(Json(SuccessResponse { success: true }))
}
