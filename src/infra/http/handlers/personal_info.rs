use axum::Json;
use axum::extract::State;

use crate::application::content::PersonalInfoService;
use crate::domain::Record;
use crate::domain::documents::PersonalInfo;

use super::ApiJson;
use crate::infra::http::error::ApiError;

pub async fn get_personal_info(
    State(service): State<PersonalInfoService>,
) -> Result<Json<Record<PersonalInfo>>, ApiError> {
    Ok(Json(service.get().await?))
}

pub async fn put_personal_info(
    State(service): State<PersonalInfoService>,
    ApiJson(data): ApiJson<PersonalInfo>,
) -> Result<Json<Record<PersonalInfo>>, ApiError> {
    Ok(Json(service.upsert(data).await?))
}
