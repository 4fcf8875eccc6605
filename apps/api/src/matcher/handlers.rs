use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::matcher::{analyze, KeywordAnalysis};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub job_description: String,
    #[serde(default)]
    pub resume: String,
}

/// POST /match
pub async fn handle_match(Json(request): Json<MatchRequest>) -> Result<Json<KeywordAnalysis>, AppError> {
    if request.job_description.trim().is_empty() {
        return Err(AppError::Validation(
            "jobDescription cannot be empty".to_string(),
        ));
    }
    Ok(Json(analyze(&request.job_description, &request.resume)))
}
