use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::{ApiError, AppState};
use crate::db::NewUser;

pub async fn create_user(
    State(state): State<AppState>,
    Json(mut user): Json<NewUser>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    user.email = user.email.trim().to_lowercase();
    user.name = user.name.trim().to_string();
    if user.email.is_empty() || user.name.is_empty() {
        return Err(ApiError::BadRequest("email and name are required".to_string()));
    }

    let user = state
        .with_db(move |db| {
            if db.find_user_by_email(&user.email)?.is_some() {
                return Err(ApiError::Conflict("Email already registered".to_string()));
            }
            Ok(db.create_user(&user)?)
        })
        .await?;

    tracing::info!(user_id = user.id, "Created user");
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "user": user }))))
}
