use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{require_trip, ApiError, AppState};
use crate::db::LocationUpdate;

#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    user_id: Option<i64>,
    #[serde(flatten)]
    changes: LocationUpdate,
}

/// A location together with its photos.
pub async fn get_location(
    State(state): State<AppState>,
    Path(location_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let (location, photos) = state
        .with_db(move |db| {
            let location = db
                .get_location(location_id)?
                .ok_or_else(|| ApiError::NotFound("Location not found".to_string()))?;
            let photos = db.list_photos_for_location(location_id)?;
            Ok((location, photos))
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "location": location,
        "photos": photos,
    })))
}

pub async fn update_location(
    State(state): State<AppState>,
    Path(location_id): Path<i64>,
    Json(request): Json<UpdateLocationRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = request
        .user_id
        .ok_or_else(|| ApiError::BadRequest("user_id is required".to_string()))?;
    request.changes.validate().map_err(ApiError::BadRequest)?;

    let location = state
        .with_db(move |db| {
            let location = db
                .get_location(location_id)?
                .ok_or_else(|| ApiError::NotFound("Location not found".to_string()))?;
            if require_trip(db, location.trip_id)?.user_id != user_id {
                return Err(ApiError::Forbidden("Not authorized".to_string()));
            }
            db.update_location(location_id, request.changes)?
                .ok_or_else(|| ApiError::NotFound("Location not found".to_string()))
        })
        .await?;

    tracing::info!(location_id, "Updated location");
    Ok(Json(json!({ "success": true, "location": location })))
}
