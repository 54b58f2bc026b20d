use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_id, require_trip, ApiError, AppState};
use crate::db::NewTrip;

#[derive(Debug, Deserialize)]
pub struct TripQuery {
    user_id: Option<String>,
}

pub async fn create_trip(
    State(state): State<AppState>,
    Json(mut trip): Json<NewTrip>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    trip.title = trip.title.trim().to_string();
    if trip.title.is_empty() {
        return Err(ApiError::BadRequest("title is required".to_string()));
    }

    let trip = state
        .with_db(move |db| {
            if db.get_user(trip.user_id)?.is_none() {
                return Err(ApiError::NotFound("User not found".to_string()));
            }
            Ok(db.create_trip(&trip)?)
        })
        .await?;

    tracing::info!(trip_id = trip.id, user_id = trip.user_id, "Created trip");
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "trip": trip }))))
}

pub async fn list_trips(
    State(state): State<AppState>,
    Query(query): Query<TripQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = parse_id(query.user_id.as_deref(), "user_id is required")?;
    let trips = state
        .with_db(move |db| Ok(db.list_trips_for_user(user_id)?))
        .await?;
    Ok(Json(json!({ "success": true, "trips": trips })))
}

pub async fn get_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let trip = state.with_db(move |db| require_trip(db, trip_id)).await?;
    Ok(Json(json!({ "success": true, "trip": trip })))
}

/// Locations of a trip with photo counts and cover URLs.
pub async fn list_trip_locations(
    State(state): State<AppState>,
    Path(trip_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let locations = state
        .with_db(move |db| {
            require_trip(db, trip_id)?;
            Ok(db.list_locations_for_trip(trip_id)?)
        })
        .await?;
    Ok(Json(json!({ "success": true, "locations": locations })))
}
