use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{parse_id, require_trip, ApiError, AppState, FormUserId};
use crate::db::{Database, Photo};
use crate::ingest::{Ingestor, UploadedFile};

const MISSING_IDS: &str = "trip_id and user_id are required";

/// Multipart batch upload: `trip_id`, `user_id` and any number of `files`.
pub async fn batch_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut trip_id = None;
    let mut user_id = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "trip_id" => trip_id = Some(field.text().await?),
            "user_id" => user_id = Some(field.text().await?),
            "files" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                // Browsers send an empty part when no file was picked
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }
                files.push(UploadedFile {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            other => warn!("Ignoring unexpected form field {:?}", other),
        }
    }

    let trip_id = parse_id(trip_id.as_deref(), MISSING_IDS)?;
    let user_id = parse_id(user_id.as_deref(), MISSING_IDS)?;
    if files.is_empty() {
        return Err(ApiError::BadRequest("No files uploaded".to_string()));
    }
    info!(trip_id, user_id, files = files.len(), "Batch upload received");

    let config = state.config.clone();
    let storage = state.storage.clone();
    let extractor = state.extractor.clone();
    let report = state
        .with_db(move |db| {
            if require_trip(db, trip_id)?.user_id != user_id {
                return Err(ApiError::Forbidden(
                    "Not authorized to upload to this trip".to_string(),
                ));
            }
            Ingestor::new(extractor.as_ref(), &storage, &config)
                .ingest_batch(db, trip_id, user_id, &files)
                .map_err(ApiError::Database)
        })
        .await
        .map_err(upload_error)?;

    let uploaded = report.photos.len();
    Ok(Json(json!({
        "success": true,
        "photos_uploaded": uploaded,
        "photos": report.photos,
        "skipped": report.skipped,
        "message": format!("Successfully uploaded {} photos", uploaded),
    })))
}

/// Server-side failures of a batch, the connection itself included, are
/// reported as upload errors.
fn upload_error(err: ApiError) -> ApiError {
    match err {
        ApiError::Database(e) => ApiError::Internal(format!("Error uploading photos: {:#}", e)),
        ApiError::Join(e) => ApiError::Internal(format!("Error uploading photos: {}", e)),
        other => other,
    }
}

pub async fn photos_for_location(
    State(state): State<AppState>,
    Path(location_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let photos = state
        .with_db(move |db| Ok(db.list_photos_for_location(location_id)?))
        .await?;
    Ok(Json(json!({ "success": true, "photos": photos })))
}

fn owned_photo(db: &Database, photo_id: i64, user_id: i64) -> Result<Photo, ApiError> {
    let photo = db
        .get_photo(photo_id)?
        .ok_or_else(|| ApiError::NotFound("Photo not found".to_string()))?;
    if photo.user_id != user_id {
        return Err(ApiError::Forbidden("Not authorized".to_string()));
    }
    Ok(photo)
}

pub async fn set_cover(
    State(state): State<AppState>,
    Path(photo_id): Path<i64>,
    FormUserId(user_id): FormUserId,
) -> Result<Json<Value>, ApiError> {
    state
        .with_db(move |db| {
            let photo = owned_photo(db, photo_id, user_id)?;
            db.set_cover_photo(&photo)?;
            Ok(())
        })
        .await?;

    info!(photo_id, "Cover photo updated");
    Ok(Json(json!({ "success": true, "message": "Cover photo updated" })))
}

pub async fn delete_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<i64>,
    FormUserId(user_id): FormUserId,
) -> Result<Json<Value>, ApiError> {
    let storage = state.storage.clone();
    state
        .with_db(move |db| {
            let photo = owned_photo(db, photo_id, user_id)?;
            db.delete_photo(photo.id)?;

            if db.count_photos_with_file_url(&photo.file_url)? > 0 {
                return Ok(());
            }
            match storage.remove(&photo.file_url) {
                Ok(true) => info!(file_url = %photo.file_url, "Deleted photo file"),
                Ok(false) => warn!(file_url = %photo.file_url, "Photo file already missing"),
                Err(e) => warn!(file_url = %photo.file_url, "Failed to delete photo file: {:#}", e),
            }
            Ok(())
        })
        .await?;

    info!(photo_id, "Photo deleted");
    Ok(Json(json!({ "success": true, "message": "Photo deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_upload_error_wraps_server_failures() {
        let err = upload_error(ApiError::from(anyhow::anyhow!("unable to open database file")));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "Error uploading photos: unable to open database file"
        );

        let err = upload_error(ApiError::Forbidden("Not authorized to upload to this trip".into()));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }
}
