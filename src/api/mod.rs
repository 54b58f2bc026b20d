//! HTTP API.
//!
//! Handlers are thin: they validate input, then run their database work on
//! the blocking pool through `AppState::with_db`, each call on a fresh
//! SQLite connection.

mod error;
mod health;
mod locations;
mod photos;
mod trips;
mod users;

pub use error::ApiError;

use anyhow::Context;
use axum::async_trait;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Query, Request};
use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, patch, post};
use axum::{Form, Router};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{Database, Trip};
use crate::media::{ExifExtractor, MetadataExtractor, PhotoStorage};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<PhotoStorage>,
    pub extractor: Arc<dyn MetadataExtractor>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let storage = PhotoStorage::from_config(&config.uploads);
        Self {
            config: Arc::new(config),
            storage: Arc::new(storage),
            extractor: Arc::new(ExifExtractor),
        }
    }

    /// Run `f` against a new database connection on the blocking pool.
    pub(crate) async fn with_db<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&mut Database) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.config.database.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut db = Database::open(&path)?;
            f(&mut db)
        })
        .await?
    }
}

#[derive(Debug, Default, Deserialize)]
struct UserForm {
    user_id: Option<String>,
}

/// `user_id` of the photo mutation endpoints. Read from a multipart or
/// urlencoded body, falling back to the query string.
pub struct FormUserId(pub i64);

#[async_trait]
impl<S> FromRequest<S> for FormUserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let query = Query::<UserForm>::try_from_uri(req.uri())
            .ok()
            .and_then(|Query(form)| form.user_id);
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let body = if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            let mut user_id = None;
            while let Some(field) = multipart.next_field().await? {
                if field.name() == Some("user_id") {
                    user_id = Some(field.text().await?);
                }
            }
            user_id
        } else {
            Form::<UserForm>::from_request(req, state)
                .await
                .ok()
                .and_then(|Form(form)| form.user_id)
        };

        let value = body.filter(|v| !v.trim().is_empty()).or(query);
        parse_id(value.as_deref(), "user_id is required").map(FormUserId)
    }
}

/// Parse a required numeric id sent as a form or query string value.
pub(crate) fn parse_id(value: Option<&str>, message: &str) -> Result<i64, ApiError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ApiError::BadRequest(message.to_string()))
}

pub(crate) fn require_trip(db: &Database, trip_id: i64) -> Result<Trip, ApiError> {
    db.get_trip(trip_id)?
        .ok_or_else(|| ApiError::NotFound("Trip not found".to_string()))
}

pub fn router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.storage.dir());
    let url_prefix = state.storage.url_prefix().to_string();
    let body_limit = state.config.uploads.max_content_length;
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/", get(health::index))
        .route("/api/health", get(health::health))
        .route("/api/users", post(users::create_user))
        .route("/api/trips", get(trips::list_trips).post(trips::create_trip))
        .route("/api/trips/:trip_id", get(trips::get_trip))
        .route("/api/trips/:trip_id/locations", get(trips::list_trip_locations))
        .route(
            "/api/locations/:location_id",
            get(locations::get_location).patch(locations::update_location),
        )
        .route("/api/photos/batch-upload", post(photos::batch_upload))
        .route(
            "/api/photos/location/:location_id",
            get(photos::photos_for_location),
        )
        .route(
            "/api/photos/:photo_id/set-cover",
            patch(photos::set_cover).post(photos::set_cover),
        )
        .route("/api/photos/:photo_id", delete(photos::delete_photo))
        .nest_service(&url_prefix, uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

/// Bind the configured address and serve until the process is stopped.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.listen_addr();
    let state = AppState::new(config);
    state.storage.ensure_dir()?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("JourniTag API listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
