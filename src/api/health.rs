use axum::Json;
use serde_json::{json, Value};

pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "JourniTag API is running",
        "status": "ok",
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "API is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
