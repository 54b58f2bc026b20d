//! End-to-end tests against a server bound to an ephemeral port.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::io::Cursor;
use tempfile::TempDir;

use journitag::api::{router, AppState};
use journitag::config::Config;
use journitag::db::Database;
use journitag::media::geotag::{tag_photo, GeoTag};

struct TestServer {
    base: String,
    client: Client,
    config: Config,
    _tmp: TempDir,
}

impl TestServer {
    async fn spawn() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = tmp.path().join("journitag.db");
        config.uploads.dir = tmp.path().join("photos");
        Database::open(&config.database.path)
            .unwrap()
            .initialize()
            .unwrap();

        let app = router(AppState::new(config.clone()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            client: Client::new(),
            config,
            _tmp: tmp,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn post_json(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn upload(&self, form: Form) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(self.url("/api/photos/batch-upload"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    /// Create a user and a trip owned by them, returning (user_id, trip_id).
    async fn user_with_trip(&self, email: &str) -> (i64, i64) {
        let (status, user) = self
            .post_json("/api/users", json!({ "email": email, "name": "Traveler" }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let user_id = user["user"]["id"].as_i64().unwrap();

        let (status, trip) = self
            .post_json(
                "/api/trips",
                json!({ "user_id": user_id, "title": "Tokyo", "city": "Tokyo" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        (user_id, trip["trip"]["id"].as_i64().unwrap())
    }
}

/// A distinct JPEG per `shade`, optionally tagged with coordinates.
fn photo(shade: u8, coords: Option<(f64, f64)>) -> Vec<u8> {
    let img = RgbImage::from_pixel(24, 16, Rgb([shade, 90, 180]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Jpeg)
        .unwrap();
    let jpeg = out.into_inner();
    match coords {
        Some((lat, lon)) => tag_photo(&jpeg, &GeoTag::new(lat, lon)).unwrap(),
        None => jpeg,
    }
}

fn upload_form(trip_id: i64, user_id: i64, files: Vec<(&str, Vec<u8>)>) -> Form {
    let mut form = Form::new()
        .text("trip_id", trip_id.to_string())
        .text("user_id", user_id.to_string());
    for (name, bytes) in files {
        form = form.part("files", Part::bytes(bytes).file_name(name.to_string()));
    }
    form
}

const SHINJUKU: (f64, f64) = (35.6938, 139.7034);
const SHINJUKU_NEARBY: (f64, f64) = (35.6940, 139.7036);
const SHIBUYA: (f64, f64) = (35.6595, 139.7004);

#[tokio::test]
async fn test_index_and_health() {
    let server = TestServer::spawn().await;

    let (status, body) = server.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = server.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_batch_upload_groups_photos_and_reports_skips() {
    let server = TestServer::spawn().await;
    let (user_id, trip_id) = server.user_with_trip("a@example.com").await;

    let first = photo(10, Some(SHINJUKU));
    let form = upload_form(
        trip_id,
        user_id,
        vec![
            ("IMG_0001.jpg", first.clone()),
            ("IMG_0002.JPG", photo(20, Some(SHINJUKU_NEARBY))),
            ("IMG_0003.jpg", photo(30, Some(SHIBUYA))),
            ("untagged.jpg", photo(40, None)),
            ("notes.txt", b"hello".to_vec()),
        ],
    );
    let (status, body) = server.upload(form).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["photos_uploaded"], 3);
    assert_eq!(body["message"], "Successfully uploaded 3 photos");

    let photos = body["photos"].as_array().unwrap();
    assert_eq!(photos[0]["location_id"], photos[1]["location_id"]);
    assert_ne!(photos[0]["location_id"], photos[2]["location_id"]);
    assert_eq!(photos[0]["is_cover_photo"], true);
    assert_eq!(photos[1]["is_cover_photo"], false);
    assert_eq!(photos[2]["is_cover_photo"], true);
    assert_eq!(photos[0]["original_filename"], "IMG_0001.jpg");

    let skipped = body["skipped"].as_array().unwrap();
    assert_eq!(skipped.len(), 2);
    assert_eq!(skipped[0]["filename"], "untagged.jpg");
    assert_eq!(skipped[1]["filename"], "notes.txt");
    assert_eq!(skipped[1]["reason"], "file type not allowed");

    let (status, body) = server
        .get(&format!("/api/trips/{}/locations", trip_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    let locations = body["locations"].as_array().unwrap();
    assert_eq!(locations.len(), 2);
    assert_eq!(locations[0]["photo_count"], 2);
    assert_eq!(locations[0]["name"], "Location at (35.6938, 139.7034)");
    assert_eq!(locations[0]["cover_photo_url"], photos[0]["file_url"]);

    let file_url = photos[0]["file_url"].as_str().unwrap();
    assert!(file_url.starts_with("/uploads/photos/"));
    let served = server
        .client
        .get(server.url(file_url))
        .send()
        .await
        .unwrap();
    assert_eq!(served.status(), StatusCode::OK);
    assert_eq!(served.bytes().await.unwrap().as_ref(), first.as_slice());
}

#[tokio::test]
async fn test_batch_upload_rejections() {
    let server = TestServer::spawn().await;
    let (owner, trip_id) = server.user_with_trip("owner@example.com").await;
    let (intruder, _) = server.user_with_trip("intruder@example.com").await;

    let missing_ids = Form::new().part(
        "files",
        Part::bytes(photo(1, Some(SHINJUKU))).file_name("a.jpg"),
    );
    let (status, body) = server.upload(missing_ids).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "trip_id and user_id are required");

    let (status, body) = server.upload(upload_form(trip_id, owner, vec![])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No files uploaded");

    let files = || vec![("a.jpg", photo(1, Some(SHINJUKU)))];
    let (status, body) = server.upload(upload_form(9999, owner, files())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Trip not found");

    let (status, body) = server.upload(upload_form(trip_id, intruder, files())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Not authorized to upload to this trip");
}

#[tokio::test]
async fn test_set_cover_moves_the_flag() {
    let server = TestServer::spawn().await;
    let (user_id, trip_id) = server.user_with_trip("cover@example.com").await;

    let form = upload_form(
        trip_id,
        user_id,
        vec![
            ("a.jpg", photo(50, Some(SHINJUKU))),
            ("b.jpg", photo(60, Some(SHINJUKU_NEARBY))),
        ],
    );
    let (_, body) = server.upload(form).await;
    let second_id = body["photos"][1]["id"].as_i64().unwrap();
    let location_id = body["photos"][1]["location_id"].as_i64().unwrap();
    let set_cover = server.url(&format!("/api/photos/{}/set-cover", second_id));

    let resp = server.client.patch(&set_cover).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "user_id is required");

    let resp = server
        .client
        .patch(&set_cover)
        .form(&[("user_id", (user_id + 100).to_string())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = server
        .client
        .patch(server.url("/api/photos/9999/set-cover"))
        .form(&[("user_id", user_id.to_string())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = server
        .client
        .post(&set_cover)
        .form(&[("user_id", user_id.to_string())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Cover photo updated");

    let (_, body) = server
        .get(&format!("/api/photos/location/{}", location_id))
        .await;
    let covers: Vec<i64> = body["photos"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["is_cover_photo"] == true)
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(covers, vec![second_id]);
}

#[tokio::test]
async fn test_delete_photo_removes_row_and_file() {
    let server = TestServer::spawn().await;
    let (user_id, trip_id) = server.user_with_trip("delete@example.com").await;

    let (_, body) = server
        .upload(upload_form(
            trip_id,
            user_id,
            vec![("a.jpg", photo(70, Some(SHIBUYA)))],
        ))
        .await;
    let photo_id = body["photos"][0]["id"].as_i64().unwrap();
    let file_name = body["photos"][0]["file_url"]
        .as_str()
        .unwrap()
        .rsplit('/')
        .next()
        .unwrap()
        .to_string();
    let stored = server.config.uploads.dir.join(file_name);
    assert!(stored.exists());

    let delete = |user: i64| {
        server
            .client
            .delete(server.url(&format!("/api/photos/{}", photo_id)))
            .form(&[("user_id", user.to_string())])
            .send()
    };

    assert_eq!(delete(user_id + 1).await.unwrap().status(), StatusCode::FORBIDDEN);
    assert!(stored.exists());

    let resp = delete(user_id).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Photo deleted");
    assert!(!stored.exists());

    assert_eq!(delete(user_id).await.unwrap().status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_photo_mutations_accept_multipart_user_id() {
    let server = TestServer::spawn().await;
    let (user_id, trip_id) = server.user_with_trip("formdata@example.com").await;

    let (_, body) = server
        .upload(upload_form(
            trip_id,
            user_id,
            vec![
                ("a.jpg", photo(80, Some(SHINJUKU))),
                ("b.jpg", photo(90, Some(SHINJUKU_NEARBY))),
            ],
        ))
        .await;
    let second_id = body["photos"][1]["id"].as_i64().unwrap();
    let user_form = || Form::new().text("user_id", user_id.to_string());

    let resp = server
        .client
        .post(server.url(&format!("/api/photos/{}/set-cover", second_id)))
        .multipart(user_form())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Cover photo updated");

    let resp = server
        .client
        .delete(server.url(&format!("/api/photos/{}", second_id)))
        .multipart(user_form())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = server
        .client
        .delete(server.url(&format!("/api/photos/{}", second_id)))
        .multipart(Form::new().text("note", "no user"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "user_id is required");
}

#[tokio::test]
async fn test_batch_upload_reports_unusable_database() {
    let server = TestServer::spawn().await;
    let (user_id, trip_id) = server.user_with_trip("broken@example.com").await;

    let db_path = &server.config.database.path;
    std::fs::remove_file(db_path).unwrap();
    std::fs::create_dir(db_path).unwrap();

    let (status, body) = server
        .upload(upload_form(
            trip_id,
            user_id,
            vec![("a.jpg", photo(10, Some(SHIBUYA)))],
        ))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Error uploading photos: "));
}

#[tokio::test]
async fn test_location_update_and_trip_queries() {
    let server = TestServer::spawn().await;
    let (user_id, trip_id) = server.user_with_trip("edit@example.com").await;

    let (_, body) = server
        .upload(upload_form(
            trip_id,
            user_id,
            vec![("a.jpg", photo(80, Some(SHINJUKU)))],
        ))
        .await;
    let location_id = body["photos"][0]["location_id"].as_i64().unwrap();
    let location_url = server.url(&format!("/api/locations/{}", location_id));

    let resp = server
        .client
        .patch(&location_url)
        .json(&json!({ "user_id": user_id, "rating": 6 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = server
        .client
        .patch(&location_url)
        .json(&json!({ "user_id": user_id + 1, "name": "Mine now" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = server
        .client
        .patch(&location_url)
        .json(&json!({
            "user_id": user_id,
            "name": "Omoide Yokocho",
            "rating": 5,
            "tags": ["food", "night"],
            "cost_level": "$$",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["location"]["name"], "Omoide Yokocho");
    assert_eq!(body["location"]["tags"], json!(["food", "night"]));

    let (status, body) = server.get(&format!("/api/locations/{}", location_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["location"]["rating"], 5);
    assert_eq!(body["photos"].as_array().unwrap().len(), 1);

    let (status, body) = server.get("/api/trips").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "user_id is required");

    let (status, body) = server.get(&format!("/api/trips?user_id={}", user_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trips"][0]["id"], trip_id);

    let (status, _) = server.get("/api/trips/9999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let server = TestServer::spawn().await;
    server.user_with_trip("same@example.com").await;

    let (status, body) = server
        .post_json(
            "/api/users",
            json!({ "email": "SAME@example.com", "name": "Again" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}
