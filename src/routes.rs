use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::db::{Database, NewSource, SourcePatch};
use crate::entries::EntryStore;
use crate::error::{StoreError, SyncError};
use crate::sources::SourceStore;
use crate::sync::Syncer;

pub struct AppState {
    pub db: Arc<Database>,
    pub syncer: Arc<Syncer>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sources", post(create_source))
        .route(
            "/sources/:id",
            get(get_source).put(update_source).delete(delete_source),
        )
        .route("/sources/:id/sync", post(sync_source))
        .route("/users/:owner_id/sources", get(list_owner_sources))
        .route("/entries/:id", get(get_entry))
        .route("/entries/:id/read", put(mark_read))
        .route("/sync", post(sync_all))
        .route("/sync/status", get(sync_status))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

pub enum AppError {
    Store(StoreError),
    Sync(SyncError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        AppError::Sync(err)
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Store(StoreError::NotFound)
            | AppError::Sync(SyncError::SourceNotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Store(StoreError::Invalid(_)) => StatusCode::BAD_REQUEST,
            AppError::Sync(SyncError::Failed { .. }) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Store(e) => e.to_string(),
            AppError::Sync(e) => e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self.message());
            "internal server error".to_string()
        } else {
            self.message()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}

pub async fn create_source(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewSource>,
) -> Result<impl IntoResponse, AppError> {
    let source = state.db.create_source(input).await?;
    Ok((StatusCode::CREATED, Json(source)))
}

pub async fn get_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let source = state
        .db
        .get_source_with_entries(id)
        .await?
        .ok_or(StoreError::NotFound)?;
    Ok(Json(source))
}

pub async fn update_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(patch): Json<SourcePatch>,
) -> Result<impl IntoResponse, AppError> {
    let source = state.db.update_source(id, patch).await?;
    Ok(Json(source))
}

pub async fn delete_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.db.delete_source(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_owner_sources(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let sources = state.db.list_sources_by_owner(owner_id).await?;
    Ok(Json(sources))
}

pub async fn sync_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let report = state.syncer.sync_source(id).await?;
    Ok(Json(report))
}

pub async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let entry = state.db.get_entry(id).await?.ok_or(StoreError::NotFound)?;
    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
pub struct ReadMarker {
    #[serde(default = "default_read")]
    pub read: bool,
}

fn default_read() -> bool {
    true
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(marker): Json<ReadMarker>,
) -> Result<impl IntoResponse, AppError> {
    let read_at = marker.read.then(Utc::now);
    let entry = state.db.update_read_marker(id, read_at).await?;
    Ok(Json(entry))
}

pub async fn sync_all(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let syncer = state.syncer.clone();
    tokio::spawn(async move {
        let _ = syncer.sync_all().await;
    });

    (StatusCode::ACCEPTED, Json(json!({ "syncing": true })))
}

pub async fn sync_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let syncing = state.syncer.is_syncing_all().await;
    Json(json!({ "syncing": syncing }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::db::NewEntry;
    use crate::fetcher::Fetcher;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_test_app() -> (Router, Arc<Database>) {
        let db = Database::in_memory().await.unwrap();
        db.initialize().await.unwrap();
        let db = Arc::new(db);

        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let syncer = Arc::new(Syncer::new(db.clone(), db.clone(), fetcher));
        let state = Arc::new(AppState {
            db: db.clone(),
            syncer,
        });

        (router(state), db)
    }

    async fn add_source(db: &Database, link: &str) -> i64 {
        db.create_source(NewSource {
            owner_id: Some(7),
            title: "Test Feed".to_string(),
            description: "Things".to_string(),
            link: link.to_string(),
        })
        .await
        .unwrap()
        .id
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    mod health_tests {
        use super::*;

        #[tokio::test]
        async fn test_health_endpoint() {
            let (app, _db) = create_test_app().await;

            let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&body[..], b"OK");
        }
    }

    mod source_tests {
        use super::*;

        #[tokio::test]
        async fn test_create_source() {
            let (app, db) = create_test_app().await;

            let response = app
                .oneshot(json_request(
                    "POST",
                    "/sources",
                    json!({ "title": "Blog", "link": "https://blog.example.com/rss", "owner_id": 3 }),
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::CREATED);
            let body = body_json(response).await;
            assert_eq!(body["title"], "Blog");
            assert_eq!(body["description"], "");
            assert_eq!(body["owner_id"], 3);

            let id = body["id"].as_i64().unwrap();
            assert!(db.get_source(id).await.unwrap().is_some());
        }

        #[tokio::test]
        async fn test_create_source_without_link() {
            let (app, _db) = create_test_app().await;

            let response = app
                .oneshot(json_request(
                    "POST",
                    "/sources",
                    json!({ "title": "Blog", "link": "" }),
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_json(response).await;
            assert!(body["error"].as_str().unwrap().contains("link"));
        }

        #[tokio::test]
        async fn test_get_source_with_entries() {
            let (app, db) = create_test_app().await;
            let id = add_source(&db, "https://feed.example.com/rss").await;
            db.create_entry(NewEntry {
                source_id: id,
                title: "Article".to_string(),
                description: String::new(),
                link: "https://feed.example.com/1".to_string(),
                published_at: "2024-01-01 00:00:00".to_string(),
            })
            .await
            .unwrap();

            let response = app
                .oneshot(empty_request("GET", &format!("/sources/{}", id)))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["title"], "Test Feed");
            assert_eq!(body["entries"].as_array().unwrap().len(), 1);
            assert_eq!(body["entries"][0]["title"], "Article");
        }

        #[tokio::test]
        async fn test_get_nonexistent_source() {
            let (app, _db) = create_test_app().await;

            let response = app
                .oneshot(empty_request("GET", "/sources/999"))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_partial_update_keeps_other_fields() {
            let (app, db) = create_test_app().await;
            let id = add_source(&db, "https://feed.example.com/rss").await;

            let response = app
                .oneshot(json_request(
                    "PUT",
                    &format!("/sources/{}", id),
                    json!({ "title": "Renamed" }),
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let stored = db.get_source(id).await.unwrap().unwrap();
            assert_eq!(stored.title, "Renamed");
            assert_eq!(stored.description, "Things");
            assert_eq!(stored.link, "https://feed.example.com/rss");
        }

        #[tokio::test]
        async fn test_update_nonexistent_source() {
            let (app, _db) = create_test_app().await;

            let response = app
                .oneshot(json_request("PUT", "/sources/999", json!({ "title": "x" })))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_delete_source() {
            let (app, db) = create_test_app().await;
            let id = add_source(&db, "https://feed.example.com/rss").await;

            let response = app
                .clone()
                .oneshot(empty_request("DELETE", &format!("/sources/{}", id)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);

            let response = app
                .oneshot(empty_request("DELETE", &format!("/sources/{}", id)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_list_owner_sources() {
            let (app, db) = create_test_app().await;
            add_source(&db, "https://a.example.com/rss").await;
            add_source(&db, "https://b.example.com/rss").await;

            let response = app
                .oneshot(empty_request("GET", "/users/7/sources"))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body.as_array().unwrap().len(), 2);
        }
    }

    mod sync_tests {
        use super::*;

        const RSS: &str = r#"<?xml version="1.0"?>
            <rss version="2.0"><channel><title>Blog</title>
                <item><title>One</title><link>https://blog.example.com/1</link>
                    <pubDate>Mon, 09 Dec 2024 12:00:00 GMT</pubDate></item>
                <item><title>Two</title><link>https://blog.example.com/2</link>
                    <pubDate>Tue, 10 Dec 2024 12:00:00 GMT</pubDate></item>
            </channel></rss>"#;

        #[tokio::test]
        async fn test_sync_reports_new_items() {
            let mock_server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
                .mount(&mock_server)
                .await;
            let (app, db) = create_test_app().await;
            let id = add_source(&db, &mock_server.uri()).await;

            let response = app
                .clone()
                .oneshot(empty_request("POST", &format!("/sources/{}/sync", id)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await["new_items"], 2);

            let response = app
                .oneshot(empty_request("POST", &format!("/sources/{}/sync", id)))
                .await
                .unwrap();
            let body = body_json(response).await;
            assert_eq!(body["new_items"], 0);
            assert_eq!(body["duplicates"], 2);
        }

        #[tokio::test]
        async fn test_sync_unknown_source() {
            let (app, _db) = create_test_app().await;

            let response = app
                .oneshot(empty_request("POST", "/sources/999/sync"))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_sync_fetch_failure_is_bad_gateway() {
            let mock_server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(500))
                .mount(&mock_server)
                .await;
            let (app, db) = create_test_app().await;
            let id = add_source(&db, &mock_server.uri()).await;

            let response = app
                .oneshot(empty_request("POST", &format!("/sources/{}/sync", id)))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
            assert_eq!(db.count_entries(id).await.unwrap(), 0);
        }

        #[tokio::test]
        async fn test_sync_all_endpoint() {
            let (app, _db) = create_test_app().await;

            let response = app.oneshot(empty_request("POST", "/sync")).await.unwrap();

            assert_eq!(response.status(), StatusCode::ACCEPTED);
            assert_eq!(body_json(response).await["syncing"], true);
        }

        #[tokio::test]
        async fn test_sync_status_endpoint() {
            let (app, _db) = create_test_app().await;

            let response = app
                .oneshot(empty_request("GET", "/sync/status"))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert!(body_json(response).await["syncing"].is_boolean());
        }
    }

    mod entry_tests {
        use super::*;

        async fn add_entry(db: &Database) -> i64 {
            let source_id = add_source(db, "https://feed.example.com/rss").await;
            db.create_entry(NewEntry {
                source_id,
                title: "Article".to_string(),
                description: String::new(),
                link: "https://feed.example.com/1".to_string(),
                published_at: "2024-01-01 00:00:00".to_string(),
            })
            .await
            .unwrap()
            .id
        }

        #[tokio::test]
        async fn test_get_entry() {
            let (app, db) = create_test_app().await;
            let id = add_entry(&db).await;

            let response = app
                .oneshot(empty_request("GET", &format!("/entries/{}", id)))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await["title"], "Article");
        }

        #[tokio::test]
        async fn test_mark_read_and_unread() {
            let (app, db) = create_test_app().await;
            let id = add_entry(&db).await;

            let response = app
                .clone()
                .oneshot(json_request("PUT", &format!("/entries/{}/read", id), json!({})))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(body_json(response).await["read_at"].is_string());

            let response = app
                .oneshot(json_request(
                    "PUT",
                    &format!("/entries/{}/read", id),
                    json!({ "read": false }),
                ))
                .await
                .unwrap();
            assert!(body_json(response).await["read_at"].is_null());
        }

        #[tokio::test]
        async fn test_mark_read_missing_entry() {
            let (app, _db) = create_test_app().await;

            let response = app
                .oneshot(json_request("PUT", "/entries/999/read", json!({})))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }
}
