//! End-to-end tests of the user routes over the in-memory store

use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use tubeline_api::{
    media::{BlobStorage, UploadedAsset},
    routes::create_router,
    store::MemoryStore,
    AppState, Config,
};
use tubeline_shared::UserId;

const BOUNDARY: &str = "tubeline-test-boundary";

/// Blob storage that accepts every upload and remembers deletions
#[derive(Default)]
struct RecordingBlobs {
    uploaded: Mutex<usize>,
    deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl BlobStorage for RecordingBlobs {
    async fn upload(&self, local_file: &Path) -> Option<UploadedAsset> {
        let _ = tokio::fs::remove_file(local_file).await;
        let mut uploaded = self.uploaded.lock().unwrap();
        *uploaded += 1;
        let public_id = format!("img{}", uploaded);
        Some(UploadedAsset {
            url: format!("https://res.cloudinary.com/demo/image/upload/v1/{}.png", public_id),
            public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> Option<()> {
        self.deleted.lock().unwrap().push(public_id.to_string());
        Some(())
    }
}

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    blobs: Arc<RecordingBlobs>,
    temp: tempfile::TempDir,
}

fn test_config(upload_temp_dir: &Path) -> Config {
    Config {
        bind_address: "127.0.0.1:0".to_string(),
        max_body_bytes: 1024 * 1024,
        upload_temp_dir: upload_temp_dir.display().to_string(),
        database_url: String::new(),
        database_max_connections: 1,
        access_token_secret: "integration-access-secret-32-chars-min".to_string(),
        access_token_expiry_minutes: 15,
        refresh_token_secret: "integration-refresh-secret-32-chars-min".to_string(),
        refresh_token_expiry_days: 10,
        cloudinary_cloud_name: None,
        cloudinary_api_key: None,
        cloudinary_api_secret: None,
        log_json: false,
    }
}

impl TestApp {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(RecordingBlobs::default());
        let state = AppState::new(
            test_config(temp.path()),
            store.clone(),
            store.clone(),
            blobs.clone(),
            None,
        );
        Self {
            router: create_router(state),
            store,
            blobs,
            temp,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn register(&self, username: &str) -> Value {
        let email = format!("{}@example.com", username);
        let body = multipart(
            &[
                ("fullName", "Test User"),
                ("email", email.as_str()),
                ("username", username),
                ("password", "hunter2-hunter2"),
            ],
            &[("avatar", "me.png")],
        );
        let response = self
            .send(
                Request::post("/api/v1/users/register")
                    .header(header::CONTENT_TYPE, multipart_content_type())
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await
    }

    async fn login(&self, username: &str) -> Response {
        self.send(json_request(
            Method::POST,
            "/api/v1/users/login",
            json!({ "username": username, "password": "hunter2-hunter2" }),
        ))
        .await
    }
}

fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

fn multipart(fields: &[(&str, &str)], files: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    for (name, file_name) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
                BOUNDARY, name, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"\x89PNG fake image bytes");
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed(method: Method, uri: &str, access_token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Value of a cookie set by the response, with its attribute string
fn set_cookie(response: &Response, name: &str) -> Option<(String, String)> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|raw| {
            let (pair, attributes) = raw.split_once(';').unwrap_or((raw, ""));
            let (key, value) = pair.split_once('=')?;
            (key.trim() == name).then(|| (value.to_string(), attributes.to_string()))
        })
}

fn user_id(profile: &Value) -> UserId {
    UserId(Uuid::parse_str(profile["id"].as_str().unwrap()).unwrap())
}

#[tokio::test]
async fn test_register_hides_credentials_and_rejects_duplicates() {
    let app = TestApp::new();
    let body = app.register("Nova").await;

    assert_eq!(body["success"], true);
    assert_eq!(body["statusCode"], 201);
    assert_eq!(body["data"]["username"], "nova");
    assert!(body["data"].get("passwordHash").is_none());
    assert!(body["data"].get("refreshToken").is_none());
    assert!(body["data"]["avatar"]
        .as_str()
        .unwrap()
        .starts_with("https://res.cloudinary.com/"));

    let duplicate = app
        .send(
            Request::post("/api/v1/users/register")
                .header(header::CONTENT_TYPE, multipart_content_type())
                .body(Body::from(multipart(
                    &[
                        ("fullName", "Other"),
                        ("email", "other@example.com"),
                        ("username", "nova"),
                        ("password", "pw"),
                    ],
                    &[("avatar", "me.png")],
                )))
                .unwrap(),
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    // Spooled files never outlive the request
    let leftovers = std::fs::read_dir(app.temp.path()).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_register_without_avatar_is_rejected() {
    let app = TestApp::new();
    let response = app
        .send(
            Request::post("/api/v1/users/register")
                .header(header::CONTENT_TYPE, multipart_content_type())
                .body(Body::from(multipart(
                    &[
                        ("fullName", "No Face"),
                        ("email", "noface@example.com"),
                        ("username", "noface"),
                        ("password", "pw"),
                    ],
                    &[],
                )))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_login_sets_locked_down_cookies() {
    let app = TestApp::new();
    app.register("kai").await;

    let response = app.login("kai").await;
    assert_eq!(response.status(), StatusCode::OK);

    let (access, attributes) = set_cookie(&response, "accessToken").expect("access cookie");
    assert!(!access.is_empty());
    assert!(attributes.contains("HttpOnly"));
    assert!(attributes.contains("Secure"));
    assert!(attributes.contains("Path=/"));
    let (refresh, _) = set_cookie(&response, "refreshToken").expect("refresh cookie");

    let body = json_body(response).await;
    assert_eq!(body["data"]["accessToken"], access.as_str());
    assert_eq!(body["data"]["refreshToken"], refresh.as_str());
    assert_eq!(body["data"]["user"]["username"], "kai");
}

#[tokio::test]
async fn test_login_with_wrong_password_or_unknown_user() {
    let app = TestApp::new();
    app.register("kai").await;

    for payload in [
        json!({ "username": "kai", "password": "wrong" }),
        json!({ "email": "ghost@example.com", "password": "hunter2-hunter2" }),
    ] {
        let response = app
            .send(json_request(Method::POST, "/api/v1/users/login", payload))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let missing = app
        .send(json_request(
            Method::POST,
            "/api/v1/users/login",
            json!({ "password": "hunter2-hunter2" }),
        ))
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_protected_routes_require_a_session() {
    let app = TestApp::new();

    let anonymous = app
        .send(
            Request::get("/api/v1/users/current-user")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let forged = app
        .send(authed(Method::GET, "/api/v1/users/current-user", "not-a-jwt"))
        .await;
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_current_user_via_bearer_and_cookie() {
    let app = TestApp::new();
    app.register("ari").await;
    let login = json_body(app.login("ari").await).await;
    let access = login["data"]["accessToken"].as_str().unwrap();

    let via_bearer = app
        .send(authed(Method::GET, "/api/v1/users/current-user", access))
        .await;
    assert_eq!(via_bearer.status(), StatusCode::OK);
    assert_eq!(json_body(via_bearer).await["data"]["username"], "ari");

    let via_cookie = app
        .send(
            Request::get("/api/v1/users/current-user")
                .header(header::COOKIE, format!("accessToken={}", access))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(via_cookie.status(), StatusCode::OK);

    // The refresh token is not an access credential
    let refresh = login["data"]["refreshToken"].as_str().unwrap();
    let wrong_class = app
        .send(authed(Method::GET, "/api/v1/users/current-user", refresh))
        .await;
    assert_eq!(wrong_class.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_token_is_single_use() {
    let app = TestApp::new();
    app.register("rio").await;
    let login = json_body(app.login("rio").await).await;
    let refresh = login["data"]["refreshToken"].as_str().unwrap().to_string();

    let first = app
        .send(
            Request::post("/api/v1/users/refresh-token")
                .header(header::COOKIE, format!("refreshToken={}", refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(first.status(), StatusCode::OK);
    let (rotated, _) = set_cookie(&first, "refreshToken").expect("rotated cookie");
    assert_ne!(rotated, refresh);

    // Same token again, this time in the body
    let replay = app
        .send(json_request(
            Method::POST,
            "/api/v1/users/refresh-token",
            json!({ "refreshToken": refresh }),
        ))
        .await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);

    let next = app
        .send(json_request(
            Method::POST,
            "/api/v1/users/refresh-token",
            json!({ "refreshToken": rotated }),
        ))
        .await;
    assert_eq!(next.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_without_token() {
    let app = TestApp::new();
    let response = app
        .send(
            Request::post("/api/v1/users/refresh-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_refresh_and_clears_cookies() {
    let app = TestApp::new();
    let profile = app.register("lee").await;
    let login = json_body(app.login("lee").await).await;
    let access = login["data"]["accessToken"].as_str().unwrap();
    let refresh = login["data"]["refreshToken"].as_str().unwrap();

    let logout = app
        .send(
            Request::post("/api/v1/users/logout")
                .header(
                    header::COOKIE,
                    format!("accessToken={}; refreshToken={}", access, refresh),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(logout.status(), StatusCode::OK);
    let (cleared, _) = set_cookie(&logout, "refreshToken").expect("removal cookie");
    assert!(cleared.is_empty());
    assert_eq!(app.store.stored_refresh_token(user_id(&profile["data"])).await, None);

    let after = app
        .send(json_request(
            Method::POST,
            "/api/v1/users/refresh-token",
            json!({ "refreshToken": refresh }),
        ))
        .await;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_change_password_then_login_with_new_one() {
    let app = TestApp::new();
    app.register("mo").await;
    let login = json_body(app.login("mo").await).await;
    let access = login["data"]["accessToken"].as_str().unwrap();

    let mut wrong_old = json_request(
        Method::POST,
        "/api/v1/users/change-password",
        json!({ "oldPassword": "nope", "newPassword": "fresh-password" }),
    );
    wrong_old.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", access).parse().unwrap(),
    );
    assert_eq!(app.send(wrong_old).await.status(), StatusCode::UNAUTHORIZED);

    let mut change = json_request(
        Method::POST,
        "/api/v1/users/change-password",
        json!({ "oldPassword": "hunter2-hunter2", "newPassword": "fresh-password" }),
    );
    change.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", access).parse().unwrap(),
    );
    assert_eq!(app.send(change).await.status(), StatusCode::OK);

    assert_eq!(app.login("mo").await.status(), StatusCode::UNAUTHORIZED);
    let relogin = app
        .send(json_request(
            Method::POST,
            "/api/v1/users/login",
            json!({ "username": "mo", "password": "fresh-password" }),
        ))
        .await;
    assert_eq!(relogin.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_update_account_conflict() {
    let app = TestApp::new();
    app.register("first").await;
    app.register("second").await;
    let login = json_body(app.login("second").await).await;
    let access = login["data"]["accessToken"].as_str().unwrap();

    let mut request = json_request(
        Method::PATCH,
        "/api/v1/users/update-account",
        json!({ "fullName": "Second", "email": "first@example.com", "username": "second" }),
    );
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", access).parse().unwrap(),
    );
    assert_eq!(app.send(request).await.status(), StatusCode::CONFLICT);

    let mut request = json_request(
        Method::PATCH,
        "/api/v1/users/update-account",
        json!({ "fullName": "Second Renamed", "email": "second@example.com", "username": "second" }),
    );
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", access).parse().unwrap(),
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"]["fullName"], "Second Renamed");
}

#[tokio::test]
async fn test_update_avatar_replaces_and_deletes_old_asset() {
    let app = TestApp::new();
    let profile = app.register("pix").await;
    let old_avatar = profile["data"]["avatar"].as_str().unwrap().to_string();
    let login = json_body(app.login("pix").await).await;
    let access = login["data"]["accessToken"].as_str().unwrap();

    let response = app
        .send(
            Request::patch("/api/v1/users/update-avatar")
                .header(header::AUTHORIZATION, format!("Bearer {}", access))
                .header(header::CONTENT_TYPE, multipart_content_type())
                .body(Body::from(multipart(&[], &[("avatar", "new.png")])))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_ne!(body["data"]["avatar"].as_str().unwrap(), old_avatar);
    assert_eq!(*app.blobs.deleted.lock().unwrap(), vec!["img1".to_string()]);

    let missing_file = app
        .send(
            Request::patch("/api/v1/users/update-coverimage")
                .header(header::AUTHORIZATION, format!("Bearer {}", access))
                .header(header::CONTENT_TYPE, multipart_content_type())
                .body(Body::from(multipart(&[], &[])))
                .unwrap(),
        )
        .await;
    assert_eq!(missing_file.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_channel_profile_counts_and_missing_channel() {
    let app = TestApp::new();
    let creator = app.register("creator").await;
    let viewer = app.register("viewer").await;
    app.store
        .subscribe(user_id(&viewer["data"]), user_id(&creator["data"]))
        .await;

    let login = json_body(app.login("viewer").await).await;
    let access = login["data"]["accessToken"].as_str().unwrap();

    let response = app
        .send(authed(Method::GET, "/api/v1/users/c/Creator", access))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["username"], "creator");
    assert_eq!(body["data"]["subscribersCount"], 1);
    assert_eq!(body["data"]["subscribedToCount"], 0);
    assert_eq!(body["data"]["isSubscribed"], true);

    let missing = app
        .send(authed(Method::GET, "/api/v1/users/c/nobody", access))
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_watch_history_records_in_order() {
    let app = TestApp::new();
    let creator = app.register("maker").await;
    app.register("watcher").await;
    let owner = user_id(&creator["data"]);
    let first = app.store.insert_video(owner, "first").await;
    let second = app.store.insert_video(owner, "second").await;

    let login = json_body(app.login("watcher").await).await;
    let access = login["data"]["accessToken"].as_str().unwrap();

    for video in [first, second, first] {
        let response = app
            .send(authed(
                Method::POST,
                &format!("/api/v1/users/watch-history/{}", video),
                access,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let unknown = app
        .send(authed(
            Method::POST,
            &format!("/api/v1/users/watch-history/{}", Uuid::new_v4()),
            access,
        ))
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let response = app
        .send(authed(Method::GET, "/api/v1/users/watch-history", access))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let history = body["data"].as_array().unwrap();
    let titles: Vec<_> = history.iter().map(|v| v["title"].as_str().unwrap()).collect();
    assert_eq!(titles, vec!["second", "first"]);
    assert_eq!(history[0]["owner"]["username"], "maker");
}

#[tokio::test]
async fn test_health_without_database() {
    let app = TestApp::new();
    let response = app
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["database"], "in-memory");

    let ready = app
        .send(Request::get("/health/ready").body(Body::empty()).unwrap())
        .await;
    assert_eq!(ready.status(), StatusCode::OK);
}
