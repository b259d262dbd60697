use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;
use tower::ServiceExt;

use study_quiz::config::ServerConfig;
use study_quiz::db::create_pool;
use study_quiz::server::{self, AppState};

const BOUNDARY: &str = "study-quiz-test-boundary";

fn config(upload_dir: PathBuf) -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "integration-secret".to_string(),
        cors_origin: "*".to_string(),
        upload_dir,
        // Nothing listens on the discard port, so generation always falls back.
        mcp_url: "http://127.0.0.1:9".to_string(),
        fallback_questions_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/questions"),
        quiz_page_url: "http://localhost/quiz".to_string(),
        mcp_health_timeout: Duration::from_millis(500),
        mcp_generate_timeout: Duration::from_secs(1),
        reminders_enabled: false,
    }
}

async fn app(upload_dir: PathBuf) -> Router {
    let config = config(upload_dir);
    let pool = create_pool(&config.database_url).await.unwrap();
    server::router(AppState::new(pool, &config), &config.cors_origin)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn upload_request(token: &str, file_name: &str, content_type: &str, data: &[u8], tags: &str) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"tags\"\r\n\r\n{tags}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n\
             Content-Type: {ct}\r\n\r\n",
            b = BOUNDARY,
            tags = tags,
            name = file_name,
            ct = content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/files")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn register_and_login(app: &Router, email: &str) -> String {
    let creds = json!({"email": email, "password": "hunter22"});
    let (status, body) = send(app, json_request("POST", "/api/auth/register", creds.clone(), None)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, body) = send(app, json_request("POST", "/api/auth/login", creds, None)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["data"]["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_and_unknown_route() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path().to_path_buf()).await;

    let (status, body) = send(&app, get("/api/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["database"], "connected");

    let (status, body) = send(&app, get("/api/nope", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_account_flow() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path().to_path_buf()).await;

    let (status, body) = send(&app, json_request("POST", "/api/auth/register", json!({"email": "a@b.c"}), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_FIELDS");

    let token = register_and_login(&app, "student@example.com").await;

    let duplicate = json!({"email": "student@example.com", "password": "other"});
    let (status, body) = send(&app, json_request("POST", "/api/auth/register", duplicate, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "REGISTER_ERROR");

    let wrong = json!({"email": "student@example.com", "password": "wrong"});
    let (status, body) = send(&app, json_request("POST", "/api/auth/login", wrong, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "LOGIN_ERROR");

    let (status, body) = send(&app, get("/api/auth/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "NO_TOKEN");

    let (status, body) = send(&app, get("/api/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "student@example.com");
    assert_eq!(body["data"]["quizReminderTime"], "");

    let (status, body) = send(
        &app,
        json_request("PATCH", "/api/user/reminder-time", json!({"time": "25:00"}), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_TIME");

    let (status, body) = send(
        &app,
        json_request("PATCH", "/api/user/reminder-time", json!({"time": "07:45"}), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["quizReminderTime"], "07:45");
}

#[tokio::test]
async fn test_quiz_falls_back_and_navigates() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path().to_path_buf()).await;

    let (status, body) = send(
        &app,
        json_request("POST", "/api/quiz/start", json!({"tags": ["Python"], "questionCount": 3}), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let data = &body["data"];
    assert_eq!(data["source"], "fallback");
    assert_eq!(data["totalQuestions"], 3);
    assert_eq!(data["currentIndex"], 0);
    assert_eq!(data["currentQuestion"]["id"], 1);
    let session_id = data["sessionId"].as_str().unwrap().to_string();

    let (_, body) = send(&app, json_request("POST", "/api/quiz/prev", json!({"sessionId": session_id}), None)).await;
    assert_eq!(body["data"]["currentIndex"], 0);
    assert_eq!(body["data"]["isFirstQuestion"], true);

    for _ in 0..4 {
        send(&app, json_request("POST", "/api/quiz/next", json!({"sessionId": session_id}), None)).await;
    }
    let (_, body) = send(&app, json_request("POST", "/api/quiz/next", json!({"sessionId": session_id}), None)).await;
    assert_eq!(body["data"]["currentIndex"], 2);
    assert_eq!(body["data"]["isLastQuestion"], true);

    let correct = body["data"]["currentQuestion"]["correctAnswer"].as_i64().unwrap();
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/quiz/answer",
            json!({"sessionId": session_id, "questionIndex": 2, "selectedOption": correct}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isCorrect"], true);
    assert_eq!(body["data"]["correctAnswer"], correct);

    let (status, body) = send(&app, get(&format!("/api/quiz/{}", session_id), None)).await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["currentIndex"], 2);
    assert_eq!(data["tags"], json!(["Python"]));
    assert_eq!(data["answers"].as_array().unwrap().len(), 3);
    assert!(data["answers"][0].is_null());
    assert_eq!(data["answers"][2]["isCorrect"], true);
}

#[tokio::test]
async fn test_quiz_generic_fallback_for_unknown_topic() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path().to_path_buf());
    config.fallback_questions_dir = dir.path().join("no-banks-here");
    let pool = create_pool(&config.database_url).await.unwrap();
    let app = server::router(AppState::new(pool, &config), "*");

    let (status, body) = send(&app, json_request("POST", "/api/quiz/start", json!({"tags": ["sql"]}), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["source"], "generic");
    assert_eq!(body["data"]["totalQuestions"], 10);
}

#[tokio::test]
async fn test_quiz_validation_errors() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path().to_path_buf()).await;

    let (status, body) = send(
        &app,
        json_request("POST", "/api/quiz/start", json!({"tags": "sql", "questionCount": 3}), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");

    let (status, body) = send(
        &app,
        json_request("POST", "/api/quiz/start", json!({"tags": [], "questionCount": "ten"}), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");

    let (status, body) = send(&app, json_request("POST", "/api/quiz/answer", json!({"sessionId": "x"}), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_FIELDS");

    let (status, body) = send(&app, json_request("POST", "/api/quiz/next", json!({}), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_SESSION_ID");

    let (status, body) = send(&app, json_request("POST", "/api/quiz/next", json!({"sessionId": "missing"}), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");

    let (_, body) = send(&app, json_request("POST", "/api/quiz/start", json!({"questionCount": 2}), None)).await;
    let session_id = body["data"]["sessionId"].as_str().unwrap().to_string();
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/quiz/answer",
            json!({"sessionId": session_id, "questionIndex": 5, "selectedOption": 0}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_QUESTION_INDEX");
}

#[tokio::test]
async fn test_malformed_bodies_use_error_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path().to_path_buf()).await;

    let not_json = Request::builder()
        .method("POST")
        .uri("/api/quiz/start")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"tags\": ["))
        .unwrap();
    let (status, body) = send(&app, not_json).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
    assert!(body["timestamp"].is_string());

    let no_content_type = Request::builder()
        .method("POST")
        .uri("/api/quiz/next")
        .body(Body::from(json!({"sessionId": "x"}).to_string()))
        .unwrap();
    let (status, body) = send(&app, no_content_type).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");

    let wrong_shape = json!({"email": 42, "password": "hunter22"});
    let (status, body) = send(&app, json_request("POST", "/api/auth/register", wrong_shape, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_upload_and_list_files() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path().to_path_buf()).await;
    let token = register_and_login(&app, "uploader@example.com").await;

    let (status, body) = send(
        &app,
        upload_request(&token, "notes.pdf", "application/pdf", b"%PDF-1.4 not really a pdf", "sql, databases"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let saved = &body["data"][0];
    assert_eq!(saved["originalName"], "notes.pdf");
    assert_eq!(saved["tags"], json!(["sql", "databases"]));
    assert!(saved["textLength"].is_null());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

    let (status, body) = send(
        &app,
        upload_request(&token, "notes.txt", "text/plain", b"plain text", "sql"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "PROCESSING_FAILED");

    let (status, body) = send(&app, get("/api/files?tag=sql&sortBy=size&order=asc", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["isProcessed"], false);

    let (_, body) = send(&app, get("/api/files?tag=python", Some(&token))).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = send(&app, get("/api/files", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Quiz sessions record the ids of files carrying the first tag.
    let (_, body) = send(&app, json_request("POST", "/api/quiz/start", json!({"tags": ["sql"], "questionCount": 1}), None)).await;
    assert_eq!(body["data"]["totalQuestions"], 1);
    let session_id = body["data"]["sessionId"].as_str().unwrap();
    let (_, body) = send(&app, get(&format!("/api/quiz/{}", session_id), None)).await;
    assert_eq!(body["data"]["fileIds"].as_array().unwrap().len(), 1);
}
