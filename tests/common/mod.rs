#![allow(dead_code)]

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use ocr_client::OcrClient;
use ocr_client::config::Config;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// In-process stand-in for the gateway's `/api` surface.
#[derive(Default)]
pub struct GatewayState {
    pub valid_access: Mutex<String>,
    pub valid_refresh: Mutex<String>,
    pub documents: Mutex<Vec<Value>>,
    pub seen_auth: Mutex<Vec<String>>,
    pub last_batch: Mutex<Option<(String, Value)>>,
    pub refresh_calls: AtomicUsize,
    pub document_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub refresh_status: Mutex<Option<u16>>,
    pub refresh_malformed: Mutex<bool>,
    pub refresh_delay: Mutex<Duration>,
    pub batch_status: Mutex<Option<u16>>,
    pub reject_all: Mutex<bool>,
}

pub struct MockGateway {
    pub addr: SocketAddr,
    pub state: Arc<GatewayState>,
}

impl MockGateway {
    pub async fn spawn() -> Self {
        let state = Arc::new(GatewayState::default());
        let app = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/register", post(register))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/documents", get(list_documents).post(upload_document))
            .route("/api/documents/process-batch", post(process_batch))
            .route("/api/documents/process-batch-ocr", post(process_batch_ocr))
            .route("/api/documents/{id}", get(get_document).delete(delete_document))
            .route("/api/documents/{id}/process", post(requeue_document))
            .route("/api/documents/{id}/binary", get(document_binary))
            .route("/api/plain", get(|| async { "pong" }))
            .route("/api/empty", get(|| async { StatusCode::OK }))
            .route("/api/fail", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }))
            .route("/api/fail-empty", get(|| async { StatusCode::BAD_GATEWAY }))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock gateway");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock gateway crashed");
        });
        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Invalidate the current access token; the refresh token stays valid.
    pub fn expire_access(&self) {
        *self.state.valid_access.lock().unwrap() = "expired".to_string();
    }

    pub fn set_documents(&self, docs: Vec<Value>) {
        *self.state.documents.lock().unwrap() = docs;
    }

    pub fn set_status(&self, id: &str, status: &str) {
        for doc in self.state.documents.lock().unwrap().iter_mut() {
            if doc["id"] == id {
                doc["status"] = json!(status);
            }
        }
    }

    pub fn seen_auth(&self) -> Vec<String> {
        self.state.seen_auth.lock().unwrap().clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.state.batch_calls.load(Ordering::SeqCst)
    }
}

/// A document as the gateway's `DocumentRead` serializes it: naive UTC timestamps,
/// `owner_id`, and `queued_preprocessing` spelled the server's way.
pub fn doc_json(id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "owner_id": "42",
        "filename": format!("{id}.png"),
        "content_type": "image/png",
        "size_bytes": 1024,
        "status": status,
        "created_at": "2025-01-01T00:00:00.000123",
        "updated_at": "2025-01-01T00:00:00.000123",
        "error_message": if status == "failed" { json!("could not read image") } else { Value::Null },
        "ocr_text": if status == "completed" { json!("hello world") } else { Value::Null },
    })
}

pub fn config_for(gateway: &MockGateway, dir: &TempDir) -> Config {
    Config {
        api_base_url: gateway.base_url(),
        database_url: format!("sqlite:{}", dir.path().join("state.sqlite").display()),
        poll_interval_ms: 20,
        ..Config::default()
    }
}

pub async fn client_for(gateway: &MockGateway, dir: &TempDir) -> OcrClient {
    OcrClient::connect(&config_for(gateway, dir))
        .await
        .expect("client connect")
}

pub async fn logged_in_client(gateway: &MockGateway, dir: &TempDir) -> OcrClient {
    let client = client_for(gateway, dir).await;
    client
        .session()
        .login("a@x.com", "p")
        .await
        .expect("login");
    client
}

fn authorized(st: &GatewayState, headers: &HeaderMap) -> bool {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    st.seen_auth.lock().unwrap().push(auth.clone());
    if *st.reject_all.lock().unwrap() {
        return false;
    }
    let expected = format!("Bearer {}", st.valid_access.lock().unwrap());
    auth == expected
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "invalid token").into_response()
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(State(st): State<Arc<GatewayState>>, Json(body): Json<LoginBody>) -> Response {
    if body.email != "a@x.com" || body.password != "p" {
        return (StatusCode::UNAUTHORIZED, "invalid credentials").into_response();
    }
    *st.valid_access.lock().unwrap() = "a1".to_string();
    *st.valid_refresh.lock().unwrap() = "r1".to_string();
    Json(json!({"access_token": "a1", "refresh_token": "r1", "token_type": "bearer"})).into_response()
}

async fn register(Json(body): Json<Value>) -> Response {
    (
        StatusCode::CREATED,
        Json(json!({
            "id": 7,
            "email": body["email"],
            "full_name": body["full_name"],
            "created_at": "2025-01-01T00:00:00.000123",
            "updated_at": "2025-01-01T00:00:00.000123",
        })),
    )
        .into_response()
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh_token: String,
}

async fn refresh(State(st): State<Arc<GatewayState>>, Json(body): Json<RefreshBody>) -> Response {
    let n = st.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let delay = *st.refresh_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    if let Some(code) = *st.refresh_status.lock().unwrap() {
        return (StatusCode::from_u16(code).unwrap(), "refresh denied").into_response();
    }
    if body.refresh_token != *st.valid_refresh.lock().unwrap() {
        return (StatusCode::UNAUTHORIZED, "invalid refresh token").into_response();
    }
    if *st.refresh_malformed.lock().unwrap() {
        return Json(json!({"access_token": "half"})).into_response();
    }
    let access = format!("a{}", n + 1);
    let refresh = format!("r{}", n + 1);
    *st.valid_access.lock().unwrap() = access.clone();
    *st.valid_refresh.lock().unwrap() = refresh.clone();
    Json(json!({"access_token": access, "refresh_token": refresh})).into_response()
}

async fn list_documents(State(st): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    if !authorized(&st, &headers) {
        return unauthorized();
    }
    st.document_calls.fetch_add(1, Ordering::SeqCst);
    Json(Value::Array(st.documents.lock().unwrap().clone())).into_response()
}

async fn get_document(
    State(st): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !authorized(&st, &headers) {
        return unauthorized();
    }
    let docs = st.documents.lock().unwrap();
    match docs.iter().find(|d| d["id"] == id.as_str()) {
        Some(doc) => Json(doc.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "Document not found").into_response(),
    }
}

async fn delete_document(
    State(st): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !authorized(&st, &headers) {
        return unauthorized();
    }
    st.documents.lock().unwrap().retain(|d| d["id"] != id.as_str());
    StatusCode::NO_CONTENT.into_response()
}

async fn requeue_document(
    State(st): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !authorized(&st, &headers) {
        return unauthorized();
    }
    let mut docs = st.documents.lock().unwrap();
    match docs.iter_mut().find(|d| d["id"] == id.as_str()) {
        Some(doc) => {
            doc["status"] = json!("queued_preprocessing");
            doc["error_message"] = Value::Null;
            Json(doc.clone()).into_response()
        }
        None => (StatusCode::NOT_FOUND, "Document not found").into_response(),
    }
}

async fn upload_document(
    State(st): State<Arc<GatewayState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if !authorized(&st, &headers) {
        return unauthorized();
    }
    st.upload_calls.fetch_add(1, Ordering::SeqCst);
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.unwrap_or_default();
        if data.is_empty() {
            return (StatusCode::BAD_REQUEST, "empty file").into_response();
        }
        let mut doc = doc_json("new", "uploaded");
        doc["filename"] = json!(filename);
        doc["content_type"] = json!(content_type);
        doc["size_bytes"] = json!(data.len());
        st.documents.lock().unwrap().push(doc.clone());
        return (StatusCode::CREATED, Json(json!({ "document": doc }))).into_response();
    }
    (StatusCode::UNPROCESSABLE_ENTITY, "missing file").into_response()
}

async fn process_batch(
    State(st): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    run_batch(&st, &headers, "/documents/process-batch", "queued_preprocessing", body)
}

async fn process_batch_ocr(
    State(st): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    run_batch(&st, &headers, "/documents/process-batch-ocr", "queued_ocr", body)
}

fn run_batch(st: &GatewayState, headers: &HeaderMap, path: &str, status: &str, body: Value) -> Response {
    if !authorized(st, headers) {
        return unauthorized();
    }
    st.batch_calls.fetch_add(1, Ordering::SeqCst);
    *st.last_batch.lock().unwrap() = Some((path.to_string(), body.clone()));
    if let Some(code) = *st.batch_status.lock().unwrap() {
        return (StatusCode::from_u16(code).unwrap(), "No documents could be queued.").into_response();
    }
    let ids: Vec<String> = body["document_ids"]
        .as_array()
        .map(|ids| ids.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let mut processed = Vec::new();
    let mut errors = HashMap::new();
    let mut docs = st.documents.lock().unwrap();
    for id in ids {
        match docs.iter_mut().find(|d| d["id"] == id.as_str()) {
            Some(doc) => {
                doc["status"] = json!(status);
                doc["error_message"] = Value::Null;
                processed.push(id);
            }
            None => {
                errors.insert(id, "Document not found or access denied".to_string());
            }
        }
    }
    (
        StatusCode::ACCEPTED,
        Json(json!({"message": "Batch processing started", "processed_ids": processed, "errors": errors})),
    )
        .into_response()
}

#[derive(Deserialize)]
struct BinaryQuery {
    variant: Option<String>,
}

async fn document_binary(
    State(st): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(q): Query<BinaryQuery>,
) -> Response {
    if !authorized(&st, &headers) {
        return unauthorized();
    }
    let variant = q.variant.unwrap_or_else(|| "original".to_string());
    let body = Bytes::from(format!("{id}:{variant}"));
    ([(header::CONTENT_TYPE, "image/png")], body).into_response()
}
