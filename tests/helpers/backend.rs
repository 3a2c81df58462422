use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

/// Number of failures `/api/flaky` answers with before it succeeds.
pub const FLAKY_FAILURES: usize = 2;

#[derive(Clone, Default)]
struct Hits {
    by_path: Arc<Mutex<HashMap<String, usize>>>,
}

impl Hits {
    fn record(&self, path: &str) -> usize {
        let mut by_path = self.by_path.lock().unwrap();
        let n = by_path.entry(path.to_string()).or_default();
        *n += 1;
        *n
    }

    fn get(&self, path: &str) -> usize {
        self.by_path.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

/// In-process stand-in for the REST backend, listening on an ephemeral port.
/// Every request is counted by path before it reaches its handler.
pub struct MockBackend {
    addr: SocketAddr,
    hits: Hits,
    handle: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let hits = Hits::default();

        let app = Router::new()
            .route("/api/health", get(|| async { Json(json!({"status": "UP"})) }))
            .route("/api/slow", get(slow))
            .route("/api/hang", get(hang))
            .route("/api/flaky", get(flaky))
            .route("/api/broken", get(broken))
            .route("/api/text", get(|| async { "pong" }))
            .route("/api/badjson", get(bad_json))
            .route("/api/dashboard/metrics", get(dashboard_metrics))
            .route("/api/dashboard/recent-clients", get(recent_clients))
            .route("/api/dashboard/recent-sales", get(recent_sales))
            .route("/api/whoami", get(whoami))
            .route("/api/echo", post(echo))
            .route("/api/users/login", post(login))
            .route("/api/clientes", get(clientes).post(echo))
            .layer(middleware::from_fn_with_state(hits.clone(), count))
            .with_state(hits.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock backend");
        let addr = listener.local_addr().expect("No local address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock backend failed");
        });

        Self { addr, hits, handle }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url(), endpoint)
    }

    /// Requests received for `endpoint` (e.g. "/flaky").
    pub fn hits(&self, endpoint: &str) -> usize {
        self.hits.get(&format!("/api{endpoint}"))
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn count(State(hits): State<Hits>, request: Request, next: Next) -> Response {
    hits.record(request.uri().path());
    next.run(request).await
}

async fn slow(State(hits): State<Hits>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(150)).await;
    Json(json!({"served": hits.get("/api/slow")}))
}

async fn hang() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({"late": true}))
}

async fn flaky(State(hits): State<Hits>) -> Response {
    if hits.get("/api/flaky") <= FLAKY_FAILURES {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    Json(json!({"ok": true})).into_response()
}

async fn broken() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn whoami(headers: HeaderMap) -> Json<Value> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Json(json!({ "authorization": auth }))
}

async fn echo(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, Json(body))
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["senha"] != "secret" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Código de acesso ou senha inválidos"})),
        )
            .into_response();
    }
    Json(json!({
        "idUser": 7,
        "nome": "Carla Mendes",
        "email": "carla@maiconsoft.com",
        "codigoAcesso": body["codigoAcesso"],
        "tipoUsuario": "VENDEDOR",
        "success": true,
        "message": "Login realizado com sucesso",
        "token": "tok-7"
    }))
    .into_response()
}

async fn clientes(State(hits): State<Hits>) -> Json<Value> {
    Json(json!({
        "content": [{"id": 1, "nome": "Construtora Alfa"}],
        "served": hits.get("/api/clientes")
    }))
}

/// Claims JSON but sends a truncated document.
async fn bad_json() -> Response {
    ([(header::CONTENT_TYPE, "application/json")], "{\"content\": [").into_response()
}

async fn dashboard_metrics(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let days: u32 = params.get("days").and_then(|d| d.parse().ok()).unwrap_or(30);
    Json(json!({
        "totalClients": 42,
        "totalSales": 17,
        "totalRevenue": 125000.5,
        "days": days
    }))
}

fn limited(params: &HashMap<String, String>, rows: Vec<Value>) -> Vec<Value> {
    let limit = params
        .get("limit")
        .and_then(|l| l.parse().ok())
        .unwrap_or(10);
    rows.into_iter().take(limit).collect()
}

async fn recent_clients(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let rows = (1..=12)
        .map(|id| json!({"id": id, "nome": format!("Cliente {id}"), "cidade": "Curitiba"}))
        .collect();
    Json(json!({ "clients": limited(&params, rows) }))
}

/// Wrapped in `data`, the shape the dashboard page also accepts.
async fn recent_sales(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let rows = (1..=3)
        .map(|id| json!({"id": id, "numeroOrcamento": format!("ORC-{id:03}"), "valorTotal": 1000 * id}))
        .collect();
    Json(json!({ "success": true, "data": { "sales": limited(&params, rows) } }))
}
