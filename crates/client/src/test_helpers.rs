//! # テスト用共通ヘルパー
//!
//! HTTPクライアント・フローのテストで共有するモックAPI。
//! - [`start_mock_api`]: axumによるインプロセスHTTPサーバー
//! - [`MockSignApi`]: HTTPを介さない [`SignApi`] 実装（呼び出し順を記録する）

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tokio::sync::Mutex;

use residentity_core::Signer;
use residentity_types::{InitialResponse, LoginRequest, RegisterRequest, Transaction, VerifyResponse};

use crate::api::SignApi;
use crate::document::Document;
use crate::error::ClientError;

/// モックサーバーが発行するセッショントークン
pub const TEST_TOKEN: &str = "test-session-token";

/// モックサーバーが受け付けるログイン情報
pub const TEST_EMAIL: &str = "alice@example.com";
pub const TEST_PASSWORD: &str = "hunter22";

/// `prepare` が返す形の未署名トランザクション。
pub fn prepared_transaction(signer_public_key: &str, document_digest: &str) -> Transaction {
    serde_json::from_value(json!({
        "id": null,
        "version": "2.0",
        "operation": "CREATE",
        "inputs": [{
            "owners_before": [signer_public_key],
            "fulfills": null,
            "fulfillment": null,
        }],
        "outputs": [{
            "public_keys": [signer_public_key],
            "condition": {
                "uri": "ni:///sha-256;x?fpt=ed25519-sha-256&cost=131072",
                "details": {"type": "ed25519-sha-256", "public_key": signer_public_key},
            },
            "amount": "1",
        }],
        "asset": {"data": {"document_digest": document_digest, "file_name": "nda.pdf"}},
        "metadata": {"signed_at": 1700000000},
    }))
    .unwrap()
}

// ---------------------------------------------------------------------------
// HTTPモックサーバー
// ---------------------------------------------------------------------------

/// モックAPIサーバーの状態。
#[derive(Clone)]
pub struct MockApiState {
    /// `initial` が返す署名者の公開鍵
    pub signer_public_key: String,
    /// `prepare` が返すトランザクション（`None` ならダイジェスト "abc" で生成）
    pub prepared: Arc<Mutex<Option<Transaction>>>,
    /// `prepare` をメッセージ付きで失敗させる
    pub fail_prepare: Arc<Mutex<bool>>,
    /// `prepare` を本文なしで失敗させる
    pub fail_prepare_silently: Arc<Mutex<bool>>,
    /// アップロードされたファイル（ファイル名, 内容）
    pub uploads: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    /// `commit` で受け取ったトランザクション
    pub committed: Arc<Mutex<Vec<Transaction>>>,
    /// `register` で受け取ったリクエスト
    pub registered: Arc<Mutex<Vec<RegisterRequest>>>,
    /// `register` がJSONでない本文を200で返す
    pub register_malformed: Arc<Mutex<bool>>,
}

impl MockApiState {
    pub fn new(signer_public_key: &str) -> Self {
        Self {
            signer_public_key: signer_public_key.to_string(),
            prepared: Arc::new(Mutex::new(None)),
            fail_prepare: Arc::new(Mutex::new(false)),
            fail_prepare_silently: Arc::new(Mutex::new(false)),
            uploads: Arc::new(Mutex::new(Vec::new())),
            committed: Arc::new(Mutex::new(Vec::new())),
            registered: Arc::new(Mutex::new(Vec::new())),
            register_malformed: Arc::new(Mutex::new(false)),
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": {"message": message}}))).into_response()
}

fn authenticated(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| {
            value
                .split(';')
                .any(|cookie| cookie.trim() == format!("token={TEST_TOKEN}"))
        })
}

async fn read_upload(mut multipart: Multipart) -> (String, Vec<u8>) {
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.unwrap().to_vec();
            return (file_name, bytes);
        }
    }
    panic!("multipartに file フィールドがありません");
}

async fn handle_login(Json(body): Json<LoginRequest>) -> Response {
    if body.email == TEST_EMAIL && body.password == TEST_PASSWORD {
        (
            [(
                header::SET_COOKIE,
                format!("token={TEST_TOKEN}; Path=/; HttpOnly"),
            )],
            Json(json!({"message": "ok"})),
        )
            .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Invalid email or password"})),
        )
            .into_response()
    }
}

async fn handle_register(
    State(state): State<MockApiState>,
    Json(body): Json<RegisterRequest>,
) -> Response {
    if *state.register_malformed.lock().await {
        return (StatusCode::OK, "<html>maintenance</html>").into_response();
    }
    if body.email == "taken@example.com" {
        return Json(json!({"error": "Email already registered"})).into_response();
    }
    state.registered.lock().await.push(body);
    Json(json!({})).into_response()
}

async fn handle_logout() -> Response {
    (
        [(header::SET_COOKIE, "token=; Path=/; Max-Age=0")],
        Json(json!({})),
    )
        .into_response()
}

async fn handle_me(headers: HeaderMap) -> Response {
    if !authenticated(&headers) {
        return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    Json(json!({"data": {"email": TEST_EMAIL, "first_name": "Alice"}})).into_response()
}

async fn handle_initial(
    State(state): State<MockApiState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if !authenticated(&headers) {
        return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    if body["password"].as_str().unwrap_or_default().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Password is required");
    }
    Json(json!({"data": {"public_key": state.signer_public_key}})).into_response()
}

async fn handle_prepare(
    State(state): State<MockApiState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    if !authenticated(&headers) {
        return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let upload = read_upload(multipart).await;
    state.uploads.lock().await.push(upload);

    if *state.fail_prepare.lock().await {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to prepare transaction");
    }
    if *state.fail_prepare_silently.lock().await {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let prepared = state
        .prepared
        .lock()
        .await
        .clone()
        .unwrap_or_else(|| prepared_transaction(&state.signer_public_key, "abc"));
    Json(json!({"data": prepared})).into_response()
}

async fn handle_commit(
    State(state): State<MockApiState>,
    headers: HeaderMap,
    Json(signed): Json<Transaction>,
) -> Response {
    if !authenticated(&headers) {
        return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    if let Some(prepared) = state.prepared.lock().await.clone() {
        if Signer::default().verify_against(&signed, &prepared).is_err() {
            return error_response(StatusCode::BAD_REQUEST, "Invalid signature");
        }
    }
    let body = format!("%PDF-1.7 signed {}", signed.document_digest()).into_bytes();
    state.committed.lock().await.push(signed);
    ([(header::CONTENT_TYPE, "application/pdf")], body).into_response()
}

async fn handle_verify(
    State(state): State<MockApiState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    if !authenticated(&headers) {
        return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let (file_name, bytes) = read_upload(multipart).await;
    if !bytes.starts_with(b"%PDF-1.7") {
        return error_response(StatusCode::BAD_REQUEST, "Document has not been signed");
    }
    state.uploads.lock().await.push((file_name, bytes));
    Json(json!({"data": {"ownership": "Signed by: Alice\nOrganization: Example Corp"}}))
        .into_response()
}

/// モックAPIサーバーを起動し、ポート番号を返す。
pub async fn start_mock_api(state: MockApiState) -> u16 {
    use axum::routing::{get, post};

    let app = axum::Router::new()
        .route("/api/login", post(handle_login))
        .route("/api/register", post(handle_register))
        .route("/api/logout", post(handle_logout))
        .route("/api/me", get(handle_me))
        .route("/api/sign/initial", post(handle_initial))
        .route("/api/sign/prepare", post(handle_prepare))
        .route("/api/sign/commit", post(handle_commit))
        .route("/api/sign/verify", post(handle_verify))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    port
}

// ---------------------------------------------------------------------------
// インプロセスモック
// ---------------------------------------------------------------------------

/// HTTPを介さない [`SignApi`] 実装。呼び出されたフェーズ名を順に記録する。
pub struct MockSignApi {
    pub signer_public_key: String,
    pub prepared: Transaction,
    /// 指定したフェーズをこのメッセージで失敗させる
    pub fail_phase: Option<(&'static str, Option<String>)>,
    pub calls: Mutex<Vec<&'static str>>,
    pub committed: Mutex<Vec<Transaction>>,
}

impl MockSignApi {
    pub fn new(signer_public_key: &str, prepared: Transaction) -> Self {
        Self {
            signer_public_key: signer_public_key.to_string(),
            prepared,
            fail_phase: None,
            calls: Mutex::new(Vec::new()),
            committed: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, phase: &'static str, message: Option<&str>) -> Self {
        self.fail_phase = Some((phase, message.map(str::to_string)));
        self
    }

    async fn record(&self, phase: &'static str) -> Result<(), ClientError> {
        self.calls.lock().await.push(phase);
        match &self.fail_phase {
            Some((failing, message)) if *failing == phase => {
                Err(ClientError::network(message.clone()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl SignApi for MockSignApi {
    async fn initial(&self, _password: &str) -> Result<InitialResponse, ClientError> {
        self.record("initial").await?;
        Ok(InitialResponse {
            public_key: self.signer_public_key.clone(),
        })
    }

    async fn prepare(&self, _document: &Document) -> Result<Transaction, ClientError> {
        self.record("prepare").await?;
        Ok(self.prepared.clone())
    }

    async fn commit(&self, signed: &Transaction) -> Result<Vec<u8>, ClientError> {
        self.record("commit").await?;
        self.committed.lock().await.push(signed.clone());
        Ok(b"%PDF-1.7 signed".to_vec())
    }

    async fn verify(&self, _document: &Document) -> Result<VerifyResponse, ClientError> {
        self.record("verify").await?;
        Ok(VerifyResponse {
            ownership: "Signed by: Alice\n\nOrganization: Example Corp\n".to_string(),
        })
    }
}
