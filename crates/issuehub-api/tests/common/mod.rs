#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use issuehub_api::auth::ensure_admin;
use issuehub_api::provider::{
    CheckoutRequest, CheckoutSession, PaymentProvider, ProviderError, ProviderSession,
};
use issuehub_api::uploads::Uploads;
use issuehub_api::{AppState, AppStateInner, PaymentSettings};
use issuehub_db::Database;

pub const ADMIN_EMAIL: &str = "admin@issuehub.test";
pub const ADMIN_PASSWORD: &str = "admin-password";
pub const BOOST_PRICE: i64 = 500;
pub const PREMIUM_PRICE: i64 = 2000;
pub const CURRENCY: &str = "usd";

const BOUNDARY: &str = "issuehub-test-boundary";

/// Checkout provider double. Sessions start unpaid; tests flip them with
/// `mark_paid` or edit them with `update`.
#[derive(Default)]
pub struct MockProvider {
    sessions: Mutex<HashMap<String, ProviderSession>>,
    counter: AtomicUsize,
    stalled: AtomicBool,
}

impl MockProvider {
    pub fn mark_paid(&self, session_id: &str) {
        self.update(session_id, |s| s.payment_status = "paid".into());
    }

    pub fn update(&self, session_id: &str, f: impl FnOnce(&mut ProviderSession)) {
        let mut sessions = self.sessions.lock().unwrap();
        f(sessions.get_mut(session_id).expect("unknown session"));
    }

    /// Make every call hang past the configured timeout.
    pub fn stall(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    async fn maybe_stall(&self) {
        if self.stalled.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    async fn create_checkout(&self, req: &CheckoutRequest) -> Result<CheckoutSession, ProviderError> {
        self.maybe_stall().await;

        let id = format!("cs_test_{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        let mut metadata = HashMap::new();
        metadata.insert("kind".to_string(), req.kind.to_string());
        metadata.insert("user_id".to_string(), req.payer_id.to_string());
        if let Some(issue_id) = req.issue_id {
            metadata.insert("issue_id".to_string(), issue_id.to_string());
        }
        let url = format!("https://checkout.test/{}", id);

        self.sessions.lock().unwrap().insert(
            id.clone(),
            ProviderSession {
                id: id.clone(),
                payment_status: "unpaid".into(),
                amount_total: Some(req.amount),
                currency: Some(req.currency.clone()),
                url: Some(url.clone()),
                metadata,
            },
        );
        Ok(CheckoutSession { id, url: Some(url) })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<ProviderSession, ProviderError> {
        self.maybe_stall().await;
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or(ProviderError::SessionNotFound)
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Arc<MockProvider>,
    _uploads_dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let uploads_dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        ensure_admin(&db, "Admin", ADMIN_EMAIL, ADMIN_PASSWORD).unwrap();

        let provider = Arc::new(MockProvider::default());
        let state: AppState = Arc::new(AppStateInner {
            db,
            jwt_secret: "integration-test-secret".into(),
            token_ttl: chrono::Duration::hours(1),
            uploads: Uploads::new(uploads_dir.path().to_path_buf()).await.unwrap(),
            payments: provider.clone(),
            payment_settings: PaymentSettings {
                boost_amount: BOOST_PRICE,
                premium_amount: PREMIUM_PRICE,
                currency: CURRENCY.into(),
                provider_timeout: Duration::from_millis(200),
                client_url: "http://localhost:5173".into(),
            },
        });

        Self {
            router: issuehub_api::router(state.clone()),
            state,
            provider,
            _uploads_dir: uploads_dir,
        }
    }

    pub async fn request(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.request(req).await
    }

    pub async fn send_multipart(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        fields: &[(&str, &str)],
        file: Option<(&str, &str, &[u8])>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = builder
            .body(Body::from(multipart_body(fields, file)))
            .unwrap();
        self.request(req).await
    }

    pub async fn register_citizen(&self, name: &str) -> (String, String) {
        let email = format!("{}@citizens.test", name.to_lowercase());
        let (status, body) = self
            .send(
                Method::POST,
                "/register",
                None,
                Some(serde_json::json!({
                    "name": name,
                    "email": email,
                    "password": "citizen-password",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/login",
                None,
                Some(serde_json::json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    /// Create a staff member through the admin surface and log them in.
    pub async fn create_staff(&self, admin: &str, name: &str) -> (String, String) {
        let email = format!("{}@staff.test", name.to_lowercase());
        let (status, body) = self
            .send(
                Method::POST,
                "/admin/staff",
                Some(admin),
                Some(serde_json::json!({
                    "name": name,
                    "email": email,
                    "password": "staff-password",
                    "phone": "555-0100",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let id = body["id"].as_str().unwrap().to_string();
        (self.login(&email, "staff-password").await, id)
    }

    pub async fn create_issue(&self, token: &str, title: &str) -> (StatusCode, Value) {
        self.send_multipart(
            Method::POST,
            "/issues",
            Some(token),
            &[
                ("title", title),
                ("description", "Reported during testing"),
                ("category", "road"),
                ("location", "Main Street"),
            ],
            None,
        )
        .await
    }

    /// Create an issue that must succeed and return its id.
    pub async fn issue_id(&self, token: &str, title: &str) -> String {
        let (status, body) = self.create_issue(token, title).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_str().unwrap().to_string()
    }
}

fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
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
    if let Some((field, file_name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}
