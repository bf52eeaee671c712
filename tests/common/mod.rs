#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use nyumba::config::Config;
use nyumba::db;
use nyumba::state::{AppState, DbPool};

pub const ADMIN_EMAIL: &str = "admin@nyumba.test";
pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const PASSWORD: &str = "secret123";

/// The full router over a throwaway database and uploads directory.
pub struct TestApp {
    _tmp: TempDir,
    pub state: AppState,
    pub app: Router,
}

pub struct Account {
    pub id: String,
    pub token: String,
    pub user: Value,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.resolve_paths(tmp.path());
        config.auth.bcrypt_cost = 4;
        config.admin.emails = vec![ADMIN_EMAIL.to_string()];
        config.payments.webhook_secret = Some(WEBHOOK_SECRET.to_string());
        adjust(&mut config);

        let pool = db::create_pool(&config.db_path()).expect("Failed to create test database");
        db::run_migrations(&pool).expect("Failed to run migrations");

        let state = AppState::new(pool, config);
        let app = nyumba::routes::router(state.clone());
        Self {
            _tmp: tmp,
            state,
            app,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.state.db
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, token, None).await
    }

    pub async fn register(&self, name: &str, email: &str, role: &str) -> Account {
        self.register_with(serde_json::json!({
            "name": name,
            "email": email,
            "password": PASSWORD,
            "role": role,
        }))
        .await
    }

    pub async fn register_with(&self, body: Value) -> Account {
        let (status, body) = self.post("/api/users/register", None, body).await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        Account {
            id: body["user"]["id"].as_str().unwrap().to_string(),
            token: body["token"].as_str().unwrap().to_string(),
            user: body["user"].clone(),
        }
    }

    pub async fn landlord(&self) -> Account {
        self.register("Njeri Landlord", "njeri@nyumba.test", "landlord")
            .await
    }

    pub async fn tenant(&self) -> Account {
        self.register("Baraka Tenant", "baraka@nyumba.test", "tenant")
            .await
    }

    pub async fn admin(&self) -> Account {
        self.register("Admin", ADMIN_EMAIL, "tenant").await
    }

    pub async fn create_listing(&self, token: &str, body: Value) -> Value {
        let (status, listing) = self.post("/api/listings", Some(token), body).await;
        assert_eq!(status, StatusCode::CREATED, "create listing failed: {listing}");
        listing
    }
}

pub fn listing_body(title: &str, price: i64, bedrooms: i64) -> Value {
    serde_json::json!({
        "title": title,
        "description": "Spacious and bright",
        "price": price,
        "location": "Kilimani, Nairobi",
        "bedrooms": bedrooms,
        "bathrooms": 1,
        "propertyType": "apartment",
    })
}

/// Hand-built multipart body with one part per `(field, filename, content type, bytes)`.
pub fn multipart_request(
    uri: &str,
    token: &str,
    parts: &[(&str, &str, &str, &[u8])],
) -> Request<Body> {
    let boundary = "nyumba-test-boundary";
    let mut body = Vec::new();
    for (field, filename, content_type, bytes) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}
