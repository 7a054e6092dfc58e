#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;

use auth_service::auth::{AccessTokenCodec, AuthService, Claims, KeyPair};
use auth_service::configuration::{ApplicationSettings, Environment};
use auth_service::repository::{InMemoryTokenRepository, InMemoryUserRepository};
use auth_service::startup::run;

const PUBLIC_PEM: &[u8] = include_bytes!("../fixtures/jwt_public.pem");
const PRIVATE_PEM: &[u8] = include_bytes!("../fixtures/jwt_private.pem");

// Lowest cost bcrypt accepts; keeps the suite fast
const TEST_BCRYPT_COST: u32 = 4;

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

pub async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let keys = KeyPair::from_pem(PUBLIC_PEM, PRIVATE_PEM).expect("Failed to load fixture keys");
    let service = AuthService::new(
        Arc::new(InMemoryUserRepository::new()),
        Arc::new(InMemoryTokenRepository::new()),
        AccessTokenCodec::new(Arc::new(keys)),
        TEST_BCRYPT_COST,
    )
    .expect("Failed to build auth service");

    let settings = ApplicationSettings {
        host: "127.0.0.1".to_string(),
        port,
        environment: Environment::Development,
        request_timeout_ms: 5_000,
        secure_cookie: false,
    };

    let server = run(listener, service, settings).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}/api/v1/auth", port),
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(&format!("{}{}", self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_with_cookie(&self, path: &str, refresh_token: &str) -> reqwest::Response {
        self.client
            .post(&format!("{}{}", self.address, path))
            .header("Cookie", format!("refreshToken={}", refresh_token))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> reqwest::Response {
        self.post_json(
            "/register",
            &serde_json::json!({ "name": name, "email": email, "password": password }),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.post_json(
            "/login",
            &serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }
}

/// Signs arbitrary claims with the same key the test server trusts
pub fn sign_access_token(claims: &Claims) -> String {
    let keys = KeyPair::from_pem(PUBLIC_PEM, PRIVATE_PEM).expect("Failed to load fixture keys");
    AccessTokenCodec::new(Arc::new(keys))
        .sign(claims)
        .expect("Failed to sign token")
}

/// Value of the `refreshToken` cookie set by a response, if any
pub fn refresh_cookie(response: &reqwest::Response) -> Option<String> {
    set_cookie_header(response).and_then(|header| {
        header
            .split(';')
            .next()
            .and_then(|pair| pair.trim().strip_prefix("refreshToken="))
            .map(str::to_string)
    })
}

/// Raw `Set-Cookie` header for the refresh cookie
pub fn set_cookie_header(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("refreshToken="))
        .map(str::to_string)
}
