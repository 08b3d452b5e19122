#![allow(dead_code)]

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use nexro::repositories::{memory::MemoryStore, payments::recording::RecordingGateway};
use nexro::services::{
    http::{router, AppState},
    registry::ConnectionRegistry,
    sessions::SessionIssuer,
    spawn_services,
};
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};

pub const JWT_SECRET: &str = "integration-secret";

pub struct TestApp {
    pub addr: SocketAddr,
    pub store: MemoryStore,
    pub gateway: RecordingGateway,
    pub sessions: SessionIssuer,
    pub registry: ConnectionRegistry,
    pub client: Client,
}

/// Serves the full router on an ephemeral port, backed by in-memory
/// repositories and a recording payment gateway.
pub async fn spawn_app() -> TestApp {
    let store = MemoryStore::new();
    let gateway = RecordingGateway::new();
    let sessions = SessionIssuer::new(JWT_SECRET, 3600);
    let registry = ConnectionRegistry::new();

    let channels = spawn_services(
        store.repositories(),
        Arc::new(gateway.clone()),
        sessions.clone(),
        registry.clone(),
        "usd".to_string(),
    );
    let app = router(AppState {
        channels,
        sessions: sessions.clone(),
        registry: registry.clone(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        addr,
        store,
        gateway,
        sessions,
        registry,
        client: Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Response {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap()
    }

    pub async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&str>,
        body: Value,
    ) -> Response {
        let mut request = self.client.request(method, self.url(path)).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap()
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> Response {
        self.send(reqwest::Method::POST, path, token, body).await
    }

    pub async fn patch(&self, path: &str, token: Option<&str>) -> Response {
        self.send(reqwest::Method::PATCH, path, token, json!({})).await
    }

    /// Registers and logs in, returning `(user_id, token)`.
    pub async fn sign_up(&self, email: &str, name: &str) -> (i64, String) {
        let response = self
            .post(
                "/api/users/register",
                None,
                json!({"email": email, "password": "password123", "name": name}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let user_id = response.json::<Value>().await.unwrap()["userId"]
            .as_i64()
            .unwrap();

        let response = self
            .post(
                "/api/users/login",
                None,
                json!({"email": email, "password": "password123"}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let token = response.json::<Value>().await.unwrap()["token"]
            .as_str()
            .unwrap()
            .to_string();

        (user_id, token)
    }

    pub async fn post_problem(&self, token: &str, title: &str, bounty: i64) -> i64 {
        let response = self
            .post(
                "/api/problems",
                Some(token),
                json!({"title": title, "description": "Needs fixing", "bounty": bounty}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json::<Value>().await.unwrap()["problem"]["id"]
            .as_i64()
            .unwrap()
    }

    pub async fn post_solution(&self, token: &str, problem_id: i64, description: &str) -> i64 {
        let response = self
            .post(
                "/api/solutions",
                Some(token),
                json!({"problem_id": problem_id, "description": description}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json::<Value>().await.unwrap()["solution"]["id"]
            .as_i64()
            .unwrap()
    }
}

/// Polls `check` until it yields a value; notifications are written
/// asynchronously after the request that caused them returns.
pub async fn eventually<T, F, Fut>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for _ in 0..100 {
        if let Some(value) = check().await {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met in time");
}
