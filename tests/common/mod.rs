// tests/common/mod.rs

#![allow(dead_code)]

use std::net::SocketAddr;

use connecthub::{
    config::Config,
    models::user::Role,
    repository::NewUser,
    routes,
    state::AppState,
    utils::hash::hash_password,
};
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;

pub const PASSWORD: &str = "password123";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub state: AppState,
}

fn test_config() -> Config {
    Config {
        database_url: None,
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        port: 0,
        frontend_url: "http://localhost:3000".to_string(),
        app_env: "test".to_string(),
        rate_limit_period_secs: 0,
        rate_limit_burst: 0,
        admin_username: None,
        admin_password: None,
        admin_email: None,
    }
}

/// Spawns the app on a random port, backed by a fresh in-memory store.
pub async fn spawn_app() -> TestApp {
    serve(AppState::in_memory(test_config())).await
}

/// Spawns the app against the database in `DATABASE_URL`, or `None` when it is unset.
///
/// The database is shared between tests and runs, so callers must only assert
/// on rows they created themselves.
pub async fn spawn_postgres_app() -> Option<TestApp> {
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => url,
        _ => {
            eprintln!("DATABASE_URL not set, skipping Postgres test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: Some(database_url),
        ..test_config()
    };
    Some(serve(AppState::postgres(pool, config)).await)
}

async fn serve(state: AppState) -> TestApp {
    let app = routes::create_router(state.clone());

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        state,
    }
}

/// Short unique username (UUID prefix keeps it under 20 chars).
pub fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..8])
}

pub struct TestUser {
    pub id: i64,
    pub username: String,
    pub token: String,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn register(&self, prefix: &str) -> TestUser {
        let username = unique_name(prefix);
        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": PASSWORD
            }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);

        let body: Value = response.json().await.unwrap();
        TestUser {
            id: body["data"]["user"]["id"].as_i64().unwrap(),
            username,
            token: body["data"]["token"].as_str().unwrap().to_string(),
        }
    }

    /// Admins cannot self-register; insert directly, then log in over HTTP.
    pub async fn admin(&self) -> TestUser {
        let username = unique_name("admin");
        self.state
            .users
            .create_user(NewUser {
                username: username.clone(),
                email: format!("{}@example.com", username),
                password_hash: hash_password(PASSWORD).unwrap(),
                role: Role::Admin,
            })
            .await
            .unwrap();

        let body: Value = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": PASSWORD }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        TestUser {
            id: body["data"]["user"]["id"].as_i64().unwrap(),
            username,
            token: body["data"]["token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn create_post(&self, token: &str, title: &str, content: &str) -> i64 {
        let response = self
            .client
            .post(self.url("/api/posts"))
            .bearer_auth(token)
            .json(&json!({ "title": title, "content": content, "category": "tech" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);

        let body: Value = response.json().await.unwrap();
        body["data"]["id"].as_i64().unwrap()
    }

    pub async fn post_comment(
        &self,
        token: &str,
        post_id: i64,
        parent: Option<i64>,
        content: &str,
    ) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/comments/post/{}", post_id)))
            .bearer_auth(token)
            .json(&json!({ "content": content, "parent_comment": parent }))
            .send()
            .await
            .unwrap()
    }

    /// Creates a comment and returns its id.
    pub async fn comment(
        &self,
        token: &str,
        post_id: i64,
        parent: Option<i64>,
        content: &str,
    ) -> i64 {
        let response = self.post_comment(token, post_id, parent, content).await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        body["data"]["id"].as_i64().unwrap()
    }

    pub async fn get_json(&self, path: &str, token: Option<&str>) -> (u16, Value) {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }
}
