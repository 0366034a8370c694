// src/routes.rs

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::Config,
    handlers::{auth, comments, health, posts, users},
    state::AppState,
    utils::jwt::{auth_middleware, optional_auth_middleware},
};

const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    match config.frontend_url.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(
                "FRONTEND_URL '{}' is not a valid origin, allowing any origin",
                config.frontend_url
            );
            cors.allow_origin(Any)
        }
    }
}

/// Assembles the main application router.
///
/// * One sub-router per resource, nested under `/api`.
/// * Routes are split into optional-auth and required-auth halves, each with
///   its own middleware, then merged.
/// * Applies global middleware (body limit, rate limit, Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let required = || from_fn_with_state(state.clone(), auth_middleware);
    let optional = || from_fn_with_state(state.clone(), optional_auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .merge(
            Router::new()
                .route("/profile", get(auth::get_profile).put(auth::update_profile))
                .route("/change-password", put(auth::change_password))
                .route("/logout", post(auth::logout))
                .route_layer(required()),
        );

    let post_routes = Router::new()
        .route("/", get(posts::list_posts))
        .route("/search", get(posts::search_posts))
        .route("/{id}", get(posts::get_post))
        .route_layer(optional())
        .merge(
            Router::new()
                .route("/", post(posts::create_post))
                .route("/{id}", put(posts::update_post).delete(posts::delete_post))
                .route("/{id}/like", post(posts::like_post))
                .route_layer(required()),
        );

    let comment_routes = Router::new()
        .route("/post/{post_id}", get(comments::list_comments))
        .route_layer(optional())
        .merge(
            Router::new()
                .route("/post/{post_id}", post(comments::create_comment))
                .route(
                    "/{id}",
                    put(comments::update_comment).delete(comments::delete_comment),
                )
                .route("/{id}/like", post(comments::like_comment))
                .route_layer(required()),
        );

    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/{username}", get(users::get_user))
        .route("/{username}/comments", get(users::user_comments))
        .merge(
            Router::new()
                .route("/{username}/posts", get(users::user_posts))
                .route_layer(optional()),
        );

    let mut app = Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/posts", post_routes)
        .nest("/api/comments", comment_routes)
        .nest("/api/users", user_routes)
        .route("/api/health", get(health::health_check))
        .fallback(health::not_found)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES));

    if state.config.rate_limit_enabled() {
        let governor_conf = GovernorConfigBuilder::default()
            .per_second(state.config.rate_limit_period_secs)
            .burst_size(state.config.rate_limit_burst)
            .finish();
        match governor_conf {
            Some(conf) => app = app.layer(GovernorLayer::new(Arc::new(conf))),
            None => tracing::warn!("Invalid rate limit settings, rate limiting disabled"),
        }
    }

    // Global Middleware (outermost first)
    let global = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config));

    app.layer(global).with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        let config = Config {
            database_url: None,
            jwt_secret: "router_test_secret".to_string(),
            jwt_expiration: 60,
            rust_log: "error".to_string(),
            port: 0,
            frontend_url: "http://localhost:3000".to_string(),
            app_env: "test".to_string(),
            rate_limit_period_secs: 0,
            rate_limit_burst: 0,
            admin_username: None,
            admin_password: None,
            admin_email: None,
        };
        create_router(AppState::in_memory(config))
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn anonymous_write_is_unauthorized() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/posts")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn anonymous_read_is_allowed() {
        let request = Request::builder().uri("/api/posts").body(Body::empty()).unwrap();

        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn bad_token_on_optional_route_is_ignored() {
        let request = Request::builder()
            .uri("/api/posts")
            .header("authorization", "Bearer garbage")
            .body(Body::empty())
            .unwrap();

        let (status, _) = send(request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unmatched_path_gets_envelope() {
        let request = Request::builder().uri("/api/nope").body(Body::empty()).unwrap();

        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Route /api/nope not found");
    }
}
