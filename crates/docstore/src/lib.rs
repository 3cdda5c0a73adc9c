//! Atelier Docstore - per-user cart and wishlist documents over HTTP.
//!
//! The hosted copy of every signed-in shopper's cart and wishlist lives here:
//! one JSONB document per user and kind, merged field by field on write and
//! pushed to subscribers over server-sent events. `atelier-sync`'s
//! `HttpRemoteStore` is the client.
//!
//! # Modules
//!
//! - [`config`] - Environment configuration
//! - [`db`] - Connection pool and the document repository
//! - [`routes`] - Health, document and change feed handlers
//! - [`middleware`] - Request IDs and bearer token checks
//! - [`state`] - Shared state and the change fan-out

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use state::AppState;

/// Build the application router (without the Sentry layers).
pub fn app(state: AppState) -> Router {
    let documents = routes::document_routes().route_layer(
        axum::middleware::from_fn_with_state(state.clone(), middleware::require_api_token),
    );

    Router::new()
        .merge(routes::health_routes())
        .nest("/users", documents)
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header::AUTHORIZATION};
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use crate::config::{DocstoreConfig, SentryConfig};

    const TOKEN: &str = "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6d";

    /// Router over a pool that never connects; only routes that fail before
    /// touching the database are exercised here.
    fn router() -> Router {
        let config = DocstoreConfig {
            database_url: SecretString::from("postgres://localhost/unused"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3100,
            api_token: SecretString::from(TOKEN),
            sentry: SentryConfig::default(),
        };
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        app(AppState::new(config, pool))
    }

    #[tokio::test]
    async fn test_documents_require_token() {
        let response = router()
            .oneshot(
                Request::get("/users/u1/cart/active")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router()
            .oneshot(
                Request::get("/users/u1/cart/active")
                    .header(AUTHORIZATION, "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_bad_request() {
        let response = router()
            .oneshot(
                Request::get("/users/u1/orders/active")
                    .header(AUTHORIZATION, format!("Bearer {TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_responses_carry_request_id() {
        let response = router()
            .oneshot(
                Request::get("/health")
                    .header(middleware::REQUEST_ID_HEADER, "req-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(middleware::REQUEST_ID_HEADER).unwrap(),
            "req-123"
        );
    }
}
