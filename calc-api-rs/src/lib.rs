//! Calculation API: triangle area and product-series endpoints.
//!
//! Each calculation route runs the same chain: the request logger records the
//! call, the endpoint's schema gates the body, then the pure calculator runs.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{to_bytes, Body},
    extract::{Extension, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

pub mod calculator;
pub mod request_log;
pub mod store;
pub mod validation;

use calculator::{ExpressionInput, ExpressionResponse, TriangleInput, TriangleResponse};
use request_log::{log_request_middleware, RequestLogger};
use store::RequestLogStore;
use validation::{
    parse_request_body, ApiValidationError, Schema, ValidatedBody, EXPRESSION_SCHEMA,
    MAX_PAYLOAD_SIZE, TRIANGLE_SCHEMA,
};

/// Default listen port
pub const DEFAULT_PORT: u16 = 3000;

pub const SERVICE_NAME: &str = "calc-api";

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub service_name: String,
    pub uptime_seconds: i64,
    pub status: String,
}

/// Core service state shared by the handlers
pub struct CalcApi {
    logger: RequestLogger,
    store: Arc<dyn RequestLogStore>,
    started_at: Instant,
}

impl CalcApi {
    pub fn new(logger: RequestLogger, store: Arc<dyn RequestLogStore>) -> Self {
        Self {
            logger,
            store,
            started_at: Instant::now(),
        }
    }

    /// Create the Axum router with all routes and middleware
    pub fn create_router(self: Arc<Self>) -> Router {
        // Layers wrap outside-in: the logger sees the request before the validator.
        let triangle = post(Self::triangle_handler)
            .layer(middleware::from_fn(Self::validate_triangle_middleware))
            .layer(middleware::from_fn_with_state(
                self.logger.clone(),
                log_request_middleware,
            ));

        let expression = post(Self::expression_handler)
            .layer(middleware::from_fn(Self::validate_expression_middleware))
            .layer(middleware::from_fn_with_state(
                self.logger.clone(),
                log_request_middleware,
            ));

        Router::new()
            .route("/calculate-triangle", triangle)
            .route("/calculate-expression", expression)
            .route("/health", get(Self::health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }

    async fn triangle_handler(
        Extension(body): Extension<ValidatedBody>,
    ) -> Result<Json<TriangleResponse>, ApiValidationError> {
        let input: TriangleInput = body.into_input()?;
        Ok(Json(input.area()))
    }

    async fn expression_handler(
        Extension(body): Extension<ValidatedBody>,
    ) -> Result<Json<ExpressionResponse>, ApiValidationError> {
        let input: ExpressionInput = body.into_input()?;
        Ok(Json(input.evaluate()))
    }

    async fn health_handler(State(state): State<Arc<Self>>) -> impl IntoResponse {
        let store_healthy = state.store.is_healthy().await;

        Json(HealthResponse {
            healthy: true,
            service_name: SERVICE_NAME.to_string(),
            uptime_seconds: state.started_at.elapsed().as_secs() as i64,
            status: if store_healthy { "SERVING" } else { "DEGRADED" }.to_string(),
        })
    }

    async fn validate_triangle_middleware(req: Request, next: Next) -> Response {
        validate_body(&TRIANGLE_SCHEMA, req, next).await
    }

    async fn validate_expression_middleware(req: Request, next: Next) -> Response {
        validate_body(&EXPRESSION_SCHEMA, req, next).await
    }
}

/// Reject the request with 400 unless its body satisfies `schema`.
///
/// The decoded body travels on as a [`ValidatedBody`] extension so handlers
/// read exactly the value that was checked.
async fn validate_body(schema: &Schema, req: Request, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();

    let body_bytes = match to_bytes(body, MAX_PAYLOAD_SIZE).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let error =
                ApiValidationError::PayloadTooLarge(format!("Failed to read request body: {}", e));
            return error.into_response();
        }
    };

    let result = parse_request_body(&parts.headers, &body_bytes).and_then(|json| {
        schema.validate(&json)?;
        Ok(json)
    });

    match result {
        Ok(json) => {
            parts.extensions.insert(ValidatedBody(json));
        }
        Err(err) => {
            tracing::debug!(path = %parts.uri.path(), error = %err, "Rejected request body");
            return err.into_response();
        }
    }

    next.run(Request::from_parts(parts, Body::from(body_bytes))).await
}
