//! HTTP routes for payments and subscriptions.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::layer::{enforce_rate_limit, RouteLimit};
use crate::billing::{BillingApi, BillingError, NewSubscription, SubscriptionStatus};
use crate::error::Result;
use crate::ratelimit::policies::BILLING;
use crate::ratelimit::{RateLimitPolicies, RateLimiter};

/// Shared state for the billing routes.
#[derive(Clone)]
pub struct AppState {
    pub billing: Arc<dyn BillingApi>,
}

/// Build the application router.
///
/// Billing routes are rate limited under the `billing` policy; `/health` is not
/// limited.
pub fn router(
    billing: Arc<dyn BillingApi>,
    limiter: Arc<RateLimiter>,
    policies: &RateLimitPolicies,
) -> Result<Router> {
    let billing_limit = RouteLimit::new(limiter, BILLING, policies.require(BILLING)?);

    let billing_routes = Router::new()
        .route("/api/payments/{id}", get(get_payment))
        .route("/api/subscriptions", post(create_subscription))
        .route(
            "/api/subscriptions/{id}",
            get(get_subscription)
                .patch(update_subscription)
                .delete(cancel_subscription),
        )
        .route_layer(middleware::from_fn_with_state(billing_limit, enforce_rate_limit))
        .with_state(AppState { billing });

    Ok(Router::new().route("/health", get(health)).merge(billing_routes))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Value>, ApiError> {
    Ok(Json(state.billing.get_payment(&id).await?))
}

async fn get_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Value>, ApiError> {
    Ok(Json(state.billing.get_subscription(&id).await?))
}

async fn create_subscription(
    State(state): State<AppState>,
    Json(subscription): Json<NewSubscription>,
) -> std::result::Result<(StatusCode, Json<Value>), ApiError> {
    let created = state.billing.create_subscription(&subscription).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    status: SubscriptionStatus,
}

async fn update_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> std::result::Result<Json<Value>, ApiError> {
    Ok(Json(
        state
            .billing
            .update_subscription_status(&id, update.status)
            .await?,
    ))
}

async fn cancel_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Value>, ApiError> {
    Ok(Json(state.billing.cancel_subscription(&id).await?))
}

/// A billing failure rendered as a JSON error response.
///
/// Upstream bodies stay in the logs; clients only see the upstream status.
#[derive(Debug)]
pub struct ApiError(BillingError);

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            BillingError::InvalidId(_) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "INVALID_ID", "message": self.0.to_string() }),
            ),
            BillingError::Status { status, .. } => (
                StatusCode::BAD_GATEWAY,
                json!({
                    "error": "BILLING_UPSTREAM_ERROR",
                    "message": "The billing provider rejected the request",
                    "upstreamStatus": status,
                }),
            ),
            BillingError::Decode(_) => (
                StatusCode::BAD_GATEWAY,
                json!({
                    "error": "BILLING_UPSTREAM_ERROR",
                    "message": "The billing provider returned an unreadable response",
                }),
            ),
            BillingError::Timeout { .. } | BillingError::Transport(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": "BILLING_UNAVAILABLE",
                    "message": "The billing provider could not be reached",
                }),
            ),
            BillingError::MissingAccessToken
            | BillingError::InvalidHeader(_)
            | BillingError::InvalidBody(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "INTERNAL_ERROR", "message": "Billing is misconfigured" }),
            ),
        };

        warn!(status = status.as_u16(), error = %self.0, "Billing request failed");
        (status, Json(body)).into_response()
    }
}
