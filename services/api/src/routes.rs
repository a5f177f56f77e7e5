use crate::infra::AppState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use mpesewa::lending::calculator::{daily_schedule, ScheduleDay};
use mpesewa::lending::{
    lending_router, Clock, LendingRepository, LendingService, LoanQuote, UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuoteRequest {
    pub(crate) amount: f64,
    pub(crate) period_days: u32,
    /// Checks the amount against this lender's per-loan tier cap.
    #[serde(default)]
    pub(crate) lender_id: Option<String>,
    #[serde(default)]
    pub(crate) include_schedule: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuoteResponse {
    pub(crate) quote: LoanQuote,
    pub(crate) warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) schedule: Option<Vec<ScheduleDay>>,
}

pub(crate) fn with_lending_routes<R, C>(service: Arc<LendingService<R, C>>) -> Router
where
    R: LendingRepository + 'static,
    C: Clock + 'static,
{
    let quotes = Router::new()
        .route("/quotes", post(quote_endpoint::<R, C>))
        .with_state(service.clone());

    lending_router(service)
        .merge(quotes)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn quote_endpoint<R, C>(
    State(service): State<Arc<LendingService<R, C>>>,
    Json(payload): Json<QuoteRequest>,
) -> Response
where
    R: LendingRepository + 'static,
    C: Clock + 'static,
{
    if payload.amount.is_nan() || payload.amount <= 0.0 || payload.period_days == 0 {
        let body = json!({
            "reason": "amount and periodDays must be greater than zero",
            "code": "invalid_quote",
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response();
    }

    let (quote, warnings) = match payload.lender_id {
        Some(lender_id) => {
            match service.quote_for_lender(&UserId::new(lender_id), payload.amount, payload.period_days) {
                Ok(result) => result,
                Err(error) => {
                    let body = json!({ "reason": error.to_string(), "code": error.code() });
                    return (StatusCode::NOT_FOUND, Json(body)).into_response();
                }
            }
        }
        None => {
            let quote = service.quote(payload.amount, payload.period_days);
            let warnings = mpesewa::lending::calculator::quote_warnings(&quote, None);
            (quote, warnings)
        }
    };

    let schedule = payload
        .include_schedule
        .then(|| daily_schedule(payload.amount, payload.period_days, service.rates()));

    let body = QuoteResponse {
        quote,
        warnings: warnings.iter().map(|warning| warning.message()).collect(),
        schedule,
    };
    (StatusCode::OK, Json(body)).into_response()
}
