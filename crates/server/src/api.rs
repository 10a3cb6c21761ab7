//! JSON API for the request approval workflow.
//!
//! Endpoints:
//! - `POST /api/requests`                                  — submit a request
//! - `GET  /api/requests/{id}`                             — fetch one request with its steps
//! - `POST /api/requests/{id}/steps/{step_id}/approve`     — approve the active step
//! - `POST /api/requests/{id}/steps/{step_id}/reject`      — reject the active step
//! - `POST /api/requests/{id}/cancel`                      — cancel a request
//! - `POST /api/approvals/bulk`                            — approve many steps, per-step results
//! - `GET  /api/approvals/pending?approver_id=`            — the approver's inbox
//! - `GET  /api/users/{id}/vacation-summary`               — day balances
//! - `POST /api/users/{id}/vacation-adjustments`           — audited admin correction

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use staffly_core::domain::employee::UserId;
use staffly_core::domain::request::{Request, RequestId, StepId};
use staffly_core::domain::template::TemplateId;
use staffly_core::domain::vacation::VacationSummary;
use staffly_core::errors::{EngineError, ErrorKind};
use staffly_core::workflow::{BulkItemResult, QuizAnswer, VacationDates};
use staffly_db::{ApprovalService, ServiceError};

#[derive(Clone)]
pub struct ApiState {
    service: Arc<ApprovalService>,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitRequestBody {
    pub template_id: String,
    pub submitter_id: String,
    #[serde(default)]
    pub form_data: serde_json::Value,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApproveBody {
    pub approver_id: String,
    pub comment: Option<String>,
    #[serde(default)]
    pub quiz_answers: Vec<QuizAnswer>,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub request_status: String,
    pub step_approved: bool,
    pub quiz_score: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    pub approver_id: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub actor_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkApproveBody {
    pub approver_id: String,
    pub step_ids: Vec<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub approver_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AdjustBody {
    pub delta_days: i64,
    pub reason: String,
    pub admin_id: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub messages: Vec<String>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(service: Arc<ApprovalService>) -> Router {
    Router::new()
        .route("/api/requests", post(submit_request))
        .route("/api/requests/{id}", get(get_request))
        .route("/api/requests/{id}/steps/{step_id}/approve", post(approve_step))
        .route("/api/requests/{id}/steps/{step_id}/reject", post(reject_step))
        .route("/api/requests/{id}/cancel", post(cancel_request))
        .route("/api/approvals/bulk", post(bulk_approve))
        .route("/api/approvals/pending", get(pending_steps))
        .route("/api/users/{id}/vacation-summary", get(vacation_summary))
        .route("/api/users/{id}/vacation-adjustments", post(adjust_vacation))
        .with_state(ApiState { service })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn submit_request(
    State(state): State<ApiState>,
    Json(body): Json<SubmitRequestBody>,
) -> Result<(StatusCode, Json<SubmitResponse>), (StatusCode, Json<ApiError>)> {
    let vacation_dates = match (body.start_date, body.end_date) {
        (Some(start_date), Some(end_date)) => Some(VacationDates { start_date, end_date }),
        _ => None,
    };

    let request_id = state
        .service
        .submit_request(
            &TemplateId(body.template_id),
            &UserId(body.submitter_id),
            body.form_data,
            vacation_dates,
        )
        .await
        .map_err(into_api_error)?;

    Ok((StatusCode::CREATED, Json(SubmitResponse { request_id: request_id.0 })))
}

async fn get_request(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Request>, (StatusCode, Json<ApiError>)> {
    let request =
        state.service.get_request(&RequestId(id)).await.map_err(into_api_error)?;
    Ok(Json(request))
}

async fn approve_step(
    State(state): State<ApiState>,
    Path((id, step_id)): Path<(String, String)>,
    Json(body): Json<ApproveBody>,
) -> Result<Json<ApproveResponse>, (StatusCode, Json<ApiError>)> {
    let decision = state
        .service
        .approve_step(
            &RequestId(id),
            &StepId(step_id),
            &UserId(body.approver_id),
            body.comment,
            body.quiz_answers,
        )
        .await
        .map_err(into_api_error)?;

    Ok(Json(ApproveResponse {
        request_status: decision.request_status.as_str().to_string(),
        step_approved: decision.step_approved,
        quiz_score: decision.quiz.map(|quiz| quiz.score_pct),
    }))
}

async fn reject_step(
    State(state): State<ApiState>,
    Path((id, step_id)): Path<(String, String)>,
    Json(body): Json<RejectBody>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    state
        .service
        .reject_step(&RequestId(id), &StepId(step_id), &UserId(body.approver_id), body.reason)
        .await
        .map_err(into_api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cancel_request(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<CancelBody>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    state
        .service
        .cancel_request(&RequestId(id), &UserId(body.actor_id), body.reason)
        .await
        .map_err(into_api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn bulk_approve(
    State(state): State<ApiState>,
    Json(body): Json<BulkApproveBody>,
) -> Result<Json<Vec<BulkItemResult>>, (StatusCode, Json<ApiError>)> {
    let step_ids: Vec<StepId> = body.step_ids.into_iter().map(StepId).collect();
    let results = state
        .service
        .bulk_approve(&UserId(body.approver_id), &step_ids, body.comment)
        .await
        .map_err(into_api_error)?;
    Ok(Json(results))
}

async fn pending_steps(
    State(state): State<ApiState>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<staffly_core::domain::request::ApprovalStep>>, (StatusCode, Json<ApiError>)>
{
    let steps = state
        .service
        .list_pending_steps(&UserId(query.approver_id))
        .await
        .map_err(into_api_error)?;
    Ok(Json(steps))
}

async fn vacation_summary(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<VacationSummary>, (StatusCode, Json<ApiError>)> {
    let summary =
        state.service.vacation_summary(&UserId(id)).await.map_err(into_api_error)?;
    Ok(Json(summary))
}

async fn adjust_vacation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<AdjustBody>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    state
        .service
        .admin_adjust_vacation(
            &UserId(id),
            body.delta_days,
            &body.reason,
            &UserId(body.admin_id),
        )
        .await
        .map_err(into_api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn into_api_error(error: ServiceError) -> (StatusCode, Json<ApiError>) {
    let (status, label, messages) = match &error {
        ServiceError::Engine(engine_error) => {
            let status = match engine_error.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::InvalidState => StatusCode::CONFLICT,
                ErrorKind::Validation | ErrorKind::Business => StatusCode::BAD_REQUEST,
            };
            let messages = match engine_error {
                EngineError::Validation(fields) => fields
                    .iter()
                    .map(|field| format!("{}: {}", field.field, field.message))
                    .collect(),
                other => vec![other.to_string()],
            };
            (status, kind_label(engine_error.kind()), messages)
        }
        ServiceError::SubmissionInvalid(issues) => (
            StatusCode::BAD_REQUEST,
            "validation",
            issues.iter().map(|issue| issue.message()).collect(),
        ),
        ServiceError::Repository(_) | ServiceError::Database(_) => {
            warn!(event_name = "api.storage_error", error = %error, "storage failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                vec!["an unexpected internal error occurred".to_string()],
            )
        }
    };

    (status, Json(ApiError { error: label.to_string(), messages }))
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NotFound => "not_found",
        ErrorKind::Forbidden => "forbidden",
        ErrorKind::InvalidState => "invalid_state",
        ErrorKind::Validation => "validation",
        ErrorKind::Business => "business",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use tower::util::ServiceExt;

    use staffly_core::config::VacationConfig;
    use staffly_core::notify::InMemoryNotificationDispatcher;
    use staffly_db::{connect_with_settings, migrations, seed_demo_data, ApprovalService};

    use super::router;

    async fn test_router() -> axum::Router {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        seed_demo_data(&pool).await.expect("seed");

        let vacation = VacationConfig {
            annual_entitlement_days: 26,
            on_demand_cap: 4,
            circumstantial_event_cap: 2,
            carried_over_expiry_month: 9,
            carried_over_expiry_day: 30,
        };
        let service = Arc::new(ApprovalService::new(
            pool,
            &vacation,
            Arc::new(InMemoryNotificationDispatcher::default()),
        ));
        router(service)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("parse json")
    }

    #[tokio::test]
    async fn submit_and_fetch_round_trip() {
        let app = test_router().await;

        let submit = HttpRequest::builder()
            .method("POST")
            .uri("/api/requests")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "template_id": "tpl-equipment",
                    "submitter_id": "u-ada",
                    "form_data": {"item": "laptop"}
                })
                .to_string(),
            ))
            .expect("request");

        let response = app.clone().oneshot(submit).await.expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let payload = body_json(response).await;
        let request_id = payload["request_id"].as_str().expect("request id").to_string();

        let fetch = HttpRequest::builder()
            .method("GET")
            .uri(format!("/api/requests/{request_id}"))
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(fetch).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let payload = body_json(response).await;
        assert_eq!(payload["status"], "submitted");
        assert_eq!(payload["steps"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn unknown_request_maps_to_not_found() {
        let app = test_router().await;

        let fetch = HttpRequest::builder()
            .method("GET")
            .uri("/api/requests/REQ-missing")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(fetch).await.expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let payload = body_json(response).await;
        assert_eq!(payload["error"], "not_found");
    }

    #[tokio::test]
    async fn wrong_approver_maps_to_forbidden() {
        let app = test_router().await;

        let submit = HttpRequest::builder()
            .method("POST")
            .uri("/api/requests")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "template_id": "tpl-equipment",
                    "submitter_id": "u-ada",
                    "form_data": {}
                })
                .to_string(),
            ))
            .expect("request");
        let response = app.clone().oneshot(submit).await.expect("response");
        let request_id =
            body_json(response).await["request_id"].as_str().expect("id").to_string();

        let fetch = HttpRequest::builder()
            .method("GET")
            .uri(format!("/api/requests/{request_id}"))
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(fetch).await.expect("response");
        let step_id = body_json(response).await["steps"][0]["id"]
            .as_str()
            .expect("step id")
            .to_string();

        let approve = HttpRequest::builder()
            .method("POST")
            .uri(format!("/api/requests/{request_id}/steps/{step_id}/approve"))
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"approver_id": "u-linus"}).to_string(),
            ))
            .expect("request");
        let response = app.oneshot(approve).await.expect("response");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let payload = body_json(response).await;
        assert_eq!(payload["error"], "forbidden");
    }

    #[tokio::test]
    async fn vacation_summary_is_served() {
        let app = test_router().await;

        let fetch = HttpRequest::builder()
            .method("GET")
            .uri("/api/users/u-ada/vacation-summary")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(fetch).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = body_json(response).await;
        assert_eq!(payload["entitlement"], 26);
        assert_eq!(payload["remaining"], 26);
    }
}
