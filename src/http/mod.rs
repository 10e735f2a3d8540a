//! REST surface over the tracking service. Responses use the
//! `{statusCode, data, message}` envelope on success and failure alike;
//! typed service errors map onto it centrally.

use axum::{
    async_trait,
    extract::{FromRequestParts, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{TrackerError, TrackerResult},
    tracking::{Principal, TimeTrackingService},
};

#[derive(Clone)]
pub struct AppState {
    pub service: TimeTrackingService,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/checkIn", post(check_in))
        .route("/getElapsedTime", get(elapsed_time))
        .route("/pauseOrResume", put(pause_or_resume))
        .route("/checkOut", put(check_out))
        .route("/getUserTimeProject", get(user_time_project))
        .route("/getUsersTimeProject", get(users_time_project))
        .route("/company-dashboard", get(company_dashboard))
        .route("/healthz", get(healthz))
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status_code: u16,
    pub data: T,
    pub message: String,
}

fn ok<T: Serialize>(data: T, message: &str) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        status_code: 200,
        data,
        message: message.to_string(),
    })
}

impl IntoResponse for TrackerError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let message = match &self {
            TrackerError::Internal(err) => {
                error!("internal error serving request: {err:#}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let status =
            StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(ApiResponse {
            status_code,
            data: Value::Null,
            message,
        });
        (status, body).into_response()
    }
}

/// Identity is resolved upstream; the trusted headers stand in for the
/// external auth provider's principal.
#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = TrackerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| -> Option<String> {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let user_id = header("x-user-id").ok_or_else(|| {
            TrackerError::Validation("User ID is required for time tracking.".to_string())
        })?;
        let company_id = header("x-company-id").ok_or_else(|| {
            TrackerError::Validation("Company ID is required for time tracking.".to_string())
        })?;

        Ok(Principal {
            user_id,
            company_id,
        })
    }
}

fn parse_day(value: &str, field: &str) -> TrackerResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| TrackerError::Validation(format!("Invalid {field}, expected YYYY-MM-DD")))
}

fn parse_range(
    start: Option<String>,
    end: Option<String>,
) -> TrackerResult<Option<(NaiveDate, NaiveDate)>> {
    match (start, end) {
        (Some(start), Some(end)) => {
            let start = parse_day(&start, "startDate")?;
            let end = parse_day(&end, "endDate")?;
            Ok(Some((start, end)))
        }
        (None, None) => Ok(None),
        _ => Err(TrackerError::Validation(
            "startDate and endDate must be provided together.".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckInRequest {
    project_id: String,
    sub_task_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectRequest {
    project_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectQuery {
    project_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserTimeQuery {
    project_id: String,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsersTimeQuery {
    project_id: String,
    start_date: Option<String>,
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DashboardQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

async fn check_in(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<CheckInRequest>,
) -> Result<impl IntoResponse, TrackerError> {
    let entry = state
        .service
        .check_in(&principal, &body.project_id, body.sub_task_id)
        .await?;
    Ok(ok(entry, "Checked in successfully."))
}

async fn elapsed_time(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ProjectQuery>,
) -> Result<impl IntoResponse, TrackerError> {
    let snapshot = state
        .service
        .get_elapsed_time(&principal, &query.project_id)
        .await?;
    Ok(ok(snapshot, "Elapsed time fetched successfully."))
}

async fn pause_or_resume(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<ProjectRequest>,
) -> Result<impl IntoResponse, TrackerError> {
    let outcome = state
        .service
        .pause_or_resume(&principal, &body.project_id)
        .await?;
    let message = if outcome.is_running {
        "Timer resumed successfully."
    } else {
        "Timer paused successfully."
    };
    Ok(ok(outcome, message))
}

async fn check_out(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<ProjectRequest>,
) -> Result<impl IntoResponse, TrackerError> {
    let summary = state.service.check_out(&principal, &body.project_id).await?;
    Ok(ok(summary, "Checked out successfully."))
}

async fn user_time_project(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<UserTimeQuery>,
) -> Result<impl IntoResponse, TrackerError> {
    let date = query
        .date
        .map(|raw| parse_day(&raw, "date"))
        .transpose()?;
    let report = state
        .service
        .user_time_project(&principal, &query.project_id, date)
        .await?;
    Ok(ok(report, "User time fetched successfully."))
}

async fn users_time_project(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<UsersTimeQuery>,
) -> Result<impl IntoResponse, TrackerError> {
    let range = parse_range(query.start_date, query.end_date)?;
    let aggregates = state
        .service
        .users_time_project(&principal, &query.project_id, range)
        .await?;
    Ok(ok(aggregates, "Project users' time fetched successfully."))
}

async fn company_dashboard(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<DashboardQuery>,
) -> Result<impl IntoResponse, TrackerError> {
    let range = parse_range(query.start_date, query.end_date)?;
    let dashboard = state.service.company_dashboard(&principal, range).await?;
    Ok(ok(dashboard, "Company dashboard data fetched successfully."))
}

async fn healthz() -> impl IntoResponse {
    ok(Value::Null, "ok")
}
