//! Routes for departure-group matching. Matching feeds dispatch, so both
//! endpoints are reserved for administrators.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use wayfare_matching::domain::selection::MatchOutcome;

use crate::auth::Caller;
use crate::error::{ApiError, ErrorBody};
use crate::state::AppState;

/// Request body for POST /request.
#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    /// The package.
    pub package_id: Uuid,
    /// The departure date.
    pub travel_date: NaiveDate,
    /// Seat cap to use instead of the package capacity.
    #[serde(default)]
    pub capacity: Option<u32>,
}

/// POST /request
#[instrument(skip(state, caller, request), fields(package_id = %request.package_id, travel_date = %request.travel_date))]
async fn request_match(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(request): Json<MatchRequest>,
) -> Result<Json<MatchOutcome>, ApiError> {
    caller.require_admin("request a match")?;
    info!(capacity = ?request.capacity, "handling request_match");

    let outcome = state
        .matcher
        .request_match(request.package_id, request.travel_date, request.capacity)
        .await?;

    Ok(Json(outcome))
}

/// GET /{package_id}/{travel_date}/latest
async fn latest_match(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((package_id, travel_date)): Path<(Uuid, NaiveDate)>,
) -> Result<Response, ApiError> {
    caller.require_admin("view matches")?;

    match state.matcher.latest(package_id, travel_date)? {
        Some(generated) => Ok(Json(generated).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "match_not_computed",
                message: format!("no match has been computed for {package_id} on {travel_date}"),
            }),
        )
            .into_response()),
    }
}

/// Returns the router for matching.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/request", post(request_match))
        .route("/{package_id}/{travel_date}/latest", get(latest_match))
}
