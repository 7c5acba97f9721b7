//! Evaluation set endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::evaluation::{SetSize, SlicePair};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SetInfoResponse {
    pub count: SetSize,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub progress: i64,
}

#[derive(Debug, Deserialize)]
pub struct SliceQuery {
    #[serde(default)]
    pub progress: u32,
    pub count: u32,
}

/// GET /evaluation/sets
pub async fn list_sets(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.catalog.list_sets().await?))
}

/// GET /evaluation/sets/:set/info
pub async fn set_info(
    State(state): State<AppState>,
    Path(eval_set): Path<String>,
) -> ApiResult<Json<SetInfoResponse>> {
    let count = state.catalog.set_size(&eval_set).await?;
    Ok(Json(SetInfoResponse { count }))
}

/// GET /evaluation/sets/:set/progress/:evaluator
pub async fn user_progress(
    State(state): State<AppState>,
    Path((eval_set, evaluator)): Path<(String, String)>,
) -> ApiResult<Json<ProgressResponse>> {
    let progress = state.catalog.user_progress(&evaluator, &eval_set).await?;
    Ok(Json(ProgressResponse { progress }))
}

/// GET /evaluation/sets/:set/slice?progress=&count=
pub async fn set_slice(
    State(state): State<AppState>,
    Path(eval_set): Path<String>,
    query: Result<Query<SliceQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<SlicePair>>> {
    let Query(query) = query?;
    let pairs = state
        .catalog
        .fetch_slice(&eval_set, query.progress, query.count)
        .await?;
    Ok(Json(pairs))
}

/// POST /evaluation/sets/:set/evaluations
///
/// Valid entries are committed even when others fail. A partial failure
/// answers with the last error's status and the number of committed entries.
pub async fn submit_evaluations(
    State(state): State<AppState>,
    Path(eval_set): Path<String>,
    entries: Result<Json<Vec<Value>>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(entries) = entries?;
    let outcome = state.catalog.record_evaluation(&eval_set, entries).await?;

    let response = match outcome.last_error {
        None => (
            StatusCode::OK,
            Json(json!({ "committed": outcome.committed })),
        )
            .into_response(),
        Some(err) => {
            let err = ApiError::from(err);
            (
                err.status(),
                Json(json!({
                    "error": err.body(),
                    "committed": outcome.committed,
                })),
            )
                .into_response()
        }
    };
    Ok(response)
}

/// Build evaluation routes
pub fn evaluation_routes() -> Router<AppState> {
    Router::new()
        .route("/evaluation/sets", get(list_sets))
        .route("/evaluation/sets/:set/info", get(set_info))
        .route("/evaluation/sets/:set/progress/:evaluator", get(user_progress))
        .route("/evaluation/sets/:set/slice", get(set_slice))
        .route("/evaluation/sets/:set/evaluations", post(submit_evaluations))
}
