//! Prompt issuance endpoint

use axum::{
    extract::{rejection::PathRejection, Path, State},
    routing::get,
    Json, Router,
};

use crate::error::ApiResult;
use crate::tokens::TokenEntry;
use crate::AppState;

/// GET /submit/tokens/:count
///
/// Up to `count` random valid tokens.
pub async fn get_tokens(
    State(state): State<AppState>,
    count: Result<Path<u32>, PathRejection>,
) -> ApiResult<Json<Vec<TokenEntry>>> {
    let Path(count) = count?;
    let tokens = state.tokens.issue_tokens(count as usize).await?;
    Ok(Json(tokens))
}

/// Build token routes
pub fn token_routes() -> Router<AppState> {
    Router::new().route("/submit/tokens/:count", get(get_tokens))
}
