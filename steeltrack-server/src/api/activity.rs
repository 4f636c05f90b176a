//! Activity log query API

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use steeltrack_common::Error;

use crate::engine::audit::{self, ActivityFilter, ActivityPage};
use crate::AppState;

use super::ApiError;

#[derive(Debug, Deserialize)]
pub struct ActivityQueryParams {
    #[serde(default)]
    pub subject_type: Option<String>,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page: Option<i64>,
}

/// GET /api/activity?subject_type&subject_id&actor_id&from&to&page
///
/// Full history ordered by time ascending, 100 entries per page.
pub async fn query_activity(
    State(state): State<AppState>,
    Query(params): Query<ActivityQueryParams>,
) -> Result<Json<ActivityPage>, ApiError> {
    if let Some(st) = &params.subject_type {
        if !matches!(st.as_str(), "piece_mark" | "delivery" | "crew") {
            return Err(Error::InvalidInput(format!("unknown subject type: {}", st)).into());
        }
    }

    let page = audit::query_log(
        &state.db,
        ActivityFilter {
            subject_type: params.subject_type,
            subject_id: params.subject_id,
            actor_id: params.actor_id,
            from: params.from,
            to: params.to,
            page: params.page.unwrap_or(1),
        },
    )
    .await?;
    Ok(Json(page))
}
