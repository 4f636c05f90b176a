//! Crew assignment API

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use steeltrack_common::auth::Actor;
use steeltrack_common::db::models::CrewAssignment;
use steeltrack_common::domain::CrewStatus;
use uuid::Uuid;

use crate::engine::crew::{self, NewCrewAssignment};
use crate::engine::store;
use crate::AppState;

use super::ApiError;

#[derive(Debug, Deserialize)]
pub struct AssignCrewRequest {
    pub project_id: String,
    pub crew_name: String,
    pub work_date: String,
    pub shift: String,
    pub crew_size: i64,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub supervisor_id: Option<Uuid>,
    #[serde(default)]
    pub piece_mark_ids: Vec<String>,
}

/// POST /api/crews
pub async fn assign_crew(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<AssignCrewRequest>,
) -> Result<Json<CrewAssignment>, ApiError> {
    let crew = crew::assign_crew(
        &state.db,
        &state.events,
        &actor,
        NewCrewAssignment {
            project_id: req.project_id,
            crew_name: req.crew_name,
            work_date: req.work_date,
            shift: req.shift,
            crew_size: req.crew_size,
            zone: req.zone,
            supervisor_id: req.supervisor_id,
            piece_mark_ids: req.piece_mark_ids,
        },
    )
    .await?;
    Ok(Json(crew))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub project_id: Option<String>,
}

/// GET /api/crews?project_id
pub async fn list_crews(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CrewAssignment>>, ApiError> {
    let crews = store::list_crew_assignments(&state.db, query.project_id.as_deref()).await?;
    Ok(Json(crews))
}

#[derive(Debug, Deserialize)]
pub struct CrewStatusRequest {
    pub to: CrewStatus,
    #[serde(default)]
    pub note: Option<String>,
}

/// POST /api/crews/:id/status
pub async fn set_crew_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<CrewStatusRequest>,
) -> Result<Json<CrewAssignment>, ApiError> {
    let crew =
        crew::set_crew_status(&state.db, &state.events, &actor, &id, req.to, req.note).await?;
    Ok(Json(crew))
}
