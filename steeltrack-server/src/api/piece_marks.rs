//! Piece-mark API: registry CRUD and status/location transitions

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use steeltrack_common::auth::Actor;
use steeltrack_common::db::models::PieceMark;
use steeltrack_common::domain::{FieldLocation, PieceMarkStatus};
use steeltrack_common::Error;

use crate::engine::store::{self, NewPieceMark};
use crate::engine::transitions::{self, AttributePatch};
use crate::AppState;

use super::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreatePieceMarkRequest {
    pub project_id: String,
    pub mark: String,
    pub quantity: i64,
    pub weight_per_unit: f64,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub drawing_ref: Option<String>,
    #[serde(default)]
    pub sequence_no: Option<i64>,
}

/// POST /api/piece-marks
pub async fn create_piece_mark(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreatePieceMarkRequest>,
) -> Result<Json<PieceMark>, ApiError> {
    let mark = transitions::create_piece_mark(
        &state.db,
        &state.events,
        &actor,
        NewPieceMark {
            project_id: req.project_id,
            mark: req.mark,
            quantity: req.quantity,
            weight_per_unit: req.weight_per_unit,
            material: req.material,
            drawing_ref: req.drawing_ref,
            sequence_no: req.sequence_no,
        },
    )
    .await?;
    Ok(Json(mark))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub project_id: Option<String>,
    pub status: Option<String>,
    pub location: Option<String>,
}

/// GET /api/piece-marks?project_id&status&location
pub async fn list_piece_marks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PieceMark>>, ApiError> {
    // Filters are closed sets; an unknown value is a caller mistake, not an
    // empty result
    if let Some(s) = &query.status {
        s.parse::<PieceMarkStatus>()?;
    }
    if let Some(l) = &query.location {
        l.parse::<FieldLocation>()?;
    }

    let marks = store::list_piece_marks(
        &state.db,
        query.project_id.as_deref(),
        query.status.as_deref(),
        query.location.as_deref(),
    )
    .await?;
    Ok(Json(marks))
}

/// GET /api/piece-marks/:id
pub async fn get_piece_mark(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PieceMark>, ApiError> {
    let mut conn = state.db.acquire().await.map_err(Error::from)?;
    let mark = store::fetch_piece_mark(&mut conn, &id).await?;
    Ok(Json(mark))
}

#[derive(Debug, Deserialize, Default)]
pub struct StatusRequest {
    /// Proposed new status; defaults to the single legal step
    #[serde(default)]
    pub to: Option<PieceMarkStatus>,
    #[serde(default)]
    pub note: Option<String>,
    /// Optimistic concurrency check against the version the caller last read
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// POST /api/piece-marks/:id/advance
pub async fn advance_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<PieceMark>, ApiError> {
    let mark = transitions::advance_status(
        &state.db,
        &state.events,
        &actor,
        &id,
        req.to,
        req.note,
        req.expected_version,
    )
    .await?;
    Ok(Json(mark))
}

/// POST /api/piece-marks/:id/rollback
pub async fn rollback_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<PieceMark>, ApiError> {
    let mark = transitions::rollback_status(
        &state.db,
        &state.events,
        &actor,
        &id,
        req.to,
        req.note,
        req.expected_version,
    )
    .await?;
    Ok(Json(mark))
}

#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    pub location: FieldLocation,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// POST /api/piece-marks/:id/location
pub async fn update_location(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<LocationRequest>,
) -> Result<Json<PieceMark>, ApiError> {
    let mark = transitions::update_location(
        &state.db,
        &state.events,
        &actor,
        &id,
        req.location,
        req.note,
        req.expected_version,
    )
    .await?;
    Ok(Json(mark))
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdatePieceMarkRequest {
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub weight_per_unit: Option<f64>,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub drawing_ref: Option<String>,
    #[serde(default)]
    pub sequence_no: Option<i64>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// PATCH /api/piece-marks/:id - quantity/weight and descriptive attributes
pub async fn update_piece_mark(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePieceMarkRequest>,
) -> Result<Json<PieceMark>, ApiError> {
    let mark = transitions::update_attributes(
        &state.db,
        &actor,
        &id,
        AttributePatch {
            quantity: req.quantity,
            weight_per_unit: req.weight_per_unit,
            material: req.material,
            drawing_ref: req.drawing_ref,
            sequence_no: req.sequence_no,
        },
        req.expected_version,
    )
    .await?;
    Ok(Json(mark))
}

/// POST /api/piece-marks/:id/archive - soft delete
pub async fn archive_piece_mark(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<PieceMark>, ApiError> {
    let mark = transitions::archive_piece_mark(&state.db, &state.events, &actor, &id, None).await?;
    Ok(Json(mark))
}
