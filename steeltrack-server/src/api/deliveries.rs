//! Delivery API: lifecycle, line items, and bulk reconciliation

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use steeltrack_common::auth::Actor;
use steeltrack_common::db::models::{Delivery, DeliveryItem};
use steeltrack_common::domain::{DeliveryStatus, FieldLocation, ItemCondition};
use steeltrack_common::Error;

use crate::engine::reconcile::{self, ItemSubmission};
use crate::engine::store::{self, NewDelivery};
use crate::AppState;

use super::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateDeliveryRequest {
    pub project_id: String,
    pub delivery_number: String,
    #[serde(default)]
    pub scheduled_date: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
}

/// POST /api/deliveries
pub async fn create_delivery(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateDeliveryRequest>,
) -> Result<Json<Delivery>, ApiError> {
    let delivery = reconcile::create_delivery(
        &state.db,
        &state.events,
        &actor,
        NewDelivery {
            project_id: req.project_id,
            delivery_number: req.delivery_number,
            scheduled_date: req.scheduled_date,
            carrier: req.carrier,
        },
    )
    .await?;
    Ok(Json(delivery))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub project_id: Option<String>,
    pub status: Option<String>,
}

/// GET /api/deliveries?project_id&status
pub async fn list_deliveries(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Delivery>>, ApiError> {
    if let Some(s) = &query.status {
        s.parse::<DeliveryStatus>()?;
    }

    let deliveries = store::list_deliveries(
        &state.db,
        query.project_id.as_deref(),
        query.status.as_deref(),
    )
    .await?;
    Ok(Json(deliveries))
}

/// GET /api/deliveries/:id
pub async fn get_delivery(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Delivery>, ApiError> {
    let mut conn = state.db.acquire().await.map_err(Error::from)?;
    let delivery = store::fetch_delivery(&mut conn, &id).await?;
    Ok(Json(delivery))
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub piece_mark_id: String,
    pub expected_quantity: i64,
}

/// POST /api/deliveries/:id/items
pub async fn add_delivery_item(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<DeliveryItem>, ApiError> {
    let item = reconcile::add_delivery_item(
        &state.db,
        &actor,
        &id,
        &req.piece_mark_id,
        req.expected_quantity,
    )
    .await?;
    Ok(Json(item))
}

/// GET /api/deliveries/:id/items
pub async fn list_delivery_items(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DeliveryItem>>, ApiError> {
    let mut conn = state.db.acquire().await.map_err(Error::from)?;
    // Listing against an unknown delivery is a NotFound, not an empty list
    store::fetch_delivery(&mut conn, &id).await?;
    let items = store::fetch_delivery_items(&mut conn, &id).await?;
    Ok(Json(items))
}

/// POST /api/deliveries/:id/dispatch - pending -> in_transit
pub async fn dispatch_delivery(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<Delivery>, ApiError> {
    let delivery = reconcile::set_delivery_status(
        &state.db,
        &state.events,
        &actor,
        &id,
        DeliveryStatus::InTransit,
        None,
    )
    .await?;
    Ok(Json(delivery))
}

/// POST /api/deliveries/:id/arrive - in_transit -> delivered
pub async fn arrive_delivery(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<Delivery>, ApiError> {
    let delivery = reconcile::set_delivery_status(
        &state.db,
        &state.events,
        &actor,
        &id,
        DeliveryStatus::Delivered,
        None,
    )
    .await?;
    Ok(Json(delivery))
}

/// POST /api/deliveries/:id/reject - any non-terminal -> rejected
pub async fn reject_delivery(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<Delivery>, ApiError> {
    let delivery = reconcile::set_delivery_status(
        &state.db,
        &state.events,
        &actor,
        &id,
        DeliveryStatus::Rejected,
        None,
    )
    .await?;
    Ok(Json(delivery))
}

#[derive(Debug, Deserialize)]
pub struct ReconcileItemBody {
    pub item_id: String,
    pub received_quantity: i64,
    pub condition: ItemCondition,
    pub location: FieldLocation,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub items: Vec<ReconcileItemBody>,
    #[serde(default)]
    pub note: Option<String>,
}

/// POST /api/deliveries/:id/reconcile - bulk, all-or-nothing
pub async fn reconcile_delivery(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<ReconcileRequest>,
) -> Result<Json<Delivery>, ApiError> {
    let submissions = req
        .items
        .into_iter()
        .map(|i| ItemSubmission {
            item_id: i.item_id,
            received_quantity: i.received_quantity,
            condition: i.condition,
            location: i.location,
        })
        .collect();

    let delivery = reconcile::reconcile_delivery(
        &state.db,
        &state.events,
        &actor,
        &id,
        submissions,
        req.note,
    )
    .await?;
    Ok(Json(delivery))
}
