//! Status/location state machine for piece marks
//!
//! Statuses form a total order with no skip transitions; the only backward
//! move is a single-step rollback. Location is an orthogonal, unordered
//! state that is only legal to change while the mark is shipped, and is
//! frozen at `installed` once the mark installs.
//!
//! Every function here is one atomic unit: the state write and its activity
//! log entry commit together or not at all, and the broadcast happens only
//! after the commit.

use sqlx::SqlitePool;
use steeltrack_common::auth::{authorize, Action, Actor};
use steeltrack_common::db::models::PieceMark;
use steeltrack_common::domain::{FieldLocation, PieceMarkStatus};
use steeltrack_common::events::{EventBus, SteelTrackEvent};
use steeltrack_common::{Error, Result};
use tracing::info;

use super::audit::{self, piece_mark_snapshot as snapshot, transition, NewEntry, SUBJECT_PIECE_MARK};
use super::store::{self, NewPieceMark};

/// Caller-supplied optimistic concurrency check: a stale version loses
fn check_expected_version(mark: &PieceMark, expected_version: Option<i64>) -> Result<()> {
    match expected_version {
        Some(v) if v != mark.version => Err(Error::ConcurrentModification),
        _ => Ok(()),
    }
}

/// Register a new piece mark (project setup surface)
pub async fn create_piece_mark(
    pool: &SqlitePool,
    events: &EventBus,
    actor: &Actor,
    new: NewPieceMark,
) -> Result<PieceMark> {
    authorize(actor, &Action::ManagePieceMarks)?;

    if new.quantity <= 0 {
        return Err(Error::InvalidInput("quantity must be positive".to_string()));
    }
    if new.weight_per_unit < 0.0 {
        return Err(Error::InvalidInput(
            "weight_per_unit must be non-negative".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;
    let mark = store::insert_piece_mark(&mut tx, new).await?;
    audit::append(
        &mut tx,
        NewEntry {
            actor,
            subject_type: SUBJECT_PIECE_MARK,
            subject_id: &mark.guid,
            transition: transition::CREATED,
            before_state: None,
            after_state: Some(snapshot(&mark)),
            description: Some(format!("piece mark {} registered", mark.mark)),
            discrepancy: None,
        },
    )
    .await?;
    tx.commit().await?;

    events.emit_lossy(SteelTrackEvent::PieceMarkCreated {
        piece_mark_id: uuid_of(&mark.guid),
        project_id: mark.project_id.clone(),
        mark: mark.mark.clone(),
        timestamp: chrono::Utc::now(),
    });

    Ok(mark)
}

/// Advance a piece mark's status one step forward
///
/// `to`, when given, must be the immediate successor of the current status;
/// anything else is an invalid transition naming the rejected pair.
pub async fn advance_status(
    pool: &SqlitePool,
    events: &EventBus,
    actor: &Actor,
    guid: &str,
    to: Option<PieceMarkStatus>,
    note: Option<String>,
    expected_version: Option<i64>,
) -> Result<PieceMark> {
    let mut tx = pool.begin().await?;
    let mut mark = store::fetch_active_piece_mark(&mut tx, guid).await?;
    check_expected_version(&mark, expected_version)?;

    let from = mark.status()?;
    let successor = from.successor();
    let target = to.or(successor).unwrap_or(from);
    if successor != Some(target) {
        return Err(Error::InvalidTransition {
            from: from.to_string(),
            to: target.to_string(),
        });
    }

    authorize(actor, &Action::AdvanceStatus { from })?;

    let before = snapshot(&mark);
    mark.status = target.as_str().to_string();
    match target {
        // Installation freezes the location
        PieceMarkStatus::Installed => {
            mark.location = Some(FieldLocation::Installed.as_str().to_string());
        }
        // A mark shipped outside reconciliation has left the shop but has no
        // recorded zone yet
        PieceMarkStatus::Shipped if mark.location.is_none() => {
            mark.location = Some(FieldLocation::Unknown.as_str().to_string());
        }
        _ => {}
    }

    store::persist_piece_mark(&mut tx, &mut mark).await?;
    audit::append(
        &mut tx,
        NewEntry {
            actor,
            subject_type: SUBJECT_PIECE_MARK,
            subject_id: &mark.guid,
            transition: transition::STATUS_ADVANCE,
            before_state: Some(before),
            after_state: Some(snapshot(&mark)),
            description: note,
            discrepancy: None,
        },
    )
    .await?;
    tx.commit().await?;

    info!(mark = %mark.mark, from = %from, to = %target, "piece mark status advanced");
    events.emit_lossy(SteelTrackEvent::PieceMarkStatusChanged {
        piece_mark_id: uuid_of(&mark.guid),
        mark: mark.mark.clone(),
        old_status: from,
        new_status: target,
        actor_id: actor.actor_id,
        role: actor.role,
        timestamp: chrono::Utc::now(),
    });

    Ok(mark)
}

/// Roll a piece mark's status back one step, correcting a mistaken advance
pub async fn rollback_status(
    pool: &SqlitePool,
    events: &EventBus,
    actor: &Actor,
    guid: &str,
    to: Option<PieceMarkStatus>,
    note: Option<String>,
    expected_version: Option<i64>,
) -> Result<PieceMark> {
    let mut tx = pool.begin().await?;
    let mut mark = store::fetch_active_piece_mark(&mut tx, guid).await?;
    check_expected_version(&mark, expected_version)?;

    let from = mark.status()?;
    let predecessor = from.predecessor();
    let target = to.or(predecessor).unwrap_or(from);
    if predecessor != Some(target) {
        return Err(Error::InvalidTransition {
            from: from.to_string(),
            to: target.to_string(),
        });
    }

    let last_advance_by = audit::last_status_advance_actor(&mut tx, &mark.guid).await?;
    authorize(actor, &Action::RollbackStatus {
        from,
        last_advance_by,
    })?;

    let before = snapshot(&mark);
    mark.status = target.as_str().to_string();
    if target < PieceMarkStatus::Shipped {
        // Below shipped the location is meaningless again
        mark.location = None;
    }

    store::persist_piece_mark(&mut tx, &mut mark).await?;
    audit::append(
        &mut tx,
        NewEntry {
            actor,
            subject_type: SUBJECT_PIECE_MARK,
            subject_id: &mark.guid,
            transition: transition::STATUS_ROLLBACK,
            before_state: Some(before),
            after_state: Some(snapshot(&mark)),
            description: note,
            discrepancy: None,
        },
    )
    .await?;
    tx.commit().await?;

    info!(mark = %mark.mark, from = %from, to = %target, "piece mark status rolled back");
    events.emit_lossy(SteelTrackEvent::PieceMarkStatusChanged {
        piece_mark_id: uuid_of(&mark.guid),
        mark: mark.mark.clone(),
        old_status: from,
        new_status: target,
        actor_id: actor.actor_id,
        role: actor.role,
        timestamp: chrono::Utc::now(),
    });

    Ok(mark)
}

/// Set a piece mark's field location
///
/// Legal only while the mark is shipped; rejected outright once installed.
pub async fn update_location(
    pool: &SqlitePool,
    events: &EventBus,
    actor: &Actor,
    guid: &str,
    location: FieldLocation,
    note: Option<String>,
    expected_version: Option<i64>,
) -> Result<PieceMark> {
    let mut tx = pool.begin().await?;
    let mut mark = store::fetch_active_piece_mark(&mut tx, guid).await?;
    check_expected_version(&mark, expected_version)?;

    let status = mark.status()?;
    if status == PieceMarkStatus::Installed {
        return Err(Error::LocationLockedAfterInstall);
    }
    if status != PieceMarkStatus::Shipped {
        return Err(Error::InvalidTransition {
            from: status.to_string(),
            to: format!("location {}", location),
        });
    }

    authorize(actor, &Action::UpdateLocation { status })?;

    let old_location = mark.location()?;
    let before = snapshot(&mark);
    mark.location = Some(location.as_str().to_string());

    store::persist_piece_mark(&mut tx, &mut mark).await?;
    audit::append(
        &mut tx,
        NewEntry {
            actor,
            subject_type: SUBJECT_PIECE_MARK,
            subject_id: &mark.guid,
            transition: transition::LOCATION_UPDATE,
            before_state: Some(before),
            after_state: Some(snapshot(&mark)),
            description: note,
            discrepancy: None,
        },
    )
    .await?;
    tx.commit().await?;

    events.emit_lossy(SteelTrackEvent::PieceMarkLocationChanged {
        piece_mark_id: uuid_of(&mark.guid),
        mark: mark.mark.clone(),
        old_location,
        new_location: location,
        actor_id: actor.actor_id,
        timestamp: chrono::Utc::now(),
    });

    Ok(mark)
}

/// Attribute patch for a piece mark; omitted fields keep their value
#[derive(Debug, Default, Clone)]
pub struct AttributePatch {
    pub quantity: Option<i64>,
    pub weight_per_unit: Option<f64>,
    pub material: Option<String>,
    pub drawing_ref: Option<String>,
    pub sequence_no: Option<i64>,
}

/// Edit quantity/weight and descriptive attributes; total weight is
/// recomputed from the new factors at the write point
pub async fn update_attributes(
    pool: &SqlitePool,
    actor: &Actor,
    guid: &str,
    patch: AttributePatch,
    expected_version: Option<i64>,
) -> Result<PieceMark> {
    authorize(actor, &Action::ManagePieceMarks)?;

    if matches!(patch.quantity, Some(q) if q <= 0) {
        return Err(Error::InvalidInput("quantity must be positive".to_string()));
    }
    if matches!(patch.weight_per_unit, Some(w) if w < 0.0) {
        return Err(Error::InvalidInput(
            "weight_per_unit must be non-negative".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;
    let mut mark = store::fetch_active_piece_mark(&mut tx, guid).await?;
    check_expected_version(&mark, expected_version)?;

    let before = snapshot(&mark);
    if let Some(q) = patch.quantity {
        mark.quantity = q;
    }
    if let Some(w) = patch.weight_per_unit {
        mark.weight_per_unit = w;
    }
    if let Some(m) = patch.material {
        mark.material = Some(m);
    }
    if let Some(d) = patch.drawing_ref {
        mark.drawing_ref = Some(d);
    }
    if let Some(s) = patch.sequence_no {
        mark.sequence_no = Some(s);
    }

    store::persist_piece_mark(&mut tx, &mut mark).await?;
    audit::append(
        &mut tx,
        NewEntry {
            actor,
            subject_type: SUBJECT_PIECE_MARK,
            subject_id: &mark.guid,
            transition: transition::ATTRIBUTES_UPDATE,
            before_state: Some(before),
            after_state: Some(snapshot(&mark)),
            description: None,
            discrepancy: None,
        },
    )
    .await?;
    tx.commit().await?;

    Ok(mark)
}

/// Soft-delete a piece mark; its audit history stays intact and further
/// transitions against it report NotFound
pub async fn archive_piece_mark(
    pool: &SqlitePool,
    events: &EventBus,
    actor: &Actor,
    guid: &str,
    expected_version: Option<i64>,
) -> Result<PieceMark> {
    authorize(actor, &Action::ManagePieceMarks)?;

    let mut tx = pool.begin().await?;
    let mut mark = store::fetch_active_piece_mark(&mut tx, guid).await?;
    check_expected_version(&mark, expected_version)?;

    let before = snapshot(&mark);
    mark.archived = true;

    store::persist_piece_mark(&mut tx, &mut mark).await?;
    audit::append(
        &mut tx,
        NewEntry {
            actor,
            subject_type: SUBJECT_PIECE_MARK,
            subject_id: &mark.guid,
            transition: transition::ARCHIVED,
            before_state: Some(before),
            after_state: Some(snapshot(&mark)),
            description: None,
            discrepancy: None,
        },
    )
    .await?;
    tx.commit().await?;

    events.emit_lossy(SteelTrackEvent::PieceMarkArchived {
        piece_mark_id: uuid_of(&mark.guid),
        mark: mark.mark.clone(),
        actor_id: actor.actor_id,
        timestamp: chrono::Utc::now(),
    });

    Ok(mark)
}

fn uuid_of(guid: &str) -> uuid::Uuid {
    uuid::Uuid::parse_str(guid).unwrap_or_default()
}
