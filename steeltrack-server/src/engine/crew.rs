//! Crew assignment ledger
//!
//! Associates a set of piece marks with a crew/shift/date window so field
//! activity can be attributed to a responsible unit. Progression is the
//! simple scheduled -> active -> completed ladder with the same single-step
//! rollback correction the piece-mark machine allows.

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use steeltrack_common::auth::{authorize, Action, Actor};
use steeltrack_common::db::models::CrewAssignment;
use steeltrack_common::domain::CrewStatus;
use steeltrack_common::events::{EventBus, SteelTrackEvent};
use steeltrack_common::{Error, Result};
use uuid::Uuid;

use super::audit::{self, transition, NewEntry, SUBJECT_CREW};
use super::store;

/// Fields supplied when assigning a crew
#[derive(Debug, Clone)]
pub struct NewCrewAssignment {
    pub project_id: String,
    pub crew_name: String,
    pub work_date: String,
    pub shift: String,
    pub crew_size: i64,
    pub zone: Option<String>,
    pub supervisor_id: Option<Uuid>,
    pub piece_mark_ids: Vec<String>,
}

/// Create a crew assignment with its piece-mark set
pub async fn assign_crew(
    pool: &SqlitePool,
    events: &EventBus,
    actor: &Actor,
    new: NewCrewAssignment,
) -> Result<CrewAssignment> {
    authorize(actor, &Action::ManageCrew {
        supervisor_id: new.supervisor_id,
    })?;

    if new.crew_size <= 0 {
        return Err(Error::InvalidInput("crew_size must be positive".to_string()));
    }

    let now = Utc::now();
    let crew = CrewAssignment {
        guid: Uuid::new_v4().to_string(),
        project_id: new.project_id,
        crew_name: new.crew_name,
        work_date: new.work_date,
        shift: new.shift,
        crew_size: new.crew_size,
        zone: new.zone,
        supervisor_id: new.supervisor_id.map(|u| u.to_string()),
        status: CrewStatus::Scheduled.as_str().to_string(),
        created_at: now,
        updated_at: now,
    };

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO crew_assignments
            (guid, project_id, crew_name, work_date, shift, crew_size, zone,
             supervisor_id, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&crew.guid)
    .bind(&crew.project_id)
    .bind(&crew.crew_name)
    .bind(&crew.work_date)
    .bind(&crew.shift)
    .bind(crew.crew_size)
    .bind(&crew.zone)
    .bind(&crew.supervisor_id)
    .bind(&crew.status)
    .bind(crew.created_at)
    .bind(crew.updated_at)
    .execute(&mut *tx)
    .await?;

    let mut mark_uuids = Vec::with_capacity(new.piece_mark_ids.len());
    for mark_id in &new.piece_mark_ids {
        let mark = store::fetch_active_piece_mark(&mut tx, mark_id).await?;
        sqlx::query(
            "INSERT INTO crew_assignment_marks (crew_assignment_id, piece_mark_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(&crew.guid)
        .bind(&mark.guid)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        mark_uuids.push(Uuid::parse_str(&mark.guid).unwrap_or_default());
    }

    audit::append(
        &mut tx,
        NewEntry {
            actor,
            subject_type: SUBJECT_CREW,
            subject_id: &crew.guid,
            transition: transition::CREW_ASSIGNED,
            before_state: None,
            after_state: Some(json!({
                "status": crew.status,
                "crew_name": crew.crew_name,
                "piece_marks": new.piece_mark_ids,
            })),
            description: Some(format!(
                "crew {} assigned for {} shift {}",
                crew.crew_name, crew.work_date, crew.shift
            )),
            discrepancy: None,
        },
    )
    .await?;
    tx.commit().await?;

    events.emit_lossy(SteelTrackEvent::CrewAssigned {
        crew_assignment_id: Uuid::parse_str(&crew.guid).unwrap_or_default(),
        project_id: crew.project_id.clone(),
        crew_name: crew.crew_name.clone(),
        piece_mark_ids: mark_uuids,
        timestamp: chrono::Utc::now(),
    });

    Ok(crew)
}

/// Progress a crew assignment one step, or roll a mistaken progression back
pub async fn set_crew_status(
    pool: &SqlitePool,
    events: &EventBus,
    actor: &Actor,
    guid: &str,
    to: CrewStatus,
    note: Option<String>,
) -> Result<CrewAssignment> {
    let mut tx = pool.begin().await?;
    let mut crew = store::fetch_crew_assignment(&mut tx, guid).await?;

    let supervisor_id = crew
        .supervisor_id
        .as_deref()
        .and_then(|s| Uuid::parse_str(s).ok());
    authorize(actor, &Action::ManageCrew { supervisor_id })?;

    let from = crew.status()?;
    if from.successor() != Some(to) && from.predecessor() != Some(to) {
        return Err(Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    let old_status = crew.status.clone();
    crew.status = to.as_str().to_string();
    crew.updated_at = Utc::now();

    let result = sqlx::query(
        "UPDATE crew_assignments SET status = ?, updated_at = ? WHERE guid = ? AND status = ?",
    )
    .bind(&crew.status)
    .bind(crew.updated_at)
    .bind(&crew.guid)
    .bind(&old_status)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::ConcurrentModification);
    }

    audit::append(
        &mut tx,
        NewEntry {
            actor,
            subject_type: SUBJECT_CREW,
            subject_id: &crew.guid,
            transition: transition::CREW_STATUS,
            before_state: Some(json!({ "status": old_status })),
            after_state: Some(json!({ "status": crew.status })),
            description: note,
            discrepancy: None,
        },
    )
    .await?;
    tx.commit().await?;

    events.emit_lossy(SteelTrackEvent::CrewStatusChanged {
        crew_assignment_id: Uuid::parse_str(&crew.guid).unwrap_or_default(),
        crew_name: crew.crew_name.clone(),
        old_status: from,
        new_status: to,
        timestamp: chrono::Utc::now(),
    });

    Ok(crew)
}
