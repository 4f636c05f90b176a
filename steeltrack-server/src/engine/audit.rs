//! Activity/audit log
//!
//! Append-only record of every transition. Appends happen on the caller's
//! open transaction so the audit entry and the state change it records
//! commit or roll back together; no code path issues UPDATE or DELETE
//! against this table.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use steeltrack_common::auth::Actor;
use steeltrack_common::db::models::ActivityLogEntry;
use steeltrack_common::Result;
use uuid::Uuid;

pub const SUBJECT_PIECE_MARK: &str = "piece_mark";
pub const SUBJECT_DELIVERY: &str = "delivery";
pub const SUBJECT_CREW: &str = "crew";

/// Transition kind tags written to the log
pub mod transition {
    pub const CREATED: &str = "created";
    pub const STATUS_ADVANCE: &str = "status_advance";
    pub const STATUS_ROLLBACK: &str = "status_rollback";
    pub const LOCATION_UPDATE: &str = "location_update";
    pub const ATTRIBUTES_UPDATE: &str = "attributes_update";
    pub const ARCHIVED: &str = "archived";
    pub const DELIVERY_CREATED: &str = "delivery_created";
    pub const DELIVERY_STATUS: &str = "delivery_status";
    pub const DELIVERY_ITEM_ADDED: &str = "delivery_item_added";
    pub const DELIVERY_RECEIPT: &str = "delivery_receipt";
    pub const DELIVERY_RECEIVED: &str = "delivery_received";
    pub const CREW_ASSIGNED: &str = "crew_assigned";
    pub const CREW_STATUS: &str = "crew_status";
}

/// JSON snapshot of the state-machine-relevant fields of a piece mark,
/// written into before/after columns of the log
pub fn piece_mark_snapshot(mark: &steeltrack_common::db::models::PieceMark) -> serde_json::Value {
    serde_json::json!({
        "status": mark.status,
        "location": mark.location,
        "quantity": mark.quantity,
        "weight_per_unit": mark.weight_per_unit,
        "total_weight": mark.total_weight,
        "archived": mark.archived,
    })
}

/// One record to append, with JSON snapshots of the subject around the change
pub struct NewEntry<'a> {
    pub actor: &'a Actor,
    pub subject_type: &'a str,
    pub subject_id: &'a str,
    pub transition: &'a str,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
    pub description: Option<String>,
    pub discrepancy: Option<serde_json::Value>,
}

/// Append one entry on the caller's transaction
pub async fn append(
    conn: &mut SqliteConnection,
    entry: NewEntry<'_>,
) -> Result<ActivityLogEntry> {
    let row = ActivityLogEntry {
        guid: Uuid::new_v4().to_string(),
        actor_id: entry.actor.actor_id.to_string(),
        role: entry.actor.role.as_str().to_string(),
        subject_type: entry.subject_type.to_string(),
        subject_id: entry.subject_id.to_string(),
        transition: entry.transition.to_string(),
        before_state: entry.before_state.map(|v| v.to_string()),
        after_state: entry.after_state.map(|v| v.to_string()),
        description: entry.description,
        discrepancy: entry.discrepancy.map(|v| v.to_string()),
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO activity_log
            (guid, actor_id, role, subject_type, subject_id, transition,
             before_state, after_state, description, discrepancy, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&row.guid)
    .bind(&row.actor_id)
    .bind(&row.role)
    .bind(&row.subject_type)
    .bind(&row.subject_id)
    .bind(&row.transition)
    .bind(&row.before_state)
    .bind(&row.after_state)
    .bind(&row.description)
    .bind(&row.discrepancy)
    .bind(row.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(row)
}

/// Actor who wrote the most recent status advance for a piece mark, if any
///
/// Backs the shop rollback rule ("only their own prior action").
pub async fn last_status_advance_actor(
    conn: &mut SqliteConnection,
    piece_mark_id: &str,
) -> Result<Option<Uuid>> {
    let actor_id: Option<String> = sqlx::query_scalar(
        r#"
        SELECT actor_id FROM activity_log
        WHERE subject_type = 'piece_mark' AND subject_id = ? AND transition = 'status_advance'
        ORDER BY created_at DESC, rowid DESC
        LIMIT 1
        "#,
    )
    .bind(piece_mark_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(actor_id.and_then(|s| Uuid::parse_str(&s).ok()))
}

/// Entries per page on the query surface
pub const PAGE_SIZE: i64 = 100;

/// History query filter; all dimensions combine with AND
#[derive(Debug, Default, Clone)]
pub struct ActivityFilter {
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub actor_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// 1-indexed
    pub page: i64,
}

/// One page of history, time ascending
#[derive(Debug, serde::Serialize)]
pub struct ActivityPage {
    pub entries: Vec<ActivityLogEntry>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}

/// Query the log: by subject, by actor, by time range - time ascending, with
/// the implicit rowid as tiebreaker for entries sharing a timestamp
pub async fn query_log(pool: &SqlitePool, filter: ActivityFilter) -> Result<ActivityPage> {
    let mut where_sql = String::from(" WHERE 1 = 1");
    if filter.subject_type.is_some() {
        where_sql.push_str(" AND subject_type = ?");
    }
    if filter.subject_id.is_some() {
        where_sql.push_str(" AND subject_id = ?");
    }
    if filter.actor_id.is_some() {
        where_sql.push_str(" AND actor_id = ?");
    }
    if filter.from.is_some() {
        where_sql.push_str(" AND created_at >= ?");
    }
    if filter.to.is_some() {
        where_sql.push_str(" AND created_at <= ?");
    }

    let count_sql = format!("SELECT COUNT(*) FROM activity_log{}", where_sql);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(v) = &filter.subject_type {
        count_query = count_query.bind(v);
    }
    if let Some(v) = &filter.subject_id {
        count_query = count_query.bind(v);
    }
    if let Some(v) = &filter.actor_id {
        count_query = count_query.bind(v);
    }
    if let Some(v) = filter.from {
        count_query = count_query.bind(v);
    }
    if let Some(v) = filter.to {
        count_query = count_query.bind(v);
    }
    let total = count_query.fetch_one(pool).await?;

    let page = filter.page.max(1);
    let offset = (page - 1) * PAGE_SIZE;

    let select_sql = format!(
        "SELECT * FROM activity_log{} ORDER BY created_at ASC, rowid ASC LIMIT {} OFFSET {}",
        where_sql, PAGE_SIZE, offset
    );
    let mut select_query = sqlx::query_as::<_, ActivityLogEntry>(&select_sql);
    if let Some(v) = &filter.subject_type {
        select_query = select_query.bind(v);
    }
    if let Some(v) = &filter.subject_id {
        select_query = select_query.bind(v);
    }
    if let Some(v) = &filter.actor_id {
        select_query = select_query.bind(v);
    }
    if let Some(v) = filter.from {
        select_query = select_query.bind(v);
    }
    if let Some(v) = filter.to {
        select_query = select_query.bind(v);
    }
    let entries = select_query.fetch_all(pool).await?;

    Ok(ActivityPage {
        entries,
        page,
        page_size: PAGE_SIZE,
        total,
    })
}
