//! Piece-mark registry and delivery persistence
//!
//! All write helpers take an open connection/transaction so callers can
//! bundle the state write with its activity log entry into one atomic unit.
//! The piece-mark row is the unit of mutual exclusion: every UPDATE is
//! guarded by the row's `version`, and a lost race surfaces as
//! `ConcurrentModification` instead of a silent merge.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use steeltrack_common::db::models::{CrewAssignment, Delivery, DeliveryItem, PieceMark};
use steeltrack_common::domain::DeliveryStatus;
use steeltrack_common::{Error, Result};
use uuid::Uuid;

/// Fields supplied when registering a new piece mark
#[derive(Debug, Clone)]
pub struct NewPieceMark {
    pub project_id: String,
    pub mark: String,
    pub quantity: i64,
    pub weight_per_unit: f64,
    pub material: Option<String>,
    pub drawing_ref: Option<String>,
    pub sequence_no: Option<i64>,
}

/// Fields supplied when creating a delivery
#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub project_id: String,
    pub delivery_number: String,
    pub scheduled_date: Option<String>,
    pub carrier: Option<String>,
}

pub async fn fetch_piece_mark(conn: &mut SqliteConnection, guid: &str) -> Result<PieceMark> {
    sqlx::query_as::<_, PieceMark>("SELECT * FROM piece_marks WHERE guid = ?")
        .bind(guid)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("piece mark {}", guid)))
}

/// Fetch a piece mark that is still live; archived marks are invisible to
/// transitions and report NotFound
pub async fn fetch_active_piece_mark(
    conn: &mut SqliteConnection,
    guid: &str,
) -> Result<PieceMark> {
    let mark = fetch_piece_mark(conn, guid).await?;
    if mark.archived {
        return Err(Error::NotFound(format!("piece mark {}", guid)));
    }
    Ok(mark)
}

pub async fn insert_piece_mark(
    conn: &mut SqliteConnection,
    new: NewPieceMark,
) -> Result<PieceMark> {
    let now = Utc::now();
    let mark = PieceMark {
        guid: Uuid::new_v4().to_string(),
        project_id: new.project_id,
        mark: new.mark,
        quantity: new.quantity,
        weight_per_unit: new.weight_per_unit,
        total_weight: new.quantity as f64 * new.weight_per_unit,
        material: new.material,
        drawing_ref: new.drawing_ref,
        sequence_no: new.sequence_no,
        status: "not_started".to_string(),
        location: None,
        archived: false,
        version: 0,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO piece_marks
            (guid, project_id, mark, quantity, weight_per_unit, total_weight,
             material, drawing_ref, sequence_no, status, location, archived,
             version, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&mark.guid)
    .bind(&mark.project_id)
    .bind(&mark.mark)
    .bind(mark.quantity)
    .bind(mark.weight_per_unit)
    .bind(mark.total_weight)
    .bind(&mark.material)
    .bind(&mark.drawing_ref)
    .bind(mark.sequence_no)
    .bind(&mark.status)
    .bind(&mark.location)
    .bind(mark.archived)
    .bind(mark.version)
    .bind(mark.created_at)
    .bind(mark.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(mark)
}

/// Persist a mutated piece mark, bumping its version
///
/// The caller mutates a loaded row in place; this is the single write point,
/// so the total-weight invariant is recomputed here and cannot drift. Zero
/// rows affected means another writer won the race.
pub async fn persist_piece_mark(
    conn: &mut SqliteConnection,
    mark: &mut PieceMark,
) -> Result<()> {
    let expected_version = mark.version;
    mark.total_weight = mark.quantity as f64 * mark.weight_per_unit;
    mark.version += 1;
    mark.updated_at = Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE piece_marks
        SET quantity = ?, weight_per_unit = ?, total_weight = ?, material = ?,
            drawing_ref = ?, sequence_no = ?, status = ?, location = ?,
            archived = ?, version = ?, updated_at = ?
        WHERE guid = ? AND version = ?
        "#,
    )
    .bind(mark.quantity)
    .bind(mark.weight_per_unit)
    .bind(mark.total_weight)
    .bind(&mark.material)
    .bind(&mark.drawing_ref)
    .bind(mark.sequence_no)
    .bind(&mark.status)
    .bind(&mark.location)
    .bind(mark.archived)
    .bind(mark.version)
    .bind(mark.updated_at)
    .bind(&mark.guid)
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::ConcurrentModification);
    }

    Ok(())
}

pub async fn list_piece_marks(
    pool: &SqlitePool,
    project_id: Option<&str>,
    status: Option<&str>,
    location: Option<&str>,
) -> Result<Vec<PieceMark>> {
    let mut sql = String::from("SELECT * FROM piece_marks WHERE archived = 0");
    if project_id.is_some() {
        sql.push_str(" AND project_id = ?");
    }
    if status.is_some() {
        sql.push_str(" AND status = ?");
    }
    if location.is_some() {
        sql.push_str(" AND location = ?");
    }
    sql.push_str(" ORDER BY project_id, sequence_no, mark");

    let mut query = sqlx::query_as::<_, PieceMark>(&sql);
    if let Some(p) = project_id {
        query = query.bind(p);
    }
    if let Some(s) = status {
        query = query.bind(s);
    }
    if let Some(l) = location {
        query = query.bind(l);
    }

    Ok(query.fetch_all(pool).await?)
}

pub async fn fetch_delivery(conn: &mut SqliteConnection, guid: &str) -> Result<Delivery> {
    sqlx::query_as::<_, Delivery>("SELECT * FROM deliveries WHERE guid = ?")
        .bind(guid)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("delivery {}", guid)))
}

pub async fn insert_delivery(conn: &mut SqliteConnection, new: NewDelivery) -> Result<Delivery> {
    let now = Utc::now();
    let delivery = Delivery {
        guid: Uuid::new_v4().to_string(),
        project_id: new.project_id,
        delivery_number: new.delivery_number,
        scheduled_date: new.scheduled_date,
        arrived_at: None,
        status: "pending".to_string(),
        carrier: new.carrier,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO deliveries
            (guid, project_id, delivery_number, scheduled_date, arrived_at,
             status, carrier, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&delivery.guid)
    .bind(&delivery.project_id)
    .bind(&delivery.delivery_number)
    .bind(&delivery.scheduled_date)
    .bind(delivery.arrived_at)
    .bind(&delivery.status)
    .bind(&delivery.carrier)
    .bind(delivery.created_at)
    .bind(delivery.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(delivery)
}

/// Move a delivery to a new status, guarded by its current status so two
/// racing requests cannot both apply against the same prior state
pub async fn update_delivery_status(
    conn: &mut SqliteConnection,
    delivery: &mut Delivery,
    new_status: DeliveryStatus,
    arrived_at: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<()> {
    let old_status = delivery.status.clone();
    delivery.status = new_status.as_str().to_string();
    if arrived_at.is_some() {
        delivery.arrived_at = arrived_at;
    }
    delivery.updated_at = Utc::now();

    let result = sqlx::query(
        "UPDATE deliveries SET status = ?, arrived_at = ?, updated_at = ? WHERE guid = ? AND status = ?",
    )
    .bind(&delivery.status)
    .bind(delivery.arrived_at)
    .bind(delivery.updated_at)
    .bind(&delivery.guid)
    .bind(&old_status)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::ConcurrentModification);
    }

    Ok(())
}

pub async fn list_deliveries(
    pool: &SqlitePool,
    project_id: Option<&str>,
    status: Option<&str>,
) -> Result<Vec<Delivery>> {
    let mut sql = String::from("SELECT * FROM deliveries WHERE 1 = 1");
    if project_id.is_some() {
        sql.push_str(" AND project_id = ?");
    }
    if status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY created_at");

    let mut query = sqlx::query_as::<_, Delivery>(&sql);
    if let Some(p) = project_id {
        query = query.bind(p);
    }
    if let Some(s) = status {
        query = query.bind(s);
    }

    Ok(query.fetch_all(pool).await?)
}

/// Items of a delivery in insertion order
pub async fn fetch_delivery_items(
    conn: &mut SqliteConnection,
    delivery_id: &str,
) -> Result<Vec<DeliveryItem>> {
    Ok(sqlx::query_as::<_, DeliveryItem>(
        "SELECT * FROM delivery_items WHERE delivery_id = ? ORDER BY rowid",
    )
    .bind(delivery_id)
    .fetch_all(&mut *conn)
    .await?)
}

/// Expected quantity for a piece mark still pending on non-terminal
/// deliveries
///
/// Together with the already-received sum this bounds how much of the mark
/// can be put on a new delivery: a mark is normally on at most one open item,
/// and a split across two open deliveries never commits more than the mark's
/// quantity.
pub async fn open_expected_quantity(
    conn: &mut SqliteConnection,
    piece_mark_id: &str,
) -> Result<i64> {
    let sum: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(di.expected_quantity), 0) FROM delivery_items di
        JOIN deliveries d ON d.guid = di.delivery_id
        WHERE di.piece_mark_id = ?
          AND di.received_quantity IS NULL
          AND d.status NOT IN ('received', 'rejected')
        "#,
    )
    .bind(piece_mark_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(sum)
}

pub async fn insert_delivery_item(
    conn: &mut SqliteConnection,
    delivery_id: &str,
    piece_mark_id: &str,
    expected_quantity: i64,
) -> Result<DeliveryItem> {
    let now = Utc::now();
    let item = DeliveryItem {
        guid: Uuid::new_v4().to_string(),
        delivery_id: delivery_id.to_string(),
        piece_mark_id: piece_mark_id.to_string(),
        expected_quantity,
        received_quantity: None,
        condition: None,
        location: None,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO delivery_items
            (guid, delivery_id, piece_mark_id, expected_quantity,
             received_quantity, condition, location, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&item.guid)
    .bind(&item.delivery_id)
    .bind(&item.piece_mark_id)
    .bind(item.expected_quantity)
    .bind(item.received_quantity)
    .bind(&item.condition)
    .bind(&item.location)
    .bind(item.created_at)
    .bind(item.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(item)
}

/// Record a reconciliation outcome triple on a delivery item
pub async fn record_item_outcome(
    conn: &mut SqliteConnection,
    item: &mut DeliveryItem,
    received_quantity: i64,
    condition: &str,
    location: &str,
) -> Result<()> {
    item.received_quantity = Some(received_quantity);
    item.condition = Some(condition.to_string());
    item.location = Some(location.to_string());
    item.updated_at = Utc::now();

    sqlx::query(
        "UPDATE delivery_items SET received_quantity = ?, condition = ?, location = ?, updated_at = ? WHERE guid = ?",
    )
    .bind(item.received_quantity)
    .bind(&item.condition)
    .bind(&item.location)
    .bind(item.updated_at)
    .bind(&item.guid)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Quantity already received for a piece mark across all reconciled delivery
/// items, excluding one item (the one currently being reconciled)
pub async fn reconciled_quantity(
    conn: &mut SqliteConnection,
    piece_mark_id: &str,
    exclude_item: &str,
) -> Result<i64> {
    let sum: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(received_quantity), 0) FROM delivery_items
        WHERE piece_mark_id = ? AND received_quantity IS NOT NULL AND guid != ?
        "#,
    )
    .bind(piece_mark_id)
    .bind(exclude_item)
    .fetch_one(&mut *conn)
    .await?;

    Ok(sum)
}

/// Items for a piece mark still awaiting an outcome on non-terminal deliveries
pub async fn unreconciled_open_items(
    conn: &mut SqliteConnection,
    piece_mark_id: &str,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM delivery_items di
        JOIN deliveries d ON d.guid = di.delivery_id
        WHERE di.piece_mark_id = ?
          AND di.received_quantity IS NULL
          AND d.status NOT IN ('received', 'rejected')
        "#,
    )
    .bind(piece_mark_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}

pub async fn fetch_crew_assignment(
    conn: &mut SqliteConnection,
    guid: &str,
) -> Result<CrewAssignment> {
    sqlx::query_as::<_, CrewAssignment>("SELECT * FROM crew_assignments WHERE guid = ?")
        .bind(guid)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("crew assignment {}", guid)))
}

pub async fn list_crew_assignments(
    pool: &SqlitePool,
    project_id: Option<&str>,
) -> Result<Vec<CrewAssignment>> {
    let mut sql = String::from("SELECT * FROM crew_assignments WHERE 1 = 1");
    if project_id.is_some() {
        sql.push_str(" AND project_id = ?");
    }
    sql.push_str(" ORDER BY work_date, shift, crew_name");

    let mut query = sqlx::query_as::<_, CrewAssignment>(&sql);
    if let Some(p) = project_id {
        query = query.bind(p);
    }

    Ok(query.fetch_all(pool).await?)
}
