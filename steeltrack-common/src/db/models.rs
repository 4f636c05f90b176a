//! Database models
//!
//! Row structs mirror the column types; enumerated columns stay TEXT here
//! and are parsed into the domain enums through the accessor methods, so a
//! value that slipped past the CHECK constraints still fails loudly instead
//! of being misread.

use crate::domain::{
    CrewStatus, DeliveryStatus, FieldLocation, ItemCondition, PieceMarkStatus, Role,
};
use crate::Result;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Canonical record for one fabricated component
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PieceMark {
    pub guid: String,
    pub project_id: String,
    pub mark: String,
    pub quantity: i64,
    pub weight_per_unit: f64,
    /// Always `quantity * weight_per_unit`; recomputed on every write
    pub total_weight: f64,
    pub material: Option<String>,
    pub drawing_ref: Option<String>,
    pub sequence_no: Option<i64>,
    pub status: String,
    pub location: Option<String>,
    pub archived: bool,
    /// Optimistic concurrency token
    pub version: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl PieceMark {
    pub fn status(&self) -> Result<PieceMarkStatus> {
        self.status.parse()
    }

    pub fn location(&self) -> Result<Option<FieldLocation>> {
        self.location.as_deref().map(str::parse).transpose()
    }
}

/// A scheduled or completed shipment of piece marks to the field
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Delivery {
    pub guid: String,
    pub project_id: String,
    pub delivery_number: String,
    pub scheduled_date: Option<String>,
    pub arrived_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: String,
    pub carrier: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Delivery {
    pub fn status(&self) -> Result<DeliveryStatus> {
        self.status.parse()
    }
}

/// One piece mark's line in a delivery; the reconciliation outcome triple
/// stays NULL until recorded
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeliveryItem {
    pub guid: String,
    pub delivery_id: String,
    pub piece_mark_id: String,
    pub expected_quantity: i64,
    pub received_quantity: Option<i64>,
    pub condition: Option<String>,
    pub location: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl DeliveryItem {
    pub fn condition(&self) -> Result<Option<ItemCondition>> {
        self.condition.as_deref().map(str::parse).transpose()
    }

    pub fn location(&self) -> Result<Option<FieldLocation>> {
        self.location.as_deref().map(str::parse).transpose()
    }

    /// Whether the (received_quantity, condition, location) triple is recorded
    pub fn is_reconciled(&self) -> bool {
        self.received_quantity.is_some() && self.condition.is_some() && self.location.is_some()
    }
}

/// A crew working a shift, used to attribute field activity
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CrewAssignment {
    pub guid: String,
    pub project_id: String,
    pub crew_name: String,
    pub work_date: String,
    pub shift: String,
    pub crew_size: i64,
    pub zone: Option<String>,
    pub supervisor_id: Option<String>,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl CrewAssignment {
    pub fn status(&self) -> Result<CrewStatus> {
        self.status.parse()
    }
}

/// Immutable audit record of one transition
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub guid: String,
    pub actor_id: String,
    pub role: String,
    pub subject_type: String,
    pub subject_id: String,
    pub transition: String,
    /// JSON snapshot of the subject before the transition
    pub before_state: Option<String>,
    /// JSON snapshot of the subject after the transition
    pub after_state: Option<String>,
    pub description: Option<String>,
    /// JSON discrepancy detail (shortfall, condition) when reconciliation
    /// found one; NULL for clean transitions
    pub discrepancy: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ActivityLogEntry {
    pub fn role(&self) -> Result<Role> {
        self.role.parse()
    }
}
