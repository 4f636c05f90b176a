//! Domain enums shared across the SteelTrack services
//!
//! All of these are closed sets: the database CHECK constraints, the serde
//! representation and `FromStr` accept exactly the values listed here.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Piece-mark fabrication/installation status
///
/// A total order with no skip transitions: a piece mark advances one step at
/// a time, and the only backward move is a single-step rollback to correct a
/// mistaken advance. Declaration order is the lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceMarkStatus {
    NotStarted,
    Fabricating,
    Completed,
    Shipped,
    Installed,
}

impl PieceMarkStatus {
    /// All statuses in lifecycle order
    pub const ORDER: [PieceMarkStatus; 5] = [
        PieceMarkStatus::NotStarted,
        PieceMarkStatus::Fabricating,
        PieceMarkStatus::Completed,
        PieceMarkStatus::Shipped,
        PieceMarkStatus::Installed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PieceMarkStatus::NotStarted => "not_started",
            PieceMarkStatus::Fabricating => "fabricating",
            PieceMarkStatus::Completed => "completed",
            PieceMarkStatus::Shipped => "shipped",
            PieceMarkStatus::Installed => "installed",
        }
    }

    /// The immediate next status in the lifecycle, if any
    pub fn successor(&self) -> Option<PieceMarkStatus> {
        let idx = Self::ORDER.iter().position(|s| s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }

    /// The immediate previous status in the lifecycle, if any
    pub fn predecessor(&self) -> Option<PieceMarkStatus> {
        let idx = Self::ORDER.iter().position(|s| s == self)?;
        idx.checked_sub(1).and_then(|i| Self::ORDER.get(i)).copied()
    }
}

impl fmt::Display for PieceMarkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PieceMarkStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "not_started" => Ok(PieceMarkStatus::NotStarted),
            "fabricating" => Ok(PieceMarkStatus::Fabricating),
            "completed" => Ok(PieceMarkStatus::Completed),
            "shipped" => Ok(PieceMarkStatus::Shipped),
            "installed" => Ok(PieceMarkStatus::Installed),
            other => Err(Error::InvalidInput(format!(
                "unknown piece mark status: {}",
                other
            ))),
        }
    }
}

/// Physical zone of a piece mark once it has left the shop
///
/// Meaningful only while status >= shipped. Unordered: any value is reachable
/// from any other while the mark is shipped. Once the mark is installed the
/// location is forced to `Installed` and frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldLocation {
    Yard,
    Staging,
    CraneZone,
    Installed,
    Unknown,
}

impl FieldLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldLocation::Yard => "yard",
            FieldLocation::Staging => "staging",
            FieldLocation::CraneZone => "crane_zone",
            FieldLocation::Installed => "installed",
            FieldLocation::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FieldLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "yard" => Ok(FieldLocation::Yard),
            "staging" => Ok(FieldLocation::Staging),
            "crane_zone" => Ok(FieldLocation::CraneZone),
            "installed" => Ok(FieldLocation::Installed),
            "unknown" => Ok(FieldLocation::Unknown),
            other => Err(Error::InvalidInput(format!(
                "unknown field location: {}",
                other
            ))),
        }
    }
}

/// Delivery lifecycle status
///
/// `pending -> in_transit -> delivered -> received`, with `rejected` a
/// terminal side-state reachable from any non-terminal state. `received` is
/// reachable only through a complete reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InTransit,
    Delivered,
    Received,
    Rejected,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Received => "received",
            DeliveryStatus::Rejected => "rejected",
        }
    }

    /// Received and rejected deliveries accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Received | DeliveryStatus::Rejected)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "in_transit" => Ok(DeliveryStatus::InTransit),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "received" => Ok(DeliveryStatus::Received),
            "rejected" => Ok(DeliveryStatus::Rejected),
            other => Err(Error::InvalidInput(format!(
                "unknown delivery status: {}",
                other
            ))),
        }
    }
}

/// Condition outcome recorded for a delivery item at reconciliation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    Good,
    Damaged,
    Missing,
}

impl ItemCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCondition::Good => "good",
            ItemCondition::Damaged => "damaged",
            ItemCondition::Missing => "missing",
        }
    }
}

impl fmt::Display for ItemCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemCondition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "good" => Ok(ItemCondition::Good),
            "damaged" => Ok(ItemCondition::Damaged),
            "missing" => Ok(ItemCondition::Missing),
            other => Err(Error::InvalidInput(format!(
                "unknown item condition: {}",
                other
            ))),
        }
    }
}

/// Crew assignment progression: scheduled -> active -> completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrewStatus {
    Scheduled,
    Active,
    Completed,
}

impl CrewStatus {
    pub const ORDER: [CrewStatus; 3] = [
        CrewStatus::Scheduled,
        CrewStatus::Active,
        CrewStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CrewStatus::Scheduled => "scheduled",
            CrewStatus::Active => "active",
            CrewStatus::Completed => "completed",
        }
    }

    pub fn successor(&self) -> Option<CrewStatus> {
        let idx = Self::ORDER.iter().position(|s| s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }

    pub fn predecessor(&self) -> Option<CrewStatus> {
        let idx = Self::ORDER.iter().position(|s| s == self)?;
        idx.checked_sub(1).and_then(|i| Self::ORDER.get(i)).copied()
    }
}

impl fmt::Display for CrewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrewStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scheduled" => Ok(CrewStatus::Scheduled),
            "active" => Ok(CrewStatus::Active),
            "completed" => Ok(CrewStatus::Completed),
            other => Err(Error::InvalidInput(format!(
                "unknown crew status: {}",
                other
            ))),
        }
    }
}

/// Actor role, resolved by the identity collaborator before a request
/// reaches this service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    ProjectManager,
    Shop,
    Field,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::ProjectManager => "project_manager",
            Role::Shop => "shop",
            Role::Field => "field",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(Role::Admin),
            "project_manager" => Ok(Role::ProjectManager),
            "shop" => Ok(Role::Shop),
            "field" => Ok(Role::Field),
            "client" => Ok(Role::Client),
            other => Err(Error::InvalidInput(format!("unknown role: {}", other))),
        }
    }
}
