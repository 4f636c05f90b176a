//! Event types for the SteelTrack event system
//!
//! Provides shared event definitions and the EventBus used to broadcast
//! committed transitions to subscribed viewers.
//!
//! Broadcast is fire-and-forget relative to the write path: events are
//! emitted only after the owning transaction commits, and a failed or
//! lagging broadcast never rolls back a committed state change.

use crate::domain::{
    CrewStatus, DeliveryStatus, FieldLocation, ItemCondition, PieceMarkStatus, Role,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Per-item outcome carried on a [`SteelTrackEvent::DeliveryReconciled`] event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// Delivery item UUID
    pub item_id: Uuid,
    /// Piece mark UUID the item refers to
    pub piece_mark_id: Uuid,
    /// Piece mark code, for display
    pub mark: String,
    /// Quantity the delivery was expected to carry
    pub expected_quantity: i64,
    /// Quantity actually received
    pub received_quantity: i64,
    /// Condition recorded at the gate
    pub condition: ItemCondition,
    /// Field location the pieces were placed at
    pub location: FieldLocation,
    /// Computed shortfall (expected - received), zero for clean items
    pub shortfall: i64,
}

impl ItemOutcome {
    /// Whether this outcome carries a discrepancy that must be surfaced
    pub fn is_discrepancy(&self) -> bool {
        self.shortfall > 0 || self.condition != ItemCondition::Good
    }
}

/// SteelTrack event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// All committed transitions use this central enum for type safety and
/// exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SteelTrackEvent {
    /// A piece mark was created during project setup
    PieceMarkCreated {
        piece_mark_id: Uuid,
        project_id: String,
        mark: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A piece mark's status advanced or rolled back one step
    PieceMarkStatusChanged {
        piece_mark_id: Uuid,
        mark: String,
        old_status: PieceMarkStatus,
        new_status: PieceMarkStatus,
        actor_id: Uuid,
        role: Role,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A piece mark's field location changed
    PieceMarkLocationChanged {
        piece_mark_id: Uuid,
        mark: String,
        old_location: Option<FieldLocation>,
        new_location: FieldLocation,
        actor_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A piece mark was archived (soft delete)
    PieceMarkArchived {
        piece_mark_id: Uuid,
        mark: String,
        actor_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A delivery record was created
    DeliveryCreated {
        delivery_id: Uuid,
        project_id: String,
        delivery_number: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A delivery moved along pending -> in_transit -> delivered, or was rejected
    DeliveryStatusChanged {
        delivery_id: Uuid,
        delivery_number: String,
        old_status: DeliveryStatus,
        new_status: DeliveryStatus,
        actor_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A delivery was fully reconciled and reached `received`
    ///
    /// Carries every item outcome, including discrepancies, so downstream
    /// consumers can open their own non-conformance process without reading
    /// the audit log.
    DeliveryReconciled {
        delivery_id: Uuid,
        delivery_number: String,
        outcomes: Vec<ItemOutcome>,
        discrepancy_count: usize,
        actor_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A crew assignment was created
    CrewAssigned {
        crew_assignment_id: Uuid,
        project_id: String,
        crew_name: String,
        piece_mark_ids: Vec<Uuid>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A crew assignment progressed scheduled -> active -> completed
    CrewStatusChanged {
        crew_assignment_id: Uuid,
        crew_name: String,
        old_status: CrewStatus,
        new_status: CrewStatus,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SteelTrackEvent {
    /// Get event type as string for filtering and SSE event names
    pub fn event_type(&self) -> &'static str {
        match self {
            SteelTrackEvent::PieceMarkCreated { .. } => "PieceMarkCreated",
            SteelTrackEvent::PieceMarkStatusChanged { .. } => "PieceMarkStatusChanged",
            SteelTrackEvent::PieceMarkLocationChanged { .. } => "PieceMarkLocationChanged",
            SteelTrackEvent::PieceMarkArchived { .. } => "PieceMarkArchived",
            SteelTrackEvent::DeliveryCreated { .. } => "DeliveryCreated",
            SteelTrackEvent::DeliveryStatusChanged { .. } => "DeliveryStatusChanged",
            SteelTrackEvent::DeliveryReconciled { .. } => "DeliveryReconciled",
            SteelTrackEvent::CrewAssigned { .. } => "CrewAssigned",
            SteelTrackEvent::CrewStatusChanged { .. } => "CrewStatusChanged",
        }
    }
}

/// Central event distribution bus for application-wide events
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SteelTrackEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SteelTrackEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SteelTrackEvent,
    ) -> Result<usize, broadcast::error::SendError<SteelTrackEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    ///
    /// This is the write path's interface: a committed transition is
    /// broadcast best-effort and the result is discarded.
    pub fn emit_lossy(&self, event: SteelTrackEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PieceMarkStatus;

    fn status_event() -> SteelTrackEvent {
        SteelTrackEvent::PieceMarkStatusChanged {
            piece_mark_id: Uuid::new_v4(),
            mark: "B-101".to_string(),
            old_status: PieceMarkStatus::NotStarted,
            new_status: PieceMarkStatus::Fabricating,
            actor_id: Uuid::new_v4(),
            role: Role::Shop,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_emit_and_receive() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(status_event()).expect("emit should succeed");

        let received = rx.try_recv().expect("should receive event");
        assert_eq!(received.event_type(), "PieceMarkStatusChanged");
    }

    #[test]
    fn test_emit_lossy_without_subscribers() {
        let bus = EventBus::new(2);
        // No subscribers, and more events than capacity - neither may panic
        for _ in 0..10 {
            bus.emit_lossy(status_event());
        }
        assert_eq!(bus.capacity(), 2);
    }

    #[test]
    fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(status_event()).unwrap();

        assert_eq!(rx1.try_recv().unwrap().event_type(), "PieceMarkStatusChanged");
        assert_eq!(rx2.try_recv().unwrap().event_type(), "PieceMarkStatusChanged");
    }

    #[test]
    fn test_event_serialization_tagged() {
        let event = status_event();
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"PieceMarkStatusChanged\""));
        assert!(json.contains("\"old_status\":\"not_started\""));
        assert!(json.contains("\"new_status\":\"fabricating\""));

        let back: SteelTrackEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "PieceMarkStatusChanged");
    }

    #[test]
    fn test_item_outcome_discrepancy() {
        let clean = ItemOutcome {
            item_id: Uuid::new_v4(),
            piece_mark_id: Uuid::new_v4(),
            mark: "C-7".to_string(),
            expected_quantity: 5,
            received_quantity: 5,
            condition: ItemCondition::Good,
            location: FieldLocation::Yard,
            shortfall: 0,
        };
        assert!(!clean.is_discrepancy());

        let short = ItemOutcome {
            received_quantity: 3,
            shortfall: 2,
            ..clean.clone()
        };
        assert!(short.is_discrepancy());

        let damaged = ItemOutcome {
            condition: ItemCondition::Damaged,
            ..clean
        };
        assert!(damaged.is_discrepancy());
    }
}
