//! Delivery lifecycle and field reconciliation
//!
//! Deliveries progress `pending -> in_transit -> delivered -> received`,
//! with `rejected` terminal from any non-terminal state. `received` is
//! reachable only through [`reconcile_delivery`], which is all-or-nothing
//! per delivery: either every item's outcome triple commits together with
//! the piece-mark updates and audit entries, or nothing does. An abandoned
//! in-flight reconciliation simply never commits and the delivery stays
//! `delivered`.

use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashMap;
use steeltrack_common::auth::{authorize, Action, Actor};
use steeltrack_common::db::models::{Delivery, DeliveryItem};
use steeltrack_common::domain::{DeliveryStatus, FieldLocation, ItemCondition, PieceMarkStatus};
use steeltrack_common::events::{EventBus, ItemOutcome, SteelTrackEvent};
use steeltrack_common::{Error, Result};
use tracing::{info, warn};

use super::audit::{
    self, piece_mark_snapshot, transition, NewEntry, SUBJECT_DELIVERY, SUBJECT_PIECE_MARK,
};
use super::store::{self, NewDelivery};

/// Create a delivery record in `pending`
pub async fn create_delivery(
    pool: &SqlitePool,
    events: &EventBus,
    actor: &Actor,
    new: NewDelivery,
) -> Result<Delivery> {
    authorize(actor, &Action::ManageDeliveries)?;

    let mut tx = pool.begin().await?;
    let delivery = store::insert_delivery(&mut tx, new).await?;
    audit::append(
        &mut tx,
        NewEntry {
            actor,
            subject_type: SUBJECT_DELIVERY,
            subject_id: &delivery.guid,
            transition: transition::DELIVERY_CREATED,
            before_state: None,
            after_state: Some(json!({ "status": delivery.status })),
            description: Some(format!("delivery {} created", delivery.delivery_number)),
            discrepancy: None,
        },
    )
    .await?;
    tx.commit().await?;

    events.emit_lossy(SteelTrackEvent::DeliveryCreated {
        delivery_id: uuid_of(&delivery.guid),
        project_id: delivery.project_id.clone(),
        delivery_number: delivery.delivery_number.clone(),
        timestamp: chrono::Utc::now(),
    });

    Ok(delivery)
}

/// Add a piece mark line to a pending delivery
///
/// Quantity accounting keeps a mark from being over-committed: a line for
/// the full quantity blocks any second open item, while a genuine split
/// (e.g. 6 + 4 of 10) across two open deliveries is accepted.
pub async fn add_delivery_item(
    pool: &SqlitePool,
    actor: &Actor,
    delivery_guid: &str,
    piece_mark_id: &str,
    expected_quantity: i64,
) -> Result<DeliveryItem> {
    authorize(actor, &Action::ManageDeliveries)?;

    if expected_quantity <= 0 {
        return Err(Error::InvalidInput(
            "expected_quantity must be positive".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;
    let delivery = store::fetch_delivery(&mut tx, delivery_guid).await?;
    if delivery.status()? != DeliveryStatus::Pending {
        return Err(Error::InvalidInput(format!(
            "items can only be added while delivery is pending (currently {})",
            delivery.status
        )));
    }

    let mark = store::fetch_active_piece_mark(&mut tx, piece_mark_id).await?;

    // Quantity already committed to deliveries: received so far, plus
    // expected on still-open items. A new line never commits more pieces
    // than the mark has.
    let received = store::reconciled_quantity(&mut tx, &mark.guid, "").await?;
    let open_expected = store::open_expected_quantity(&mut tx, &mark.guid).await?;
    if received + open_expected + expected_quantity > mark.quantity {
        return Err(Error::InvalidInput(format!(
            "piece mark {}: {} received and {} expected on open deliveries; cannot add {} more (quantity {})",
            mark.mark, received, open_expected, expected_quantity, mark.quantity
        )));
    }

    let item =
        store::insert_delivery_item(&mut tx, &delivery.guid, &mark.guid, expected_quantity).await?;
    audit::append(
        &mut tx,
        NewEntry {
            actor,
            subject_type: SUBJECT_DELIVERY,
            subject_id: &delivery.guid,
            transition: transition::DELIVERY_ITEM_ADDED,
            before_state: None,
            after_state: Some(json!({
                "item_id": item.guid,
                "piece_mark": mark.mark,
                "expected_quantity": expected_quantity,
            })),
            description: Some(format!(
                "piece mark {} added to delivery {}",
                mark.mark, delivery.delivery_number
            )),
            discrepancy: None,
        },
    )
    .await?;
    tx.commit().await?;

    Ok(item)
}

/// Move a delivery along its lifecycle: dispatch, arrival, or rejection
///
/// `received` is not reachable here - only a complete reconciliation
/// produces it.
pub async fn set_delivery_status(
    pool: &SqlitePool,
    events: &EventBus,
    actor: &Actor,
    delivery_guid: &str,
    to: DeliveryStatus,
    note: Option<String>,
) -> Result<Delivery> {
    let mut tx = pool.begin().await?;
    let mut delivery = store::fetch_delivery(&mut tx, delivery_guid).await?;
    let from = delivery.status()?;

    let valid = match (from, to) {
        (DeliveryStatus::Pending, DeliveryStatus::InTransit) => true,
        (DeliveryStatus::InTransit, DeliveryStatus::Delivered) => true,
        (f, DeliveryStatus::Rejected) if !f.is_terminal() => true,
        _ => false,
    };
    if !valid {
        return Err(Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    // Rejection is a receiving-side decision; dispatch and arrival belong to
    // delivery management
    match to {
        DeliveryStatus::Rejected => authorize(actor, &Action::ReceiveDelivery)?,
        _ => authorize(actor, &Action::ManageDeliveries)?,
    }

    let arrived_at = (to == DeliveryStatus::Delivered).then(chrono::Utc::now);
    store::update_delivery_status(&mut tx, &mut delivery, to, arrived_at).await?;
    audit::append(
        &mut tx,
        NewEntry {
            actor,
            subject_type: SUBJECT_DELIVERY,
            subject_id: &delivery.guid,
            transition: transition::DELIVERY_STATUS,
            before_state: Some(json!({ "status": from.as_str() })),
            after_state: Some(json!({ "status": to.as_str() })),
            description: note,
            discrepancy: None,
        },
    )
    .await?;
    tx.commit().await?;

    info!(delivery = %delivery.delivery_number, from = %from, to = %to, "delivery status changed");
    events.emit_lossy(SteelTrackEvent::DeliveryStatusChanged {
        delivery_id: uuid_of(&delivery.guid),
        delivery_number: delivery.delivery_number.clone(),
        old_status: from,
        new_status: to,
        actor_id: actor.actor_id,
        timestamp: chrono::Utc::now(),
    });

    Ok(delivery)
}

/// One item's receipt-time actuals, submitted by the receiving crew
#[derive(Debug, Clone)]
pub struct ItemSubmission {
    pub item_id: String,
    pub received_quantity: i64,
    pub condition: ItemCondition,
    pub location: FieldLocation,
}

/// Reconcile a delivered delivery: record every item's outcome triple,
/// update the affected piece marks, and move the delivery to `received`
///
/// All-or-nothing: a submission that misses any item, or that would push a
/// piece mark's cumulative receipts over its quantity, fails the whole
/// transaction and leaves every row untouched.
pub async fn reconcile_delivery(
    pool: &SqlitePool,
    events: &EventBus,
    actor: &Actor,
    delivery_guid: &str,
    submissions: Vec<ItemSubmission>,
    note: Option<String>,
) -> Result<Delivery> {
    authorize(actor, &Action::ReceiveDelivery)?;

    let mut tx = pool.begin().await?;
    let mut delivery = store::fetch_delivery(&mut tx, delivery_guid).await?;
    let from = delivery.status()?;
    if from != DeliveryStatus::Delivered {
        return Err(Error::InvalidTransition {
            from: from.to_string(),
            to: DeliveryStatus::Received.to_string(),
        });
    }

    let items = store::fetch_delivery_items(&mut tx, &delivery.guid).await?;

    // Index submissions by item, rejecting duplicates and strays
    let mut by_item: HashMap<&str, &ItemSubmission> = HashMap::new();
    for submission in &submissions {
        if submission.received_quantity < 0 {
            return Err(Error::InvalidInput(
                "received_quantity must be non-negative".to_string(),
            ));
        }
        if by_item
            .insert(submission.item_id.as_str(), submission)
            .is_some()
        {
            return Err(Error::InvalidInput(format!(
                "duplicate submission for delivery item {}",
                submission.item_id
            )));
        }
    }
    for submission in &submissions {
        if !items.iter().any(|i| i.guid == submission.item_id) {
            return Err(Error::NotFound(format!(
                "delivery item {}",
                submission.item_id
            )));
        }
    }

    // Every item needs an outcome before the delivery can reach received
    let missing = items
        .iter()
        .filter(|i| !by_item.contains_key(i.guid.as_str()))
        .count();
    if missing > 0 {
        return Err(Error::IncompleteReconciliation { missing });
    }

    let mut outcomes = Vec::with_capacity(items.len());
    for mut item in items {
        let submission = by_item[item.guid.as_str()];
        let mut mark = store::fetch_active_piece_mark(&mut tx, &item.piece_mark_id).await?;

        // Cumulative accounting across all of the mark's deliveries; excess
        // is rejected, never truncated
        let prior = store::reconciled_quantity(&mut tx, &mark.guid, &item.guid).await?;
        let cumulative = prior + submission.received_quantity;
        if cumulative > mark.quantity {
            return Err(Error::OverReceipt {
                mark: mark.mark.clone(),
                expected: mark.quantity,
                cumulative,
            });
        }

        store::record_item_outcome(
            &mut tx,
            &mut item,
            submission.received_quantity,
            submission.condition.as_str(),
            submission.location.as_str(),
        )
        .await?;

        let before = piece_mark_snapshot(&mark);
        let status = mark.status()?;

        // The pieces that did arrive are on-site: the mark ships even on a
        // short or damaged receipt, and the discrepancy is surfaced below
        if status < PieceMarkStatus::Shipped {
            mark.status = PieceMarkStatus::Shipped.as_str().to_string();
        }

        // The mark takes the submitted zone on its last necessary
        // reconciling event: either cumulative receipts reached its full
        // quantity, or no other open item still awaits an outcome
        if status != PieceMarkStatus::Installed {
            let remaining = store::unreconciled_open_items(&mut tx, &mark.guid).await?;
            if cumulative >= mark.quantity || remaining == 0 {
                mark.location = Some(submission.location.as_str().to_string());
            }
        }

        store::persist_piece_mark(&mut tx, &mut mark).await?;

        let shortfall = (item.expected_quantity - submission.received_quantity).max(0);
        let outcome = ItemOutcome {
            item_id: uuid_of(&item.guid),
            piece_mark_id: uuid_of(&mark.guid),
            mark: mark.mark.clone(),
            expected_quantity: item.expected_quantity,
            received_quantity: submission.received_quantity,
            condition: submission.condition,
            location: submission.location,
            shortfall,
        };

        let discrepancy = outcome.is_discrepancy().then(|| {
            json!({
                "expected": item.expected_quantity,
                "received": submission.received_quantity,
                "shortfall": shortfall,
                "condition": submission.condition.as_str(),
            })
        });
        if let Some(detail) = &discrepancy {
            warn!(mark = %mark.mark, %detail, "reconciliation discrepancy");
        }

        audit::append(
            &mut tx,
            NewEntry {
                actor,
                subject_type: SUBJECT_PIECE_MARK,
                subject_id: &mark.guid,
                transition: transition::DELIVERY_RECEIPT,
                before_state: Some(before),
                after_state: Some(piece_mark_snapshot(&mark)),
                description: Some(format!(
                    "received {} of {} against delivery {}",
                    submission.received_quantity,
                    item.expected_quantity,
                    delivery.delivery_number
                )),
                discrepancy,
            },
        )
        .await?;

        outcomes.push(outcome);
    }

    store::update_delivery_status(&mut tx, &mut delivery, DeliveryStatus::Received, None).await?;
    audit::append(
        &mut tx,
        NewEntry {
            actor,
            subject_type: SUBJECT_DELIVERY,
            subject_id: &delivery.guid,
            transition: transition::DELIVERY_RECEIVED,
            before_state: Some(json!({ "status": DeliveryStatus::Delivered.as_str() })),
            after_state: Some(json!({ "status": DeliveryStatus::Received.as_str() })),
            description: note,
            discrepancy: None,
        },
    )
    .await?;
    tx.commit().await?;

    let discrepancy_count = outcomes.iter().filter(|o| o.is_discrepancy()).count();
    info!(
        delivery = %delivery.delivery_number,
        items = outcomes.len(),
        discrepancies = discrepancy_count,
        "delivery reconciled"
    );
    events.emit_lossy(SteelTrackEvent::DeliveryReconciled {
        delivery_id: uuid_of(&delivery.guid),
        delivery_number: delivery.delivery_number.clone(),
        outcomes,
        discrepancy_count,
        actor_id: actor.actor_id,
        timestamp: chrono::Utc::now(),
    });

    Ok(delivery)
}

fn uuid_of(guid: &str) -> uuid::Uuid {
    uuid::Uuid::parse_str(guid).unwrap_or_default()
}
