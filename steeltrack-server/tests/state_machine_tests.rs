//! Engine tests for the piece-mark status/location state machine
//!
//! Covers the lifecycle order, single-step rollback, the location rules
//! around shipped/installed, the total-weight invariant, role policy at the
//! engine boundary, optimistic concurrency, and the one-audit-entry-per-
//! successful-call property.

use sqlx::SqlitePool;
use steeltrack_common::auth::Actor;
use steeltrack_common::db::init_memory_database;
use steeltrack_common::db::models::PieceMark;
use steeltrack_common::domain::{FieldLocation, PieceMarkStatus, Role};
use steeltrack_common::events::EventBus;
use steeltrack_common::Error;
use steeltrack_server::engine::store::NewPieceMark;
use steeltrack_server::engine::transitions::{self, AttributePatch};
use uuid::Uuid;

async fn setup() -> (SqlitePool, EventBus) {
    let pool = init_memory_database().await.expect("memory db");
    (pool, EventBus::new(100))
}

fn actor(role: Role) -> Actor {
    Actor::new(Uuid::new_v4(), role)
}

async fn register_mark(
    pool: &SqlitePool,
    events: &EventBus,
    quantity: i64,
    weight_per_unit: f64,
) -> PieceMark {
    transitions::create_piece_mark(
        pool,
        events,
        &actor(Role::Admin),
        NewPieceMark {
            project_id: "job-42".to_string(),
            mark: format!("B-{}", Uuid::new_v4().simple()),
            quantity,
            weight_per_unit,
            material: Some("W12x26".to_string()),
            drawing_ref: Some("E-101".to_string()),
            sequence_no: Some(1),
        },
    )
    .await
    .expect("create piece mark")
}

/// Advance a mark to shipped through the full ladder
async fn ship_mark(pool: &SqlitePool, events: &EventBus, guid: &str) -> PieceMark {
    let admin = actor(Role::Admin);
    let mut mark = None;
    for _ in 0..3 {
        mark = Some(
            transitions::advance_status(pool, events, &admin, guid, None, None, None)
                .await
                .expect("advance"),
        );
    }
    mark.unwrap()
}

async fn audit_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM activity_log")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_total_weight_always_consistent() {
    let (pool, events) = setup().await;
    let mark = register_mark(&pool, &events, 10, 50.0).await;
    assert_eq!(mark.total_weight, 500.0);

    // Quantity change recomputes total weight
    let admin = actor(Role::Admin);
    let mark = transitions::update_attributes(
        &pool,
        &admin,
        &mark.guid,
        AttributePatch {
            quantity: Some(4),
            ..Default::default()
        },
        None,
    )
    .await
    .unwrap();
    assert_eq!(mark.total_weight, 200.0);

    // Weight-per-unit change too
    let mark = transitions::update_attributes(
        &pool,
        &admin,
        &mark.guid,
        AttributePatch {
            weight_per_unit: Some(12.5),
            ..Default::default()
        },
        None,
    )
    .await
    .unwrap();
    assert_eq!(mark.total_weight, 4.0 * 12.5);
}

#[tokio::test]
async fn test_shop_advances_through_fabrication() {
    let (pool, events) = setup().await;
    let mark = register_mark(&pool, &events, 10, 50.0).await;
    let shop = actor(Role::Shop);
    let mut rx = events.subscribe();

    let mark = transitions::advance_status(&pool, &events, &shop, &mark.guid, None, None, None)
        .await
        .unwrap();
    assert_eq!(mark.status().unwrap(), PieceMarkStatus::Fabricating);

    // One audit entry for the create, one for the advance
    assert_eq!(audit_count(&pool).await, 2);

    let event = rx.try_recv().expect("status change broadcast");
    assert_eq!(event.event_type(), "PieceMarkStatusChanged");
}

#[tokio::test]
async fn test_skip_forward_transition_rejected() {
    let (pool, events) = setup().await;
    let mark = register_mark(&pool, &events, 10, 50.0).await;
    let shop = actor(Role::Shop);

    transitions::advance_status(&pool, &events, &shop, &mark.guid, None, None, None)
        .await
        .unwrap();
    let entries_before = audit_count(&pool).await;

    // fabricating -> installed skips two steps
    let err = transitions::advance_status(
        &pool,
        &events,
        &shop,
        &mark.guid,
        Some(PieceMarkStatus::Installed),
        None,
        None,
    )
    .await
    .unwrap_err();
    match err {
        Error::InvalidTransition { from, to } => {
            assert_eq!(from, "fabricating");
            assert_eq!(to, "installed");
        }
        other => panic!("expected InvalidTransition, got {:?}", other),
    }

    // Rejected calls write nothing
    assert_eq!(audit_count(&pool).await, entries_before);
}

#[tokio::test]
async fn test_advance_beyond_installed_rejected() {
    let (pool, events) = setup().await;
    let mark = register_mark(&pool, &events, 2, 10.0).await;
    let admin = actor(Role::Admin);

    for _ in 0..4 {
        transitions::advance_status(&pool, &events, &admin, &mark.guid, None, None, None)
            .await
            .unwrap();
    }

    let err = transitions::advance_status(&pool, &events, &admin, &mark.guid, None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_shop_rolls_back_own_advance_only() {
    let (pool, events) = setup().await;
    let mark = register_mark(&pool, &events, 10, 50.0).await;
    let shop = actor(Role::Shop);

    transitions::advance_status(&pool, &events, &shop, &mark.guid, None, None, None)
        .await
        .unwrap();

    // Another shop actor cannot undo it
    let other_shop = actor(Role::Shop);
    let err =
        transitions::rollback_status(&pool, &events, &other_shop, &mark.guid, None, None, None)
            .await
            .unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }));

    // The original actor can
    let mark = transitions::rollback_status(&pool, &events, &shop, &mark.guid, None, None, None)
        .await
        .unwrap();
    assert_eq!(mark.status().unwrap(), PieceMarkStatus::NotStarted);
}

#[tokio::test]
async fn test_rollback_is_single_step_only() {
    let (pool, events) = setup().await;
    let mark = register_mark(&pool, &events, 10, 50.0).await;
    let admin = actor(Role::Admin);

    transitions::advance_status(&pool, &events, &admin, &mark.guid, None, None, None)
        .await
        .unwrap();
    transitions::advance_status(&pool, &events, &admin, &mark.guid, None, None, None)
        .await
        .unwrap();

    // completed -> not_started skips a step backward
    let err = transitions::rollback_status(
        &pool,
        &events,
        &admin,
        &mark.guid,
        Some(PieceMarkStatus::NotStarted),
        None,
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    let mark = transitions::rollback_status(&pool, &events, &admin, &mark.guid, None, None, None)
        .await
        .unwrap();
    assert_eq!(mark.status().unwrap(), PieceMarkStatus::Fabricating);
}

#[tokio::test]
async fn test_client_denied_with_named_rule() {
    let (pool, events) = setup().await;
    let mark = register_mark(&pool, &events, 10, 50.0).await;
    let entries_before = audit_count(&pool).await;

    let err = transitions::advance_status(
        &pool,
        &events,
        &actor(Role::Client),
        &mark.guid,
        None,
        None,
        None,
    )
    .await
    .unwrap_err();
    match err {
        Error::Forbidden { rule } => assert_eq!(rule, "client role is read-only"),
        other => panic!("expected Forbidden, got {:?}", other),
    }
    assert_eq!(audit_count(&pool).await, entries_before);
}

#[tokio::test]
async fn test_location_unordered_while_shipped_then_locked() {
    let (pool, events) = setup().await;
    let mark = register_mark(&pool, &events, 10, 50.0).await;
    let mark = ship_mark(&pool, &events, &mark.guid).await;
    assert_eq!(mark.status().unwrap(), PieceMarkStatus::Shipped);

    let field = actor(Role::Field);
    let mark = transitions::update_location(
        &pool,
        &events,
        &field,
        &mark.guid,
        FieldLocation::Yard,
        None,
        None,
    )
    .await
    .unwrap();
    assert_eq!(mark.location().unwrap(), Some(FieldLocation::Yard));

    // Location is unordered while shipped: installed and back to staging
    let mark = transitions::update_location(
        &pool,
        &events,
        &field,
        &mark.guid,
        FieldLocation::Installed,
        None,
        None,
    )
    .await
    .unwrap();
    assert_eq!(mark.location().unwrap(), Some(FieldLocation::Installed));

    let mark = transitions::update_location(
        &pool,
        &events,
        &field,
        &mark.guid,
        FieldLocation::Staging,
        None,
        None,
    )
    .await
    .unwrap();
    assert_eq!(mark.location().unwrap(), Some(FieldLocation::Staging));

    // Install the mark: location is forced and frozen
    let admin = actor(Role::Admin);
    let mark = transitions::advance_status(&pool, &events, &admin, &mark.guid, None, None, None)
        .await
        .unwrap();
    assert_eq!(mark.status().unwrap(), PieceMarkStatus::Installed);
    assert_eq!(mark.location().unwrap(), Some(FieldLocation::Installed));

    for role in [Role::Field, Role::Admin] {
        let err = transitions::update_location(
            &pool,
            &events,
            &actor(role),
            &mark.guid,
            FieldLocation::Yard,
            None,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::LocationLockedAfterInstall));
    }
}

#[tokio::test]
async fn test_location_requires_shipped_status() {
    let (pool, events) = setup().await;
    let mark = register_mark(&pool, &events, 10, 50.0).await;

    // Even an unrestricted role cannot place an unshipped mark in the field
    let err = transitions::update_location(
        &pool,
        &events,
        &actor(Role::Admin),
        &mark.guid,
        FieldLocation::Yard,
        None,
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_rollback_below_shipped_clears_location() {
    let (pool, events) = setup().await;
    let mark = register_mark(&pool, &events, 10, 50.0).await;
    let mark = ship_mark(&pool, &events, &mark.guid).await;
    assert!(mark.location.is_some());

    let admin = actor(Role::Admin);
    let mark = transitions::rollback_status(&pool, &events, &admin, &mark.guid, None, None, None)
        .await
        .unwrap();
    assert_eq!(mark.status().unwrap(), PieceMarkStatus::Completed);
    assert_eq!(mark.location, None);
}

#[tokio::test]
async fn test_stale_version_loses_with_concurrent_modification() {
    let (pool, events) = setup().await;
    let mark = register_mark(&pool, &events, 10, 50.0).await;
    let admin = actor(Role::Admin);

    // First caller read version 0 and wins
    transitions::advance_status(&pool, &events, &admin, &mark.guid, None, None, Some(mark.version))
        .await
        .unwrap();
    let entries_after_first = audit_count(&pool).await;

    // Second caller still holds version 0 and must lose, not merge
    let err = transitions::advance_status(
        &pool,
        &events,
        &admin,
        &mark.guid,
        None,
        None,
        Some(mark.version),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::ConcurrentModification));
    assert_eq!(audit_count(&pool).await, entries_after_first);

    // Retried against fresh state it goes through
    let fresh = transitions::advance_status(&pool, &events, &admin, &mark.guid, None, None, None)
        .await
        .unwrap();
    assert_eq!(fresh.status().unwrap(), PieceMarkStatus::Completed);
}

#[tokio::test]
async fn test_archived_mark_rejects_transitions() {
    let (pool, events) = setup().await;
    let mark = register_mark(&pool, &events, 10, 50.0).await;
    let admin = actor(Role::Admin);

    transitions::archive_piece_mark(&pool, &events, &admin, &mark.guid, None)
        .await
        .unwrap();

    let err = transitions::advance_status(&pool, &events, &admin, &mark.guid, None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    // Archived marks drop out of listings but keep their history
    let listed = steeltrack_server::engine::store::list_piece_marks(&pool, None, None, None)
        .await
        .unwrap();
    assert!(listed.iter().all(|m| m.guid != mark.guid));
    assert!(audit_count(&pool).await >= 2);
}
