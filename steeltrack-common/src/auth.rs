//! Transition authorization policy
//!
//! # Architecture
//!
//! This module contains ONLY pure functions. No I/O, no database access, no
//! HTTP framework dependencies - the decision is computed entirely from the
//! actor and the proposed action's context, which the caller supplies.
//!
//! Every mutation in the system consults [`authorize`] before touching
//! state. Denial always yields [`Error::Forbidden`] naming the specific rule
//! that failed, never a generic error, so UIs and tests can assert on the
//! exact cause.
//!
//! Policy table:
//!
//! | Role            | status advance                         | status rollback        | location update          | delivery receive | crew management |
//! |-----------------|----------------------------------------|------------------------|--------------------------|------------------|-----------------|
//! | admin           | any                                    | any                    | any                      | yes              | yes             |
//! | project_manager | any                                    | any                    | yes                      | yes              | yes             |
//! | shop            | only from not_started/fabricating      | only own prior advance | no                       | no               | no              |
//! | field           | no                                     | no                     | only when status shipped | yes              | own crew only   |
//! | client          | no                                     | no                     | no                       | no               | no              |

use crate::domain::{PieceMarkStatus, Role};
use crate::{Error, Result};
use uuid::Uuid;

/// A verified (identity, role) pair supplied by the identity collaborator.
///
/// The core trusts this input and performs no credential verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub actor_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(actor_id: Uuid, role: Role) -> Self {
        Self { actor_id, role }
    }
}

/// A proposed action plus the state context the policy needs to decide.
///
/// The caller (engine) loads whatever context a rule requires - e.g. the
/// actor who performed the last status advance, for the shop rollback rule -
/// so this function stays side-effect free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Advance a piece mark's status one step forward; `from` is its current status
    AdvanceStatus { from: PieceMarkStatus },
    /// Roll a piece mark's status back one step; `last_advance_by` is the
    /// actor who wrote the most recent status advance, if any
    RollbackStatus {
        from: PieceMarkStatus,
        last_advance_by: Option<Uuid>,
    },
    /// Set a piece mark's field location; `status` is its current status
    UpdateLocation { status: PieceMarkStatus },
    /// Create, edit, or archive piece marks (project setup surface)
    ManagePieceMarks,
    /// Create deliveries, add items, dispatch and mark arrival
    ManageDeliveries,
    /// Reconcile a delivery's receipt, or reject a delivery
    ReceiveDelivery,
    /// Create a crew assignment or progress its status; `supervisor_id` is
    /// the crew's responsible actor, if one is recorded
    ManageCrew { supervisor_id: Option<Uuid> },
}

/// Decide whether `actor` may perform `action`. Deterministic and pure.
pub fn authorize(actor: &Actor, action: &Action) -> Result<()> {
    match (actor.role, action) {
        // Admin and project manager are unrestricted across the whole table.
        (Role::Admin | Role::ProjectManager, _) => Ok(()),

        (Role::Shop, Action::AdvanceStatus { from }) => {
            if matches!(
                from,
                PieceMarkStatus::NotStarted | PieceMarkStatus::Fabricating
            ) {
                Ok(())
            } else {
                deny("shop role may only advance status from not_started or fabricating")
            }
        }
        (Role::Shop, Action::RollbackStatus {
            from,
            last_advance_by,
        }) => {
            // Shop corrects only its own mistaken advances, and only within
            // the shop phase it is allowed to operate in.
            if !matches!(
                from,
                PieceMarkStatus::Fabricating | PieceMarkStatus::Completed
            ) {
                return deny("shop role may only roll back within the fabrication phase");
            }
            if *last_advance_by == Some(actor.actor_id) {
                Ok(())
            } else {
                deny("shop role may only roll back its own prior advance")
            }
        }
        (Role::Shop, Action::UpdateLocation { .. }) => {
            deny("shop role may not update field locations")
        }
        (Role::Shop, Action::ManagePieceMarks) => {
            deny("shop role may not manage piece mark records")
        }
        (Role::Shop, Action::ManageDeliveries) => deny("shop role may not manage deliveries"),
        (Role::Shop, Action::ReceiveDelivery) => deny("shop role may not receive deliveries"),
        (Role::Shop, Action::ManageCrew { .. }) => deny("shop role may not manage crews"),

        (Role::Field, Action::AdvanceStatus { .. }) => {
            deny("field role may not advance piece mark status")
        }
        (Role::Field, Action::RollbackStatus { .. }) => {
            deny("field role may not roll back piece mark status")
        }
        (Role::Field, Action::UpdateLocation { status }) => {
            if *status == PieceMarkStatus::Shipped {
                Ok(())
            } else {
                deny("field role may only update location while status is shipped")
            }
        }
        (Role::Field, Action::ManagePieceMarks) => {
            deny("field role may not manage piece mark records")
        }
        (Role::Field, Action::ManageDeliveries) => deny("field role may not manage deliveries"),
        (Role::Field, Action::ReceiveDelivery) => Ok(()),
        (Role::Field, Action::ManageCrew { supervisor_id }) => {
            if *supervisor_id == Some(actor.actor_id) {
                Ok(())
            } else {
                deny("field role may only manage its own crew")
            }
        }

        // Client is read-only across the board.
        (Role::Client, _) => deny("client role is read-only"),
    }
}

fn deny(rule: &str) -> Result<()> {
    Err(Error::Forbidden {
        rule: rule.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role) -> Actor {
        Actor::new(Uuid::new_v4(), role)
    }

    fn rule_of(err: Error) -> String {
        match err {
            Error::Forbidden { rule } => rule,
            other => panic!("expected Forbidden, got {:?}", other),
        }
    }

    #[test]
    fn test_admin_and_pm_unrestricted() {
        for role in [Role::Admin, Role::ProjectManager] {
            let a = actor(role);
            assert!(authorize(
                &a,
                &Action::AdvanceStatus {
                    from: PieceMarkStatus::Shipped
                }
            )
            .is_ok());
            assert!(authorize(
                &a,
                &Action::RollbackStatus {
                    from: PieceMarkStatus::Installed,
                    last_advance_by: None
                }
            )
            .is_ok());
            assert!(authorize(
                &a,
                &Action::UpdateLocation {
                    status: PieceMarkStatus::Shipped
                }
            )
            .is_ok());
            assert!(authorize(&a, &Action::ManagePieceMarks).is_ok());
            assert!(authorize(&a, &Action::ManageDeliveries).is_ok());
            assert!(authorize(&a, &Action::ReceiveDelivery).is_ok());
            assert!(authorize(&a, &Action::ManageCrew {
                supervisor_id: None
            })
            .is_ok());
        }
    }

    #[test]
    fn test_shop_advances_only_in_fabrication_phase() {
        let a = actor(Role::Shop);
        assert!(authorize(
            &a,
            &Action::AdvanceStatus {
                from: PieceMarkStatus::NotStarted
            }
        )
        .is_ok());
        assert!(authorize(
            &a,
            &Action::AdvanceStatus {
                from: PieceMarkStatus::Fabricating
            }
        )
        .is_ok());

        for from in [
            PieceMarkStatus::Completed,
            PieceMarkStatus::Shipped,
            PieceMarkStatus::Installed,
        ] {
            let err = authorize(&a, &Action::AdvanceStatus { from }).unwrap_err();
            assert!(rule_of(err).contains("not_started or fabricating"));
        }
    }

    #[test]
    fn test_shop_rollback_own_action_only() {
        let a = actor(Role::Shop);

        // Own prior advance: allowed
        assert!(authorize(
            &a,
            &Action::RollbackStatus {
                from: PieceMarkStatus::Fabricating,
                last_advance_by: Some(a.actor_id)
            }
        )
        .is_ok());

        // Someone else's advance: denied
        let err = authorize(
            &a,
            &Action::RollbackStatus {
                from: PieceMarkStatus::Fabricating,
                last_advance_by: Some(Uuid::new_v4()),
            },
        )
        .unwrap_err();
        assert!(rule_of(err).contains("own prior advance"));

        // No recorded advance at all: denied
        assert!(authorize(
            &a,
            &Action::RollbackStatus {
                from: PieceMarkStatus::Fabricating,
                last_advance_by: None
            }
        )
        .is_err());

        // Outside the fabrication phase: denied even for own action
        let err = authorize(
            &a,
            &Action::RollbackStatus {
                from: PieceMarkStatus::Shipped,
                last_advance_by: Some(a.actor_id),
            },
        )
        .unwrap_err();
        assert!(rule_of(err).contains("fabrication phase"));
    }

    #[test]
    fn test_shop_denied_everything_else() {
        let a = actor(Role::Shop);
        assert!(authorize(
            &a,
            &Action::UpdateLocation {
                status: PieceMarkStatus::Shipped
            }
        )
        .is_err());
        assert!(authorize(&a, &Action::ReceiveDelivery).is_err());
        assert!(authorize(&a, &Action::ManageDeliveries).is_err());
        assert!(authorize(&a, &Action::ManageCrew {
            supervisor_id: Some(a.actor_id)
        })
        .is_err());
    }

    #[test]
    fn test_field_location_only_while_shipped() {
        let a = actor(Role::Field);
        assert!(authorize(
            &a,
            &Action::UpdateLocation {
                status: PieceMarkStatus::Shipped
            }
        )
        .is_ok());

        for status in [
            PieceMarkStatus::NotStarted,
            PieceMarkStatus::Fabricating,
            PieceMarkStatus::Completed,
            PieceMarkStatus::Installed,
        ] {
            let err = authorize(&a, &Action::UpdateLocation { status }).unwrap_err();
            assert!(rule_of(err).contains("shipped"));
        }
    }

    #[test]
    fn test_field_no_status_changes() {
        let a = actor(Role::Field);
        assert!(authorize(
            &a,
            &Action::AdvanceStatus {
                from: PieceMarkStatus::Completed
            }
        )
        .is_err());
        assert!(authorize(
            &a,
            &Action::RollbackStatus {
                from: PieceMarkStatus::Shipped,
                last_advance_by: Some(a.actor_id)
            }
        )
        .is_err());
    }

    #[test]
    fn test_field_receives_deliveries_and_own_crew() {
        let a = actor(Role::Field);
        assert!(authorize(&a, &Action::ReceiveDelivery).is_ok());

        assert!(authorize(&a, &Action::ManageCrew {
            supervisor_id: Some(a.actor_id)
        })
        .is_ok());
        let err = authorize(
            &a,
            &Action::ManageCrew {
                supervisor_id: Some(Uuid::new_v4()),
            },
        )
        .unwrap_err();
        assert!(rule_of(err).contains("own crew"));
        assert!(authorize(&a, &Action::ManageCrew {
            supervisor_id: None
        })
        .is_err());
    }

    #[test]
    fn test_client_read_only() {
        let a = actor(Role::Client);
        let actions = [
            Action::AdvanceStatus {
                from: PieceMarkStatus::NotStarted,
            },
            Action::RollbackStatus {
                from: PieceMarkStatus::Fabricating,
                last_advance_by: Some(a.actor_id),
            },
            Action::UpdateLocation {
                status: PieceMarkStatus::Shipped,
            },
            Action::ManagePieceMarks,
            Action::ManageDeliveries,
            Action::ReceiveDelivery,
            Action::ManageCrew {
                supervisor_id: Some(a.actor_id),
            },
        ];
        for action in actions {
            let err = authorize(&a, &action).unwrap_err();
            assert_eq!(rule_of(err), "client role is read-only");
        }
    }
}
