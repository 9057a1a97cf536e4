//! Status machines shared by donations and pickup assignments
//!
//! Both lifecycles are closed transition tables. Every status write in the
//! models layer first checks the table and then updates the row conditionally
//! on the status it observed, so two concurrent writers cannot both win.
//!
//! # Example
//!
//! ```
//! use foodbridge_shared::lifecycle::StatusMachine;
//! use foodbridge_shared::models::donation::DonationStatus;
//!
//! assert!(DonationStatus::Available.ensure_transition(DonationStatus::Claimed).is_ok());
//! assert!(DonationStatus::Completed.ensure_transition(DonationStatus::Available).is_err());
//! ```

use std::fmt;
use thiserror::Error;

/// A status enum with a closed transition table
pub trait StatusMachine: Copy + PartialEq + fmt::Display {
    /// Entity name used in error messages ("donation", "pickup")
    const ENTITY: &'static str;

    /// Checks if transition to target status is valid
    fn can_transition_to(&self, target: Self) -> bool;

    /// Checks if status is terminal (no further transitions)
    fn is_terminal(&self) -> bool;

    /// Returns an error describing the refused move when the table forbids it
    fn ensure_transition(self, target: Self) -> Result<(), TransitionError> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(TransitionError::Illegal {
                entity: Self::ENTITY,
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }
}

/// Errors from guarded status writes
#[derive(Debug, Error)]
pub enum TransitionError {
    /// The row does not exist
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// The transition table forbids the move
    #[error("cannot move {entity} from {from} to {to}")]
    Illegal {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// The row changed status between read and conditional write
    #[error("{entity} was modified by another request")]
    Stale { entity: &'static str },

    /// The move is allowed but a precondition on the row is not met
    #[error("{0}")]
    Precondition(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl TransitionError {
    /// Returns true for outcomes that map to a conflict with current state
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            TransitionError::Illegal { .. }
                | TransitionError::Stale { .. }
                | TransitionError::Precondition(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::donation::DonationStatus;
    use crate::models::pickup::PickupStatus;

    #[test]
    fn test_ensure_transition_illegal_message() {
        let err = DonationStatus::Completed
            .ensure_transition(DonationStatus::Available)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot move donation from completed to available"
        );
        assert!(err.is_conflict());
    }

    #[test]
    fn test_ensure_transition_pickup() {
        assert!(PickupStatus::Assigned
            .ensure_transition(PickupStatus::Accepted)
            .is_ok());
        assert!(PickupStatus::Assigned
            .ensure_transition(PickupStatus::Delivered)
            .is_err());
    }

    #[test]
    fn test_not_found_is_not_conflict() {
        let err = TransitionError::NotFound { entity: "pickup" };
        assert!(!err.is_conflict());
        assert_eq!(err.to_string(), "pickup not found");
    }
}
