/// Role and ownership rules
///
/// Admins pass every check. Everyone else is limited by role and by their
/// relationship to the record (donor of a donation, NGO holding the claim,
/// volunteer on the run).
///
/// | Role      | May                                                                 |
/// |-----------|---------------------------------------------------------------------|
/// | donor     | list food, edit/delete/cancel own listings, publish own verified listings, rate volunteers |
/// | ngo       | verify and claim listings, release own claims, assign volunteers, complete runs, leave feedback |
/// | volunteer | self-assign to claimed listings, drive own runs                     |
/// | admin     | everything                                                          |

use uuid::Uuid;

use super::middleware::AuthContext;
use crate::models::donation::{DonationStatus, FoodDonation};
use crate::models::pickup::{PickupAssignment, PickupStatus, RatingSide};
use crate::models::user::UserRole;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AuthzError {
    #[error("Insufficient permissions: requires {required}, has {actual}")]
    InsufficientRole { required: String, actual: UserRole },

    #[error("{0}")]
    Forbidden(String),
}

fn forbidden(message: &str) -> AuthzError {
    AuthzError::Forbidden(message.to_string())
}

/// Passes when the caller has one of `allowed`, or is an admin
pub fn require_role(auth: &AuthContext, allowed: &[UserRole]) -> Result<(), AuthzError> {
    if auth.is_admin() || allowed.contains(&auth.role) {
        return Ok(());
    }

    Err(AuthzError::InsufficientRole {
        required: allowed
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(" or "),
        actual: auth.role,
    })
}

pub fn require_admin(auth: &AuthContext) -> Result<(), AuthzError> {
    require_role(auth, &[UserRole::Admin])
}

pub fn require_owner_or_admin(auth: &AuthContext, owner_id: Uuid) -> Result<(), AuthzError> {
    if auth.owns_or_admin(owner_id) {
        Ok(())
    } else {
        Err(forbidden("Not authorized to access this resource"))
    }
}

/// Donor edits and deletes
pub fn can_edit_donation(auth: &AuthContext, donation: &FoodDonation) -> Result<(), AuthzError> {
    if auth.owns_or_admin(donation.donor_id) {
        Ok(())
    } else {
        Err(forbidden("Only the donor can modify this donation"))
    }
}

/// Non-forced moves through the status endpoint
///
/// Donors may cancel or publish their own listings. Everything else goes
/// through the dedicated verify, claim, release and pickup endpoints.
pub fn can_set_donation_status(
    auth: &AuthContext,
    donation: &FoodDonation,
    target: DonationStatus,
) -> Result<(), AuthzError> {
    if auth.is_admin() {
        return Ok(());
    }

    let is_donor = auth.user_id == donation.donor_id;
    match target {
        DonationStatus::Cancelled | DonationStatus::Available if is_donor => Ok(()),
        DonationStatus::Available if donation.claimed_by == Some(auth.user_id) => Ok(()),
        _ => Err(forbidden(
            "This status change is not available to you; use the dedicated endpoint",
        )),
    }
}

/// Only the claiming NGO (or an admin) may release a claim
pub fn can_release_claim(auth: &AuthContext, donation: &FoodDonation) -> Result<(), AuthzError> {
    match donation.claimed_by {
        Some(ngo_id) if auth.owns_or_admin(ngo_id) => Ok(()),
        _ => Err(forbidden("Only the claiming organization can release this donation")),
    }
}

/// Only the recipient leaves feedback
pub fn can_submit_feedback(auth: &AuthContext, donation: &FoodDonation) -> Result<(), AuthzError> {
    match donation.claimed_by {
        Some(ngo_id) if auth.user_id == ngo_id => Ok(()),
        _ => Err(forbidden("Only the receiving organization can leave feedback")),
    }
}

/// Who may put `volunteer_id` on a claimed donation
///
/// The claiming NGO may assign any volunteer; a volunteer may only assign
/// themselves.
pub fn can_assign_pickup(
    auth: &AuthContext,
    donation: &FoodDonation,
    volunteer_id: Uuid,
) -> Result<(), AuthzError> {
    match auth.role {
        UserRole::Admin => Ok(()),
        UserRole::Ngo if donation.claimed_by == Some(auth.user_id) => Ok(()),
        UserRole::Volunteer if volunteer_id == auth.user_id => Ok(()),
        UserRole::Ngo => Err(forbidden(
            "Only the organization holding the claim can assign volunteers",
        )),
        UserRole::Volunteer => Err(forbidden("Volunteers can only assign themselves")),
        UserRole::Donor => Err(AuthzError::InsufficientRole {
            required: "ngo or volunteer".to_string(),
            actual: auth.role,
        }),
    }
}

/// Participants and admins may read a run
pub fn can_view_pickup(auth: &AuthContext, pickup: &PickupAssignment) -> Result<(), AuthzError> {
    if auth.is_admin() || pickup.involves(auth.user_id) {
        Ok(())
    } else {
        Err(forbidden("Not a participant in this pickup"))
    }
}

/// Status changes on a run
///
/// The volunteer drives their own run up to delivery. The recipient may
/// complete it. Either the volunteer or the recipient may cancel.
pub fn can_set_pickup_status(
    auth: &AuthContext,
    pickup: &PickupAssignment,
    target: PickupStatus,
) -> Result<(), AuthzError> {
    if auth.is_admin() {
        return Ok(());
    }

    let is_volunteer = auth.user_id == pickup.volunteer_id;
    let is_recipient = auth.user_id == pickup.recipient_id;

    let allowed = match target {
        PickupStatus::Completed => is_recipient,
        PickupStatus::Cancelled => is_volunteer || is_recipient,
        _ => is_volunteer,
    };

    if allowed {
        Ok(())
    } else {
        Err(forbidden("Not allowed to change this pickup's status"))
    }
}

/// Location updates and pickup/delivery evidence come from the volunteer
pub fn can_track_pickup(auth: &AuthContext, pickup: &PickupAssignment) -> Result<(), AuthzError> {
    if auth.owns_or_admin(pickup.volunteer_id) {
        Ok(())
    } else {
        Err(forbidden("Only the assigned volunteer can update this pickup"))
    }
}

/// Which rating slot the caller fills
pub fn rating_side(auth: &AuthContext, pickup: &PickupAssignment) -> Result<RatingSide, AuthzError> {
    if auth.user_id == pickup.donor_id {
        Ok(RatingSide::Donor)
    } else if auth.user_id == pickup.recipient_id {
        Ok(RatingSide::Recipient)
    } else {
        Err(forbidden("Only the donor or the recipient can rate a pickup"))
    }
}
