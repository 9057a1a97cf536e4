//! Analytics and impact reporting
//!
//! Read-only aggregates over donations, pickups and users: the admin
//! overview, per-user impact, and the public platform totals.

use serde::Serialize;
use sqlx::PgPool;

use crate::models::donation::{
    DonationFilter, DonationStatus, FoodDonation, QuantityTotal, StatusCount,
};
use crate::models::pickup::{
    PickupAssignment, PickupFilter, PickupStatus, PickupStatusCount, VolunteerStats,
};
use crate::models::user::{RoleCount, User, UserFilter, UserRole};

/// Admin dashboard figures
#[derive(Debug, Clone, Serialize)]
pub struct PlatformOverview {
    pub total_users: i64,
    pub users_by_role: Vec<RoleCount>,
    pub unverified_ngos: i64,
    pub total_donations: i64,
    pub donations_by_status: Vec<StatusCount>,
    pub pickups_by_status: Vec<PickupStatusCount>,

    /// Quantity per unit across completed donations
    pub completed_quantities: Vec<QuantityTotal>,
}

/// Impact of a single account, shaped by its role
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum UserImpact {
    Donor {
        donations_listed: i64,
        donations_completed: i64,
        donations_by_status: Vec<StatusCount>,
        quantities_donated: Vec<QuantityTotal>,
    },
    Ngo {
        donations_claimed: i64,
        donations_received: i64,
        quantities_received: Vec<QuantityTotal>,
    },
    Volunteer {
        #[serde(flatten)]
        stats: VolunteerStats,
    },
    Admin {
        #[serde(flatten)]
        platform: PlatformImpact,
    },
}

/// Public totals shown without authentication
#[derive(Debug, Clone, Serialize)]
pub struct PlatformImpact {
    pub completed_donations: i64,
    pub completed_pickups: i64,
    pub quantities_rescued: Vec<QuantityTotal>,
    pub active_donors: i64,
    pub active_volunteers: i64,
    pub partner_ngos: i64,
}

fn completed_by(filter: DonationFilter) -> DonationFilter {
    DonationFilter {
        status: Some(DonationStatus::Completed),
        ..filter
    }
}

/// Builds the admin overview
pub async fn overview(pool: &PgPool) -> Result<PlatformOverview, sqlx::Error> {
    let all = DonationFilter::default();

    let total_users = User::count(pool, &UserFilter::default()).await?;
    let users_by_role = User::count_by_role(pool).await?;
    let unverified_ngos = User::count(
        pool,
        &UserFilter {
            role: Some(UserRole::Ngo),
            is_verified: Some(false),
            is_active: Some(true),
        },
    )
    .await?;
    let total_donations = FoodDonation::count(pool, &all).await?;
    let donations_by_status = FoodDonation::count_by_status(pool, &all).await?;
    let pickups_by_status =
        PickupAssignment::count_by_status(pool, &PickupFilter::default()).await?;
    let completed_quantities = FoodDonation::quantity_totals(pool, &completed_by(all)).await?;

    Ok(PlatformOverview {
        total_users,
        users_by_role,
        unverified_ngos,
        total_donations,
        donations_by_status,
        pickups_by_status,
        completed_quantities,
    })
}

/// Builds the impact report for `user` according to their role
pub async fn user_impact(pool: &PgPool, user: &User) -> Result<UserImpact, sqlx::Error> {
    match user.role {
        UserRole::Donor => {
            let mine = DonationFilter {
                donor_id: Some(user.id),
                ..Default::default()
            };
            let donations_listed = FoodDonation::count(pool, &mine).await?;
            let donations_completed = FoodDonation::count(pool, &completed_by(mine.clone())).await?;
            let donations_by_status = FoodDonation::count_by_status(pool, &mine).await?;
            let quantities_donated =
                FoodDonation::quantity_totals(pool, &completed_by(mine)).await?;

            Ok(UserImpact::Donor {
                donations_listed,
                donations_completed,
                donations_by_status,
                quantities_donated,
            })
        }
        UserRole::Ngo => {
            let claimed = DonationFilter {
                claimed_by: Some(user.id),
                ..Default::default()
            };
            let donations_claimed = FoodDonation::count(pool, &claimed).await?;
            let donations_received =
                FoodDonation::count(pool, &completed_by(claimed.clone())).await?;
            let quantities_received =
                FoodDonation::quantity_totals(pool, &completed_by(claimed)).await?;

            Ok(UserImpact::Ngo {
                donations_claimed,
                donations_received,
                quantities_received,
            })
        }
        UserRole::Volunteer => {
            let stats = PickupAssignment::volunteer_stats(pool, user.id).await?;
            Ok(UserImpact::Volunteer { stats })
        }
        UserRole::Admin => Ok(UserImpact::Admin {
            platform: platform_impact(pool).await?,
        }),
    }
}

/// Builds the public platform totals
pub async fn platform_impact(pool: &PgPool) -> Result<PlatformImpact, sqlx::Error> {
    let completed = completed_by(DonationFilter::default());

    let completed_donations = FoodDonation::count(pool, &completed).await?;
    let completed_pickups = PickupAssignment::count(
        pool,
        &PickupFilter {
            status: Some(PickupStatus::Completed),
            ..Default::default()
        },
    )
    .await?;
    let quantities_rescued = FoodDonation::quantity_totals(pool, &completed).await?;

    let active = |role| UserFilter {
        role: Some(role),
        is_verified: None,
        is_active: Some(true),
    };
    let active_donors = User::count(pool, &active(UserRole::Donor)).await?;
    let active_volunteers = User::count(pool, &active(UserRole::Volunteer)).await?;
    let partner_ngos = User::count(
        pool,
        &UserFilter {
            is_verified: Some(true),
            ..active(UserRole::Ngo)
        },
    )
    .await?;

    Ok(PlatformImpact {
        completed_donations,
        completed_pickups,
        quantities_rescued,
        active_donors,
        active_volunteers,
        partner_ngos,
    })
}
