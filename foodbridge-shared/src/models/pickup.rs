/// Pickup assignment model
///
/// An assignment links one volunteer to one claimed donation and tracks the
/// trip from acceptance to completion. Status changes that have a donation
/// counterpart move both rows in a single transaction:
///
/// | Pickup becomes | Donation moves           |
/// |----------------|--------------------------|
/// | (created)      | `claimed -> assigned`    |
/// | `picked_up`    | `assigned -> in_transit` |
/// | `delivered`    | `in_transit -> delivered`|
/// | `completed`    | `delivered -> completed` |
/// | `cancelled`    | `assigned -> claimed`    |
///
/// A partial unique index keeps at most one live assignment per donation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::lifecycle::{StatusMachine, TransitionError};
use crate::models::donation::{DonationStatus, FoodDonation};

const PICKUP_COLUMNS: &str = "id, donation_id, donor_id, recipient_id, volunteer_id, \
     assigned_by, status, scheduled_pickup_at, scheduled_delivery_at, accepted_at, started_at, \
     picked_up_at, delivered_at, completed_at, cancelled_at, cancellation_reason, route, \
     pickup_verification, delivery_verification, donor_rating, recipient_rating, notes, \
     created_at, updated_at";

/// Statuses during which the volunteer is on the road
const TRACKABLE: &str = "('accepted', 'in_transit', 'picked_up', 'delivering')";

/// Name of the index enforcing one live assignment per donation
pub const ACTIVE_DONATION_CONSTRAINT: &str = "pickup_assignments_active_donation_key";

/// Pickup assignment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "pickup_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PickupStatus {
    /// Created by an NGO, admin, or the volunteer
    Assigned,

    /// Volunteer confirmed they will do the run
    Accepted,

    /// Volunteer is heading to the donor
    InTransit,

    /// Food collected and verified at the donor
    PickedUp,

    /// Heading to the recipient
    Delivering,

    /// Handed over and verified at the recipient
    Delivered,

    /// Closed by the recipient
    Completed,

    Cancelled,
}

impl PickupStatus {
    pub const ALL: [PickupStatus; 8] = [
        PickupStatus::Assigned,
        PickupStatus::Accepted,
        PickupStatus::InTransit,
        PickupStatus::PickedUp,
        PickupStatus::Delivering,
        PickupStatus::Delivered,
        PickupStatus::Completed,
        PickupStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PickupStatus::Assigned => "assigned",
            PickupStatus::Accepted => "accepted",
            PickupStatus::InTransit => "in_transit",
            PickupStatus::PickedUp => "picked_up",
            PickupStatus::Delivering => "delivering",
            PickupStatus::Delivered => "delivered",
            PickupStatus::Completed => "completed",
            PickupStatus::Cancelled => "cancelled",
        }
    }

    /// Checks if the volunteer is currently on the road
    pub fn is_trackable(&self) -> bool {
        matches!(
            self,
            PickupStatus::Accepted
                | PickupStatus::InTransit
                | PickupStatus::PickedUp
                | PickupStatus::Delivering
        )
    }

    /// Donation move that accompanies entering this status, as `(from, to)`
    pub fn donation_effect(&self) -> Option<(DonationStatus, DonationStatus)> {
        match self {
            PickupStatus::PickedUp => Some((DonationStatus::Assigned, DonationStatus::InTransit)),
            PickupStatus::Delivered => {
                Some((DonationStatus::InTransit, DonationStatus::Delivered))
            }
            PickupStatus::Completed => {
                Some((DonationStatus::Delivered, DonationStatus::Completed))
            }
            PickupStatus::Cancelled => Some((DonationStatus::Assigned, DonationStatus::Claimed)),
            _ => None,
        }
    }

    /// Timestamp column stamped when entering this status
    fn timestamp_column(&self) -> Option<&'static str> {
        match self {
            PickupStatus::Accepted => Some("accepted_at"),
            PickupStatus::InTransit => Some("started_at"),
            PickupStatus::PickedUp => Some("picked_up_at"),
            PickupStatus::Delivered => Some("delivered_at"),
            PickupStatus::Completed => Some("completed_at"),
            PickupStatus::Cancelled => Some("cancelled_at"),
            PickupStatus::Assigned | PickupStatus::Delivering => None,
        }
    }
}

impl StatusMachine for PickupStatus {
    const ENTITY: &'static str = "pickup";

    fn can_transition_to(&self, target: PickupStatus) -> bool {
        use PickupStatus::*;

        match (self, target) {
            (Assigned, Accepted | Cancelled) => true,
            (Accepted, InTransit | Cancelled) => true,
            (InTransit, PickedUp | Cancelled) => true,
            // Once the food is on board the run can only finish
            (PickedUp, Delivering) => true,
            (Delivering, Delivered) => true,
            (Delivered, Completed) => true,
            _ => false,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, PickupStatus::Completed | PickupStatus::Cancelled)
    }
}

impl fmt::Display for PickupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PickupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PickupStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown pickup status: {}", s))
    }
}

/// A point recorded along the route
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Planned and tracked route for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub pickup: GeoPoint,
    pub delivery: GeoPoint,
    #[serde(default)]
    pub current_location: Option<GeoPoint>,
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,

    /// Straight-line distance between pickup and delivery
    pub distance_km: f64,
}

impl Route {
    pub fn new(pickup: GeoPoint, delivery: GeoPoint) -> Self {
        Self {
            pickup,
            delivery,
            current_location: None,
            waypoints: Vec::new(),
            distance_km: pickup.distance_km(&delivery),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemCondition {
    Excellent,
    Good,
    Fair,
    Poor,
}

/// Evidence captured at pickup or delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub photo_url: Option<String>,
    pub signature: Option<String>,
    pub condition: ItemCondition,
    pub notes: Option<String>,
    pub verified_at: DateTime<Utc>,
}

/// A volunteer rating from one side of the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    /// 1 to 5
    pub score: i16,
    pub comment: Option<String>,
    pub rated_at: DateTime<Utc>,
}

/// Which party a rating comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingSide {
    Donor,
    Recipient,
}

impl RatingSide {
    fn column(&self) -> &'static str {
        match self {
            RatingSide::Donor => "donor_rating",
            RatingSide::Recipient => "recipient_rating",
        }
    }
}

/// Pickup assignment row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PickupAssignment {
    pub id: Uuid,
    pub donation_id: Uuid,

    /// Copied from the donation at assignment time
    pub donor_id: Uuid,

    /// The NGO holding the claim
    pub recipient_id: Uuid,
    pub volunteer_id: Uuid,

    /// Who created the assignment (NGO, admin, or the volunteer)
    pub assigned_by: Option<Uuid>,

    pub status: PickupStatus,
    pub scheduled_pickup_at: DateTime<Utc>,
    pub scheduled_delivery_at: Option<DateTime<Utc>>,

    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,

    pub route: Json<Route>,
    pub pickup_verification: Option<Json<Verification>>,
    pub delivery_verification: Option<Json<Verification>>,
    pub donor_rating: Option<Json<Rating>>,
    pub recipient_rating: Option<Json<Rating>>,

    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PickupAssignment {
    /// Checks if `user_id` takes part in this run
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.volunteer_id == user_id || self.donor_id == user_id || self.recipient_id == user_id
    }

    pub fn rating(&self, side: RatingSide) -> Option<&Rating> {
        match side {
            RatingSide::Donor => self.donor_rating.as_deref(),
            RatingSide::Recipient => self.recipient_rating.as_deref(),
        }
    }
}

/// Input for assigning a volunteer
#[derive(Debug, Clone)]
pub struct CreatePickup {
    pub donation_id: Uuid,
    pub volunteer_id: Uuid,
    pub assigned_by: Uuid,
    pub scheduled_pickup_at: DateTime<Utc>,
    pub scheduled_delivery_at: Option<DateTime<Utc>>,

    /// Where the food goes; usually the recipient's address point
    pub delivery_location: GeoPoint,
    pub notes: Option<String>,
}

/// Side data written together with a status change
#[derive(Debug, Clone, Default)]
pub struct TransitionDetails {
    pub cancellation_reason: Option<String>,
    pub pickup_verification: Option<Verification>,
    pub delivery_verification: Option<Verification>,
    pub rating: Option<(RatingSide, Rating)>,
}

/// Filters for listing assignments
#[derive(Debug, Clone, Default)]
pub struct PickupFilter {
    pub volunteer_id: Option<Uuid>,
    pub donor_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,
    pub status: Option<PickupStatus>,
}

impl PickupFilter {
    fn push_where(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(" WHERE TRUE");
        if let Some(volunteer_id) = self.volunteer_id {
            builder.push(" AND volunteer_id = ").push_bind(volunteer_id);
        }
        if let Some(donor_id) = self.donor_id {
            builder.push(" AND donor_id = ").push_bind(donor_id);
        }
        if let Some(recipient_id) = self.recipient_id {
            builder.push(" AND recipient_id = ").push_bind(recipient_id);
        }
        if let Some(status) = self.status {
            builder.push(" AND status = ").push_bind(status);
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PickupStatusCount {
    pub status: PickupStatus,
    pub count: i64,
}

/// Aggregate performance for one volunteer
#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct VolunteerStats {
    pub completed: i64,
    pub active: i64,
    pub cancelled: i64,

    /// Average of all donor and recipient rating scores
    pub average_rating: Option<f64>,
    pub ratings: i64,
    pub distance_km: f64,
}

impl PickupAssignment {
    /// Assigns a volunteer to a claimed donation
    ///
    /// Locks the donation, checks it is `claimed`, inserts the assignment and
    /// moves the donation to `assigned` in one transaction. The recipient is
    /// the NGO holding the claim.
    pub async fn create(pool: &PgPool, data: CreatePickup) -> Result<Self, TransitionError> {
        let mut tx = pool.begin().await?;

        let donation = FoodDonation::find_by_id_for_update(&mut *tx, data.donation_id)
            .await?
            .ok_or(TransitionError::NotFound {
                entity: DonationStatus::ENTITY,
            })?;
        donation
            .status
            .ensure_transition(DonationStatus::Assigned)?;
        let recipient_id = donation.claimed_by.ok_or_else(|| {
            TransitionError::Precondition("donation has no claiming organization".to_string())
        })?;

        let route = Route::new(donation.location(), data.delivery_location);

        let query = format!(
            r#"
            INSERT INTO pickup_assignments (
                donation_id, donor_id, recipient_id, volunteer_id, assigned_by,
                scheduled_pickup_at, scheduled_delivery_at, route, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            PICKUP_COLUMNS
        );

        let pickup = sqlx::query_as::<_, PickupAssignment>(&query)
            .bind(donation.id)
            .bind(donation.donor_id)
            .bind(recipient_id)
            .bind(data.volunteer_id)
            .bind(data.assigned_by)
            .bind(data.scheduled_pickup_at)
            .bind(data.scheduled_delivery_at)
            .bind(Json(route))
            .bind(data.notes)
            .fetch_one(&mut *tx)
            .await?;

        FoodDonation::transition_from(
            &mut *tx,
            donation.id,
            DonationStatus::Claimed,
            DonationStatus::Assigned,
        )
        .await?
        .ok_or(TransitionError::Stale {
            entity: DonationStatus::ENTITY,
        })?;

        tx.commit().await?;

        tracing::info!(
            pickup_id = %pickup.id,
            donation_id = %pickup.donation_id,
            volunteer_id = %pickup.volunteer_id,
            "Volunteer assigned"
        );

        Ok(pickup)
    }

    /// Finds an assignment by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {} FROM pickup_assignments WHERE id = $1",
            PICKUP_COLUMNS
        );

        let pickup = sqlx::query_as::<_, PickupAssignment>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(pickup)
    }

    /// The live (non-terminal) assignment for a donation, if any
    pub async fn find_active_by_donation(
        pool: &PgPool,
        donation_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {}
            FROM pickup_assignments
            WHERE donation_id = $1 AND status NOT IN ('completed', 'cancelled')
            "#,
            PICKUP_COLUMNS
        );

        let pickup = sqlx::query_as::<_, PickupAssignment>(&query)
            .bind(donation_id)
            .fetch_optional(pool)
            .await?;

        Ok(pickup)
    }

    /// Lists assignments matching `filter`, soonest scheduled first
    pub async fn list(
        pool: &PgPool,
        filter: &PickupFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
        builder.push(PICKUP_COLUMNS).push(" FROM pickup_assignments");
        filter.push_where(&mut builder);
        builder
            .push(" ORDER BY scheduled_pickup_at ASC, created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let pickups = builder
            .build_query_as::<PickupAssignment>()
            .fetch_all(pool)
            .await?;

        Ok(pickups)
    }

    pub async fn count(pool: &PgPool, filter: &PickupFilter) -> Result<i64, sqlx::Error> {
        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM pickup_assignments");
        filter.push_where(&mut builder);

        let (count,): (i64,) = builder.build_query_as().fetch_one(pool).await?;

        Ok(count)
    }

    /// Guarded status change with no side data
    pub async fn transition(
        pool: &PgPool,
        id: Uuid,
        target: PickupStatus,
        cancellation_reason: Option<String>,
    ) -> Result<Self, TransitionError> {
        let details = TransitionDetails {
            cancellation_reason,
            ..Default::default()
        };
        Self::apply_transition(pool, id, target, details).await
    }

    /// `in_transit -> picked_up` with the pickup evidence
    pub async fn verify_pickup(
        pool: &PgPool,
        id: Uuid,
        verification: Verification,
    ) -> Result<Self, TransitionError> {
        let details = TransitionDetails {
            pickup_verification: Some(verification),
            ..Default::default()
        };
        Self::apply_transition(pool, id, PickupStatus::PickedUp, details).await
    }

    /// `delivering -> delivered` with the handover evidence
    pub async fn verify_delivery(
        pool: &PgPool,
        id: Uuid,
        verification: Verification,
    ) -> Result<Self, TransitionError> {
        let details = TransitionDetails {
            delivery_verification: Some(verification),
            ..Default::default()
        };
        Self::apply_transition(pool, id, PickupStatus::Delivered, details).await
    }

    /// `delivered -> completed`, optionally recording the caller's rating
    pub async fn complete(
        pool: &PgPool,
        id: Uuid,
        rating: Option<(RatingSide, Rating)>,
    ) -> Result<Self, TransitionError> {
        let details = TransitionDetails {
            rating,
            ..Default::default()
        };
        Self::apply_transition(pool, id, PickupStatus::Completed, details).await
    }

    /// Locks the assignment, checks the table, writes the new status with its
    /// side data, and applies the coupled donation move, all in one transaction.
    async fn apply_transition(
        pool: &PgPool,
        id: Uuid,
        target: PickupStatus,
        details: TransitionDetails,
    ) -> Result<Self, TransitionError> {
        let mut tx = pool.begin().await?;

        let lock_query = format!(
            "SELECT {} FROM pickup_assignments WHERE id = $1 FOR UPDATE",
            PICKUP_COLUMNS
        );
        let current = sqlx::query_as::<_, PickupAssignment>(&lock_query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(TransitionError::NotFound {
                entity: PickupStatus::ENTITY,
            })?;
        current.status.ensure_transition(target)?;

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE pickup_assignments SET status = ");
        builder.push_bind(target).push(", updated_at = NOW()");

        if let Some(column) = target.timestamp_column() {
            builder.push(", ").push(column).push(" = NOW()");
        }
        if target == PickupStatus::Cancelled {
            builder
                .push(", cancellation_reason = ")
                .push_bind(details.cancellation_reason);
        }
        if let Some(verification) = details.pickup_verification {
            builder
                .push(", pickup_verification = ")
                .push_bind(Json(verification));
        }
        if let Some(verification) = details.delivery_verification {
            builder
                .push(", delivery_verification = ")
                .push_bind(Json(verification));
        }
        if let Some((side, rating)) = details.rating {
            builder
                .push(", ")
                .push(side.column())
                .push(" = ")
                .push_bind(Json(rating));
        }

        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND status = ")
            .push_bind(current.status)
            .push(" RETURNING ")
            .push(PICKUP_COLUMNS);

        let updated = builder
            .build_query_as::<PickupAssignment>()
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(TransitionError::Stale {
                entity: PickupStatus::ENTITY,
            })?;

        if let Some((from, to)) = target.donation_effect() {
            FoodDonation::transition_from(&mut *tx, updated.donation_id, from, to)
                .await?
                .ok_or_else(|| {
                    TransitionError::Precondition(format!(
                        "donation is not {} so the pickup cannot become {}",
                        from, target
                    ))
                })?;
        }

        tx.commit().await?;

        tracing::info!(
            pickup_id = %id,
            from = %current.status,
            to = %target,
            "Pickup status changed"
        );

        Ok(updated)
    }

    /// Appends a waypoint and moves the current location
    ///
    /// Returns None when the assignment doesn't exist or is not on the road.
    pub async fn record_location(
        pool: &PgPool,
        id: Uuid,
        point: GeoPoint,
    ) -> Result<Option<Self>, sqlx::Error> {
        let waypoint = Waypoint {
            latitude: point.latitude,
            longitude: point.longitude,
            recorded_at: Utc::now(),
        };

        let query = format!(
            r#"
            UPDATE pickup_assignments
            SET route = jsonb_set(
                    jsonb_set(route, '{{current_location}}', $2),
                    '{{waypoints}}',
                    COALESCE(route->'waypoints', '[]'::jsonb) || $3
                ),
                updated_at = NOW()
            WHERE id = $1 AND status IN {}
            RETURNING {}
            "#,
            TRACKABLE, PICKUP_COLUMNS
        );

        let pickup = sqlx::query_as::<_, PickupAssignment>(&query)
            .bind(id)
            .bind(Json(point))
            .bind(Json(vec![waypoint]))
            .fetch_optional(pool)
            .await?;

        Ok(pickup)
    }

    /// Records one side's rating after completion
    ///
    /// Each side may rate once.
    pub async fn rate(
        pool: &PgPool,
        id: Uuid,
        side: RatingSide,
        rating: Rating,
    ) -> Result<Self, TransitionError> {
        let current = Self::find_by_id(pool, id)
            .await?
            .ok_or(TransitionError::NotFound {
                entity: PickupStatus::ENTITY,
            })?;

        if current.status != PickupStatus::Completed {
            return Err(TransitionError::Precondition(format!(
                "pickup must be completed before it can be rated (pickup is {})",
                current.status
            )));
        }
        if current.rating(side).is_some() {
            return Err(TransitionError::Precondition(
                "this side has already rated the pickup".to_string(),
            ));
        }

        let column = side.column();
        let query = format!(
            r#"
            UPDATE pickup_assignments
            SET {column} = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'completed' AND {column} IS NULL
            RETURNING {columns}
            "#,
            column = column,
            columns = PICKUP_COLUMNS
        );

        sqlx::query_as::<_, PickupAssignment>(&query)
            .bind(id)
            .bind(Json(rating))
            .fetch_optional(pool)
            .await?
            .ok_or(TransitionError::Stale {
                entity: PickupStatus::ENTITY,
            })
    }

    /// Counts assignments per status
    pub async fn count_by_status(
        pool: &PgPool,
        filter: &PickupFilter,
    ) -> Result<Vec<PickupStatusCount>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT status, COUNT(*) AS count FROM pickup_assignments",
        );
        filter.push_where(&mut builder);
        builder.push(" GROUP BY status ORDER BY status");

        let counts = builder
            .build_query_as::<PickupStatusCount>()
            .fetch_all(pool)
            .await?;

        Ok(counts)
    }

    /// Completed, active and cancelled runs plus the rating average for a volunteer
    pub async fn volunteer_stats(
        pool: &PgPool,
        volunteer_id: Uuid,
    ) -> Result<VolunteerStats, sqlx::Error> {
        let stats = sqlx::query_as::<_, VolunteerStats>(
            r#"
            WITH runs AS (
                SELECT * FROM pickup_assignments WHERE volunteer_id = $1
            ),
            scores AS (
                SELECT (donor_rating->>'score')::float8 AS score
                FROM runs WHERE donor_rating IS NOT NULL
                UNION ALL
                SELECT (recipient_rating->>'score')::float8
                FROM runs WHERE recipient_rating IS NOT NULL
            )
            SELECT
                (SELECT COUNT(*) FROM runs WHERE status = 'completed') AS completed,
                (SELECT COUNT(*) FROM runs WHERE status NOT IN ('completed', 'cancelled')) AS active,
                (SELECT COUNT(*) FROM runs WHERE status = 'cancelled') AS cancelled,
                (SELECT AVG(score) FROM scores) AS average_rating,
                (SELECT COUNT(*) FROM scores) AS ratings,
                (SELECT COALESCE(SUM((route->>'distance_km')::float8), 0)::float8
                   FROM runs WHERE status = 'completed') AS distance_km
            "#,
        )
        .bind(volunteer_id)
        .fetch_one(pool)
        .await?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pickup_status_as_str() {
        assert_eq!(PickupStatus::PickedUp.as_str(), "picked_up");
        assert_eq!(PickupStatus::InTransit.as_str(), "in_transit");
        for status in PickupStatus::ALL {
            assert_eq!(status.as_str().parse::<PickupStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_pickup_status_transitions() {
        use PickupStatus::*;

        assert!(Assigned.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(InTransit));
        assert!(InTransit.can_transition_to(PickedUp));
        assert!(PickedUp.can_transition_to(Delivering));
        assert!(Delivering.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Completed));

        assert!(Assigned.can_transition_to(Cancelled));
        assert!(InTransit.can_transition_to(Cancelled));
        assert!(!PickedUp.can_transition_to(Cancelled));
        assert!(!Assigned.can_transition_to(PickedUp));
        assert!(!Delivered.can_transition_to(Cancelled));

        for target in PickupStatus::ALL {
            assert!(!Completed.can_transition_to(target));
            assert!(!Cancelled.can_transition_to(target));
        }
    }

    #[test]
    fn test_donation_coupling_is_legal() {
        // Every coupled donation move must itself be allowed by the donation table
        for status in PickupStatus::ALL {
            if let Some((from, to)) = status.donation_effect() {
                assert!(
                    from.can_transition_to(to),
                    "{} couples an illegal donation move {} -> {}",
                    status,
                    from,
                    to
                );
            }
        }
        assert_eq!(
            PickupStatus::Cancelled.donation_effect(),
            Some((DonationStatus::Assigned, DonationStatus::Claimed))
        );
        assert_eq!(PickupStatus::Accepted.donation_effect(), None);
    }

    #[test]
    fn test_is_trackable() {
        assert!(!PickupStatus::Assigned.is_trackable());
        assert!(PickupStatus::Accepted.is_trackable());
        assert!(PickupStatus::Delivering.is_trackable());
        assert!(!PickupStatus::Delivered.is_trackable());
    }

    #[test]
    fn test_timestamp_columns() {
        assert_eq!(
            PickupStatus::InTransit.timestamp_column(),
            Some("started_at")
        );
        assert_eq!(PickupStatus::Delivering.timestamp_column(), None);
    }

    #[test]
    fn test_route_new_computes_distance() {
        let pickup = GeoPoint::new(51.5074, -0.1278).unwrap();
        let delivery = GeoPoint::new(51.5155, -0.0922).unwrap();
        let route = Route::new(pickup, delivery);
        assert!(route.waypoints.is_empty());
        assert!(route.current_location.is_none());
        assert!(route.distance_km > 2.0 && route.distance_km < 3.5);
    }

    #[test]
    fn test_route_deserializes_without_tracking_fields() {
        let route: Route = serde_json::from_str(
            r#"{"pickup":{"latitude":1.0,"longitude":2.0},
                "delivery":{"latitude":1.5,"longitude":2.5},
                "distance_km":78.6}"#,
        )
        .unwrap();
        assert!(route.waypoints.is_empty());
    }

    #[test]
    fn test_item_condition_wire_names() {
        assert_eq!(
            serde_json::to_string(&ItemCondition::Excellent).unwrap(),
            "\"excellent\""
        );
        assert!(serde_json::from_str::<ItemCondition>("\"rotten\"").is_err());
    }
}
