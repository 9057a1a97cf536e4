/// Food donation model and lifecycle operations
///
/// A donation moves through a closed status table:
///
/// ```text
/// pending -> verified -> available -> claimed -> assigned -> in_transit -> delivered -> completed
///    \           \            \           \          \
///     +-----------+------------+-----------+----------+--> cancelled / expired (side exits)
/// ```
///
/// Every UPDATE issued from this module recomputes `urgency_level` with
/// [`crate::urgency::sql_case`] and is conditional on the status observed
/// before the write.
///
/// # Example
///
/// ```no_run
/// use foodbridge_shared::models::donation::FoodDonation;
/// # use sqlx::PgPool;
/// # use uuid::Uuid;
///
/// # async fn example(pool: PgPool, donation_id: Uuid, ngo_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let claimed = FoodDonation::claim(&pool, donation_id, ngo_id).await?;
/// assert_eq!(claimed.claimed_by, Some(ngo_id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::geo::{self, GeoPoint};
use crate::lifecycle::{StatusMachine, TransitionError};
use crate::urgency::{self, UrgencyLevel};

const DONATION_COLUMNS: &str = "id, donor_id, title, description, category, quantity, unit, \
     expiry_date, prepared_at, storage, dietary_tags, allergens, pickup_address, latitude, \
     longitude, pickup_window_start, pickup_window_end, pickup_instructions, status, \
     urgency_level, safety_checklist, verified_by, verified_at, verification_notes, \
     claimed_by, claimed_at, recipient_feedback, created_at, updated_at";

/// Statuses in which the donor may still edit the listing
const EDITABLE: &str = "('pending', 'verified', 'available')";

/// Statuses from which a listing may be deleted
const DELETABLE: &str = "('pending', 'verified', 'available', 'cancelled', 'expired')";

/// Statuses the worker expires once `expiry_date` has passed
const EXPIRABLE: &str = "('pending', 'verified', 'available', 'claimed')";

fn urgency_expr() -> String {
    urgency::sql_case("expiry_date")
}

/// Donation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "donation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DonationStatus {
    /// Listed by the donor, awaiting verification
    Pending,

    /// Checked by an NGO or admin, not yet published
    Verified,

    /// Open for claiming
    Available,

    /// Reserved by an NGO
    Claimed,

    /// A volunteer has been assigned
    Assigned,

    /// Picked up and on the way
    InTransit,

    /// Handed over to the recipient
    Delivered,

    /// Closed after delivery
    Completed,

    /// Passed its expiry date before being delivered
    Expired,

    /// Withdrawn or rejected
    Cancelled,
}

impl DonationStatus {
    pub const ALL: [DonationStatus; 10] = [
        DonationStatus::Pending,
        DonationStatus::Verified,
        DonationStatus::Available,
        DonationStatus::Claimed,
        DonationStatus::Assigned,
        DonationStatus::InTransit,
        DonationStatus::Delivered,
        DonationStatus::Completed,
        DonationStatus::Expired,
        DonationStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Pending => "pending",
            DonationStatus::Verified => "verified",
            DonationStatus::Available => "available",
            DonationStatus::Claimed => "claimed",
            DonationStatus::Assigned => "assigned",
            DonationStatus::InTransit => "in_transit",
            DonationStatus::Delivered => "delivered",
            DonationStatus::Completed => "completed",
            DonationStatus::Expired => "expired",
            DonationStatus::Cancelled => "cancelled",
        }
    }

    /// Donor edits are allowed only before anyone has claimed the food
    pub fn is_editable(&self) -> bool {
        matches!(
            self,
            DonationStatus::Pending | DonationStatus::Verified | DonationStatus::Available
        )
    }

    pub fn is_deletable(&self) -> bool {
        self.is_editable() || matches!(self, DonationStatus::Cancelled | DonationStatus::Expired)
    }

    /// Statuses entered only together with a pickup status change
    pub fn is_pickup_driven(&self) -> bool {
        matches!(
            self,
            DonationStatus::Assigned
                | DonationStatus::InTransit
                | DonationStatus::Delivered
                | DonationStatus::Completed
        )
    }

    /// Whether `self -> target` belongs to the pickup coupling
    ///
    /// Leaving `assigned` for `claimed` is the pickup cancellation path, so it
    /// counts too.
    pub fn is_pickup_move(&self, target: DonationStatus) -> bool {
        target.is_pickup_driven()
            || (*self == DonationStatus::Assigned && target == DonationStatus::Claimed)
    }
}

impl StatusMachine for DonationStatus {
    const ENTITY: &'static str = "donation";

    fn can_transition_to(&self, target: DonationStatus) -> bool {
        use DonationStatus::*;

        match (self, target) {
            (Pending, Verified | Cancelled | Expired) => true,
            (Verified, Available | Cancelled | Expired) => true,
            (Available, Claimed | Cancelled | Expired) => true,
            // A claim can be released back to the pool
            (Claimed, Assigned | Available | Cancelled | Expired) => true,
            // Cancelling the pickup hands the donation back to the claimer
            (Assigned, InTransit | Claimed | Cancelled) => true,
            (InTransit, Delivered) => true,
            (Delivered, Completed) => true,

            // Terminal states cannot transition
            _ => false,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            DonationStatus::Completed | DonationStatus::Expired | DonationStatus::Cancelled
        )
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DonationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DonationStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown donation status: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "food_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FoodCategory {
    PreparedFood,
    Produce,
    Bakery,
    Dairy,
    Meat,
    Packaged,
    Beverages,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "quantity_unit", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QuantityUnit {
    Kg,
    Lbs,
    Servings,
    Items,
    Liters,
    Boxes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "storage_requirement", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StorageRequirement {
    RoomTemperature,
    Refrigerated,
    Frozen,
}

impl Default for StorageRequirement {
    fn default() -> Self {
        StorageRequirement::RoomTemperature
    }
}

/// Food-safety declarations made by the donor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyChecklist {
    pub temperature_controlled: bool,
    pub properly_packaged: bool,
    pub labeled_with_date: bool,
    pub allergens_disclosed: bool,
    pub hygiene_followed: bool,
}

impl SafetyChecklist {
    /// All declarations made; required before a listing is approved
    pub fn is_complete(&self) -> bool {
        self.temperature_controlled
            && self.properly_packaged
            && self.labeled_with_date
            && self.allergens_disclosed
            && self.hygiene_followed
    }
}

/// Feedback from the recipient NGO after delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientFeedback {
    /// 1 to 5
    pub rating: i16,
    pub comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Food donation row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FoodDonation {
    pub id: Uuid,
    pub donor_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: FoodCategory,

    /// Always positive
    pub quantity: f64,
    pub unit: QuantityUnit,
    pub expiry_date: DateTime<Utc>,
    pub prepared_at: Option<DateTime<Utc>>,
    pub storage: StorageRequirement,
    pub dietary_tags: Vec<String>,
    pub allergens: Vec<String>,

    pub pickup_address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub pickup_window_start: Option<DateTime<Utc>>,
    pub pickup_window_end: Option<DateTime<Utc>>,
    pub pickup_instructions: Option<String>,

    pub status: DonationStatus,

    /// Derived from `expiry_date`; recomputed on every write
    pub urgency_level: UrgencyLevel,

    pub safety_checklist: Json<SafetyChecklist>,

    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verification_notes: Option<String>,

    /// NGO holding the claim
    pub claimed_by: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,

    pub recipient_feedback: Option<Json<RecipientFeedback>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FoodDonation {
    pub fn location(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Input for a new listing
#[derive(Debug, Clone)]
pub struct CreateDonation {
    pub donor_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: FoodCategory,
    pub quantity: f64,
    pub unit: QuantityUnit,
    pub expiry_date: DateTime<Utc>,
    pub prepared_at: Option<DateTime<Utc>>,
    pub storage: StorageRequirement,
    pub dietary_tags: Vec<String>,
    pub allergens: Vec<String>,
    pub pickup_address: String,
    pub location: GeoPoint,
    pub pickup_window_start: Option<DateTime<Utc>>,
    pub pickup_window_end: Option<DateTime<Utc>>,
    pub pickup_instructions: Option<String>,
    pub safety_checklist: SafetyChecklist,
}

/// Donor edit; only non-None fields are updated
#[derive(Debug, Clone, Default)]
pub struct UpdateDonation {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<FoodCategory>,
    pub quantity: Option<f64>,
    pub unit: Option<QuantityUnit>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub prepared_at: Option<Option<DateTime<Utc>>>,
    pub storage: Option<StorageRequirement>,
    pub dietary_tags: Option<Vec<String>>,
    pub allergens: Option<Vec<String>>,
    pub pickup_address: Option<String>,
    pub location: Option<GeoPoint>,
    pub pickup_window_start: Option<Option<DateTime<Utc>>>,
    pub pickup_window_end: Option<Option<DateTime<Utc>>>,
    pub pickup_instructions: Option<Option<String>>,
    pub safety_checklist: Option<SafetyChecklist>,
}

/// Checks the pickup window ordering when both ends are present
pub fn check_pickup_window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<(), String> {
    match (start, end) {
        (Some(start), Some(end)) if start >= end => {
            Err("pickup window must start before it ends".to_string())
        }
        _ => Ok(()),
    }
}

/// Filters for listing donations
#[derive(Debug, Clone, Default)]
pub struct DonationFilter {
    pub status: Option<DonationStatus>,
    pub category: Option<FoodCategory>,
    pub urgency: Option<UrgencyLevel>,
    pub donor_id: Option<Uuid>,
    pub claimed_by: Option<Uuid>,

    /// Only donations within `radius_km` of the point
    pub near: Option<(GeoPoint, f64)>,
}

impl DonationFilter {
    fn push_where(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(" WHERE TRUE");
        if let Some(status) = self.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(category) = self.category {
            builder.push(" AND category = ").push_bind(category);
        }
        if let Some(level) = self.urgency {
            builder.push(" AND urgency_level = ").push_bind(level);
        }
        if let Some(donor_id) = self.donor_id {
            builder.push(" AND donor_id = ").push_bind(donor_id);
        }
        if let Some(claimed_by) = self.claimed_by {
            builder.push(" AND claimed_by = ").push_bind(claimed_by);
        }
        if let Some((point, radius_km)) = self.near {
            // Coordinates are range-checked f64 values, safe to inline as literals
            let lat = format!("CAST({} AS DOUBLE PRECISION)", point.latitude);
            let lng = format!("CAST({} AS DOUBLE PRECISION)", point.longitude);
            builder
                .push(" AND ")
                .push(geo::haversine_sql("latitude", "longitude", &lat, &lng))
                .push(" <= ")
                .push_bind(radius_km);
        }
    }
}

/// Count of donations in one status
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StatusCount {
    pub status: DonationStatus,
    pub count: i64,
}

/// Summed quantity per unit
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct QuantityTotal {
    pub unit: QuantityUnit,
    pub total: f64,
    pub donations: i64,
}

impl FoodDonation {
    /// Creates a listing in `pending` status
    ///
    /// Urgency is computed in SQL from the bound expiry so the initial value
    /// comes from the same table the refresh sweep uses.
    pub async fn create(pool: &PgPool, data: CreateDonation) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO food_donations (
                donor_id, title, description, category, quantity, unit, expiry_date,
                prepared_at, storage, dietary_tags, allergens, pickup_address, latitude,
                longitude, pickup_window_start, pickup_window_end, pickup_instructions,
                safety_checklist, urgency_level
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, {})
            RETURNING {}
            "#,
            urgency::sql_case("$7"),
            DONATION_COLUMNS
        );

        let donation = sqlx::query_as::<_, FoodDonation>(&query)
            .bind(data.donor_id)
            .bind(data.title)
            .bind(data.description)
            .bind(data.category)
            .bind(data.quantity)
            .bind(data.unit)
            .bind(data.expiry_date)
            .bind(data.prepared_at)
            .bind(data.storage)
            .bind(data.dietary_tags)
            .bind(data.allergens)
            .bind(data.pickup_address)
            .bind(data.location.latitude)
            .bind(data.location.longitude)
            .bind(data.pickup_window_start)
            .bind(data.pickup_window_end)
            .bind(data.pickup_instructions)
            .bind(Json(data.safety_checklist))
            .fetch_one(pool)
            .await?;

        Ok(donation)
    }

    /// Finds a donation by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {} FROM food_donations WHERE id = $1", DONATION_COLUMNS);

        let donation = sqlx::query_as::<_, FoodDonation>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(donation)
    }

    /// Finds a donation and locks the row until the surrounding transaction ends
    pub async fn find_by_id_for_update<'e, E>(
        executor: E,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {} FROM food_donations WHERE id = $1 FOR UPDATE",
            DONATION_COLUMNS
        );

        let donation = sqlx::query_as::<_, FoodDonation>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(donation)
    }

    /// Lists donations matching `filter`
    ///
    /// Open listings are ordered most urgent first, then soonest expiry.
    /// Filtering on a terminal status orders by newest first.
    pub async fn list(
        pool: &PgPool,
        filter: &DonationFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
        builder.push(DONATION_COLUMNS).push(" FROM food_donations");
        filter.push_where(&mut builder);

        match filter.status {
            Some(status) if status.is_terminal() => {
                builder.push(" ORDER BY updated_at DESC");
            }
            _ => {
                builder.push(" ORDER BY urgency_level DESC, expiry_date ASC, created_at DESC");
            }
        }

        builder
            .push(" LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let donations = builder
            .build_query_as::<FoodDonation>()
            .fetch_all(pool)
            .await?;

        Ok(donations)
    }

    /// Counts donations matching `filter`
    pub async fn count(pool: &PgPool, filter: &DonationFilter) -> Result<i64, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM food_donations");
        filter.push_where(&mut builder);

        let (count,): (i64,) = builder.build_query_as().fetch_one(pool).await?;

        Ok(count)
    }

    /// Applies a donor edit
    ///
    /// Returns None when the donation doesn't exist or is no longer editable.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateDonation,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut builder =
            QueryBuilder::<Postgres>::new("UPDATE food_donations SET updated_at = NOW()");

        if let Some(title) = data.title {
            builder.push(", title = ").push_bind(title);
        }
        if let Some(description) = data.description {
            builder.push(", description = ").push_bind(description);
        }
        if let Some(category) = data.category {
            builder.push(", category = ").push_bind(category);
        }
        if let Some(quantity) = data.quantity {
            builder.push(", quantity = ").push_bind(quantity);
        }
        if let Some(unit) = data.unit {
            builder.push(", unit = ").push_bind(unit);
        }
        if let Some(prepared_at) = data.prepared_at {
            builder.push(", prepared_at = ").push_bind(prepared_at);
        }
        if let Some(storage) = data.storage {
            builder.push(", storage = ").push_bind(storage);
        }
        if let Some(tags) = data.dietary_tags {
            builder.push(", dietary_tags = ").push_bind(tags);
        }
        if let Some(allergens) = data.allergens {
            builder.push(", allergens = ").push_bind(allergens);
        }
        if let Some(address) = data.pickup_address {
            builder.push(", pickup_address = ").push_bind(address);
        }
        if let Some(location) = data.location {
            builder
                .push(", latitude = ")
                .push_bind(location.latitude)
                .push(", longitude = ")
                .push_bind(location.longitude);
        }
        if let Some(start) = data.pickup_window_start {
            builder.push(", pickup_window_start = ").push_bind(start);
        }
        if let Some(end) = data.pickup_window_end {
            builder.push(", pickup_window_end = ").push_bind(end);
        }
        if let Some(instructions) = data.pickup_instructions {
            builder.push(", pickup_instructions = ").push_bind(instructions);
        }
        if let Some(checklist) = data.safety_checklist {
            builder.push(", safety_checklist = ").push_bind(Json(checklist));
        }

        // SET sees the old row, so a new expiry is classified from the bound value
        match data.expiry_date {
            Some(expiry) => {
                builder
                    .push(", expiry_date = ")
                    .push_bind(expiry)
                    .push(", urgency_level = ")
                    .push_bind(UrgencyLevel::from_expiry(expiry, Utc::now()));
            }
            None => {
                builder.push(", urgency_level = ").push(urgency_expr());
            }
        }

        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND status IN ")
            .push(EDITABLE)
            .push(" RETURNING ")
            .push(DONATION_COLUMNS);

        let donation = builder
            .build_query_as::<FoodDonation>()
            .fetch_optional(pool)
            .await?;

        Ok(donation)
    }

    /// Records a verification decision on a pending listing
    ///
    /// Approval moves to `verified`, or straight through to `available` when
    /// `publish` is set. Rejection cancels the listing. Approval requires a
    /// complete safety checklist. Any status other than `pending` is refused,
    /// so a decision can never cancel food that is already claimed or moving.
    pub async fn verify(
        pool: &PgPool,
        id: Uuid,
        verifier_id: Uuid,
        approved: bool,
        publish: bool,
        notes: Option<String>,
    ) -> Result<Self, TransitionError> {
        let current = Self::find_by_id(pool, id)
            .await?
            .ok_or(TransitionError::NotFound {
                entity: DonationStatus::ENTITY,
            })?;

        let decision = if approved {
            DonationStatus::Verified
        } else {
            DonationStatus::Cancelled
        };
        if current.status != DonationStatus::Pending {
            return Err(TransitionError::Illegal {
                entity: DonationStatus::ENTITY,
                from: current.status.to_string(),
                to: decision.to_string(),
            });
        }

        let target = if approved {
            if !current.safety_checklist.is_complete() {
                return Err(TransitionError::Precondition(
                    "safety checklist must be complete before approval".to_string(),
                ));
            }
            if publish {
                DonationStatus::Available
            } else {
                DonationStatus::Verified
            }
        } else {
            DonationStatus::Cancelled
        };

        let query = format!(
            r#"
            UPDATE food_donations
            SET status = $3,
                verified_by = $4,
                verified_at = NOW(),
                verification_notes = $5,
                urgency_level = {},
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            urgency_expr(),
            DONATION_COLUMNS
        );

        sqlx::query_as::<_, FoodDonation>(&query)
            .bind(id)
            .bind(current.status)
            .bind(target)
            .bind(verifier_id)
            .bind(notes)
            .fetch_optional(pool)
            .await?
            .ok_or(TransitionError::Stale {
                entity: DonationStatus::ENTITY,
            })
    }

    /// Reserves an available donation for an NGO
    pub async fn claim(pool: &PgPool, id: Uuid, ngo_id: Uuid) -> Result<Self, TransitionError> {
        let current = Self::find_by_id(pool, id)
            .await?
            .ok_or(TransitionError::NotFound {
                entity: DonationStatus::ENTITY,
            })?;
        current.status.ensure_transition(DonationStatus::Claimed)?;

        let query = format!(
            r#"
            UPDATE food_donations
            SET status = 'claimed',
                claimed_by = $3,
                claimed_at = NOW(),
                urgency_level = {},
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            urgency_expr(),
            DONATION_COLUMNS
        );

        sqlx::query_as::<_, FoodDonation>(&query)
            .bind(id)
            .bind(current.status)
            .bind(ngo_id)
            .fetch_optional(pool)
            .await?
            .ok_or(TransitionError::Stale {
                entity: DonationStatus::ENTITY,
            })
    }

    /// Returns a claimed donation to the available pool
    pub async fn release_claim(pool: &PgPool, id: Uuid) -> Result<Self, TransitionError> {
        Self::transition(pool, id, DonationStatus::Available).await
    }

    /// Guarded status change
    ///
    /// Checks the transition table against the current status, then writes
    /// conditionally on it. Moving back to `available` clears the claim.
    /// Moves owned by the pickup coupling are refused; they happen only in
    /// `PickupAssignment` transactions.
    pub async fn transition(
        pool: &PgPool,
        id: Uuid,
        target: DonationStatus,
    ) -> Result<Self, TransitionError> {
        let current = Self::find_by_id(pool, id)
            .await?
            .ok_or(TransitionError::NotFound {
                entity: DonationStatus::ENTITY,
            })?;
        current.status.ensure_transition(target)?;
        if current.status.is_pickup_move(target) {
            return Err(TransitionError::Precondition(format!(
                "donation moves from {} to {} only with its pickup",
                current.status, target
            )));
        }

        Self::transition_from(pool, id, current.status, target)
            .await?
            .ok_or(TransitionError::Stale {
                entity: DonationStatus::ENTITY,
            })
    }

    /// Conditional status write without the table check
    ///
    /// Returns None when the row is not in `from`. Used inside pickup
    /// transactions where the coupling table already fixes both ends.
    pub async fn transition_from<'e, E>(
        executor: E,
        id: Uuid,
        from: DonationStatus,
        to: DonationStatus,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            r#"
            UPDATE food_donations
            SET status = $3,
                claimed_by = CASE WHEN $3 = 'available'::donation_status THEN NULL ELSE claimed_by END,
                claimed_at = CASE WHEN $3 = 'available'::donation_status THEN NULL ELSE claimed_at END,
                urgency_level = {},
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            urgency_expr(),
            DONATION_COLUMNS
        );

        let donation = sqlx::query_as::<_, FoodDonation>(&query)
            .bind(id)
            .bind(from)
            .bind(to)
            .fetch_optional(executor)
            .await?;

        Ok(donation)
    }

    /// Administrative override that skips the transition table
    ///
    /// Callers must audit the change. Forcing to a pre-claim status clears the claim.
    pub async fn force_status(
        pool: &PgPool,
        id: Uuid,
        target: DonationStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE food_donations
            SET status = $2,
                claimed_by = CASE WHEN $2 IN ('pending', 'verified', 'available') THEN NULL ELSE claimed_by END,
                claimed_at = CASE WHEN $2 IN ('pending', 'verified', 'available') THEN NULL ELSE claimed_at END,
                urgency_level = {},
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            urgency_expr(),
            DONATION_COLUMNS
        );

        let donation = sqlx::query_as::<_, FoodDonation>(&query)
            .bind(id)
            .bind(target)
            .fetch_optional(pool)
            .await?;

        Ok(donation)
    }

    /// Stores the recipient's feedback once the food has been delivered
    pub async fn submit_feedback(
        pool: &PgPool,
        id: Uuid,
        rating: i16,
        comment: Option<String>,
    ) -> Result<Self, TransitionError> {
        let current = Self::find_by_id(pool, id)
            .await?
            .ok_or(TransitionError::NotFound {
                entity: DonationStatus::ENTITY,
            })?;

        if !matches!(
            current.status,
            DonationStatus::Delivered | DonationStatus::Completed
        ) {
            return Err(TransitionError::Precondition(format!(
                "feedback can only be left after delivery (donation is {})",
                current.status
            )));
        }
        if current.recipient_feedback.is_some() {
            return Err(TransitionError::Precondition(
                "feedback has already been submitted".to_string(),
            ));
        }

        let feedback = RecipientFeedback {
            rating,
            comment,
            submitted_at: Utc::now(),
        };

        let query = format!(
            r#"
            UPDATE food_donations
            SET recipient_feedback = $2,
                urgency_level = {},
                updated_at = NOW()
            WHERE id = $1
              AND status IN ('delivered', 'completed')
              AND recipient_feedback IS NULL
            RETURNING {}
            "#,
            urgency_expr(),
            DONATION_COLUMNS
        );

        sqlx::query_as::<_, FoodDonation>(&query)
            .bind(id)
            .bind(Json(feedback))
            .fetch_optional(pool)
            .await?
            .ok_or(TransitionError::Stale {
                entity: DonationStatus::ENTITY,
            })
    }

    /// Deletes a donation that is not in flight
    ///
    /// Returns false if the donation doesn't exist or is claimed or later.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let query = format!(
            "DELETE FROM food_donations WHERE id = $1 AND status IN {}",
            DELETABLE
        );

        let result = sqlx::query(&query).bind(id).execute(pool).await?;

        Ok(result.rows_affected() > 0)
    }

    /// Expires every open donation whose expiry date has passed
    ///
    /// Returns the rows that were expired so callers can notify donors.
    pub async fn expire_overdue(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE food_donations
            SET status = 'expired',
                urgency_level = {},
                updated_at = NOW()
            WHERE expiry_date <= NOW() AND status IN {}
            RETURNING {}
            "#,
            urgency_expr(),
            EXPIRABLE,
            DONATION_COLUMNS
        );

        let expired = sqlx::query_as::<_, FoodDonation>(&query)
            .fetch_all(pool)
            .await?;

        Ok(expired)
    }

    /// Recomputes urgency for every non-terminal donation whose level drifted
    ///
    /// Returns the number of rows changed.
    pub async fn refresh_urgency(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let expr = urgency_expr();
        let query = format!(
            r#"
            UPDATE food_donations
            SET urgency_level = {expr},
                updated_at = NOW()
            WHERE status NOT IN ('completed', 'expired', 'cancelled')
              AND urgency_level IS DISTINCT FROM {expr}
            "#,
            expr = expr
        );

        let result = sqlx::query(&query).execute(pool).await?;

        Ok(result.rows_affected())
    }

    /// Counts donations per status within `filter`
    pub async fn count_by_status(
        pool: &PgPool,
        filter: &DonationFilter,
    ) -> Result<Vec<StatusCount>, sqlx::Error> {
        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT status, COUNT(*) AS count FROM food_donations");
        filter.push_where(&mut builder);
        builder.push(" GROUP BY status ORDER BY status");

        let counts = builder
            .build_query_as::<StatusCount>()
            .fetch_all(pool)
            .await?;

        Ok(counts)
    }

    /// Sums quantity per unit within `filter`
    pub async fn quantity_totals(
        pool: &PgPool,
        filter: &DonationFilter,
    ) -> Result<Vec<QuantityTotal>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT unit, COALESCE(SUM(quantity), 0)::float8 AS total, COUNT(*) AS donations \
             FROM food_donations",
        );
        filter.push_where(&mut builder);
        builder.push(" GROUP BY unit ORDER BY unit");

        let totals = builder
            .build_query_as::<QuantityTotal>()
            .fetch_all(pool)
            .await?;

        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_donation_status_as_str() {
        assert_eq!(DonationStatus::Pending.as_str(), "pending");
        assert_eq!(DonationStatus::InTransit.as_str(), "in_transit");
        assert_eq!(DonationStatus::Cancelled.as_str(), "cancelled");
        assert_eq!(
            serde_json::to_string(&DonationStatus::InTransit).unwrap(),
            "\"in_transit\""
        );
    }

    #[test]
    fn test_donation_status_from_str() {
        for status in DonationStatus::ALL {
            assert_eq!(status.as_str().parse::<DonationStatus>(), Ok(status));
        }
        assert!("shipped".parse::<DonationStatus>().is_err());
        assert!(serde_json::from_str::<DonationStatus>("\"shipped\"").is_err());
    }

    #[test]
    fn test_pickup_moves() {
        use DonationStatus::*;

        for target in [Assigned, InTransit, Delivered, Completed] {
            assert!(target.is_pickup_driven());
        }
        assert!(Claimed.is_pickup_move(Assigned));
        assert!(Assigned.is_pickup_move(Claimed));
        assert!(Assigned.is_pickup_move(InTransit));

        assert!(!Claimed.is_pickup_move(Available));
        assert!(!Assigned.is_pickup_move(Cancelled));
        assert!(!Verified.is_pickup_move(Available));
        assert!(!Available.is_pickup_move(Claimed));
    }

    #[test]
    fn test_donation_status_is_terminal() {
        assert!(!DonationStatus::Pending.is_terminal());
        assert!(!DonationStatus::Assigned.is_terminal());
        assert!(DonationStatus::Completed.is_terminal());
        assert!(DonationStatus::Expired.is_terminal());
        assert!(DonationStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_donation_status_transitions() {
        use DonationStatus::*;

        // Happy path
        assert!(Pending.can_transition_to(Verified));
        assert!(Verified.can_transition_to(Available));
        assert!(Available.can_transition_to(Claimed));
        assert!(Claimed.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(InTransit));
        assert!(InTransit.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Completed));

        // Side exits and reversals
        assert!(Claimed.can_transition_to(Available));
        assert!(Assigned.can_transition_to(Claimed));
        assert!(Available.can_transition_to(Expired));
        assert!(!Assigned.can_transition_to(Expired));
        assert!(!InTransit.can_transition_to(Cancelled));

        // No skipping
        assert!(!Pending.can_transition_to(Available));
        assert!(!Available.can_transition_to(Assigned));

        // Terminal states cannot transition
        for target in DonationStatus::ALL {
            assert!(!Completed.can_transition_to(target));
            assert!(!Expired.can_transition_to(target));
            assert!(!Cancelled.can_transition_to(target));
        }
    }

    #[test]
    fn test_editable_and_deletable() {
        assert!(DonationStatus::Available.is_editable());
        assert!(!DonationStatus::Claimed.is_editable());
        assert!(DonationStatus::Expired.is_deletable());
        assert!(!DonationStatus::Assigned.is_deletable());
        assert!(!DonationStatus::Completed.is_deletable());
    }

    #[test]
    fn test_safety_checklist() {
        let mut checklist = SafetyChecklist::default();
        assert!(!checklist.is_complete());
        checklist = SafetyChecklist {
            temperature_controlled: true,
            properly_packaged: true,
            labeled_with_date: true,
            allergens_disclosed: true,
            hygiene_followed: true,
        };
        assert!(checklist.is_complete());

        // Missing keys default to false
        let partial: SafetyChecklist =
            serde_json::from_str(r#"{"hygiene_followed": true}"#).unwrap();
        assert!(partial.hygiene_followed);
        assert!(!partial.is_complete());
    }

    #[test]
    fn test_check_pickup_window() {
        let now = Utc::now();
        assert!(check_pickup_window(Some(now), Some(now + Duration::hours(1))).is_ok());
        assert!(check_pickup_window(Some(now), Some(now)).is_err());
        assert!(check_pickup_window(Some(now + Duration::hours(1)), Some(now)).is_err());
        assert!(check_pickup_window(None, Some(now)).is_ok());
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&FoodCategory::PreparedFood).unwrap(),
            "\"prepared_food\""
        );
        assert_eq!(serde_json::to_string(&QuantityUnit::Kg).unwrap(), "\"kg\"");
        assert_eq!(
            serde_json::to_string(&StorageRequirement::RoomTemperature).unwrap(),
            "\"room_temperature\""
        );
    }
}
