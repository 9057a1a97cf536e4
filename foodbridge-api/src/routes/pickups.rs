/// Pickup assignment endpoints
///
/// - `GET  /v1/pickups` - List runs visible to the caller
/// - `POST /v1/pickups` - Assign a volunteer to a claimed donation
/// - `GET  /v1/pickups/:id` - Get a run (participants and admins)
/// - `PUT  /v1/pickups/:id/status` - Advance or cancel a run
/// - `PUT  /v1/pickups/:id/location` - Record the volunteer's position
/// - `PUT  /v1/pickups/:id/verify-pickup` - Evidence at the donor
/// - `PUT  /v1/pickups/:id/verify-delivery` - Evidence at the recipient
/// - `PUT  /v1/pickups/:id/complete` - Close the run, optionally rating it
/// - `POST /v1/pickups/:id/rating` - Rate the volunteer after completion
///
/// Every status move also moves the donation in the same transaction; see
/// `PickupStatus::donation_effect`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{JsonBody, OptionalJsonBody, Path, Query},
    notify,
    response::{ApiResponse, PageParams, Paginated},
};
use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use foodbridge_shared::{
    auth::{
        authorization::{
            can_assign_pickup, can_set_pickup_status, can_track_pickup, can_view_pickup,
            rating_side,
        },
        middleware::AuthContext,
    },
    geo::GeoPoint,
    models::{
        donation::FoodDonation,
        pickup::{
            CreatePickup, ItemCondition, PickupAssignment, PickupFilter, PickupStatus, Rating,
            Verification,
        },
        user::{User, UserRole},
    },
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct PickupQuery {
    pub status: Option<PickupStatus>,

    /// Admin-only filters; other roles are scoped to their own runs
    pub volunteer_id: Option<Uuid>,
    pub donor_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,

    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PickupQuery {
    fn into_filter(self, auth: &AuthContext) -> (PickupFilter, PageParams) {
        let mut filter = PickupFilter {
            status: self.status,
            ..Default::default()
        };

        match auth.role {
            UserRole::Admin => {
                filter.volunteer_id = self.volunteer_id;
                filter.donor_id = self.donor_id;
                filter.recipient_id = self.recipient_id;
            }
            UserRole::Volunteer => filter.volunteer_id = Some(auth.user_id),
            UserRole::Donor => filter.donor_id = Some(auth.user_id),
            UserRole::Ngo => filter.recipient_id = Some(auth.user_id),
        }

        let page = PageParams {
            page: self.page,
            limit: self.limit,
        };
        (filter, page)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePickupRequest {
    pub donation_id: Uuid,

    /// Defaults to the caller when a volunteer self-assigns
    pub volunteer_id: Option<Uuid>,

    pub scheduled_pickup_at: DateTime<Utc>,
    pub scheduled_delivery_at: Option<DateTime<Utc>>,

    /// Defaults to the recipient organization's location
    pub delivery_location: Option<GeoPoint>,

    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetPickupStatusRequest {
    pub status: PickupStatus,

    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub cancellation_reason: Option<String>,
}

/// Evidence body for pickup and delivery verification
#[derive(Debug, Deserialize, Validate)]
pub struct VerificationRequest {
    #[validate(url(message = "Photo URL must be a valid URL"))]
    pub photo_url: Option<String>,

    #[validate(length(max = 10000, message = "Signature is too large"))]
    pub signature: Option<String>,

    pub condition: ItemCondition,

    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

impl VerificationRequest {
    fn into_verification(self) -> Verification {
        Verification {
            photo_url: self.photo_url,
            signature: self.signature,
            condition: self.condition,
            notes: self.notes,
            verified_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RatingRequest {
    #[validate(range(min = 1, max = 5, message = "Score must be between 1 and 5"))]
    pub score: i16,

    #[validate(length(max = 1000, message = "Comment must be at most 1000 characters"))]
    pub comment: Option<String>,
}

impl RatingRequest {
    fn into_rating(self) -> Rating {
        Rating {
            score: self.score,
            comment: self.comment,
            rated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CompleteRequest {
    #[validate(nested)]
    pub rating: Option<RatingRequest>,
}

async fn load(state: &AppState, id: Uuid) -> ApiResult<PickupAssignment> {
    PickupAssignment::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Pickup not found".to_string()))
}

/// Picks the delivery point: the request's, else the recipient's profile location
fn delivery_point(requested: Option<GeoPoint>, recipient: Option<&User>) -> ApiResult<GeoPoint> {
    match requested.or_else(|| recipient.and_then(User::location)) {
        Some(point) => {
            point.check()?;
            Ok(point)
        }
        None => Err(ApiError::invalid(
            "delivery_location",
            "delivery location is required when the recipient has no location on file",
        )),
    }
}

fn check_schedule(
    pickup_at: DateTime<Utc>,
    delivery_at: Option<DateTime<Utc>>,
) -> ApiResult<()> {
    match delivery_at {
        Some(delivery_at) if delivery_at <= pickup_at => Err(ApiError::invalid(
            "scheduled_delivery_at",
            "delivery must be scheduled after pickup",
        )),
        _ => Ok(()),
    }
}

pub async fn list_pickups(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PickupQuery>,
) -> ApiResult<Json<ApiResponse<Paginated<PickupAssignment>>>> {
    let (filter, page) = query.into_filter(&auth);

    let pickups = PickupAssignment::list(&state.db, &filter, page.limit(), page.offset()).await?;
    let total = PickupAssignment::count(&state.db, &filter).await?;

    Ok(ApiResponse::ok(Paginated::new(pickups, page, total)))
}

/// Assign a volunteer to a claimed donation
///
/// ```text
/// POST /v1/pickups
///
/// {
///   "donation_id": "...",
///   "volunteer_id": "...",
///   "scheduled_pickup_at": "2024-06-01T15:00:00Z"
/// }
/// ```
///
/// # Errors
///
/// - `403 Forbidden`: caller doesn't hold the claim, or a volunteer assigning someone else
/// - `409 Conflict`: donation not claimed, or already has an active run
/// - `422 Unprocessable Entity`: volunteer unknown or inactive, no delivery location
pub async fn create_pickup(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    JsonBody(req): JsonBody<CreatePickupRequest>,
) -> ApiResult<Json<ApiResponse<PickupAssignment>>> {
    req.validate()?;
    check_schedule(req.scheduled_pickup_at, req.scheduled_delivery_at)?;

    let volunteer_id = match (req.volunteer_id, auth.role) {
        (Some(id), _) => id,
        (None, UserRole::Volunteer) => auth.user_id,
        (None, _) => return Err(ApiError::invalid("volunteer_id", "volunteer_id is required")),
    };

    let donation = FoodDonation::find_by_id(&state.db, req.donation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Donation not found".to_string()))?;
    can_assign_pickup(&auth, &donation, volunteer_id)?;

    let volunteer = User::find_by_id(&state.db, volunteer_id).await?;
    match volunteer {
        Some(v) if v.role == UserRole::Volunteer && v.is_active => {}
        _ => {
            return Err(ApiError::invalid(
                "volunteer_id",
                "volunteer not found or not active",
            ))
        }
    }

    let recipient = match donation.claimed_by {
        Some(ngo_id) => User::find_by_id(&state.db, ngo_id).await?,
        None => None,
    };
    let delivery_location = delivery_point(req.delivery_location, recipient.as_ref())?;

    let pickup = PickupAssignment::create(
        &state.db,
        CreatePickup {
            donation_id: donation.id,
            volunteer_id,
            assigned_by: auth.user_id,
            scheduled_pickup_at: req.scheduled_pickup_at,
            scheduled_delivery_at: req.scheduled_delivery_at,
            delivery_location,
            notes: req.notes,
        },
    )
    .await?;

    tracing::info!(
        pickup_id = %pickup.id,
        donation_id = %pickup.donation_id,
        volunteer_id = %volunteer_id,
        assigned_by = %auth.user_id,
        "Pickup assigned"
    );

    notify::pickup_assigned(&state.db, &pickup, auth.user_id);
    Ok(ApiResponse::with_message(pickup, "Pickup assigned"))
}

pub async fn get_pickup(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<PickupAssignment>>> {
    let pickup = load(&state, id).await?;
    can_view_pickup(&auth, &pickup)?;
    Ok(ApiResponse::ok(pickup))
}

/// Advance or cancel a run
///
/// `picked_up` and `delivered` carry evidence and have their own endpoints;
/// `completed` may also be reached through `/complete`. A cancelled run sends
/// the donation back to `claimed` so a new volunteer can be assigned.
pub async fn set_pickup_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<SetPickupStatusRequest>,
) -> ApiResult<Json<ApiResponse<PickupAssignment>>> {
    req.validate()?;
    if matches!(req.status, PickupStatus::PickedUp | PickupStatus::Delivered) {
        return Err(ApiError::BadRequest(format!(
            "Use the verification endpoint to mark a pickup {}",
            req.status.as_str()
        )));
    }

    let current = load(&state, id).await?;
    can_set_pickup_status(&auth, &current, req.status)?;

    let reason = if req.status == PickupStatus::Cancelled {
        req.cancellation_reason
    } else {
        None
    };
    let pickup = PickupAssignment::transition(&state.db, id, req.status, reason).await?;

    tracing::info!(
        pickup_id = %id,
        actor_id = %auth.user_id,
        from = current.status.as_str(),
        to = pickup.status.as_str(),
        "Pickup status changed"
    );

    notify::pickup_status_changed(&state.db, &pickup, auth.user_id);
    Ok(ApiResponse::ok(pickup))
}

/// Record the volunteer's current position while on the road
pub async fn record_location(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    JsonBody(point): JsonBody<GeoPoint>,
) -> ApiResult<Json<ApiResponse<PickupAssignment>>> {
    point.check()?;
    let current = load(&state, id).await?;
    can_track_pickup(&auth, &current)?;

    let pickup = PickupAssignment::record_location(&state.db, id, point)
        .await?
        .ok_or_else(|| {
            ApiError::Conflict("Location can only be recorded while the run is underway".to_string())
        })?;

    tracing::debug!(pickup_id = %id, "Location recorded");
    Ok(ApiResponse::ok(pickup))
}

/// Evidence at the donor; moves the run to `picked_up` and the donation to `in_transit`
pub async fn verify_pickup(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<VerificationRequest>,
) -> ApiResult<Json<ApiResponse<PickupAssignment>>> {
    req.validate()?;
    let current = load(&state, id).await?;
    can_track_pickup(&auth, &current)?;

    let pickup = PickupAssignment::verify_pickup(&state.db, id, req.into_verification()).await?;
    tracing::info!(pickup_id = %id, volunteer_id = %pickup.volunteer_id, "Pickup verified");

    notify::pickup_status_changed(&state.db, &pickup, auth.user_id);
    Ok(ApiResponse::with_message(pickup, "Pickup verified"))
}

/// Evidence at the recipient; moves the run and the donation to `delivered`
pub async fn verify_delivery(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<VerificationRequest>,
) -> ApiResult<Json<ApiResponse<PickupAssignment>>> {
    req.validate()?;
    let current = load(&state, id).await?;
    can_track_pickup(&auth, &current)?;

    let pickup = PickupAssignment::verify_delivery(&state.db, id, req.into_verification()).await?;
    tracing::info!(pickup_id = %id, volunteer_id = %pickup.volunteer_id, "Delivery verified");

    notify::pickup_status_changed(&state.db, &pickup, auth.user_id);
    Ok(ApiResponse::with_message(pickup, "Delivery verified"))
}

/// Close a delivered run
///
/// The body is optional; when it carries a rating, the rating is stored in
/// the caller's slot together with the status change. A body that is present
/// but malformed is refused rather than ignored.
pub async fn complete_pickup(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    OptionalJsonBody(body): OptionalJsonBody<CompleteRequest>,
) -> ApiResult<Json<ApiResponse<PickupAssignment>>> {
    let req = body.unwrap_or_default();
    req.validate()?;

    let current = load(&state, id).await?;
    can_set_pickup_status(&auth, &current, PickupStatus::Completed)?;

    let rating = match req.rating {
        Some(rating) => Some((rating_side(&auth, &current)?, rating.into_rating())),
        None => None,
    };

    let pickup = PickupAssignment::complete(&state.db, id, rating).await?;
    tracing::info!(pickup_id = %id, actor_id = %auth.user_id, "Pickup completed");

    notify::pickup_status_changed(&state.db, &pickup, auth.user_id);
    Ok(ApiResponse::with_message(pickup, "Pickup completed"))
}

/// Rate the volunteer after completion, once per side
pub async fn rate_pickup(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<RatingRequest>,
) -> ApiResult<Json<ApiResponse<PickupAssignment>>> {
    req.validate()?;
    let current = load(&state, id).await?;
    let side = rating_side(&auth, &current)?;

    let pickup = PickupAssignment::rate(&state.db, id, side, req.into_rating()).await?;
    tracing::info!(pickup_id = %id, side = ?side, "Pickup rated");

    Ok(ApiResponse::with_message(pickup, "Rating recorded"))
}
