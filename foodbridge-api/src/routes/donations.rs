/// Donation listing endpoints
///
/// - `GET    /v1/donations` - List donations (filters, radius search)
/// - `POST   /v1/donations` - Create a listing (donor)
/// - `GET    /v1/donations/:id` - Get a donation
/// - `PUT    /v1/donations/:id` - Edit a listing (donor, before claim)
/// - `DELETE /v1/donations/:id` - Delete a listing (donor or admin)
/// - `POST   /v1/donations/:id/claim` - Claim (NGO)
/// - `POST   /v1/donations/:id/release` - Release a claim (claiming NGO)
/// - `PUT    /v1/donations/:id/verify` - Approve or reject (NGO or admin)
/// - `PUT    /v1/donations/:id/status` - Status change, `force` for admins
/// - `POST   /v1/donations/:id/feedback` - Recipient feedback after delivery

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{JsonBody, Path, Query},
    notify,
    response::{ApiResponse, PageParams, Paginated},
    routes::{audit, nullable},
};
use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use foodbridge_shared::{
    auth::{
        authorization::{
            can_edit_donation, can_release_claim, can_set_donation_status, can_submit_feedback,
            require_admin, require_role,
        },
        middleware::AuthContext,
    },
    geo::GeoPoint,
    models::{
        audit::{actions, resource_types, NewAuditLog},
        donation::{
            check_pickup_window, CreateDonation, DonationFilter, DonationStatus, FoodCategory,
            FoodDonation, QuantityUnit, SafetyChecklist, StorageRequirement, UpdateDonation,
        },
        pickup::PickupAssignment,
        user::UserRole,
    },
    urgency::UrgencyLevel,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

/// Radius used when `lat`/`lng` are given without `radius_km`
const DEFAULT_RADIUS_KM: f64 = 10.0;
const MAX_RADIUS_KM: f64 = 500.0;

#[derive(Debug, Default, Deserialize)]
pub struct DonationQuery {
    pub status: Option<DonationStatus>,
    pub category: Option<FoodCategory>,
    pub urgency: Option<UrgencyLevel>,
    pub donor_id: Option<Uuid>,
    pub claimed_by: Option<Uuid>,

    /// Only the caller's own listings (donor) or claims (NGO)
    pub mine: Option<bool>,

    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_km: Option<f64>,

    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl DonationQuery {
    /// Builds the store filter, scoping donors to their own listings
    fn into_filter(self, auth: &AuthContext) -> ApiResult<(DonationFilter, PageParams)> {
        let near = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => {
                let point = GeoPoint::new(lat, lng)?;
                let radius = self.radius_km.unwrap_or(DEFAULT_RADIUS_KM);
                if !(radius > 0.0 && radius <= MAX_RADIUS_KM) {
                    return Err(ApiError::invalid(
                        "radius_km",
                        format!("radius must be greater than 0 and at most {}", MAX_RADIUS_KM),
                    ));
                }
                Some((point, radius))
            }
            (None, None) => None,
            _ => {
                return Err(ApiError::BadRequest(
                    "lat and lng must be given together".to_string(),
                ))
            }
        };

        let mine = self.mine.unwrap_or(false);
        let mut filter = DonationFilter {
            status: self.status,
            category: self.category,
            urgency: self.urgency,
            donor_id: self.donor_id,
            claimed_by: self.claimed_by,
            near,
        };

        match auth.role {
            UserRole::Donor => filter.donor_id = Some(auth.user_id),
            UserRole::Ngo if mine => filter.claimed_by = Some(auth.user_id),
            _ => {}
        }

        let page = PageParams {
            page: self.page,
            limit: self.limit,
        };
        Ok((filter, page))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDonationRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,

    pub category: FoodCategory,

    #[validate(range(exclusive_min = 0.0, message = "Quantity must be greater than 0"))]
    pub quantity: f64,

    pub unit: QuantityUnit,
    pub expiry_date: DateTime<Utc>,
    pub prepared_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub storage: StorageRequirement,

    #[serde(default)]
    #[validate(length(max = 20, message = "At most 20 dietary tags"))]
    pub dietary_tags: Vec<String>,

    #[serde(default)]
    #[validate(length(max = 20, message = "At most 20 allergens"))]
    pub allergens: Vec<String>,

    #[validate(length(min = 1, max = 500, message = "Pickup address must be 1-500 characters"))]
    pub pickup_address: String,

    pub location: GeoPoint,
    pub pickup_window_start: Option<DateTime<Utc>>,
    pub pickup_window_end: Option<DateTime<Utc>>,

    #[validate(length(max = 1000, message = "Instructions must be at most 1000 characters"))]
    pub pickup_instructions: Option<String>,

    #[serde(default)]
    pub safety_checklist: SafetyChecklist,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateDonationRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<Option<String>>,

    pub category: Option<FoodCategory>,

    #[validate(range(exclusive_min = 0.0, message = "Quantity must be greater than 0"))]
    pub quantity: Option<f64>,

    pub unit: Option<QuantityUnit>,
    pub expiry_date: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "nullable")]
    pub prepared_at: Option<Option<DateTime<Utc>>>,

    pub storage: Option<StorageRequirement>,

    #[validate(length(max = 20, message = "At most 20 dietary tags"))]
    pub dietary_tags: Option<Vec<String>>,

    #[validate(length(max = 20, message = "At most 20 allergens"))]
    pub allergens: Option<Vec<String>>,

    #[validate(length(min = 1, max = 500, message = "Pickup address must be 1-500 characters"))]
    pub pickup_address: Option<String>,

    pub location: Option<GeoPoint>,

    #[serde(default, deserialize_with = "nullable")]
    pub pickup_window_start: Option<Option<DateTime<Utc>>>,

    #[serde(default, deserialize_with = "nullable")]
    pub pickup_window_end: Option<Option<DateTime<Utc>>>,

    #[serde(default, deserialize_with = "nullable")]
    #[validate(length(max = 1000, message = "Instructions must be at most 1000 characters"))]
    pub pickup_instructions: Option<Option<String>>,

    pub safety_checklist: Option<SafetyChecklist>,
}

impl UpdateDonationRequest {
    fn into_changes(self) -> UpdateDonation {
        UpdateDonation {
            title: self.title,
            description: self.description,
            category: self.category,
            quantity: self.quantity,
            unit: self.unit,
            expiry_date: self.expiry_date,
            prepared_at: self.prepared_at,
            storage: self.storage,
            dietary_tags: self.dietary_tags,
            allergens: self.allergens,
            pickup_address: self.pickup_address,
            location: self.location,
            pickup_window_start: self.pickup_window_start,
            pickup_window_end: self.pickup_window_end,
            pickup_instructions: self.pickup_instructions,
            safety_checklist: self.safety_checklist,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyDonationRequest {
    pub approved: bool,

    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,

    /// Approve straight to `available`; false stops at `verified`
    #[serde(default = "default_publish")]
    pub publish: bool,
}

fn default_publish() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: DonationStatus,

    /// Skip the transition table (admin only, audited)
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FeedbackRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,

    #[validate(length(max = 1000, message = "Comment must be at most 1000 characters"))]
    pub comment: Option<String>,
}

fn check_future_expiry(expiry: DateTime<Utc>) -> ApiResult<()> {
    if expiry <= Utc::now() {
        return Err(ApiError::invalid(
            "expiry_date",
            "expiry date must be in the future",
        ));
    }
    Ok(())
}

fn window_error(message: String) -> ApiError {
    ApiError::invalid("pickup_window", message)
}

async fn load(state: &AppState, id: Uuid) -> ApiResult<FoodDonation> {
    FoodDonation::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Donation not found".to_string()))
}

/// List donations
///
/// Donors only ever see their own listings. Everyone else may filter freely;
/// `mine=true` narrows an NGO to its claims.
///
/// ```text
/// GET /v1/donations?status=available&lat=40.71&lng=-74.0&radius_km=5&page=1&limit=20
/// ```
pub async fn list_donations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<DonationQuery>,
) -> ApiResult<Json<ApiResponse<Paginated<FoodDonation>>>> {
    let (filter, page) = query.into_filter(&auth)?;

    let donations = FoodDonation::list(&state.db, &filter, page.limit(), page.offset()).await?;
    let total = FoodDonation::count(&state.db, &filter).await?;

    Ok(ApiResponse::ok(Paginated::new(donations, page, total)))
}

/// Create a listing in `pending` status
///
/// # Errors
///
/// - `403 Forbidden`: caller is not a donor
/// - `422 Unprocessable Entity`: validation failed, expiry in the past,
///   window out of order, coordinates out of range
pub async fn create_donation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    JsonBody(req): JsonBody<CreateDonationRequest>,
) -> ApiResult<Json<ApiResponse<FoodDonation>>> {
    require_role(&auth, &[UserRole::Donor])?;
    req.validate()?;
    req.location.check()?;
    check_future_expiry(req.expiry_date)?;
    check_pickup_window(req.pickup_window_start, req.pickup_window_end).map_err(window_error)?;

    let donation = FoodDonation::create(
        &state.db,
        CreateDonation {
            donor_id: auth.user_id,
            title: req.title,
            description: req.description,
            category: req.category,
            quantity: req.quantity,
            unit: req.unit,
            expiry_date: req.expiry_date,
            prepared_at: req.prepared_at,
            storage: req.storage,
            dietary_tags: req.dietary_tags,
            allergens: req.allergens,
            pickup_address: req.pickup_address,
            location: req.location,
            pickup_window_start: req.pickup_window_start,
            pickup_window_end: req.pickup_window_end,
            pickup_instructions: req.pickup_instructions,
            safety_checklist: req.safety_checklist,
        },
    )
    .await?;

    tracing::info!(
        donation_id = %donation.id,
        donor_id = %auth.user_id,
        urgency = %donation.urgency_level,
        "Donation created"
    );

    Ok(ApiResponse::with_message(donation, "Donation created"))
}

pub async fn get_donation(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<FoodDonation>>> {
    Ok(ApiResponse::ok(load(&state, id).await?))
}

/// Edit a listing while it is still pending, verified or available
///
/// The pickup window is re-checked against the stored end that isn't being
/// changed.
pub async fn update_donation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<UpdateDonationRequest>,
) -> ApiResult<Json<ApiResponse<FoodDonation>>> {
    let current = load(&state, id).await?;
    can_edit_donation(&auth, &current)?;

    req.validate()?;
    if let Some(point) = &req.location {
        point.check()?;
    }
    if let Some(expiry) = req.expiry_date {
        check_future_expiry(expiry)?;
    }
    let start = req
        .pickup_window_start
        .unwrap_or(current.pickup_window_start);
    let end = req.pickup_window_end.unwrap_or(current.pickup_window_end);
    check_pickup_window(start, end).map_err(window_error)?;

    if !current.status.is_editable() {
        return Err(ApiError::Conflict(format!(
            "Donation can no longer be edited (status is {})",
            current.status
        )));
    }

    let donation = FoodDonation::update(&state.db, id, req.into_changes())
        .await?
        .ok_or_else(|| ApiError::Conflict("Donation can no longer be edited".to_string()))?;

    Ok(ApiResponse::with_message(donation, "Donation updated"))
}

/// Delete a listing that is not in flight
///
/// Admin deletions of someone else's listing are audited.
pub async fn delete_donation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let current = load(&state, id).await?;
    can_edit_donation(&auth, &current)?;

    if !current.status.is_deletable() {
        return Err(ApiError::Conflict(format!(
            "Donation cannot be deleted while {}",
            current.status
        )));
    }

    if !FoodDonation::delete(&state.db, id).await? {
        return Err(ApiError::Conflict(
            "Donation changed status and can no longer be deleted".to_string(),
        ));
    }

    if auth.user_id != current.donor_id {
        audit::record(
            &state,
            NewAuditLog {
                actor_id: auth.user_id,
                action: actions::DONATION_DELETE,
                resource_type: resource_types::DONATION,
                resource_id: Some(id),
                details: json!({
                    "donor_id": current.donor_id,
                    "title": current.title,
                    "status": current.status,
                }),
            },
        )
        .await;
    }

    tracing::info!(donation_id = %id, actor_id = %auth.user_id, "Donation deleted");
    Ok(ApiResponse::with_message((), "Donation deleted"))
}

/// Claim an available donation for the calling NGO
///
/// Exactly one of several concurrent claims succeeds; the rest get 409.
pub async fn claim_donation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<FoodDonation>>> {
    require_role(&auth, &[UserRole::Ngo])?;

    let donation = FoodDonation::claim(&state.db, id, auth.user_id).await?;
    tracing::info!(donation_id = %id, ngo_id = %auth.user_id, "Donation claimed");

    notify::donation_claimed(&state.db, &donation);
    Ok(ApiResponse::with_message(donation, "Donation claimed"))
}

/// Return a claimed donation to the available pool
pub async fn release_donation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<FoodDonation>>> {
    let current = load(&state, id).await?;
    can_release_claim(&auth, &current)?;

    let donation = FoodDonation::release_claim(&state.db, id).await?;
    tracing::info!(donation_id = %id, actor_id = %auth.user_id, "Claim released");

    notify::donation_published(&state.db, &donation);
    Ok(ApiResponse::with_message(donation, "Claim released"))
}

/// Approve or reject a pending listing
///
/// ```text
/// PUT /v1/donations/:id/verify
///
/// { "approved": true, "notes": "Checked on site", "publish": true }
/// ```
///
/// # Errors
///
/// - `403 Forbidden`: caller is not an NGO or admin
/// - `409 Conflict`: not pending, or checklist incomplete on approval
pub async fn verify_donation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<VerifyDonationRequest>,
) -> ApiResult<Json<ApiResponse<FoodDonation>>> {
    require_role(&auth, &[UserRole::Ngo])?;
    req.validate()?;

    let donation = FoodDonation::verify(
        &state.db,
        id,
        auth.user_id,
        req.approved,
        req.publish,
        req.notes,
    )
    .await?;

    tracing::info!(
        donation_id = %id,
        verifier_id = %auth.user_id,
        approved = req.approved,
        status = %donation.status,
        "Donation verified"
    );

    audit::record(
        &state,
        NewAuditLog {
            actor_id: auth.user_id,
            action: actions::DONATION_VERIFY,
            resource_type: resource_types::DONATION,
            resource_id: Some(id),
            details: json!({
                "approved": req.approved,
                "status": donation.status,
                "notes": donation.verification_notes,
            }),
        },
    )
    .await;

    let published = donation.status == DonationStatus::Available;
    notify::donation_verified(&state.db, &donation, req.approved, published);

    let message = if req.approved {
        "Donation approved"
    } else {
        "Donation rejected"
    };
    Ok(ApiResponse::with_message(donation, message))
}

/// Status change outside the dedicated endpoints
///
/// Donors may publish a verified listing or cancel their own. Admins may
/// make any table-legal move, or any move at all with `force: true`.
/// Cancelling while a pickup is in progress is refused; cancel the pickup
/// first.
///
/// # Errors
///
/// - `400 Bad Request`: the move belongs to the pickup lifecycle (`assigned`,
///   `in_transit`, `delivered`, `completed`, or `assigned` back to `claimed`)
/// - `409 Conflict`: illegal move, lost race, or active pickup on cancel
pub async fn set_donation_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<SetStatusRequest>,
) -> ApiResult<Json<ApiResponse<FoodDonation>>> {
    if req.force {
        require_admin(&auth)?;
        let previous = load(&state, id).await?;

        let donation = FoodDonation::force_status(&state.db, id, req.status)
            .await?
            .ok_or_else(|| ApiError::NotFound("Donation not found".to_string()))?;

        tracing::warn!(
            donation_id = %id,
            admin_id = %auth.user_id,
            from = %previous.status,
            to = %donation.status,
            "Donation status forced"
        );

        audit::record(
            &state,
            NewAuditLog {
                actor_id: auth.user_id,
                action: actions::DONATION_FORCE_STATUS,
                resource_type: resource_types::DONATION,
                resource_id: Some(id),
                details: json!({ "from": previous.status, "to": donation.status }),
            },
        )
        .await;

        return Ok(ApiResponse::with_message(donation, "Status forced"));
    }

    if req.status.is_pickup_driven() {
        return Err(pickup_owned(req.status));
    }

    let current = load(&state, id).await?;
    if current.status.is_pickup_move(req.status) {
        return Err(pickup_owned(req.status));
    }
    can_set_donation_status(&auth, &current, req.status)?;

    if req.status == DonationStatus::Cancelled
        && PickupAssignment::find_active_by_donation(&state.db, id)
            .await?
            .is_some()
    {
        return Err(ApiError::Conflict(
            "Donation has an active pickup; cancel the pickup first".to_string(),
        ));
    }

    let donation = FoodDonation::transition(&state.db, id, req.status).await?;
    tracing::info!(
        donation_id = %id,
        actor_id = %auth.user_id,
        from = %current.status,
        to = %donation.status,
        "Donation status changed"
    );

    if donation.status == DonationStatus::Available {
        notify::donation_published(&state.db, &donation);
    }

    Ok(ApiResponse::ok(donation))
}

fn pickup_owned(target: DonationStatus) -> ApiError {
    ApiError::BadRequest(format!(
        "Donations move to {} through the pickup endpoints",
        target
    ))
}

/// Recipient feedback, once per donation, after delivery
pub async fn submit_feedback(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<FeedbackRequest>,
) -> ApiResult<Json<ApiResponse<FoodDonation>>> {
    req.validate()?;
    let current = load(&state, id).await?;
    can_submit_feedback(&auth, &current)?;

    let donation = FoodDonation::submit_feedback(&state.db, id, req.rating, req.comment).await?;

    notify::feedback_received(&state.db, &donation, req.rating);
    Ok(ApiResponse::with_message(donation, "Feedback submitted"))
}
