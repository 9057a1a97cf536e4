/// Database models for FoodBridge
///
/// Each model owns its table and exposes its SQL as associated functions.
///
/// # Models
///
/// - `user`: Accounts for donors, NGOs, volunteers and admins
/// - `donation`: Food listings and their lifecycle
/// - `pickup`: Volunteer assignments coupled to the donation lifecycle
/// - `notification`: In-app notifications
/// - `audit`: Administrative audit trail
/// - `impact`: Read-only aggregates for analytics
///
/// # Example
///
/// ```no_run
/// use foodbridge_shared::models::donation::{DonationFilter, DonationStatus, FoodDonation};
/// use foodbridge_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let filter = DonationFilter {
///     status: Some(DonationStatus::Available),
///     ..Default::default()
/// };
/// let open = FoodDonation::list(&pool, &filter, 20, 0).await?;
/// # Ok(())
/// # }
/// ```

pub mod audit;
pub mod donation;
pub mod impact;
pub mod notification;
pub mod pickup;
pub mod user;
