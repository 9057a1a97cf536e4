//! Geolocation points and great-circle distance
//!
//! Donations carry a required pickup point, users an optional home point, and
//! pickup routes record points along the way. Radius searches in SQL use the
//! same haversine formula as [`GeoPoint::distance_km`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean earth radius used by the haversine formula
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Error, PartialEq)]
pub enum GeoError {
    #[error("latitude must be between -90 and 90, got {0}")]
    LatitudeOutOfRange(f64),

    #[error("longitude must be between -180 and 180, got {0}")]
    LongitudeOutOfRange(f64),
}

/// A WGS84 point in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a point, rejecting out-of-range coordinates
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        let point = Self {
            latitude,
            longitude,
        };
        point.check()?;
        Ok(point)
    }

    /// Validates a point that came in through deserialization
    pub fn check(&self) -> Result<(), GeoError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(GeoError::LatitudeOutOfRange(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(GeoError::LongitudeOutOfRange(self.longitude));
        }
        Ok(())
    }

    /// Builds a point from a nullable column pair
    pub fn from_columns(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Self {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    /// Haversine distance to `other` in kilometres
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlng = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c
    }
}

/// Renders the haversine distance in km between two column pairs as SQL
///
/// All four arguments are interpolated verbatim; pass column names or
/// positional placeholders such as `$3`.
pub fn haversine_sql(lat_a: &str, lng_a: &str, lat_b: &str, lng_b: &str) -> String {
    format!(
        "({r} * 2 * ASIN(SQRT(POWER(SIN(RADIANS({lat_b} - {lat_a}) / 2), 2) \
         + COS(RADIANS({lat_a})) * COS(RADIANS({lat_b})) \
         * POWER(SIN(RADIANS({lng_b} - {lng_a}) / 2), 2))))",
        r = EARTH_RADIUS_KM,
        lat_a = lat_a,
        lng_a = lng_a,
        lat_b = lat_b,
        lng_b = lng_b,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_ranges() {
        assert!(GeoPoint::new(45.0, 120.0).is_ok());
        assert!(GeoPoint::new(90.0, -180.0).is_ok());
        assert_eq!(
            GeoPoint::new(91.0, 0.0),
            Err(GeoError::LatitudeOutOfRange(91.0))
        );
        assert_eq!(
            GeoPoint::new(0.0, -180.5),
            Err(GeoError::LongitudeOutOfRange(-180.5))
        );
    }

    #[test]
    fn test_distance_zero() {
        let p = GeoPoint::new(12.97, 77.59).unwrap();
        assert!(p.distance_km(&p).abs() < 1e-9);
    }

    #[test]
    fn test_distance_known_pair() {
        // London to Paris is roughly 344 km
        let london = GeoPoint::new(51.5074, -0.1278).unwrap();
        let paris = GeoPoint::new(48.8566, 2.3522).unwrap();
        let d = london.distance_km(&paris);
        assert!((d - 343.5).abs() < 2.0, "distance was {}", d);
        assert!((paris.distance_km(&london) - d).abs() < 1e-9);
    }

    #[test]
    fn test_from_columns() {
        assert!(GeoPoint::from_columns(Some(1.0), None).is_none());
        assert_eq!(
            GeoPoint::from_columns(Some(1.0), Some(2.0)),
            Some(GeoPoint {
                latitude: 1.0,
                longitude: 2.0
            })
        );
    }

    #[test]
    fn test_haversine_sql_shape() {
        let sql = haversine_sql("latitude", "longitude", "$1", "$2");
        assert!(sql.starts_with("(6371 * 2 * ASIN("));
        assert!(sql.contains("RADIANS($1 - latitude)"));
        assert!(sql.contains("RADIANS($2 - longitude)"));
    }
}
