//! Geodetic value types and distance calculations.
//!
//! This crate's `Location` identity and tolerance rules (6-decimal rounding
//! for equality, 1e-4 degrees for "same point" matches) are defined directly
//! in lat/lon space, with no cell-grid index in between.

use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};

use lru::LruCache;
use serde::{Deserialize, Serialize};

/// A geodetic pair. Compared with 6-decimal rounding for identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Location { lat, lon }
    }

    fn rounded_key(self) -> (i64, i64) {
        ((self.lat * 1e6).round() as i64, (self.lon * 1e6).round() as i64)
    }

    /// Coordinate-match used by the routing engine to find a passenger's
    /// pickup entry in a route: agreement within 1e-4 degrees (~11 m).
    pub fn approx_eq(self, other: Location) -> bool {
        (self.lat - other.lat).abs() < 1e-4 && (self.lon - other.lon).abs() < 1e-4
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.rounded_key() == other.rounded_key()
    }
}

impl Eq for Location {}

impl std::hash::Hash for Location {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.rounded_key().hash(state);
    }
}

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometers, uncached.
pub fn haversine_km(a: Location, b: Location) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

fn get_distance_cache() -> &'static Mutex<LruCache<((i64, i64), (i64, i64)), f64>> {
    static CACHE: OnceLock<Mutex<LruCache<((i64, i64), (i64, i64)), f64>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(LruCache::new(
            NonZeroUsize::new(10_000).expect("cache size must be non-zero"),
        ))
    })
}

/// Haversine distance with a process-wide LRU cache, keyed symmetrically on
/// the 6-decimal-rounded coordinates (teacher's `distance_km_between_cells`
/// pattern, generalized off H3 cell indices).
pub fn distance_km(a: Location, b: Location) -> f64 {
    let ka = a.rounded_key();
    let kb = b.rounded_key();
    let key = if ka <= kb { (ka, kb) } else { (kb, ka) };

    let mut cache = get_distance_cache().lock().unwrap();
    *cache.get_or_insert(key, || haversine_km(a, b))
}

/// Degrees-per-km factor used by the destination clusterer to convert a
/// radius in kilometers to an epsilon in degrees.
pub const DEGREES_PER_KM: f64 = 1.0 / 111.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_points_have_zero_distance() {
        let a = Location::new(19.0, 72.8);
        assert_eq!(distance_km(a, a), 0.0);
    }

    #[test]
    fn rounding_identity_ignores_sub_micro_degree_noise() {
        let a = Location::new(19.000_0001, 72.800_0001);
        let b = Location::new(19.000_0002, 72.800_0002);
        assert_eq!(a, b);
    }

    #[test]
    fn approx_eq_tolerance_is_one_ten_thousandth_degree() {
        let a = Location::new(19.0, 72.8);
        let b = Location::new(19.00009, 72.8);
        assert!(a.approx_eq(b));
        let c = Location::new(19.0002, 72.8);
        assert!(!a.approx_eq(c));
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Location::new(19.0, 72.8);
        let b = Location::new(19.1, 72.9);
        assert!((distance_km(a, b) - distance_km(b, a)).abs() < 1e-9);
    }
}
