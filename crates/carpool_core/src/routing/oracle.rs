//! Map Oracle client: point-to-point and multi-waypoint travel estimates
//! with a write-through cache.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;

use lru::LruCache;

use crate::geo::{distance_km, haversine_km, Location};

#[derive(Debug, Clone)]
pub struct RouteResult {
    pub waypoints: Vec<Location>,
    pub distance_km: f64,
    pub duration_secs: f64,
    /// Set when this result was produced by the haversine fallback rather
    /// than a live map-service response, so tests can detect degradation.
    pub is_fallback: bool,
}

/// Pure query interface into the map service.
pub trait MapOracle: Send + Sync {
    fn duration_secs(&self, a: Location, b: Location) -> f64;
    fn distance_km(&self, a: Location, b: Location) -> f64;
    fn route(&self, waypoints: &[Location]) -> RouteResult;
    /// `sources[i]` to `destinations[j]` duration matrix, seconds.
    fn matrix(&self, sources: &[Location], destinations: &[Location]) -> Vec<Vec<f64>>;

    fn cache_stats(&self) -> (u64, u64) {
        (0, 0)
    }
}

/// Always-available fallback: haversine distance at a configured average
/// speed. Used directly when no live map service is configured, and as
/// the degrade-to path for `CachedMapOracle` on transport failure.
#[derive(Debug, Clone)]
pub struct HaversineOracle {
    pub avg_speed_kmh: f64,
}

impl HaversineOracle {
    pub fn new(avg_speed_kmh: f64) -> Self {
        HaversineOracle { avg_speed_kmh }
    }
}

impl Default for HaversineOracle {
    fn default() -> Self {
        HaversineOracle { avg_speed_kmh: 40.0 }
    }
}

impl MapOracle for HaversineOracle {
    fn duration_secs(&self, a: Location, b: Location) -> f64 {
        let km = distance_km(a, b);
        (km / self.avg_speed_kmh) * 3600.0
    }

    fn distance_km(&self, a: Location, b: Location) -> f64 {
        distance_km(a, b)
    }

    fn route(&self, waypoints: &[Location]) -> RouteResult {
        let mut total_km = 0.0;
        for pair in waypoints.windows(2) {
            total_km += haversine_km(pair[0], pair[1]);
        }
        let duration_secs = (total_km / self.avg_speed_kmh) * 3600.0;
        RouteResult {
            waypoints: waypoints.to_vec(),
            distance_km: total_km,
            duration_secs,
            is_fallback: true,
        }
    }

    fn matrix(&self, sources: &[Location], destinations: &[Location]) -> Vec<Vec<f64>> {
        sources
            .iter()
            .map(|s| destinations.iter().map(|d| self.duration_secs(*s, *d)).collect())
            .collect()
    }
}

fn round6(l: Location) -> (i64, i64) {
    ((l.lat * 1e6).round() as i64, (l.lon * 1e6).round() as i64)
}

/// Write-through cache over an inner oracle, keyed on coordinates rounded
/// to 6 decimals, with least-recently-used eviction once the configured
/// capacity is exceeded. Hit and miss counters are monotonic regardless
/// of eviction policy.
pub struct CachedMapOracle {
    inner: Box<dyn MapOracle>,
    fallback: HaversineOracle,
    duration_cache: Mutex<LruCache<((i64, i64), (i64, i64)), f64>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedMapOracle {
    pub fn new(inner: Box<dyn MapOracle>, capacity: usize, fallback_avg_speed_kmh: f64) -> Self {
        CachedMapOracle {
            inner,
            fallback: HaversineOracle::new(fallback_avg_speed_kmh),
            duration_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl MapOracle for CachedMapOracle {
    fn duration_secs(&self, a: Location, b: Location) -> f64 {
        let ka = round6(a);
        let kb = round6(b);
        let key = if ka <= kb { (ka, kb) } else { (kb, ka) };

        {
            let mut cache = self.duration_cache.lock().unwrap();
            if let Some(v) = cache.get(&key) {
                self.hits.fetch_add(1, AtomicOrdering::Relaxed);
                return *v;
            }
        }
        self.misses.fetch_add(1, AtomicOrdering::Relaxed);
        let value = self.inner.duration_secs(a, b);
        let mut cache = self.duration_cache.lock().unwrap();
        cache.put(key, value);
        value
    }

    fn distance_km(&self, a: Location, b: Location) -> f64 {
        self.inner.distance_km(a, b)
    }

    fn route(&self, waypoints: &[Location]) -> RouteResult {
        self.inner.route(waypoints)
    }

    fn matrix(&self, sources: &[Location], destinations: &[Location]) -> Vec<Vec<f64>> {
        self.inner.matrix(sources, destinations)
    }

    fn cache_stats(&self) -> (u64, u64) {
        (
            self.hits.load(AtomicOrdering::Relaxed),
            self.misses.load(AtomicOrdering::Relaxed),
        )
    }
}

/// Blocking HTTP client against an OSRM-compatible map service.
#[cfg(feature = "osrm")]
pub mod osrm {
    use super::*;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Deserialize)]
    struct OsrmRouteResponse {
        code: String,
        routes: Option<Vec<OsrmRoute>>,
    }

    #[derive(Debug, Deserialize)]
    struct OsrmRoute {
        duration: f64,
        distance: f64,
    }

    #[derive(Debug, Deserialize)]
    struct OsrmTableResponse {
        code: String,
        durations: Option<Vec<Vec<Option<f64>>>>,
    }

    pub struct OsrmOracle {
        client: reqwest::blocking::Client,
        endpoint: String,
        fallback: HaversineOracle,
    }

    impl OsrmOracle {
        pub fn new(endpoint: impl Into<String>, timeout_ms: u64, fallback_avg_speed_kmh: f64) -> Self {
            let client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .expect("building OSRM http client");
            OsrmOracle {
                client,
                endpoint: endpoint.into(),
                fallback: HaversineOracle::new(fallback_avg_speed_kmh),
            }
        }

        fn route_url(&self, a: Location, b: Location) -> String {
            format!(
                "{}/route/v1/driving/{},{};{},{}?overview=false&geometries=geojson&steps=false",
                self.endpoint, a.lon, a.lat, b.lon, b.lat
            )
        }

        fn fetch_route(&self, a: Location, b: Location) -> Option<OsrmRoute> {
            let resp = self.client.get(self.route_url(a, b)).send().ok()?;
            let body: OsrmRouteResponse = resp.json().ok()?;
            if body.code != "Ok" {
                return None;
            }
            body.routes?.into_iter().next()
        }
    }

    impl MapOracle for OsrmOracle {
        fn duration_secs(&self, a: Location, b: Location) -> f64 {
            match self.fetch_route(a, b) {
                Some(r) => r.duration,
                None => {
                    eprintln!("map oracle: OSRM route lookup failed, falling back to haversine estimate");
                    self.fallback.duration_secs(a, b)
                }
            }
        }

        fn distance_km(&self, a: Location, b: Location) -> f64 {
            match self.fetch_route(a, b) {
                Some(r) => r.distance / 1000.0,
                None => self.fallback.distance_km(a, b),
            }
        }

        fn route(&self, waypoints: &[Location]) -> RouteResult {
            if waypoints.len() < 2 {
                return self.fallback.route(waypoints);
            }
            let coords: Vec<String> = waypoints.iter().map(|p| format!("{},{}", p.lon, p.lat)).collect();
            let url = format!(
                "{}/route/v1/driving/{}?overview=full&geometries=geojson",
                self.endpoint,
                coords.join(";")
            );
            let result = (|| -> Option<RouteResult> {
                let resp = self.client.get(&url).send().ok()?;
                let body: OsrmRouteResponse = resp.json().ok()?;
                if body.code != "Ok" {
                    return None;
                }
                let route = body.routes?.into_iter().next()?;
                Some(RouteResult {
                    waypoints: waypoints.to_vec(),
                    distance_km: route.distance / 1000.0,
                    duration_secs: route.duration,
                    is_fallback: false,
                })
            })();
            result.unwrap_or_else(|| {
                eprintln!("map oracle: OSRM multi-waypoint route failed, falling back to haversine estimate");
                self.fallback.route(waypoints)
            })
        }

        fn matrix(&self, sources: &[Location], destinations: &[Location]) -> Vec<Vec<f64>> {
            let mut all = sources.to_vec();
            let src_count = sources.len();
            all.extend_from_slice(destinations);
            let coords: Vec<String> = all.iter().map(|p| format!("{},{}", p.lon, p.lat)).collect();
            let src_idx: Vec<String> = (0..src_count).map(|i| i.to_string()).collect();
            let dst_idx: Vec<String> = (src_count..all.len()).map(|i| i.to_string()).collect();
            let url = format!(
                "{}/table/v1/driving/{}?sources={}&destinations={}",
                self.endpoint,
                coords.join(";"),
                src_idx.join(";"),
                dst_idx.join(";")
            );
            let result = (|| -> Option<Vec<Vec<f64>>> {
                let resp = self.client.get(&url).send().ok()?;
                let body: OsrmTableResponse = resp.json().ok()?;
                if body.code != "Ok" {
                    return None;
                }
                let durations = body.durations?;
                Some(
                    durations
                        .into_iter()
                        .map(|row| row.into_iter().map(|v| v.unwrap_or(f64::INFINITY)).collect())
                        .collect(),
                )
            })();
            result.unwrap_or_else(|| {
                eprintln!("map oracle: OSRM table lookup failed, falling back to pairwise haversine estimates");
                self.fallback.matrix(sources, destinations)
            })
        }
    }
}

/// Route table loaded once from disk at startup, keyed on 6-decimal-rounded
/// coordinate pairs. Degrades to haversine for any pair the table doesn't
/// cover, so a partial table is still usable.
#[cfg(feature = "precomputed")]
pub mod precomputed {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::fs;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    struct CoordPair((i64, i64), (i64, i64));

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct TableEntry {
        distance_km: f64,
        duration_secs: f64,
    }

    pub struct PrecomputedMapOracle {
        table: HashMap<CoordPair, TableEntry>,
        fallback: HaversineOracle,
        hits: AtomicU64,
        misses: AtomicU64,
    }

    impl PrecomputedMapOracle {
        /// Loads a bincode-serialized `HashMap<CoordPair, TableEntry>` built
        /// by `save_to_file`.
        pub fn from_file(path: &str, fallback_avg_speed_kmh: f64) -> Result<Self, crate::error::SimError> {
            let data = fs::read(path).map_err(|e| crate::error::SimError::PrecomputedTableLoad {
                path: path.to_string(),
                source: Box::new(bincode::ErrorKind::Io(e)),
            })?;
            let table: HashMap<CoordPair, TableEntry> =
                bincode::deserialize(&data).map_err(|e| crate::error::SimError::PrecomputedTableLoad {
                    path: path.to_string(),
                    source: e,
                })?;
            Ok(PrecomputedMapOracle {
                table,
                fallback: HaversineOracle::new(fallback_avg_speed_kmh),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            })
        }

        pub fn save_to_file(entries: &[(Location, Location, f64, f64)], path: &str) -> Result<(), crate::error::SimError> {
            let table: HashMap<CoordPair, TableEntry> = entries
                .iter()
                .map(|(a, b, distance_km, duration_secs)| {
                    (
                        CoordPair(round6(*a), round6(*b)),
                        TableEntry { distance_km: *distance_km, duration_secs: *duration_secs },
                    )
                })
                .collect();
            let data = bincode::serialize(&table).map_err(|e| crate::error::SimError::PrecomputedTableLoad {
                path: path.to_string(),
                source: e,
            })?;
            fs::write(path, data).map_err(|e| crate::error::SimError::PrecomputedTableLoad {
                path: path.to_string(),
                source: Box::new(bincode::ErrorKind::Io(e)),
            })
        }

        fn lookup(&self, a: Location, b: Location) -> Option<&TableEntry> {
            let ka = round6(a);
            let kb = round6(b);
            let key = if ka <= kb { CoordPair(ka, kb) } else { CoordPair(kb, ka) };
            self.table.get(&key)
        }
    }

    impl MapOracle for PrecomputedMapOracle {
        fn duration_secs(&self, a: Location, b: Location) -> f64 {
            match self.lookup(a, b) {
                Some(entry) => {
                    self.hits.fetch_add(1, AtomicOrdering::Relaxed);
                    entry.duration_secs
                }
                None => {
                    self.misses.fetch_add(1, AtomicOrdering::Relaxed);
                    self.fallback.duration_secs(a, b)
                }
            }
        }

        fn distance_km(&self, a: Location, b: Location) -> f64 {
            match self.lookup(a, b) {
                Some(entry) => entry.distance_km,
                None => self.fallback.distance_km(a, b),
            }
        }

        fn route(&self, waypoints: &[Location]) -> RouteResult {
            self.fallback.route(waypoints)
        }

        fn matrix(&self, sources: &[Location], destinations: &[Location]) -> Vec<Vec<f64>> {
            sources
                .iter()
                .map(|s| destinations.iter().map(|d| self.duration_secs(*s, *d)).collect())
                .collect()
        }

        fn cache_stats(&self) -> (u64, u64) {
            (
                self.hits.load(AtomicOrdering::Relaxed),
                self.misses.load(AtomicOrdering::Relaxed),
            )
        }
    }
}

/// Builds the configured oracle: a loaded route table when `precomputed_path`
/// is set (feature `precomputed`), else a cached OSRM client when
/// `server_url` is set (feature `osrm`), otherwise a plain
/// [`HaversineOracle`]. Called once per policy run -- `dual_driver`'s
/// comparison calls it twice so neither run's cache sees the other's
/// traffic.
pub fn build_map_oracle(config: &crate::config::MapOracleConfig) -> Box<dyn MapOracle> {
    #[cfg(feature = "precomputed")]
    if let Some(path) = &config.precomputed_path {
        return match precomputed::PrecomputedMapOracle::from_file(path, config.avg_speed_kmh) {
            Ok(oracle) => Box::new(oracle),
            Err(e) => {
                eprintln!("map oracle: failed to load precomputed route table ({e}), falling back to haversine estimates");
                Box::new(HaversineOracle::new(config.avg_speed_kmh))
            }
        };
    }
    #[cfg(not(feature = "precomputed"))]
    if config.precomputed_path.is_some() {
        eprintln!("map oracle: precomputed_path configured but the `precomputed` feature is disabled, falling back to haversine estimates");
    }

    match &config.server_url {
        #[cfg(feature = "osrm")]
        Some(endpoint) => {
            let inner = Box::new(osrm::OsrmOracle::new(endpoint.clone(), config.timeout_ms, config.avg_speed_kmh));
            Box::new(CachedMapOracle::new(inner, config.cache_size, config.avg_speed_kmh))
        }
        #[cfg(not(feature = "osrm"))]
        Some(_) => {
            eprintln!("map oracle: server_url configured but the `osrm` feature is disabled, falling back to haversine estimates");
            Box::new(HaversineOracle::new(config.avg_speed_kmh))
        }
        None => Box::new(HaversineOracle::new(config.avg_speed_kmh)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_oracle_duration_matches_speed_model() {
        let oracle = HaversineOracle::new(40.0);
        let a = Location::new(19.0, 72.8);
        let b = Location::new(19.1, 72.9);
        let km = distance_km(a, b);
        let expected_secs = (km / 40.0) * 3600.0;
        assert!((oracle.duration_secs(a, b) - expected_secs).abs() < 1e-9);
    }

    #[test]
    fn route_is_marked_as_fallback() {
        let oracle = HaversineOracle::default();
        let r = oracle.route(&[Location::new(19.0, 72.8), Location::new(19.1, 72.9)]);
        assert!(r.is_fallback);
    }

    #[test]
    fn cached_oracle_counts_hits_and_misses() {
        let cached = CachedMapOracle::new(Box::new(HaversineOracle::default()), 100, 40.0);
        let a = Location::new(19.0, 72.8);
        let b = Location::new(19.1, 72.9);
        let _ = cached.duration_secs(a, b);
        let _ = cached.duration_secs(a, b);
        let (hits, misses) = cached.cache_stats();
        assert_eq!(misses, 1);
        assert_eq!(hits, 1);
    }

    #[cfg(feature = "precomputed")]
    #[test]
    fn precomputed_oracle_round_trips_and_falls_back_on_miss() {
        use precomputed::PrecomputedMapOracle;

        let a = Location::new(19.0, 72.8);
        let b = Location::new(19.1, 72.9);
        let c = Location::new(19.2, 73.0);

        let path = std::env::temp_dir().join(format!("carpool_core_test_table_{}.bin", std::process::id()));
        let path_str = path.to_str().unwrap().to_string();
        PrecomputedMapOracle::save_to_file(&[(a, b, 12.3, 456.0)], &path_str).unwrap();

        let oracle = PrecomputedMapOracle::from_file(&path_str, 40.0).unwrap();
        assert_eq!(oracle.duration_secs(a, b), 456.0);
        assert_eq!(oracle.distance_km(b, a), 12.3);

        let fallback_expected = HaversineOracle::new(40.0).duration_secs(a, c);
        assert!((oracle.duration_secs(a, c) - fallback_expected).abs() < 1e-9);

        let (hits, misses) = oracle.cache_stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);

        std::fs::remove_file(&path_str).ok();
    }

    #[cfg(feature = "precomputed")]
    #[test]
    fn precomputed_oracle_missing_file_errors() {
        let result = precomputed::PrecomputedMapOracle::from_file("/nonexistent/path/table.bin", 40.0);
        assert!(result.is_err());
    }
}
