//! Destination clustering, equivalent to
//! `DBSCAN(eps=radius_km/111, min_samples=1)`.
//!
//! With `min_samples=1`, DBSCAN's core/border/noise distinction never
//! excludes a point (a singleton is always its own cluster), so the
//! result is exactly the connected components of the "within eps" graph
//! over the destinations -- single-linkage clustering. That's implemented
//! here with a union-find instead of pulling in a DBSCAN crate, since no
//! such crate appears anywhere in the example pack and the general DBSCAN
//! machinery (core-point/noise handling) would be dead code at
//! `min_samples=1`.

use std::collections::HashMap;

use bevy_ecs::prelude::{Entity, Resource};

use crate::geo::{distance_km, Location};

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

#[derive(Resource)]
pub struct DestinationClusterer {
    pub radius_km: f64,
}

impl Default for DestinationClusterer {
    fn default() -> Self {
        DestinationClusterer { radius_km: 1.0 }
    }
}

impl DestinationClusterer {
    pub fn new(radius_km: f64) -> Self {
        DestinationClusterer { radius_km }
    }

    /// Groups `requests` (entity, destination pairs) into clusters by
    /// destination proximity. Returns a map of synthetic cluster id to the
    /// entities placed in it.
    pub fn cluster_requests(&self, requests: &[(Entity, Location)]) -> HashMap<usize, Vec<Entity>> {
        let n = requests.len();
        let mut uf = UnionFind::new(n);

        for i in 0..n {
            for j in (i + 1)..n {
                if distance_km(requests[i].1, requests[j].1) <= self.radius_km {
                    uf.union(i, j);
                }
            }
        }

        let mut clusters: HashMap<usize, Vec<Entity>> = HashMap::new();
        for i in 0..n {
            let root = uf.find(i);
            clusters.entry(root).or_default().push(requests[i].0);
        }
        clusters
    }

    pub fn cluster_centroid(&self, destinations: &[Location]) -> Location {
        let n = destinations.len().max(1) as f64;
        let lat = destinations.iter().map(|d| d.lat).sum::<f64>() / n;
        let lon = destinations.iter().map(|d| d.lon).sum::<f64>() / n;
        Location::new(lat, lon)
    }

    /// Compatibility predicate used by dynamic insertion: destinations
    /// within the clustering radius are considered the same pool.
    pub fn are_compatible(&self, a: Location, b: Location) -> bool {
        distance_km(a, b) <= self.radius_km
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(id: u32) -> Entity {
        Entity::from_raw(id)
    }

    #[test]
    fn singletons_form_their_own_cluster() {
        let clusterer = DestinationClusterer::new(1.0);
        let far_apart = vec![
            (e(1), Location::new(19.0, 72.8)),
            (e(2), Location::new(20.0, 73.8)),
        ];
        let clusters = clusterer.cluster_requests(&far_apart);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn nearby_destinations_join_one_cluster() {
        let clusterer = DestinationClusterer::new(1.0);
        let close = vec![
            (e(1), Location::new(19.000, 72.800)),
            (e(2), Location::new(19.001, 72.801)),
            (e(3), Location::new(19.002, 72.802)),
        ];
        let clusters = clusterer.cluster_requests(&close);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters.values().next().unwrap().len(), 3);
    }

    #[test]
    fn chained_proximity_transitively_joins_clusters() {
        // A-B within radius, B-C within radius, A-C not directly -- still one cluster.
        let clusterer = DestinationClusterer::new(1.0);
        let chain = vec![
            (e(1), Location::new(19.0000, 72.8000)),
            (e(2), Location::new(19.0080, 72.8000)),
            (e(3), Location::new(19.0160, 72.8000)),
        ];
        let clusters = clusterer.cluster_requests(&chain);
        assert_eq!(clusters.len(), 1);
    }
}
