//! Threshold policy: derives the optimal-policy wait-before-matching
//! duration from a request's Weibull patience distribution and the
//! cheapest driver type's economics, adjusted for current pool size.

use bevy_ecs::prelude::Resource;

use crate::ecs::DriverType;

#[derive(Resource)]
pub struct ThresholdPolicy {
    /// Driver types sorted by ascending `base_cost`.
    driver_types: Vec<DriverType>,
    quit_penalty: f64,
    /// Pooling adjustment factor, alpha.
    pooling_benefit_factor: f64,
}

impl ThresholdPolicy {
    pub fn new(driver_types: &[DriverType], quit_penalty: f64, pooling_benefit_factor: f64) -> Self {
        let mut sorted = driver_types.to_vec();
        sorted.sort_by(|a, b| a.base_cost.partial_cmp(&b.base_cost).unwrap());
        ThresholdPolicy {
            driver_types: sorted,
            quit_penalty,
            pooling_benefit_factor,
        }
    }

    fn base_threshold(&self, weibull_shape: f64, weibull_scale: f64, driver_type: &DriverType) -> f64 {
        let k = weibull_shape;
        let lam = weibull_scale;

        let rhs = if self.driver_types.len() < 2 {
            1.0 / (self.quit_penalty - driver_type.base_cost)
        } else {
            let next = &self.driver_types[1];
            let lambda_sum: f64 = self
                .driver_types
                .iter()
                .filter(|dt| dt.base_cost < next.base_cost)
                .map(|dt| dt.arrival_rate * (next.base_cost - dt.base_cost))
                .sum();
            ((lambda_sum - 1.0) / (self.quit_penalty - next.base_cost)).max(0.0)
        };

        let threshold = if (k - 1.0).abs() < 1e-12 {
            lam * rhs
        } else if rhs <= 0.0 {
            0.0
        } else {
            lam * (rhs * lam / k).powf(1.0 / (k - 1.0))
        };

        threshold.clamp(1.0, 600.0)
    }

    /// Threshold time for a request against the cheapest driver type,
    /// adjusted for current pool size.
    pub fn compute_threshold(&self, weibull_shape: f64, weibull_scale: f64, current_pool_size: u32, capacity: u32) -> f64 {
        let cheapest = &self.driver_types[0];
        let base = self.base_threshold(weibull_shape, weibull_scale, cheapest);
        let pooling_factor = 1.0 - self.pooling_benefit_factor * (current_pool_size.min(capacity) as f64) / capacity as f64;
        (base * pooling_factor).max(1.0)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(id: u32, base_cost: f64, arrival_rate: f64) -> DriverType {
        DriverType {
            id,
            name: format!("type-{id}"),
            base_cost,
            arrival_rate,
            speed_multiplier: 1.0,
        }
    }

    #[test]
    fn single_type_threshold_is_positive_and_clamped() {
        let policy = ThresholdPolicy::new(&[dt(1, 10.0, 0.05)], 50.0, 0.3);
        let t = policy.compute_threshold(1.5, 120.0, 0, 3);
        assert!((1.0..=600.0).contains(&t));
    }

    #[test]
    fn pooling_adjustment_lowers_threshold_as_pool_fills() {
        let policy = ThresholdPolicy::new(&[dt(1, 10.0, 0.05), dt(2, 20.0, 0.02)], 50.0, 0.3);
        let empty_pool = policy.compute_threshold(1.5, 120.0, 0, 3);
        let full_pool = policy.compute_threshold(1.5, 120.0, 3, 3);
        assert!(full_pool <= empty_pool);
    }

    #[test]
    fn exponential_shape_uses_linear_branch() {
        let policy = ThresholdPolicy::new(&[dt(1, 10.0, 0.05)], 50.0, 0.3);
        let t = policy.compute_threshold(1.0, 120.0, 0, 3);
        assert!(t >= 1.0);
    }
}
