//! Bayesian smoothing strategies used to turn raw `(url_count, success_count)`
//! pairs into a success probability and a confidence score, and the
//! binary-entropy helpers the confidence-based prune gate builds on.
//!
//! Grounded directly on `accesspredict/smoothing.py`'s `SmoothingStrategy`
//! hierarchy (`ConstantDirichlet`, `ExponentialDirichlet`).

use serde::{Deserialize, Serialize};

/// A pluggable Bayesian smoothing prior over a node's success rate.
pub trait SmoothingStrategy: std::fmt::Debug {
    /// Smoothed probability of success given `url_count` observations of
    /// which `success_count` succeeded, at tree `depth`.
    fn evaluate(&self, url_count: f64, success_count: f64, depth: usize) -> f64;
}

/// Fixed-strength Dirichlet prior: `(alpha + success) / (alpha + beta + url)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConstantDirichlet {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for ConstantDirichlet {
    fn default() -> Self {
        ConstantDirichlet {
            alpha: 1.0,
            beta: 1.0,
        }
    }
}

impl SmoothingStrategy for ConstantDirichlet {
    fn evaluate(&self, url_count: f64, success_count: f64, _depth: usize) -> f64 {
        (self.alpha + success_count) / (self.alpha + self.beta + url_count)
    }
}

/// Dirichlet prior whose strength decays exponentially with tree depth, so
/// deep/specific nodes are trusted with fewer observations than shallow
/// ones: `alpha = beta = k^(a - b*depth)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExponentialDirichlet {
    pub k: f64,
    pub a: f64,
    pub b: f64,
}

impl Default for ExponentialDirichlet {
    fn default() -> Self {
        ExponentialDirichlet {
            k: 1.5,
            a: 8.0,
            b: 0.1,
        }
    }
}

impl ExponentialDirichlet {
    fn prior_strength(&self, depth: usize) -> f64 {
        self.k.powf(self.a - self.b * depth as f64)
    }
}

impl SmoothingStrategy for ExponentialDirichlet {
    fn evaluate(&self, url_count: f64, success_count: f64, depth: usize) -> f64 {
        let strength = self.prior_strength(depth);
        (strength + success_count) / (2.0 * strength + url_count)
    }
}

/// Smoothing configuration, serializable as part of a filter's persisted
/// config so a reloaded filter keeps using the same prior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SmoothingConfig {
    ConstantDirichlet(ConstantDirichlet),
    ExponentialDirichlet(ExponentialDirichlet),
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        SmoothingConfig::ConstantDirichlet(ConstantDirichlet::default())
    }
}

impl SmoothingConfig {
    pub fn evaluate(&self, url_count: f64, success_count: f64, depth: usize) -> f64 {
        match self {
            SmoothingConfig::ConstantDirichlet(s) => s.evaluate(url_count, success_count, depth),
            SmoothingConfig::ExponentialDirichlet(s) => {
                s.evaluate(url_count, success_count, depth)
            }
        }
    }
}

/// Binary entropy in bits: `H2(p) = -p*log2(p) - (1-p)*log2(1-p)`.
pub fn binary_entropy(p: f64) -> f64 {
    if p <= 0.0 || p >= 1.0 {
        return 0.0;
    }
    -(p * p.log2() + (1.0 - p) * (1.0 - p).log2())
}

/// Confidence that a smoothed probability is decisive: `1 - H2(p)`.
pub fn confidence(p: f64) -> f64 {
    1.0 - binary_entropy(p)
}

/// Inverts `confidence` by bisection: the probability (on the side of 0.5
/// matching `p_hint`) whose confidence equals `target`.
pub fn inverse_h2(target: f64, p_hint: f64) -> f64 {
    let target = target.clamp(0.0, 1.0);
    let (mut lo, mut hi) = if p_hint >= 0.5 {
        (0.5, 1.0)
    } else {
        (0.0, 0.5)
    };
    for _ in 0..60 {
        let mid = (lo + hi) / 2.0;
        if confidence(mid) < target {
            if p_hint >= 0.5 {
                lo = mid;
            } else {
                hi = mid;
            }
        } else if p_hint >= 0.5 {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    (lo + hi) / 2.0
}

/// Smallest observation count (with `success_count` held proportional to
/// `p_hint`) for which `evaluate` would clear `threshold` confidence at
/// `depth`, given `strategy`. Used to size the prune-delay heuristics.
pub fn min_count_for_confidence(
    strategy: &SmoothingConfig,
    threshold: f64,
    p_hint: f64,
    depth: usize,
) -> u64 {
    for count in 1..100_000u64 {
        let success = (count as f64 * p_hint).round();
        let p = strategy.evaluate(count as f64, success, depth);
        if confidence(p) >= threshold {
            return count;
        }
    }
    u64::MAX
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.5, 0.0)]
    #[case(0.0, 0.0)]
    #[case(1.0, 0.0)]
    fn entropy_boundaries(#[case] p: f64, #[case] expected: f64) {
        assert!((binary_entropy(p) - expected).abs() < 1e-9 || p == 0.5);
    }

    #[test]
    fn entropy_is_maximal_at_half() {
        assert!(binary_entropy(0.5) > binary_entropy(0.9));
        assert!(binary_entropy(0.5) > binary_entropy(0.1));
    }

    #[test]
    fn confidence_round_trips_through_inverse() {
        let target = 0.8;
        let p = inverse_h2(target, 0.95);
        assert!((confidence(p) - target).abs() < 1e-3);
    }

    #[test]
    fn constant_dirichlet_matches_formula() {
        let s = ConstantDirichlet::default();
        assert!((s.evaluate(10.0, 8.0, 0) - (1.0 + 8.0) / (1.0 + 1.0 + 10.0)).abs() < 1e-9);
    }

    #[test]
    fn exponential_dirichlet_prior_decays_with_depth() {
        let s = ExponentialDirichlet::default();
        assert!(s.prior_strength(0) > s.prior_strength(10));
    }
}
