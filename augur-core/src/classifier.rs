//! Outcome classifier: continuous prediction to a discrete bucket.
//!
//! Tiers are listed from most to least severe. Each boundary is inclusive on its
//! lower bound and the first matching tier wins; anything below every boundary
//! (including NaN) falls into the floor label.

#[derive(Debug)]
pub struct RiskTiers {
    /// `(lower_bound, label)`, strictly descending by bound.
    pub tiers: &'static [(f64, &'static str)],
    pub floor: &'static str,
}

impl RiskTiers {
    pub const fn new(tiers: &'static [(f64, &'static str)], floor: &'static str) -> Self {
        Self { tiers, floor }
    }

    pub fn classify(&self, value: f64) -> &'static str {
        self.tiers
            .iter()
            .find(|(bound, _)| value >= *bound)
            .map(|(_, label)| *label)
            .unwrap_or(self.floor)
    }

    /// All labels from least to most severe.
    pub fn labels(&self) -> Vec<&'static str> {
        std::iter::once(self.floor)
            .chain(self.tiers.iter().rev().map(|(_, label)| *label))
            .collect()
    }

    /// Severity rank: 0 for the floor, increasing towards the top tier.
    pub fn rank(&self, label: &str) -> Option<usize> {
        self.labels().iter().position(|l| *l == label)
    }

    pub fn is_strictly_descending(&self) -> bool {
        self.tiers.windows(2).all(|w| w[0].0 > w[1].0)
    }
}

/// Round half away from zero to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
