//! Weight normalization.

use splitway_core::VariantSpec;

/// Weight of an available variant that declares none.
pub const DEFAULT_WEIGHT: u32 = 1;

/// Anything that carries a declared variant weight.
pub trait Weighted {
    fn explicit_weight(&self) -> Option<u32>;
}

impl Weighted for VariantSpec {
    fn explicit_weight(&self) -> Option<u32> {
        self.weight
    }
}

/// Turn availability and overrides into one weight per variant.
///
/// Unavailable variants get 0. Available ones take the override, else their
/// declared weight, else [`DEFAULT_WEIGHT`]. If everything comes out 0 the
/// first variant is forced to [`DEFAULT_WEIGHT`] so traffic always has
/// somewhere to go.
pub fn normalize_weights<V: Weighted>(
    variants: &[V],
    available: impl Fn(&V) -> bool,
    weight_override: impl Fn(&V) -> Option<u32>,
) -> Vec<u32> {
    let mut weights: Vec<u32> = variants
        .iter()
        .map(|v| {
            if !available(v) {
                0
            } else {
                weight_override(v)
                    .or_else(|| v.explicit_weight())
                    .unwrap_or(DEFAULT_WEIGHT)
            }
        })
        .collect();

    if weights.iter().all(|&w| w == 0) {
        if let Some(first) = weights.first_mut() {
            *first = DEFAULT_WEIGHT;
        }
    }
    weights
}
