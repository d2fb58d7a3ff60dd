//! Append-only variant storage.

use splitway_core::{Track, VariantSpec};

/// Variants of one routemap, addressed by the [`Track`] they were given.
///
/// There is no way to remove or reorder entries, so a track keeps naming
/// the same variant for as long as the arena lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantArena {
    variants: Vec<VariantSpec>,
}

impl VariantArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a variant and return its track.
    pub fn push(&mut self, variant: VariantSpec) -> Track {
        let track = Track::new(self.variants.len() as u32);
        self.variants.push(variant);
        track
    }

    pub fn get(&self, track: Track) -> Option<&VariantSpec> {
        self.variants.get(track.index())
    }

    /// Replace the declared weight of an existing track.
    pub fn set_weight(&mut self, track: Track, weight: Option<u32>) -> bool {
        match self.variants.get_mut(track.index()) {
            Some(variant) => {
                variant.weight = weight;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Track, &VariantSpec)> {
        self.variants
            .iter()
            .enumerate()
            .map(|(i, v)| (Track::new(i as u32), v))
    }

    pub fn as_slice(&self) -> &[VariantSpec] {
        &self.variants
    }
}

impl FromIterator<VariantSpec> for VariantArena {
    fn from_iter<I: IntoIterator<Item = VariantSpec>>(iter: I) -> Self {
        let mut arena = VariantArena::new();
        for variant in iter {
            arena.push(variant);
        }
        arena
    }
}
