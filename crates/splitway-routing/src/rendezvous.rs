//! Rendezvous (highest-random-weight) track selection.
//!
//! Every track with a positive weight scores `hash(user, signature, track)`
//! and the highest score wins. The hash is FNV-1a over explicitly framed
//! bytes, finished with a SplitMix64 mixer, so scores are identical across
//! processes, platforms and releases.

use std::hash::Hasher;

use fnv::FnvHasher;
use splitway_core::{Signature, Track};

/// A track eligible for selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub track: Track,
    pub weight: u32,
    pub signature: Option<&'a Signature>,
}

const FIELD_SEPARATOR: u8 = 0xff;

fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Stable 64-bit score of a (user, signature, track) triple.
pub fn score(user: &str, signature: Option<&Signature>, track: Track) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(user.as_bytes());
    hasher.write(&[FIELD_SEPARATOR]);
    hasher.write(signature.map(Signature::as_str).unwrap_or_default().as_bytes());
    hasher.write(&[FIELD_SEPARATOR]);
    hasher.write(&track.get().to_be_bytes());
    mix64(hasher.finish())
}

/// Pick the winning track for `user`, or `None` if no candidate has weight.
///
/// Candidates are visited in ascending track order. A later candidate wins
/// only with a strictly greater (score, signature) pair, so full ties go to
/// the lower track whatever order the caller supplied.
pub fn select_track<'a>(
    candidates: impl IntoIterator<Item = Candidate<'a>>,
    user: &str,
) -> Option<Track> {
    let mut eligible: Vec<Candidate<'a>> =
        candidates.into_iter().filter(|c| c.weight > 0).collect();
    eligible.sort_by_key(|c| c.track);

    let mut best: Option<(u64, &str, Track)> = None;
    for candidate in eligible {
        let sig = candidate.signature.map(Signature::as_str).unwrap_or_default();
        let s = score(user, candidate.signature, candidate.track);
        let wins = match best {
            None => true,
            Some((best_score, best_sig, _)) => (s, sig) > (best_score, best_sig),
        };
        if wins {
            best = Some((s, sig, candidate.track));
        }
    }
    best.map(|(_, _, track)| track)
}
