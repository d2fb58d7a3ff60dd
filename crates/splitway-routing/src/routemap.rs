//! Routemap: per-application weight table over an append-only variant list.
//!
//! Reconciliation recomputes weights and signatures from observed resource
//! state under the routemap's write lock. Lookups only take the read lock.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use splitway_core::{ApplicationKey, ResourceRef, RoutemapSpec, Signature, Track, VariantSpec};
use tracing::{debug, info, warn};

use crate::error::{RoutingError, RoutingResult};
use crate::inspector::{ResourceInspector, WEIGHT_ANNOTATION};
use crate::rendezvous::{Candidate, select_track};
use crate::variant::VariantArena;
use crate::weights::{Weighted, normalize_weights};

/// Track chosen for a user together with its current generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub track: Track,
    /// `None` until the track's resources have all been observed.
    pub signature: Option<Signature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantSnapshot {
    pub track: Track,
    pub resources: Vec<ResourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    pub normalized_weight: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

/// Point-in-time copy of a routemap, for listing and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutemapSnapshot {
    pub namespace: String,
    pub name: String,
    pub variants: Vec<VariantSnapshot>,
}

struct RoutemapState {
    variants: VariantArena,
    /// Index-aligned with `variants`.
    weights: Vec<u32>,
    /// Index-aligned with `variants`.
    signatures: Vec<Option<Signature>>,
}

/// What one reconcile pass learned about a variant.
struct ObservedVariant<'a> {
    spec: &'a VariantSpec,
    available: bool,
    weight_override: Option<u32>,
    signature: Option<Signature>,
}

impl Weighted for ObservedVariant<'_> {
    fn explicit_weight(&self) -> Option<u32> {
        self.spec.weight
    }
}

/// Check structural rules a routemap configuration must satisfy.
pub fn validate(spec: &RoutemapSpec, cluster_scoped: bool) -> RoutingResult<()> {
    if spec.variants.is_empty() {
        return Err(RoutingError::NoVariants(spec.key()));
    }
    if !cluster_scoped {
        for resource in spec.variants.iter().flat_map(|v| &v.resources) {
            if resource.namespace_or(&spec.namespace) != spec.namespace {
                return Err(RoutingError::ForeignNamespace {
                    app: spec.key(),
                    resource: resource.clone(),
                    namespace: spec.namespace.clone(),
                });
            }
        }
    }
    Ok(())
}

pub struct Routemap {
    key: ApplicationKey,
    state: RwLock<RoutemapState>,
    /// Held across a whole reconcile so passes apply in the order they observed.
    reconcile: Mutex<()>,
}

impl Routemap {
    /// Build a routemap from its configuration.
    ///
    /// Nothing has been observed yet, so every variant counts as unavailable
    /// and the first one carries all traffic until the first reconcile.
    pub fn new(spec: RoutemapSpec, cluster_scoped: bool) -> RoutingResult<Self> {
        validate(&spec, cluster_scoped)?;
        let key = spec.key();
        let variants: VariantArena = spec.variants.into_iter().collect();
        let weights = normalize_weights(variants.as_slice(), |_| false, |_| None);
        let signatures = vec![None; variants.len()];
        debug!(application = %key, variants = variants.len(), "routemap created");
        Ok(Self {
            key,
            state: RwLock::new(RoutemapState {
                variants,
                weights,
                signatures,
            }),
            reconcile: Mutex::new(()),
        })
    }

    pub fn key(&self) -> &ApplicationKey {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.state.read().variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply an updated configuration.
    ///
    /// Existing tracks must keep their resources; only their declared
    /// weights may change. Extra variants are appended as new tracks and
    /// stay unweighted until the next reconcile. Returns the new tracks.
    pub fn extend(&self, spec: RoutemapSpec, cluster_scoped: bool) -> RoutingResult<Vec<Track>> {
        validate(&spec, cluster_scoped)?;
        let mut state = self.state.write();

        let existing = state.variants.len();
        if spec.variants.len() < existing {
            return Err(RoutingError::TrackReassigned {
                app: self.key.clone(),
                track: Track::new(spec.variants.len() as u32),
            });
        }
        for ((track, current), proposed) in state.variants.iter().zip(&spec.variants) {
            if current.resources != proposed.resources {
                return Err(RoutingError::TrackReassigned {
                    app: self.key.clone(),
                    track,
                });
            }
        }

        let mut variants = spec.variants.into_iter();
        for index in 0..existing {
            if let Some(proposed) = variants.next() {
                state
                    .variants
                    .set_weight(Track::new(index as u32), proposed.weight);
            }
        }
        let mut added = Vec::new();
        for variant in variants {
            added.push(state.variants.push(variant));
            state.weights.push(0);
            state.signatures.push(None);
        }
        if !added.is_empty() {
            info!(application = %self.key, ?added, "routemap variants appended");
        }
        Ok(added)
    }

    /// Recompute weights and signatures from observed resource state.
    ///
    /// Resources are inspected without holding the state lock, so lookups
    /// keep flowing; the results are applied under the write lock.
    /// Concurrent reconciles of the same routemap run one after another.
    /// Returns the new weights.
    pub fn reconcile(&self, inspector: &dyn ResourceInspector) -> Vec<u32> {
        let _serial = self.reconcile.lock();
        let variants = self.state.read().variants.clone();
        let observed: Vec<ObservedVariant<'_>> = variants
            .as_slice()
            .iter()
            .map(|spec| self.observe(spec, inspector))
            .collect();
        let mut weights = normalize_weights(&observed, |o| o.available, |o| o.weight_override);

        let mut state = self.state.write();
        // Variants appended while we were inspecting stay unweighted.
        weights.resize(state.variants.len(), 0);
        for (index, o) in observed.into_iter().enumerate() {
            state.signatures[index] = o.signature;
        }
        if state.weights != weights {
            info!(application = %self.key, ?weights, "routemap weights updated");
        }
        state.weights.clone_from(&weights);
        weights
    }

    fn observe<'a>(
        &self,
        spec: &'a VariantSpec,
        inspector: &dyn ResourceInspector,
    ) -> ObservedVariant<'a> {
        let statuses: Vec<_> = spec
            .resources
            .iter()
            .map(|r| inspector.inspect(r.namespace_or(&self.key.namespace), r))
            .collect();

        let all_found = !statuses.is_empty() && statuses.iter().all(Option::is_some);
        let available = all_found && statuses.iter().flatten().all(|s| s.is_available());
        let signature =
            all_found.then(|| Signature::from_specs(statuses.iter().flatten().map(|s| &s.spec)));

        let weight_override = statuses
            .first()
            .and_then(Option::as_ref)
            .and_then(|s| s.annotations.get(WEIGHT_ANNOTATION))
            .and_then(|raw| match raw.trim().parse::<u32>() {
                Ok(weight) => Some(weight),
                Err(e) => {
                    warn!(
                        application = %self.key,
                        value = %raw,
                        error = %e,
                        "ignoring invalid weight annotation"
                    );
                    None
                }
            });

        ObservedVariant {
            spec,
            available,
            weight_override,
            signature,
        }
    }

    /// Current normalized weights, one per track.
    pub fn weights(&self) -> Vec<u32> {
        self.state.read().weights.clone()
    }

    /// Current signature of a track.
    pub fn signature(&self, track: Track) -> Option<Signature> {
        self.state
            .read()
            .signatures
            .get(track.index())
            .cloned()
            .flatten()
    }

    /// Tracks that currently have a signature, in track order.
    pub fn signed_tracks(&self) -> Vec<(Track, Signature)> {
        let state = self.state.read();
        state
            .signatures
            .iter()
            .enumerate()
            .filter_map(|(i, sig)| sig.clone().map(|s| (Track::new(i as u32), s)))
            .collect()
    }

    /// Rendezvous-hash `user` onto a weighted track.
    pub fn select_track(&self, user: &str) -> Option<Track> {
        self.resolve(user).map(|r| r.track)
    }

    /// Select a track for `user` and capture its signature under one read lock.
    pub fn resolve(&self, user: &str) -> Option<Resolution> {
        let state = self.state.read();
        let candidates = state
            .weights
            .iter()
            .zip(&state.signatures)
            .enumerate()
            .map(|(i, (&weight, signature))| Candidate {
                track: Track::new(i as u32),
                weight,
                signature: signature.as_ref(),
            });
        let track = select_track(candidates, user)?;
        Some(Resolution {
            track,
            signature: state.signatures[track.index()].clone(),
        })
    }

    /// Whether any variant references `resource` in `namespace`.
    pub fn references(&self, namespace: &str, resource: &ResourceRef) -> bool {
        let state = self.state.read();
        state.variants.iter().any(|(_, v)| {
            v.resources.iter().any(|r| {
                r.kind == resource.kind
                    && r.name == resource.name
                    && r.namespace_or(&self.key.namespace) == namespace
            })
        })
    }

    pub fn snapshot(&self) -> RoutemapSnapshot {
        let state = self.state.read();
        let variants = state
            .variants
            .iter()
            .map(|(track, v)| VariantSnapshot {
                track,
                resources: v.resources.clone(),
                weight: v.weight,
                normalized_weight: state.weights[track.index()],
                signature: state.signatures[track.index()].clone(),
            })
            .collect();
        RoutemapSnapshot {
            namespace: self.key.namespace.clone(),
            name: self.key.name.clone(),
            variants,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::{ResourceStatus, StaticInspector};
    use serde_json::json;
    use std::sync::{Arc, mpsc};
    use std::thread;
    use std::time::Duration;

    fn deploy(name: &str) -> ResourceRef {
        ResourceRef::new("deploy", name)
    }

    fn spec(names: &[&str]) -> RoutemapSpec {
        RoutemapSpec {
            namespace: "shop".into(),
            name: "backend".into(),
            variants: names
                .iter()
                .map(|n| VariantSpec::new(vec![deploy(n)]))
                .collect(),
        }
    }

    fn ready(inspector: &StaticInspector, name: &str) {
        inspector.set("shop", &deploy(name), ResourceStatus::ready(json!({"image": name})));
    }

    // ── Construction ───────────────────────────────────────────────

    #[test]
    fn new_routemap_routes_to_first_track() {
        let rm = Routemap::new(spec(&["a", "b", "c"]), false).unwrap();
        assert_eq!(rm.weights(), vec![1, 0, 0]);
        assert_eq!(rm.select_track("alice"), Some(Track::new(0)));
        assert_eq!(rm.resolve("alice").unwrap().signature, None);
    }

    #[test]
    fn rejects_empty_and_foreign_namespace() {
        assert!(matches!(
            Routemap::new(spec(&[]), false),
            Err(RoutingError::NoVariants(_))
        ));

        let mut s = spec(&["a"]);
        s.variants[0].resources[0].namespace = Some("other".into());
        assert!(matches!(
            Routemap::new(s.clone(), false),
            Err(RoutingError::ForeignNamespace { .. })
        ));
        assert!(Routemap::new(s, true).is_ok());
    }

    // ── Reconcile ──────────────────────────────────────────────────

    /// Reports a fixed spec and parks inside `inspect` until released.
    struct ParkedInspector {
        spec: serde_json::Value,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ResourceInspector for ParkedInspector {
        fn inspect(&self, _namespace: &str, _resource: &ResourceRef) -> Option<ResourceStatus> {
            let _ = self.entered.lock().send(());
            let _ = self.release.lock().recv();
            Some(ResourceStatus::ready(self.spec.clone()))
        }
    }

    #[test]
    fn overlapping_reconciles_keep_the_newest_observation() {
        let rm = Arc::new(Routemap::new(spec(&["a"]), false).unwrap());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let stale = ParkedInspector {
            spec: json!({"image": "a:1"}),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };

        let slow = {
            let rm = Arc::clone(&rm);
            thread::spawn(move || rm.reconcile(&stale))
        };
        entered_rx.recv().unwrap();

        let fresh = StaticInspector::new();
        fresh.set("shop", &deploy("a"), ResourceStatus::ready(json!({"image": "a:2"})));
        let fast = {
            let rm = Arc::clone(&rm);
            thread::spawn(move || rm.reconcile(&fresh))
        };
        thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();

        slow.join().unwrap();
        fast.join().unwrap();

        let newest = Signature::from_specs([&json!({"image": "a:2"})]);
        assert_eq!(rm.signature(Track::new(0)), Some(newest));
    }

    #[test]
    fn reconcile_weights_available_variants() {
        let inspector = StaticInspector::new();
        ready(&inspector, "a");
        ready(&inspector, "b");
        let rm = Routemap::new(spec(&["a", "b", "c"]), false).unwrap();

        assert_eq!(rm.reconcile(&inspector), vec![1, 1, 0]);
        assert!(rm.signature(Track::new(0)).is_some());
        assert!(rm.signature(Track::new(2)).is_none());
        assert_eq!(rm.signed_tracks().len(), 2);
    }

    #[test]
    fn reconcile_all_unavailable_falls_back() {
        let inspector = StaticInspector::new();
        let rm = Routemap::new(spec(&["a", "b", "c"]), false).unwrap();
        assert_eq!(rm.reconcile(&inspector), vec![1, 0, 0]);
    }

    #[test]
    fn deleting_and_unready_resources_are_unavailable() {
        let inspector = StaticInspector::new();
        let mut deleting = ResourceStatus::ready(json!({}));
        deleting.deleting = true;
        inspector.set("shop", &deploy("a"), deleting);
        inspector.set("shop", &deploy("b"), ResourceStatus::default());
        ready(&inspector, "c");

        let rm = Routemap::new(spec(&["a", "b", "c"]), false).unwrap();
        assert_eq!(rm.reconcile(&inspector), vec![0, 0, 1]);
        // Present but not ready still has a signature.
        assert!(rm.signature(Track::new(1)).is_some());
    }

    #[test]
    fn annotation_overrides_weight() {
        let inspector = StaticInspector::new();
        ready(&inspector, "a");
        inspector.set(
            "shop",
            &deploy("b"),
            ResourceStatus::ready(json!({})).with_annotation(WEIGHT_ANNOTATION, "9"),
        );
        let mut s = spec(&["a", "b"]);
        s.variants[1].weight = Some(2);
        let rm = Routemap::new(s, false).unwrap();
        assert_eq!(rm.reconcile(&inspector), vec![1, 9]);
    }

    #[test]
    fn invalid_annotation_is_ignored() {
        let inspector = StaticInspector::new();
        inspector.set(
            "shop",
            &deploy("a"),
            ResourceStatus::ready(json!({})).with_annotation(WEIGHT_ANNOTATION, "-3"),
        );
        let mut s = spec(&["a"]);
        s.variants[0].weight = Some(4);
        let rm = Routemap::new(s, false).unwrap();
        assert_eq!(rm.reconcile(&inspector), vec![4]);
    }

    #[test]
    fn signature_follows_deployed_content() {
        let inspector = StaticInspector::new();
        ready(&inspector, "a");
        let rm = Routemap::new(spec(&["a"]), false).unwrap();
        rm.reconcile(&inspector);
        let before = rm.signature(Track::new(0)).unwrap();

        inspector.set("shop", &deploy("a"), ResourceStatus::ready(json!({"image": "a2"})));
        rm.reconcile(&inspector);
        assert_ne!(rm.signature(Track::new(0)).unwrap(), before);
    }

    // ── Append-only updates ────────────────────────────────────────

    #[test]
    fn extend_appends_new_tracks() {
        let rm = Routemap::new(spec(&["a"]), false).unwrap();
        let added = rm.extend(spec(&["a", "b"]), false).unwrap();
        assert_eq!(added, vec![Track::new(1)]);
        assert_eq!(rm.weights(), vec![1, 0]);
        assert_eq!(rm.len(), 2);
    }

    #[test]
    fn extend_updates_declared_weights() {
        let inspector = StaticInspector::new();
        ready(&inspector, "a");
        ready(&inspector, "b");
        let rm = Routemap::new(spec(&["a", "b"]), false).unwrap();
        let mut updated = spec(&["a", "b"]);
        updated.variants[1].weight = Some(5);
        assert!(rm.extend(updated, false).unwrap().is_empty());
        assert_eq!(rm.reconcile(&inspector), vec![1, 5]);
    }

    #[test]
    fn extend_rejects_reorder_and_removal() {
        let rm = Routemap::new(spec(&["a", "b"]), false).unwrap();
        assert!(matches!(
            rm.extend(spec(&["b", "a"]), false),
            Err(RoutingError::TrackReassigned { track, .. }) if track == Track::new(0)
        ));
        assert!(matches!(
            rm.extend(spec(&["a"]), false),
            Err(RoutingError::TrackReassigned { track, .. }) if track == Track::new(1)
        ));
        assert_eq!(rm.len(), 2);
    }

    // ── Lookup ─────────────────────────────────────────────────────

    #[test]
    fn resolve_is_deterministic() {
        let inspector = StaticInspector::new();
        ready(&inspector, "a");
        ready(&inspector, "b");
        let rm = Routemap::new(spec(&["a", "b"]), false).unwrap();
        rm.reconcile(&inspector);

        let first = rm.resolve("alice").unwrap();
        assert!(first.signature.is_some());
        for _ in 0..1000 {
            assert_eq!(rm.resolve("alice").unwrap(), first);
        }
    }

    #[test]
    fn references_and_snapshot() {
        let rm = Routemap::new(spec(&["a", "b"]), false).unwrap();
        assert!(rm.references("shop", &deploy("b")));
        assert!(!rm.references("other", &deploy("b")));
        assert!(!rm.references("shop", &deploy("z")));

        let snap = rm.snapshot();
        assert_eq!(snap.name, "backend");
        assert_eq!(snap.variants.len(), 2);
        assert_eq!(snap.variants[0].normalized_weight, 1);
        assert_eq!(snap.variants[1].track, Track::new(1));
    }
}
