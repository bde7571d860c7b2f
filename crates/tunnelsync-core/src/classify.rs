//! Domain classification

use crate::model::DeliveryClass;
use std::collections::BTreeSet;

/// Decide how a hostname is delivered from the entrypoints it is served on
///
/// `Local` iff the entrypoints intersect the local entrypoint names,
/// otherwise `Tunnel`.
pub fn classify(entrypoints: &BTreeSet<String>, local_entrypoints: &BTreeSet<String>) -> DeliveryClass {
    if entrypoints.is_disjoint(local_entrypoints) {
        DeliveryClass::Tunnel
    } else {
        DeliveryClass::Local
    }
}
