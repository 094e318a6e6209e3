//! Proximity matching between protected bases and nearby entities.
//!
//! A candidate (tent or vehicle) is protected when at least one protected
//! base lies within [`PROXIMITY_RADIUS`] of it, boundary included. Both sets
//! are bounded by server population and structure caps, so a plain
//! bases × candidates scan is used instead of a spatial index.

use std::collections::HashSet;

use crate::clans::ExclusionSet;
use crate::types::{Base, EntityId, Position, Positioned, PROXIMITY_RADIUS};

/// Whether two positions are within `radius` of each other (inclusive).
#[must_use]
pub fn within_radius(a: Position, b: Position, radius: f64) -> bool {
    a.distance(b) <= radius
}

/// Positions of the bases whose owner is in `exclusion`.
#[must_use]
pub fn protected_anchors(bases: &[Base], exclusion: &ExclusionSet) -> Vec<Position> {
    let owners = exclusion.to_lookup();
    bases
        .iter()
        .filter(|base| owners.contains(&base.owner))
        .map(|base| base.position)
        .collect()
}

/// Ids of the candidates within [`PROXIMITY_RADIUS`] of a protected base.
///
/// Bases whose owner is not in `exclusion` are ignored. Each id appears at
/// most once, in candidate order.
#[must_use]
pub fn match_by_proximity<T: Positioned>(
    bases: &[Base],
    exclusion: &ExclusionSet,
    candidates: &[T],
) -> Vec<EntityId> {
    match_within(bases, exclusion, candidates, PROXIMITY_RADIUS)
}

/// [`match_by_proximity`] with an explicit radius.
#[must_use]
pub fn match_within<T: Positioned>(
    bases: &[Base],
    exclusion: &ExclusionSet,
    candidates: &[T],
    radius: f64,
) -> Vec<EntityId> {
    let anchors = protected_anchors(bases, exclusion);
    if anchors.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut matched = Vec::new();
    for candidate in candidates {
        let id = candidate.entity_id();
        if seen.contains(&id) {
            continue;
        }
        let position = candidate.position();
        if anchors.iter().any(|&anchor| within_radius(anchor, position, radius)) {
            seen.insert(id);
            matched.push(id);
        }
    }
    matched
}
