//! Clan membership resolution and per-category exclusion sets.
//!
//! An exclusion set is the list of owners whose bases count as protected
//! for one category. It is built from the explicitly configured owners plus
//! every member of the configured clans. Duplicates are kept; membership is
//! all that matters downstream.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SmssConfig;
use crate::error::Result;
use crate::persistence::TimerStore;
use crate::types::{Category, ClanId, OwnerId};

/// Owners whose bases are protected for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionSet {
    owners: Vec<OwnerId>,
}

impl ExclusionSet {
    /// Merge configured owners with resolved clan members, in that order.
    #[must_use]
    pub fn from_sources<I>(configured: &[OwnerId], clan_members: I) -> Self
    where
        I: IntoIterator<Item = OwnerId>,
    {
        let owners = configured.iter().copied().chain(clan_members).collect();
        Self { owners }
    }

    /// Whether `owner` is protected.
    #[must_use]
    pub fn contains(&self, owner: OwnerId) -> bool {
        self.owners.contains(&owner)
    }

    /// Whether no owner is protected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Number of entries, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Entries in insertion order.
    #[must_use]
    pub fn owners(&self) -> &[OwnerId] {
        &self.owners
    }

    /// Distinct owners, for constant-time lookups over large scans.
    #[must_use]
    pub fn to_lookup(&self) -> HashSet<OwnerId> {
        self.owners.iter().copied().collect()
    }
}

impl FromIterator<OwnerId> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = OwnerId>>(iter: I) -> Self {
        Self {
            owners: iter.into_iter().collect(),
        }
    }
}

/// One exclusion set per category. Sets are never shared between
/// categories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionSets {
    /// Owners whose bases are reset.
    pub base: ExclusionSet,
    /// Owners whose bases protect nearby tents.
    pub tent: ExclusionSet,
    /// Owners whose bases protect nearby vehicles.
    pub vehicle: ExclusionSet,
}

impl ExclusionSets {
    /// The set belonging to `category`.
    #[must_use]
    pub fn get(&self, category: Category) -> &ExclusionSet {
        match category {
            Category::Base => &self.base,
            Category::Tent => &self.tent,
            Category::Vehicle => &self.vehicle,
        }
    }
}

/// Owner ids of every member of any clan in `clans`.
///
/// An empty clan list resolves to no members without touching the store.
///
/// # Errors
///
/// Returns the store's error if the membership query fails.
pub fn resolve_members<S>(store: &S, clans: &[ClanId]) -> Result<Vec<OwnerId>>
where
    S: TimerStore + ?Sized,
{
    if clans.is_empty() {
        return Ok(Vec::new());
    }
    let members = store.clan_members(clans)?;
    debug!(clans = ?clans, members = members.len(), "Resolved clan members");
    Ok(members)
}

/// Build the three exclusion sets for a pass.
///
/// A failed clan lookup is logged and that category keeps only its
/// explicitly configured owners; the other categories are unaffected.
pub fn resolve_exclusion_sets<S>(store: &S, config: &SmssConfig) -> ExclusionSets
where
    S: TimerStore + ?Sized,
{
    let build = |category: Category| {
        let members = resolve_members(store, config.clan_ids(category)).unwrap_or_else(|e| {
            warn!(%category, error = %e, "Clan lookup failed, using configured owners only");
            Vec::new()
        });
        ExclusionSet::from_sources(config.owner_ids(category), members)
    };

    ExclusionSets {
        base: build(Category::Base),
        tent: build(Category::Tent),
        vehicle: build(Category::Vehicle),
    }
}
