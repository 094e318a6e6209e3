//! Abandon-timer reset engine.
//!
//! Each category gets exactly one policy per pass, first match wins:
//!
//! | Category | Policy | Action |
//! |---|---|---|
//! | any | "reset all" flag set | every entity of the category |
//! | base | exclusion set non-empty | bases owned by a protected owner |
//! | tent, vehicle | exclusion set non-empty | entities near a protected base |
//! | any | otherwise | nothing |
//!
//! Quick vehicle despawn is evaluated separately after the three
//! categories and overrides every vehicle timer with the configured value.
//!
//! A failing category is logged and reported; it never stops the others.

use serde::Serialize;
use tracing::{debug, error, info, info_span, Span};

use crate::clans::{ExclusionSet, ExclusionSets};
use crate::config::SmssConfig;
use crate::error::Result;
use crate::persistence::TimerStore;
use crate::proximity::match_by_proximity;
use crate::types::{AccountId, Category, EntityId, Positioned, PROTECTED_ABANDON_TIMER};

// ---------------------------------------------------------------------------
// Policies and outcomes
// ---------------------------------------------------------------------------

/// Which reset policy applies to a category this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicy {
    /// Reset every entity of the category.
    ResetAll,
    /// Reset only entities protected by the exclusion set.
    Targeted,
    /// Leave the category alone.
    NoOp,
}

impl ResetPolicy {
    /// Pick the policy for one category.
    #[must_use]
    pub fn select(reset_all: bool, exclusion: &ExclusionSet) -> Self {
        if reset_all {
            Self::ResetAll
        } else if !exclusion.is_empty() {
            Self::Targeted
        } else {
            Self::NoOp
        }
    }
}

/// What one step of the pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Every entity of the category was updated.
    ResetAll {
        /// Rows changed.
        rows: usize,
    },
    /// Selected entities were updated.
    Targeted {
        /// Ids (or accounts, for bases) in the update filter.
        matched: usize,
        /// Rows changed.
        rows: usize,
    },
    /// A script ran whose row count is not tracked.
    Applied,
    /// The policy was targeted but nothing qualified; no statement issued.
    NothingMatched,
    /// No policy applied; no statement issued.
    NoOp,
    /// A query or statement failed; the step was skipped.
    Failed {
        /// Error message.
        error: String,
    },
}

impl StepOutcome {
    /// Whether the step failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Rows changed by the step.
    #[must_use]
    pub fn rows(&self) -> usize {
        match self {
            Self::ResetAll { rows } | Self::Targeted { rows, .. } => *rows,
            _ => 0,
        }
    }
}

/// Outcome of every step of one engine run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerReport {
    /// Base step.
    pub bases: StepOutcome,
    /// Tent step.
    pub tents: StepOutcome,
    /// Vehicle step.
    pub vehicles: StepOutcome,
    /// Quick vehicle despawn step.
    pub quick_despawn: StepOutcome,
}

impl TimerReport {
    /// Outcome for a category.
    #[must_use]
    pub fn category(&self, category: Category) -> &StepOutcome {
        match category {
            Category::Base => &self.bases,
            Category::Tent => &self.tents,
            Category::Vehicle => &self.vehicles,
        }
    }

    /// Whether any step failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        [&self.bases, &self.tents, &self.vehicles, &self.quick_despawn]
            .iter()
            .any(|step| step.is_failed())
    }
}

// ---------------------------------------------------------------------------
// TimerResetEngine
// ---------------------------------------------------------------------------

/// Applies the reset policies of one pass against a [`TimerStore`].
///
/// The engine holds no state besides its store and the span its events are
/// recorded under.
pub struct TimerResetEngine<'s, S: TimerStore + ?Sized> {
    store: &'s S,
    span: Span,
}

impl<'s, S: TimerStore + ?Sized> TimerResetEngine<'s, S> {
    /// Create an engine that logs under the caller's current span.
    #[must_use]
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            span: Span::current(),
        }
    }

    /// Log under `span` instead of the current span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Run base, tent and vehicle steps, then quick vehicle despawn.
    pub fn run(&self, config: &SmssConfig, exclusions: &ExclusionSets) -> TimerReport {
        let _entered = self.span.enter();

        let [bases, tents, vehicles] = Category::ALL.map(|category| {
            self.step(category, || {
                self.reset_category(category, config.reset_all(category), exclusions.get(category))
            })
        });
        let quick_despawn = self.settle(
            "quick_despawn",
            self.quick_vehicle_despawn(config.quick_vehicle_despawn),
        );

        TimerReport {
            bases,
            tents,
            vehicles,
            quick_despawn,
        }
    }

    /// Apply the policy of one category.
    ///
    /// # Errors
    ///
    /// Returns the store's error if a query or statement fails.
    pub fn reset_category(
        &self,
        category: Category,
        reset_all: bool,
        exclusion: &ExclusionSet,
    ) -> Result<StepOutcome> {
        match category {
            Category::Base => self.reset_bases(reset_all, exclusion),
            Category::Tent => self.reset_tents(reset_all, exclusion),
            Category::Vehicle => self.reset_vehicles(reset_all, exclusion),
        }
    }

    /// Base step: reset all, or reset the bases of protected owners.
    ///
    /// # Errors
    ///
    /// Returns the store's error if a query or statement fails.
    pub fn reset_bases(&self, reset_all: bool, exclusion: &ExclusionSet) -> Result<StepOutcome> {
        match ResetPolicy::select(reset_all, exclusion) {
            ResetPolicy::ResetAll => self.reset_every(Category::Base),
            ResetPolicy::Targeted => {
                let owners = exclusion.to_lookup();
                let mut accounts: Vec<AccountId> = self
                    .store
                    .bases()?
                    .iter()
                    .filter(|base| owners.contains(&base.owner))
                    .map(|base| base.owner.account_id())
                    .collect();
                accounts.sort_unstable();
                accounts.dedup();

                if accounts.is_empty() {
                    return Ok(StepOutcome::NothingMatched);
                }
                debug!(accounts = ?accounts, "Reset bases for accounts");
                let rows = self
                    .store
                    .reset_base_accounts(&accounts, PROTECTED_ABANDON_TIMER)?;
                Ok(StepOutcome::Targeted {
                    matched: accounts.len(),
                    rows,
                })
            }
            ResetPolicy::NoOp => Ok(StepOutcome::NoOp),
        }
    }

    /// Tent step: reset all, or reset tents near a protected base.
    ///
    /// # Errors
    ///
    /// Returns the store's error if a query or statement fails.
    pub fn reset_tents(&self, reset_all: bool, exclusion: &ExclusionSet) -> Result<StepOutcome> {
        match ResetPolicy::select(reset_all, exclusion) {
            ResetPolicy::ResetAll => self.reset_every(Category::Tent),
            ResetPolicy::Targeted => self.protect_nearby(exclusion, self.store.tents()?, |ids| {
                self.store.reset_structures(ids, PROTECTED_ABANDON_TIMER)
            }),
            ResetPolicy::NoOp => Ok(StepOutcome::NoOp),
        }
    }

    /// Vehicle step: reset all, or reset vehicles near a protected base.
    ///
    /// # Errors
    ///
    /// Returns the store's error if a query or statement fails.
    pub fn reset_vehicles(&self, reset_all: bool, exclusion: &ExclusionSet) -> Result<StepOutcome> {
        match ResetPolicy::select(reset_all, exclusion) {
            ResetPolicy::ResetAll => self.reset_every(Category::Vehicle),
            ResetPolicy::Targeted => self.protect_nearby(exclusion, self.store.vehicles()?, |ids| {
                self.store.reset_vehicles(ids, PROTECTED_ABANDON_TIMER)
            }),
            ResetPolicy::NoOp => Ok(StepOutcome::NoOp),
        }
    }

    /// Force every vehicle timer to `seconds` when it is set and non-zero.
    /// Negative values are written as-is.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the statement fails.
    pub fn quick_vehicle_despawn(&self, seconds: Option<i64>) -> Result<StepOutcome> {
        let Some(seconds) = seconds.filter(|s| *s != 0) else {
            return Ok(StepOutcome::NoOp);
        };
        let rows = self.store.reset_all(Category::Vehicle, seconds)?;
        info!(seconds, rows, "Quick vehicle despawn applied");
        Ok(StepOutcome::ResetAll { rows })
    }

    fn reset_every(&self, category: Category) -> Result<StepOutcome> {
        let rows = self.store.reset_all(category, PROTECTED_ABANDON_TIMER)?;
        Ok(StepOutcome::ResetAll { rows })
    }

    fn protect_nearby<T, W>(
        &self,
        exclusion: &ExclusionSet,
        candidates: Vec<T>,
        write: W,
    ) -> Result<StepOutcome>
    where
        T: Positioned,
        W: FnOnce(&[EntityId]) -> Result<usize>,
    {
        if candidates.is_empty() {
            return Ok(StepOutcome::NothingMatched);
        }
        let bases = self.store.bases()?;
        let ids = match_by_proximity(&bases, exclusion, &candidates);
        if ids.is_empty() {
            return Ok(StepOutcome::NothingMatched);
        }
        debug!(ids = ?ids, "Reset ids near protected bases");
        let rows = write(&ids)?;
        Ok(StepOutcome::Targeted {
            matched: ids.len(),
            rows,
        })
    }

    fn step<F>(&self, category: Category, run: F) -> StepOutcome
    where
        F: FnOnce() -> Result<StepOutcome>,
    {
        let span = info_span!("category", %category);
        let _entered = span.enter();
        self.settle(&category.to_string(), run())
    }

    fn settle(&self, step: &str, result: Result<StepOutcome>) -> StepOutcome {
        match result {
            Ok(outcome) => {
                info!(step, outcome = ?outcome, "Timer step finished");
                outcome
            }
            Err(e) => {
                error!(step, error = %e, "Timer step failed, continuing with the next step");
                StepOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::error::SmssError;
    use crate::persistence::fixtures;
    use crate::types::{Base, ClanId, OwnerId, Position, Tent, Vehicle, STEAM64_OFFSET};

    // ------------------------------------------------------------------
    // Recording fake
    // ------------------------------------------------------------------

    /// In-memory store that records every write and can fail on demand.
    #[derive(Default)]
    struct RecordingStore {
        bases: Vec<Base>,
        tents: Vec<Tent>,
        vehicles: Vec<Vehicle>,
        fail_tent_reads: bool,
        writes: RefCell<Vec<String>>,
    }

    impl RecordingStore {
        fn record(&self, what: String) -> Result<usize> {
            self.writes.borrow_mut().push(what);
            Ok(1)
        }
    }

    impl TimerStore for RecordingStore {
        fn bases(&self) -> Result<Vec<Base>> {
            Ok(self.bases.clone())
        }

        fn tents(&self) -> Result<Vec<Tent>> {
            if self.fail_tent_reads {
                return Err(SmssError::Database(rusqlite::Error::InvalidQuery));
            }
            Ok(self.tents.clone())
        }

        fn vehicles(&self) -> Result<Vec<Vehicle>> {
            Ok(self.vehicles.clone())
        }

        fn clan_members(&self, _clans: &[ClanId]) -> Result<Vec<OwnerId>> {
            Ok(Vec::new())
        }

        fn reset_all(&self, category: Category, seconds: i64) -> Result<usize> {
            self.record(format!("all {category} {seconds}"))
        }

        fn reset_base_accounts(&self, accounts: &[AccountId], seconds: i64) -> Result<usize> {
            self.record(format!("bases {accounts:?} {seconds}"))
        }

        fn reset_structures(&self, ids: &[EntityId], seconds: i64) -> Result<usize> {
            self.record(format!("structures {ids:?} {seconds}"))
        }

        fn reset_vehicles(&self, ids: &[EntityId], seconds: i64) -> Result<usize> {
            self.record(format!("vehicles {ids:?} {seconds}"))
        }
    }

    fn owner(account: i64) -> OwnerId {
        OwnerId(account + STEAM64_OFFSET)
    }

    fn set(accounts: &[i64]) -> ExclusionSet {
        accounts.iter().map(|a| owner(*a)).collect()
    }

    // ------------------------------------------------------------------
    // Policy selection
    // ------------------------------------------------------------------

    #[test]
    fn reset_all_wins_over_targeted() {
        assert_eq!(ResetPolicy::select(true, &set(&[1])), ResetPolicy::ResetAll);
        assert_eq!(ResetPolicy::select(true, &set(&[])), ResetPolicy::ResetAll);
        assert_eq!(ResetPolicy::select(false, &set(&[1])), ResetPolicy::Targeted);
        assert_eq!(ResetPolicy::select(false, &set(&[])), ResetPolicy::NoOp);
    }

    #[test]
    fn empty_policy_issues_no_statement() {
        let store = RecordingStore {
            bases: vec![Base { owner: owner(1), position: Position::new(0.0, 0.0) }],
            tents: vec![Tent { id: EntityId(1), position: Position::new(0.0, 0.0) }],
            ..RecordingStore::default()
        };
        let report = TimerResetEngine::new(&store).run(&SmssConfig::default(), &ExclusionSets::default());

        assert_eq!(report.bases, StepOutcome::NoOp);
        assert_eq!(report.tents, StepOutcome::NoOp);
        assert_eq!(report.vehicles, StepOutcome::NoOp);
        assert_eq!(report.quick_despawn, StepOutcome::NoOp);
        assert!(store.writes.borrow().is_empty());
    }

    #[test]
    fn targeted_with_no_match_issues_no_statement() {
        let store = RecordingStore {
            bases: vec![Base { owner: owner(1), position: Position::new(0.0, 0.0) }],
            tents: vec![Tent { id: EntityId(1), position: Position::new(500.0, 0.0) }],
            ..RecordingStore::default()
        };
        let engine = TimerResetEngine::new(&store);

        let bases = engine.reset_bases(false, &set(&[2])).expect("bases");
        let tents = engine.reset_tents(false, &set(&[1])).expect("tents");
        let vehicles = engine.reset_vehicles(false, &set(&[1])).expect("vehicles");

        assert_eq!(bases, StepOutcome::NothingMatched);
        assert_eq!(tents, StepOutcome::NothingMatched);
        assert_eq!(vehicles, StepOutcome::NothingMatched);
        assert!(store.writes.borrow().is_empty());
    }

    #[test]
    fn base_accounts_are_deduplicated_into_one_statement() {
        let store = RecordingStore {
            bases: vec![
                Base { owner: owner(1), position: Position::new(0.0, 0.0) },
                Base { owner: owner(1), position: Position::new(50.0, 0.0) },
                Base { owner: owner(2), position: Position::new(90.0, 0.0) },
            ],
            ..RecordingStore::default()
        };
        let outcome = TimerResetEngine::new(&store)
            .reset_bases(false, &set(&[1, 1, 2, 3]))
            .expect("bases");

        assert_eq!(outcome, StepOutcome::Targeted { matched: 2, rows: 1 });
        assert_eq!(
            store.writes.borrow().as_slice(),
            &["bases [AccountId(1), AccountId(2)] 2419200".to_string()]
        );
    }

    #[test]
    fn failing_category_does_not_block_the_others() {
        let store = RecordingStore {
            bases: vec![Base { owner: owner(1), position: Position::new(0.0, 0.0) }],
            vehicles: vec![Vehicle { id: EntityId(9), position: Position::new(5.0, 5.0) }],
            fail_tent_reads: true,
            ..RecordingStore::default()
        };
        let exclusions = ExclusionSets {
            base: set(&[1]),
            tent: set(&[1]),
            vehicle: set(&[1]),
        };
        let config = SmssConfig {
            quick_vehicle_despawn: Some(60),
            ..SmssConfig::default()
        };

        let report = TimerResetEngine::new(&store).run(&config, &exclusions);

        assert!(report.tents.is_failed());
        assert!(report.has_failures());
        assert_eq!(report.bases, StepOutcome::Targeted { matched: 1, rows: 1 });
        assert_eq!(report.vehicles, StepOutcome::Targeted { matched: 1, rows: 1 });
        assert_eq!(report.quick_despawn, StepOutcome::ResetAll { rows: 1 });
    }

    #[test]
    fn steps_run_in_pass_order() {
        let store = RecordingStore::default();
        let config = SmssConfig {
            reset_all_bases: true,
            reset_all_tents: true,
            reset_all_vehicles: true,
            quick_vehicle_despawn: Some(60),
            ..SmssConfig::default()
        };
        TimerResetEngine::new(&store).run(&config, &ExclusionSets::default());

        assert_eq!(
            store.writes.borrow().as_slice(),
            &[
                "all base 2419200".to_string(),
                "all tent 2419200".to_string(),
                "all vehicle 2419200".to_string(),
                "all vehicle 60".to_string(),
            ]
        );
    }

    #[test]
    fn unset_or_zero_quick_despawn_is_ignored() {
        let store = RecordingStore::default();
        let engine = TimerResetEngine::new(&store);
        assert_eq!(engine.quick_vehicle_despawn(None).expect("none"), StepOutcome::NoOp);
        assert_eq!(engine.quick_vehicle_despawn(Some(0)).expect("zero"), StepOutcome::NoOp);
        assert!(store.writes.borrow().is_empty());
    }

    #[test]
    fn negative_quick_despawn_is_applied() {
        let store = RecordingStore::default();
        let outcome = TimerResetEngine::new(&store)
            .quick_vehicle_despawn(Some(-3))
            .expect("negative");

        assert_eq!(outcome, StepOutcome::ResetAll { rows: 1 });
        assert_eq!(store.writes.borrow().as_slice(), &["all vehicle -3".to_string()]);
    }

    #[test]
    fn report_is_indexed_by_category() {
        let store = RecordingStore {
            bases: vec![Base { owner: owner(1), position: Position::new(0.0, 0.0) }],
            ..RecordingStore::default()
        };
        let exclusions = ExclusionSets {
            base: set(&[1]),
            ..ExclusionSets::default()
        };
        let config = SmssConfig {
            reset_all_tents: true,
            ..SmssConfig::default()
        };

        let report = TimerResetEngine::new(&store).run(&config, &exclusions);

        assert_eq!(
            report.category(Category::Base),
            &StepOutcome::Targeted { matched: 1, rows: 1 }
        );
        assert_eq!(report.category(Category::Tent), &StepOutcome::ResetAll { rows: 1 });
        assert_eq!(report.category(Category::Vehicle), &StepOutcome::NoOp);
    }

    // ------------------------------------------------------------------
    // Against SQLite
    // ------------------------------------------------------------------

    #[test]
    fn sqlite_tents_near_protected_base_are_reset() {
        let store = fixtures::store();
        fixtures::structure(&store, 1, 5, "PlotSign", 0.0, 0.0);
        fixtures::structure(&store, 2, 9, "PlotSign", 100.0, 100.0);
        fixtures::structure(&store, 10, 9, "tent_small", 10.0, 0.0);
        fixtures::structure(&store, 11, 9, "tent_small", 50.0, 50.0);

        let outcome = TimerResetEngine::new(&store)
            .reset_category(Category::Tent, false, &set(&[5]))
            .expect("tents");

        assert_eq!(outcome, StepOutcome::Targeted { matched: 1, rows: 1 });
        assert_eq!(fixtures::structure_timer(&store, 10), PROTECTED_ABANDON_TIMER);
        assert_eq!(fixtures::structure_timer(&store, 11), 0);
        assert_eq!(fixtures::structure_timer(&store, 1), 0, "base step not run");
    }
}
