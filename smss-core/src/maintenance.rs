//! One maintenance pass over the server database.
//!
//! Runs once per server start, before the server process is launched:
//!
//! 1. open the database; if it does not exist yet there is nothing to do,
//! 2. optionally grant all tutorial guides,
//! 3. expand configured clans into per-category exclusion sets,
//! 4. run the timer reset engine.
//!
//! Store failures never escape a pass. They are logged and recorded in the
//! returned [`PassReport`].

use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Span};

use crate::clans::{resolve_exclusion_sets, ExclusionSets};
use crate::config::SmssConfig;
use crate::error::Result;
use crate::persistence::SqliteStore;
use crate::timers::{StepOutcome, TimerReport, TimerResetEngine};

/// Server id used when the database has none to offer.
pub const DEFAULT_SERVER_ID: i64 = 100;

const GRANT_GUIDES_SQL: &str = "
    DROP TRIGGER IF EXISTS grant_all_guides;
    CREATE TRIGGER IF NOT EXISTS grant_all_guides AFTER UPDATE ON Characters
    BEGIN
        UPDATE ServerAccountData SET Guide00 = '-1', Guide01 = '-1';
    END;
    UPDATE ServerAccountData SET Guide00 = '-1', Guide01 = '-1';
";

/// Summary of one maintenance pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassReport {
    /// When the pass started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the pass.
    pub elapsed_ms: u64,
    /// Whether the database existed. When false every step was skipped.
    pub store_present: bool,
    /// Game server id recorded in the database, or [`DEFAULT_SERVER_ID`].
    pub server_id: i64,
    /// Guide grant step.
    pub guides: StepOutcome,
    /// Exclusion sets the engine ran with.
    pub exclusions: ExclusionSets,
    /// Timer engine steps, absent when the store was absent.
    pub timers: Option<TimerReport>,
}

impl PassReport {
    /// Whether any step of the pass failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.guides.is_failed() || self.timers.as_ref().is_some_and(TimerReport::has_failures)
    }
}

/// Run a full maintenance pass against the database at `db_path`.
///
/// Events are recorded under a `maintenance_pass` span whose parent is
/// `parent`.
///
/// # Errors
///
/// Returns [`crate::SmssError::Database`] only if an existing database file
/// cannot be opened. Every later failure is contained in the report.
pub fn run_maintenance_pass(db_path: &Path, config: &SmssConfig, parent: &Span) -> Result<PassReport> {
    let span = info_span!(parent: parent, "maintenance_pass", db = %db_path.display());
    let _entered = span.enter();
    let started_at = Utc::now();
    let start = Instant::now();

    let Some(store) = SqliteStore::open_existing(db_path)? else {
        info!("Server database not created yet, nothing to maintain");
        return Ok(PassReport {
            started_at,
            elapsed_ms: elapsed_ms(start),
            store_present: false,
            server_id: DEFAULT_SERVER_ID,
            guides: StepOutcome::NoOp,
            exclusions: ExclusionSets::default(),
            timers: None,
        });
    };

    let mut report = run_with_store(&store, config, &span);
    report.started_at = started_at;
    report.elapsed_ms = elapsed_ms(start);

    info!(
        elapsed_ms = report.elapsed_ms,
        failures = report.has_failures(),
        "Maintenance pass complete"
    );
    Ok(report)
}

/// Run the pass steps against an already opened store.
pub fn run_with_store(store: &SqliteStore, config: &SmssConfig, span: &Span) -> PassReport {
    let started_at = Utc::now();
    let start = Instant::now();

    let guides = grant_guides(store, config.grant_guides);
    let exclusions = resolve_exclusion_sets(store, config);
    debug!(
        base = exclusions.base.len(),
        tent = exclusions.tent.len(),
        vehicle = exclusions.vehicle.len(),
        "Exclusion sets built"
    );

    let timers = TimerResetEngine::new(store)
        .with_span(span.clone())
        .run(config, &exclusions);

    PassReport {
        started_at,
        elapsed_ms: elapsed_ms(start),
        store_present: true,
        server_id: server_id(store),
        guides,
        exclusions,
        timers: Some(timers),
    }
}

/// Mark every guide as seen, now and after every future character update.
pub fn grant_guides(store: &SqliteStore, enabled: bool) -> StepOutcome {
    if !enabled {
        return StepOutcome::NoOp;
    }
    match store.execute_batch(GRANT_GUIDES_SQL) {
        Ok(()) => {
            info!("Granted guides to all players");
            StepOutcome::Applied
        }
        Err(e) => {
            warn!(error = %e, "Granting guides failed");
            StepOutcome::Failed {
                error: e.to_string(),
            }
        }
    }
}

/// Game server id recorded in the store, or [`DEFAULT_SERVER_ID`].
fn server_id(store: &SqliteStore) -> i64 {
    match store.server_id() {
        Ok(Some(id)) => id,
        Ok(None) => {
            debug!("No server id in the database, using default");
            DEFAULT_SERVER_ID
        }
        Err(e) => {
            debug!(error = %e, "Server id lookup failed, using default");
            DEFAULT_SERVER_ID
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
