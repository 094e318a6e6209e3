//! # SMSS Core Library
//!
//! Database maintenance for a Miscreated dedicated server, run once before
//! every server start.
//!
//! The heart of the crate is abandon-timer protection. Three entity
//! categories are handled independently:
//!
//! - **Bases**: plot signs owned by protected players are reset to 28 days.
//! - **Tents**: tents within 30 units of a protected base are reset.
//! - **Vehicles**: same proximity rule as tents, plus an optional
//!   "quick despawn" override that shortens every vehicle timer.
//!
//! Protected players come from configuration, either directly or through
//! clan membership. Everything is recomputed from the database on every
//! pass; nothing is kept between passes.
//!
//! The library never installs a log subscriber. Callers pass the parent
//! span a pass should be recorded under.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clans;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod persistence;
pub mod proximity;
pub mod timers;
pub mod types;

pub use config::SmssConfig;
pub use error::SmssError;
pub use maintenance::{run_maintenance_pass, PassReport};
pub use types::*;
