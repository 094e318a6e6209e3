//! Core type definitions for the maintenance pass.
//!
//! Every row type here is a read-only snapshot taken from the server
//! database at the start of a category step; nothing is cached between
//! passes.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// External constants
// ---------------------------------------------------------------------------

/// Offset that turns a local `AccountID` into a platform-wide steam64 id.
pub const STEAM64_OFFSET: i64 = 76_561_197_960_265_728;

/// Abandon timer written for protected entities: 28 days in seconds.
pub const PROTECTED_ABANDON_TIMER: i64 = 2_419_200;

/// Planar radius around a protected base inside which tents and vehicles
/// are protected too. The boundary is inclusive.
pub const PROXIMITY_RADIUS: f64 = 30.0;

/// Structure class name that marks a base.
pub const PLOT_SIGN_CLASS: &str = "PlotSign";

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Steam64-style player identifier, as used in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl OwnerId {
    /// Convert a stored local account id into an owner id.
    #[must_use]
    pub fn from_account(account: AccountId) -> Self {
        Self(account.0 + STEAM64_OFFSET)
    }

    /// The local account id this owner id was derived from.
    #[must_use]
    pub fn account_id(self) -> AccountId {
        AccountId(self.0 - STEAM64_OFFSET)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Local account id as stored in the `AccountID` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Clan identifier, supplied only through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClanId(pub i64);

impl fmt::Display for ClanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row id of a structure (`StructureID`) or a vehicle (`VehicleID`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub i64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Spatial Types
// ---------------------------------------------------------------------------

/// Planar position in world units (`PosX`, `PosY`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
}

impl Position {
    /// Create a new position.
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean planar distance to another position.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

// ---------------------------------------------------------------------------
// Entity rows
// ---------------------------------------------------------------------------

/// A base: one `PlotSign` structure and the owner that placed it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Base {
    /// Owner of the plot sign.
    pub owner: OwnerId,
    /// Plot sign position.
    pub position: Position,
}

/// A tent: any structure whose class name contains "tent".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tent {
    /// `StructureID` of the tent.
    pub id: EntityId,
    /// Tent position.
    pub position: Position,
}

/// A vehicle row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// `VehicleID` of the vehicle.
    pub id: EntityId,
    /// Vehicle position.
    pub position: Position,
}

/// Anything with an id and a position that can be protected by proximity.
pub trait Positioned {
    /// Row id used in the update filter.
    fn entity_id(&self) -> EntityId;
    /// Snapshot position.
    fn position(&self) -> Position;
}

impl Positioned for Tent {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn position(&self) -> Position {
        self.position
    }
}

impl Positioned for Vehicle {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn position(&self) -> Position {
        self.position
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Entity category with its own exclusion set and reset policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Plot-sign bases.
    Base,
    /// Tents near protected bases.
    Tent,
    /// Vehicles near protected bases.
    Vehicle,
}

impl Category {
    /// All categories in pass order.
    pub const ALL: [Self; 3] = [Self::Base, Self::Tent, Self::Vehicle];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Base => "base",
            Self::Tent => "tent",
            Self::Vehicle => "vehicle",
        };
        f.write_str(name)
    }
}
