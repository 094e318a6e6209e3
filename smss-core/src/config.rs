//! Configuration for the maintenance pass.
//!
//! Maps directly onto the timer-related keys of `smss.json`. The installer
//! keeps many other settings in the same file; unknown keys are ignored.
//!
//! Values are parsed leniently, once, at load time. A malformed value never
//! fails the load: it is logged and replaced by its documented default.

use std::path::Path;

use serde::de::{Deserializer, IgnoredAny};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SmssError};
use crate::types::{Category, ClanId, OwnerId};

/// Top-level configuration, loadable from JSON or TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmssConfig {
    /// Owners whose bases are always protected.
    #[serde(default, deserialize_with = "lenient_owner_ids")]
    pub reset_base_owner_ids: Vec<OwnerId>,
    /// Clans whose members' bases are protected.
    #[serde(default, deserialize_with = "lenient_clan_ids")]
    pub reset_base_clan_ids: Vec<ClanId>,
    /// Owners whose bases protect nearby tents.
    #[serde(default, deserialize_with = "lenient_owner_ids")]
    pub reset_tent_owner_ids: Vec<OwnerId>,
    /// Clans whose members' bases protect nearby tents.
    #[serde(default, deserialize_with = "lenient_clan_ids")]
    pub reset_tent_clan_ids: Vec<ClanId>,
    /// Owners whose bases protect nearby vehicles.
    #[serde(default, deserialize_with = "lenient_owner_ids")]
    pub reset_vehicle_owner_ids: Vec<OwnerId>,
    /// Clans whose members' bases protect nearby vehicles.
    #[serde(default, deserialize_with = "lenient_clan_ids")]
    pub reset_vehicle_clan_ids: Vec<ClanId>,

    /// Reset the abandon timer of every base.
    #[serde(default, deserialize_with = "lenient_flag")]
    pub reset_all_bases: bool,
    /// Reset the abandon timer of every tent.
    #[serde(default, deserialize_with = "lenient_flag")]
    pub reset_all_tents: bool,
    /// Reset the abandon timer of every vehicle.
    #[serde(default, alias = "reset_all_vechicles", deserialize_with = "lenient_flag")]
    pub reset_all_vehicles: bool,

    /// Abandon timer (seconds) forced onto every vehicle, if set to any
    /// non-zero value.
    #[serde(default, deserialize_with = "lenient_timer")]
    pub quick_vehicle_despawn: Option<i64>,

    /// Mark every tutorial guide as already seen for all players.
    #[serde(default, deserialize_with = "lenient_flag")]
    pub grant_guides: bool,
}

impl SmssConfig {
    /// Load configuration from a JSON string.
    ///
    /// # Errors
    /// Returns `SmssError::Config` if the document is not a JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SmssError::Config(e.to_string()))
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `SmssError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| SmssError::Config(e.to_string()))
    }

    /// Load configuration from a file. `.toml` files are read as TOML,
    /// everything else as JSON.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::from_toml(&content),
            _ => Self::from_json(&content),
        }
    }

    /// Explicitly configured owners for a category.
    #[must_use]
    pub fn owner_ids(&self, category: Category) -> &[OwnerId] {
        match category {
            Category::Base => &self.reset_base_owner_ids,
            Category::Tent => &self.reset_tent_owner_ids,
            Category::Vehicle => &self.reset_vehicle_owner_ids,
        }
    }

    /// Configured clans for a category.
    #[must_use]
    pub fn clan_ids(&self, category: Category) -> &[ClanId] {
        match category {
            Category::Base => &self.reset_base_clan_ids,
            Category::Tent => &self.reset_tent_clan_ids,
            Category::Vehicle => &self.reset_vehicle_clan_ids,
        }
    }

    /// Whether the "reset all" flag is set for a category.
    #[must_use]
    pub fn reset_all(&self, category: Category) -> bool {
        match category {
            Category::Base => self.reset_all_bases,
            Category::Tent => self.reset_all_tents,
            Category::Vehicle => self.reset_all_vehicles,
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient value parsing
// ---------------------------------------------------------------------------

/// Any scalar the config file may hold where a number or flag is expected.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Other(IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawList {
    Many(Vec<RawScalar>),
    One(RawScalar),
}

impl RawScalar {
    fn as_id(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(v) => Some(*v != 0),
            Self::Float(v) => Some(*v != 0.0),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" | "" => Some(false),
                _ => None,
            },
            Self::Other(_) => None,
        }
    }

    /// Seconds for a timer override; `Some(None)` means "disabled".
    #[allow(clippy::cast_possible_truncation, clippy::option_option)]
    fn as_timer(&self) -> Option<Option<i64>> {
        let seconds = match self {
            Self::Bool(false) => return Some(None),
            Self::Bool(true) => 1,
            Self::Int(v) => *v,
            Self::Float(v) if v.is_finite() => v.trunc() as i64,
            Self::Text(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(v) => v,
                    Err(_) => s.parse::<f64>().ok().filter(|v| v.is_finite())?.trunc() as i64,
                }
            }
            _ => return None,
        };
        Some((seconds != 0).then_some(seconds))
    }
}

fn lenient_ids<'de, D>(deserializer: D) -> std::result::Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawList>::deserialize(deserializer)?;
    let items = match raw {
        None => Vec::new(),
        Some(RawList::Many(items)) => items,
        Some(RawList::One(item)) => vec![item],
    };
    Ok(items
        .iter()
        .filter_map(|item| {
            let id = item.as_id();
            if id.is_none() {
                warn!(value = ?item, "Ignoring non-numeric id in configuration");
            }
            id
        })
        .collect())
}

fn lenient_owner_ids<'de, D>(deserializer: D) -> std::result::Result<Vec<OwnerId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_ids(deserializer)?.into_iter().map(OwnerId).collect())
}

fn lenient_clan_ids<'de, D>(deserializer: D) -> std::result::Result<Vec<ClanId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_ids(deserializer)?.into_iter().map(ClanId).collect())
}

fn lenient_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<RawScalar>::deserialize(deserializer)? else {
        return Ok(false);
    };
    Ok(raw.as_flag().unwrap_or_else(|| {
        warn!(value = ?raw, "Unrecognised flag value in configuration, using false");
        false
    }))
}

fn lenient_timer<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<RawScalar>::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(raw.as_timer().unwrap_or_else(|| {
        warn!(value = ?raw, "Invalid timer value in configuration, leaving it disabled");
        None
    }))
}
