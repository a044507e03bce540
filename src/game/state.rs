//! Player State Definitions
//!
//! The persistent per-player record and its identifiers.
//! Uses BTreeMap/BTreeSet so serialized output has a stable order.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// DEFAULTS
// =============================================================================

/// Canonical starting values, used both at claim time and when decoding
/// records written without these fields.
pub mod defaults {
    /// Starting gold.
    pub const GOLD: u32 = 500;
    /// Starting wood.
    pub const WOOD: u32 = 250;
    /// Starting food.
    pub const FOOD: u32 = 1000;
    /// Starting field army strength.
    pub const ARMY_POWER: u32 = 1800;
    /// Starting garrison strength.
    pub const GARRISON_POWER: u32 = 2500;

    pub(crate) fn gold() -> u32 {
        GOLD
    }
    pub(crate) fn wood() -> u32 {
        WOOD
    }
    pub(crate) fn food() -> u32 {
        FOOD
    }
    pub(crate) fn army_power() -> u32 {
        ARMY_POWER
    }
    pub(crate) fn garrison_power() -> u32 {
        GARRISON_POWER
    }
}

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Opaque player identifier.
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Create from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty identifier.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Opaque province identifier. The map itself lives outside this server.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvinceId(String);

impl ProvinceId {
    /// Create from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty identifier.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ProvinceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProvinceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// PROVINCES
// =============================================================================

/// A player's territory: a fixed capital plus captured provinces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provinces {
    /// Home province. Never removed.
    pub capital: ProvinceId,
    /// Everything else the player holds. Grows only.
    #[serde(default)]
    pub others: BTreeSet<ProvinceId>,
}

impl Provinces {
    /// Create a territory from a capital and its starting provinces.
    pub fn new(capital: ProvinceId, others: impl IntoIterator<Item = ProvinceId>) -> Self {
        Self {
            capital,
            others: others.into_iter().collect(),
        }
    }

    /// Whether the player holds `province` (capital included).
    pub fn contains(&self, province: &ProvinceId) -> bool {
        self.capital == *province || self.others.contains(province)
    }

    /// Iterate `{capital} ∪ others`, capital first.
    pub fn occupied(&self) -> impl Iterator<Item = &ProvinceId> {
        std::iter::once(&self.capital).chain(self.others.iter())
    }

    /// Add a captured province. Returns false if it was already held.
    pub fn capture(&mut self, province: ProvinceId) -> bool {
        if self.contains(&province) {
            return false;
        }
        self.others.insert(province)
    }

    /// Number of provinces held, capital included.
    pub fn len(&self) -> usize {
        1 + self.others.len()
    }

    /// Always false: a capital is always held.
    pub fn is_empty(&self) -> bool {
        false
    }
}

// =============================================================================
// PLAYER RECORD
// =============================================================================

/// The authoritative stored state of one player.
///
/// Field names are camelCase on the wire. Decoding also accepts the
/// snake_case names written by earlier server versions, and fills absent
/// numeric fields with the [`defaults`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    /// Player identifier. Older files only carry it as the map key.
    #[serde(default)]
    pub id: PlayerId,
    /// Display name. Empty means "use the default".
    #[serde(default)]
    pub name: String,
    /// Day of the last accepted action, or None if never moved.
    #[serde(default, alias = "last_move_date", with = "move_date")]
    pub last_move_date: Option<NaiveDate>,
    /// Held territory.
    #[serde(deserialize_with = "provinces_field")]
    pub provinces: Provinces,
    /// Where the field army stands. None means "at the capital".
    #[serde(default, alias = "army_position", skip_serializing_if = "Option::is_none")]
    pub army_position: Option<ProvinceId>,
    /// Field army strength.
    #[serde(default = "defaults::army_power", alias = "army_power")]
    pub army_power: u32,
    /// Defensive strength. Never touched by actions.
    #[serde(default = "defaults::garrison_power", alias = "garrison_power")]
    pub garrison_power: u32,
    /// Gold stock.
    #[serde(default = "defaults::gold")]
    pub gold: u32,
    /// Wood stock.
    #[serde(default = "defaults::wood")]
    pub wood: u32,
    /// Food stock.
    #[serde(default = "defaults::food")]
    pub food: u32,
}

impl PlayerRecord {
    /// Build the record created by a successful claim.
    ///
    /// The player has not moved yet, so they may act on the claim day.
    pub fn claimed(id: PlayerId, provinces: Provinces) -> Self {
        let army_position = Some(provinces.capital.clone());
        Self {
            name: default_name(&id),
            id,
            last_move_date: None,
            provinces,
            army_position,
            army_power: defaults::ARMY_POWER,
            garrison_power: defaults::GARRISON_POWER,
            gold: defaults::GOLD,
            wood: defaults::WOOD,
            food: defaults::FOOD,
        }
    }

    /// Army position with the capital fallback applied.
    pub fn army_position(&self) -> &ProvinceId {
        self.army_position.as_ref().unwrap_or(&self.provinces.capital)
    }

    /// Display name with the default applied.
    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            default_name(&self.id)
        } else {
            self.name.clone()
        }
    }

    /// Check the structural invariants a decoded record must satisfy.
    pub fn check_integrity(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("empty player id".to_string());
        }
        if self.provinces.capital.is_empty() {
            return Err(format!("player {} has an empty capital", self.id));
        }
        if self.provinces.others.iter().any(ProvinceId::is_empty) {
            return Err(format!("player {} holds an empty province id", self.id));
        }
        Ok(())
    }
}

/// Default display name for a new player.
pub fn default_name(id: &PlayerId) -> String {
    format!("Player {}", id)
}

/// Calendar dates as `YYYY-MM-DD`; empty string and null both mean unset.
mod move_date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => s.serialize_str(&d.format(FORMAT).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => NaiveDate::parse_from_str(text, FORMAT)
                .map(Some)
                .map_err(|e| de::Error::custom(format!("invalid move date {text:?}: {e}"))),
        }
    }
}

/// Provinces either inline or as an embedded JSON string (the SQL-backed
/// server versions stored the set in a text column). A malformed embedded
/// document is a decode error.
fn provinces_field<'de, D: Deserializer<'de>>(d: D) -> Result<Provinces, D::Error> {
    use serde::de::Error;

    let value = serde_json::Value::deserialize(d)?;
    match value {
        serde_json::Value::String(text) => serde_json::from_str(&text)
            .map_err(|e| D::Error::custom(format!("malformed embedded provinces JSON: {e}"))),
        other => serde_json::from_value(other).map_err(D::Error::custom),
    }
}
