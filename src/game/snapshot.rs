//! Snapshot Builder
//!
//! Read-only projection of the store into the document clients poll.
//! Players are keyed in a BTreeMap so two snapshots of the same state
//! serialize to the same bytes.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::core::error::ErrorClass;
use crate::core::hash::{digest_game_state, StateHash};
use crate::game::state::{PlayerId, PlayerRecord, ProvinceId, Provinces};
use crate::store::{PlayerStore, StoreError, SCHEMA_VERSION};

/// One player as clients see them, defaults applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    /// Player identifier.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Day of the last accepted action.
    pub last_move_date: Option<NaiveDate>,
    /// Held territory.
    pub provinces: Provinces,
    /// Field army location.
    pub army_position: ProvinceId,
    /// Field army strength.
    pub army_power: u32,
    /// Garrison strength.
    pub garrison_power: u32,
    /// Gold stock.
    pub gold: u32,
    /// Wood stock.
    pub wood: u32,
    /// Food stock.
    pub food: u32,
}

impl From<&PlayerRecord> for PlayerView {
    fn from(record: &PlayerRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.display_name(),
            last_move_date: record.last_move_date,
            provinces: record.provinces.clone(),
            army_position: record.army_position().clone(),
            army_power: record.army_power,
            garrison_power: record.garrison_power,
            gold: record.gold,
            wood: record.wood,
            food: record.food,
        }
    }
}

/// The full client-facing game document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameState {
    /// Schema version, not a change counter.
    pub version: u32,
    /// Every player, by id.
    pub players: BTreeMap<PlayerId, PlayerView>,
}

impl GameState {
    /// Build from a set of records.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a PlayerRecord>) -> Self {
        let players = records
            .into_iter()
            .map(|r| (r.id.clone(), PlayerView::from(r)))
            .collect();
        Self {
            version: SCHEMA_VERSION,
            players,
        }
    }

    /// Serialize to the wire form.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Digest of the wire form.
    pub fn digest(&self) -> Result<StateHash, serde_json::Error> {
        Ok(digest_game_state(&self.to_json()?))
    }
}

/// Snapshot errors.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The store could not be read.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl SnapshotError {
    /// Error class for HTTP mapping.
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Persistence
    }
}

/// Builds [`GameState`] documents.
pub struct SnapshotBuilder {
    store: Arc<dyn PlayerStore>,
}

impl SnapshotBuilder {
    /// Create a builder over a shared store.
    pub fn new(store: Arc<dyn PlayerStore>) -> Self {
        Self { store }
    }

    /// Read every player and project them.
    pub async fn snapshot(&self) -> Result<GameState, SnapshotError> {
        let records = self.store.get_all().await?;
        debug!(players = records.len(), "building snapshot");
        Ok(GameState::from_records(&records))
    }
}
