//! Player Record Store
//!
//! Persistence boundary for player records. Every backend gives
//! read-your-writes consistency and two atomic primitives the game layer
//! builds on: insert-if-absent and compare-and-swap on the move date.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::core::error::ErrorClass;
use crate::game::state::{PlayerId, PlayerRecord};

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Schema version written into stored documents and snapshots.
pub const SCHEMA_VERSION: u32 = 1;

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with this id already exists.
    #[error("player {0} already exists")]
    AlreadyExists(PlayerId),

    /// No record with this id.
    #[error("player {0} not found")]
    NotFound(PlayerId),

    /// The stored move date no longer matches the one the caller read.
    #[error("stale move date for player {id}: found {found:?}")]
    StaleMove {
        /// Player whose swap was refused.
        id: PlayerId,
        /// Move date currently stored.
        found: Option<NaiveDate>,
    },

    /// The new move date is earlier than the stored one.
    #[error("move date regression for player {id}: {new:?} is before {stored}")]
    DateRegression {
        /// Player whose swap was refused.
        id: PlayerId,
        /// Move date currently stored.
        stored: NaiveDate,
        /// Move date the caller tried to write.
        new: Option<NaiveDate>,
    },

    /// The replacement record carries a different id than its key.
    #[error("record id {found} does not match key {expected}")]
    IdMismatch {
        /// Key the swap targeted.
        expected: PlayerId,
        /// Id found in the replacement record.
        found: PlayerId,
    },

    /// Backing file could not be read or written.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be decoded.
    #[error("corrupt store data: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Error class for HTTP mapping and retry decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::AlreadyExists(_) => ErrorClass::Conflict,
            StoreError::NotFound(_) => ErrorClass::NotFound,
            StoreError::StaleMove { .. } => ErrorClass::Concurrency,
            StoreError::DateRegression { .. } | StoreError::IdMismatch { .. } => {
                ErrorClass::Validation
            }
            StoreError::Io(_) | StoreError::Corrupt(_) => ErrorClass::Persistence,
        }
    }
}

/// Persistence interface consumed by the game layer.
///
/// Implementations must make each method atomic with respect to the others.
#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// Fetch one record.
    async fn get_by_id(&self, id: &PlayerId) -> Result<Option<PlayerRecord>, StoreError>;

    /// Fetch every record, ordered by id.
    async fn get_all(&self) -> Result<Vec<PlayerRecord>, StoreError>;

    /// Insert a new record. Fails `AlreadyExists` if the id is taken.
    async fn insert_if_absent(&self, record: PlayerRecord) -> Result<(), StoreError>;

    /// Replace a record only if its stored move date equals `expected`.
    async fn compare_and_swap_on_move(
        &self,
        id: &PlayerId,
        expected: Option<NaiveDate>,
        record: PlayerRecord,
    ) -> Result<(), StoreError>;

    /// Remove every record.
    async fn delete_all(&self) -> Result<(), StoreError>;

    /// Release resources at shutdown.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Validate a swap against the currently stored record.
///
/// Shared by all backends so they refuse the same swaps.
pub(crate) fn check_swap(
    id: &PlayerId,
    current: Option<&PlayerRecord>,
    expected: Option<NaiveDate>,
    record: &PlayerRecord,
) -> Result<(), StoreError> {
    if record.id != *id {
        return Err(StoreError::IdMismatch {
            expected: id.clone(),
            found: record.id.clone(),
        });
    }

    let current = current.ok_or_else(|| StoreError::NotFound(id.clone()))?;

    if current.last_move_date != expected {
        return Err(StoreError::StaleMove {
            id: id.clone(),
            found: current.last_move_date,
        });
    }

    if let Some(stored) = current.last_move_date {
        if record.last_move_date.map_or(true, |new| new < stored) {
            return Err(StoreError::DateRegression {
                id: id.clone(),
                stored,
                new: record.last_move_date,
            });
        }
    }

    Ok(())
}
