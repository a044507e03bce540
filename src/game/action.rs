//! Action Processor
//!
//! The per-day state machine. A player who has not moved today may submit
//! one action; it is applied to a copy of their record and written back
//! with a compare-and-swap keyed on the move date that was read.
//!
//! Map topology and combat live outside this server: `moveArmy` does not
//! check adjacency and `captureProvince` does not check who else holds the
//! province. Callers are trusted on both.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::clock::Clock;
use crate::core::error::ErrorClass;
use crate::game::state::{PlayerId, PlayerRecord, ProvinceId};
use crate::store::{PlayerStore, StoreError};

/// Reads before giving up on a contended record.
const MAX_ATTEMPTS: usize = 2;

// =============================================================================
// ACTIONS
// =============================================================================

/// A player's submission for the day.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    /// Pass the day.
    #[serde(rename_all = "camelCase")]
    Idle {
        /// New army strength, if reported.
        #[serde(default, alias = "army_power")]
        army_power: Option<u32>,
    },

    /// Reposition the field army.
    #[serde(rename_all = "camelCase")]
    MoveArmy {
        /// Destination province.
        #[serde(alias = "to_province")]
        to_province: ProvinceId,
        /// New army strength, if reported.
        #[serde(default, alias = "army_power")]
        army_power: Option<u32>,
    },

    /// Take a province after combat resolved elsewhere.
    #[serde(rename_all = "camelCase")]
    CaptureProvince {
        /// Captured province.
        province: ProvinceId,
        /// New army strength, if reported.
        #[serde(default, alias = "army_power")]
        army_power: Option<u32>,
    },
}

impl Action {
    /// Tags this processor understands.
    pub const KNOWN_TYPES: [&'static str; 3] = ["idle", "moveArmy", "captureProvince"];

    /// Decode a submitted action.
    ///
    /// An absent or null action, or an object without a `type`, is `idle`.
    /// Unknown tags are `UnknownAction`; known tags with bad fields are
    /// `InvalidAction`.
    pub fn from_json(value: Option<Value>) -> Result<Self, ActionError> {
        let mut object = match value {
            None | Some(Value::Null) => return Ok(Action::Idle { army_power: None }),
            Some(Value::Object(object)) => object,
            Some(other) => {
                return Err(ActionError::InvalidAction(format!(
                    "action must be an object, got {other}"
                )))
            }
        };

        match object.get("type") {
            None | Some(Value::Null) => {
                object.insert("type".into(), Value::String("idle".into()));
            }
            Some(Value::String(tag)) => {
                if !Self::KNOWN_TYPES.contains(&tag.as_str()) {
                    return Err(ActionError::UnknownAction(tag.clone()));
                }
            }
            Some(other) => {
                return Err(ActionError::InvalidAction(format!(
                    "action type must be a string, got {other}"
                )))
            }
        }

        let action: Action = serde_json::from_value(Value::Object(object))
            .map_err(|e| ActionError::InvalidAction(e.to_string()))?;
        action.check_targets()?;
        Ok(action)
    }

    /// Refuse blank province ids: a stored record must never hold one.
    fn check_targets(&self) -> Result<(), ActionError> {
        match self {
            Action::MoveArmy { to_province, .. } if to_province.is_empty() => {
                Err(ActionError::InvalidAction("toProvince is empty".into()))
            }
            Action::CaptureProvince { province, .. } if province.is_empty() => {
                Err(ActionError::InvalidAction("province is empty".into()))
            }
            _ => Ok(()),
        }
    }

    /// Tag name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Idle { .. } => "idle",
            Action::MoveArmy { .. } => "moveArmy",
            Action::CaptureProvince { .. } => "captureProvince",
        }
    }

    fn army_power(&self) -> Option<u32> {
        match self {
            Action::Idle { army_power }
            | Action::MoveArmy { army_power, .. }
            | Action::CaptureProvince { army_power, .. } => *army_power,
        }
    }

    /// Produce the record after this action on `today`.
    pub fn apply_to(&self, record: &PlayerRecord, today: NaiveDate) -> PlayerRecord {
        let mut next = record.clone();
        next.last_move_date = Some(today);

        match self {
            Action::Idle { .. } => {}
            Action::MoveArmy { to_province, .. } => {
                next.army_position = Some(to_province.clone());
            }
            Action::CaptureProvince { province, .. } => {
                next.provinces.capture(province.clone());
                next.army_position = Some(province.clone());
            }
        }

        if let Some(power) = self.army_power() {
            next.army_power = power;
        }

        next
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Action errors.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// No record for this player.
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),

    /// Player has already acted today.
    #[error("player {0} has already moved today")]
    AlreadyMoved(PlayerId),

    /// Unrecognized action tag.
    #[error("unknown action type {0:?}")]
    UnknownAction(String),

    /// Recognized tag with missing or malformed fields.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// Lost the compare-and-swap on every attempt.
    #[error("player {0} was modified concurrently, retry")]
    ConcurrentModification(PlayerId),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ActionError {
    /// Error class for HTTP mapping and retry decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            ActionError::PlayerNotFound(_) => ErrorClass::NotFound,
            ActionError::AlreadyMoved(_) => ErrorClass::Conflict,
            ActionError::UnknownAction(_) | ActionError::InvalidAction(_) => ErrorClass::Validation,
            ActionError::ConcurrentModification(_) => ErrorClass::Concurrency,
            ActionError::Store(e) => e.class(),
        }
    }
}

// =============================================================================
// PROCESSOR
// =============================================================================

/// Per-day move state of a record relative to `today`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveState {
    /// May act.
    NotMoved,
    /// Already acted; waits for the date to change.
    Moved,
}

impl MoveState {
    /// Gate a record against the current date.
    ///
    /// A stored date after `today` (the wall clock stepped back) also
    /// counts as moved, so the stored date never goes backwards.
    pub fn of(record: &PlayerRecord, today: NaiveDate) -> Self {
        match record.last_move_date {
            Some(last) if last >= today => MoveState::Moved,
            _ => MoveState::NotMoved,
        }
    }
}

/// Applies daily actions.
pub struct ActionProcessor {
    store: Arc<dyn PlayerStore>,
    clock: Arc<dyn Clock>,
}

impl ActionProcessor {
    /// Create a processor over a shared store and clock.
    pub fn new(store: Arc<dyn PlayerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Apply the player's action for today.
    #[instrument(skip(self, player_id, action), fields(player = %player_id, action = action.kind()))]
    pub async fn apply(&self, player_id: &PlayerId, action: &Action) -> Result<(), ActionError> {
        action.check_targets()?;
        let today = self.clock.today();

        for attempt in 1..=MAX_ATTEMPTS {
            let record = self
                .store
                .get_by_id(player_id)
                .await?
                .ok_or_else(|| ActionError::PlayerNotFound(player_id.clone()))?;

            if MoveState::of(&record, today) == MoveState::Moved {
                debug!(last = ?record.last_move_date, "action refused, already moved");
                return Err(ActionError::AlreadyMoved(player_id.clone()));
            }

            let next = action.apply_to(&record, today);

            match self
                .store
                .compare_and_swap_on_move(player_id, record.last_move_date, next)
                .await
            {
                Ok(()) => {
                    info!(%today, "action applied");
                    return Ok(());
                }
                Err(StoreError::StaleMove { found, .. }) => {
                    debug!(attempt, ?found, "lost move race, re-reading");
                }
                Err(StoreError::NotFound(id)) => return Err(ActionError::PlayerNotFound(id)),
                Err(e) => return Err(e.into()),
            }
        }

        warn!("giving up after repeated move conflicts");
        Err(ActionError::ConcurrentModification(player_id.clone()))
    }
}
