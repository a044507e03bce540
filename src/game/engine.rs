//! Turn Engine
//!
//! Composition root for the game components. One store and one clock are
//! injected here and shared by the claim resolver, action processor and
//! snapshot builder.

use std::sync::Arc;

use tracing::info;

use crate::core::clock::Clock;
use crate::game::action::{Action, ActionError, ActionProcessor};
use crate::game::claim::{ClaimError, ClaimRequest, ClaimResolver};
use crate::game::snapshot::{GameState, SnapshotBuilder, SnapshotError};
use crate::game::state::PlayerId;
use crate::store::{PlayerStore, StoreError};

/// The authoritative turn engine.
pub struct Engine {
    store: Arc<dyn PlayerStore>,
    claims: ClaimResolver,
    actions: ActionProcessor,
    snapshots: SnapshotBuilder,
}

impl Engine {
    /// Wire the components around a store and clock.
    pub fn new(store: Arc<dyn PlayerStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            claims: ClaimResolver::new(store.clone()),
            actions: ActionProcessor::new(store.clone(), clock),
            snapshots: SnapshotBuilder::new(store.clone()),
            store,
        }
    }

    /// Handle a new player's claim.
    pub async fn claim(&self, request: ClaimRequest) -> Result<(), ClaimError> {
        self.claims.claim(request).await
    }

    /// Handle an existing player's daily action.
    pub async fn apply(&self, player_id: &PlayerId, action: &Action) -> Result<(), ActionError> {
        self.actions.apply(player_id, action).await
    }

    /// Current game document.
    pub async fn snapshot(&self) -> Result<GameState, SnapshotError> {
        self.snapshots.snapshot().await
    }

    /// Administrative reset: drop the whole population.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.delete_all().await?;
        info!("game state cleared");
        Ok(())
    }

    /// Close the underlying store.
    pub async fn close(&self) -> Result<(), StoreError> {
        self.store.close().await
    }
}
