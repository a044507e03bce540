//! Game Logic Module
//!
//! The turn and claim state machine over an injected store.
//!
//! ## Module Structure
//!
//! - `state`: Player records, identifiers, canonical defaults
//! - `registry`: Derived province occupancy view
//! - `claim`: First-time province selection
//! - `action`: Once-per-day action processing
//! - `snapshot`: Client-facing game document
//! - `engine`: Composition of the above

pub mod action;
pub mod claim;
pub mod engine;
pub mod registry;
pub mod snapshot;
pub mod state;

// Re-export key types
pub use action::{Action, ActionError, ActionProcessor, MoveState};
pub use claim::{ClaimError, ClaimRequest, ClaimResolver};
pub use engine::Engine;
pub use registry::ProvinceRegistry;
pub use snapshot::{GameState, PlayerView, SnapshotBuilder, SnapshotError};
pub use state::{PlayerId, PlayerRecord, ProvinceId, Provinces};
