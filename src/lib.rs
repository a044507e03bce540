//! # Conquest Turn Server
//!
//! Authoritative turn engine for an asynchronous territory-conquest game.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CONQUEST SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  ├── clock.rs    - Injectable calendar-day clock             │
//! │  ├── error.rs    - Error classes                             │
//! │  └── hash.rs     - Snapshot digests for ETags                │
//! │                                                              │
//! │  store/          - Player persistence                        │
//! │  ├── memory.rs   - In-memory store                           │
//! │  └── file.rs     - Atomic JSON file store                    │
//! │                                                              │
//! │  game/           - Turn and claim rules                      │
//! │  ├── state.rs    - Player records and defaults               │
//! │  ├── registry.rs - Province occupancy                        │
//! │  ├── claim.rs    - Starting province claims                  │
//! │  ├── action.rs   - Once-per-day actions                      │
//! │  ├── snapshot.rs - Client game document                      │
//! │  └── engine.rs   - Composition root                          │
//! │                                                              │
//! │  network/        - HTTP surface                              │
//! │  ├── server.rs   - axum router and server                    │
//! │  └── protocol.rs - Request and response bodies               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - No two players hold the same province.
//! - A player's capital never changes once claimed.
//! - At most one action per player per calendar day.
//! - Snapshots of the same state serialize to identical bytes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use crate::core::clock::{Clock, FixedClock, LocalClock};
pub use game::engine::Engine;
pub use game::state::{PlayerId, PlayerRecord, ProvinceId, Provinces};
pub use store::{file::JsonFileStore, memory::MemoryStore, PlayerStore, StoreError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
