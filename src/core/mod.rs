//! Core primitives shared by the game and network layers.

pub mod clock;
pub mod error;
pub mod hash;

pub use clock::{Clock, FixedClock, LocalClock};
pub use error::ErrorClass;
pub use hash::{etag_matches, to_etag, StateHash};
