//! # kin-core
//!
//! Plain data types shared across the Kindred crates:
//! - [`UserProfile`] returned by the backend current-user endpoint
//! - [`SessionState`] for the session lifecycle state machine
//! - [`InvalidationReason`] carried on the invalidation bus

pub mod identity;
pub mod invalidation;
pub mod state;

pub use identity::UserProfile;
pub use invalidation::InvalidationReason;
pub use state::SessionState;
