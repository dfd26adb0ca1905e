//! # kin-auth
//!
//! Client-side session and bearer-token lifecycle for Kindred.
//!
//! Exchanges identity-provider credentials for backend tokens, caches and
//! persists the token in a single storage slot, refreshes it through one
//! shared in-flight exchange, and tears the session down when the
//! invalidation bus or the identity provider says so.
//!
//! The identity provider, the backend endpoints and the application query
//! cache are collaborators behind traits; `reqwest` implementations of the
//! backend endpoints live in [`http`].

pub mod cache;
pub mod consumer;
pub mod error;
pub mod exchange;
pub mod http;
pub mod identity;
pub mod invalidation;
pub mod session;
pub mod single_flight;
pub mod slot;
pub mod token;
pub mod token_store;

pub use cache::{NoopQueryCache, QueryCache};
pub use consumer::{SessionConsumer, SessionSnapshot};
pub use error::AuthError;
pub use exchange::{CurrentUserClient, ExchangeClient, ExchangeGrant};
pub use identity::{Credential, IdentityAdapter, IdentityEvent};
pub use invalidation::InvalidationBus;
pub use session::{Collaborators, ListenerGuard, SessionManager};
pub use slot::{FileSlot, KeyringSlot, MemorySlot, TokenSlot};
pub use token::Token;
pub use token_store::TokenStore;
