//! Authentication module for managing the admin session.
//!
//! This module provides:
//! - `Principal` / `PrincipalPatch`: the signed-in admin and partial updates to it
//! - `SessionStore`: thread-safe session state mirrored to a durable slot
//!
//! The store rehydrates once at construction and writes through on every
//! mutation. Storage failures never reach the caller.

pub mod principal;
pub mod session;

pub use principal::{PatchError, Principal, PrincipalId, PrincipalPatch};
pub use session::{
    SessionSnapshot, SessionState, SessionStore, SessionStoreBuilder, StorageKeys,
    DEFAULT_SNAPSHOT_KEY, DEFAULT_TOKEN_KEY,
};
