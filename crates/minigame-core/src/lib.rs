//! Core library for the minigame admin tools.
//!
//! The centerpiece is [`SessionStore`]: the signed-in admin, their bearer
//! token and a derived authenticated flag, mirrored to a [`DurableSlot`] so
//! the session survives restarts. Around it sit the slot backends, the
//! configuration layer and an API client that consumes the session.

pub mod api;
pub mod auth;
pub mod config;
pub mod storage;

pub use api::{ApiClient, ApiError};
pub use auth::{Principal, PrincipalId, PrincipalPatch, SessionState, SessionStore, StorageKeys};
pub use config::{Config, StorageBackend};
pub use storage::{DurableSlot, StorageError};
