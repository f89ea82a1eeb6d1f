//! REST API client module for the minigame admin backend.
//!
//! This module provides the `ApiClient` for logging admins in and keeping
//! their profile current. Authenticated calls carry the bearer token held
//! by the `SessionStore`.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
