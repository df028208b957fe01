//! Core library for dicomview.
//!
//! - `api`: `AuthSession`, the bearer-token HTTP client with refresh-and-retry
//! - `auth`: session state, its persistence, and OS keychain credentials
//! - `config`: base URL resolution and the on-disk config file
//! - `models`: study manifest types consumed by the viewer
//! - `viewer`: series/slice selection, imaging toolkit seam, prefetch

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod viewer;

pub use api::{ApiError, AuthSession, RequestOptions};
pub use auth::{Session, SessionState, SessionStore};
pub use config::Config;
