//! REST API client module for the dicomview backend.
//!
//! This module provides `AuthSession` for talking to the backend's
//! `/api/auth/*` endpoints and for issuing authenticated requests.
//!
//! Requests carry a bearer access token. When the server answers 401 the
//! client refreshes the token once and retries the request once.

pub mod client;
pub mod error;
pub mod types;

pub use client::{AuthSession, RequestOptions};
pub use error::ApiError;
pub use types::{AuthResponse, Credentials, SignupRequest, UserInfo};
