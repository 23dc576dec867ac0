//! REST API client module for the ERP backend.
//!
//! This module provides the `ApiClient` for the auth endpoints (session
//! check/refresh and login) and for authenticated ledger queries, plus the
//! `AuthApi` trait the session manager uses so tests and alternative
//! transports can stand in for HTTP.

pub mod client;
pub mod error;

pub use client::{ApiClient, AuthApi, AuthCheckResponse, LoginRequest};
pub use error::ApiError;
