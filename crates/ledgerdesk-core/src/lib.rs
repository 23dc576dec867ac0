//! Core library for ledgerdesk.
//!
//! Owns the authenticated-session lifecycle of the ERP client (restore,
//! activity-driven refresh, login, logout) along with the collaborators it
//! talks to: the auth API client, the encoded session store, and the
//! notification and navigation surfaces a front end plugs in.

pub mod activity;
pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod ledger;
pub mod navigate;
pub mod notify;
pub mod session;

pub use activity::{ActivityKind, RefreshRule, RefreshThrottle};
pub use api::{ApiClient, ApiError, AuthApi};
pub use auth::{AccountType, RecordCodec, SessionStore, UserRecord};
pub use config::{Config, FailurePolicy, SessionConfig, StorageBackend};
pub use navigate::{Navigator, RouteHistory};
pub use notify::{Notification, NotificationQueue, Notifier, Severity};
pub use session::{
    Credentials, RestoreOutcome, SessionError, SessionManager, SessionPhase, SessionState,
};
