//! Authentication records and their persistence.
//!
//! This module provides:
//! - `UserRecord`: the authenticated user and its token pair
//! - `RecordCodec`: obfuscated string encoding of a record
//! - `SessionStore`: the slot the encoded record lives in, backed by a
//!   data-directory file (`FileStore`), the OS keychain (`KeyringStore`),
//!   or process memory (`MemoryStore`)

pub mod codec;
pub mod credentials;
pub mod record;
pub mod store;

pub use codec::{CodecError, RecordCodec};
pub use credentials::KeyringStore;
pub use record::{AccountType, UserRecord};
pub use store::{FileStore, MemoryStore, SessionStore};
