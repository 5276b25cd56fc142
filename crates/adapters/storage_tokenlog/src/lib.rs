//! # hubhist-adapter-storage-tokenlog
//!
//! File persistence adapter storing history as append-only token logs.
//!
//! ## Responsibilities
//! - Implement the `IntervalRepository` port defined in `hubhist-app::ports`
//! - Map each `(component, status, day)` to one shard file under
//!   `<root>/History/<component>/<status>/<yyyy>/<mm>/<dd>`
//! - Navigate shards token by token, forward and backward, and patch the
//!   last interval's end in place
//! - Serialize operations per series with timed locks
//!
//! ## Dependency rule
//! Depends on `hubhist-app` (for port traits) and `hubhist-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod config;
pub mod error;
pub mod layout;
pub mod locks;
pub mod repository;
pub mod stream;

pub use config::Config;
pub use repository::{LogStore, TokenLogRepository};
