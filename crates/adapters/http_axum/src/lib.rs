//! # hubhist-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve a **JSON API** for history extracts, reports, deletes, row
//!   counts and update statistics (`/api/v1/history/…`)
//! - Map HTTP requests into `HistoryService` calls (driving adapter)
//! - Bound every request with a timeout and cancel the storage work when the
//!   request times out or is dropped
//! - Map application results and errors into HTTP responses
//!
//! ## Dependency rule
//! Depends on `hubhist-app` (for port traits and services) and `hubhist-domain`
//! (for domain types used in request/response mapping). Never leaks axum types
//! into the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;
