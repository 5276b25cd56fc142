//! # hubhist-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `IntervalRepository` — update, query, delete and count history intervals
//!   - `ObservationPublisher` — publish observations to in-process subscribers
//! - Define **driving/inbound ports** as use-case structs:
//!   - `HistoryService` — report observations, build extracts, delete, count
//!   - `HistoryRecorder` — feed the service from the observation bus
//! - Provide **in-process infrastructure** (observation bus, value formatter)
//!   that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `hubhist-domain` only (plus `tokio::sync` for channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod blacklist;
pub mod observation_bus;
pub mod ports;
pub mod recorder;
pub mod services;
pub mod value_formatter;
