//! # hubhist-domain
//!
//! Pure domain model for the hub's status history.
//!
//! ## Responsibilities
//! - Foundational types: error conventions, timestamps
//! - Define **Observations** (a status value reported at an instant) and the
//!   **Series** they belong to
//! - Define **Intervals** (a value held over a time range) and the queries
//!   that read them back
//! - Define the **token codec** used by the interval log
//! - Build **Extracts** (text change logs and sampled number series)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod time;

pub mod day_path;
pub mod extract;
pub mod interval;
pub mod observation;
pub mod token;
