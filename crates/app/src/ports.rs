//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod interval_repository;
pub mod observation_bus;

pub use interval_repository::IntervalRepository;
pub use observation_bus::ObservationPublisher;
