//! Pacer core: mutation records, merge engine, strategy configuration, and wire envelope.
//!
//! Runtime-free building blocks shared by the client. Nothing in this crate
//! spawns tasks or reads timers.

pub mod clock;
pub mod error;
pub mod merge;
pub mod mutation;
pub mod strategy;
pub mod types;
pub mod wire;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use error::{ConfigError, WireError};
pub use merge::{apply_mutations, merge, merge_pending};
pub use mutation::{MutationType, PendingMutation};
pub use strategy::{DebounceOptions, QueueOptions, Strategy, ThrottleOptions};
pub use types::{fields, Changes, EntityKey, Fields, Value};
pub use wire::MutationBatch;
