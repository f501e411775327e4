//! Local collections whose writes become optimistic mutations.

pub mod observer;
pub mod store;

pub use observer::{CollectionObserver, CompositeCollectionObserver};
pub use store::Collection;
