//! Violation records and the bounded store.

pub mod store;

pub use store::{ViolationKind, ViolationRecord, ViolationStore};
