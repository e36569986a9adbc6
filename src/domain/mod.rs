//! Domain layer - billing value objects and pure business rules.
//!
//! Nothing in here performs I/O. Provider calls and persistence live behind
//! the traits in [`crate::ports`].

pub mod billing;
pub mod foundation;
