//! In-memory adapters for development and tests.

mod account_store;

pub use account_store::InMemoryAccountStore;
