//! Billing Bridge - multi-provider subscription billing core
//!
//! Puts card and wallet payment processors behind one provider contract,
//! reconciles their webhook deliveries into canonical account subscription
//! state, and migrates stored billing identifiers between the legacy card
//! fields and the provider-agnostic ones.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
