//! Crypto and request-id helpers shared by the gateway crates.

pub mod crypto;

pub use lr_types::errors;
