//! Nullable infrastructure for deterministic testing.
//!
//! Every external collaborator of a verification session (camera, frame
//! encoder, wallet provider, verification service) sits behind a trait.
//! This crate provides test-friendly implementations that:
//! - Return scripted, deterministic values
//! - Record what was asked of them for assertions
//! - Never touch a device, a browser wallet or the network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod media;
pub mod service;
pub mod wallet;

pub use media::{NullEncoder, NullMedia};
pub use service::{ScriptedVerificationService, ServiceCall};
pub use wallet::NullWallet;
