//! Fundamental types for the identity verification client.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! wallet addresses, timestamps, captured still images, and document records.

pub mod address;
pub mod document;
pub mod error;
pub mod image;
pub mod time;

pub use address::WalletAddress;
pub use document::{ContentAddress, DocumentRecord, DocumentType, LedgerReference};
pub use error::TypesError;
pub use image::{ImageMime, StillImage};
pub use time::Timestamp;
