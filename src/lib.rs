// src/lib.rs

//! # DID / VC / VP System
//!
//! Issuance and verification of Verifiable Credentials and Verifiable Presentations over
//! DIDs, with one-time challenges binding every presentation to its verifier.
//!
//! ## Architecture Overview
//! 1. **Codec**: compact signed tokens for credentials and presentations
//! 2. **Registry**: DID -> public key resolution, creation and key rotation
//! 3. **Services**: challenge manager, issuance and verification engines, demo flow, API
//! 4. **Wallet**: key pairs, signing capability and holder credential storage
//! 5. **Client**: HTTP access to a running service

pub mod client; // HTTP client for the demo API
pub mod codec; // VC / VP token encoding
pub mod config; // Layered settings
pub mod error; // Error types
pub mod models; // Data structures
pub mod registry; // DID registry
pub mod services; // Business logic and API
pub mod utils; // Helper functions
pub mod wallet; // Key operations and credential storage
