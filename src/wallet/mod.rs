// src/wallet/mod.rs
//! Holder-side key material and credential storage.

pub mod credential_storage;
pub mod key_management;
