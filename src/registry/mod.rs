// src/registry/mod.rs
//! DID registry: resolution of DIDs to their currently registered keys.

pub mod did_registry;
