// src/utils/mod.rs
//! Small helpers shared by the codec, registry and engines.

pub mod crypto;
pub mod serialization;
pub mod time;
