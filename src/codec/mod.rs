// src/codec/mod.rs
//! Credential codec: VC and VP as compact signed tokens (`header.payload.signature`).
//!
//! Decoding yields structure only. Nothing decoded here has been checked against a key;
//! that is the verifier's job.

pub mod token;
pub mod vc;
pub mod vp;

/// JSON-LD contexts stamped on every credential and presentation body.
pub const W3C_CONTEXTS: [&str; 2] = [
    "https://www.w3.org/2018/credentials/v1",
    "https://www.w3.org/2018/credentials/examples/v1",
];
