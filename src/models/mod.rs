// src/models/mod.rs
//! Data structures shared by the codec, engines and transport layers.

pub mod challenge;
pub mod check;
pub mod credential;
pub mod did;
pub mod presentation;
