// src/client/mod.rs
pub mod api_client;
