//! laterq capacity service library.
//!
//! This crate primarily ships a `capacity-service` binary, but we expose a
//! library surface to enable integration testing and reuse.

pub mod api;
pub mod capacity;
pub mod config;
pub mod db;
pub mod push;
pub mod state;
pub mod store;
