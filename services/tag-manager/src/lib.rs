//! securetag tag manager library.
//!
//! This crate primarily ships a `tag-manager` binary, but we expose a small
//! library surface to enable integration testing and reuse.

pub mod api;
pub mod auth;
pub mod binder;
pub mod config;
pub mod crm;
pub mod driver;
pub mod state;
pub mod zones;
