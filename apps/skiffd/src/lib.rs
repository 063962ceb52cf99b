//! Skiff relay daemon internals, exposed as a library so integration tests
//! can assemble the full stack with a scripted backend.

pub mod app;
pub mod config;
pub mod handler;
