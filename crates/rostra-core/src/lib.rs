//! Core types and trait definitions for the Rostra identity and subscription
//! backend.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod access;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod plan;
pub mod profile;
pub mod store;
pub mod transaction;
pub mod user;

pub use error::{Error, Result};
