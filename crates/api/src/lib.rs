//! Emporium API library.
//!
//! The REST backend of the store: accounts, catalog, carts, orders,
//! payments, analytics and uploads. Exposed as a library so the binary, the
//! CLI and the tests share one implementation.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;
