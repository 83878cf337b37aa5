//! Emporium Core - Shared domain types and rules.
//!
//! This crate provides the types and pure logic used across all Emporium
//! components:
//! - `api` - REST API server
//! - `cli` - Command-line tools for migrations and maintenance
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Order totals, status transitions and analytics
//! bucketing live here so they can be tested without a running database.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, money, roles and statuses
//! - [`pricing`] - Order total computation
//! - [`analytics`] - Time bucketing for revenue series
//! - [`pagination`] - Page parameters and paged results

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod analytics;
pub mod pagination;
pub mod pricing;
pub mod types;

pub use pagination::{Page, PageParams};
pub use pricing::{LineAmount, OrderTotals, PricingRules};
pub use types::*;
