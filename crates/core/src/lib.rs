//! Basket Core - Shared types library.
//!
//! This crate provides the domain types used by the basket client:
//! - Type-safe identifiers for owners, products, line items and orders
//! - Non-negative decimal prices
//! - Line items, products, orders and checkout recipient details
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no remote
//! store access, no async runtime. The sync engine lives in `basket-client`.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers and domain records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
