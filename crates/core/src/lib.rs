//! RocketShoes Core - Shared types library.
//!
//! This crate provides the types shared by every RocketShoes component:
//! - `cart` - Cart manager, catalog client, and persistent stores
//! - `cli` - Command-line cart client
//!
//! # Architecture
//!
//! The core crate contains only types and pure cart arithmetic - no I/O, no
//! HTTP clients, no storage. This keeps it lightweight and easy to test.
//!
//! # Modules
//!
//! - [`types`] - Product identifiers, prices, catalog records, and the cart itself

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
