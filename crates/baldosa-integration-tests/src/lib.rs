//! Integration test crate for Baldosa.
//!
//! This crate has no library code. It only contains integration tests that
//! exercise purchase consistency and availability refresh across the
//! workspace crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p baldosa-integration-tests
//! ```
