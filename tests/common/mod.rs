//! Common test utilities for all integration tests.
//!
//! Provides file-backed test databases, a failure-injecting table store and
//! the users/settings scenario fixture.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

pub mod failing_store;
pub mod scenario;
pub mod test_db;
