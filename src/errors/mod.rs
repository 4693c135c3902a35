//! # Error Handling
//!
//! Every fallible operation in the harness returns [`HarnessError`]. The
//! variants follow the lifecycle's failure classes: setup failures and usage
//! errors abort the group, restore and cache failures fail a single test.

pub mod types;

pub use types::{HarnessError, Result, Severity};
