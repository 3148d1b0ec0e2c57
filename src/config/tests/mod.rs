//! Config module tests
//!
//! Contains test suites for rule storage:
//! - Document splitting, loading and merging
//! - Saving through the document stores
//! - Backup and atomic write transactions

#[cfg(test)]
mod transaction_tests;
