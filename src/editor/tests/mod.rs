//! Editor module tests
//!
//! Contains test suites for structural editing:
//! - Arena projection (levels, editability, placeholders)
//! - Editing operations and their preconditions
