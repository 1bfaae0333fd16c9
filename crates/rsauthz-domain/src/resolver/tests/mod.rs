//! Tests for the resolver module.
//!
//! Organized by functionality:
//! - Rule evaluation (relations, usersets, logic, hierarchy, attributes)
//! - Checker entry points (check, check_multiple, subject_permission)
//! - Expand trees
//! - Lookup and pagination
