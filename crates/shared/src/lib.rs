//! Shared utilities and common types for the Site Manager backend.
//!
//! This crate provides common functionality used across all other crates:
//! - JWT issuance and validation (RS256)
//! - Password hashing with Argon2id
//! - Common request-field validation logic
//! - Cursor-based pagination helpers

pub mod jwt;
pub mod pagination;
pub mod password;
pub mod validation;
