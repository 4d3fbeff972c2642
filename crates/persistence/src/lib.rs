//! Persistence layer for the Site Manager backend.
//!
//! This crate contains:
//! - Database connection management
//! - Entity definitions (database row mappings)
//! - Repository implementations, including the PostgreSQL-backed
//!   implementations of the domain store contracts

pub mod db;
pub mod entities;
pub mod repositories;
