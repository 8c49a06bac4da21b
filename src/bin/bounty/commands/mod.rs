//! CLI command implementations

pub mod bounty;
pub mod repo;
