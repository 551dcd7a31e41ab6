//! Code Arena evaluation and peer review worker
//!
//! Students submit code against hidden tests, then review each other's
//! solutions. This crate grades submissions in an isolate sandbox, hands out
//! and adjudicates peer reviews, aggregates scores and awards badges.

pub mod badges;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod jobs;
pub mod models;
pub mod redis_manager;
pub mod reference_cache;
pub mod review;
pub mod sandbox;
pub mod scoring;
pub mod toolchain;
pub mod verdict;

#[cfg(test)]
pub(crate) mod testing;
