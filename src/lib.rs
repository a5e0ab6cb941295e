//! VOLUMEBOT: multi-account Solana volume bot engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod amount;
pub mod config;
pub mod types;
pub mod wallet;
pub mod chain;
pub mod fees;
pub mod engine;
pub mod storage;
pub mod dashboard;
