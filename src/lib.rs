//! camkeep - continuous IP camera recording with self-healing
//!
//! This library crate exposes the binary's plumbing for integration testing.

pub mod config;
pub mod run;
