//! Deterministic, pure logic shared by the orchestration components.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and static tables and return deterministic outputs suitable for tests.

pub mod commands;
pub mod policy;
pub mod queue_protocol;
pub mod selector;
pub mod target;
pub mod types;
