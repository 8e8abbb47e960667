//! Side-effecting adapters: filesystem, processes, HTTP and configuration.
//!
//! Each external collaborator sits behind a trait (`Engine`, `BuildVerifier`,
//! `Scaffolder`, `SearchClient`) so the pipeline can be driven by scripted
//! doubles in tests.

pub mod build;
pub mod config;
pub mod engine;
pub mod process;
pub mod prompt;
pub mod requirements;
pub mod scaffold;
pub mod search;
pub mod snapshot;
