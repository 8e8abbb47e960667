//! Requirement-driven web project generator.
//!
//! A project directory starts as a tree of plain-text requirement documents.
//! Generation scaffolds it, plans three phases of tasks, runs one
//! tool-calling agent per task, and then verifies the build, healing it a
//! bounded number of times before reverting the project.
//!
//! - **[`core`]**: Pure data and rules (messages, plans, summaries, events).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (engine, filesystem, processes, search).
//!   Behind traits so tests can substitute doubles.
//! - **[`agents`]**: The agent loop and the planner, task and healer stages.
//! - **[`tools`]**: Capabilities the engine may invoke.
//!
//! [`generate`] composes these into the pipeline, and [`state`] guards the
//! shared project record used by the CLI and the HTTP server.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod generate;
pub mod io;
pub mod logging;
pub mod state;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
pub mod validate;
