//! Command handler layer.
//!
//! This module owns CLI-oriented orchestration and output wiring.
//!
//! ## Files
//! - `evaluate.rs`: `evaluate trail` / `evaluate trails`.
//!
//! ## Principles
//! - Turn CLI flags into settings and pipeline options here.
//! - Delegate business logic to `services/*`.
//! - Report allow/deny as a value; only real failures are errors.

pub mod evaluate;

pub use evaluate::handle_evaluate_commands;
