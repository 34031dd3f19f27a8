//! Service layer containing the evaluation pipeline and its collaborators.
//!
//! ## Service map
//! - `api.rs`: `TrailSource` trait and the REST client behind it.
//! - `fanout.rs`: bounded worker pool with first-error cancellation.
//! - `builder.rs`: raw trail to compliance document, plus rehydration.
//! - `filter.rs`: `--attestations` selectors and document filtering.
//! - `policy.rs`: policy preflight and the OPA-backed evaluator.
//! - `render.rs`: table/JSON decision output.
//! - `pipeline.rs`: build, filter, evaluate, render for one invocation.
//! - `config.rs`: layered settings (file, environment, flags).
//!
//! ## Conventions
//! - Prefer pure helpers where possible.
//! - Network and process side effects stay behind `TrailSource` and
//!   `PolicyEvaluator`.
//! - Keep command handlers thin; delegate to services.

pub mod api;
pub mod builder;
pub mod config;
pub mod fanout;
pub mod filter;
pub mod pipeline;
pub mod policy;
pub mod render;
