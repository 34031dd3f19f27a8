//! Shared data model layer (structs/constants only).
//!
//! ## Files
//! - `models.rs`: raw API shapes, the normalized compliance document, decisions,
//!   and the config file shape.
//! - `constants.rs`: defaults and environment variable names.
//!
//! ## Rule of thumb
//! Domain types should be data-only: no filesystem/network side effects.
//!
//! ## Compatibility note
//! The serialized document is the `input` every policy reads. Field renames here
//! break policies in the wild; keep them explicit and mirrored in
//! `docs/contracts/*`.

pub mod constants;
pub mod models;
