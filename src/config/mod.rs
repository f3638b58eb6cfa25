// src/config/mod.rs

//! Graph file loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a graph file from disk (`loader.rs`).
//! - Validate basic invariants (`validate.rs`).
//! - Parse human duration strings (`duration.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_graph_path, load_and_validate, load_from_path, load_from_str};
pub use model::{ConfigSection, GraphFile, MergeSpec, RawGraphFile, TaskSpec};
pub use validate::graph_warnings;
