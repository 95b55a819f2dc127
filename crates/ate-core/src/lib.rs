//! ---
//! ate_section: "01-core-functionality"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Run lifecycle orchestration for the bench runtime."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
//! Bench lifecycle: wiring a run's controller, collection, and safety
//! monitoring together, and draining everything on process shutdown.

mod bench;

pub use bench::{BenchError, TestBench};
