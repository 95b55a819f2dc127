//! ---
//! ate_section: "01-core-functionality"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Shared primitives and utilities for the bench runtime."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
//! Shared configuration, logging, and time primitives for ATE-Bench.

pub mod config;
pub mod logging;
pub mod time;
