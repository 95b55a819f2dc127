//! ---
//! ate_section: "03-persistence-logging"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Run storage, domain model, and bench journal."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Domain model and storage for bench test runs.
//!
//! The store is the surface the collector and safety monitor write
//! through: readings, anomalies, and run status transitions. The bench
//! journal mirrors lifecycle events to an append-only JSONL file.

/// Result alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Error type for the storage subsystem.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The referenced run id is not present in the store.
    #[error("unknown run {0}")]
    UnknownRun(crate::model::RunId),
    /// The outlet is already claimed by another non-terminal run.
    #[error("outlet {station}/{channel} is claimed by run {holder}")]
    OutletBusy {
        /// Station owning the contested outlet.
        station: String,
        /// Outlet channel within the station.
        channel: u16,
        /// Run currently holding the claim.
        holder: crate::model::RunId,
    },
    /// Wrapper for IO errors from the bench journal.
    #[error("journal io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues in the bench journal.
    #[error("journal serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub mod journal;
pub mod model;
pub mod run;
pub mod store;

pub use journal::{BenchJournal, JournalEntry, JournaledStore};
pub use model::{Anomaly, AnomalyKind, Outlet, Profile, Reading, RunId, SafetyFlags, Station};
pub use run::{Run, RunStatus};
pub use store::{MemoryRunStore, RunStore};
