//! Job orchestration for 3D generation tasks.
//!
//! [`TaskService`] owns the task lifecycle: submission, lookup, listing,
//! cancellation and the reconciliation routine that pulls remote state
//! into the store. [`TaskPoller`] runs that routine for every pending
//! task on a timer, under a concurrency cap.

pub mod config;
pub mod error;
pub mod poller;
pub mod service;

pub use config::{OrchestratorConfig, PollerConfig};
pub use error::ServiceError;
pub use poller::{PollerStatus, SweepReport, TaskPoller};
pub use service::{ReconcileOutcome, TaskService};
