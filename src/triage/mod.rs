//! Triage session intake and the status lifecycle.
//!
//! ```text
//! queued -> processing -> completed
//!    |           \------> failed
//!    +-> completed | failed
//! ```
//!
//! This module is the only writer of the status column. Every transition is a
//! compare-and-set against the status it was decided from.

mod controller;
mod error;

pub use controller::{CreateTriage, TriageController, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
pub use error::TriageError;
