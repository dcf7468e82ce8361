// === Public Modules (The Canonical Paths) ===
pub mod advisor;
pub mod config;
pub mod domain;
pub mod dsl;
pub mod error;
pub mod harness;
pub mod report;
pub mod repository;
pub mod rule;

// === Private Implementation Details ===
mod macros;

// === Facades (Re-exporting internals) ===
// Expose the top-level composition without forcing callers through submodules.
pub use crate::advisor::{Advisor, AdvisorReport, AnalysisProvider};
pub use crate::config::EngineConfig;
pub use crate::domain::{RuleId, Score, Ticker};
pub use crate::dsl::builtin::builtin_registry;
pub use crate::error::{AugurError, AugurResult};
pub use crate::report::AnalysisReport;
pub use crate::rule::{Rule, RuleRecord, RuleStatus};
