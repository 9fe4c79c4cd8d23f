//! Recompute orchestration: per-scope serialization, replay, guard, commit.

pub mod recompute;

pub use recompute::{RecomputeError, RecomputeSummary, Recomputer};
