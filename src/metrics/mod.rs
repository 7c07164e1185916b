//! Declarative metric records.
//!
//! Nothing in here computes a score by itself: a metric is a name, a handful
//! of closed-enum tags, and references to the scoring and aggregation
//! callbacks owned by the registry that constructed it. [`Metric::compute`]
//! only decides how the callback's result is shaped — wrapped under the
//! metric's own name for a single metric, passed through unchanged for a
//! grouping — and short-circuits entirely for ignored categories.

pub mod metric;

pub use metric::*;
