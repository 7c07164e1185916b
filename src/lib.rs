//! Metric definitions and a prompt-formatting regression harness for LLM
//! evaluation.
//!
//! Two independent pieces live here:
//!
//! - [`metrics`] — the declarative schema describing how a metric is computed
//!   and aggregated. A [`Metric`] is either a single score or a grouping of
//!   related scores sharing one per-sample pass; [`Metric::compute`] is the
//!   one entry point every concrete metric goes through.
//! - [`harness`] — a replay driver for recorded (input, expected-[`Doc`])
//!   pairs. It resolves formatters from a [`PromptRegistry`], flattens the
//!   reference fixture into ordered batches, and asserts each formatter still
//!   produces exactly the document it produced when the fixture was recorded.
//!
//! The actual scoring functions, aggregation reducers, and model backends are
//! owned by callers; this crate only defines their shape and the regression
//! law that ties formatters to their reference outputs.

pub mod harness;
pub mod metrics;
pub mod tasks;
pub mod utils;

pub use harness::*;
pub use metrics::*;
pub use tasks::*;
pub use utils::*;
