//! Task-side structures: the [`Doc`] produced by prompt formatters and the
//! registry those formatters are resolved from.

pub mod doc;
pub mod prompts;

pub use doc::*;
pub use prompts::*;
