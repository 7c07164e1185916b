use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Index (or indices) of the gold answer within a document's choices.
///
/// Untagged so reference fixtures can carry either a bare integer or a list.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GoldIndex {
    Single(usize),
    Multi(Vec<usize>),
}

impl From<usize> for GoldIndex {
    fn from(index: usize) -> Self {
        GoldIndex::Single(index)
    }
}

impl From<Vec<usize>> for GoldIndex {
    fn from(indices: Vec<usize>) -> Self {
        GoldIndex::Multi(indices)
    }
}

/// A structured prompt document, as produced by a formatter from one raw
/// task example.
///
/// Deserializes from a flat field mapping (reference fixtures store exactly
/// that) and compares structurally, which is all the regression harness
/// needs from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doc {
    /// The prompt text shown to the model.
    pub query: String,
    /// Candidate continuations; empty for purely generative tasks.
    pub choices: Vec<String>,
    pub gold_index: GoldIndex,
    /// Task-level instruction prepended by some fewshot builders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    /// Free-form extras some scorers read back (ids, spans, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific: Option<serde_json::Map<String, Value>>,
}

impl Doc {
    pub fn new(
        query: impl Into<String>,
        choices: Vec<String>,
        gold_index: impl Into<GoldIndex>,
    ) -> Self {
        Self {
            query: query.into(),
            choices,
            gold_index: gold_index.into(),
            instruction: None,
            specific: None,
        }
    }
}
