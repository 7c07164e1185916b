//! Replay driver for recorded prompt-formatting regressions.
//!
//! A reference fixture maps each formatter name to per-task lists of
//! `(input_line, reference_line)` pairs recorded when the formatter's output
//! was last known good. [`collect_prompt_cases`] resolves every formatter
//! once and flattens its pairs into one [`ReplayBatch`]; [`replay_batch`]
//! re-runs the formatter on every input and demands structural equality with
//! the deserialized reference [`Doc`].
//!
//! Failure semantics are deliberately loud: an unreadable fixture or a
//! fixture naming an unregistered formatter aborts collection before any
//! replay runs (a missing formatter means something was renamed or removed,
//! and that must break the run, not be skipped), and the first diverging
//! case aborts its batch.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::tasks::{Doc, PromptFn, PromptRegistry};

/// Parsed reference fixture: formatter name -> task name -> recorded pairs.
///
/// Both maps keep the file's insertion order, which fixes batch and case
/// order for the whole session.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct PromptFixture(pub IndexMap<String, IndexMap<String, Vec<(Value, Value)>>>);

impl PromptFixture {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| HarnessError::FixtureIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| HarnessError::FixtureFormat {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// One recorded regression case.
#[derive(Debug, Clone)]
pub struct PromptCase {
    /// Raw task line, passed verbatim to the formatter.
    pub input_line: Value,
    /// Serialized [`Doc`] the formatter produced when this was recorded.
    pub reference_line: Value,
    pub task_name: String,
}

/// All cases for one formatter name, flattened across its tasks in fixture
/// order.
#[derive(Debug, Clone)]
pub struct ReplayBatch {
    pub formatter_name: String,
    pub formatter: PromptFn,
    pub cases: Vec<PromptCase>,
}

/// Knobs for [`replay_batch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayOptions {
    /// Pass each case's task name to the formatter instead of an empty
    /// string. Off by default: the recorded references were produced with an
    /// empty context, and formatters must not depend on the task name until
    /// that contract changes.
    pub thread_task_name: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("could not read prompt fixture at {path}")]
    FixtureIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("prompt fixture at {path} is not valid JSON")]
    FixtureFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The fixture names a formatter that was never registered. Fatal: a
    /// renamed or removed formatter must break the run.
    #[error("fixture references formatter `{name}`, which is not registered")]
    UnknownFormatter { name: String },

    #[error("formatter `{formatter}` failed on input {input} from task `{task}`")]
    Formatter {
        formatter: String,
        task: String,
        input: Value,
        #[source]
        source: anyhow::Error,
    },

    #[error("reference line for formatter `{formatter}`, task `{task}` does not deserialize into a Doc")]
    BadReference {
        formatter: String,
        task: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "prompt formatting function {formatter} failed on input {input} from task {task}.\nReference: {expected:?}\nReturned : {actual:?}"
    )]
    Mismatch {
        formatter: String,
        task: String,
        input: Value,
        expected: Box<Doc>,
        actual: Box<Doc>,
    },
}

/// Resolves every formatter the fixture names and flattens its recorded
/// pairs into one [`ReplayBatch`] per formatter, in fixture order.
///
/// Runs once per session; the returned batches are never mutated afterwards.
pub fn collect_prompt_cases(
    fixture: &PromptFixture,
    registry: &PromptRegistry,
) -> Result<Vec<ReplayBatch>, HarnessError> {
    let mut batches = Vec::with_capacity(fixture.0.len());

    for (formatter_name, tasks) in &fixture.0 {
        let formatter =
            registry
                .get(formatter_name)
                .ok_or_else(|| HarnessError::UnknownFormatter {
                    name: formatter_name.clone(),
                })?;

        let mut cases = Vec::new();
        for (task_name, pairs) in tasks {
            for (input_line, reference_line) in pairs {
                cases.push(PromptCase {
                    input_line: input_line.clone(),
                    reference_line: reference_line.clone(),
                    task_name: task_name.clone(),
                });
            }
        }

        debug!(
            formatter = formatter_name.as_str(),
            cases = cases.len(),
            "collected replay batch"
        );
        batches.push(ReplayBatch {
            formatter_name: formatter_name.clone(),
            formatter,
            cases,
        });
    }

    Ok(batches)
}

/// Convenience for the common path: load the fixture and collect in one go.
pub fn collect_from_path(
    path: impl AsRef<Path>,
    registry: &PromptRegistry,
) -> Result<Vec<ReplayBatch>, HarnessError> {
    let fixture = PromptFixture::load(path)?;
    collect_prompt_cases(&fixture, registry)
}

/// Replays every case in the batch, stopping at the first divergence.
///
/// Returns the number of cases that matched. Cases before a failing one have
/// already been checked; there is no continue-on-failure mode.
pub fn replay_batch(batch: &ReplayBatch, options: ReplayOptions) -> Result<usize, HarnessError> {
    for case in &batch.cases {
        let context = if options.thread_task_name {
            case.task_name.as_str()
        } else {
            ""
        };

        let actual = (batch.formatter)(&case.input_line, context).map_err(|source| {
            HarnessError::Formatter {
                formatter: batch.formatter_name.clone(),
                task: case.task_name.clone(),
                input: case.input_line.clone(),
                source,
            }
        })?;

        let expected: Doc = serde_json::from_value(case.reference_line.clone()).map_err(
            |source| HarnessError::BadReference {
                formatter: batch.formatter_name.clone(),
                task: case.task_name.clone(),
                source,
            },
        )?;

        if actual != expected {
            return Err(HarnessError::Mismatch {
                formatter: batch.formatter_name.clone(),
                task: case.task_name.clone(),
                input: case.input_line.clone(),
                expected: Box::new(expected),
                actual: Box::new(actual),
            });
        }
    }

    debug!(
        formatter = batch.formatter_name.as_str(),
        cases = batch.cases.len(),
        "replay batch matched reference"
    );
    Ok(batch.cases.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture(raw: Value) -> PromptFixture {
        serde_json::from_value(raw).expect("test fixture should parse")
    }

    #[test]
    fn collection_flattens_tasks_in_fixture_order() {
        let fixture = fixture(json!({
            "boolq": {
                "task_a": [[{"passage": "p", "question": "q", "label": 1},
                            {"query": "p\nQuestion: q?\nAnswer:", "choices": [" no", " yes"], "gold_index": 1}]],
                "task_b": [[{"passage": "p2", "question": "q2", "label": 0},
                            {"query": "p2\nQuestion: q2?\nAnswer:", "choices": [" no", " yes"], "gold_index": 0}]],
            }
        }));

        let batches = collect_prompt_cases(&fixture, &PromptRegistry::builtin()).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].formatter_name, "boolq");
        assert_eq!(batches[0].cases.len(), 2);
        assert_eq!(batches[0].cases[0].task_name, "task_a");
        assert_eq!(batches[0].cases[1].task_name, "task_b");
    }

    #[test]
    fn unknown_formatter_aborts_collection() {
        let fixture = fixture(json!({"no_such_formatter": {}}));

        let err = collect_prompt_cases(&fixture, &PromptRegistry::builtin()).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::UnknownFormatter { ref name } if name == "no_such_formatter"
        ));
    }

    #[test]
    fn replay_reports_first_divergence_with_context() {
        let fixture = fixture(json!({
            "boolq": {
                "drifted": [[{"passage": "p", "question": "q", "label": 1},
                             {"query": "WRONG", "choices": [" no", " yes"], "gold_index": 1}]],
            }
        }));

        let batches = collect_prompt_cases(&fixture, &PromptRegistry::builtin()).unwrap();
        let err = replay_batch(&batches[0], ReplayOptions::default()).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("boolq"));
        assert!(message.contains("drifted"));
        assert!(message.contains("WRONG"));
    }

    #[test]
    fn replay_rejects_reference_that_is_not_a_doc() {
        let fixture = fixture(json!({
            "boolq": {
                "bad_ref": [[{"passage": "p", "question": "q", "label": 0},
                             {"not_a_doc": true}]],
            }
        }));

        let batches = collect_prompt_cases(&fixture, &PromptRegistry::builtin()).unwrap();
        let err = replay_batch(&batches[0], ReplayOptions::default()).unwrap_err();
        assert!(matches!(err, HarnessError::BadReference { .. }));
    }
}
