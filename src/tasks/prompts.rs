use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use serde_json::Value;

use crate::tasks::doc::Doc;

/// A prompt formatter: turns one raw task line into a structured [`Doc`].
///
/// The second argument is the task name; the regression harness passes an
/// empty string unless task-name threading is explicitly enabled, so
/// formatters must not rely on it.
pub type PromptFn = fn(&Value, &str) -> Result<Doc>;

/// Explicit name-to-formatter mapping, built once at startup.
///
/// Replaces reflective by-name lookup: resolving a name that was never
/// registered is an ordinary `None`, which the harness turns into a fatal
/// setup error rather than a silent skip.
#[derive(Debug, Clone, Default)]
pub struct PromptRegistry {
    formatters: IndexMap<&'static str, PromptFn>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the formatters shipped in this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("arc", arc);
        registry.register("boolq", boolq);
        registry.register("piqa", piqa);
        registry.register("gsm8k", gsm8k);
        registry
    }

    /// Last registration under a name wins.
    pub fn register(&mut self, name: &'static str, formatter: PromptFn) {
        self.formatters.insert(name, formatter);
    }

    pub fn get(&self, name: &str) -> Option<PromptFn> {
        self.formatters.get(name).copied()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.formatters.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.formatters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formatters.is_empty()
    }
}

fn str_field<'a>(line: &'a Value, key: &str) -> Result<&'a str> {
    line.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("input line is missing string field `{key}`"))
}

fn u64_field(line: &Value, key: &str) -> Result<u64> {
    line.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("input line is missing integer field `{key}`"))
}

/// ARC-style multichoice: labeled answer options under `choices`, the gold
/// answer named by `answerKey`.
pub fn arc(line: &Value, _task_name: &str) -> Result<Doc> {
    let question = str_field(line, "question")?;
    let choices = line
        .get("choices")
        .context("input line is missing `choices`")?;

    let texts = choices
        .get("text")
        .and_then(Value::as_array)
        .context("`choices` is missing `text` list")?;
    let labels = choices
        .get("label")
        .and_then(Value::as_array)
        .context("`choices` is missing `label` list")?;
    let answer_key = str_field(line, "answerKey")?;

    let gold_index = labels
        .iter()
        .position(|label| label.as_str() == Some(answer_key))
        .ok_or_else(|| anyhow!("answer key `{answer_key}` not found among choice labels"))?;

    let choices = texts
        .iter()
        .map(|text| {
            text.as_str()
                .map(|t| format!(" {t}"))
                .context("choice text is not a string")
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Doc::new(
        format!("Question: {question}\nAnswer:"),
        choices,
        gold_index,
    ))
}

/// BoolQ-style yes/no over a passage; `label` is 0 for no, 1 for yes.
pub fn boolq(line: &Value, _task_name: &str) -> Result<Doc> {
    let passage = str_field(line, "passage")?;
    let question = str_field(line, "question")?;
    let label = u64_field(line, "label")?;

    Ok(Doc::new(
        format!("{passage}\nQuestion: {question}?\nAnswer:"),
        vec![" no".to_string(), " yes".to_string()],
        label as usize,
    ))
}

/// PIQA-style two-way choice between `sol1` and `sol2`.
pub fn piqa(line: &Value, _task_name: &str) -> Result<Doc> {
    let goal = str_field(line, "goal")?;
    let sol1 = str_field(line, "sol1")?;
    let sol2 = str_field(line, "sol2")?;
    let label = u64_field(line, "label")?;

    Ok(Doc::new(
        format!("Question: {goal}\nAnswer:"),
        vec![format!(" {sol1}"), format!(" {sol2}")],
        label as usize,
    ))
}

/// GSM8K-style generative math: single gold continuation.
pub fn gsm8k(line: &Value, _task_name: &str) -> Result<Doc> {
    let question = str_field(line, "question")?;
    let answer = str_field(line, "answer")?;

    Ok(Doc::new(
        format!("Question: {question}\nAnswer:"),
        vec![format!(" {answer}")],
        0,
    ))
}
