use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw per-sample payload handed to a scoring callback.
///
/// The exact shape (model results, the formatted document, ...) is owned by
/// the scorer that consumes it; nothing here validates it.
pub type MetricSample = serde_json::Map<String, Value>;

/// Scores keyed by metric name, as returned by [`Metric::compute`].
pub type MetricScores = serde_json::Map<String, Value>;

/// How a metric's raw model output is shaped before scoring.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MetricCategory {
    TargetPerplexity,
    Perplexity,
    Generative,
    GenerativeLogprob,
    Multichoice,
    MultichoiceOneToken,
    /// The metric contributes no score at all; [`Metric::compute`] returns an
    /// empty map for it without invoking any callback.
    Ignored,
}

/// Domain tag for reporting and grouping. No behavioral effect.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MetricUseCase {
    Accuracy,
    Perplexity,
    Code,
    Copyright,
    Math,
    Reasoning,
    SocialImpacts,
    Summarization,
    Translation,
    None,
}

/// When the metric's value comes into existence.
///
/// `SampleLevel` metrics are computed per example and reduced over the corpus
/// afterwards; `CorpusLevel` metrics only make sense over the full example
/// set and are computed once, at aggregation time. The aggregation phase
/// dispatches on this tag; nothing in this crate acts on it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MetricTiming {
    SampleLevel,
    CorpusLevel,
}

/// A grouped metric's aggregation or ranking-direction map names a metric
/// that is not part of the group.
#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    #[error("corpus aggregation registered for `{key}`, which is not one of the grouped metrics {names:?}")]
    UnknownAggregationKey { key: String, names: Vec<String> },

    #[error("ranking direction registered for `{key}`, which is not one of the grouped metrics {names:?}")]
    UnknownDirectionKey { key: String, names: Vec<String> },
}

/// Per-sample scoring callback for a single metric, producing one scalar.
///
/// Carries the help text a registry shows for the metric, since Rust
/// functions have no runtime doc string to introspect.
#[derive(Clone)]
pub struct SampleLevelFn {
    doc: &'static str,
    call: Arc<dyn Fn(&MetricSample) -> Result<Value> + Send + Sync>,
}

impl SampleLevelFn {
    pub fn new(
        doc: &'static str,
        call: impl Fn(&MetricSample) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            doc,
            call: Arc::new(call),
        }
    }

    pub fn doc(&self) -> &'static str {
        self.doc
    }

    /// Invokes the scorer. Errors propagate unmodified; there is no retry or
    /// recovery at this layer.
    pub fn call(&self, sample: &MetricSample) -> Result<Value> {
        (self.call)(sample)
    }
}

impl fmt::Debug for SampleLevelFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleLevelFn")
            .field("doc", &self.doc)
            .finish_non_exhaustive()
    }
}

/// Shared per-sample pass for a metric grouping.
///
/// Returns a map already keyed by constituent metric name; [`Metric::compute`]
/// passes it through unchanged.
#[derive(Clone)]
pub struct GroupedSampleFn {
    doc: &'static str,
    call: Arc<dyn Fn(&MetricSample) -> Result<MetricScores> + Send + Sync>,
}

impl GroupedSampleFn {
    pub fn new(
        doc: &'static str,
        call: impl Fn(&MetricSample) -> Result<MetricScores> + Send + Sync + 'static,
    ) -> Self {
        Self {
            doc,
            call: Arc::new(call),
        }
    }

    pub fn doc(&self) -> &'static str {
        self.doc
    }

    pub fn call(&self, sample: &MetricSample) -> Result<MetricScores> {
        (self.call)(sample)
    }
}

impl fmt::Debug for GroupedSampleFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupedSampleFn")
            .field("doc", &self.doc)
            .finish_non_exhaustive()
    }
}

/// Corpus-level reduction over the per-sample values of one metric.
///
/// Invocation timing and the shape of the reduced value are owned by the
/// aggregation phase; this is only the reference it dispatches to.
#[derive(Clone)]
pub struct CorpusLevelFn {
    call: Arc<dyn Fn(&[Value]) -> Value + Send + Sync>,
}

impl CorpusLevelFn {
    pub fn new(call: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Self {
        Self {
            call: Arc::new(call),
        }
    }

    pub fn call(&self, values: &[Value]) -> Value {
        (self.call)(values)
    }
}

impl fmt::Debug for CorpusLevelFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorpusLevelFn").finish_non_exhaustive()
    }
}

/// A metric producing one score per sample under its own name.
#[derive(Debug, Clone)]
pub struct SingleMetric {
    pub name: String,
    /// Ranking direction for downstream comparison of runs.
    pub higher_is_better: bool,
    pub category: MetricCategory,
    pub use_case: MetricUseCase,
    pub timing: MetricTiming,
    pub sample_level_fn: SampleLevelFn,
    pub corpus_level_fn: CorpusLevelFn,
}

impl SingleMetric {
    pub fn new(
        name: impl Into<String>,
        higher_is_better: bool,
        category: MetricCategory,
        use_case: MetricUseCase,
        timing: MetricTiming,
        sample_level_fn: SampleLevelFn,
        corpus_level_fn: CorpusLevelFn,
    ) -> Self {
        Self {
            name: name.into(),
            higher_is_better,
            category,
            use_case,
            timing,
            sample_level_fn,
            corpus_level_fn,
        }
    }
}

/// Several related metrics sharing one per-sample computation pass.
///
/// Worth it when an expensive preprocessing step (tokenization, model
/// re-scoring, ...) is identical for all constituents: the shared pass runs
/// once and emits every score at once. Aggregation and ranking direction stay
/// per-constituent.
///
/// Construction enforces that every key of `corpus_level_fn` and
/// `higher_is_better` names a constituent in `names`; a stray key is a
/// [`MetricError`], not a silent no-op at aggregation time.
#[derive(Debug, Clone)]
pub struct GroupedMetric {
    names: Vec<String>,
    higher_is_better: IndexMap<String, bool>,
    pub category: MetricCategory,
    pub use_case: MetricUseCase,
    pub timing: MetricTiming,
    sample_level_fn: GroupedSampleFn,
    corpus_level_fn: IndexMap<String, CorpusLevelFn>,
}

impl GroupedMetric {
    pub fn new(
        names: Vec<String>,
        higher_is_better: IndexMap<String, bool>,
        category: MetricCategory,
        use_case: MetricUseCase,
        timing: MetricTiming,
        sample_level_fn: GroupedSampleFn,
        corpus_level_fn: IndexMap<String, CorpusLevelFn>,
    ) -> Result<Self, MetricError> {
        for key in corpus_level_fn.keys() {
            if !names.iter().any(|n| n == key) {
                return Err(MetricError::UnknownAggregationKey {
                    key: key.clone(),
                    names: names.clone(),
                });
            }
        }
        for key in higher_is_better.keys() {
            if !names.iter().any(|n| n == key) {
                return Err(MetricError::UnknownDirectionKey {
                    key: key.clone(),
                    names: names.clone(),
                });
            }
        }

        Ok(Self {
            names,
            higher_is_better,
            category,
            use_case,
            timing,
            sample_level_fn,
            corpus_level_fn,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A metric record as held by a registry: either a single score or a grouping
/// of related scores sharing one per-sample pass.
///
/// Constructed once at registry-definition time and immutable afterwards.
/// Both variants funnel through [`compute`](Metric::compute), so concrete
/// metrics never re-implement the wrap-vs-passthrough decision.
#[derive(Debug, Clone)]
pub enum Metric {
    Single(SingleMetric),
    Grouping(GroupedMetric),
}

impl Metric {
    /// Runs the per-sample pass and shapes its result.
    ///
    /// - category [`Ignored`](MetricCategory::Ignored): empty map, no callback
    ///   invoked. This signals "no score produced", not a failure.
    /// - [`Single`](Metric::Single): the scalar result, wrapped under the
    ///   metric's own name.
    /// - [`Grouping`](Metric::Grouping): the shared pass's map, unchanged —
    ///   it is expected to already key its output by constituent name.
    ///
    /// Any error from the underlying scorer propagates unmodified.
    pub fn compute(&self, sample: &MetricSample) -> Result<MetricScores> {
        if self.category() == MetricCategory::Ignored {
            return Ok(MetricScores::new());
        }

        match self {
            Metric::Single(metric) => {
                let score = metric.sample_level_fn.call(sample)?;
                let mut scores = MetricScores::new();
                scores.insert(metric.name.clone(), score);
                Ok(scores)
            }
            Metric::Grouping(metric) => metric.sample_level_fn.call(sample),
        }
    }

    /// Help text attached to the per-sample scorer, for registry
    /// introspection.
    pub fn doc(&self) -> &'static str {
        match self {
            Metric::Single(metric) => metric.sample_level_fn.doc(),
            Metric::Grouping(metric) => metric.sample_level_fn.doc(),
        }
    }

    /// Names of every score this record produces, in output order.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Metric::Single(metric) => vec![metric.name.as_str()],
            Metric::Grouping(metric) => metric.names.iter().map(String::as_str).collect(),
        }
    }

    pub fn category(&self) -> MetricCategory {
        match self {
            Metric::Single(metric) => metric.category,
            Metric::Grouping(metric) => metric.category,
        }
    }

    pub fn use_case(&self) -> MetricUseCase {
        match self {
            Metric::Single(metric) => metric.use_case,
            Metric::Grouping(metric) => metric.use_case,
        }
    }

    pub fn timing(&self) -> MetricTiming {
        match self {
            Metric::Single(metric) => metric.timing,
            Metric::Grouping(metric) => metric.timing,
        }
    }

    /// Ranking direction for one of this record's scores, or `None` if the
    /// name is not produced here.
    pub fn higher_is_better(&self, name: &str) -> Option<bool> {
        match self {
            Metric::Single(metric) => (metric.name == name).then_some(metric.higher_is_better),
            Metric::Grouping(metric) => metric.higher_is_better.get(name).copied(),
        }
    }

    /// Corpus-level reduction for one of this record's scores.
    pub fn corpus_level_fn(&self, name: &str) -> Option<&CorpusLevelFn> {
        match self {
            Metric::Single(metric) => (metric.name == name).then_some(&metric.corpus_level_fn),
            Metric::Grouping(metric) => metric.corpus_level_fn.get(name),
        }
    }
}

impl From<SingleMetric> for Metric {
    fn from(metric: SingleMetric) -> Self {
        Metric::Single(metric)
    }
}

impl From<GroupedMetric> for Metric {
    fn from(metric: GroupedMetric) -> Self {
        Metric::Grouping(metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::json;

    fn mean() -> CorpusLevelFn {
        CorpusLevelFn::new(|values| {
            let sum: f64 = values.iter().filter_map(Value::as_f64).sum();
            json!(sum / values.len() as f64)
        })
    }

    fn exact_match(category: MetricCategory) -> Metric {
        SingleMetric::new(
            "em",
            true,
            category,
            MetricUseCase::Accuracy,
            MetricTiming::SampleLevel,
            SampleLevelFn::new("Exact match against the gold target.", |sample| {
                Ok(json!(sample.get("prediction") == sample.get("gold")))
            }),
            mean(),
        )
        .into()
    }

    fn sample(prediction: &str, gold: &str) -> MetricSample {
        let mut sample = MetricSample::new();
        sample.insert("prediction".into(), json!(prediction));
        sample.insert("gold".into(), json!(gold));
        sample
    }

    #[test]
    fn single_metric_wraps_score_under_its_name() {
        let metric = exact_match(MetricCategory::Generative);
        let scores = metric.compute(&sample("4", "4")).unwrap();

        assert_eq!(scores.len(), 1);
        assert_eq!(scores["em"], json!(true));
    }

    #[test]
    fn ignored_category_short_circuits_to_empty_scores() {
        let metric = exact_match(MetricCategory::Ignored);
        let scores = metric.compute(&sample("4", "5")).unwrap();

        assert!(scores.is_empty());
    }

    #[test]
    fn grouping_passes_shared_pass_output_through() {
        let names = vec!["rouge1".to_string(), "rouge2".to_string()];
        let metric: Metric = GroupedMetric::new(
            names,
            IndexMap::from([("rouge1".to_string(), true), ("rouge2".to_string(), true)]),
            MetricCategory::Generative,
            MetricUseCase::Summarization,
            MetricTiming::SampleLevel,
            GroupedSampleFn::new("Rouge variants over one tokenization pass.", |_| {
                let mut scores = MetricScores::new();
                scores.insert("rouge1".into(), json!(0.5));
                scores.insert("rouge2".into(), json!(0.25));
                Ok(scores)
            }),
            IndexMap::from([
                ("rouge1".to_string(), mean()),
                ("rouge2".to_string(), mean()),
            ]),
        )
        .unwrap()
        .into();

        let scores = metric.compute(&MetricSample::new()).unwrap();
        assert_eq!(scores["rouge1"], json!(0.5));
        assert_eq!(scores["rouge2"], json!(0.25));
        assert_eq!(metric.names(), vec!["rouge1", "rouge2"]);
    }

    #[test]
    fn grouping_rejects_aggregation_for_unknown_metric() {
        let result = GroupedMetric::new(
            vec!["rouge1".to_string()],
            IndexMap::new(),
            MetricCategory::Generative,
            MetricUseCase::Summarization,
            MetricTiming::SampleLevel,
            GroupedSampleFn::new("", |_| Ok(MetricScores::new())),
            IndexMap::from([("rougeL".to_string(), mean())]),
        );

        assert!(matches!(
            result,
            Err(MetricError::UnknownAggregationKey { ref key, .. }) if key == "rougeL"
        ));
    }

    #[test]
    fn grouping_rejects_direction_for_unknown_metric() {
        let result = GroupedMetric::new(
            vec!["rouge1".to_string()],
            IndexMap::from([("bleu".to_string(), true)]),
            MetricCategory::Generative,
            MetricUseCase::Summarization,
            MetricTiming::SampleLevel,
            GroupedSampleFn::new("", |_| Ok(MetricScores::new())),
            IndexMap::new(),
        );

        assert!(matches!(
            result,
            Err(MetricError::UnknownDirectionKey { ref key, .. }) if key == "bleu"
        ));
    }

    #[test]
    fn scorer_errors_propagate_unmodified() {
        let metric: Metric = SingleMetric::new(
            "broken",
            true,
            MetricCategory::Generative,
            MetricUseCase::None,
            MetricTiming::SampleLevel,
            SampleLevelFn::new("Always fails.", |_| Err(anyhow!("scorer blew up"))),
            mean(),
        )
        .into();

        let err = metric.compute(&MetricSample::new()).unwrap_err();
        assert_eq!(err.to_string(), "scorer blew up");
    }

    #[test]
    fn doc_and_direction_come_from_the_record() {
        let metric = exact_match(MetricCategory::Generative);
        assert_eq!(metric.doc(), "Exact match against the gold target.");
        assert_eq!(metric.higher_is_better("em"), Some(true));
        assert_eq!(metric.higher_is_better("f1"), None);
        assert!(metric.corpus_level_fn("em").is_some());
    }
}
