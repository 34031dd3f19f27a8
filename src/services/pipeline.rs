use crate::domain::models::{Decision, PolicyInput};
use crate::error::EvalError;
use crate::services::api::TrailSource;
use crate::services::builder::DocumentBuilder;
use crate::services::filter::{filter, filter_batch, FilterSpec};
use crate::services::policy::{PolicyEvaluator, PolicySource};
use crate::services::render::{render, OutputFormat, Rendered};
use std::path::PathBuf;
use tracing::info;

/// Per-invocation evaluation flags, as given on the command line.
#[derive(Debug, Clone)]
pub struct EvaluateOptions {
    pub policy: PathBuf,
    pub output: String,
    pub show_input: bool,
    pub attestations: Vec<String>,
}

/// Everything that can be rejected before a single request goes out.
struct Prepared {
    format: OutputFormat,
    filter: FilterSpec,
    policy: PolicySource,
}

/// Build, filter, evaluate, render. One instance serves one invocation.
pub struct Pipeline<'a> {
    source: &'a dyn TrailSource,
    evaluator: &'a dyn PolicyEvaluator,
    workers: usize,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        source: &'a dyn TrailSource,
        evaluator: &'a dyn PolicyEvaluator,
        workers: usize,
    ) -> Self {
        Self {
            source,
            evaluator,
            workers,
        }
    }

    pub fn evaluate_trail(
        &self,
        trail: &str,
        opts: &EvaluateOptions,
    ) -> Result<Rendered, EvalError> {
        let prepared = prepare(opts)?;
        info!(trail, "evaluating trail");
        let doc = DocumentBuilder::new(self.source, self.workers).build(trail)?;
        let input = PolicyInput::from(filter(&doc, &prepared.filter));
        self.decide(input, &prepared, opts.show_input)
    }

    /// Evaluates all trails as one input with a single decision. Trails keep
    /// command-line order; any failed trail fails the batch.
    pub fn evaluate_trails(
        &self,
        trails: &[String],
        opts: &EvaluateOptions,
    ) -> Result<Rendered, EvalError> {
        let prepared = prepare(opts)?;
        info!(trails = trails.len(), "evaluating trail batch");
        let batch = DocumentBuilder::new(self.source, self.workers).build_batch(trails)?;
        let input = PolicyInput::from(filter_batch(&batch, &prepared.filter));
        self.decide(input, &prepared, opts.show_input)
    }

    fn decide(
        &self,
        input: PolicyInput,
        prepared: &Prepared,
        show_input: bool,
    ) -> Result<Rendered, EvalError> {
        let value = serde_json::to_value(&input)?;
        let decision: Decision = self.evaluator.evaluate(&value, &prepared.policy)?;
        info!(
            allow = decision.allow,
            violations = decision.violations.len(),
            "policy decision"
        );
        render(&decision, Some(&input), prepared.format, show_input)
    }
}

fn prepare(opts: &EvaluateOptions) -> Result<Prepared, EvalError> {
    let format = opts.output.parse::<OutputFormat>()?;
    let filter = FilterSpec::parse(&opts.attestations)?;
    let policy = PolicySource::load(&opts.policy)?;
    Ok(Prepared {
        format,
        filter,
        policy,
    })
}
