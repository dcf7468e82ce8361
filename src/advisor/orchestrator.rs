use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    advisor::{
        aggregate::RuleVote,
        evidence::{EvaluationFailureInfo, TriggerInfo},
        profile::RuleSelector,
    },
    domain::{RuleId, Score},
    dsl::semantic::SemanticType,
    error::AugurResult,
    report::AnalysisReport,
    repository::{RuleLoader, RuleRepository},
    rule::RuleStatus,
};

// ================================================================================================
// Purpose Outcome
// ================================================================================================

/// Everything one purpose run produced: votes for the aggregator, trigger
/// evidence for the explainer, absorbed failures, and whether a deadline
/// cut the run short.
#[derive(Debug, Clone, Default)]
pub struct PurposeOutcome {
    /// Trigger records, sorted by `rule_id` regardless of completion order.
    pub triggers: Vec<TriggerInfo>,
    /// Aggregation votes, aligned index-for-index with `triggers`.
    pub votes: Vec<RuleVote>,
    /// Rules that raised during evaluation; excluded from `votes`.
    pub failures: Vec<EvaluationFailureInfo>,
    /// True when cancellation fired before every selected rule finished.
    pub incomplete: bool,
}

impl PurposeOutcome {
    pub fn scores(&self) -> Vec<Score> {
        self.votes.iter().map(|vote| vote.score).collect()
    }
}

// ================================================================================================
// Rules Orchestrator
// ================================================================================================

/// Evaluates the READY rules of one purpose against a report.
///
/// Stateless per call. Evaluations run concurrently on the blocking pool
/// (pure CPU work, no shared mutable state), but the returned lists are
/// always in `rule_id` order so downstream aggregation is reproducible.
pub struct RulesOrchestrator {
    repository: Arc<dyn RuleRepository>,
    loader: Arc<RuleLoader>,
    parallelism: usize,
}

impl RulesOrchestrator {
    pub fn new(
        repository: Arc<dyn RuleRepository>,
        loader: Arc<RuleLoader>,
        parallelism: usize,
    ) -> Self {
        Self {
            repository,
            loader,
            parallelism: parallelism.max(1),
        }
    }

    #[tracing::instrument(skip(self, report, selector, cancel), fields(purpose = %purpose))]
    pub async fn run_for_purpose(
        &self,
        purpose: SemanticType,
        report: Arc<AnalysisReport>,
        selector: &RuleSelector,
        cancel: &CancellationToken,
    ) -> AugurResult<PurposeOutcome> {
        let records = self.repository.list_by(purpose, RuleStatus::Ready).await?;

        // Construction errors here are an operator problem (a corrupt or
        // unmigrated record reached the store) and fail the run loudly;
        // they are not per-rule evaluation noise.
        let mut selected = Vec::with_capacity(records.len());
        for record in &records {
            let rule = self.loader.load(record)?;
            if selector(&rule) {
                selected.push(rule);
            }
        }
        debug!(
            fetched = records.len(),
            selected = selected.len(),
            "rules selected for evaluation"
        );

        if selected.is_empty() {
            return Ok(PurposeOutcome::default());
        }

        let mut evaluations = futures::stream::iter(selected.into_iter().map(|rule| {
            let report = report.clone();
            async move {
                let rule_id = rule.rule_id().clone();
                let name = rule.name().to_string();
                let confidence = rule.confidence();
                let result =
                    tokio::task::spawn_blocking(move || rule.execute(&report)).await;
                (rule_id, name, confidence, result)
            }
        }))
        .buffer_unordered(self.parallelism);

        let mut completed: Vec<(RuleId, String, f64, Score)> = Vec::new();
        let mut failures = Vec::new();
        let mut incomplete = false;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(purpose = %purpose, "deadline cancelled in-flight rule evaluations");
                    incomplete = true;
                    break;
                }
                next = evaluations.next() => match next {
                    None => break,
                    Some((rule_id, name, confidence, Ok(Ok(score)))) => {
                        completed.push((rule_id, name, confidence, score));
                    }
                    Some((rule_id, _, _, Ok(Err(error)))) => {
                        warn!(rule_id = %rule_id, %error, "rule evaluation failed; excluded from aggregation");
                        failures.push(EvaluationFailureInfo::from(&error));
                    }
                    Some((rule_id, _, _, Err(join_error))) => {
                        warn!(rule_id = %rule_id, %join_error, "rule evaluation task aborted");
                        failures.push(EvaluationFailureInfo {
                            rule_id: rule_id.to_string(),
                            node_path: String::new(),
                            cause: join_error.to_string(),
                        });
                    }
                }
            }
        }

        // Completion order is scheduler-dependent; the contract is not.
        completed.sort_by(|a, b| a.0.cmp(&b.0));
        failures.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));

        let mut outcome = PurposeOutcome {
            triggers: Vec::with_capacity(completed.len()),
            votes: Vec::with_capacity(completed.len()),
            failures,
            incomplete,
        };
        for (rule_id, name, confidence, score) in completed {
            outcome.triggers.push(TriggerInfo {
                rule_id,
                name,
                score,
                purpose,
            });
            outcome.votes.push(RuleVote {
                score,
                weight: confidence,
            });
        }
        Ok(outcome)
    }
}
