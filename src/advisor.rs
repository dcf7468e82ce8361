pub mod action;
pub mod aggregate;
pub mod evidence;
pub mod orchestrator;
pub mod profile;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    advisor::{
        action::{ActionMapper, TradingAction},
        aggregate::{
            AggregatedScores, DecisionLabel, OpportunityLabel, RiskLabel, ScoreFinalMapper,
            aggregate_raw, meta_synthesize,
        },
        evidence::{EvaluationFailureInfo, TriggerInfo},
        orchestrator::{PurposeOutcome, RulesOrchestrator},
        profile::{InvestmentProfile, Personalization},
    },
    config::EngineConfig,
    domain::{RuleId, Score, Ticker},
    dsl::{builtin::builtin_registry, registry::NodeRegistry, semantic::SemanticType},
    error::{AdvisorError, AugurResult},
    report::AnalysisReport,
    repository::{RuleLoader, RuleRepository},
};

// ================================================================================================
// External Collaborators
// ================================================================================================

/// The analysis service boundary: everything upstream of the engine
/// (ingestion, indicators, forecasting models) is behind this trait.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn fetch(&self, ticker: &Ticker) -> AugurResult<AnalysisReport>;
}

// ================================================================================================
// Advisor Report
// ================================================================================================

/// One rule's successful contribution, as published in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredRule {
    pub rule_id: RuleId,
    pub name: String,
    pub score: Score,
}

impl From<&TriggerInfo> for TriggeredRule {
    fn from(info: &TriggerInfo) -> Self {
        Self {
            rule_id: info.rule_id.clone(),
            name: info.name.clone(),
            score: info.score,
        }
    }
}

/// One purpose's slice of the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurposeSection<Label> {
    pub final_score: Score,
    pub label: Label,
    pub final_recommend: String,
    pub triggered_rules: Vec<TriggeredRule>,
}

pub type DecisionSection = PurposeSection<DecisionLabel>;
pub type RiskSection = PurposeSection<RiskLabel>;
pub type OpportunitySection = PurposeSection<OpportunityLabel>;

/// The advisor's complete answer for one `(ticker, profile)` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorReport {
    pub ticker: Ticker,
    pub generated_at_utc: String,
    pub generated_timestamp: i64,
    pub final_decision: DecisionSection,
    pub final_risk: RiskSection,
    pub final_opportunity: OpportunitySection,
    pub aggregated_scores: AggregatedScores,
    pub final_action: TradingAction,
    /// True when the deadline cut evaluation short and this is a partial
    /// (but per-purpose non-empty) result.
    #[serde(default)]
    pub incomplete: bool,
    /// Rules that raised during evaluation, preserved as evidence.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evaluation_failures: Vec<EvaluationFailureInfo>,
}

// ================================================================================================
// Advisor Orchestrator
// ================================================================================================

/// The top-level composition: report in, recommendation out.
///
/// Owns the published node registry and the purpose pipeline; holds no
/// per-request state, so one `Advisor` serves concurrent requests.
pub struct Advisor {
    config: EngineConfig,
    registry: Arc<NodeRegistry>,
    analysis: Arc<dyn AnalysisProvider>,
    orchestrator: RulesOrchestrator,
    score_mapper: ScoreFinalMapper,
    action_mapper: ActionMapper,
}

impl Advisor {
    pub fn new(
        config: EngineConfig,
        analysis: Arc<dyn AnalysisProvider>,
        repository: Arc<dyn RuleRepository>,
    ) -> AugurResult<Self> {
        config.validate()?;
        let registry = builtin_registry(&config)?;
        let loader = Arc::new(RuleLoader::new(registry.clone()));
        let orchestrator =
            RulesOrchestrator::new(repository, loader, config.evaluation.parallelism);

        Ok(Self {
            registry,
            analysis,
            orchestrator,
            score_mapper: ScoreFinalMapper::new(config.thresholds.clone()),
            action_mapper: ActionMapper::new(config.action.clone()),
            config,
        })
    }

    /// The registry this advisor evaluates against; the evolutionary
    /// producer constructs candidate trees through it.
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    #[tracing::instrument(skip(self, profile), fields(ticker = %ticker))]
    pub async fn advise(
        &self,
        ticker: &Ticker,
        profile: &InvestmentProfile,
    ) -> AugurResult<AdvisorReport> {
        let personalization = Personalization::from_profile(profile)?;
        let cancel = CancellationToken::new();
        let deadline_ms = self.config.evaluation.deadline_ms;
        if let Some(ms) = deadline_ms {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                cancel.cancel();
            });
        }

        // Step 1: the single fact input. Failures propagate; the core
        // never fabricates a report from stale data.
        let report = tokio::select! {
            biased;
            fetched = self.analysis.fetch(ticker) => Arc::new(fetched?),
            _ = cancel.cancelled() => {
                return Err(AdvisorError::DeadlineExceeded {
                    deadline_ms: deadline_ms.unwrap_or_default(),
                }
                .into());
            }
        };

        let decision = self
            .run_purpose(SemanticType::DecisionSignal, &report, &personalization, &cancel)
            .await?;
        let risk = self
            .run_purpose(SemanticType::RiskLevel, &report, &personalization, &cancel)
            .await?;
        let opportunity = self
            .run_purpose(
                SemanticType::OpportunityRating,
                &report,
                &personalization,
                &cancel,
            )
            .await?;

        let incomplete = decision.incomplete || risk.incomplete || opportunity.incomplete;
        if incomplete
            && (decision.triggers.is_empty()
                || risk.triggers.is_empty()
                || opportunity.triggers.is_empty())
        {
            return Err(AdvisorError::DeadlineExceeded {
                deadline_ms: deadline_ms.unwrap_or_default(),
            }
            .into());
        }

        let raw = aggregate_raw(
            &self.config.aggregation,
            &decision.votes,
            &risk.votes,
            &opportunity.votes,
        );
        let finals = meta_synthesize(&personalization.meta_weights, &raw);

        let decision_label = self.score_mapper.map_decision(finals.decision.0);
        let risk_label = self.score_mapper.map_risk(finals.risk.0);
        let opportunity_label = self.score_mapper.map_opportunity(finals.opportunity.0);

        let final_action = self.action_mapper.map(
            decision_label,
            finals.risk.0,
            finals.opportunity.0,
            profile.horizon,
            &personalization.modifiers,
        );

        let mut evaluation_failures = Vec::new();
        for outcome in [&decision, &risk, &opportunity] {
            evaluation_failures.extend(outcome.failures.iter().cloned());
        }

        info!(
            decision = %decision_label,
            risk = %risk_label,
            opportunity = %opportunity_label,
            action = %final_action.action_type,
            incomplete,
            "advisor run complete"
        );

        Ok(AdvisorReport {
            ticker: report.ticker().unwrap_or_else(|| ticker.clone()),
            generated_at_utc: report
                .generated_at_utc()
                .unwrap_or_else(Utc::now)
                .to_rfc3339(),
            generated_timestamp: report
                .generated_timestamp()
                .unwrap_or_else(|| Utc::now().timestamp()),
            final_decision: PurposeSection {
                final_score: finals.decision,
                label: decision_label,
                final_recommend: decision_label.recommendation().to_string(),
                triggered_rules: decision.triggers.iter().map(TriggeredRule::from).collect(),
            },
            final_risk: PurposeSection {
                final_score: finals.risk,
                label: risk_label,
                final_recommend: risk_label.recommendation().to_string(),
                triggered_rules: risk.triggers.iter().map(TriggeredRule::from).collect(),
            },
            final_opportunity: PurposeSection {
                final_score: finals.opportunity,
                label: opportunity_label,
                final_recommend: opportunity_label.recommendation().to_string(),
                triggered_rules: opportunity
                    .triggers
                    .iter()
                    .map(TriggeredRule::from)
                    .collect(),
            },
            aggregated_scores: raw,
            final_action,
            incomplete,
            evaluation_failures,
        })
    }

    /// One purpose run, also guarded against a repository that outlives
    /// the deadline.
    async fn run_purpose(
        &self,
        purpose: SemanticType,
        report: &Arc<AnalysisReport>,
        personalization: &Personalization,
        cancel: &CancellationToken,
    ) -> AugurResult<PurposeOutcome> {
        let outcome = tokio::select! {
            biased;
            outcome = self.orchestrator.run_for_purpose(
                purpose,
                report.clone(),
                &personalization.selector,
                cancel,
            ) => outcome?,
            _ = cancel.cancelled() => PurposeOutcome {
                incomplete: true,
                ..Default::default()
            },
        };
        debug!(
            purpose = %purpose,
            triggered = outcome.triggers.len(),
            failed = outcome.failures.len(),
            incomplete = outcome.incomplete,
            "purpose run finished"
        );
        Ok(outcome)
    }
}
