//! Shared fixtures for the advisor integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use augur::{
    AnalysisProvider, AnalysisReport, AugurResult, RuleRecord, RuleStatus, Ticker,
    domain::RuleId,
    dsl::semantic::SemanticType,
    error::DataError,
    repository::{InMemoryRuleRepository, RuleRepository},
};

/// Installs a fmt subscriber once; `RUST_LOG=augur=debug` shows the
/// pipeline's spans while debugging a failing scenario.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ================================================================================================
// Analysis Providers
// ================================================================================================

/// Serves one fixed report for every ticker.
pub struct StaticProvider {
    report: AnalysisReport,
}

impl StaticProvider {
    pub fn new(report: AnalysisReport) -> Arc<Self> {
        Arc::new(Self { report })
    }
}

#[async_trait]
impl AnalysisProvider for StaticProvider {
    async fn fetch(&self, _ticker: &Ticker) -> AugurResult<AnalysisReport> {
        Ok(self.report.clone())
    }
}

/// Never delivers: used to probe the request deadline.
pub struct StalledProvider;

#[async_trait]
impl AnalysisProvider for StalledProvider {
    async fn fetch(&self, _ticker: &Ticker) -> AugurResult<AnalysisReport> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        unreachable!("the deadline fires first")
    }
}

/// Always reports the analysis service as down.
pub struct UnavailableProvider;

#[async_trait]
impl AnalysisProvider for UnavailableProvider {
    async fn fetch(&self, ticker: &Ticker) -> AugurResult<AnalysisReport> {
        Err(DataError::AnalysisReportUnavailable {
            ticker: ticker.to_string(),
            msg: "analysis service down".to_string(),
        }
        .into())
    }
}

/// Repository that refuses every call.
pub struct BrokenRepository;

#[async_trait]
impl RuleRepository for BrokenRepository {
    async fn list_by(
        &self,
        _purpose: SemanticType,
        _status: RuleStatus,
    ) -> AugurResult<Vec<RuleRecord>> {
        Err(augur::error::RepositoryError::Unavailable("rule store offline".to_string()).into())
    }

    async fn get(&self, rule_id: &RuleId) -> AugurResult<RuleRecord> {
        Err(augur::error::RepositoryError::RuleNotFound(rule_id.to_string()).into())
    }

    async fn put(&self, _record: RuleRecord) -> AugurResult<()> {
        Err(augur::error::RepositoryError::Unavailable("rule store offline".to_string()).into())
    }
}

// ================================================================================================
// Reports
// ================================================================================================

pub fn neutral_report() -> AnalysisReport {
    AnalysisReport::from_value(json!({
        "ticker": "AAPL",
        "generated_at_utc": "2026-02-11T09:30:00Z",
        "generated_timestamp": 1770802200
    }))
    .expect("object literal")
}

pub fn rsi_report(rsi: f64) -> AnalysisReport {
    AnalysisReport::from_value(json!({
        "ticker": "AAPL",
        "generated_at_utc": "2026-02-11T09:30:00Z",
        "generated_timestamp": 1770802200,
        "technical_report": {
            "daily_report": { "key_indicators": { "rsi_14": rsi } }
        }
    }))
    .expect("object literal")
}

// ================================================================================================
// Rule Records
// ================================================================================================

fn record(
    id: &str,
    name: &str,
    purpose: SemanticType,
    tree: serde_json::Value,
) -> RuleRecord {
    RuleRecord {
        rule_id: RuleId::new(id),
        name: name.to_string(),
        description: String::new(),
        version: "1".to_string(),
        purpose,
        rule_status: RuleStatus::Ready,
        created_at_ts: 1_770_000_000,
        tags: vec![],
        metrics: None,
        tree,
    }
}

/// `DECISION(CLAMP(SIGN(SUB(RSI_14, 50)), -1, 1))`: votes +1 above the
/// RSI midline, -1 below it.
pub fn rsi_midline_decision(id: &str) -> RuleRecord {
    record(
        id,
        "RSI above midline",
        SemanticType::DecisionSignal,
        json!({
            "node_name": "DECISION",
            "children": [{
                "node_name": "CLAMP",
                "children": [
                    {
                        "node_name": "SIGN",
                        "children": [{
                            "node_name": "SUB",
                            "children": [
                                { "node_name": "RSI_14" },
                                { "node_name": "NUM_CONST", "params": { "value": 50.0 } }
                            ]
                        }]
                    },
                    { "node_name": "NUM_CONST", "params": { "value": -1.0 } },
                    { "node_name": "NUM_CONST", "params": { "value": 1.0 } }
                ]
            }]
        }),
    )
}

/// A rule that always votes the given decision signal.
pub fn constant_decision(id: &str, value: f64) -> RuleRecord {
    record(
        id,
        &format!("constant decision {value}"),
        SemanticType::DecisionSignal,
        json!({
            "node_name": "DECISION",
            "children": [{ "node_name": "NUM_CONST", "params": { "value": value } }]
        }),
    )
}

/// A rule that always rates risk at the given level.
pub fn constant_risk(id: &str, value: f64) -> RuleRecord {
    record(
        id,
        &format!("constant risk {value}"),
        SemanticType::RiskLevel,
        json!({
            "node_name": "RISK",
            "children": [{ "node_name": "NUM_CONST", "params": { "value": value } }]
        }),
    )
}

/// A rule that always rates opportunity at the given level.
pub fn constant_opportunity(id: &str, value: f64) -> RuleRecord {
    record(
        id,
        &format!("constant opportunity {value}"),
        SemanticType::OpportunityRating,
        json!({
            "node_name": "OPPORTUNITY",
            "children": [{ "node_name": "NUM_CONST", "params": { "value": value } }]
        }),
    )
}

/// A decision rule reading the (possibly absent) high-impact news counter.
pub fn news_impact_decision(id: &str) -> RuleRecord {
    record(
        id,
        "high impact news pressure",
        SemanticType::DecisionSignal,
        json!({
            "node_name": "DECISION",
            "children": [{ "node_name": "NEWS_HIGH_IMPACT_COUNT" }]
        }),
    )
}

pub fn repository_with(records: Vec<RuleRecord>) -> Arc<InMemoryRuleRepository> {
    Arc::new(InMemoryRuleRepository::with_records(records))
}
