use itertools::iproduct;
use rayon::prelude::*;
use serde_json::json;

use crate::{
    dsl::semantic::SemanticType,
    report::AnalysisReport,
    rule::Rule,
};

// ================================================================================================
// Registration Sanity Harness
// ================================================================================================

/// One probe result that breaks the rule's declared contract.
#[derive(Debug, Clone, PartialEq)]
pub enum SanityViolation {
    /// Evaluation raised on a probe report.
    Failed { report_index: usize, cause: String },
    /// The output left the range declared for the rule's purpose.
    OutOfRange {
        report_index: usize,
        value: f64,
        lo: f64,
        hi: f64,
    },
}

/// Outcome of probing one rule over the whole corpus.
#[derive(Debug, Clone, Default)]
pub struct SanityReport {
    pub violations: Vec<SanityViolation>,
}

impl SanityReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Development-mode gate in front of rule registration.
///
/// Probes a candidate rule against a corpus of reports and flags outputs
/// that leave the range its purpose declares. Registration of hand-coded
/// seeds and freshly evolved rules runs through this before `put`;
/// nothing on the live evaluation path does.
#[derive(Debug)]
pub struct SanityHarness {
    reports: Vec<AnalysisReport>,
}

impl SanityHarness {
    pub fn new(reports: Vec<AnalysisReport>) -> Self {
        Self { reports }
    }

    /// A deterministic probe corpus: the neutral report, partial reports,
    /// and a grid over the extreme corners of the known leaves.
    pub fn standard() -> Self {
        let mut reports = vec![
            // Entirely empty: every variable must fall back to neutral.
            AnalysisReport::from_value(json!({})).expect("object literal"),
            // Partially filled: missing news section.
            AnalysisReport::from_value(json!({
                "technical_report": {
                    "daily_report": { "key_indicators": { "rsi_14": 50.0 } }
                }
            }))
            .expect("object literal"),
        ];

        let rsi_values = [0.0, 30.0, 50.0, 70.0, 100.0];
        let directions = ["uptrend", "downtrend", "sideways"];
        let news_counts = [0, 50];

        for (rsi, direction, news) in iproduct!(rsi_values, directions, news_counts) {
            let doc = json!({
                "ticker": "PROBE",
                "technical_report": {
                    "daily_report": {
                        "key_indicators": { "rsi_14": rsi },
                        "trend_report": {
                            "midterm_report": { "ma_direction": direction },
                            "overall_strength": { "value": if direction == "sideways" { 0.0 } else { 1.0 } }
                        }
                    },
                    "intraday_report": {
                        "momentum_report": {
                            "macd_crossover": if rsi >= 50.0 { "bull" } else { "bear" }
                        }
                    }
                },
                "forecasting_report": {
                    "forecasts": [{
                        "task_metadata": { "problem_id": "triple-barrier" },
                        "prediction": [rsi / 100.0, 0.2, 0.1]
                    }]
                },
                "news_report": {
                    "summary": {
                        "num_positive_sentiment": news,
                        "num_negative_sentiment": news_counts[1] - news,
                        "num_high_impact": news / 10
                    }
                }
            });
            reports.push(AnalysisReport::from_value(doc).expect("object literal"));
        }

        Self::new(reports)
    }

    pub fn corpus_len(&self) -> usize {
        self.reports.len()
    }

    /// Probes every corpus report in parallel. Violations come back in
    /// corpus order, so repeated checks of one rule are identical.
    pub fn check(&self, rule: &Rule) -> SanityReport {
        let (lo, hi) = purpose_range(rule.purpose());

        let mut violations: Vec<SanityViolation> = self
            .reports
            .par_iter()
            .enumerate()
            .filter_map(|(report_index, report)| match rule.execute(report) {
                Err(error) => Some(SanityViolation::Failed {
                    report_index,
                    cause: error.to_string(),
                }),
                Ok(score) if score.0 < lo || score.0 > hi => {
                    Some(SanityViolation::OutOfRange {
                        report_index,
                        value: score.0,
                        lo,
                        hi,
                    })
                }
                Ok(_) => None,
            })
            .collect();

        violations.sort_by_key(|violation| match violation {
            SanityViolation::Failed { report_index, .. } => *report_index,
            SanityViolation::OutOfRange { report_index, .. } => *report_index,
        });

        SanityReport { violations }
    }
}

fn purpose_range(purpose: SemanticType) -> (f64, f64) {
    match purpose {
        SemanticType::DecisionSignal => (-1.0, 1.0),
        // Risk and opportunity ratings; any other purpose is rejected at
        // rule construction before the harness ever sees it.
        _ => (0.0, 1.0),
    }
}
