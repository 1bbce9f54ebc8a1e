//! JSON envelopes written to stdout.
//!
//! A run either produces a full success report or a single error message, never
//! anything in between.

use serde::{Deserialize, Serialize};

use crate::evolution::portfolio_evolution::{EvolutionResult, GenerationRecord};
use crate::portfolio::Allocation;
use crate::sampling::FrontierPoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub expected_return: f64,
    pub risk: f64,
    pub fitness: f64,
    pub concentration_index: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionEntry {
    pub ticker: String,
    pub weight: f64,
    pub percentage: String,
}

/// Convergence history as parallel arrays, ready to be plotted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryReport {
    pub generation: Vec<usize>,
    pub best_fitness: Vec<f64>,
    pub avg_fitness: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub metrics: Metrics,
    pub composition: Vec<CompositionEntry>,
    pub history: HistoryReport,
    pub efficient_frontier: Vec<FrontierPoint>,
}

impl OptimizationReport {
    pub fn new(
        tickers: &[String],
        evolution: &EvolutionResult,
        efficient_frontier: Vec<FrontierPoint>,
    ) -> Self {
        let best = &evolution.best_portfolio;
        OptimizationReport {
            metrics: Metrics {
                expected_return: best.performance.expected_return,
                risk: best.performance.risk,
                fitness: best.performance.fitness,
                concentration_index: best.performance.concentration_index,
            },
            composition: best
                .allocations(tickers)
                .into_iter()
                .map(CompositionEntry::from)
                .collect(),
            history: HistoryReport::from(evolution.history.as_slice()),
            efficient_frontier,
        }
    }
}

impl From<Allocation> for CompositionEntry {
    fn from(allocation: Allocation) -> Self {
        CompositionEntry {
            percentage: format!("{:.2}%", allocation.weight * 100.0),
            ticker: allocation.ticker,
            weight: allocation.weight,
        }
    }
}

impl From<&[GenerationRecord]> for HistoryReport {
    fn from(history: &[GenerationRecord]) -> Self {
        let mut report = HistoryReport {
            generation: Vec::with_capacity(history.len()),
            best_fitness: Vec::with_capacity(history.len()),
            avg_fitness: Vec::with_capacity(history.len()),
        };
        for record in history {
            report.generation.push(record.generation);
            report.best_fitness.push(record.best_fitness);
            report.avg_fitness.push(record.average_fitness);
        }
        report
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Envelope {
    Success(OptimizationReport),
    Error { message: String },
}

impl Envelope {
    pub fn error(message: impl Into<String>) -> Self {
        Envelope::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self, pretty: bool) -> String {
        let rendered = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        // only non-string map keys or failing Serialize impls can error here, we have neither
        rendered.unwrap_or_else(|e| {
            format!(
                r#"{{"status":"error","message":"failed to serialize report: {}"}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::objective::PortfolioPerformance;
    use crate::evolution::portfolio_evolution::FinalPopulationSummary;
    use crate::portfolio::Portfolio;

    fn evolution() -> EvolutionResult {
        EvolutionResult {
            best_portfolio: Portfolio::new(
                vec![0.25, 0.75],
                PortfolioPerformance {
                    expected_return: 0.175,
                    risk: 0.25,
                    concentration_index: 0.625,
                    fitness: -0.1,
                },
            ),
            history: vec![
                GenerationRecord {
                    generation: 1,
                    best_fitness: -0.2,
                    average_fitness: -0.4,
                },
                GenerationRecord {
                    generation: 2,
                    best_fitness: -0.1,
                    average_fitness: -0.3,
                },
            ],
            final_summary: FinalPopulationSummary {
                best_fitness: -0.1,
                population_average_fitness: -0.2,
            },
        }
    }

    #[test]
    fn test_report_layout() {
        let tickers = vec!["AAA".to_string(), "BBB".to_string()];
        let report = OptimizationReport::new(&tickers, &evolution(), vec![]);

        assert_eq!(report.composition[0].ticker, "BBB");
        assert_eq!(report.composition[0].percentage, "75.00%");
        assert_eq!(report.composition[1].ticker, "AAA");
        assert_eq!(report.history.generation, vec![1, 2]);
        assert_eq!(report.history.best_fitness, vec![-0.2, -0.1]);
        assert_eq!(report.history.avg_fitness, vec![-0.4, -0.3]);
        assert_eq!(report.metrics.concentration_index, 0.625);
    }

    #[test]
    fn test_envelopes_are_tagged_by_status() {
        let tickers = vec!["AAA".to_string(), "BBB".to_string()];
        let success = Envelope::Success(OptimizationReport::new(&tickers, &evolution(), vec![]));
        let json: serde_json::Value = serde_json::from_str(&success.to_json(false)).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["metrics"]["risk"], 0.25);
        assert_eq!(json["history"]["avg_fitness"][1], -0.3);

        let error = Envelope::error("no price data found for ticker `ZZZ`");
        let json: serde_json::Value = serde_json::from_str(&error.to_json(true)).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "no price data found for ticker `ZZZ`");
        assert!(json.get("metrics").is_none());
    }
}
