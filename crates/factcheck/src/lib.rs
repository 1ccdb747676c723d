//! Fact-checking engine: filter, evaluator, bulk orchestrator, and the
//! accuracy/confidence aggregator.

pub mod accuracy;
pub mod evaluator;
pub mod filter;
pub mod orchestrator;
pub mod report;

pub use accuracy::{adjust_confidence, compute_accuracy, ConfidenceService, SignalAccuracyStats};
pub use evaluator::evaluate;
pub use filter::{CheckReason, FilterDecision, FilterInputs, FilterStats, SignalFilter};
pub use orchestrator::{BulkFactChecker, FactCheckDetail, FactCheckOptions, FactCheckRunSummary};
pub use report::RunReportFormatter;
