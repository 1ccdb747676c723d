#![allow(clippy::format_push_string)]

//! Plain-text report for a bulk fact-check run.

use crate::orchestrator::FactCheckRunSummary;

pub struct RunReportFormatter;

impl RunReportFormatter {
    #[must_use]
    pub fn format(summary: &FactCheckRunSummary) -> String {
        let mut output = String::new();

        output.push('\n');
        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output.push_str("                    FACT-CHECK RESULTS                         \n");
        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output.push('\n');

        output.push_str("Candidates\n");
        output.push_str("───────────────────────────────────────────────────────────────\n");
        output.push_str(&format!(
            "Pulled:                {}\n",
            summary.total_candidates
        ));
        output.push_str(&format!(
            "Filtered out:          {}\n",
            summary.filtered_out
        ));
        if let Some(stats) = &summary.filter_stats {
            output.push_str(&format!(
                "Check rate:            {:.1}%\n",
                stats.check_rate() * 100.0
            ));
            let mut reasons: Vec<_> = stats.by_reason.iter().collect();
            reasons.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (reason, count) in reasons {
                output.push_str(&format!("  {:<22} {}\n", reason, count));
            }
        }
        output.push('\n');

        output.push_str("Outcomes\n");
        output.push_str("───────────────────────────────────────────────────────────────\n");
        output.push_str(&format!(
            "Checked:               {}\n",
            summary.total_checked
        ));
        if summary.total_checked > 0 {
            output.push_str(&format!(
                "Accuracy:              {:.1}%\n",
                summary.accuracy
            ));
            output.push_str(&format!(
                "Correct:               {}\n",
                summary.correct_predictions
            ));
            output.push_str(&format!(
                "Incorrect:             {}\n",
                summary.incorrect_predictions
            ));
            output.push_str(&format!("Stopped out:           {}\n", summary.stopped_out));
            output.push_str(&format!(
                "Profit factor:         {:.2}\n",
                summary.profit_factor
            ));
        } else {
            output.push_str("Accuracy:              N/A (nothing checked)\n");
        }
        output.push_str(&format!("No candle data:        {}\n", summary.no_data));
        output.push_str(&format!("Errors:                {}\n", summary.errors));
        output.push('\n');

        if !summary.by_exit_reason.is_empty() {
            output.push_str("Exit Reasons\n");
            output.push_str("───────────────────────────────────────────────────────────────\n");
            let mut reasons: Vec<_> = summary.by_exit_reason.iter().collect();
            reasons.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (reason, count) in reasons {
                output.push_str(&format!("  {:<28} {}\n", reason, count));
            }
            output.push('\n');
        }

        output.push_str("Housekeeping\n");
        output.push_str("───────────────────────────────────────────────────────────────\n");
        output.push_str(&format!(
            "Confidence rows:       {}\n",
            summary.confidence_rows_updated
        ));
        output.push_str(&format!(
            "Elapsed:               {:.1}s\n",
            summary.elapsed.as_secs_f64()
        ));
        output.push('\n');
        output.push_str("═══════════════════════════════════════════════════════════════\n");

        if summary.cancelled {
            output.push_str("\n⚠️  Run was cancelled; these numbers cover a partial pass.\n\n");
        }

        output
    }
}
