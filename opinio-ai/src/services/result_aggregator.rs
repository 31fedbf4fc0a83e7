//! Aggregation of classification results
//!
//! Folds results into an [`AggregateReport`] in one pass, then runs the schema
//! validator. The validator never fails the run: each inconsistency is
//! repaired, logged as a data-quality warning and counted in `schema_repairs`.

use crate::error::ErrorKind;
use crate::models::{AggregateReport, ClassificationResult, ClassificationSource, IngestTally, SentimentCounts, SentimentPcts};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

/// Build the report for one run
pub fn aggregate(results: Vec<ClassificationResult>, tally: IngestTally) -> AggregateReport {
    let mut sentiment_counts = SentimentCounts::default();
    let mut theme_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut ai_count = 0;
    let mut degraded_count = 0;

    for result in &results {
        sentiment_counts.record(result.sentiment);
        for theme in &result.themes {
            *theme_counts.entry(theme.clone()).or_insert(0) += 1;
        }
        if result.source == ClassificationSource::Ai {
            ai_count += 1;
        }
        if result.is_degraded() {
            degraded_count += 1;
        }
    }

    let total_unique = results.len();

    let mut report = AggregateReport {
        run_id: Uuid::new_v4(),
        generated_at: chrono::Utc::now(),
        total_raw: tally.total_raw,
        total_unique,
        duplicates_removed: tally.duplicates_removed,
        skipped_rows: tally.skipped_rows,
        rejected_short_rows: tally.rejected_short_rows,
        sentiment_counts,
        sentiment_pcts: percentages(&sentiment_counts, total_unique),
        theme_counts,
        ai_count,
        degraded_count,
        results,
        ..Default::default()
    };

    let repairs = validate_schema(&mut report);

    info!(
        total_raw = report.total_raw,
        total_unique = report.total_unique,
        duplicates = report.duplicates_removed,
        ai = report.ai_count,
        degraded = report.degraded_count,
        repairs,
        "Aggregated results"
    );

    report
}

fn percentages(counts: &SentimentCounts, total: usize) -> SentimentPcts {
    if total == 0 {
        return SentimentPcts::default();
    }
    let pct = |n: usize| n as f64 * 100.0 / total as f64;
    SentimentPcts {
        positive: pct(counts.positive),
        neutral: pct(counts.neutral),
        negative: pct(counts.negative),
    }
}

/// Repair schema violations in place; returns the number of repairs made
///
/// Also adds the count to `report.schema_repairs`.
pub fn validate_schema(report: &mut AggregateReport) -> usize {
    let mut repairs = 0;
    let mut repair = |field: &str, detail: String| {
        warn!(kind = ?ErrorKind::SchemaViolation, field, detail = %detail, "Repaired report field");
        repairs += 1;
    };

    // Results are the source of truth for per-comment figures
    if report.total_unique != report.results.len() {
        repair(
            "total_unique",
            format!("{} != {} results", report.total_unique, report.results.len()),
        );
        report.total_unique = report.results.len();
    }

    for result in report.results.iter_mut() {
        if !result.confidence.is_finite() || !(0.0..=1.0).contains(&result.confidence) {
            repair(
                "results.confidence",
                format!("{} for '{}'", result.confidence, result.comment.normalized_text),
            );
            result.confidence = if result.confidence.is_finite() {
                result.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
        }

        let before = result.themes.len();
        result.themes.retain(|t| !t.trim().is_empty());
        if result.themes.len() != before {
            repair(
                "results.themes",
                format!("empty theme on '{}'", result.comment.normalized_text),
            );
        }
    }

    if report.sentiment_counts.total() != report.total_unique {
        repair(
            "sentiment_counts",
            format!(
                "sum {} != total_unique {}",
                report.sentiment_counts.total(),
                report.total_unique
            ),
        );
        let mut counts = SentimentCounts::default();
        for result in &report.results {
            counts.record(result.sentiment);
        }
        report.sentiment_counts = counts;
    }

    let pcts = report.sentiment_pcts;
    let pct_ok = |p: f64| p.is_finite() && (0.0..=100.0).contains(&p);
    if !(pct_ok(pcts.positive) && pct_ok(pcts.neutral) && pct_ok(pcts.negative)) {
        repair("sentiment_pcts", format!("{:?}", pcts));
        report.sentiment_pcts = percentages(&report.sentiment_counts, report.total_unique);
    }

    if report.theme_counts.keys().any(|k| k.trim().is_empty()) {
        repair("theme_counts", "empty theme name".to_string());
        report.theme_counts.retain(|k, _| !k.trim().is_empty());
    }

    if !report.rows_balance() {
        let accounted = report.total_unique + report.skipped_rows + report.rejected_short_rows;
        let duplicates = report.total_raw.saturating_sub(accounted);
        repair(
            "duplicates_removed",
            format!("{} recomputed as {}", report.duplicates_removed, duplicates),
        );
        report.duplicates_removed = duplicates;
        if !report.rows_balance() {
            // Fewer raw rows than accounted for
            repair(
                "total_raw",
                format!("{} recomputed as {}", report.total_raw, accounted),
            );
            report.total_raw = accounted;
        }
    }

    report.schema_repairs += repairs;
    repairs
}
