//! Combination mining passes.
//!
//! Same-timeframe mining groups fact-checks by exact detection instant and
//! scores every k-subset of signal names against those co-occurrence groups.
//! Cross-timeframe mining enumerates k-subsets of (signal, timeframe) pairs
//! and matches the base pair's recent occurrences against the others inside
//! a one-hour window. Both passes are pure functions over preloaded history;
//! the `CombinationMiner` wraps them with persistence and the per-signal
//! summary cache.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use sigval_core::{MinerConfig, Timeframe};
use sigval_data::{CrossTfComboRecord, FactCheckRecord, Repositories, TfComboRecord};
use sigval_factcheck::compute_accuracy;

use crate::combinations::KSubsets;
use crate::signature::{cross_combo_hash, join_names, tf_combo_hash};
use crate::summary_cache::{SignalSummary, SignalSummaryCache};

/// Hard ceiling on combination size, independent of configuration.
const MAX_COMBO_SIZE: usize = 3;

/// Counters for one mining pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MinerReport {
    pub candidates_considered: usize,
    pub qualified: usize,
    pub persisted: usize,
    pub skipped_low_samples: usize,
    pub skipped_low_accuracy: usize,
    pub capped: bool,
    pub elapsed_secs: f64,
}

/// Aggregate over one co-occurrence group: the fraction of its members that
/// predicted correctly and the group's mean price change.
#[derive(Debug, Clone, Copy)]
struct GroupStats {
    frac_correct: f64,
    mean_pct: f64,
}

fn pct_of(record: &FactCheckRecord) -> f64 {
    record.price_change_pct.to_f64().unwrap_or(0.0)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Profit factor over per-occurrence price changes split by correctness.
fn profit_factor(wins: &[f64], losses: &[f64]) -> f64 {
    let avg_win = mean(wins);
    let avg_loss = mean(losses);
    if avg_loss == 0.0 {
        0.0
    } else {
        (avg_win / avg_loss).abs()
    }
}

/// Same-timeframe mining over a preloaded history slice.
///
/// A co-occurrence of a k-subset is a detection instant whose fact-check
/// group contains exactly those k signal names. Combo accuracy is the mean
/// of per-group correctness fractions; a group votes "correct" when its
/// fraction exceeds one half.
#[must_use]
pub fn compute_tf_combos(
    timeframe: &str,
    records: &[FactCheckRecord],
    config: &MinerConfig,
) -> (Vec<TfComboRecord>, MinerReport) {
    let mut report = MinerReport::default();
    let mut combos = Vec::new();

    let names: Vec<String> = records
        .iter()
        .map(|r| r.signal_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    // Group by exact detection instant, then index each group's stats by its
    // sorted name set so subset lookup is a map hit.
    let mut by_instant: BTreeMap<DateTime<Utc>, Vec<&FactCheckRecord>> = BTreeMap::new();
    for record in records {
        by_instant.entry(record.detected_at).or_default().push(record);
    }
    let mut groups_by_set: HashMap<Vec<String>, Vec<GroupStats>> = HashMap::new();
    for group in by_instant.values() {
        let set: Vec<String> = group
            .iter()
            .map(|r| r.signal_name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let correct = group.iter().filter(|r| r.predicted_correctly).count();
        let changes: Vec<f64> = group.iter().map(|r| pct_of(r)).collect();
        groups_by_set.entry(set).or_default().push(GroupStats {
            frac_correct: correct as f64 / group.len() as f64,
            mean_pct: mean(&changes),
        });
    }

    let max_size = config.max_combo_size.min(MAX_COMBO_SIZE);
    'mining: for k in config.min_combo_size..=max_size {
        for subset in KSubsets::new(&names, k) {
            report.candidates_considered += 1;
            if report.candidates_considered % config.batch_size == 0 {
                tracing::info!(
                    "same-tf mining: {} candidates considered, {} qualified",
                    report.candidates_considered,
                    report.qualified
                );
            }

            let key: Vec<String> = subset.into_iter().cloned().collect();
            let groups = groups_by_set.get(&key).map_or(&[][..], Vec::as_slice);
            if groups.len() < config.min_samples {
                report.skipped_low_samples += 1;
                continue;
            }

            let fractions: Vec<f64> = groups.iter().map(|g| g.frac_correct).collect();
            let accuracy = mean(&fractions) * 100.0;
            let correct_groups = groups.iter().filter(|g| g.frac_correct > 0.5).count();
            let wins: Vec<f64> = groups
                .iter()
                .filter(|g| g.frac_correct > 0.5)
                .map(|g| g.mean_pct)
                .collect();
            let losses: Vec<f64> = groups
                .iter()
                .filter(|g| g.frac_correct <= 0.5)
                .map(|g| g.mean_pct)
                .collect();
            let changes: Vec<f64> = groups.iter().map(|g| g.mean_pct).collect();

            if accuracy < config.min_accuracy {
                report.skipped_low_accuracy += 1;
                continue;
            }

            report.qualified += 1;
            combos.push(TfComboRecord {
                combo_hash: tf_combo_hash(&key, timeframe),
                signal_names: join_names(&key),
                timeframe: timeframe.to_string(),
                accuracy,
                sample_count: groups.len() as i32,
                correct_predictions: correct_groups as i32,
                avg_price_change: mean(&changes),
                profit_factor: profit_factor(&wins, &losses),
                combo_size: k as i32,
            });

            if let Some(cap) = config.max_combinations {
                if combos.len() >= cap {
                    report.capped = true;
                    break 'mining;
                }
            }
        }
    }

    (combos, report)
}

/// True when `sorted` holds a value within `window` of `target`.
fn has_match_within(sorted: &[i64], target: i64, window: i64) -> bool {
    let index = sorted.partition_point(|&ts| ts < target - window);
    sorted.get(index).is_some_and(|&ts| ts <= target + window)
}

/// Cross-timeframe mining over preloaded per-pair history.
///
/// `recent_by_pair` holds each pair's most recent fact-checks (newest
/// first, already capped); `timestamps_by_pair` holds each pair's full
/// detection timestamps in ascending Unix seconds.
#[must_use]
pub fn compute_cross_tf_combos(
    pairs: &[(String, String)],
    recent_by_pair: &HashMap<(String, String), Vec<FactCheckRecord>>,
    timestamps_by_pair: &HashMap<(String, String), Vec<i64>>,
    config: &MinerConfig,
) -> (Vec<CrossTfComboRecord>, MinerReport) {
    let mut report = MinerReport::default();
    let mut combos = Vec::new();

    let max_size = config.max_combo_size.min(MAX_COMBO_SIZE);
    'mining: for k in config.min_combo_size..=max_size {
        for subset in KSubsets::new(pairs, k) {
            report.candidates_considered += 1;
            if report.candidates_considered % config.batch_size == 0 {
                tracing::info!(
                    "cross-tf mining: {} candidates considered, {} qualified",
                    report.candidates_considered,
                    report.qualified
                );
            }

            let num_timeframes = subset
                .iter()
                .map(|(_, tf)| tf.as_str())
                .collect::<BTreeSet<_>>()
                .len();
            if num_timeframes < config.min_timeframes || num_timeframes > config.max_timeframes {
                continue;
            }

            let base = subset[0];
            let Some(base_records) = recent_by_pair.get(base) else {
                report.skipped_low_samples += 1;
                continue;
            };
            let others: Vec<&Vec<i64>> = subset[1..]
                .iter()
                .filter_map(|pair| timestamps_by_pair.get(*pair))
                .collect();
            if others.len() != subset.len() - 1 {
                report.skipped_low_samples += 1;
                continue;
            }

            let matches: Vec<&FactCheckRecord> = base_records
                .iter()
                .filter(|record| {
                    let target = record.detected_at.timestamp();
                    others
                        .iter()
                        .all(|ts| has_match_within(ts, target, config.time_window_secs))
                })
                .collect();
            if matches.len() < config.min_samples {
                report.skipped_low_samples += 1;
                continue;
            }

            let correct = matches.iter().filter(|r| r.predicted_correctly).count();
            let accuracy = correct as f64 / matches.len() as f64 * 100.0;
            if accuracy < config.min_accuracy {
                report.skipped_low_accuracy += 1;
                continue;
            }

            let wins: Vec<f64> = matches
                .iter()
                .filter(|r| r.predicted_correctly)
                .map(|r| pct_of(r))
                .collect();
            let losses: Vec<f64> = matches
                .iter()
                .filter(|r| !r.predicted_correctly)
                .map(|r| pct_of(r))
                .collect();
            let changes: Vec<f64> = matches.iter().map(|r| pct_of(r)).collect();

            let tokens: Vec<String> = subset
                .iter()
                .map(|(name, tf)| format!("{name}@{tf}"))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let timeframes: Vec<String> = subset
                .iter()
                .map(|(_, tf)| tf.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let signal_names: Vec<String> = subset
                .iter()
                .map(|(name, _)| name.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            report.qualified += 1;
            combos.push(CrossTfComboRecord {
                combo_hash: cross_combo_hash(&tokens),
                combo_signature: tokens.join("+"),
                timeframes: timeframes.join(","),
                signal_names: signal_names.join(","),
                accuracy,
                sample_count: matches.len() as i32,
                correct_predictions: correct as i32,
                avg_price_change: mean(&changes),
                profit_factor: profit_factor(&wins, &losses),
                combo_size: k as i32,
                num_timeframes: num_timeframes as i32,
            });

            if let Some(cap) = config.max_combinations {
                if combos.len() >= cap {
                    report.capped = true;
                    break 'mining;
                }
            }
        }
    }

    (combos, report)
}

/// Offline analyzer wrapping the mining passes with persistence and the
/// per-signal summary cache.
pub struct CombinationMiner {
    repos: Repositories,
    cache: SignalSummaryCache,
    config: MinerConfig,
}

impl CombinationMiner {
    #[must_use]
    pub fn new(repos: Repositories, config: MinerConfig, summary_ttl_secs: u64) -> Self {
        Self {
            repos,
            cache: SignalSummaryCache::new(summary_ttl_secs),
            config,
        }
    }

    /// The per-signal summary cache, for monitoring.
    #[must_use]
    pub fn summary_cache(&self) -> &SignalSummaryCache {
        &self.cache
    }

    /// Mines same-timeframe combinations for one timeframe and persists the
    /// qualifiers (duplicates are swallowed by the unique key).
    ///
    /// # Errors
    /// Returns an error if a history query or an insert fails.
    pub async fn analyze_combinations(&self, timeframe: Timeframe) -> Result<MinerReport> {
        let started = Instant::now();
        let records = self
            .repos
            .fact_checks
            .query_by_timeframe(timeframe.as_str())
            .await?;
        tracing::info!(
            "mining {} with {} fact-checks",
            timeframe,
            records.len()
        );
        self.refresh_summaries(timeframe.as_str(), &records).await;

        let (combos, mut report) = compute_tf_combos(timeframe.as_str(), &records, &self.config);
        for combo in &combos {
            if self.repos.combos.insert_tf_combo(combo).await? {
                report.persisted += 1;
            }
        }
        report.elapsed_secs = started.elapsed().as_secs_f64();
        tracing::info!(
            "same-tf mining done for {}: {} candidates, {} qualified, {} persisted in {:.1}s",
            timeframe,
            report.candidates_considered,
            report.qualified,
            report.persisted,
            report.elapsed_secs
        );
        Ok(report)
    }

    /// Mines cross-timeframe combinations across every fact-checked
    /// (signal, timeframe) pair and persists the qualifiers.
    ///
    /// # Errors
    /// Returns an error if a history query or an insert fails.
    pub async fn analyze_cross_tf_combinations(&self) -> Result<MinerReport> {
        let started = Instant::now();
        let pairs = self.repos.fact_checks.distinct_pairs().await?;
        tracing::info!("cross-tf mining over {} pairs", pairs.len());

        let mut recent_by_pair = HashMap::new();
        let mut timestamps_by_pair = HashMap::new();
        for pair in &pairs {
            let recent = self
                .repos
                .fact_checks
                .recent_for_pair(&pair.0, &pair.1, self.config.max_base_occurrences)
                .await?;
            let timestamps = self
                .repos
                .fact_checks
                .timestamps_for_pair(&pair.0, &pair.1)
                .await?
                .into_iter()
                .map(|ts| ts.timestamp())
                .collect();
            recent_by_pair.insert(pair.clone(), recent);
            timestamps_by_pair.insert(pair.clone(), timestamps);
        }

        let (combos, mut report) =
            compute_cross_tf_combos(&pairs, &recent_by_pair, &timestamps_by_pair, &self.config);
        for combo in &combos {
            if self.repos.combos.insert_cross_tf_combo(combo).await? {
                report.persisted += 1;
            }
        }
        report.elapsed_secs = started.elapsed().as_secs_f64();
        tracing::info!(
            "cross-tf mining done: {} candidates, {} qualified, {} persisted in {:.1}s",
            report.candidates_considered,
            report.qualified,
            report.persisted,
            report.elapsed_secs
        );
        Ok(report)
    }

    /// Refreshes the per-signal summary cache from the loaded history slice.
    async fn refresh_summaries(&self, timeframe: &str, records: &[FactCheckRecord]) {
        let mut by_name: HashMap<&str, Vec<FactCheckRecord>> = HashMap::new();
        for record in records {
            by_name
                .entry(record.signal_name.as_str())
                .or_default()
                .push(record.clone());
        }
        for (name, history) in by_name {
            let key = SignalSummaryCache::key(name, timeframe);
            if self.cache.get(&key).await.is_some() {
                continue;
            }
            if let Some(stats) = compute_accuracy(&history, 1) {
                self.cache
                    .insert(
                        &key,
                        SignalSummary {
                            accuracy: stats.accuracy,
                            sample_size: stats.total_samples,
                            profit_factor: stats.profit_factor,
                        },
                    )
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn make_record(
        name: &str,
        timeframe: &str,
        detected_at: DateTime<Utc>,
        correct: bool,
        change_pct: Decimal,
    ) -> FactCheckRecord {
        FactCheckRecord {
            signal_name: name.to_string(),
            timeframe: timeframe.to_string(),
            detected_at,
            price_at_detection: dec!(100),
            actual_move: "UP".to_string(),
            predicted_correctly: correct,
            price_change_pct: change_pct,
            exit_reason: if correct { "PROFIT_TARGET" } else { "LOSS" }.to_string(),
            candles_elapsed: 3,
            validation_window: 12,
            checked_at: Utc::now(),
        }
    }

    fn t(offset_hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(offset_hours)
    }

    fn config() -> MinerConfig {
        MinerConfig {
            min_samples: 20,
            min_accuracy: 60.0,
            min_combo_size: 2,
            max_combo_size: 3,
            ..MinerConfig::default()
        }
    }

    /// 25 instants where A and B co-occur; both correct at the first 20.
    fn co_occurring_history() -> Vec<FactCheckRecord> {
        let mut records = Vec::new();
        for i in 0..25 {
            let correct = i < 20;
            let pct = if correct { dec!(2) } else { dec!(-1) };
            records.push(make_record("sig_a", "1h", t(i), correct, pct));
            records.push(make_record("sig_b", "1h", t(i), correct, pct));
        }
        records
    }

    // ============================================
    // Same-timeframe mining
    // ============================================

    #[test]
    fn qualifying_pair_is_mined() {
        let records = co_occurring_history();
        let (combos, report) = compute_tf_combos("1h", &records, &config());

        assert_eq!(combos.len(), 1);
        let combo = &combos[0];
        assert_eq!(combo.signal_names, "sig_a+sig_b");
        assert_eq!(combo.combo_size, 2);
        assert_eq!(combo.sample_count, 25);
        assert_eq!(combo.correct_predictions, 20);
        assert!((combo.accuracy - 80.0).abs() < 1e-9);
        assert!((combo.profit_factor - 2.0).abs() < 1e-9);
        assert_eq!(report.qualified, 1);
    }

    #[test]
    fn below_min_samples_is_skipped() {
        // Only 10 co-occurrences.
        let mut records = Vec::new();
        for i in 0..10 {
            records.push(make_record("sig_a", "1h", t(i), true, dec!(2)));
            records.push(make_record("sig_b", "1h", t(i), true, dec!(2)));
        }
        let (combos, report) = compute_tf_combos("1h", &records, &config());
        assert!(combos.is_empty());
        assert!(report.skipped_low_samples >= 1);
    }

    #[test]
    fn below_min_accuracy_is_skipped() {
        // Co-occurrences are plentiful but only half predict correctly.
        let mut records = Vec::new();
        for i in 0..30 {
            let correct = i % 2 == 0;
            let pct = if correct { dec!(2) } else { dec!(-2) };
            records.push(make_record("sig_a", "1h", t(i), correct, pct));
            records.push(make_record("sig_b", "1h", t(i), correct, pct));
        }
        let (combos, report) = compute_tf_combos("1h", &records, &config());
        assert!(combos.is_empty());
        assert_eq!(report.skipped_low_accuracy, 1);
    }

    #[test]
    fn instants_with_extra_signals_do_not_count_for_smaller_subsets() {
        let mut records = co_occurring_history();
        // Five more instants where a third signal joins; these groups have
        // three distinct names and must not count toward the (a, b) pair.
        for i in 100..105 {
            records.push(make_record("sig_a", "1h", t(i), true, dec!(2)));
            records.push(make_record("sig_b", "1h", t(i), true, dec!(2)));
            records.push(make_record("sig_c", "1h", t(i), true, dec!(2)));
        }
        let (combos, _) = compute_tf_combos("1h", &records, &config());
        let pair = combos
            .iter()
            .find(|c| c.signal_names == "sig_a+sig_b")
            .unwrap();
        assert_eq!(pair.sample_count, 25);
    }

    #[test]
    fn mining_is_deterministic() {
        let records = co_occurring_history();
        let (first, _) = compute_tf_combos("1h", &records, &config());
        let (second, _) = compute_tf_combos("1h", &records, &config());
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.combo_hash, b.combo_hash);
            assert_eq!(a.sample_count, b.sample_count);
            assert!((a.accuracy - b.accuracy).abs() < 1e-12);
        }
    }

    #[test]
    fn max_combinations_cap_terminates_early() {
        let mut records = Vec::new();
        // Three signals co-occurring pairwise and as a triple, all correct.
        for i in 0..30 {
            records.push(make_record("sig_a", "1h", t(i), true, dec!(2)));
            records.push(make_record("sig_b", "1h", t(i), true, dec!(2)));
        }
        for i in 50..80 {
            records.push(make_record("sig_a", "1h", t(i), true, dec!(2)));
            records.push(make_record("sig_c", "1h", t(i), true, dec!(2)));
        }
        let mut capped_config = config();
        capped_config.max_combinations = Some(1);
        let (combos, report) = compute_tf_combos("1h", &records, &capped_config);
        assert_eq!(combos.len(), 1);
        assert!(report.capped);
    }

    // ============================================
    // Cross-timeframe mining
    // ============================================

    #[test]
    fn window_match_uses_binary_search() {
        let sorted = vec![100, 1_600, 9_000];
        assert!(has_match_within(&sorted, 1_000, 3_600));
        assert!(has_match_within(&sorted, 5_000, 3_600));
        assert!(!has_match_within(&sorted, 20_000, 3_600));
        assert!(!has_match_within(&[], 1_000, 3_600));
    }

    fn cross_fixture(
        offsets: &[i64],
        correct_base: usize,
    ) -> (
        Vec<(String, String)>,
        HashMap<(String, String), Vec<FactCheckRecord>>,
        HashMap<(String, String), Vec<i64>>,
    ) {
        let base_pair = ("sig_a".to_string(), "1h".to_string());
        let other_pair = ("sig_b".to_string(), "4h".to_string());

        let mut base_records = Vec::new();
        let mut other_ts = Vec::new();
        for (i, &offset) in offsets.iter().enumerate() {
            let base_time = t(i as i64 * 24);
            let correct = i < correct_base;
            let pct = if correct { dec!(2) } else { dec!(-1) };
            base_records.push(make_record("sig_a", "1h", base_time, correct, pct));
            other_ts.push(base_time.timestamp() + offset);
        }
        other_ts.sort_unstable();
        // Newest first, as the repository returns them.
        base_records.reverse();

        let pairs = vec![base_pair.clone(), other_pair.clone()];
        let mut recent = HashMap::new();
        recent.insert(base_pair.clone(), base_records);
        let mut timestamps = HashMap::new();
        timestamps.insert(other_pair, other_ts);
        timestamps.insert(base_pair, Vec::new());
        (pairs, recent, timestamps)
    }

    #[test]
    fn cross_combo_matches_within_the_hour_window() {
        // 25 base occurrences, others 600 seconds away, 20 correct.
        let offsets = vec![600; 25];
        let (pairs, recent, timestamps) = cross_fixture(&offsets, 20);
        let (combos, report) =
            compute_cross_tf_combos(&pairs, &recent, &timestamps, &config());

        assert_eq!(combos.len(), 1);
        let combo = &combos[0];
        assert_eq!(combo.combo_signature, "sig_a@1h+sig_b@4h");
        assert_eq!(combo.num_timeframes, 2);
        assert_eq!(combo.sample_count, 25);
        assert!((combo.accuracy - 80.0).abs() < 1e-9);
        assert_eq!(report.qualified, 1);
    }

    #[test]
    fn occurrences_outside_the_window_do_not_match() {
        // Others are two hours away: no matches at all.
        let offsets = vec![7_200; 25];
        let (pairs, recent, timestamps) = cross_fixture(&offsets, 25);
        let (combos, report) =
            compute_cross_tf_combos(&pairs, &recent, &timestamps, &config());
        assert!(combos.is_empty());
        assert!(report.skipped_low_samples >= 1);
    }

    #[test]
    fn single_timeframe_candidates_are_filtered_out() {
        let base_time = t(0);
        let pairs = vec![
            ("sig_a".to_string(), "1h".to_string()),
            ("sig_b".to_string(), "1h".to_string()),
        ];
        let mut recent = HashMap::new();
        recent.insert(
            pairs[0].clone(),
            vec![make_record("sig_a", "1h", base_time, true, dec!(2))],
        );
        let mut timestamps = HashMap::new();
        timestamps.insert(pairs[1].clone(), vec![base_time.timestamp()]);
        timestamps.insert(pairs[0].clone(), vec![base_time.timestamp()]);

        let (combos, report) = compute_cross_tf_combos(&pairs, &recent, &timestamps, &config());
        assert!(combos.is_empty());
        // Filtered by timeframe span, not by samples or accuracy.
        assert_eq!(report.skipped_low_samples, 0);
        assert_eq!(report.skipped_low_accuracy, 0);
        assert_eq!(report.candidates_considered, 1);
    }

    #[test]
    fn cross_mining_is_deterministic() {
        let offsets = vec![600; 25];
        let (pairs, recent, timestamps) = cross_fixture(&offsets, 20);
        let (first, _) = compute_cross_tf_combos(&pairs, &recent, &timestamps, &config());
        let (second, _) = compute_cross_tf_combos(&pairs, &recent, &timestamps, &config());
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.combo_hash, b.combo_hash);
        }
    }
}
