use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Months, TimeZone, Utc};

use crate::errors::ServiceError;
use crate::models::{ProductId, SalesRecord, StoreId};

/// Ordered feature names. Length and order are fixed per model version; the
/// active artifact carries its own copy and inference verifies the two match.
pub const FEATURE_SCHEMA: [&str; 10] = [
    "month",
    "year",
    "sales_last_1_month",
    "sales_last_2_month",
    "sales_last_3_month",
    "average_discount",
    "is_festival_month",
    "sales_trend",
    "month_sin",
    "month_cos",
];

/// Windows with fewer distinct months than this are flagged low-confidence.
pub const RELIABLE_MONTHS: usize = 3;

pub type FeatureVector = Vec<f64>;

/// Output of feature engineering for one forecast target.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub vector: FeatureVector,
    /// Set when the window holds fewer than [`RELIABLE_MONTHS`] distinct months
    pub low_confidence: bool,
    pub distinct_months: usize,
}

/// Calendar-month key: (year, month)
fn month_key(date: DateTime<Utc>) -> (i32, u32) {
    (date.year(), date.month())
}

/// The calendar month exactly `k` months before `target_month`.
fn lag_month_key(target_month: DateTime<Utc>, k: u32) -> Option<(i32, u32)> {
    target_month
        .date_naive()
        .checked_sub_months(Months::new(k))
        .map(|d| (d.year(), d.month()))
}

/// First-of-month UTC timestamp for a (year, month) key.
pub fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
}

/// Mean discount over a window; an empty window yields 0.0 rather than a
/// division by zero.
fn mean_discount(records: &[&SalesRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|r| r.discount).sum::<f64>() / records.len() as f64
}

/// Deterministic feature engineering from raw sales records.
pub struct FeatureBuilder;

impl FeatureBuilder {
    /// Builds the feature vector for `target_month` from `records`.
    ///
    /// Records must already be sorted ascending by date; the ordering
    /// precondition is checked here, once, and violations are rejected
    /// rather than re-sorted. Only records strictly before `target_month`
    /// enter the window.
    pub fn build(
        records: &[SalesRecord],
        target_month: DateTime<Utc>,
    ) -> Result<FeatureSet, ServiceError> {
        let window: Vec<&SalesRecord> = records
            .iter()
            .filter(|r| r.date < target_month)
            .collect();

        if window.windows(2).any(|w| w[0].date > w[1].date) {
            return Err(ServiceError::ValidationError(
                "sales records must be sorted ascending by date".to_string(),
            ));
        }

        let months: BTreeSet<(i32, u32)> = window.iter().map(|r| month_key(r.date)).collect();
        let distinct_months = months.len();
        if distinct_months == 0 {
            return Err(ServiceError::InsufficientData(format!(
                "no sales history before {}",
                target_month.format("%Y-%m")
            )));
        }

        let lag = |k: u32| -> f64 {
            match lag_month_key(target_month, k) {
                // A month with no matching records contributes 0, not missing
                Some(key) => window
                    .iter()
                    .filter(|r| month_key(r.date) == key)
                    .map(|r| r.quantity)
                    .sum::<i64>() as f64,
                None => 0.0,
            }
        };

        let sales_last_1 = lag(1);
        let sales_last_2 = lag(2);
        let sales_last_3 = lag(3);

        let average_discount = mean_discount(&window);

        // Festival signal comes from the most recent month of the window
        let latest_month = *months.iter().next_back().expect("window is non-empty");
        let is_festival_month = window
            .iter()
            .any(|r| month_key(r.date) == latest_month && r.is_festival);

        let sales_trend = (sales_last_1 - sales_last_3) / 2.0;
        let phase = (target_month.month() - 1) as f64 / 12.0 * std::f64::consts::TAU;

        let vector = vec![
            target_month.month() as f64,
            target_month.year() as f64,
            sales_last_1,
            sales_last_2,
            sales_last_3,
            average_discount,
            if is_festival_month { 1.0 } else { 0.0 },
            sales_trend,
            phase.sin(),
            phase.cos(),
        ];
        debug_assert_eq!(vector.len(), FEATURE_SCHEMA.len());

        Ok(FeatureSet {
            vector,
            low_confidence: distinct_months < RELIABLE_MONTHS,
            distinct_months,
        })
    }

    /// Assembles a labeled training matrix from a mixed batch of records.
    ///
    /// Records are grouped per (store, product) pair; every calendar month
    /// with at least one prior month of history in its pair becomes a row,
    /// labeled with that month's summed quantity. Groups are visited in key
    /// order so the matrix layout is reproducible across runs.
    pub fn build_training_set(records: &[SalesRecord]) -> (Vec<FeatureVector>, Vec<f64>) {
        let mut groups: BTreeMap<(StoreId, ProductId), Vec<SalesRecord>> = BTreeMap::new();
        for record in records {
            groups
                .entry((record.store_id.clone(), record.product_id.clone()))
                .or_default()
                .push(record.clone());
        }

        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for group in groups.values_mut() {
            group.sort_by_key(|r| r.date);

            let months: BTreeSet<(i32, u32)> = group.iter().map(|r| month_key(r.date)).collect();
            for &(year, month) in months.iter().skip(1) {
                let target = month_start(year, month);
                let Ok(features) = Self::build(group, target) else {
                    continue;
                };
                let label: i64 = group
                    .iter()
                    .filter(|r| month_key(r.date) == (year, month))
                    .map(|r| r.quantity)
                    .sum();
                rows.push(features.vector);
                labels.push(label as f64);
            }
        }

        (rows, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(
        year: i32,
        month: u32,
        day: u32,
        quantity: i64,
        discount: f64,
        is_festival: bool,
    ) -> SalesRecord {
        SalesRecord {
            store_id: StoreId::parse("STORE001").unwrap(),
            product_id: ProductId::parse("PROD-1").unwrap(),
            date: Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap(),
            quantity,
            revenue: dec!(100.00),
            discount,
            is_festival,
        }
    }

    fn flat_year() -> Vec<SalesRecord> {
        (1..=12)
            .map(|m| record(2024, m, 15, 10, 0.0, false))
            .collect()
    }

    #[test]
    fn twelve_flat_months_yield_expected_features() {
        let records = flat_year();
        let target = month_start(2025, 1);

        let set = FeatureBuilder::build(&records, target).unwrap();
        assert_eq!(set.distinct_months, 12);
        assert!(!set.low_confidence);

        assert_eq!(set.vector[0], 1.0); // month
        assert_eq!(set.vector[1], 2025.0); // year
        assert_eq!(set.vector[2], 10.0); // sales_last_1_month
        assert_eq!(set.vector[3], 10.0);
        assert_eq!(set.vector[4], 10.0);
        assert_eq!(set.vector[5], 0.0); // average_discount
        assert_eq!(set.vector[6], 0.0); // is_festival_month
        assert_eq!(set.vector[7], 0.0); // sales_trend
    }

    #[test]
    fn empty_window_is_insufficient_data() {
        let records = flat_year();
        // Everything is at or after the target, so the window is empty
        let target = month_start(2024, 1);
        let err = FeatureBuilder::build(&records, target).unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientData(_)));
    }

    #[test]
    fn one_or_two_months_flag_low_confidence() {
        let records = vec![record(2024, 11, 5, 7, 0.1, false)];
        let set = FeatureBuilder::build(&records, month_start(2024, 12)).unwrap();
        assert!(set.low_confidence);

        let records = vec![
            record(2024, 10, 5, 7, 0.1, false),
            record(2024, 11, 5, 9, 0.1, false),
        ];
        let set = FeatureBuilder::build(&records, month_start(2024, 12)).unwrap();
        assert_eq!(set.distinct_months, 2);
        assert!(set.low_confidence);

        let records = vec![
            record(2024, 9, 5, 5, 0.0, false),
            record(2024, 10, 5, 7, 0.0, false),
            record(2024, 11, 5, 9, 0.0, false),
        ];
        let set = FeatureBuilder::build(&records, month_start(2024, 12)).unwrap();
        assert!(!set.low_confidence);
    }

    #[test]
    fn unsorted_records_are_rejected() {
        let records = vec![
            record(2024, 11, 5, 7, 0.0, false),
            record(2024, 10, 5, 9, 0.0, false),
        ];
        let err = FeatureBuilder::build(&records, month_start(2024, 12)).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn gap_month_contributes_zero_lag() {
        // October is missing entirely
        let records = vec![
            record(2024, 9, 5, 6, 0.0, false),
            record(2024, 11, 5, 8, 0.0, false),
        ];
        let set = FeatureBuilder::build(&records, month_start(2024, 12)).unwrap();
        assert_eq!(set.vector[2], 8.0); // November
        assert_eq!(set.vector[3], 0.0); // October: zero, not missing
        assert_eq!(set.vector[4], 6.0); // September
    }

    #[test]
    fn multiple_records_in_lag_month_are_summed() {
        let records = vec![
            record(2024, 11, 5, 3, 0.0, false),
            record(2024, 11, 20, 4, 0.0, false),
        ];
        let set = FeatureBuilder::build(&records, month_start(2024, 12)).unwrap();
        assert_eq!(set.vector[2], 7.0);
    }

    #[test]
    fn festival_flag_reads_most_recent_month_only() {
        let records = vec![
            record(2024, 10, 5, 7, 0.0, true),
            record(2024, 11, 5, 9, 0.0, false),
        ];
        let set = FeatureBuilder::build(&records, month_start(2024, 12)).unwrap();
        assert_eq!(set.vector[6], 0.0);

        let records = vec![
            record(2024, 10, 5, 7, 0.0, false),
            record(2024, 11, 5, 9, 0.0, true),
        ];
        let set = FeatureBuilder::build(&records, month_start(2024, 12)).unwrap();
        assert_eq!(set.vector[6], 1.0);
    }

    #[test]
    fn mean_discount_of_empty_window_is_zero() {
        assert_eq!(mean_discount(&[]), 0.0);
    }

    #[test]
    fn training_set_skips_first_month_and_labels_the_rest() {
        let records = flat_year();
        let (rows, labels) = FeatureBuilder::build_training_set(&records);
        // 12 months, the first has no prior history
        assert_eq!(rows.len(), 11);
        assert_eq!(labels.len(), 11);
        assert!(labels.iter().all(|&l| l == 10.0));
        assert!(rows.iter().all(|r| r.len() == FEATURE_SCHEMA.len()));
    }
}
