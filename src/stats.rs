//src/stats.rs
//! Read-only rollups over fetched workouts, for the progress charts.
//!
//! Everything here is a pure function: empty input yields zero-filled or
//! empty output, and nothing errors or mutates its arguments. Calendar
//! bucketing uses the UTC day of `started_at`, the same day rule the streak
//! logic applies to `ended_at`.

use crate::models::{Workout, WorkoutType};
use chrono::{Datelike, Days, NaiveDate};
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Look-back window sizes per granularity.
const DAILY_BUCKETS: u32 = 7;
const WEEKLY_BUCKETS: u32 = 4;
const MONTHLY_BUCKETS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl Granularity {
    pub const fn bucket_count(self) -> u32 {
        match self {
            Self::Day => DAILY_BUCKETS,
            Self::Week => WEEKLY_BUCKETS,
            Self::Month => MONTHLY_BUCKETS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartMetric {
    Workouts,
    Volume,
    /// Summed workout duration, in minutes.
    Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartPoint {
    pub bucket_start: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeBreakdown {
    pub kind: WorkoutType,
    pub count: usize,
    pub percentage: f64,
}

fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(offset)).unwrap_or(date)
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn months_back(date: NaiveDate, count: u32) -> NaiveDate {
    let mut year = date.year();
    let mut month = date.month();
    for _ in 0..count {
        if month == 1 {
            month = 12;
            year -= 1;
        } else {
            month -= 1;
        }
    }
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// The bucket key a given day falls into.
fn bucket_key(granularity: Granularity, day: NaiveDate) -> NaiveDate {
    match granularity {
        Granularity::Day => day,
        Granularity::Week => week_start(day),
        Granularity::Month => month_start(day),
    }
}

fn metric_value(metric: ChartMetric, workout: &Workout) -> f64 {
    match metric {
        ChartMetric::Workouts => 1.0,
        ChartMetric::Volume => workout.total_volume(),
        ChartMetric::Duration => workout.duration_secs() as f64 / 60.0,
    }
}

/// Buckets completed workouts by `started_at` over a fixed look-back window
/// ending at `today`: 7 daily, 4 weekly or 12 monthly points. Every bucket
/// appears in the result, zero-valued when empty, so charts never show gaps.
pub fn chart_series(
    workouts: &[Workout],
    granularity: Granularity,
    metric: ChartMetric,
    today: NaiveDate,
) -> Vec<ChartPoint> {
    let count = granularity.bucket_count();
    let mut buckets: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for back in 0..count {
        let start = match granularity {
            Granularity::Day => today
                .checked_sub_days(Days::new(u64::from(back)))
                .unwrap_or(today),
            Granularity::Week => week_start(today)
                .checked_sub_days(Days::new(u64::from(back) * 7))
                .unwrap_or(today),
            Granularity::Month => months_back(month_start(today), back),
        };
        buckets.insert(start, 0.0);
    }

    for workout in workouts.iter().filter(|w| w.is_complete()) {
        let key = bucket_key(granularity, workout.started_at.date_naive());
        // Workouts outside the window fall through silently.
        if let Some(value) = buckets.get_mut(&key) {
            *value += metric_value(metric, workout);
        }
    }

    buckets
        .into_iter()
        .map(|(bucket_start, value)| ChartPoint {
            bucket_start,
            value,
        })
        .collect()
}

/// Groups completed workouts by type, with each type's share of the total.
/// Sorted by count descending (name as tie-break) and capped to `top`.
pub fn workout_type_breakdown(workouts: &[Workout], top: usize) -> Vec<TypeBreakdown> {
    let mut counts: HashMap<WorkoutType, usize> = HashMap::new();
    let mut total = 0usize;
    for workout in workouts.iter().filter(|w| w.is_complete()) {
        *counts.entry(workout.kind).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return Vec::new();
    }

    let mut breakdown: Vec<TypeBreakdown> = counts
        .into_iter()
        .map(|(kind, count)| TypeBreakdown {
            kind,
            count,
            percentage: count as f64 / total as f64 * 100.0,
        })
        .collect();
    breakdown.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.kind.to_string().cmp(&b.kind.to_string()))
    });
    breakdown.truncate(top);
    breakdown
}

/// Total volume across a slice of workouts, counting completed sessions only.
pub fn total_volume(workouts: &[Workout]) -> f64 {
    workouts
        .iter()
        .filter(|w| w.is_complete())
        .map(Workout::total_volume)
        .sum()
}
