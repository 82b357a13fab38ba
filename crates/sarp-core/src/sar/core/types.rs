#![allow(dead_code)]
#![allow(non_snake_case)]

use chrono::{NaiveDateTime, NaiveTime};
use polars::prelude::*;

/// The canonical long table produced once per source file: one row per data line,
/// tagged with its section identity and the resolved sample datetime.
pub type CanonicalDataFrame = DataFrame;

/// A per-header wide table: `date`, optional `sub_device`, N float metric columns.
pub type MetricDataFrame = DataFrame;

/// Descriptive statistics per metric column.
pub type StatisticsDataFrame = DataFrame;

#[derive(Debug)]
pub struct CanonicalFrameColumns<'a> {
    pub HEADER: &'a str,
    pub DATA: &'a str,
    pub DATE: &'a str,
    pub OS_DETAILS: &'a str,
    pub RESTART: &'a str,
    pub COLUMNS: [&'a str; 5],
}

impl CanonicalFrameColumns<'static> {
    pub const fn new() -> Self {
        let HEADER = "header";
        let DATA = "data";
        let DATE = "date";
        let OS_DETAILS = "os_details";
        let RESTART = "restart";
        let COLUMNS = [HEADER, DATA, DATE, OS_DETAILS, RESTART];
        Self {
            HEADER,
            DATA,
            DATE,
            OS_DETAILS,
            RESTART,
            COLUMNS,
        }
    }
}

impl Default for CanonicalFrameColumns<'static> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricFrameColumns<'a> {
    pub DATE: &'a str,
    pub SUB_DEVICE: &'a str,
    pub DEVICE: &'a str,
}

impl MetricFrameColumns<'static> {
    pub const fn new() -> Self {
        let DATE = "date";
        let SUB_DEVICE = "sub_device";
        let DEVICE = "device";
        Self {
            DATE,
            SUB_DEVICE,
            DEVICE,
        }
    }
}

impl Default for MetricFrameColumns<'static> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct StatisticsFrameColumns<'a> {
    pub METRIC: &'a str,
    pub MIN: &'a str,
    pub MAX: &'a str,
    pub MEAN: &'a str,
    pub Q25: &'a str,
    pub MEDIAN: &'a str,
    pub Q75: &'a str,
    pub COLUMNS: [&'a str; 7],
}

impl StatisticsFrameColumns<'static> {
    pub const fn new() -> Self {
        let METRIC = "metric";
        let MIN = "min";
        let MAX = "max";
        let MEAN = "mean";
        let Q25 = "25%";
        let MEDIAN = "50%";
        let Q75 = "75%";
        let COLUMNS = [METRIC, MIN, MAX, MEAN, Q25, MEDIAN, Q75];
        Self {
            METRIC,
            MIN,
            MAX,
            MEAN,
            Q25,
            MEDIAN,
            Q75,
            COLUMNS,
        }
    }
}

impl Default for StatisticsFrameColumns<'static> {
    fn default() -> Self {
        Self::new()
    }
}

/// Schema descriptor for one section, computed once by the header normalizer.
/// The single source of truth for metric token order: the decomposer indexes
/// per-row value lists by position in `metrics` and never re-splits the header.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionSchema {
    /// normalized header string, the section's stable identity
    pub header: String,
    /// metric names in column order
    pub metrics: Vec<String>,
    /// first data token is a per-row device/interface identifier
    pub has_sub_device: bool,
    /// trailing identifier was moved behind the timestamp (fchost/filesystem layout)
    pub reordered: bool,
}

impl SectionSchema {
    pub fn new(header: String, has_sub_device: bool, reordered: bool) -> Self {
        let metrics = header.split_whitespace().map(str::to_owned).collect();
        Self {
            header,
            metrics,
            has_sub_device,
            reordered,
        }
    }

    /// Position of `metric` in the per-row value list, or None if the metric
    /// does not belong to this section.
    pub fn metric_index(&self, metric: &str) -> Option<usize> {
        self.metrics.iter().position(|m| m == metric)
    }
}

/// One reboot occurrence, resolved against the file's anchor date.
/// Ephemeral: recomputed per render from the raw marker strings.
#[derive(Debug, Clone, PartialEq)]
pub struct RestartEvent {
    pub time_of_day: NaiveTime,
    pub datetime: NaiveDateTime,
    /// seconds added to dodge a collision with a real sample instant
    pub adjusted_by: i64,
}
