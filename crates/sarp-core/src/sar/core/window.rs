#![allow(non_upper_case_globals)]

use chrono::NaiveDateTime;
use polars::prelude::*;
use std::collections::HashSet;
use tdigest::TDigest;

use crate::sar::core::types::{
    MetricDataFrame, MetricFrameColumns, RestartEvent, StatisticsDataFrame,
    StatisticsFrameColumns,
};

static mfc: MetricFrameColumns = MetricFrameColumns::new();
static sfc: StatisticsFrameColumns = StatisticsFrameColumns::new();

/// An inclusive time range over a metric table. Built from picker-style
/// times-of-day, so the calendar date is reconciled against the table before
/// slicing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Replace the window's calendar date with the date of the table's first
    /// row, keeping the requested times-of-day. A picker hands over wall-clock
    /// times on an arbitrary date; the table knows which day the samples are
    /// actually on. An empty table leaves the window untouched.
    pub fn reconcile(self, df: &MetricDataFrame) -> PolarsResult<Self> {
        let Some(first) = df.column(mfc.DATE)?.datetime()?.get(0) else {
            return Ok(self);
        };
        let date = chrono::DateTime::from_timestamp_nanos(first)
            .naive_utc()
            .date();
        Ok(Self {
            start: NaiveDateTime::new(date, self.start.time()),
            end: NaiveDateTime::new(date, self.end.time()),
        })
    }
}

/// Slice a date-sorted metric table down to the rows inside the window,
/// inclusive on both ends. Rows with a null stamp never match.
pub fn slice_window(df: &MetricDataFrame, window: &TimeWindow) -> PolarsResult<MetricDataFrame> {
    let start = window.start.and_utc().timestamp_nanos_opt().unwrap_or(i64::MIN);
    let end = window.end.and_utc().timestamp_nanos_opt().unwrap_or(i64::MAX);

    let dates = df.column(mfc.DATE)?.datetime()?;
    let mut first: Option<usize> = None;
    let mut last: Option<usize> = None;
    for (i, stamp) in dates.into_iter().enumerate() {
        let Some(stamp) = stamp else { continue };
        if stamp >= start && stamp <= end {
            if first.is_none() {
                first = Some(i);
            }
            last = Some(i);
        }
    }
    match (first, last) {
        (Some(first), Some(last)) => Ok(df.slice(first as i64, last - first + 1)),
        _ => Ok(df.slice(0, 0)),
    }
}

/// Descriptive statistics for every Float32 column of a metric table: min,
/// max, mean, and the quartiles via a t-digest sketch. Nulls are skipped.
/// Feed this the table before restart insertion; synthetic zero rows would
/// drag every minimum to 0.
pub fn describe(df: &MetricDataFrame) -> PolarsResult<StatisticsDataFrame> {
    let mut metrics: Vec<String> = vec![];
    let mut mins: Vec<Option<f64>> = vec![];
    let mut maxes: Vec<Option<f64>> = vec![];
    let mut means: Vec<Option<f64>> = vec![];
    let mut q25s: Vec<Option<f64>> = vec![];
    let mut medians: Vec<Option<f64>> = vec![];
    let mut q75s: Vec<Option<f64>> = vec![];

    for column in df.get_columns() {
        if column.dtype() != &DataType::Float32 {
            continue;
        }
        let ca = column.f32()?;
        metrics.push(column.name().to_owned());
        mins.push(ca.min().map(f64::from));
        maxes.push(ca.max().map(f64::from));
        means.push(ca.mean());

        let values: Vec<f64> = ca.into_iter().flatten().map(f64::from).collect();
        if values.is_empty() {
            q25s.push(None);
            medians.push(None);
            q75s.push(None);
        } else {
            let digest = TDigest::new_with_size(100).merge_unsorted(values);
            q25s.push(Some(digest.estimate_quantile(0.25)));
            medians.push(Some(digest.estimate_quantile(0.5)));
            q75s.push(Some(digest.estimate_quantile(0.75)));
        }
    }

    DataFrame::new(vec![
        Series::new(sfc.METRIC, metrics),
        Series::new(sfc.MIN, mins),
        Series::new(sfc.MAX, maxes),
        Series::new(sfc.MEAN, means),
        Series::new(sfc.Q25, q25s),
        Series::new(sfc.MEDIAN, medians),
        Series::new(sfc.Q75, q75s),
    ])
}

/// Statistics over a restart-augmented table: rows stamped by one of the
/// inserted events are masked out first, so the synthetic zeros never shift a
/// mean or drag a minimum down.
pub fn describe_excluding(
    df: &MetricDataFrame,
    inserted: &[RestartEvent],
) -> PolarsResult<StatisticsDataFrame> {
    if inserted.is_empty() {
        return describe(df);
    }
    let synthetic: HashSet<i64> = inserted
        .iter()
        .filter_map(|e| e.datetime.and_utc().timestamp_nanos_opt())
        .collect();
    let mask: BooleanChunked = df
        .column(mfc.DATE)?
        .datetime()?
        .into_iter()
        .map(|stamp| Some(stamp.map(|s| !synthetic.contains(&s)).unwrap_or(true)))
        .collect();
    describe(&df.filter(&mask)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sar::core::assembler::parse_str;
    use crate::sar::core::decomposer::metric_table;
    use crate::sar::core::restart::{insert_restarts, resolve_events, restart_markers};
    use chrono::NaiveDate;

    static SAMPLE: &str = "\
Linux 5.14.21 (server1) \t2024-03-15 \t_x86_64_\t(8 CPU)

14:00:00 tps rtps wtps
14:00:00 1.0 0.5 0.5
14:10:00 2.0 1.0 1.0
14:20:00 3.0 1.5 1.5
14:30:00 4.0 2.0 2.0
";

    fn table() -> MetricDataFrame {
        let parsed = parse_str(SAMPLE).unwrap();
        let schema = parsed.schema_for("tps rtps wtps").unwrap();
        metric_table(&parsed.frame, schema).unwrap()
    }

    fn at(month: u32, day: u32, time: (u32, u32, u32)) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, month, day)
            .unwrap()
            .and_hms_opt(time.0, time.1, time.2)
            .unwrap()
    }

    #[test]
    fn window_is_inclusive_on_both_ends() {
        let mt = table();
        let window = TimeWindow::new(at(3, 15, (14, 10, 0)), at(3, 15, (14, 20, 0)));
        let sliced = slice_window(&mt, &window).unwrap();
        assert_eq!(sliced.height(), 2);
        assert_eq!(sliced.column("tps").unwrap().f32().unwrap().get(0), Some(2.0));
    }

    #[test]
    fn reconcile_adopts_the_table_date() {
        let mt = table();
        // picker date is a stand-in, times are what the user chose
        let window = TimeWindow::new(at(1, 1, (14, 10, 0)), at(1, 1, (14, 30, 0)));
        let window = window.reconcile(&mt).unwrap();
        assert_eq!(window.start.date(), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        let sliced = slice_window(&mt, &window).unwrap();
        assert_eq!(sliced.height(), 3);
    }

    #[test]
    fn empty_window_yields_empty_slice() {
        let mt = table();
        let window = TimeWindow::new(at(3, 15, (20, 0, 0)), at(3, 15, (21, 0, 0)));
        let sliced = slice_window(&mt, &window).unwrap();
        assert_eq!(sliced.height(), 0);
        assert_eq!(sliced.width(), mt.width());
    }

    #[test]
    fn describe_covers_every_metric_column() {
        let stats = describe(&table()).unwrap();
        assert_eq!(stats.height(), 3);
        let min = stats.column("min").unwrap().f64().unwrap();
        let max = stats.column("max").unwrap().f64().unwrap();
        let mean = stats.column("mean").unwrap().f64().unwrap();
        assert_eq!(min.get(0), Some(1.0));
        assert_eq!(max.get(0), Some(4.0));
        assert_eq!(mean.get(0), Some(2.5));
        let median = stats.column("50%").unwrap().f64().unwrap();
        let m = median.get(0).unwrap();
        assert!(m >= 2.0 && m <= 3.0);
    }

    #[test]
    fn statistics_ignore_synthetic_restart_rows() {
        let text = format!("{SAMPLE}\n14:05:00 LINUX RESTART\t(8 CPU)\n");
        let parsed = parse_str(&text).unwrap();
        let schema = parsed.schema_for("tps rtps wtps").unwrap();
        let mt = metric_table(&parsed.frame, schema).unwrap();
        let markers = restart_markers(&parsed.frame).unwrap();
        let events = resolve_events(&markers, &parsed.banner);
        let (with_restarts, inserted) = insert_restarts(&mt, &events).unwrap();
        assert_eq!(with_restarts.height(), mt.height() + 1);

        let augmented = describe_excluding(&with_restarts, &inserted).unwrap();
        let plain = describe(&mt).unwrap();
        assert!(augmented.equals_missing(&plain));
        let min = augmented.column("min").unwrap().f64().unwrap();
        assert_eq!(min.get(0), Some(1.0));
    }

    #[test]
    fn describe_on_empty_table_is_all_null() {
        let mt = table().slice(0, 0);
        let stats = describe(&mt).unwrap();
        assert_eq!(stats.height(), 3);
        assert_eq!(stats.column("min").unwrap().f64().unwrap().get(0), None);
        assert_eq!(stats.column("50%").unwrap().f64().unwrap().get(0), None);
    }
}
