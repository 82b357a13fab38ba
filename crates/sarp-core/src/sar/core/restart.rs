#![allow(non_upper_case_globals)]

use chrono::{NaiveDateTime, NaiveTime};
use polars::prelude::*;
use std::collections::HashSet;

use crate::sar::core::types::{
    CanonicalDataFrame, CanonicalFrameColumns, MetricDataFrame, MetricFrameColumns, RestartEvent,
};
use crate::sar::parsers::banner::OsBanner;

static cfc: CanonicalFrameColumns = CanonicalFrameColumns::new();
static mfc: MetricFrameColumns = MetricFrameColumns::new();

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// The raw `LINUX RESTART` marker strings carried by the canonical table.
/// A table without a restart column simply had no restarts.
pub fn restart_markers(df: &CanonicalDataFrame) -> PolarsResult<Vec<String>> {
    if !df.get_column_names().contains(&cfc.RESTART) {
        return Ok(vec![]);
    }
    Ok(df
        .column(cfc.RESTART)?
        .str()?
        .into_iter()
        .flatten()
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Resolve marker strings into dated events. The time-of-day is the last
/// whitespace token of each marker; a marker whose last token does not parse
/// is dropped rather than failing the batch.
pub fn resolve_events(markers: &[String], banner: &OsBanner) -> Vec<RestartEvent> {
    markers
        .iter()
        .filter_map(|marker| {
            let token = marker.split_whitespace().last()?;
            let time = NaiveTime::parse_from_str(token, "%H:%M:%S").ok()?;
            Some(RestartEvent {
                time_of_day: time,
                datetime: NaiveDateTime::new(banner.anchor_date, time),
                adjusted_by: 0,
            })
        })
        .collect()
}

/// Drop rows whose timestamp duplicates an earlier row, keeping the first
/// occurrence. Duplicate stamps would make the restart collision nudge loop
/// ambiguous, so this always runs before insertion. On a device-keyed table
/// every stamp legitimately repeats once per device, so the key there is
/// `(date, sub_device)` and per-device rows all survive.
pub fn dedup_by_date(df: &MetricDataFrame) -> PolarsResult<MetricDataFrame> {
    let dates = df.column(cfc.DATE)?.datetime()?;
    let mask: BooleanChunked = if df.get_column_names().contains(&mfc.SUB_DEVICE) {
        let devices = df.column(mfc.SUB_DEVICE)?.str()?;
        let mut seen: HashSet<(Option<i64>, Option<&str>)> =
            HashSet::with_capacity(df.height());
        dates
            .into_iter()
            .zip(devices)
            .map(|key| Some(seen.insert(key)))
            .collect()
    } else {
        let mut seen: HashSet<Option<i64>> = HashSet::with_capacity(df.height());
        dates.into_iter().map(|d| Some(seen.insert(d))).collect()
    };
    df.filter(&mask)
}

/// Insert one synthetic all-zero row per restart event into a decomposed
/// metric table, so a rendered series visibly drops to zero at each reboot.
///
/// Rows never replace real samples: an event whose stamp collides with an
/// existing row (or an earlier event) is nudged forward in whole seconds until
/// the stamp is unique, and the nudge is recorded on the returned event. All
/// synthetic rows are appended as one batch followed by a single sort.
pub fn insert_restarts(
    df: &MetricDataFrame,
    events: &[RestartEvent],
) -> PolarsResult<(MetricDataFrame, Vec<RestartEvent>)> {
    let deduped = dedup_by_date(df)?;
    if events.is_empty() {
        return Ok((deduped, vec![]));
    }

    let mut taken: HashSet<i64> = deduped
        .column(cfc.DATE)?
        .datetime()?
        .into_iter()
        .flatten()
        .collect();

    let mut inserted: Vec<RestartEvent> = Vec::with_capacity(events.len());
    let mut stamps: Vec<i64> = Vec::with_capacity(events.len());
    for event in events {
        let Some(base) = event.datetime.and_utc().timestamp_nanos_opt() else {
            continue;
        };
        let mut nanos = base;
        while taken.contains(&nanos) {
            nanos += NANOS_PER_SECOND;
        }
        taken.insert(nanos);
        stamps.push(nanos);
        inserted.push(RestartEvent {
            time_of_day: event.time_of_day,
            datetime: chrono::DateTime::from_timestamp_nanos(nanos).naive_utc(),
            adjusted_by: (nanos - base) / NANOS_PER_SECOND,
        });
    }

    let height = stamps.len();
    let mut columns: Vec<Series> = Vec::with_capacity(deduped.width());
    for column in deduped.get_columns() {
        let series = match column.dtype() {
            DataType::Datetime(_, _) => Series::new(cfc.DATE, stamps.clone())
                .cast(&DataType::Datetime(TimeUnit::Nanoseconds, None))?,
            DataType::Float32 => Series::new(column.name(), vec![0.0f32; height]),
            dtype => Series::full_null(column.name(), height, dtype),
        };
        columns.push(series);
    }
    let zero_rows = DataFrame::new(columns)?;

    let mut combined = deduped.vstack(&zero_rows)?;
    combined.as_single_chunk_par();
    let sorted = combined.sort([cfc.DATE], SortMultipleOptions::default())?;
    Ok((sorted, inserted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sar::core::assembler::parse_str;
    use crate::sar::core::decomposer::metric_table;
    use chrono::NaiveDate;

    static SAMPLE: &str = "\
Linux 5.14.21 (server1) \t2024-03-15 \t_x86_64_\t(8 CPU)

14:23:45 tps rtps wtps
14:23:45 3.1 1.0 2.1
14:33:45 4.0 2.0 2.0

14:28:00 LINUX RESTART\t(8 CPU)
";

    fn decomposed(text: &str) -> (MetricDataFrame, Vec<RestartEvent>) {
        let table = parse_str(text).unwrap();
        let schema = table.schema_for("tps rtps wtps").unwrap();
        let mt = metric_table(&table.frame, schema).unwrap();
        let markers = restart_markers(&table.frame).unwrap();
        let events = resolve_events(&markers, &table.banner);
        (mt, events)
    }

    fn stamps(df: &MetricDataFrame) -> Vec<i64> {
        df.column("date")
            .unwrap()
            .datetime()
            .unwrap()
            .into_iter()
            .flatten()
            .collect()
    }

    #[test]
    fn markers_resolve_against_the_anchor_date() {
        let (_, events) = decomposed(SAMPLE);
        assert_eq!(events.len(), 1);
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(14, 28, 0)
            .unwrap();
        assert_eq!(events[0].datetime, expected);
    }

    #[test]
    fn insertion_is_additive_and_sorted() {
        let (mt, events) = decomposed(SAMPLE);
        let (out, inserted) = insert_restarts(&mt, &events).unwrap();
        assert_eq!(out.height(), mt.height() + 1);
        assert_eq!(inserted.len(), 1);
        let s = stamps(&out);
        assert!(s.windows(2).all(|w| w[0] < w[1]));
        // the synthetic row is all zeros
        assert_eq!(out.column("tps").unwrap().f32().unwrap().get(1), Some(0.0));
        assert_eq!(out.column("rtps").unwrap().f32().unwrap().get(1), Some(0.0));
    }

    #[test]
    fn colliding_event_is_nudged_forward() {
        let text = "\
Linux 5.14.21 (server1) \t2024-03-15 \t_x86_64_\t(8 CPU)

14:23:45 tps rtps wtps
14:23:45 3.1 1.0 2.1

14:23:45 LINUX RESTART\t(8 CPU)
";
        let (mt, events) = decomposed(text);
        let (out, inserted) = insert_restarts(&mt, &events).unwrap();
        assert_eq!(inserted[0].adjusted_by, 1);
        let s = stamps(&out);
        assert_eq!(s[1] - s[0], NANOS_PER_SECOND);
        // the real sample is untouched
        assert_eq!(out.column("tps").unwrap().f32().unwrap().get(0), Some(3.1));
    }

    #[test]
    fn two_events_at_the_same_second_stay_unique() {
        let (mt, mut events) = decomposed(SAMPLE);
        events.push(events[0].clone());
        let (out, inserted) = insert_restarts(&mt, &events).unwrap();
        assert_eq!(inserted.len(), 2);
        assert_eq!(inserted[1].adjusted_by, 1);
        let s = stamps(&out);
        let unique: HashSet<i64> = s.iter().copied().collect();
        assert_eq!(unique.len(), out.height());
    }

    static MULTI_DEVICE: &str = "\
Linux 5.14.21 (server1) \t2024-03-15 \t_x86_64_\t(8 CPU)

14:23:45 CPU %usr %nice %system
14:23:45 all 10.2 0.0 5.1
14:23:45 0 11.0 0.1 4.9
14:33:45 all 12.4 0.2 6.0
14:33:45 0 13.0 0.2 5.8
";

    fn decomposed_cpu(text: &str) -> (MetricDataFrame, Vec<RestartEvent>) {
        let table = parse_str(text).unwrap();
        let schema = table.schema_for("%usr %nice %system").unwrap();
        let mt = metric_table(&table.frame, schema).unwrap();
        let markers = restart_markers(&table.frame).unwrap();
        let events = resolve_events(&markers, &table.banner);
        (mt, events)
    }

    #[test]
    fn per_device_rows_survive_insertion() {
        let (mt, events) = decomposed_cpu(MULTI_DEVICE);
        assert!(events.is_empty());
        let (out, inserted) = insert_restarts(&mt, &events).unwrap();
        assert!(inserted.is_empty());
        // each timestamp keeps one row per device
        assert_eq!(out.height(), 4);
        assert!(out.equals_missing(&mt));
    }

    #[test]
    fn per_device_rows_survive_a_real_event() {
        let text = format!("{MULTI_DEVICE}\n14:28:00 LINUX RESTART\t(8 CPU)\n");
        let (mt, events) = decomposed_cpu(&text);
        assert_eq!(events.len(), 1);
        let (out, inserted) = insert_restarts(&mt, &events).unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(out.height(), mt.height() + 1);
        let devices = out.column("sub_device").unwrap().str().unwrap();
        let named = devices.into_iter().flatten().count();
        assert_eq!(named, 4);
    }

    #[test]
    fn no_events_is_the_identity() {
        let (mt, _) = decomposed(SAMPLE);
        let (out, inserted) = insert_restarts(&mt, &[]).unwrap();
        assert!(inserted.is_empty());
        assert!(out.equals(&mt));
    }

    #[test]
    fn duplicate_stamps_keep_first_occurrence() {
        let text = "\
Linux 5.14.21 (server1) \t2024-03-15 \t_x86_64_\t(8 CPU)

14:23:45 tps rtps wtps
14:23:45 3.1 1.0 2.1
14:23:45 9.9 9.9 9.9
";
        let (mt, _) = decomposed(text);
        let deduped = dedup_by_date(&mt).unwrap();
        assert_eq!(deduped.height(), 1);
        assert_eq!(
            deduped.column("tps").unwrap().f32().unwrap().get(0),
            Some(3.1)
        );
    }
}
