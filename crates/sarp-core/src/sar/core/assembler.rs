#![allow(non_upper_case_globals)]

use chrono::{NaiveDateTime, NaiveTime};
use lazy_static::lazy_static;
use polars::prelude::*;
use regex::Regex;

use crate::sar::core::types::{CanonicalDataFrame, CanonicalFrameColumns, SectionSchema};
use crate::sar::parsers::banner::OsBanner;
use crate::sar::parsers::classifier::{classify, Classified};
use crate::sar::parsers::scanner;

static cfc: CanonicalFrameColumns = CanonicalFrameColumns::new();

lazy_static! {
    static ref AMPM_DATA_RE: Regex = Regex::new(r"(?i) AM | PM ").unwrap();
    static ref COMMA_RE: Regex = Regex::new(r"(\d+),(\d+)").unwrap();
    static ref TIME_PREFIX_RE: Regex = Regex::new(r"^(\d{2}:\d{2}:\d{2})\s*").unwrap();
    static ref TIME_AMPM_PREFIX_RE: Regex =
        Regex::new(r"^(\d{2}:\d{2}:\d{2})\s+(AM|PM)\s*").unwrap();
}

/// Sections whose headers survive classification but carry no stable numeric
/// columns. Filtered out of the canonical table.
const UNWANTED_HEADERS: [&str; 2] = ["MHz", "INTR intr/s"];

/// Timestamp format of the whole file, detected once from the first data row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockFormat {
    H24,
    AmPm,
}

/// A fully parsed sar file: the canonical long table plus the per-section
/// schema descriptors and the OS banner it was resolved against.
#[derive(Debug)]
pub struct SarTable {
    pub frame: CanonicalDataFrame,
    pub schemas: Vec<SectionSchema>,
    pub banner: OsBanner,
    pub clock_format: ClockFormat,
    /// every raw `LINUX RESTART` marker, regardless of how many fit into the
    /// canonical table's sparse restart column
    pub restarts: Vec<String>,
}

impl SarTable {
    pub fn schema_for(&self, header: &str) -> Option<&SectionSchema> {
        self.schemas.iter().find(|s| s.header == header)
    }
}

/// Parse a sar ASCII dump into its canonical table. A file with no
/// time-series sections yields an empty table, not an error.
pub fn parse_str(content: &str) -> PolarsResult<SarTable> {
    let banner = match scanner::find_banner(content.as_bytes()) {
        Some(line) => OsBanner::parse(&line),
        None => OsBanner::missing(),
    };
    let classified = classify(content);

    let sample = classified
        .sections
        .first()
        .and_then(|s| s.data_lines.first())
        .cloned()
        .unwrap_or_default();
    let clock_format = if AMPM_DATA_RE.is_match(&sample) {
        ClockFormat::AmPm
    } else {
        ClockFormat::H24
    };
    let comma_decimal = COMMA_RE.is_match(&sample);

    let schemas: Vec<SectionSchema> = classified
        .sections
        .iter()
        .map(|s| s.schema.clone())
        .collect();
    let restarts = classified.restarts.clone();

    let mut frame = assemble(classified, &banner, comma_decimal)?;
    frame = filter_unwanted_headers(frame)?;
    frame = reset_dates(frame, &banner, clock_format)?;

    Ok(SarTable {
        frame,
        schemas,
        banner,
        clock_format,
        restarts,
    })
}

/// Concatenate all sections into the long (header, data) table and stamp the
/// sparse `os_details` and `restart` columns. Restart markers are front-loaded
/// in emission order; consumers re-derive their chronological position from
/// the embedded time token, not from row position. The column can only hold
/// as many markers as the table has rows; `SarTable::restarts` keeps the full
/// list for the degenerate files where that cap bites.
fn assemble(
    classified: Classified,
    banner: &OsBanner,
    comma_decimal: bool,
) -> PolarsResult<CanonicalDataFrame> {
    let mut headers: Vec<String> = vec![];
    let mut data: Vec<String> = vec![];
    for section in classified.sections {
        for line in section.data_lines {
            headers.push(section.schema.header.clone());
            if comma_decimal {
                data.push(line.replace(',', "."));
            } else {
                data.push(line);
            }
        }
    }
    let height = data.len();

    let mut os_details: Vec<&str> = vec![""; height];
    if height > 0 {
        os_details[0] = banner.raw.as_str();
    }

    let mut columns = vec![
        Series::new(cfc.HEADER, headers),
        Series::new(cfc.DATA, data),
        Series::new(cfc.OS_DETAILS, os_details),
    ];

    if !classified.restarts.is_empty() && height > 0 {
        let mut restart: Vec<&str> = vec![""; height];
        for (slot, marker) in restart.iter_mut().zip(classified.restarts.iter()) {
            *slot = marker.as_str();
        }
        columns.push(Series::new(cfc.RESTART, restart));
    }

    DataFrame::new(columns)
}

fn filter_unwanted_headers(df: CanonicalDataFrame) -> PolarsResult<CanonicalDataFrame> {
    let mask: BooleanChunked = df
        .column(cfc.HEADER)?
        .str()?
        .into_iter()
        .map(|h| Some(h.map(|h| !UNWANTED_HEADERS.contains(&h)).unwrap_or(true)))
        .collect();
    df.filter(&mask)
}

/// One-time date resolution pass: rewrite each row's bare time-of-day into a
/// full datetime anchored on the banner date, and strip the consumed time
/// token (plus the AM/PM marker for 12-hour files) from the residual data.
/// Idempotent: a table that already carries a `date` column is returned as-is.
pub fn reset_dates(
    mut df: CanonicalDataFrame,
    banner: &OsBanner,
    clock_format: ClockFormat,
) -> PolarsResult<CanonicalDataFrame> {
    if df.get_column_names().contains(&cfc.DATE) {
        return Ok(df);
    }

    let height = df.height();
    let mut stamps: Vec<Option<i64>> = Vec::with_capacity(height);
    let mut residual: Vec<String> = Vec::with_capacity(height);

    for value in df.column(cfc.DATA)?.str()?.into_iter() {
        let Some(value) = value else {
            stamps.push(None);
            residual.push(String::new());
            continue;
        };
        let (time, rest) = match clock_format {
            ClockFormat::AmPm => match TIME_AMPM_PREFIX_RE.captures(value) {
                Some(c) => {
                    let token = format!("{} {}", &c[1], &c[2]);
                    let time = NaiveTime::parse_from_str(&token, "%I:%M:%S %p").ok();
                    (time, &value[c.get(0).unwrap().end()..])
                }
                None => (None, value),
            },
            ClockFormat::H24 => match TIME_PREFIX_RE.captures(value) {
                Some(c) => {
                    let time = NaiveTime::parse_from_str(&c[1], "%H:%M:%S").ok();
                    (time, &value[c.get(0).unwrap().end()..])
                }
                None => (None, value),
            },
        };
        stamps.push(time.and_then(|t| {
            NaiveDateTime::new(banner.anchor_date, t)
                .and_utc()
                .timestamp_nanos_opt()
        }));
        residual.push(rest.split_whitespace().collect::<Vec<&str>>().join(" "));
    }

    let date = Series::new(cfc.DATE, stamps)
        .cast(&DataType::Datetime(TimeUnit::Nanoseconds, None))?;
    df.with_column(Series::new(cfc.DATA, residual))?;
    df.with_column(date)?;
    Ok(df)
}

/// Unique section headers in emission order.
pub fn headers(df: &CanonicalDataFrame) -> PolarsResult<Vec<String>> {
    let mut seen: Vec<String> = vec![];
    for header in df.column(cfc.HEADER)?.str()?.into_iter().flatten() {
        if !seen.iter().any(|s| s == header) {
            seen.push(header.to_owned());
        }
    }
    Ok(seen)
}

/// The OS details banner recovered from the canonical table.
pub fn os_details(df: &CanonicalDataFrame) -> PolarsResult<Option<String>> {
    Ok(df
        .column(cfc.OS_DETAILS)?
        .str()?
        .into_iter()
        .flatten()
        .find(|s| s.contains("Linux"))
        .map(str::to_owned))
}
