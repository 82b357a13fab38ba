#![allow(non_upper_case_globals)]

use polars::prelude::*;
use rayon::prelude::*;

use crate::sar::core::types::{
    CanonicalDataFrame, CanonicalFrameColumns, MetricDataFrame, MetricFrameColumns, SectionSchema,
};

static cfc: CanonicalFrameColumns = CanonicalFrameColumns::new();
static mfc: MetricFrameColumns = MetricFrameColumns::new();

/// Canonical rows belonging to one section, reduced to `date` + `data`.
pub fn rows_for_header(df: &CanonicalDataFrame, header: &str) -> PolarsResult<DataFrame> {
    let mask: BooleanChunked = df
        .column(cfc.HEADER)?
        .str()?
        .into_iter()
        .map(|h| Some(h == Some(header)))
        .collect();
    df.filter(&mask)?.select([cfc.DATE, cfc.DATA])
}

/// Decompose one section into its wide metric table: `date`, an optional
/// `sub_device` column, and one Float32 column per header token.
///
/// The positional contract: metric column j is always token j of every row's
/// value list (after the sub-device pop). A token that fails the numeric cast
/// becomes null at its position; the rest of the row is kept.
pub fn metric_table(
    df: &CanonicalDataFrame,
    schema: &SectionSchema,
) -> PolarsResult<MetricDataFrame> {
    let rows = rows_for_header(df, &schema.header)?;
    let date = rows.column(cfc.DATE)?.clone();

    let width = schema.metrics.len();
    let mut sub_devices: Vec<Option<String>> = vec![];
    let mut values: Vec<Vec<Option<f32>>> = vec![Vec::with_capacity(rows.height()); width];

    for row in rows.column(cfc.DATA)?.str()?.into_iter() {
        let tokens: Vec<&str> = row.unwrap_or_default().split_whitespace().collect();
        let offset = if schema.has_sub_device {
            sub_devices.push(tokens.first().map(|t| (*t).to_owned()));
            1
        } else {
            0
        };
        for (j, column) in values.iter_mut().enumerate() {
            column.push(tokens.get(offset + j).and_then(|t| t.parse::<f32>().ok()));
        }
    }

    let mut columns = vec![date];
    if schema.has_sub_device {
        columns.push(Series::new(mfc.SUB_DEVICE, sub_devices));
    }
    for (name, column) in schema.metrics.iter().zip(values) {
        columns.push(Series::new(name.as_str(), column));
    }
    DataFrame::new(columns)
}

/// Materialize a single named metric: `date`, optional `device`, one value
/// column. A metric absent from the section's schema is a caller error.
pub fn single_metric_table(
    df: &CanonicalDataFrame,
    schema: &SectionSchema,
    metric: &str,
) -> PolarsResult<MetricDataFrame> {
    if schema.metric_index(metric).is_none() {
        return Err(PolarsError::ComputeError(
            format!(
                "metric '{}' is not part of section '{}'",
                metric, schema.header
            )
            .into(),
        ));
    }
    let mut table = metric_table(df, schema)?;
    if schema.has_sub_device {
        table = table.select([cfc.DATE, mfc.SUB_DEVICE, metric])?;
        table.rename(mfc.SUB_DEVICE, mfc.DEVICE)?;
    } else {
        table = table.select([cfc.DATE, metric])?;
    }
    Ok(table)
}

/// Distinct sub-device identifiers of a decomposed table, in row order.
pub fn sub_devices(df: &MetricDataFrame) -> PolarsResult<Vec<String>> {
    if !df.get_column_names().contains(&mfc.SUB_DEVICE) {
        return Ok(vec![]);
    }
    let mut seen: Vec<String> = vec![];
    for device in df.column(mfc.SUB_DEVICE)?.str()?.into_iter().flatten() {
        if !seen.iter().any(|s| s == device) {
            seen.push(device.to_owned());
        }
    }
    Ok(seen)
}

/// Filter a decomposed table to one sub-device. Exact match first; when
/// nothing matches exactly, fall back to substring containment so slightly
/// decorated identifiers (e.g. `dev8-0`) are still reachable.
pub fn filter_sub_device(df: &MetricDataFrame, device: &str) -> PolarsResult<MetricDataFrame> {
    let ca = df.column(mfc.SUB_DEVICE)?.str()?;
    let exact: BooleanChunked = ca
        .into_iter()
        .map(|d| Some(d == Some(device)))
        .collect();
    if exact.sum().unwrap_or(0) > 0 {
        return df.filter(&exact);
    }
    let partial: BooleanChunked = ca
        .into_iter()
        .map(|d| Some(d.map(|d| d.contains(device)).unwrap_or(false)))
        .collect();
    df.filter(&partial)
}

/// Decompose many sections concurrently. Each worker reads the shared
/// immutable canonical table and writes only its own fresh table, so this
/// fans out without locking; the pool size bounds a "select all" request.
pub fn decompose_many(
    df: &CanonicalDataFrame,
    schemas: &[SectionSchema],
) -> Vec<(String, PolarsResult<MetricDataFrame>)> {
    schemas
        .par_iter()
        .map(|schema| (schema.header.clone(), metric_table(df, schema)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sar::core::assembler::parse_str;

    static SAMPLE: &str = "\
Linux 5.14.21 (server1) \t2024-03-15 \t_x86_64_\t(8 CPU)

14:23:45 CPU %usr %nice %system
14:23:45 all 10.2 0.0 5.1
14:23:45 0 11.0 0.1 4.9
14:33:45 all 12.4 bad 6.0
14:33:45 0 13.0 0.2 5.8

14:23:45 tps rtps wtps
14:33:45 3.1 1.0 2.1
";

    fn f32_at(df: &DataFrame, col: &str, row: usize) -> Option<f32> {
        df.column(col).unwrap().f32().unwrap().get(row)
    }

    #[test]
    fn positional_contract_with_sub_device() {
        let table = parse_str(SAMPLE).unwrap();
        let schema = table.schema_for("%usr %nice %system").unwrap();
        let mt = metric_table(&table.frame, schema).unwrap();
        assert_eq!(mt.height(), 4);
        // %nice is always position 1 of the value list
        assert_eq!(f32_at(&mt, "%nice", 0), Some(0.0));
        assert_eq!(f32_at(&mt, "%nice", 1), Some(0.1));
        assert_eq!(f32_at(&mt, "%system", 0), Some(5.1));
    }

    #[test]
    fn positional_contract_without_sub_device() {
        let table = parse_str(SAMPLE).unwrap();
        let schema = table.schema_for("tps rtps wtps").unwrap();
        let mt = metric_table(&table.frame, schema).unwrap();
        assert!(!mt.get_column_names().contains(&"sub_device"));
        assert_eq!(f32_at(&mt, "rtps", 0), Some(1.0));
    }

    #[test]
    fn corrupt_token_becomes_null_without_dropping_the_row() {
        let table = parse_str(SAMPLE).unwrap();
        let schema = table.schema_for("%usr %nice %system").unwrap();
        let mt = metric_table(&table.frame, schema).unwrap();
        assert_eq!(f32_at(&mt, "%nice", 2), None);
        // neighbors keep their positions
        assert_eq!(f32_at(&mt, "%usr", 2), Some(12.4));
        assert_eq!(f32_at(&mt, "%system", 2), Some(6.0));
    }

    #[test]
    fn all_aggregate_is_a_filterable_value() {
        let table = parse_str(SAMPLE).unwrap();
        let schema = table.schema_for("%usr %nice %system").unwrap();
        let mt = metric_table(&table.frame, schema).unwrap();
        assert_eq!(sub_devices(&mt).unwrap(), vec!["all", "0"]);
        let all = filter_sub_device(&mt, "all").unwrap();
        assert_eq!(all.height(), 2);
        assert_eq!(f32_at(&all, "%usr", 1), Some(12.4));
    }

    #[test]
    fn unknown_metric_is_an_error() {
        let table = parse_str(SAMPLE).unwrap();
        let schema = table.schema_for("tps rtps wtps").unwrap();
        assert!(single_metric_table(&table.frame, schema, "%usr").is_err());
    }

    #[test]
    fn single_metric_renames_sub_device_to_device() {
        let table = parse_str(SAMPLE).unwrap();
        let schema = table.schema_for("%usr %nice %system").unwrap();
        let one = single_metric_table(&table.frame, schema, "%usr").unwrap();
        assert_eq!(one.get_column_names(), &["date", "device", "%usr"]);
    }

    #[test]
    fn header_without_rows_yields_empty_table() {
        let table = parse_str(SAMPLE).unwrap();
        let schema = SectionSchema::new("ghost metrics".to_owned(), false, false);
        let mt = metric_table(&table.frame, &schema).unwrap();
        assert_eq!(mt.height(), 0);
        assert_eq!(mt.width(), 3);
    }

    #[test]
    fn fan_out_decomposes_every_section() {
        let table = parse_str(SAMPLE).unwrap();
        let results = decompose_many(&table.frame, &table.schemas);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
    }
}
