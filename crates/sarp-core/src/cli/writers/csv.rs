#![allow(non_upper_case_globals)]

use polars::prelude::*;
use std::fs::File;
use std::path::Path;

use crate::sar::core::types::MetricFrameColumns;

static mfc: MetricFrameColumns = MetricFrameColumns::new();

/// CSV export for the tables this crate hands to callers. Tables that carry a
/// `date` column are written in chronological order regardless of how the
/// caller assembled them.
pub trait CsvWrite {
    fn write_csv(&self, path: &Path) -> PolarsResult<()>;
}

impl CsvWrite for DataFrame {
    fn write_csv(&self, path: &Path) -> PolarsResult<()> {
        let mut out = if self.get_column_names().contains(&mfc.DATE) {
            self.sort([mfc.DATE], SortMultipleOptions::default())?
        } else {
            self.clone()
        };
        let file = File::create(path)?;
        CsvWriter::new(file).include_header(true).finish(&mut out)
    }
}
