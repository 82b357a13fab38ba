//! Persistence for parsed tables.
//!
//! A source text file is parsed once, persisted as parquet next to it, and
//! (by default) deleted; later loads go parquet-first. An optional blob cache
//! seam lets an out-of-process backend serve the same parquet bytes across
//! hosts. An in-process session cache keyed by path and mtime avoids
//! re-reading parquet within one run.

#![allow(non_upper_case_globals)]

use polars::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::sar::catalog::HeaderCatalog;
use crate::sar::core::assembler::{self, parse_str, ClockFormat, SarTable};
use crate::sar::core::restart;
use crate::sar::core::types::{CanonicalFrameColumns, SectionSchema};
use crate::sar::parsers::banner::OsBanner;

pub type Error = Box<dyn std::error::Error + 'static>;

static cfc: CanonicalFrameColumns = CanonicalFrameColumns::new();

/// Identity of a stored table: the source file plus an optional section
/// header for callers that cache per-section artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub file: PathBuf,
    pub header: Option<String>,
}

impl CacheKey {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            header: None,
        }
    }

    pub fn with_header(file: impl Into<PathBuf>, header: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            header: Some(header.into()),
        }
    }

    /// The blob property name this key maps to, `<stem>[_<header>]_parquet`.
    pub fn property(&self) -> String {
        let stem = self
            .file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        match &self.header {
            Some(header) => format!("{}_{}_parquet", stem, header.replace(' ', "_")),
            None => format!("{stem}_parquet"),
        }
    }
}

/// Byte-blob cache seam. Implementations are expected to be remote
/// (a networked cache shared between hosts), so everything is fallible.
pub trait BlobCache {
    fn get(&self, property: &str) -> Result<Option<Vec<u8>>, Error>;
    fn put(&self, property: &str, bytes: &[u8]) -> Result<(), Error>;
}

/// Loads canonical tables through the cache chain:
/// blob cache, then on-disk parquet, then the source text itself.
pub struct TableStore<'a> {
    cache: Option<&'a dyn BlobCache>,
    /// keep the source text file after persisting its parquet
    keep_source: bool,
}

impl<'a> TableStore<'a> {
    pub fn new() -> Self {
        Self {
            cache: None,
            keep_source: false,
        }
    }

    pub fn with_cache(cache: &'a dyn BlobCache) -> Self {
        Self {
            cache: Some(cache),
            keep_source: false,
        }
    }

    pub fn keep_source(mut self, keep: bool) -> Self {
        self.keep_source = keep;
        self
    }

    /// The parquet twin of a source path: same location, `.parquet` extension.
    pub fn parquet_path(source: &Path) -> PathBuf {
        source.with_extension("parquet")
    }

    /// Load the canonical table for `source`, parsing and persisting it on
    /// first contact. After a parse the source text is deleted unless the
    /// store was built with `keep_source(true)`.
    pub fn load(&self, source: &Path, catalog: &dyn HeaderCatalog) -> Result<SarTable, Error> {
        let key = CacheKey::new(source);
        if let Some(cache) = self.cache {
            // an unreachable cache degrades to the filesystem path
            match cache.get(&key.property()) {
                Ok(Some(bytes)) => {
                    let frame = ParquetReader::new(Cursor::new(bytes)).finish()?;
                    return rehydrate(frame, catalog);
                }
                Ok(None) => {}
                Err(e) => println!("sarp: cache get failed: {e}"),
            }
        }

        let parquet = Self::parquet_path(source);
        if parquet.is_file() {
            let frame = ParquetReader::new(File::open(&parquet)?).finish()?;
            return rehydrate(frame, catalog);
        }

        let text = fs::read_to_string(source)?;
        let table = parse_str(&text)?;

        let mut frame = table.frame.clone();
        ParquetWriter::new(File::create(&parquet)?).finish(&mut frame)?;
        if let Some(cache) = self.cache {
            if let Err(e) = cache.put(&key.property(), &fs::read(&parquet)?) {
                println!("sarp: cache put failed: {e}");
            }
        }
        if !self.keep_source {
            fs::remove_file(source)?;
        }
        Ok(table)
    }
}

impl Default for TableStore<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Rebuild a `SarTable` from a persisted canonical frame. The banner is
/// recovered from the `os_details` row; section schemas are rebuilt from the
/// stored headers, asking the catalog whether each section carries a device
/// column and falling back to sniffing the first data token.
fn rehydrate(frame: DataFrame, catalog: &dyn HeaderCatalog) -> Result<SarTable, Error> {
    let banner = match assembler::os_details(&frame)? {
        Some(line) => OsBanner::parse(&line),
        None => OsBanner::missing(),
    };
    let mut schemas: Vec<SectionSchema> = vec![];
    for header in assembler::headers(&frame)? {
        let has_sub_device = match catalog.entry_for_header(&header) {
            Some(entry) => entry.has_sub_device,
            None => first_token_is_identifier(&frame, &header)?,
        };
        schemas.push(SectionSchema::new(header, has_sub_device, false));
    }
    let restarts = restart::restart_markers(&frame)?;
    Ok(SarTable {
        frame,
        schemas,
        banner,
        // times were resolved into full datetimes before persisting
        clock_format: ClockFormat::H24,
        restarts,
    })
}

fn first_token_is_identifier(frame: &DataFrame, header: &str) -> PolarsResult<bool> {
    let headers = frame.column(cfc.HEADER)?.str()?;
    let data = frame.column(cfc.DATA)?.str()?;
    for (h, row) in headers.into_iter().zip(data.into_iter()) {
        if h != Some(header) {
            continue;
        }
        if let Some(token) = row.and_then(|r| r.split_whitespace().next()) {
            return Ok(token.parse::<f32>().is_err());
        }
    }
    Ok(false)
}

/// Per-run cache of canonical tables (by file) and decomposed metric tables
/// (by file + header), invalidated when the backing file's mtime moves.
/// Reusing an entry across different files sharing a key would silently serve
/// the wrong data, so staleness checks are never skipped.
#[derive(Default)]
pub struct SessionCache {
    tables: HashMap<PathBuf, (SystemTime, Arc<SarTable>)>,
    metrics: HashMap<CacheKey, (SystemTime, Arc<DataFrame>)>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn mtime(path: &Path) -> Option<SystemTime> {
        fs::metadata(path).and_then(|m| m.modified()).ok()
    }

    pub fn get(&self, path: &Path) -> Option<Arc<SarTable>> {
        let (cached_at, table) = self.tables.get(path)?;
        (Self::mtime(path)? == *cached_at).then(|| Arc::clone(table))
    }

    pub fn put(&mut self, path: PathBuf, table: SarTable) -> Result<Arc<SarTable>, Error> {
        let mtime = fs::metadata(&path)?.modified()?;
        let table = Arc::new(table);
        self.tables.insert(path, (mtime, Arc::clone(&table)));
        Ok(table)
    }

    pub fn get_metric(&self, key: &CacheKey) -> Option<Arc<DataFrame>> {
        let (cached_at, table) = self.metrics.get(key)?;
        (Self::mtime(&key.file)? == *cached_at).then(|| Arc::clone(table))
    }

    pub fn put_metric(&mut self, key: CacheKey, table: DataFrame) -> Result<Arc<DataFrame>, Error> {
        let mtime = fs::metadata(&key.file)?.modified()?;
        let table = Arc::new(table);
        self.metrics.insert(key, (mtime, Arc::clone(&table)));
        Ok(table)
    }
}
