use chrono::{NaiveDateTime, NaiveTime};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use sarp_core::cli::writers::csv::CsvWrite;
use sarp_core::sar::catalog::{HeaderCatalog, StaticHeaderCatalog};
use sarp_core::sar::core::assembler::{self, SarTable};
use sarp_core::sar::core::decomposer;
use sarp_core::sar::core::restart;
use sarp_core::sar::core::types::MetricDataFrame;
use sarp_core::sar::core::window::{self, TimeWindow};
use sarp_core::sar::store::{Error, TableStore};

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cmds {
    #[command(subcommand)]
    command: SubCommands,
}

#[derive(Subcommand)]
enum SubCommands {
    /// List the section headers available in a sar file
    Headers {
        /// sar ASCII file (or its parquet twin from an earlier run)
        input: PathBuf,

        /// keep the source text file after parsing
        #[arg(long)]
        keep_source: bool,
    },
    /// Decompose a sar file into per-section metric tables
    Parse {
        /// sar ASCII file (or its parquet twin from an earlier run)
        input: PathBuf,

        /// exact section header, e.g. "tps rtps wtps"
        #[arg(long, conflicts_with = "alias")]
        header: Option<String>,

        /// catalog alias for a section, e.g. "cpu" or "network"
        #[arg(long)]
        alias: Option<String>,

        /// restrict a device-keyed section to one device, e.g. "eth0" or "all"
        #[arg(long)]
        device: Option<String>,

        /// window start time of day, HH:MM:SS
        #[arg(long)]
        from: Option<String>,

        /// window end time of day, HH:MM:SS
        #[arg(long)]
        to: Option<String>,

        /// print descriptive statistics instead of the table
        #[arg(long)]
        stats: bool,

        /// export every section to <stem>_<section>.csv
        #[arg(long, conflicts_with_all = ["header", "alias"])]
        all_headers: bool,

        /// keep the source text file after parsing
        #[arg(long)]
        keep_source: bool,

        /// CSV output path (defaults to printing the table)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Error> {
    if let Ok(threads) = std::env::var("MAX_THREADS") {
        std::env::set_var("POLARS_MAX_THREADS", threads);
    }
    if let Ok(threads) = std::env::var("POOL_MAX_THREADS") {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads.parse()?)
            .build_global()?;
    }

    let cmds = Cmds::parse();
    let catalog = StaticHeaderCatalog::new();

    match cmds.command {
        SubCommands::Headers { input, keep_source } => {
            let table = load(&input, keep_source, &catalog)?;
            for header in assembler::headers(&table.frame)? {
                match catalog.entry_for_header(&header) {
                    Some(entry) => {
                        println!("{:<14} {:<36} {header}", entry.alias, entry.description)
                    }
                    None => println!("{:<14} {:<36} {header}", "-", "-"),
                }
            }
        }
        SubCommands::Parse {
            input,
            header,
            alias,
            device,
            from,
            to,
            stats,
            all_headers,
            keep_source,
            output,
        } => {
            let table = load(&input, keep_source, &catalog)?;
            if all_headers {
                export_all(&table, &input, &catalog)?;
                return Ok(());
            }

            let header = resolve_header(&table, header, alias, &catalog)?;
            let schema = table
                .schema_for(&header)
                .ok_or_else(|| format!("no section '{header}' in {}", input.display()))?;
            let mut metric = decomposer::metric_table(&table.frame, schema)?;

            if let Some(device) = &device {
                metric = decomposer::filter_sub_device(&metric, device)?;
            }
            let mut window = None;
            if from.is_some() || to.is_some() {
                let w = parse_window(from.as_deref(), to.as_deref())?.reconcile(&metric)?;
                metric = window::slice_window(&metric, &w)?;
                window = Some(w);
            }

            if stats {
                // statistics come from real samples only
                let described = window::describe(&metric)?;
                println!("{described}");
                return Ok(());
            }

            let mut events = restart::resolve_events(&table.restarts, &table.banner);
            if let Some(w) = &window {
                events.retain(|e| e.datetime >= w.start && e.datetime <= w.end);
            }
            let (metric, inserted) = restart::insert_restarts(&metric, &events)?;
            for event in &inserted {
                println!("sarp: restart at {}", event.datetime);
            }

            match output {
                Some(path) => {
                    metric.write_csv(&path)?;
                    println!("sarp: wrote {}", path.display());
                }
                None => println!("{metric}"),
            }
        }
    }
    Ok(())
}

fn load(
    input: &Path,
    keep_source: bool,
    catalog: &dyn HeaderCatalog,
) -> Result<SarTable, Error> {
    let table = TableStore::new()
        .keep_source(keep_source)
        .load(input, catalog)?;
    if let Some(host) = &table.banner.hostname {
        println!("sarp: {} ({host})", input.display());
    }
    Ok(table)
}

/// Map --header / --alias onto a header actually present in the table.
/// An alias goes through the catalog, then back through it to find which of
/// the table's headers belongs to that section in this sysstat release.
fn resolve_header(
    table: &SarTable,
    header: Option<String>,
    alias: Option<String>,
    catalog: &dyn HeaderCatalog,
) -> Result<String, Error> {
    if let Some(header) = header {
        return Ok(header);
    }
    let Some(alias) = alias else {
        return Err("pass --header, --alias, or --all-headers".into());
    };
    let entry = catalog
        .entry_for_alias(&alias)
        .ok_or_else(|| format!("unknown alias '{alias}'"))?;
    for header in assembler::headers(&table.frame)? {
        if catalog.entry_for_header(&header) == Some(entry) {
            return Ok(header);
        }
    }
    Err(format!("no section matching alias '{alias}' in this file").into())
}

fn parse_window(from: Option<&str>, to: Option<&str>) -> Result<TimeWindow, Error> {
    let start = match from {
        Some(t) => NaiveTime::parse_from_str(t, "%H:%M:%S")?,
        None => NaiveTime::MIN,
    };
    let end = match to {
        Some(t) => NaiveTime::parse_from_str(t, "%H:%M:%S")?,
        None => NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
    };
    // placeholder date, reconciled against the table before slicing
    let anchor = chrono::NaiveDate::from_ymd_opt(2000, 1, 1)
        .map(|d| (NaiveDateTime::new(d, start), NaiveDateTime::new(d, end)))
        .ok_or("invalid window")?;
    Ok(TimeWindow::new(anchor.0, anchor.1))
}

/// Fan every section out to its own CSV next to the input file.
fn export_all(table: &SarTable, input: &Path, catalog: &dyn HeaderCatalog) -> Result<(), Error> {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sar".to_owned());
    let dir = input.parent().unwrap_or_else(|| Path::new("."));

    let results = decomposer::decompose_many(&table.frame, &table.schemas);
    for (header, metric) in results {
        let metric: MetricDataFrame = metric?;
        let name = match catalog.entry_for_header(&header) {
            Some(entry) => entry.alias.to_owned(),
            None => header.replace([' ', '/'], "_"),
        };
        let path = dir.join(format!("{stem}_{name}.csv"));
        metric.write_csv(&path)?;
        println!("sarp: wrote {}", path.display());
    }
    Ok(())
}
