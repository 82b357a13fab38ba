use crate::sar::core::types::SectionSchema;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref IGNORE_RE: Regex = Regex::new(
        r"(?i)^(\d{2}:\d{2}:\d{2}.*bus.*idvendor|.*intr.*intr/s|.*temp.*device|.*mhz)"
    )
    .unwrap();
    static ref TIME_RE: Regex = Regex::new(r"^\d{2}:\d{2}:\d{2}").unwrap();
    static ref RESTART_RE: Regex = Regex::new(r"(?i)LINUX RESTART").unwrap();
    static ref FIBRE_RE: Regex = Regex::new(r"(?i)^\d{2}:\d{2}:\d{2}.*fch_.*FCHOST").unwrap();
    static ref FILESYSTEM_RE: Regex = Regex::new(r"(?i)^\d{2}:\d{2}:\d{2}.*filesystem").unwrap();
    static ref AMPM_RE: Regex = Regex::new(r"(?i)^(AM|PM)$").unwrap();
}

/// Device-type labels that lead a section header but describe the per-row
/// identifier column, not a metric.
pub const DEVICE_LABELS: [&str; 6] = ["DEV", "IFACE", "CPU", "FCHOST", "TTY", "FILESYSTEM"];

/// One contiguous block of data lines sharing a header. Consumed once by the
/// columnar assembler.
#[derive(Debug, Clone)]
pub struct RawSection {
    pub schema: SectionSchema,
    pub data_lines: Vec<String>,
}

/// Everything the line classifier extracts from a sar text file.
#[derive(Debug, Default)]
pub struct Classified {
    pub sections: Vec<RawSection>,
    /// raw `LINUX RESTART` lines with the time-of-day re-appended as last token
    pub restarts: Vec<String>,
}

/// The fibre-channel host and filesystem sections place the row identifier
/// last instead of first. Move the trailing token to just behind the
/// timestamp so every section downstream has the shape
/// "timestamp, identifier?, metric...". Applied to header and data lines alike.
pub fn reorder_trailing_identifier(line: &str) -> String {
    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 2 {
        return line.to_owned();
    }
    let change_col = tokens[tokens.len() - 1];
    let ins_index = if AMPM_RE.is_match(tokens[1]) { 2 } else { 1 };
    tokens.insert(ins_index, change_col);
    tokens.pop();
    tokens.join(" ")
}

/// Strip the leading device-type label (and a duplicated AM/PM token from
/// 12-hour files) from a header string. The result is the section's stable
/// identity; two headers are the same section iff they are identical after
/// this normalization.
pub fn normalize_header(raw_header: &str) -> (String, bool) {
    let mut tokens: Vec<&str> = raw_header.split_whitespace().collect();
    if !tokens.is_empty() && AMPM_RE.is_match(tokens[0]) {
        tokens.remove(0);
    }
    let mut label_stripped = false;
    if !tokens.is_empty() && DEVICE_LABELS.contains(&tokens[0]) {
        tokens.remove(0);
        label_stripped = true;
    }
    (tokens.join(" "), label_stripped)
}

/// Scan the file line by line, producing the ordered sections and the restart
/// markers. A file with no time-series sections yields an empty `Classified`,
/// never an error.
pub fn classify(content: &str) -> Classified {
    let mut classified = Classified::default();
    let mut index_by_header: HashMap<String, usize> = HashMap::new();

    let mut expect_header = false;
    let mut ignore_data = false;
    let mut fc_host = false;
    let mut filesystem = false;
    let mut current: Option<usize> = None;

    for raw_line in content.lines() {
        let line = raw_line.trim_end();
        if line.trim().is_empty() {
            expect_header = true;
            ignore_data = false;
            continue;
        }
        if ignore_data {
            continue;
        }
        if !TIME_RE.is_match(line) {
            continue;
        }
        if RESTART_RE.is_match(line) {
            // re-append the leading time token so the restart's time-of-day is
            // always the last whitespace token of the marker string
            let time = line.split_whitespace().next().unwrap_or_default();
            classified.restarts.push(format!("{line} {time}"));
            continue;
        }
        if expect_header {
            if IGNORE_RE.is_match(line) {
                ignore_data = true;
                expect_header = false;
                continue;
            }
            let mut line = line.to_owned();
            fc_host = FIBRE_RE.is_match(&line);
            filesystem = FILESYSTEM_RE.is_match(&line);
            if fc_host || filesystem {
                line = reorder_trailing_identifier(&line);
            }
            let raw_header = line
                .split_whitespace()
                .skip(1)
                .collect::<Vec<&str>>()
                .join(" ");
            let (header, label_stripped) = normalize_header(&raw_header);
            let reordered = fc_host || filesystem;
            let idx = *index_by_header.entry(header.clone()).or_insert_with(|| {
                classified.sections.push(RawSection {
                    schema: SectionSchema::new(header, label_stripped || reordered, reordered),
                    data_lines: vec![],
                });
                classified.sections.len() - 1
            });
            current = Some(idx);
            expect_header = false;
        } else if let Some(idx) = current {
            let line = if fc_host || filesystem {
                reorder_trailing_identifier(line)
            } else {
                line.to_owned()
            };
            classified.sections[idx].data_lines.push(line);
        }
    }

    classified
}
