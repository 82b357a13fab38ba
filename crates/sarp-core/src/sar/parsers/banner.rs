use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DATE_YMD_RE: Regex = Regex::new(r"[0-9]{4}-[0-9]{2}-[0-9]{2}").unwrap();
    static ref DATE_MDY2_RE: Regex = Regex::new(r"[0-9]{2}-[0-9]{2}-[0-9]{2}").unwrap();
    static ref DATE_MDY2_SLASH_RE: Regex = Regex::new(r"[0-9]{2}/[0-9]{2}/[0-9]{2}$").unwrap();
    static ref DATE_MDY4_SLASH_RE: Regex = Regex::new(r"[0-9]{2}/[0-9]{2}/[0-9]{4}").unwrap();
    static ref HOSTNAME_RE: Regex = Regex::new(r"\(([^)\s]+)\)").unwrap();
}

/// When the banner carries no recognizable date token the charts still have to
/// render relative to each other, so a fixed stand-in date is used instead of
/// failing the whole file.
pub const FALLBACK_DATE: &str = "2000-01-01";

/// The single "OS details" line of a sar file: distro/kernel tokens, hostname in
/// parentheses, and the collection date. The date anchors every bare
/// time-of-day value in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct OsBanner {
    pub raw: String,
    pub hostname: Option<String>,
    pub anchor_date: NaiveDate,
    /// no date token was found; `anchor_date` is the fallback sentinel
    pub sentinel: bool,
}

impl OsBanner {
    pub fn parse(line: &str) -> Self {
        let raw = line.replace(['[', ']'], "").trim_end().to_owned();
        let hostname = HOSTNAME_RE
            .captures(&raw)
            .map(|c| c.get(1).unwrap().as_str().to_owned());
        let (anchor_date, sentinel) = match find_anchor_date(&raw) {
            Some(d) => (d, false),
            None => (
                NaiveDate::parse_from_str(FALLBACK_DATE, "%Y-%m-%d").unwrap(),
                true,
            ),
        };
        Self {
            raw,
            hostname,
            anchor_date,
            sentinel,
        }
    }

    /// Banner for a file with no banner line at all. Same sentinel rules.
    pub fn missing() -> Self {
        Self::parse("")
    }
}

/// Scan banner tokens for the first recognizable date. Accepted sub-formats:
/// `YYYY-MM-DD`, `MM-DD-YY`, `MM/DD/YY`, `MM/DD/YYYY`.
fn find_anchor_date(banner: &str) -> Option<NaiveDate> {
    for item in banner.split_whitespace() {
        if let Some(m) = DATE_YMD_RE.find(item) {
            return NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok();
        }
        if let Some(m) = DATE_MDY2_RE.find(item) {
            return NaiveDate::parse_from_str(m.as_str(), "%m-%d-%y").ok();
        }
        if let Some(m) = DATE_MDY4_SLASH_RE.find(item) {
            return NaiveDate::parse_from_str(m.as_str(), "%m/%d/%Y").ok();
        }
        if let Some(m) = DATE_MDY2_SLASH_RE.find(item) {
            return NaiveDate::parse_from_str(m.as_str(), "%m/%d/%y").ok();
        }
    }
    None
}
