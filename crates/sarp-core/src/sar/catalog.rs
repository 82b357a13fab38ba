//! Known sysstat section headers and their human-friendly aliases.
//!
//! Header strings drift across sysstat releases (columns appear, vanish, or
//! get renamed), so lookups fall back to token overlap when no exact match
//! exists. The catalog also records which sections carry a per-row device
//! identifier, for callers that only hold a stored header string and not the
//! section schema.

/// One known section: a short alias, the normalized header of a recent
/// sysstat release, and whether rows lead with a device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub alias: &'static str,
    pub header: &'static str,
    pub description: &'static str,
    pub has_sub_device: bool,
}

/// Alias and header lookup over a set of catalog entries.
pub trait HeaderCatalog {
    fn entries(&self) -> &[CatalogEntry];

    /// Exact alias lookup, case-insensitive.
    fn entry_for_alias(&self, alias: &str) -> Option<&CatalogEntry> {
        self.entries()
            .iter()
            .find(|e| e.alias.eq_ignore_ascii_case(alias))
    }

    /// Resolve a header string to its catalog entry. Exact match first, then
    /// the entry sharing the most metric tokens, requiring at least half of
    /// the query's tokens to be known.
    fn entry_for_header(&self, header: &str) -> Option<&CatalogEntry> {
        if let Some(entry) = self.entries().iter().find(|e| e.header == header) {
            return Some(entry);
        }
        let query: Vec<&str> = header.split_whitespace().collect();
        if query.is_empty() {
            return None;
        }
        let mut best: Option<(usize, &CatalogEntry)> = None;
        for entry in self.entries() {
            let overlap = query
                .iter()
                .filter(|t| entry.header.split_whitespace().any(|m| &m == *t))
                .count();
            if overlap * 2 >= query.len() && best.map(|(n, _)| overlap > n).unwrap_or(true) {
                best = Some((overlap, entry));
            }
        }
        best.map(|(_, e)| e)
    }
}

/// The built-in catalog, tracking the section layouts of sysstat 12.x.
#[derive(Debug, Default)]
pub struct StaticHeaderCatalog;

impl StaticHeaderCatalog {
    pub fn new() -> Self {
        Self
    }
}

static ENTRIES: [CatalogEntry; 15] = [
    CatalogEntry {
        alias: "cpu",
        description: "per-cpu utilization",
        header: "%usr %nice %sys %iowait %steal %irq %soft %guest %gnice %idle",
        has_sub_device: true,
    },
    CatalogEntry {
        alias: "io",
        description: "i/o and transfer rates",
        header: "tps rtps wtps bread/s bwrtn/s",
        has_sub_device: false,
    },
    CatalogEntry {
        alias: "memory",
        description: "memory utilization",
        header: "kbmemfree kbavail kbmemused %memused kbbuffers kbcached kbcommit %commit kbactive kbinact kbdirty",
        has_sub_device: false,
    },
    CatalogEntry {
        alias: "network",
        description: "network interface statistics",
        header: "rxpck/s txpck/s rxkB/s txkB/s rxcmp/s txcmp/s rxmcst/s %ifutil",
        has_sub_device: true,
    },
    CatalogEntry {
        alias: "disk",
        description: "block device activity",
        header: "tps rkB/s wkB/s dkB/s areq-sz aqu-sz await %util",
        has_sub_device: true,
    },
    CatalogEntry {
        alias: "paging",
        description: "paging statistics",
        header: "pgpgin/s pgpgout/s fault/s majflt/s pgfree/s pgscank/s pgscand/s pgsteal/s %vmeff",
        has_sub_device: false,
    },
    CatalogEntry {
        alias: "swap",
        description: "swap space utilization",
        header: "kbswpfree kbswpused %swpused kbswpcad %swpcad",
        has_sub_device: false,
    },
    CatalogEntry {
        alias: "load",
        description: "queue length and load averages",
        header: "runq-sz plist-sz ldavg-1 ldavg-5 ldavg-15 blocked",
        has_sub_device: false,
    },
    CatalogEntry {
        alias: "tasks",
        description: "task creation and context switches",
        header: "proc/s cswch/s",
        has_sub_device: false,
    },
    CatalogEntry {
        alias: "swapping",
        description: "swapping statistics",
        header: "pswpin/s pswpout/s",
        has_sub_device: false,
    },
    CatalogEntry {
        alias: "filesystem",
        description: "filesystem usage",
        header: "MBfsfree MBfsused %fsused %ufsused Ifree Iused %Iused",
        has_sub_device: true,
    },
    CatalogEntry {
        alias: "fibrechannel",
        description: "fibre channel host traffic",
        header: "fch_rxf/s fch_txf/s fch_rxw/s fch_txw/s",
        has_sub_device: true,
    },
    CatalogEntry {
        alias: "tty",
        description: "serial line statistics",
        header: "rcvin/s xmtin/s framerr/s prtyerr/s brk/s ovrun/s",
        has_sub_device: true,
    },
    CatalogEntry {
        alias: "inode",
        description: "inode and file table usage",
        header: "dentunusd file-nr inode-nr pty-nr",
        has_sub_device: false,
    },
    CatalogEntry {
        alias: "hugepages",
        description: "huge pages utilization",
        header: "kbhugfree kbhugused %hugused",
        has_sub_device: false,
    },
];

impl HeaderCatalog for StaticHeaderCatalog {
    fn entries(&self) -> &[CatalogEntry] {
        &ENTRIES
    }
}
