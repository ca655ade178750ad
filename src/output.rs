//! Projects the filtered hierarchy into an ordered, limited sequence of
//! display rows and renders them as CSV, aligned columns or JSON. Rows are a
//! closed sum type dispatched on here; every variant knows which of the nine
//! stable columns it fills.

use std::{
    io::Write,
    str::FromStr,
};

use crate::{
    aggregate::Hierarchy,
    deps::{
        serde,
        serde_json,
    },
    error::Error,
    relation::{
        PartInfo,
        RelInfo,
        RelKind,
        TableInfo,
        TOTAL_LABEL,
        WAL_LABEL,
    },
    stats::PageStats,
};


#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Aggregation {
    None,
    Table,
    TableOnly,
    Partition,
    PartitionOnly,
}

impl FromStr for Aggregation {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Aggregation::None),
            "table" => Ok(Aggregation::Table),
            "table_only" => Ok(Aggregation::TableOnly),
            "partition" => Ok(Aggregation::Partition),
            "partition_only" => Ok(Aggregation::PartitionOnly),
            _ => {
                Err(Error::Parse {
                    value:    value.to_string(),
                    typename: std::any::type_name::<Aggregation>(),
                    reason:   "value was not one of: none, table, table_only, partition, partition_only".to_string(),
                })
            }
        }
    }
}


#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SortKey {
    Name,
    PageCached,
    PageCount,
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "page_cached" => Ok(SortKey::PageCached),
            "page_count" => Ok(SortKey::PageCount),
            _ => {
                Err(Error::Parse {
                    value:    value.to_string(),
                    typename: std::any::type_name::<SortKey>(),
                    reason:   "value was not one of: name, page_cached, page_count".to_string(),
                })
            }
        }
    }
}


#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Unit {
    Page,
    Kb,
    Mb,
    Gb,
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "page" => Ok(Unit::Page),
            "kb" => Ok(Unit::Kb),
            "mb" => Ok(Unit::Mb),
            "gb" => Ok(Unit::Gb),
            _ => {
                Err(Error::Parse {
                    value:    value.to_string(),
                    typename: std::any::type_name::<Unit>(),
                    reason:   "value was not one of: page, kb, mb, gb".to_string(),
                })
            }
        }
    }
}


#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Format {
    Csv,
    Column,
    Json,
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Format::Csv),
            "column" => Ok(Format::Column),
            "json" => Ok(Format::Json),
            _ => {
                Err(Error::Parse {
                    value:    value.to_string(),
                    typename: std::any::type_name::<Format>(),
                    reason:   "value was not one of: csv, column, json".to_string(),
                })
            }
        }
    }
}


#[derive(Clone, Debug)]
pub struct OutputOptions {
    pub aggregation: Aggregation,
    pub sort:        SortKey,
    pub unit:        Unit,
    pub format:      Format,
    /// Caps the number of parent rows (relations, tables or partitions
    /// depending on the aggregation mode). Zero or negative is unlimited.
    pub limit:       i64,
    pub no_header:   bool,
}


/// One projected row, still borrowing the tree.
#[derive(Debug)]
pub enum OutputRow<'a> {
    Relation {
        partition: &'a str,
        table:     &'a str,
        relinfo:   &'a RelInfo,
    },
    Table {
        partition: &'a str,
        table:     &'a TableInfo,
    },
    Partition(&'a PartInfo),
    Wal(&'a PageStats),
    Total(&'a PageStats),
}

impl<'a> OutputRow<'a> {
    pub fn stats(&self) -> &'a PageStats {
        match self {
            OutputRow::Relation { relinfo, .. } => &relinfo.stats,
            OutputRow::Table { table, .. } => &table.stats,
            OutputRow::Partition(partition) => &partition.stats,
            OutputRow::Wal(stats) => stats,
            OutputRow::Total(stats) => stats,
        }
    }

    /// The label a page-flags sub-table row refers back to.
    fn label(&self) -> &'a str {
        match self {
            OutputRow::Relation { relinfo, .. } => relinfo.name.as_str(),
            OutputRow::Table { table, .. } => table.name.as_str(),
            OutputRow::Partition(partition) => partition.name.as_str(),
            OutputRow::Wal(_) => WAL_LABEL,
            OutputRow::Total(_) => TOTAL_LABEL,
        }
    }

    /// Whether this row is the deepest level its aggregation mode emits;
    /// only those contribute to the flags sub-table, so histogram pages are
    /// never listed twice.
    fn is_leaf_for(
        &self,
        aggregation: Aggregation,
    ) -> bool {
        match self {
            OutputRow::Relation { .. } => true,
            OutputRow::Table { .. } => aggregation == Aggregation::TableOnly,
            OutputRow::Partition(_) => aggregation == Aggregation::PartitionOnly,
            OutputRow::Wal(_) => true,
            OutputRow::Total(_) => false,
        }
    }
}


fn sort_items<T>(
    items: &mut [T],
    sort: SortKey,
    name: impl Fn(&T) -> &str,
    stats: impl Fn(&T) -> &PageStats,
) {
    match sort {
        SortKey::Name => items.sort_by(|a, b| name(a).cmp(name(b))),
        SortKey::PageCached => {
            items.sort_by(|a, b| {
                stats(b)
                    .page_cached
                    .cmp(&stats(a).page_cached)
                    .then_with(|| name(a).cmp(name(b)))
            })
        }
        SortKey::PageCount => {
            items.sort_by(|a, b| {
                stats(b)
                    .page_count
                    .cmp(&stats(a).page_count)
                    .then_with(|| name(a).cmp(name(b)))
            })
        }
    }
}


fn clamp<T>(
    items: Vec<T>,
    limit: i64,
) -> Vec<T> {
    if limit > 0 && items.len() as i64 > limit {
        items.into_iter().take(limit as usize).collect()
    } else {
        items
    }
}


/// Project the tree into display order: parents sorted by the sort key and
/// capped by the limit, children of every included parent emitted in full in
/// their own nested sort order, WAL and Total rows appended last.
pub fn project<'a>(
    hierarchy: &'a Hierarchy,
    options: &OutputOptions,
) -> Vec<OutputRow<'a>> {
    let mut rows = Vec::new();

    match options.aggregation {
        Aggregation::None => {
            let mut relations: Vec<(&str, &str, &RelInfo)> = Vec::new();
            for partition in hierarchy.partitions.iter() {
                for table in partition.tables.iter() {
                    for relinfo in table.relations.iter() {
                        relations.push((partition.name.as_str(), table.name.as_str(), relinfo));
                    }
                }
            }
            sort_items(&mut relations, options.sort, |r| r.2.name.as_str(), |r| &r.2.stats);
            for (partition, table, relinfo) in clamp(relations, options.limit) {
                rows.push(OutputRow::Relation {
                    partition,
                    table,
                    relinfo,
                });
            }
        }

        Aggregation::Table | Aggregation::TableOnly => {
            let mut tables: Vec<(&str, &TableInfo)> = Vec::new();
            for partition in hierarchy.partitions.iter() {
                for table in partition.tables.iter() {
                    tables.push((partition.name.as_str(), table));
                }
            }
            sort_items(&mut tables, options.sort, |t| t.1.name.as_str(), |t| &t.1.stats);
            for (partition, table) in clamp(tables, options.limit) {
                rows.push(OutputRow::Table { partition, table });
                if options.aggregation == Aggregation::TableOnly {
                    continue;
                }
                let mut relations: Vec<&RelInfo> = table.relations.iter().collect();
                sort_items(&mut relations, options.sort, |r| r.name.as_str(), |r| &r.stats);
                for relinfo in relations {
                    rows.push(OutputRow::Relation {
                        partition,
                        table: table.name.as_str(),
                        relinfo,
                    });
                }
            }
        }

        Aggregation::Partition | Aggregation::PartitionOnly => {
            let mut partitions: Vec<&PartInfo> = hierarchy.partitions.iter().collect();
            sort_items(&mut partitions, options.sort, |p| p.name.as_str(), |p| &p.stats);
            for partition in clamp(partitions, options.limit) {
                rows.push(OutputRow::Partition(partition));
                if options.aggregation == Aggregation::PartitionOnly {
                    continue;
                }
                let mut tables: Vec<&TableInfo> = partition.tables.iter().collect();
                sort_items(&mut tables, options.sort, |t| t.name.as_str(), |t| &t.stats);
                for table in tables {
                    rows.push(OutputRow::Table {
                        partition: partition.name.as_str(),
                        table,
                    });
                    let mut relations: Vec<&RelInfo> = table.relations.iter().collect();
                    sort_items(&mut relations, options.sort, |r| r.name.as_str(), |r| &r.stats);
                    for relinfo in relations {
                        rows.push(OutputRow::Relation {
                            partition: partition.name.as_str(),
                            table: table.name.as_str(),
                            relinfo,
                        });
                    }
                }
            }
        }
    }

    if let Some(wal) = hierarchy.wal.as_ref() {
        rows.push(OutputRow::Wal(wal));
    }
    rows.push(OutputRow::Total(&hierarchy.total));

    rows
}


/// Page counts rendered in the requested unit: pages as integers, kB in
/// shortest form, MB and GB with two decimals.
pub fn format_value(
    value: u64,
    unit: Unit,
    page_size: u64,
) -> String {
    let bytes = value as f64 * page_size as f64;
    match unit {
        Unit::Page => value.to_string(),
        Unit::Kb => format!("{}", bytes / 1024.0),
        Unit::Mb => format!("{:.2}", bytes / (1024.0 * 1024.0)),
        Unit::Gb => format!("{:.2}", bytes / (1024.0 * 1024.0 * 1024.0)),
    }
}


/// One fully rendered row of the main table. Field order is the stable
/// column order.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct DisplayRow {
    #[serde(rename = "Partition")]
    pub partition:   String,
    #[serde(rename = "Table")]
    pub table:       String,
    #[serde(rename = "Relation")]
    pub relation:    String,
    #[serde(rename = "Relfilenode")]
    pub relfilenode: String,
    #[serde(rename = "Kind")]
    pub kind:        String,
    #[serde(rename = "PageCached")]
    pub page_cached: String,
    #[serde(rename = "PageCount")]
    pub page_count:  String,
    #[serde(rename = "%Cached")]
    pub pct_cached:  String,
    #[serde(rename = "%Total")]
    pub pct_total:   String,
}

const COLUMNS: [&str; 9] = [
    "Partition",
    "Table",
    "Relation",
    "Relfilenode",
    "Kind",
    "PageCached",
    "PageCount",
    "%Cached",
    "%Total",
];

impl DisplayRow {
    fn cells(&self) -> [&str; 9] {
        [
            &self.partition,
            &self.table,
            &self.relation,
            &self.relfilenode,
            &self.kind,
            &self.page_cached,
            &self.page_count,
            &self.pct_cached,
            &self.pct_total,
        ]
    }
}


/// One row of the page-flags sub-table.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct FlagRow {
    #[serde(rename = "Relation")]
    pub relation:    String,
    #[serde(rename = "Page Count")]
    pub page_count:  String,
    #[serde(rename = "Flags (hex)")]
    pub flags_hex:   String,
    #[serde(rename = "Symbolic Flags (short)")]
    pub short_flags: String,
    #[serde(rename = "Long Symbolic Flags")]
    pub long_flags:  String,
}

const FLAG_COLUMNS: [&str; 5] = [
    "Relation",
    "Page Count",
    "Flags (hex)",
    "Symbolic Flags (short)",
    "Long Symbolic Flags",
];

impl FlagRow {
    fn cells(&self) -> [&str; 5] {
        [
            &self.relation,
            &self.page_count,
            &self.flags_hex,
            &self.short_flags,
            &self.long_flags,
        ]
    }
}


pub fn to_display_rows(
    rows: &[OutputRow],
    options: &OutputOptions,
    page_size: u64,
    total_cached_pages: u64,
) -> Vec<DisplayRow> {
    rows.iter()
        .map(|row| {
            let stats = row.stats();
            let mut display = DisplayRow {
                partition:   String::new(),
                table:       String::new(),
                relation:    String::new(),
                relfilenode: String::new(),
                kind:        String::new(),
                page_cached: format_value(stats.page_cached, options.unit, page_size),
                page_count:  format_value(stats.page_count, options.unit, page_size),
                pct_cached:  stats.cached_pct(),
                pct_total:   stats.total_cached_pct(total_cached_pages),
            };
            match row {
                OutputRow::Relation {
                    partition,
                    table,
                    relinfo,
                } => {
                    display.partition = partition.to_string();
                    display.table = table.to_string();
                    display.relation = relinfo.name.clone();
                    display.relfilenode = relinfo.relfilenode.to_string();
                    display.kind = relinfo.kind.display_name().to_string();
                }
                OutputRow::Table { partition, table } => {
                    display.partition = partition.to_string();
                    display.table = table.name.clone();
                    display.kind = RelKind::Table.display_name().to_string();
                }
                OutputRow::Partition(partition) => {
                    display.partition = partition.name.clone();
                    display.kind = RelKind::Partition.display_name().to_string();
                }
                OutputRow::Wal(_) => {
                    display.relation = WAL_LABEL.to_string();
                    display.kind = RelKind::Wal.display_name().to_string();
                }
                OutputRow::Total(_) => {
                    display.relation = TOTAL_LABEL.to_string();
                    display.kind = RelKind::Total.display_name().to_string();
                }
            }
            display
        })
        .collect()
}


/// Flag histogram rows for every leaf row of the projection, in projection
/// order then flag-word order.
pub fn to_flag_rows(
    rows: &[OutputRow],
    aggregation: Aggregation,
) -> Vec<FlagRow> {
    let mut out = Vec::new();
    for row in rows {
        if !row.is_leaf_for(aggregation) {
            continue;
        }
        for (word, count) in row.stats().flag_histogram.iter() {
            out.push(FlagRow {
                relation:    row.label().to_string(),
                page_count:  count.to_string(),
                flags_hex:   format!("{:#x}", word),
                short_flags: word.short_name(),
                long_flags:  word.long_name(),
            });
        }
    }
    out
}


fn write_csv<W: Write>(
    out: &mut W,
    options: &OutputOptions,
    rows: &[DisplayRow],
    flags: &[FlagRow],
) -> Result<(), Error> {
    if !options.no_header {
        writeln!(out, "{}", COLUMNS.join(","))?;
    }
    for row in rows {
        writeln!(out, "{}", row.cells().join(","))?;
    }

    if !flags.is_empty() {
        writeln!(out)?;
        if !options.no_header {
            writeln!(out, "{}", FLAG_COLUMNS.join(","))?;
        }
        for row in flags {
            writeln!(out, "{}", row.cells().join(","))?;
        }
    }
    Ok(())
}


fn write_aligned<W: Write, const N: usize>(
    out: &mut W,
    header: Option<[&str; N]>,
    cells: &[[&str; N]],
) -> Result<(), Error> {
    let mut widths = [0usize; N];
    for row in header.iter().chain(cells.iter()) {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut write_row = |row: &[&str; N]| -> Result<(), Error> {
        let mut line = String::new();
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                line.push_str("  ");
            }
            line.push_str(cell);
            if i + 1 < N {
                for _ in cell.len()..widths[i] {
                    line.push(' ');
                }
            }
        }
        writeln!(out, "{}", line.trim_end())?;
        Ok(())
    };

    if let Some(header) = header.as_ref() {
        write_row(header)?;
    }
    for row in cells {
        write_row(row)?;
    }
    Ok(())
}


fn write_column<W: Write>(
    out: &mut W,
    options: &OutputOptions,
    rows: &[DisplayRow],
    flags: &[FlagRow],
) -> Result<(), Error> {
    let cells: Vec<[&str; 9]> = rows.iter().map(DisplayRow::cells).collect();
    let header = if options.no_header { None } else { Some(COLUMNS) };
    write_aligned(out, header, &cells)?;

    if !flags.is_empty() {
        writeln!(out)?;
        let cells: Vec<[&str; 5]> = flags.iter().map(FlagRow::cells).collect();
        let header = if options.no_header { None } else { Some(FLAG_COLUMNS) };
        write_aligned(out, header, &cells)?;
    }
    Ok(())
}


#[derive(serde::Serialize)]
struct JsonDocument<'a> {
    rows:       &'a [DisplayRow],
    page_flags: &'a [FlagRow],
}

fn write_json<W: Write>(
    out: &mut W,
    rows: &[DisplayRow],
    flags: &[FlagRow],
) -> Result<(), Error> {
    serde_json::to_writer_pretty(
        &mut *out,
        &JsonDocument {
            rows,
            page_flags: flags,
        },
    )?;
    writeln!(out)?;
    Ok(())
}


/// Project and render the hierarchy. `total_cached_pages` of zero renders
/// every %Total cell as "0".
pub fn render<W: Write>(
    out: &mut W,
    hierarchy: &Hierarchy,
    options: &OutputOptions,
    page_size: u64,
    total_cached_pages: u64,
) -> Result<(), Error> {
    let projected = project(hierarchy, options);
    let rows = to_display_rows(&projected, options, page_size, total_cached_pages);
    let flags = to_flag_rows(&projected, options.aggregation);

    match options.format {
        Format::Csv => write_csv(out, options, &rows, &flags),
        Format::Column => write_column(out, options, &rows, &flags),
        Format::Json => write_json(out, &rows, &flags),
    }
}
