//! Rolls per-file probe results up the partition/table/relation hierarchy:
//! one probing pass over every relation segment, one bottom-up threshold
//! filtering pass, then the WAL bucket and the grand total.

use std::{
    collections::BTreeMap,
    path::{
        Path,
        PathBuf,
    },
};

use crate::{
    deps::log::{
        debug,
        info,
    },
    catalog::CatalogRow,
    error::Error,
    probe::PageCacheProbe,
    relation::{
        PartInfo,
        RelInfo,
        TableInfo,
    },
    stats::PageStats,
};


const PROGRESS_EVERY: usize = 1000;


pub struct AggregateOptions {
    pub database_dir:          PathBuf,
    /// `None` disables WAL scanning.
    pub wal_dir:               Option<PathBuf>,
    /// Relations, tables and partitions whose cached page count is at or
    /// below this are dropped. Negative disables filtering.
    pub cached_page_threshold: i64,
}


/// The probed, filtered tree handed to the output projector. Read-only from
/// here on.
pub struct Hierarchy {
    pub partitions: Vec<PartInfo>,
    pub wal:        Option<PageStats>,
    pub total:      PageStats,
}


/// Group catalog rows into the partition/table/relation skeleton. Rows
/// arrive in catalog order; the skeleton is keyed by name so the probe pass
/// is deterministic.
pub fn build_skeleton(rows: Vec<CatalogRow>) -> Vec<PartInfo> {
    let mut grouped: BTreeMap<String, BTreeMap<String, Vec<RelInfo>>> = BTreeMap::new();

    for row in rows {
        grouped
            .entry(row.partition)
            .or_insert_with(BTreeMap::new)
            .entry(row.table)
            .or_insert_with(Vec::new)
            .push(RelInfo {
                name:        row.relation,
                kind:        row.kind,
                relfilenode: row.relfilenode,
                stats:       PageStats::new(),
            });
    }

    grouped
        .into_iter()
        .map(|(partition_name, tables)| {
            PartInfo {
                name:   partition_name,
                tables: tables
                    .into_iter()
                    .map(|(table_name, relations)| {
                        TableInfo {
                            name: table_name,
                            relations,
                            stats: PageStats::new(),
                        }
                    })
                    .collect(),
                stats:  PageStats::new(),
            }
        })
        .collect()
}


/// Pass 1: probe every relation's segments and sum the results upward. Table
/// and partition stats are sums over the full (pre-filter) child sets.
pub fn probe_hierarchy(
    probe: &PageCacheProbe,
    partitions: &mut [PartInfo],
    database_dir: &Path,
) -> Result<(), Error> {
    let relation_count: usize = partitions
        .iter()
        .map(|p| p.tables.iter().map(|t| t.relations.len()).sum::<usize>())
        .sum();
    info!("probing {} relation(s) under {:?}", relation_count, database_dir);

    let mut probed = 0usize;
    for partition in partitions.iter_mut() {
        for table in partition.tables.iter_mut() {
            for relinfo in table.relations.iter_mut() {
                relinfo.stats = crate::segment::probe_relation_segments(probe, database_dir, relinfo.relfilenode)?;
                table.stats.add(&relinfo.stats);
                debug!(
                    "probed relation {}: {}/{} pages cached",
                    relinfo.name, relinfo.stats.page_cached, relinfo.stats.page_count
                );

                probed += 1;
                if probed % PROGRESS_EVERY == 0 {
                    info!("probed {}/{} relations", probed, relation_count);
                }
            }
            partition.stats.add(&table.stats);
        }
    }

    Ok(())
}


const fn retained(
    page_cached: u64,
    threshold: i64,
) -> bool {
    threshold < 0 || page_cached > threshold as u64
}


/// Pass 2: bottom-up threshold filtering. Children at or below the cached
/// page threshold are removed; parent stats are left as the pre-filter sums
/// so hidden per-relation noise never makes a table's footprint shrink.
pub fn filter_hierarchy(
    partitions: &mut Vec<PartInfo>,
    cached_page_threshold: i64,
) {
    for partition in partitions.iter_mut() {
        for table in partition.tables.iter_mut() {
            table
                .relations
                .retain(|relinfo| retained(relinfo.stats.page_cached, cached_page_threshold));
        }
        partition
            .tables
            .retain(|table| retained(table.stats.page_cached, cached_page_threshold));
    }
    partitions.retain(|partition| retained(partition.stats.page_cached, cached_page_threshold));
}


/// Pass 3a: residency over every regular file in the WAL directory.
/// Subdirectories (archive_status and friends) are skipped.
pub fn probe_wal(
    probe: &PageCacheProbe,
    wal_dir: &Path,
) -> Result<PageStats, Error> {
    let mut stats = PageStats::new();

    let entries =
        std::fs::read_dir(wal_dir).map_err(|err| Error::probing(wal_dir, Error::from(err)))?;
    for entry in entries {
        let entry = entry.map_err(|err| Error::probing(wal_dir, Error::from(err)))?;
        let file_type = entry.file_type().map_err(|err| Error::probing(entry.path(), Error::from(err)))?;
        if !file_type.is_file() {
            continue;
        }
        stats.add(&probe.probe_file(&entry.path())?);
    }

    info!(
        "WAL residency: {}/{} pages cached",
        stats.page_cached, stats.page_count
    );
    Ok(stats)
}


/// Pass 3b: the grand total is the sum of the retained partitions plus the
/// WAL bucket.
pub fn grand_total(
    partitions: &[PartInfo],
    wal: Option<&PageStats>,
) -> PageStats {
    let mut total = PageStats::new();
    for partition in partitions {
        total.add(&partition.stats);
    }
    if let Some(wal) = wal {
        total.add(wal);
    }
    total
}


/// Full aggregation: skeleton, probe, filter, WAL, total.
pub fn aggregate(
    probe: &PageCacheProbe,
    rows: Vec<CatalogRow>,
    options: &AggregateOptions,
) -> Result<Hierarchy, Error> {
    let mut partitions = build_skeleton(rows);
    probe_hierarchy(probe, &mut partitions, &options.database_dir)?;
    filter_hierarchy(&mut partitions, options.cached_page_threshold);

    let wal = match options.wal_dir.as_ref() {
        Some(dir) => Some(probe_wal(probe, dir)?),
        None => None,
    };

    let total = grand_total(&partitions, wal.as_ref());
    Ok(Hierarchy {
        partitions,
        wal,
        total,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::{
        RelKind,
        NO_PARTITION,
    };

    fn stats(
        cached: u64,
        count: u64,
    ) -> PageStats {
        PageStats {
            page_cached: cached,
            page_count: count,
            ..PageStats::new()
        }
    }

    fn relinfo(
        name: &str,
        kind: RelKind,
        cached: u64,
        count: u64,
    ) -> RelInfo {
        RelInfo {
            name: name.to_string(),
            kind,
            relfilenode: 1,
            stats: stats(cached, count),
        }
    }

    /// A partitioned table `p` whose partition holds one table with the
    /// children `p_1`, `p_2` and one index each.
    fn partitioned_fixture() -> Vec<PartInfo> {
        let relations = vec![
            relinfo("p_1", RelKind::Heap, 5, 10),
            relinfo("p_2", RelKind::Heap, 0, 10),
            relinfo("p_1_idx", RelKind::Index, 1, 5),
            relinfo("p_2_idx", RelKind::Index, 0, 5),
        ];
        let mut table = TableInfo {
            name: "p".to_string(),
            relations,
            stats: PageStats::new(),
        };
        for r in table.relations.iter() {
            let s = r.stats.clone();
            table.stats.add(&s);
        }
        let mut partition = PartInfo {
            name:   "p".to_string(),
            tables: vec![table],
            stats:  PageStats::new(),
        };
        let s = partition.tables[0].stats.clone();
        partition.stats.add(&s);
        vec![partition]
    }

    #[test]
    fn test_build_skeleton_groups_by_partition_and_table() {
        let rows = vec![
            CatalogRow {
                partition:   NO_PARTITION.to_string(),
                table:       "users".to_string(),
                relation:    "users".to_string(),
                kind:        RelKind::Heap,
                relfilenode: 16385,
            },
            CatalogRow {
                partition:   NO_PARTITION.to_string(),
                table:       "users".to_string(),
                relation:    "users_pkey".to_string(),
                kind:        RelKind::Index,
                relfilenode: 16390,
            },
            CatalogRow {
                partition:   "events".to_string(),
                table:       "events_2026_07".to_string(),
                relation:    "events_2026_07".to_string(),
                kind:        RelKind::Heap,
                relfilenode: 16400,
            },
        ];

        let partitions = build_skeleton(rows);
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].name, NO_PARTITION);
        assert_eq!(partitions[0].tables.len(), 1);
        assert_eq!(partitions[0].tables[0].relations.len(), 2);
        assert_eq!(partitions[1].name, "events");
    }

    #[test]
    fn test_filter_keeps_prefilter_parent_sums() {
        let mut partitions = partitioned_fixture();
        assert_eq!(partitions[0].stats, stats(6, 30));

        filter_hierarchy(&mut partitions, 0);
        // zero-cached children are gone
        let names: Vec<&str> = partitions[0].tables[0]
            .relations
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["p_1", "p_1_idx"]);
        // the table row still reports its full on-disk footprint
        assert_eq!(partitions[0].tables[0].stats, stats(6, 30));
        assert_eq!(partitions[0].stats, stats(6, 30));
    }

    #[test]
    fn test_filter_drops_rows_at_the_threshold() {
        let mut partitions = partitioned_fixture();
        filter_hierarchy(&mut partitions, 1);

        let names: Vec<&str> = partitions[0].tables[0]
            .relations
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        // p_1_idx has exactly one cached page and is dropped too
        assert_eq!(names, vec!["p_1"]);
        assert_eq!(partitions[0].tables[0].stats, stats(6, 30));
    }

    #[test]
    fn test_negative_threshold_disables_filtering() {
        let mut partitions = partitioned_fixture();
        filter_hierarchy(&mut partitions, -1);
        assert_eq!(partitions[0].tables[0].relations.len(), 4);

        let mut empty = vec![PartInfo {
            name:   "idle".to_string(),
            tables: vec![],
            stats:  PageStats::new(),
        }];
        filter_hierarchy(&mut empty, -1);
        assert_eq!(empty.len(), 1);
        filter_hierarchy(&mut empty, 0);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_grand_total_sums_retained_partitions_and_wal() {
        let mut partitions = partitioned_fixture();
        filter_hierarchy(&mut partitions, 0);

        let wal = stats(8192, 12288);
        let total = grand_total(&partitions, Some(&wal));
        assert_eq!(total.page_cached, 6 + 8192);
        assert_eq!(total.page_count, 30 + 12288);

        let total_no_wal = grand_total(&partitions, None);
        assert_eq!(total_no_wal.page_cached, 6);
    }
}
