//! The four-level hierarchy the engine aggregates over: partitions own
//! tables, tables own relations, relations own on-disk segments (segments
//! are never stored, only probed). Relations that have no partition parent
//! are grouped under the artificial partition named "No Partition".

use std::str::FromStr;

use crate::{
    deps::serde,
    error::Error,
    stats::PageStats,
};


pub const NO_PARTITION: &str = "No Partition";
pub const WAL_LABEL: &str = "WAL";
pub const TOTAL_LABEL: &str = "Total";


/// Catalog relation kinds, plus the synthetic kinds carried by aggregated
/// display rows.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub enum RelKind {
    Heap,
    Index,
    Toast,
    MatView,
    PartitionedTable,
    PartitionedIndex,

    // Artificial kinds for our own row types
    Table,
    Partition,
    Total,
    Wal,
}


impl RelKind {
    pub const fn as_char(&self) -> char {
        match self {
            RelKind::Heap => 'r',
            RelKind::Index => 'i',
            RelKind::Toast => 't',
            RelKind::MatView => 'm',
            RelKind::PartitionedTable => 'p',
            RelKind::PartitionedIndex => 'I',
            RelKind::Table => 'T',
            RelKind::Partition => 'P',
            RelKind::Total => 'S',
            RelKind::Wal => 'W',
        }
    }

    pub const fn display_name(&self) -> &'static str {
        match self {
            RelKind::Heap => "Relation",
            RelKind::Index => "Index",
            RelKind::Toast => "TOAST",
            RelKind::MatView => "Materialised View",
            RelKind::PartitionedTable => "Partitioned Table",
            RelKind::PartitionedIndex => "Partitioned Index",
            RelKind::Table => "Table",
            RelKind::Partition => "Partition",
            RelKind::Total => "Total",
            RelKind::Wal => "WAL",
        }
    }

    pub fn from_kind_char(value: char) -> Result<Self, Error> {
        match value {
            'r' => Ok(RelKind::Heap),
            'i' => Ok(RelKind::Index),
            't' => Ok(RelKind::Toast),
            'm' => Ok(RelKind::MatView),
            'p' => Ok(RelKind::PartitionedTable),
            'I' => Ok(RelKind::PartitionedIndex),
            bad_value => {
                Err(Error::Parse {
                    value:    bad_value.to_string(),
                    typename: std::any::type_name::<RelKind>(),
                    reason:   "value was not one of: r, i, t, m, p, I".to_string(),
                })
            }
        }
    }
}


impl FromStr for RelKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut chars = value.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(kind), None) => RelKind::from_kind_char(kind),
            _ => {
                Err(Error::Parse {
                    value:    value.to_string(),
                    typename: std::any::type_name::<RelKind>(),
                    reason:   "kind must be a single character".to_string(),
                })
            }
        }
    }
}


/// One catalog entry: a heap, an index, a TOAST relation, a materialised
/// view or a partitioned parent. The relfilenode names its files on disk.
#[derive(Clone, Debug)]
pub struct RelInfo {
    pub name:        String,
    pub kind:        RelKind,
    pub relfilenode: u32,
    pub stats:       PageStats,
}


/// A base relation grouped with its indexes, TOAST relation and TOAST
/// index. The stats are the pre-filter sum over the original relation set;
/// threshold filtering deliberately does not recompute them so a table's
/// reported residency keeps matching its on-disk footprint.
#[derive(Clone, Debug, Default)]
pub struct TableInfo {
    pub name:      String,
    pub relations: Vec<RelInfo>,
    pub stats:     PageStats,
}


#[derive(Clone, Debug, Default)]
pub struct PartInfo {
    pub name:   String,
    pub tables: Vec<TableInfo>,
    pub stats:  PageStats,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in &[
            RelKind::Heap,
            RelKind::Index,
            RelKind::Toast,
            RelKind::MatView,
            RelKind::PartitionedTable,
            RelKind::PartitionedIndex,
        ] {
            assert_eq!(RelKind::from_kind_char(kind.as_char()).unwrap(), *kind);
        }
    }

    #[test]
    fn test_kind_parse_rejects_garbage() {
        assert!("q".parse::<RelKind>().is_err());
        assert!("rr".parse::<RelKind>().is_err());
        assert!("".parse::<RelKind>().is_err());
        assert_eq!("I".parse::<RelKind>().unwrap(), RelKind::PartitionedIndex);
    }

    #[test]
    fn test_synthetic_kind_names() {
        assert_eq!(RelKind::Table.display_name(), "Table");
        assert_eq!(RelKind::Total.as_char(), 'S');
        assert_eq!(RelKind::Wal.display_name(), "WAL");
    }
}
