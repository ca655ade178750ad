//! The catalog side of the run. The engine itself never issues SQL: it
//! consumes a flat sequence of (partition, table, relation, kind,
//! relfilenode) rows from a `Catalog` implementation and builds its
//! hierarchy from those.

use std::convert::TryFrom;

use crate::{
    deps::postgres,
    error::Error,
    relation::RelKind,
};


/// One row of the hierarchy skeleton. `partition` is "No Partition" for
/// relations without a partition parent. `relfilenode` is never zero: the
/// catalog substitutes the relation OID when pg_class reports zero (mapped
/// catalogs).
#[derive(Clone, Debug)]
pub struct CatalogRow {
    pub partition:   String,
    pub table:       String,
    pub relation:    String,
    pub kind:        RelKind,
    pub relfilenode: u32,
}


pub trait Catalog {
    /// OID and name of the database the session is connected to.
    fn current_database(&mut self) -> Result<(u32, String), Error>;

    /// The hierarchy skeleton, filtered on the catalog side: relations with
    /// `relpages <= page_threshold` are excluded (a negative threshold
    /// excludes nothing), and a non-empty `relations` list restricts the
    /// result to the named tables and their attached relations.
    fn relation_hierarchy(
        &mut self,
        relations: &[String],
        page_threshold: i64,
    ) -> Result<Vec<CatalogRow>, Error>;
}


/// Groups every relation with its owning table (indexes through pg_index,
/// TOAST relations and TOAST indexes through reltoastrelid) and the table
/// with its partition parent through pg_inherits, both for table partitions
/// and index partitions.
const HIERARCHY_SQL: &str = "\
SELECT COALESCE(parent_idx.relname, parent.relname, 'No Partition'), \
       COALESCE(PPTI.relname, PT.relname, PI.relname, C.relname) AS t, \
       C.relname, \
       C.relkind::text, \
       COALESCE(NULLIF(C.relfilenode, 0), C.oid) \
FROM pg_class C \
LEFT JOIN pg_index ON pg_index.indexrelid = C.oid \
LEFT JOIN pg_class PI ON pg_index.indrelid = PI.oid AND PI.relkind = 'r' \
LEFT JOIN pg_class PT ON C.oid = PT.reltoastrelid \
LEFT JOIN pg_inherits inh ON inh.inhrelid = C.oid \
LEFT JOIN pg_class parent ON inh.inhparent = parent.oid \
LEFT JOIN pg_inherits inh_idx ON inh_idx.inhrelid = PI.oid \
LEFT JOIN pg_class parent_idx ON inh_idx.inhparent = parent_idx.oid \
LEFT JOIN pg_class PTI ON pg_index.indrelid = PTI.oid AND PTI.relkind = 't' \
LEFT JOIN pg_class PPTI ON PPTI.reltoastrelid = PTI.oid \
WHERE ($1 OR COALESCE(PPTI.relname, PT.relname, PI.relname, C.relname)::text = ANY($2)) \
  AND C.relpages > $3 \
  AND C.relkind = ANY('{r,i,t,m,p,I}')";

const DATABASE_SQL: &str = "SELECT oid, datname::text FROM pg_database WHERE datname = current_database()";


pub struct PgCatalog {
    client: postgres::Client,
}


impl PgCatalog {
    pub fn connect(connect_str: &str) -> Result<Self, Error> {
        let client = postgres::Client::connect(connect_str, postgres::NoTls)?;
        Ok(Self { client })
    }
}


impl Catalog for PgCatalog {
    fn current_database(&mut self) -> Result<(u32, String), Error> {
        let row = self.client.query_one(DATABASE_SQL, &[])?;
        Ok((row.get::<_, u32>(0), row.get::<_, String>(1)))
    }

    fn relation_hierarchy(
        &mut self,
        relations: &[String],
        page_threshold: i64,
    ) -> Result<Vec<CatalogRow>, Error> {
        let unfiltered = relations.is_empty();
        let threshold = i32::try_from(page_threshold.max(i64::from(i32::min_value())))?;

        let rows = self
            .client
            .query(HIERARCHY_SQL, &[&unfiltered, &relations.to_vec(), &threshold])?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let kind: String = row.get(3);
            out.push(CatalogRow {
                partition:   row.get(0),
                table:       row.get(1),
                relation:    row.get(2),
                kind:        kind.parse::<RelKind>()?,
                relfilenode: row.get(4),
            });
        }
        Ok(out)
    }
}
