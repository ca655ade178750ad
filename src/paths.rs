use std::path::{
    Path,
    PathBuf,
};


pub fn proc_self_pagemap_path() -> &'static Path {
    Path::new("/proc/self/pagemap")
}


pub fn proc_kpageflags_path() -> &'static Path {
    Path::new("/proc/kpageflags")
}


pub fn proc_meminfo_path() -> &'static Path {
    Path::new("/proc/meminfo")
}


pub fn cgroup_v2_memory_stat_path() -> &'static Path {
    Path::new("/sys/fs/cgroup/memory.stat")
}


pub fn cgroup_v1_memory_stat_path() -> &'static Path {
    Path::new("/sys/fs/cgroup/memory/memory.stat")
}


/// Directory holding the relation segments of one database.
pub fn database_dir(
    pg_data: &Path,
    dbid: u32,
) -> PathBuf {
    pg_data.join("base").join(dbid.to_string())
}


pub fn wal_dir(pg_data: &Path) -> PathBuf {
    pg_data.join("pg_wal")
}


/// Segment files are named `<relfilenode>` for the base segment and
/// `<relfilenode>.<segno>` afterwards.
pub fn segment_path(
    database_dir: &Path,
    relfilenode: u32,
    segno: u32,
) -> PathBuf {
    if segno == 0 {
        database_dir.join(relfilenode.to_string())
    } else {
        database_dir.join(format!("{}.{}", relfilenode, segno))
    }
}


#[test]
fn test_segment_path() {
    let dir = Path::new("/data/base/16384");
    assert_eq!(segment_path(dir, 2619, 0), Path::new("/data/base/16384/2619"));
    assert_eq!(segment_path(dir, 2619, 2), Path::new("/data/base/16384/2619.2"));
}
