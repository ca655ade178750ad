//! Relations larger than the segment size are split into numbered files:
//! `<relfilenode>`, `<relfilenode>.1`, `<relfilenode>.2`, and so on. The
//! walker probes consecutive segments until the first missing one and sums
//! the per-segment stats into the relation's accumulator.

use std::path::Path;

use crate::{
    deps::log::debug,
    error::Error,
    probe::PageCacheProbe,
    stats::PageStats,
};


/// Probe every on-disk segment of one relation. A missing base segment is an
/// error (a relation present in the catalog always has one); a missing
/// higher segment simply terminates the walk. Any other I/O failure is fatal
/// for the relation.
pub fn probe_relation_segments(
    probe: &PageCacheProbe,
    database_dir: &Path,
    relfilenode: u32,
) -> Result<PageStats, Error> {
    let mut stats = PageStats::new();

    for segno in 0.. {
        let path = crate::paths::segment_path(database_dir, relfilenode, segno);

        match std::fs::metadata(&path) {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && segno > 0 => {
                debug!("relation {} has {} segment(s)", relfilenode, segno);
                break;
            }
            Err(err) => return Err(Error::probing(path, Error::from(err))),
        }

        stats.add(&probe.probe_file(&path)?);
    }

    Ok(stats)
}


#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(
        dir: &Path,
        name: &str,
        len: usize,
    ) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(&vec![0u8; len]).unwrap();
        file.sync_all().unwrap();
    }

    fn fixture_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("relcache-seg-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_walk_accumulates_segments() {
        let probe = PageCacheProbe::new(false);
        let page = probe.page_size() as usize;
        let dir = fixture_dir("walk");

        write_file(&dir, "100", page);
        write_file(&dir, "100.1", 2 * page);
        // 100.2 is deliberately absent, 100.3 must never be reached
        write_file(&dir, "100.3", 4 * page);

        let stats = probe_relation_segments(&probe, &dir, 100).unwrap();
        assert_eq!(stats.page_count, 3);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_base_segment_is_an_error() {
        let probe = PageCacheProbe::new(false);
        let dir = fixture_dir("nobase");

        let err = probe_relation_segments(&probe, &dir, 4242).unwrap_err();
        match err {
            Error::Probe { path, .. } => assert!(path.ends_with("4242")),
            other => panic!("expected a probe error, got {:?}", other),
        }

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
