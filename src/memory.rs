//! System-wide cached-memory figure, used as the denominator of the %Total
//! column. Sources are tried in order: cgroup v2 (`file`, bytes), cgroup v1
//! (`cache`, bytes), /proc/meminfo (`Cached:`, kB). The first readable
//! source wins; when none is readable the column degrades to zero.

use std::path::Path;

use crate::{
    deps::log::debug,
    error::Error,
};


/// Value of the first line of `text` whose leading field equals `key`.
fn value_for_key(
    text: &str,
    key: &str,
) -> Option<u64> {
    for line in text.lines() {
        let mut fields = line.split_ascii_whitespace();
        if fields.next() != Some(key) {
            continue;
        }
        return fields.next().and_then(|raw| raw.parse::<u64>().ok());
    }
    None
}


fn value_from_file(
    path: &Path,
    key: &str,
) -> Option<u64> {
    let text = std::fs::read_to_string(path).ok()?;
    let value = value_for_key(&text, key);
    debug!("cached memory source {:?} key {:?}: {:?}", path, key, value);
    value
}


/// Cached memory in kilobytes.
pub fn cached_memory_kb() -> Result<u64, Error> {
    // cgroup v2 reports bytes
    if let Some(bytes) = value_from_file(crate::paths::cgroup_v2_memory_stat_path(), "file") {
        return Ok(bytes / 1024);
    }

    // cgroup v1 reports bytes
    if let Some(bytes) = value_from_file(crate::paths::cgroup_v1_memory_stat_path(), "cache") {
        return Ok(bytes / 1024);
    }

    // meminfo reports kB
    if let Some(kb) = value_from_file(crate::paths::proc_meminfo_path(), "Cached:") {
        return Ok(kb);
    }

    Err(Error::CachedMemoryUnavailable)
}


/// Cached memory in pages, for comparison against `PageStats` counts.
pub fn cached_memory_pages(page_size: u64) -> Result<u64, Error> {
    Ok(cached_memory_kb()? * 1024 / page_size)
}


#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:       32780168 kB\n\
                           MemFree:         1326580 kB\n\
                           Cached:          8389120 kB\n\
                           SwapCached:            0 kB\n";

    const CGROUP_V2: &str = "anon 1216512\n\
                             file 28672000\n\
                             kernel 12288\n";

    #[test]
    fn test_value_for_key() {
        assert_eq!(value_for_key(MEMINFO, "Cached:"), Some(8389120));
        assert_eq!(value_for_key(MEMINFO, "MemFree:"), Some(1326580));
        assert_eq!(value_for_key(MEMINFO, "Cached"), None);
        assert_eq!(value_for_key(CGROUP_V2, "file"), Some(28672000));
        assert_eq!(value_for_key("", "file"), None);
    }

    #[test]
    fn test_kb_to_pages() {
        // 8 GiB of cached memory on a 4 KiB page system
        let kb: u64 = 8 * 1024 * 1024;
        assert_eq!(kb * 1024 / 4096, 2 * 1024 * 1024);
    }
}
