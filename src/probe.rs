//! The residency probe. For one file at a time: map it without populating
//! anything, ask mincore which pages are resident, then (on Linux, when the
//! process is privileged enough) walk /proc/self/pagemap and
//! /proc/kpageflags to attach a kernel flag word to every resident page.
//!
//! The probe keeps a strict order per file: map, mincore, touch resident
//! pages under MADV_RANDOM, read the pagemap entries, unmap, and only then
//! read kpageflags. Reading frame flags while the mapping is still alive can
//! observe stale bits for pages in transition, so the unmap is a correctness
//! step, not cleanup.

use std::{
    convert::TryFrom,
    fs::File,
    path::Path,
    sync::atomic::{
        AtomicBool,
        Ordering,
    },
};

use crate::{
    deps::nix::sys::mman::MmapAdvise,
    deps::log::{
        debug,
        warn,
    },
    error::Error,
    kpageflags::PageFlagWord,
    mmapfile::FileMapping,
    pagemap::PagemapEntry,
    stats::PageStats,
};


macro_rules! warn_once {
        ($name:ident; $($arg:tt)+) => {{
            use $crate::deps::lazy_static::lazy_static;
            use $crate::deps::log::warn;

            lazy_static! {
                static ref $name: ::std::sync::Once = ::std::sync::Once::new();
            }

            (&*($name)).call_once(|| {
                warn!("[WARN_ONCE] {}", format_args!($($arg)*))
            })
       }};
}


/// Whether this process may read real PFNs out of /proc/self/pagemap. The
/// kernel zeroes the PFN field for readers without CAP_SYS_ADMIN instead of
/// failing the read, so the loss of privilege is detected empirically: the
/// first resident page whose entry carries a zero PFN flips this to false
/// for the remainder of the run. Monotonic true-to-false; a race between
/// probing threads only ever lands on the safe state.
static CAN_READ_PAGE_FLAGS: AtomicBool = AtomicBool::new(true);

/// Set once a non-zero PFN has been observed. After that, a zero PFN on a
/// resident page means the page was evicted between mincore and the pagemap
/// read, not that the capability is missing.
static PFN_OBSERVED: AtomicBool = AtomicBool::new(false);


pub fn system_page_size() -> u64 {
    use crate::deps::nix::unistd::{
        sysconf,
        SysconfVar,
    };

    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => size as u64,
        _ => 4096,
    }
}


/// Probe state shared across every file of a run: the long-lived pagemap and
/// kpageflags handles and the flag-rendering mode. Both files are read
/// positionally, so a single handle serves concurrent readers.
pub struct PageCacheProbe {
    pagemap:    Option<File>,
    kpageflags: Option<File>,
    raw_flags:  bool,
    page_size:  u64,
}


impl PageCacheProbe {
    /// Opens the flag-pipeline files. Failure to open either one is not
    /// fatal: residency counting still works everywhere, only the per-page
    /// flag histograms are disabled (warned once).
    pub fn new(raw_flags: bool) -> Self {
        let (pagemap, kpageflags) = if cfg!(target_os = "linux") {
            let pagemap = Self::open_flag_file(crate::paths::proc_self_pagemap_path());
            let kpageflags = Self::open_flag_file(crate::paths::proc_kpageflags_path());
            (pagemap, kpageflags)
        } else {
            (None, None)
        };

        Self {
            pagemap,
            kpageflags,
            raw_flags,
            page_size: system_page_size(),
        }
    }

    fn open_flag_file(path: &Path) -> Option<File> {
        match crate::io::open_readonly(path) {
            Ok(file) => Some(file),
            Err(err) => {
                warn_once!(FLAG_PIPELINE_DISABLED;
                    "page flags disabled, unable to read {:?}, reason: {:?}",
                    path,
                    err
                );
                None
            }
        }
    }

    pub const fn page_size(&self) -> u64 {
        self.page_size
    }

    fn flags_enabled(&self) -> bool {
        self.pagemap.is_some() && self.kpageflags.is_some() && CAN_READ_PAGE_FLAGS.load(Ordering::Relaxed)
    }

    /// Residency and flag stats for a single on-disk file. An empty file
    /// probes to the identity stats. Any syscall failure is fatal for the
    /// run and carries the offending path.
    pub fn probe_file(
        &self,
        path: &Path,
    ) -> Result<PageStats, Error> {
        let file = crate::io::open_readonly(path).map_err(|err| Error::probing(path, Error::from(err)))?;
        let size = file
            .metadata()
            .map_err(|err| Error::probing(path, Error::from(err)))?
            .len();

        if size == 0 {
            return Ok(PageStats::new());
        }

        self.probe_open_file(path, &file, size).map_err(|err| Error::probing(path, err))
    }

    fn probe_open_file(
        &self,
        path: &Path,
        file: &File,
        size: u64,
    ) -> Result<PageStats, Error> {
        let mapping = FileMapping::map(path, file, usize::try_from(size)?)?;
        let residency = mapping.residency(self.page_size)?;

        let mut stats = PageStats::new();
        stats.page_count = residency.len() as u64;
        stats.page_cached = residency.iter().filter(|byte| *byte & 0x1 != 0).count() as u64;

        let entries = if stats.page_cached > 0 && self.flags_enabled() {
            Some(self.read_pagemap_entries(&mapping, &residency)?)
        } else {
            None
        };

        // Unmap before touching kpageflags. Mandatory ordering.
        drop(mapping);

        if let Some(entries) = entries {
            self.fill_flag_histogram(&mut stats, &residency, &entries)?;
        }

        debug!(
            "probed {:?}: {}/{} pages cached",
            path, stats.page_cached, stats.page_count
        );
        Ok(stats)
    }

    /// Make the kernel materialise page-table entries for the resident pages
    /// and read their pagemap records. The mapping is advised MADV_RANDOM
    /// around the touching loop so the one-byte reads cannot trigger
    /// read-ahead, which would fault in pages that mincore just reported
    /// absent.
    fn read_pagemap_entries(
        &self,
        mapping: &FileMapping,
        residency: &[u8],
    ) -> Result<Vec<PagemapEntry>, Error> {
        // flags_enabled() was checked by the caller
        let pagemap = match self.pagemap.as_ref() {
            Some(file) => file,
            None => return Ok(Vec::new()),
        };

        mapping.advise(MmapAdvise::MADV_RANDOM)?;
        mapping.touch_resident(residency, self.page_size);
        mapping.advise(MmapAdvise::MADV_SEQUENTIAL)?;

        let index = mapping.base_addr() as u64 / self.page_size;
        let words = crate::io::read_u64_slice_at(pagemap, residency.len(), index)?;

        Ok(words.into_iter().map(PagemapEntry::new).collect())
    }

    fn fill_flag_histogram(
        &self,
        stats: &mut PageStats,
        residency: &[u8],
        entries: &[PagemapEntry],
    ) -> Result<(), Error> {
        let kpageflags = match self.kpageflags.as_ref() {
            Some(file) => file,
            None => return Ok(()),
        };

        for (index, byte) in residency.iter().enumerate() {
            if byte & 0x1 == 0 {
                continue;
            }

            let pme = entries[index];
            let pfn = match pme.page_frame_number() {
                Some(pfn) => {
                    PFN_OBSERVED.store(true, Ordering::Relaxed);
                    pfn
                }
                None if PFN_OBSERVED.load(Ordering::Relaxed) => {
                    // Resident at mincore time, gone by the pagemap read.
                    continue;
                }
                None => {
                    CAN_READ_PAGE_FLAGS.store(false, Ordering::Relaxed);
                    warn_once!(PFN_CAPABILITY_MISSING;
                        "pagemap returned a zero PFN for a resident page; \
                         reading page flags requires CAP_SYS_ADMIN, flag histograms disabled"
                    );
                    return Ok(());
                }
            };

            let raw = crate::io::read_u64_at(kpageflags, pfn.get())?;
            let word = if self.raw_flags {
                PageFlagWord::new(raw).expand_overloaded(pme)
            } else {
                PageFlagWord::new(raw).well_known()
            };
            stats.record_flags(word);
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn fixture(
        name: &str,
        len: usize,
    ) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("relcache-probe-{}-{}", name, std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&vec![0x42u8; len]).unwrap();
        file.sync_all().unwrap();
        path
    }

    #[test]
    fn test_empty_file_probes_to_identity() {
        let path = fixture("empty", 0);
        let probe = PageCacheProbe::new(false);

        let stats = probe.probe_file(&path).unwrap();
        assert_eq!(stats, PageStats::new());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_probe_counts_are_bounded() {
        let probe = PageCacheProbe::new(false);
        let page_size = probe.page_size();
        let path = fixture("bounded", 4 * page_size as usize + 1);

        let stats = probe.probe_file(&path).unwrap();
        assert_eq!(stats.page_count, 5);
        assert!(stats.page_cached <= stats.page_count);
        let flagged: u64 = stats.flag_histogram.values().sum();
        assert!(flagged <= stats.page_cached);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_a_probe_error() {
        let probe = PageCacheProbe::new(false);
        let err = probe.probe_file(std::path::Path::new("/nonexistent/relcache-such-file")).unwrap_err();
        match err {
            Error::Probe { path, .. } => {
                assert_eq!(path, std::path::Path::new("/nonexistent/relcache-such-file"))
            }
            other => panic!("expected a probe error, got {:?}", other),
        }
    }
}
