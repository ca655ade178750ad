use std::{
    fs::File,
    os::unix::io::AsRawFd,
    path::{
        Path,
        PathBuf,
    },
    ptr::NonNull,
};

use crate::{
    deps::{
        libc,
        log::{
            debug,
            warn,
        },
        nix::sys::mman::{
            madvise,
            mmap,
            munmap,
            MapFlags,
            MmapAdvise,
            ProtFlags,
        },
    },
    error::Error,
};


/// Number of pages needed to cover `len` bytes.
pub const fn page_span(
    len: u64,
    page_size: u64,
) -> u64 {
    (len + page_size - 1) / page_size
}


/// A read-only, shared, non-populating mapping of an open file, alive only
/// for the duration of one probe. No population hint is passed to mmap and
/// the mapping is never read sequentially, so creating it does not disturb
/// the residency state it is about to measure.
///
/// The mapping is released on drop. Callers that go on to read
/// /proc/kpageflags must drop the mapping first; frame flags read while the
/// mapping is still alive can be stale for pages in transition.
pub struct FileMapping {
    path: PathBuf,
    base: NonNull<libc::c_void>,
    len:  usize,
}


impl FileMapping {
    pub fn map(
        path: &Path,
        file: &File,
        len: usize,
    ) -> Result<Self, Error> {
        debug!("mapping file: {:?} ({} bytes)", path, len);

        let base = unsafe {
            mmap(
                std::ptr::null_mut(),
                len,
                ProtFlags::PROT_READ,
                MapFlags::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )?
        };

        Ok(Self {
            path: path.to_path_buf(),
            // mmap never returns null on success
            base: unsafe { NonNull::new_unchecked(base) },
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// The page-aligned virtual address of the mapping, used to index
    /// /proc/self/pagemap.
    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Ask the kernel which pages of the mapping are resident. One byte per
    /// page; the low bit is set for resident pages.
    pub fn residency(
        &self,
        page_size: u64,
    ) -> Result<Vec<u8>, Error> {
        let mut vec = vec![0u8; page_span(self.len as u64, page_size) as usize];

        let ret = unsafe {
            libc::mincore(
                self.base.as_ptr(),
                self.len,
                vec.as_mut_ptr() as *mut libc::c_uchar,
            )
        };
        if ret != 0 {
            return Err(Error::from(std::io::Error::last_os_error()));
        }

        Ok(vec)
    }

    pub fn advise(
        &self,
        advice: MmapAdvise,
    ) -> Result<(), Error> {
        unsafe {
            madvise(self.base.as_ptr(), self.len, advice)?;
        }
        Ok(())
    }

    /// Fault a page-table entry into existence for every already-resident
    /// page by reading a single byte from it. The caller must have switched
    /// the mapping to MADV_RANDOM first: the reads must not trigger
    /// read-ahead, or the residency just measured would be falsified.
    pub fn touch_resident(
        &self,
        residency: &[u8],
        page_size: u64,
    ) {
        let base = self.base.as_ptr() as *const u8;
        for (index, byte) in residency.iter().enumerate() {
            if byte & 0x1 != 0 {
                unsafe {
                    std::ptr::read_volatile(base.add(index * page_size as usize));
                }
            }
        }
    }
}


impl Drop for FileMapping {
    fn drop(&mut self) {
        debug!("unmapping file: {:?}", self.path);
        if let Err(err) = unsafe { munmap(self.base.as_ptr(), self.len) } {
            warn!("munmap({:?}, {}) failed: {}", self.path, self.len, err);
        }
    }
}


impl std::fmt::Debug for FileMapping {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        f.debug_struct("FileMapping")
            .field("path", &self.path)
            .field("ptr", &self.base)
            .field("len", &self.len)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_page_span() {
        assert_eq!(page_span(1, 4096), 1);
        assert_eq!(page_span(4096, 4096), 1);
        assert_eq!(page_span(4097, 4096), 2);
        assert_eq!(page_span(40 << 10, 4096), 10);
    }

    #[test]
    fn test_map_and_residency() {
        let page_size = crate::probe::system_page_size();
        let path = std::env::temp_dir().join(format!("relcache-mmap-test-{}", std::process::id()));

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&vec![0xaau8; 3 * page_size as usize]).unwrap();
        file.sync_all().unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let len = file.metadata().unwrap().len() as usize;
        let mapping = FileMapping::map(&path, &file, len).unwrap();

        assert_eq!(mapping.len(), len);
        assert_eq!(mapping.base_addr() % page_size as usize, 0);

        let vec = mapping.residency(page_size).unwrap();
        assert_eq!(vec.len(), 3);

        mapping.advise(MmapAdvise::MADV_RANDOM).unwrap();
        mapping.touch_resident(&vec, page_size);
        mapping.advise(MmapAdvise::MADV_SEQUENTIAL).unwrap();

        drop(mapping);
        std::fs::remove_file(&path).unwrap();
    }
}
