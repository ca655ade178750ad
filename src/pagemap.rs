//! ```text
//! /proc/pid/pagemap.  This file lets a userspace process find out which
//! physical frame each virtual page is mapped to.  It contains one 64-bit
//! value for each virtual page, containing the following data (from
//! fs/proc/task_mmu.c, above pagemap_read):
//!
//!  * Bits 0-54  page frame number (PFN) if present
//!  * Bits 0-4   swap type if swapped
//!  * Bits 5-54  swap offset if swapped
//!  * Bit  55    pte is soft-dirty (see Documentation/vm/soft-dirty.txt)
//!  * Bit  56    page exclusively mapped (since 4.2)
//!  * Bits 57-60 zero
//!  * Bit  61    page is file-page or shared-anon (since 3.5)
//!  * Bit  62    page swapped
//!  * Bit  63    page present
//!
//! Since Linux 4.0 only users with the CAP_SYS_ADMIN capability can get PFNs.
//! In 4.0 and 4.1 opens by unprivileged fail with -EPERM.  Starting from
//! 4.2 the PFN field is zeroed if the user does not have CAP_SYS_ADMIN.
//! Reason: information about PFNs helps in exploiting Rowhammer vulnerability.
//! ```

use std::{
    fmt,
    num::NonZeroU64,
};

use crate::deps::{
    derive_more,
    serde,
};


#[derive(
    Copy,
    Clone,
    PartialOrd,
    PartialEq,
    Eq,
    Ord,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
    derive_more::Binary,
    derive_more::LowerHex,
    derive_more::UpperHex,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
pub struct PagemapEntry(u64);


impl PagemapEntry {
    const FILE_BIT: u32 = 61;
    const MMAP_EXCLUSIVE_BIT: u32 = 56;
    const PFN_BITS: u32 = 55;
    const PRESENT_BIT: u32 = 63;
    const SOFT_DIRTY_BIT: u32 = 55;
    const SWAP_BIT: u32 = 62;

    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// The physical frame backing this virtual page. `None` either when the
    /// page is not mapped or when the kernel zeroes the field for readers
    /// without CAP_SYS_ADMIN; the probe disambiguates the two empirically.
    pub fn page_frame_number(&self) -> Option<NonZeroU64> {
        const MASK: u64 = u64::max_value().wrapping_shr(u64::max_value().count_ones() - PagemapEntry::PFN_BITS);
        NonZeroU64::new(self.0 & MASK)
    }

    pub const fn is_soft_dirty(&self) -> bool {
        const MASK: u64 = 1 << PagemapEntry::SOFT_DIRTY_BIT;
        self.0 & MASK != 0
    }

    pub const fn is_mmap_exclusive(&self) -> bool {
        const MASK: u64 = 1 << PagemapEntry::MMAP_EXCLUSIVE_BIT;
        self.0 & MASK != 0
    }

    pub const fn is_file_backed(&self) -> bool {
        const MASK: u64 = 1 << PagemapEntry::FILE_BIT;
        self.0 & MASK != 0
    }

    pub const fn is_swapped(&self) -> bool {
        const MASK: u64 = 1 << PagemapEntry::SWAP_BIT;
        self.0 & MASK != 0
    }

    pub const fn is_present(&self) -> bool {
        const MASK: u64 = 1 << PagemapEntry::PRESENT_BIT;
        self.0 & MASK != 0
    }
}


impl fmt::Debug for PagemapEntry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("PagemapEntry")
            .field("value", &crate::fmt::Binary(&self.0))
            .field("page_frame_number", &self.page_frame_number())
            .field("soft_dirty", &self.is_soft_dirty())
            .field("mmap_exclusive", &self.is_mmap_exclusive())
            .field("file_backed", &self.is_file_backed())
            .field("swapped", &self.is_swapped())
            .field("present", &self.is_present())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pfn_mask() {
        let pme = PagemapEntry::new((1 << 63) | 0x1234);
        assert_eq!(pme.page_frame_number().map(NonZeroU64::get), Some(0x1234));
        assert!(pme.is_present());

        // PFN field zeroed for unprivileged readers
        let zeroed = PagemapEntry::new(1 << 63);
        assert_eq!(zeroed.page_frame_number(), None);
        assert!(zeroed.is_present());
    }

    #[test]
    fn test_flag_bits() {
        let pme = PagemapEntry::new((1 << 55) | (1 << 56) | (1 << 61) | (1 << 62));
        assert!(pme.is_soft_dirty());
        assert!(pme.is_mmap_exclusive());
        assert!(pme.is_file_backed());
        assert!(pme.is_swapped());
        assert!(!pme.is_present());
    }
}
