//! ```text
//!  * /proc/kpageflags.  This file contains a 64-bit set of flags for each
//!    page, indexed by PFN.
//!
//!    The flags are (from fs/proc/page.c, above kpageflags_read):
//!
//!      0. LOCKED
//!      1. ERROR
//!      2. REFERENCED
//!      3. UPTODATE
//!      4. DIRTY
//!      5. LRU
//!      6. ACTIVE
//!      7. SLAB
//!      8. WRITEBACK
//!      9. RECLAIM
//!     10. BUDDY
//!     11. MMAP
//!     12. ANON
//!     13. SWAPCACHE
//!     14. SWAPBACKED
//!     15. COMPOUND_HEAD
//!     16. COMPOUND_TAIL
//!     17. HUGE
//!     18. UNEVICTABLE
//!     19. HWPOISON
//!     20. NOPAGE
//!     21. KSM
//!     22. THP
//!     23. OFFLINE
//!     24. ZERO_PAGE
//!     25. IDLE
//!     26. PGTABLE
//!
//!    Bits 32-47 are the kernel-internal flags exported only to hackers
//!    (reserved, mlocked, owner_2, private, private_2, owner_private, arch,
//!    uncached, softdirty, arch_2). The tools/mm/page-types tool additionally
//!    synthesizes anon_exclusive (47), readahead (48), slub_frozen (50),
//!    slub_debug (51) and mirrors the pagemap file/swap/mmap-exclusive bits
//!    into positions 61-63; several kernel flags are overloaded and have to
//!    be rewritten before they make sense to a reader.
//! ```
use std::fmt;

use crate::{
    deps::{
        derive_more,
        serde,
    },
    pagemap::PagemapEntry,
};


/// One raw (or expanded) 64-bit flag word read from /proc/kpageflags.
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
pub struct PageFlagWord(u64);


impl PageFlagWord {
    pub const ACTIVE_BIT: u32 = 6;
    pub const ANON_BIT: u32 = 12;
    pub const ANON_EXCLUSIVE_BIT: u32 = 47;
    pub const ARCH_2_BIT: u32 = 41;
    pub const ARCH_BIT: u32 = 38;
    pub const BUDDY_BIT: u32 = 10;
    pub const COMPOUND_HEAD_BIT: u32 = 15;
    pub const COMPOUND_TAIL_BIT: u32 = 16;
    pub const DIRTY_BIT: u32 = 4;
    pub const ERROR_BIT: u32 = 1;
    pub const FILE_BIT: u32 = 61;
    pub const HUGE_BIT: u32 = 17;
    pub const HWPOISON_BIT: u32 = 19;
    pub const IDLE_BIT: u32 = 25;
    pub const KSM_BIT: u32 = 21;
    pub const LOCKED_BIT: u32 = 0;
    pub const LRU_BIT: u32 = 5;
    pub const MLOCKED_BIT: u32 = 33;
    pub const MMAP_BIT: u32 = 11;
    pub const MMAP_EXCLUSIVE_BIT: u32 = 63;
    pub const NOPAGE_BIT: u32 = 20;
    pub const OFFLINE_BIT: u32 = 23;
    pub const OWNER_2_BIT: u32 = 34;
    pub const OWNER_PRIVATE_BIT: u32 = 37;
    pub const PGTABLE_BIT: u32 = 26;
    pub const PRIVATE_2_BIT: u32 = 36;
    pub const PRIVATE_BIT: u32 = 35;
    pub const READAHEAD_BIT: u32 = 48;
    pub const RECLAIM_BIT: u32 = 9;
    pub const REFERENCED_BIT: u32 = 2;
    pub const RESERVED_BIT: u32 = 32;
    pub const SLAB_BIT: u32 = 7;
    pub const SLUB_DEBUG_BIT: u32 = 51;
    pub const SLUB_FROZEN_BIT: u32 = 50;
    pub const SOFTDIRTY_BIT: u32 = 40;
    pub const SWAPBACKED_BIT: u32 = 14;
    pub const SWAPCACHE_BIT: u32 = 13;
    pub const SWAP_BIT: u32 = 62;
    pub const THP_BIT: u32 = 22;
    pub const UNCACHED_BIT: u32 = 39;
    pub const UNEVICTABLE_BIT: u32 = 18;
    pub const UPTODATE_BIT: u32 = 3;
    pub const WRITEBACK_BIT: u32 = 8;
    pub const ZERO_PAGE_BIT: u32 = 24;

    /// Bits 32..47, present in the raw word but meaningless to most readers.
    pub const HACKER_BITS: u64 = 0xffff << 32;

    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    pub const fn is_set(
        &self,
        bit: u32,
    ) -> bool {
        self.0 & (1u64 << bit) != 0
    }

    /// Reduction used in non-raw mode: the kernel-internal hacker bits are
    /// masked off before rendering so equivalent pages collapse into one
    /// histogram bucket.
    pub const fn well_known(self) -> Self {
        Self(self.0 & !PageFlagWord::HACKER_BITS)
    }

    /// Raw-mode rewrite of overloaded kernel flags, additionally folding in
    /// the pagemap entry bits, following tools/mm/page-types:
    ///
    /// * anonymous pages use PG_owner_2 for anon_exclusive
    /// * SLUB overloads PG_active and PG_error for slub_frozen/slub_debug
    /// * PG_reclaim doubles as PG_readahead outside of writeback
    pub fn expand_overloaded(
        self,
        pme: PagemapEntry,
    ) -> Self {
        let mut flags = self.0;

        if flags & (1 << PageFlagWord::ANON_BIT) != 0 && flags & (1 << PageFlagWord::OWNER_2_BIT) != 0 {
            flags ^= (1 << PageFlagWord::OWNER_2_BIT) | (1 << PageFlagWord::ANON_EXCLUSIVE_BIT);
        }

        if flags & (1 << PageFlagWord::SLAB_BIT) != 0 {
            if flags & (1 << PageFlagWord::ACTIVE_BIT) != 0 {
                flags ^= (1 << PageFlagWord::ACTIVE_BIT) | (1 << PageFlagWord::SLUB_FROZEN_BIT);
            }
            if flags & (1 << PageFlagWord::ERROR_BIT) != 0 {
                flags ^= (1 << PageFlagWord::ERROR_BIT) | (1 << PageFlagWord::SLUB_FROZEN_BIT);
            }
        }

        let reclaim_or_writeback = (1 << PageFlagWord::RECLAIM_BIT) | (1 << PageFlagWord::WRITEBACK_BIT);
        if flags & reclaim_or_writeback == (1 << PageFlagWord::RECLAIM_BIT) {
            flags ^= (1 << PageFlagWord::RECLAIM_BIT) | (1 << PageFlagWord::READAHEAD_BIT);
        }

        if pme.is_soft_dirty() {
            flags |= 1 << PageFlagWord::SOFTDIRTY_BIT;
        }
        if pme.is_file_backed() {
            flags |= 1 << PageFlagWord::FILE_BIT;
        }
        if pme.is_swapped() {
            flags |= 1 << PageFlagWord::SWAP_BIT;
        }
        if pme.is_mmap_exclusive() {
            flags |= 1 << PageFlagWord::MMAP_EXCLUSIVE_BIT;
        }

        Self(flags)
    }

    /// One character per bit position, `_` where the bit is clear. Set bits
    /// with no assigned name render as `?`.
    pub fn short_name(&self) -> String {
        let mut out = String::with_capacity(64);
        for bit in 0..64 {
            if !self.is_set(bit) {
                out.push('_');
            } else {
                match flag_names(bit) {
                    Some((short, _long)) => out.push_str(short),
                    None => out.push('?'),
                }
            }
        }
        out
    }

    /// Comma-separated long names of the set bits, in bit order. Unnamed set
    /// bits are skipped.
    pub fn long_name(&self) -> String {
        let mut names = Vec::new();
        for bit in 0..64 {
            if self.is_set(bit) {
                if let Some((_short, long)) = flag_names(bit) {
                    names.push(long);
                }
            }
        }
        names.join(",")
    }
}


/// (short, long) display names per bit position, following the table in
/// tools/mm/page-types.c.
const fn flag_names(bit: u32) -> Option<(&'static str, &'static str)> {
    match bit {
        0 => Some(("L", "locked")),
        1 => Some(("E", "error")),
        2 => Some(("R", "referenced")),
        3 => Some(("U", "uptodate")),
        4 => Some(("D", "dirty")),
        5 => Some(("l", "lru")),
        6 => Some(("A", "active")),
        7 => Some(("S", "slab")),
        8 => Some(("W", "writeback")),
        9 => Some(("I", "reclaim")),
        10 => Some(("B", "buddy")),
        11 => Some(("M", "mmap")),
        12 => Some(("a", "anonymous")),
        13 => Some(("s", "swapcache")),
        14 => Some(("b", "swapbacked")),
        15 => Some(("H", "compound_head")),
        16 => Some(("T", "compound_tail")),
        17 => Some(("G", "huge")),
        18 => Some(("u", "unevictable")),
        19 => Some(("X", "hwpoison")),
        20 => Some(("n", "nopage")),
        21 => Some(("x", "ksm")),
        22 => Some(("t", "thp")),
        23 => Some(("o", "offline")),
        24 => Some(("z", "zero_page")),
        25 => Some(("i", "idle_page")),
        26 => Some(("g", "pgtable")),
        32 => Some(("r", "reserved")),
        33 => Some(("m", "mlocked")),
        34 => Some(("d", "owner_2")),
        35 => Some(("P", "private")),
        36 => Some(("p", "private_2")),
        37 => Some(("O", "owner_private")),
        38 => Some(("h", "arch")),
        39 => Some(("c", "uncached")),
        40 => Some(("f", "softdirty")),
        41 => Some(("H", "arch_2")),
        47 => Some(("d", "anon_exclusive")),
        48 => Some(("I", "readahead")),
        50 => Some(("A", "slub_frozen")),
        51 => Some(("E", "slub_debug")),
        61 => Some(("F", "file")),
        62 => Some(("w", "swap")),
        63 => Some(("1", "mmap_exclusive")),
        _ => None,
    }
}


impl fmt::Debug for PageFlagWord {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("PageFlagWord")
            .field("value", &crate::fmt::Hex(&self.0))
            .field("flags", &self.long_name())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const fn bit(b: u32) -> u64 {
        1u64 << b
    }

    #[test]
    fn test_well_known_masks_hacker_bits() {
        let raw = bit(PageFlagWord::LRU_BIT)
            | bit(PageFlagWord::SOFTDIRTY_BIT)
            | bit(PageFlagWord::OWNER_2_BIT)
            | bit(PageFlagWord::FILE_BIT);
        let reduced = PageFlagWord::new(raw).well_known();
        assert_eq!(
            reduced,
            PageFlagWord::new(bit(PageFlagWord::LRU_BIT) | bit(PageFlagWord::FILE_BIT))
        );
    }

    #[test]
    fn test_expand_anon_exclusive() {
        let raw = PageFlagWord::new(bit(PageFlagWord::ANON_BIT) | bit(PageFlagWord::OWNER_2_BIT));
        let expanded = raw.expand_overloaded(PagemapEntry::new(0));
        assert!(expanded.is_set(PageFlagWord::ANON_BIT));
        assert!(expanded.is_set(PageFlagWord::ANON_EXCLUSIVE_BIT));
        assert!(!expanded.is_set(PageFlagWord::OWNER_2_BIT));
    }

    #[test]
    fn test_expand_slub_overloads() {
        let active = PageFlagWord::new(bit(PageFlagWord::SLAB_BIT) | bit(PageFlagWord::ACTIVE_BIT));
        let expanded = active.expand_overloaded(PagemapEntry::new(0));
        assert!(!expanded.is_set(PageFlagWord::ACTIVE_BIT));
        assert!(expanded.is_set(PageFlagWord::SLUB_FROZEN_BIT));

        let error = PageFlagWord::new(bit(PageFlagWord::SLAB_BIT) | bit(PageFlagWord::ERROR_BIT));
        let expanded = error.expand_overloaded(PagemapEntry::new(0));
        assert!(!expanded.is_set(PageFlagWord::ERROR_BIT));
        assert!(expanded.is_set(PageFlagWord::SLUB_FROZEN_BIT));
    }

    #[test]
    fn test_expand_readahead() {
        // reclaim without writeback is really readahead
        let raw = PageFlagWord::new(bit(PageFlagWord::RECLAIM_BIT));
        let expanded = raw.expand_overloaded(PagemapEntry::new(0));
        assert!(!expanded.is_set(PageFlagWord::RECLAIM_BIT));
        assert!(expanded.is_set(PageFlagWord::READAHEAD_BIT));

        // under writeback, reclaim keeps its meaning
        let wb = PageFlagWord::new(bit(PageFlagWord::RECLAIM_BIT) | bit(PageFlagWord::WRITEBACK_BIT));
        let expanded = wb.expand_overloaded(PagemapEntry::new(0));
        assert!(expanded.is_set(PageFlagWord::RECLAIM_BIT));
        assert!(!expanded.is_set(PageFlagWord::READAHEAD_BIT));
    }

    #[test]
    fn test_expand_folds_pme_bits() {
        let pme = PagemapEntry::new((1 << 55) | (1 << 56) | (1 << 61) | (1 << 62));
        let expanded = PageFlagWord::new(0).expand_overloaded(pme);
        assert!(expanded.is_set(PageFlagWord::SOFTDIRTY_BIT));
        assert!(expanded.is_set(PageFlagWord::MMAP_EXCLUSIVE_BIT));
        assert!(expanded.is_set(PageFlagWord::FILE_BIT));
        assert!(expanded.is_set(PageFlagWord::SWAP_BIT));
    }

    #[test]
    fn test_short_name_layout() {
        let word = PageFlagWord::new(
            bit(PageFlagWord::UPTODATE_BIT)
                | bit(PageFlagWord::LRU_BIT)
                | bit(PageFlagWord::ACTIVE_BIT)
                | bit(PageFlagWord::FILE_BIT),
        );
        let short = word.short_name();
        assert_eq!(short.len(), 64);
        assert_eq!(&short[..8], "___U_lA_");
        assert_eq!(&short[61..62], "F");
        assert_eq!(word.long_name(), "uptodate,lru,active,file");
    }

    #[test]
    fn test_empty_word() {
        let word = PageFlagWord::new(0);
        assert_eq!(word.short_name(), "_".repeat(64));
        assert_eq!(word.long_name(), "");
    }
}
