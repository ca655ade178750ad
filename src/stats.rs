use std::collections::BTreeMap;

use crate::{
    deps::serde,
    kpageflags::PageFlagWord,
};


/// Accumulator for one probed entity: a segment, a relation, a table, a
/// partition, the WAL bucket or the grand total. Parents are the element-wise
/// sum of their children.
///
/// The histogram is keyed by the 64-bit flag word rather than its decoded
/// string. Decoding is lossy once overload expansion has run, so the word is
/// the only key that still sums correctly across files.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PageStats {
    pub page_count:     u64,
    pub page_cached:    u64,
    pub flag_histogram: BTreeMap<PageFlagWord, u64>,
}


impl PageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        other: &PageStats,
    ) {
        self.page_count += other.page_count;
        self.page_cached += other.page_cached;
        for (word, count) in other.flag_histogram.iter() {
            *self.flag_histogram.entry(*word).or_insert(0) += count;
        }
    }

    pub fn record_flags(
        &mut self,
        word: PageFlagWord,
    ) {
        *self.flag_histogram.entry(word).or_insert(0) += 1;
    }

    /// Percentage of this entity's pages that are resident, as a display
    /// string. `"0"` when nothing is cached.
    pub fn cached_pct(&self) -> String {
        if self.page_cached > 0 && self.page_count > 0 {
            format_pct(100.0 * self.page_cached as f64 / self.page_count as f64)
        } else {
            String::from("0")
        }
    }

    /// Percentage of the system-wide cached memory this entity accounts for.
    /// `total_cached_pages` of zero means the cached-memory figure was
    /// unavailable and the column degrades to `"0"`.
    pub fn total_cached_pct(
        &self,
        total_cached_pages: u64,
    ) -> String {
        if self.page_cached > 0 && total_cached_pages > 0 {
            format_pct(100.0 * self.page_cached as f64 / total_cached_pages as f64)
        } else {
            String::from("0")
        }
    }
}


/// Two decimal places, with trailing zeros (and a bare trailing dot)
/// stripped so that whole percentages print as integers.
fn format_pct(value: f64) -> String {
    let s = format!("{:.2}", value);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_elementwise() {
        let mut a = PageStats {
            page_count: 10,
            page_cached: 4,
            flag_histogram: vec![(PageFlagWord::new(0x68), 4)].into_iter().collect(),
        };
        let b = PageStats {
            page_count: 6,
            page_cached: 6,
            flag_histogram: vec![(PageFlagWord::new(0x68), 2), (PageFlagWord::new(0x78), 4)]
                .into_iter()
                .collect(),
        };

        a.add(&b);
        assert_eq!(a.page_count, 16);
        assert_eq!(a.page_cached, 10);
        assert_eq!(a.flag_histogram.get(&PageFlagWord::new(0x68)), Some(&6));
        assert_eq!(a.flag_histogram.get(&PageFlagWord::new(0x78)), Some(&4));
    }

    #[test]
    fn test_add_identity() {
        let mut a = PageStats::new();
        let b = PageStats {
            page_count: 3,
            page_cached: 1,
            flag_histogram: vec![(PageFlagWord::new(1), 1)].into_iter().collect(),
        };
        a.add(&b);
        assert_eq!(a, b);

        let mut c = b.clone();
        c.add(&PageStats::new());
        assert_eq!(c, b);
    }

    #[test]
    fn test_cached_pct() {
        let full = PageStats {
            page_count: 10,
            page_cached: 10,
            ..PageStats::new()
        };
        assert_eq!(full.cached_pct(), "100");

        let third = PageStats {
            page_count: 3,
            page_cached: 1,
            ..PageStats::new()
        };
        assert_eq!(third.cached_pct(), "33.33");

        assert_eq!(PageStats::new().cached_pct(), "0");
    }

    #[test]
    fn test_total_cached_pct() {
        let stats = PageStats {
            page_count: 100,
            page_cached: 50,
            ..PageStats::new()
        };
        assert_eq!(stats.total_cached_pct(200), "25");
        assert_eq!(stats.total_cached_pct(0), "0");
    }
}
