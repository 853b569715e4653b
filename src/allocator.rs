//! First-fit-decreasing frequency allocator.
//!
//! Walks stations in priority order, their frequencies ascending, skips
//! ignored ranges, and packs each frequency into the first existing
//! allocation that will still take it, else starts a new one.

use std::collections::BTreeMap;

use crate::allocation::Allocation;
use crate::station::StationId;

#[derive(Debug, Clone)]
pub struct Allocator {
    ranked_station_ids: Vec<StationId>,
    ignored_frequencies: Vec<(u32, u32)>,
    slot_width: u32,
}

impl Allocator {
    pub fn new(
        ranked_station_ids: Vec<StationId>,
        ignored_frequencies: Vec<(u32, u32)>,
        slot_width: u32,
    ) -> Self {
        Self {
            ranked_station_ids,
            ignored_frequencies,
            slot_width,
        }
    }

    pub fn is_ignored(&self, frequency: u32) -> bool {
        self.ignored_frequencies
            .iter()
            .any(|&(lo, hi)| lo <= frequency && frequency <= hi)
    }

    /// Builds the desired allocation set from each station's currently
    /// active frequencies, in priority order. Stations absent from
    /// `station_frequencies` (nothing active) are skipped; the result
    /// carries no reference back to which station contributed which
    /// frequency — only the packed spans matter downstream.
    pub fn allocate(&self, station_frequencies: &BTreeMap<StationId, Vec<u32>>) -> Vec<Allocation> {
        let mut allocations: Vec<Allocation> = Vec::new();
        for station_id in &self.ranked_station_ids {
            let Some(frequencies) = station_frequencies.get(station_id) else {
                continue;
            };
            let mut sorted = frequencies.clone();
            sorted.sort_unstable();
            sorted.dedup();
            for frequency in sorted {
                if self.is_ignored(frequency) {
                    continue;
                }
                if !allocations.iter_mut().any(|a| a.maybe_add(frequency)) {
                    allocations.push(Allocation::single(self.slot_width, frequency));
                }
            }
        }
        allocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn freqs(pairs: &[(u32, &[u32])]) -> BTreeMap<StationId, Vec<u32>> {
        pairs
            .iter()
            .map(|&(id, f)| (StationId(id), f.to_vec()))
            .collect()
    }

    #[test]
    fn packs_nearby_frequencies_from_one_station_together() {
        let allocator = Allocator::new(vec![StationId(1)], vec![], 10_000);
        let result = allocator.allocate(&freqs(&[(1, &[5_000_000, 5_005_000, 9_000_000])]));
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].frequencies(), &[5_000_000, 5_005_000]);
        assert_eq!(result[1].frequencies(), &[9_000_000]);
    }

    #[test]
    fn higher_ranked_stations_are_allocated_first() {
        let allocator = Allocator::new(vec![StationId(2), StationId(1)], vec![], 10_000);
        let result = allocator.allocate(&freqs(&[(1, &[1_000_000]), (2, &[6_000_000])]));
        // station 2 is ranked first, so its frequency seeds the first allocation
        assert_eq!(result[0].frequencies(), &[6_000_000]);
        assert_eq!(result[1].frequencies(), &[1_000_000]);
    }

    #[test]
    fn ignored_ranges_are_excluded() {
        let allocator = Allocator::new(vec![StationId(1)], vec![(4_000_000, 5_000_000)], 10_000);
        let result = allocator.allocate(&freqs(&[(1, &[4_500_000, 9_000_000])]));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].frequencies(), &[9_000_000]);
    }

    #[test]
    fn a_station_with_no_active_frequencies_is_skipped() {
        let allocator = Allocator::new(vec![StationId(1), StationId(2)], vec![], 10_000);
        let result = allocator.allocate(&freqs(&[(2, &[1_000_000])]));
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn one_station_with_a_close_cluster_and_a_distant_outlier_splits_in_two() {
        let allocator = Allocator::new(vec![StationId(1)], vec![], 96_000);
        let result = allocator.allocate(&freqs(&[(1, &[8_927, 8_936, 8_948, 13_276])]));
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].frequencies(), &[8_927, 8_936, 8_948]);
        assert_eq!(result[1].frequencies(), &[13_276]);
    }

    #[test]
    fn two_frequencies_far_enough_apart_never_share_an_allocation() {
        let allocator = Allocator::new(vec![StationId(1)], vec![], 96_000);
        let result = allocator.allocate(&freqs(&[(1, &[5_508, 21_937])]));
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].frequencies(), &[5_508]);
        assert_eq!(result[1].frequencies(), &[21_937]);
    }

    #[test]
    fn a_frequency_inside_an_ignored_range_is_dropped_before_allocation() {
        let allocator =
            Allocator::new(vec![StationId(1)], vec![(11_000, 12_000)], 96_000);
        let result = allocator.allocate(&freqs(&[(1, &[11_387, 13_276])]));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].frequencies(), &[13_276]);
    }
}
