//! The allocation value object.
//!
//! An `Allocation` is a contiguous span of frequencies a single receiver
//! could tune in one capture, bounded by `max_sample_rate`. Frequencies are
//! stored in integer kHz; `max_sample_rate` is a receiver sample rate
//! ceiling in Hz, so the width check converts the kHz span to Hz before
//! comparing. The guard is exact equality, zero headroom: a span is
//! admitted only while it still fits within the ceiling.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    max_sample_rate: u32,
    frequencies: Vec<u32>,
}

impl Allocation {
    pub fn single(max_sample_rate: u32, frequency: u32) -> Self {
        Self {
            max_sample_rate,
            frequencies: vec![frequency],
        }
    }

    pub fn new(max_sample_rate: u32, frequencies: Vec<u32>) -> Self {
        Self {
            max_sample_rate,
            frequencies,
        }
    }

    /// Tries to add `frequency` (kHz) to this allocation. Succeeds and
    /// mutates in place if the resulting span, converted to Hz, still fits
    /// within `max_sample_rate` (Hz); otherwise leaves the allocation
    /// unchanged and returns `false`.
    pub fn maybe_add(&mut self, frequency: u32) -> bool {
        if self.frequencies.is_empty() {
            self.frequencies.push(frequency);
            return true;
        }
        let lo = self.frequencies.iter().copied().min().unwrap().min(frequency);
        let hi = self.frequencies.iter().copied().max().unwrap().max(frequency);
        let span_hz = u64::from(hi - lo) * 1_000;
        if span_hz <= u64::from(self.max_sample_rate) {
            self.frequencies.push(frequency);
            true
        } else {
            false
        }
    }

    pub fn frequencies(&self) -> &[u32] {
        &self.frequencies
    }

    pub fn max_sample_rate(&self) -> u32 {
        self.max_sample_rate
    }

    /// True if every frequency this allocation wants is already present in
    /// `self` — i.e. a receiver already tuned to `self` needs no retune to
    /// serve `desired`.
    pub fn covers(&self, desired: &Allocation) -> bool {
        desired
            .frequencies
            .iter()
            .all(|f| self.frequencies.contains(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_exactly_at_the_sample_rate_boundary() {
        // a 10 kHz span converts to exactly 10_000 Hz, matching the ceiling
        let mut a = Allocation::single(10_000, 1_000);
        assert!(a.maybe_add(1_010));
        assert_eq!(a.frequencies(), &[1_000, 1_010]);
    }

    #[test]
    fn rejects_a_span_one_khz_over_the_boundary() {
        let mut a = Allocation::single(10_000, 1_000);
        assert!(!a.maybe_add(1_011));
        assert_eq!(a.frequencies(), &[1_000]);
    }

    #[test]
    fn a_96khz_ceiling_admits_a_21khz_span_but_rejects_a_4349khz_one() {
        // a 96_000 Hz sample-rate ceiling comfortably covers an 8927-8948 kHz
        // cluster (21 kHz = 21_000 Hz) but not a jump out to 13276 kHz
        // (4349 kHz = 4_349_000 Hz)
        let mut a = Allocation::single(96_000, 8_927);
        assert!(a.maybe_add(8_936));
        assert!(a.maybe_add(8_948));
        assert_eq!(a.frequencies(), &[8_927, 8_936, 8_948]);
        assert!(!a.maybe_add(13_276));
    }

    #[test]
    fn covers_is_subset_containment() {
        let superset = Allocation::new(10_000, vec![1, 2, 3]);
        let subset = Allocation::new(10_000, vec![2, 3]);
        assert!(superset.covers(&subset));
        assert!(!subset.covers(&superset));
    }
}
