//! Normalized symbol frequency tables.
//!
//! Every table sums to exactly [`TABLE_SIZE`] and keeps each symbol at a
//! count of at least 1, so no byte is ever unencodable.

use crate::error::{PktzError, Result};

/// Log2 of the tANS state count.
pub const TABLE_LOG: u32 = 12;

/// Sum every normalized frequency table adds up to.
pub const TABLE_SIZE: usize = 1 << TABLE_LOG;

/// Alphabet size.
pub const NUM_SYMBOLS: usize = 256;

/// Normalized frequencies for the byte alphabet.
#[derive(Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    freq: [u16; NUM_SYMBOLS],
}

impl FrequencyTable {
    /// Table with every symbol equally likely.
    pub fn uniform() -> Self {
        Self {
            freq: [(TABLE_SIZE / NUM_SYMBOLS) as u16; NUM_SYMBOLS],
        }
    }

    /// Normalize raw counts with Laplace smoothing.
    ///
    /// Each count is incremented by one, scaled to [`TABLE_SIZE`] with
    /// flooring and clamped to `[1, 65535]`. The rounding error is then
    /// settled on the largest symbol; if that symbol cannot absorb an
    /// overshoot the excess is taken from the other symbols instead.
    pub fn normalize(counts: &[u64; NUM_SYMBOLS], total: u64) -> Self {
        let smoothed_total = u128::from(total) + NUM_SYMBOLS as u128;
        let mut freq = [0u16; NUM_SYMBOLS];
        let mut sum = 0u64;
        for (slot, &count) in freq.iter_mut().zip(counts.iter()) {
            let scaled = (u128::from(count) + 1) * TABLE_SIZE as u128 / smoothed_total;
            let clamped = scaled.clamp(1, u128::from(u16::MAX)) as u16;
            *slot = clamped;
            sum += u64::from(clamped);
        }

        // First maximum, so ties resolve to the lowest symbol.
        let mut largest = 0;
        for (symbol, &f) in freq.iter().enumerate() {
            if f > freq[largest] {
                largest = symbol;
            }
        }

        let target = TABLE_SIZE as u64;
        if sum < target {
            freq[largest] += (target - sum) as u16;
        } else if sum > target {
            let excess = sum - target;
            if u64::from(freq[largest]) > excess {
                freq[largest] -= excess as u16;
            } else {
                // Sum of (f - 1) is sum - 256, which always covers the excess.
                let mut remaining = excess;
                for f in freq.iter_mut() {
                    if remaining == 0 {
                        break;
                    }
                    let spare = u64::from(*f - 1).min(remaining);
                    *f -= spare as u16;
                    remaining -= spare;
                }
            }
        }

        debug_assert_eq!(freq.iter().map(|&f| u32::from(f)).sum::<u32>(), TABLE_SIZE as u32);
        Self { freq }
    }

    /// Accept already normalized entries, as read back from a blob.
    pub fn from_entries(freq: [u16; NUM_SYMBOLS]) -> Result<Self> {
        if freq.iter().any(|&f| f == 0) {
            return Err(PktzError::MalformedBlob("zero frequency entry"));
        }
        let sum: u32 = freq.iter().map(|&f| u32::from(f)).sum();
        if sum != TABLE_SIZE as u32 {
            return Err(PktzError::MalformedBlob("frequency table does not sum to table size"));
        }
        Ok(Self { freq })
    }

    /// Frequency of `symbol`.
    #[inline]
    pub fn get(&self, symbol: u8) -> u16 {
        self.freq[symbol as usize]
    }

    pub fn as_array(&self) -> &[u16; NUM_SYMBOLS] {
        &self.freq
    }

    /// Sum of all entries. Always [`TABLE_SIZE`].
    pub fn sum(&self) -> u32 {
        self.freq.iter().map(|&f| u32::from(f)).sum()
    }
}

impl Default for FrequencyTable {
    fn default() -> Self {
        Self::uniform()
    }
}

impl std::fmt::Debug for FrequencyTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let peak = self
            .freq
            .iter()
            .enumerate()
            .max_by_key(|&(symbol, &freq)| (freq, std::cmp::Reverse(symbol)))
            .map(|(symbol, &freq)| (symbol, freq));
        f.debug_struct("FrequencyTable").field("peak", &peak).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_valid(table: &FrequencyTable) {
        assert_eq!(table.sum(), TABLE_SIZE as u32);
        assert!(table.as_array().iter().all(|&f| f >= 1));
    }

    #[test]
    fn test_empty_counts_are_uniform() {
        let table = FrequencyTable::normalize(&[0; NUM_SYMBOLS], 0);
        assert_valid(&table);
        assert_eq!(table, FrequencyTable::uniform());
    }

    #[test]
    fn test_single_symbol_dominates() {
        let mut counts = [0u64; NUM_SYMBOLS];
        counts[0x41] = 1_000_000;
        let table = FrequencyTable::normalize(&counts, 1_000_000);
        assert_valid(&table);
        assert_eq!(table.get(0x41), (TABLE_SIZE - 255) as u16);
        assert_eq!(table.get(0x00), 1);
    }

    #[test]
    fn test_deficit_goes_to_largest() {
        let mut counts = [0u64; NUM_SYMBOLS];
        counts[7] = 300;
        counts[9] = 300;
        counts[200] = 100;
        let table = FrequencyTable::normalize(&counts, 700);
        assert_valid(&table);
        // 7 and 9 tie; the lower symbol absorbs the rounding.
        assert!(table.get(7) >= table.get(9));
        assert!(table.get(9) > table.get(200));
    }

    #[test]
    fn test_overshoot_spread() {
        // An understated total makes every scaled value overshoot.
        let counts = [1000u64; NUM_SYMBOLS];
        let table = FrequencyTable::normalize(&counts, 1000);
        assert_valid(&table);
        assert!(table.as_array().iter().all(|&f| f <= u16::MAX));
    }

    #[test]
    fn test_huge_counts() {
        let mut counts = [u64::MAX / 512; NUM_SYMBOLS];
        counts[3] = u64::MAX / 2;
        let total = counts.iter().fold(0u64, |a, &c| a.saturating_add(c));
        let table = FrequencyTable::normalize(&counts, total);
        assert_valid(&table);
    }

    #[test]
    fn test_from_entries_validates() {
        assert!(FrequencyTable::from_entries([16; NUM_SYMBOLS]).is_ok());
        let mut bad = [16u16; NUM_SYMBOLS];
        bad[0] = 0;
        bad[1] = 32;
        assert!(FrequencyTable::from_entries(bad).is_err());
        let mut short = [16u16; NUM_SYMBOLS];
        short[5] = 15;
        assert!(FrequencyTable::from_entries(short).is_err());
    }
}
