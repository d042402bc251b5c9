//! tANS (table-based asymmetric numeral system) tables.
//!
//! A [`TansTable`] is derived from a [`FrequencyTable`] with no hidden state:
//! the same frequencies always produce the same table. All tables share one
//! state space (`TABLE_SIZE` states), so a coder may switch tables between
//! symbols as long as encoder and decoder pick the same table per position.
//!
//! ## Layout
//!
//! | Part | Size | Used by |
//! |------|------|---------|
//! | Decode entries | 4096 x (symbol, nb_bits, base) | decoder |
//! | State table | 4096 x u16 | encoder |
//! | Symbol transforms | 256 x (delta_find_state, delta_nb_bits) | encoder |
//!
//! Encoder states live in `[TABLE_SIZE, 2 * TABLE_SIZE)`, decoder states in
//! `[0, TABLE_SIZE)`; a decoder state is the encoder state minus `TABLE_SIZE`.

mod bitstream;

pub use bitstream::{BackwardBitReader, BitWriter};

use crate::error::{try_vec, Result};
use crate::freq::{FrequencyTable, NUM_SYMBOLS, TABLE_LOG, TABLE_SIZE};

/// Decoder entry, indexed by decoder state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeEntry {
    /// Symbol emitted in this state
    pub symbol: u8,
    /// Bits to read for the next state
    pub nb_bits: u8,
    /// Next state before adding the read bits
    pub base: u16,
}

/// Per-symbol encoder constants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SymbolTransform {
    delta_find_state: i32,
    delta_nb_bits: u32,
}

/// Encode and decode tables for one frequency distribution.
#[derive(Clone, PartialEq, Eq)]
pub struct TansTable {
    decode: Box<[DecodeEntry]>,
    state_table: Box<[u16]>,
    transforms: Box<[SymbolTransform]>,
}

impl TansTable {
    /// Build the tables for `freq`.
    pub fn build(freq: &FrequencyTable) -> Result<Self> {
        let freq = freq.as_array();
        let mask = TABLE_SIZE - 1;
        let step = (TABLE_SIZE >> 1) + (TABLE_SIZE >> 3) + 3;

        // Spread symbols over the states. The step is odd, so it visits
        // every state once and ends back at 0.
        let mut spread: Vec<u8> = try_vec(TABLE_SIZE)?;
        let mut position = 0usize;
        for (symbol, &f) in freq.iter().enumerate() {
            for _ in 0..f {
                spread[position] = symbol as u8;
                position = (position + step) & mask;
            }
        }
        debug_assert_eq!(position, 0);

        let mut cumul = [0u32; NUM_SYMBOLS + 1];
        for symbol in 0..NUM_SYMBOLS {
            cumul[symbol + 1] = cumul[symbol] + u32::from(freq[symbol]);
        }

        let mut state_table: Vec<u16> = try_vec(TABLE_SIZE)?;
        let mut next_slot = cumul;
        for (u, &symbol) in spread.iter().enumerate() {
            let slot = &mut next_slot[symbol as usize];
            state_table[*slot as usize] = (TABLE_SIZE + u) as u16;
            *slot += 1;
        }

        let mut transforms: Vec<SymbolTransform> = try_vec(NUM_SYMBOLS)?;
        for (symbol, transform) in transforms.iter_mut().enumerate() {
            let f = u32::from(freq[symbol]);
            let start = cumul[symbol] as i32;
            *transform = if f == 1 {
                SymbolTransform {
                    delta_find_state: start - 1,
                    delta_nb_bits: (TABLE_LOG << 16) - TABLE_SIZE as u32,
                }
            } else {
                let max_bits_out = TABLE_LOG - highest_bit(f - 1);
                let min_state_plus = f << max_bits_out;
                SymbolTransform {
                    delta_find_state: start - f as i32,
                    delta_nb_bits: (max_bits_out << 16) - min_state_plus,
                }
            };
        }

        let mut decode: Vec<DecodeEntry> = try_vec(TABLE_SIZE)?;
        let mut symbol_next = [0u32; NUM_SYMBOLS];
        for (next, &f) in symbol_next.iter_mut().zip(freq.iter()) {
            *next = u32::from(f);
        }
        for (entry, &symbol) in decode.iter_mut().zip(spread.iter()) {
            let next = symbol_next[symbol as usize];
            symbol_next[symbol as usize] += 1;
            let nb_bits = TABLE_LOG - highest_bit(next);
            *entry = DecodeEntry {
                symbol,
                nb_bits: nb_bits as u8,
                base: ((next << nb_bits) - TABLE_SIZE as u32) as u16,
            };
        }

        Ok(Self {
            decode: decode.into_boxed_slice(),
            state_table: state_table.into_boxed_slice(),
            transforms: transforms.into_boxed_slice(),
        })
    }

    /// Encode `symbol` from encoder state `state`, emitting the low bits the
    /// decoder will need to return to it.
    #[inline]
    pub fn encode(&self, state: &mut u32, symbol: u8, writer: &mut BitWriter<'_>) {
        let t = self.transforms[symbol as usize];
        let nb_bits = (*state + t.delta_nb_bits) >> 16;
        writer.write_bits(*state & ((1u32 << nb_bits) - 1), nb_bits);
        let slot = ((*state >> nb_bits) as i32 + t.delta_find_state) as usize;
        *state = u32::from(self.state_table[slot]);
    }

    /// Decoder entry for `state` (< `TABLE_SIZE`).
    #[inline]
    pub fn decode_entry(&self, state: usize) -> DecodeEntry {
        self.decode[state]
    }
}

impl std::fmt::Debug for TansTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TansTable")
            .field("states", &self.decode.len())
            .finish_non_exhaustive()
    }
}

/// Index of the highest set bit (`x > 0`).
#[inline]
fn highest_bit(x: u32) -> u32 {
    debug_assert!(x > 0);
    31 - x.leading_zeros()
}
