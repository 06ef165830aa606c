//! Fixed memory geometry and protocol constants.
//!
//! These values are structural: the RTL hard-wires them, so the software
//! model treats them as compile-time constants rather than configuration.

/// Bytes carried by one DRAM burst beat.
pub const BEAT_BYTES: usize = 16;

/// Bytes per SRAM word (one bank read/write port transfer).
pub const SRAM_WORD_BYTES: usize = 4;

/// SRAM words per DRAM beat.
pub const WORDS_PER_BEAT: usize = BEAT_BYTES / SRAM_WORD_BYTES;

/// Number of independently addressable SRAM banks.
pub const SRAM_BANK_COUNT: usize = 8;

/// Words per bank. Bank id occupies the address bits above this range.
pub const SRAM_BANK_WORDS: usize = 4096;

/// log2([`SRAM_BANK_WORDS`]) — shift that exposes the bank id bits.
pub const SRAM_BANK_SHIFT: u32 = 12;

/// Total SRAM capacity in words.
pub const SRAM_TOTAL_WORDS: usize = SRAM_BANK_COUNT * SRAM_BANK_WORDS;

/// Fixed SRAM read latency: accept, propagate, capture.
/// Data is valid two cycles after the cycle the request is granted.
pub const SRAM_READ_LATENCY: u64 = 2;

/// Depth of the prefetch engine's fetch-request queue.
pub const FETCH_QUEUE_DEPTH: usize = 4;

/// Bytes per A/B operand element (int8).
pub const ELEM_BYTES_AB: usize = 1;

/// Bytes per C accumulator element (int32).
pub const ELEM_BYTES_C: usize = 4;

/// DRAM cycles from an accepted read command to the first beat.
pub const DRAM_READ_LATENCY: u64 = 4;

/// DRAM cycles from the last accepted write beat to the write response.
pub const DRAM_WRITE_ACK_LATENCY: u64 = 2;

/// Decode the bank id from a word address (high bits).
#[must_use]
pub const fn bank_of(word_addr: u32) -> usize {
    ((word_addr >> SRAM_BANK_SHIFT) as usize) % SRAM_BANK_COUNT
}

/// Decode the in-bank offset from a word address (low bits).
#[must_use]
pub const fn bank_offset(word_addr: u32) -> usize {
    (word_addr as usize) & (SRAM_BANK_WORDS - 1)
}

/// Beats needed to move `elems` elements of `elem_bytes` each.
#[must_use]
pub const fn beats_for(elems: usize, elem_bytes: usize) -> usize {
    (elems * elem_bytes).div_ceil(BEAT_BYTES)
}
