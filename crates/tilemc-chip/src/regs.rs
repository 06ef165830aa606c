//! Configuration and status register map.
//!
//! Every register is a 32-bit word at a byte offset from the controller's
//! base address. Configuration registers are read/write while the controller
//! is idle; status and counter registers are read-only. A write to [`START`]
//! is self-clearing: it is consumed as a one-cycle pulse and always reads
//! back as zero.

// ── Job geometry ─────────────────────────────────────────────────────────────

/// Matrix rows M.
pub const MATRIX_M: usize = 0x00;
/// Matrix columns N.
pub const MATRIX_N: usize = 0x04;
/// Reduction dimension K.
pub const MATRIX_K: usize = 0x08;
/// Tile rows tm. Must divide M.
pub const TILE_M: usize = 0x0C;
/// Tile columns tn. Must divide N.
pub const TILE_N: usize = 0x10;
/// Tile reduction depth tk. Must divide K.
pub const TILE_K: usize = 0x14;
/// Buffering mode — see [`buf_mode`] for the encoding.
pub const BUF_MODE: usize = 0x18;

// ── DRAM placement ───────────────────────────────────────────────────────────

/// DRAM byte address of operand A.
pub const DRAM_BASE_A: usize = 0x1C;
/// DRAM byte address of operand B.
pub const DRAM_BASE_B: usize = 0x20;
/// DRAM byte address of result C.
pub const DRAM_BASE_C: usize = 0x24;

// ── SRAM placement (word addresses) ──────────────────────────────────────────

/// SRAM word address of the A ping buffer.
pub const SRAM_BASE_A_PING: usize = 0x28;
/// SRAM word address of the A pong buffer (used in DOUBLE_A / DOUBLE_AB).
pub const SRAM_BASE_A_PONG: usize = 0x2C;
/// SRAM word address of the B ping buffer.
pub const SRAM_BASE_B_PING: usize = 0x30;
/// SRAM word address of the B pong buffer (used in DOUBLE_B / DOUBLE_AB).
pub const SRAM_BASE_B_PONG: usize = 0x34;
/// SRAM word address of the C buffer (always single).
pub const SRAM_BASE_C: usize = 0x38;

// ── Control and status ───────────────────────────────────────────────────────

/// Start pulse. Write 1 to activate the loaded job descriptor; self-clearing.
pub const START: usize = 0x3C;
/// Controller reset. Write 1 to return every FSM to its initial state,
/// discarding in-flight work and clearing the sticky error bit.
pub const CTRL_RESET: usize = 0x40;
/// Status word — see [`status`] for bit positions.
pub const STATUS: usize = 0x44;

// ── Performance counters (read-only) ─────────────────────────────────────────

/// Clock ticks elapsed during the current/last job.
pub const CYCLE_COUNT: usize = 0x48;
/// DRAM read beats consumed during the current/last job.
pub const DRAM_READ_BEATS: usize = 0x4C;
/// DRAM write beats issued during the current/last job.
pub const DRAM_WRITE_BEATS: usize = 0x50;
/// Tiles fully retired (writeback acknowledged).
pub const TILE_COUNT: usize = 0x54;
/// Cycles the prefetch engine sat idle with an empty queue while busy.
pub const IDLE_CYCLES: usize = 0x58;

/// Status register bit definitions.
pub mod status {
    /// Job in flight.
    pub const BUSY: u32 = 1 << 0;
    /// Last job completed; held until the next start.
    pub const DONE: u32 = 1 << 1;
    /// Sticky error (rejected configuration); cleared only by `CTRL_RESET`.
    pub const ERROR: u32 = 1 << 2;
}

/// Buffering mode register encoding.
pub mod buf_mode {
    /// Single buffers for both operands.
    pub const SINGLE: u32 = 0;
    /// Double-buffered A, single B.
    pub const DOUBLE_A: u32 = 1;
    /// Double-buffered B, single A.
    pub const DOUBLE_B: u32 = 2;
    /// Both operands double-buffered (enables prefetch-ahead).
    pub const DOUBLE_AB: u32 = 3;
}
