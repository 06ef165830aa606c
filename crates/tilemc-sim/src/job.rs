//! Job descriptor, tile iteration, and per-tile address generation.
//!
//! A job is one GEMM `C[M,N] += A[M,K] × B[K,N]`, walked as a grid of
//! `tm×tn×tk` tiles with the reduction dimension innermost. Operand tiles
//! are laid out tile-linear in DRAM (row-major tile grid, each tile
//! contiguous), so a tile's address is `base + linear_tile_index × tile_bytes`.

use crate::error::{Result, TilemcError};
use tilemc_chip::{geometry, regs::buf_mode};

/// SRAM double-buffering strategy for the two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferingMode {
    /// One buffer per operand; fetch and compute strictly alternate.
    Single,
    /// A ping/pong, B single.
    DoubleA,
    /// B ping/pong, A single.
    DoubleB,
    /// Both operands ping/pong; the next tile is prefetched during compute.
    DoubleAb,
}

impl BufferingMode {
    /// Decode the register encoding. `None` for a reserved value.
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            buf_mode::SINGLE => Some(Self::Single),
            buf_mode::DOUBLE_A => Some(Self::DoubleA),
            buf_mode::DOUBLE_B => Some(Self::DoubleB),
            buf_mode::DOUBLE_AB => Some(Self::DoubleAb),
            _ => None,
        }
    }

    /// Register encoding of this mode.
    #[must_use]
    pub fn to_raw(self) -> u32 {
        match self {
            Self::Single => buf_mode::SINGLE,
            Self::DoubleA => buf_mode::DOUBLE_A,
            Self::DoubleB => buf_mode::DOUBLE_B,
            Self::DoubleAb => buf_mode::DOUBLE_AB,
        }
    }

    /// Whether operand A has a pong buffer.
    #[must_use]
    pub fn doubles_a(self) -> bool {
        matches!(self, Self::DoubleA | Self::DoubleAb)
    }

    /// Whether operand B has a pong buffer.
    #[must_use]
    pub fn doubles_b(self) -> bool {
        matches!(self, Self::DoubleB | Self::DoubleAb)
    }
}

/// One GEMM job as loaded through the register interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    /// Matrix rows.
    pub m: u32,
    /// Matrix columns.
    pub n: u32,
    /// Reduction dimension.
    pub k: u32,
    /// Tile rows (divides `m`).
    pub tm: u32,
    /// Tile columns (divides `n`).
    pub tn: u32,
    /// Tile reduction depth (divides `k`).
    pub tk: u32,
    /// Operand buffering strategy.
    pub buffering: BufferingMode,
    /// DRAM byte address of A.
    pub dram_base_a: u32,
    /// DRAM byte address of B.
    pub dram_base_b: u32,
    /// DRAM byte address of C.
    pub dram_base_c: u32,
    /// SRAM word address of the A ping buffer.
    pub sram_base_a_ping: u32,
    /// SRAM word address of the A pong buffer.
    pub sram_base_a_pong: u32,
    /// SRAM word address of the B ping buffer.
    pub sram_base_b_ping: u32,
    /// SRAM word address of the B pong buffer.
    pub sram_base_b_pong: u32,
    /// SRAM word address of the C buffer.
    pub sram_base_c: u32,
}

impl JobDescriptor {
    /// Validate the activation-time invariants: every dimension non-zero and
    /// every tile dimension dividing its matrix dimension.
    ///
    /// # Errors
    ///
    /// Returns [`TilemcError::InvalidConfig`] naming the first violated rule.
    pub fn validate(&self) -> Result<()> {
        for (name, dim) in [
            ("M", self.m),
            ("N", self.n),
            ("K", self.k),
            ("tm", self.tm),
            ("tn", self.tn),
            ("tk", self.tk),
        ] {
            if dim == 0 {
                return Err(TilemcError::invalid_config(format!("{name} must be > 0")));
            }
        }
        for (name, dim, tile) in [
            ("M", self.m, self.tm),
            ("N", self.n, self.tn),
            ("K", self.k, self.tk),
        ] {
            if dim % tile != 0 {
                return Err(TilemcError::invalid_config(format!(
                    "{name}={dim} not divisible by its tile dimension {tile}"
                )));
            }
        }
        Ok(())
    }

    /// Tile grid extent along M.
    #[must_use]
    pub fn tiles_m(&self) -> u32 {
        self.m / self.tm
    }

    /// Tile grid extent along N.
    #[must_use]
    pub fn tiles_n(&self) -> u32 {
        self.n / self.tn
    }

    /// Tile grid extent along K.
    #[must_use]
    pub fn tiles_k(&self) -> u32 {
        self.k / self.tk
    }

    /// Total number of tiles in the job.
    #[must_use]
    pub fn total_tiles(&self) -> u64 {
        u64::from(self.tiles_m()) * u64::from(self.tiles_n()) * u64::from(self.tiles_k())
    }

    /// DRAM byte address of the A tile at `coord` (tile-linear layout).
    #[must_use]
    pub fn dram_addr_a(&self, coord: TileCoord) -> u32 {
        let idx = coord.m * self.tiles_k() + coord.k;
        let tile_bytes = self.tm * self.tk * geometry::ELEM_BYTES_AB as u32;
        self.dram_base_a.wrapping_add(idx.wrapping_mul(tile_bytes))
    }

    /// DRAM byte address of the B tile at `coord`.
    #[must_use]
    pub fn dram_addr_b(&self, coord: TileCoord) -> u32 {
        let idx = coord.k * self.tiles_n() + coord.n;
        let tile_bytes = self.tk * self.tn * geometry::ELEM_BYTES_AB as u32;
        self.dram_base_b.wrapping_add(idx.wrapping_mul(tile_bytes))
    }

    /// DRAM byte address of the C tile at `coord`.
    #[must_use]
    pub fn dram_addr_c(&self, coord: TileCoord) -> u32 {
        let idx = coord.m * self.tiles_n() + coord.n;
        let tile_bytes = self.tm * self.tn * geometry::ELEM_BYTES_C as u32;
        self.dram_base_c.wrapping_add(idx.wrapping_mul(tile_bytes))
    }

    /// SRAM destination for the A tile numbered `tile_idx` in issue order.
    /// Parity selects ping/pong when A is double buffered.
    #[must_use]
    pub fn sram_addr_a(&self, tile_idx: u64) -> u32 {
        if self.buffering.doubles_a() && tile_idx % 2 == 1 {
            self.sram_base_a_pong
        } else {
            self.sram_base_a_ping
        }
    }

    /// SRAM destination for the B tile numbered `tile_idx` in issue order.
    #[must_use]
    pub fn sram_addr_b(&self, tile_idx: u64) -> u32 {
        if self.buffering.doubles_b() && tile_idx % 2 == 1 {
            self.sram_base_b_pong
        } else {
            self.sram_base_b_ping
        }
    }

    /// Build the operand fetch request for the tile numbered `tile_idx`.
    #[must_use]
    pub fn fetch_request(&self, coord: TileCoord, tile_idx: u64) -> FetchRequest {
        FetchRequest {
            kind: FetchKind::ReadAb,
            dram_addr_a: self.dram_addr_a(coord),
            dram_addr_b: self.dram_addr_b(coord),
            dram_addr_c: 0,
            sram_addr_a: self.sram_addr_a(tile_idx),
            sram_addr_b: self.sram_addr_b(tile_idx),
            sram_addr_c: 0,
            num_elements_a: self.tm * self.tk,
            num_elements_b: self.tk * self.tn,
            num_elements_c: 0,
        }
    }

    /// Build the writeback request for the tile at `coord`.
    #[must_use]
    pub fn writeback_request(&self, coord: TileCoord) -> FetchRequest {
        FetchRequest {
            kind: FetchKind::WriteC,
            dram_addr_a: 0,
            dram_addr_b: 0,
            dram_addr_c: self.dram_addr_c(coord),
            sram_addr_a: 0,
            sram_addr_b: 0,
            sram_addr_c: self.sram_base_c,
            num_elements_a: 0,
            num_elements_b: 0,
            num_elements_c: self.tm * self.tn,
        }
    }
}

/// Position in the tile grid. Iteration order is k innermost, n middle,
/// m outermost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileCoord {
    /// Row-tile index.
    pub m: u32,
    /// Column-tile index.
    pub n: u32,
    /// Reduction-tile index.
    pub k: u32,
}

impl TileCoord {
    /// The first tile of any job.
    #[must_use]
    pub fn first() -> Self {
        Self::default()
    }

    /// The tile after `self`, or `None` past the end of the grid.
    #[must_use]
    pub fn next(self, job: &JobDescriptor) -> Option<Self> {
        let mut c = self;
        c.k += 1;
        if c.k == job.tiles_k() {
            c.k = 0;
            c.n += 1;
            if c.n == job.tiles_n() {
                c.n = 0;
                c.m += 1;
                if c.m == job.tiles_m() {
                    return None;
                }
            }
        }
        Some(c)
    }
}

/// What the prefetch engine should move for one tile phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Burst-read the A and B tiles into SRAM.
    ReadAb,
    /// Read-modify-write the C tile back to DRAM.
    WriteC,
}

/// One unit of work for the prefetch engine. Produced by the scheduler,
/// consumed exactly once, never reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    /// Operand fetch or result writeback.
    pub kind: FetchKind,
    /// DRAM byte address of the A tile (READ_AB only).
    pub dram_addr_a: u32,
    /// DRAM byte address of the B tile (READ_AB only).
    pub dram_addr_b: u32,
    /// DRAM byte address of the C tile (WRITE_C only).
    pub dram_addr_c: u32,
    /// SRAM word destination for A.
    pub sram_addr_a: u32,
    /// SRAM word destination for B.
    pub sram_addr_b: u32,
    /// SRAM word source for C.
    pub sram_addr_c: u32,
    /// A elements to move.
    pub num_elements_a: u32,
    /// B elements to move.
    pub num_elements_b: u32,
    /// C elements to move.
    pub num_elements_c: u32,
}

/// Tile metadata handed to the compute engine with `tile_valid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileMeta {
    /// SRAM word address holding the A tile.
    pub sram_addr_a: u32,
    /// SRAM word address holding the B tile.
    pub sram_addr_b: u32,
    /// SRAM word address to receive the C tile.
    pub sram_addr_c: u32,
    /// Tile rows.
    pub tm: u32,
    /// Tile columns.
    pub tn: u32,
    /// Tile reduction depth.
    pub tk: u32,
}
