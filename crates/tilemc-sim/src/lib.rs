//! Cycle-stepped software model of the GEMM tile memory controller.
//!
//! Models the three engineered subsystems of the controller — the tile
//! scheduler, the DRAM prefetch engine, and the SRAM bank arbiter — as
//! cooperative FSMs on a single synchronous clock, the way a verification
//! model or co-simulator would. The compute engine and the host register
//! interface are external collaborators: the first sits behind the
//! [`ComputeModel`] trait, the second is the address-mapped register file.
//!
//! # Architecture
//!
//! ```text
//! host regs → TileScheduler → (fetch queue, depth 4) → PrefetchEngine
//!                  │                                        │     │
//!                  │ tile_valid/tile_ready                  │     └→ DRAM channel
//!                  ▼                                        ▼        (16-byte beats)
//!            ComputeModel ───────────────────────→ SramArbiter → 8 banks
//!                              (second port)
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use tilemc_sim::MemorySubsystem;
//! use tilemc_chip::regs;
//!
//! # fn main() -> tilemc_sim::Result<()> {
//! let mut sys = MemorySubsystem::new(1 << 20);
//! for (off, val) in [
//!     (regs::MATRIX_M, 8), (regs::MATRIX_N, 8), (regs::MATRIX_K, 4),
//!     (regs::TILE_M, 4), (regs::TILE_N, 4), (regs::TILE_K, 4),
//! ] {
//!     sys.write_reg(off, val)?;
//! }
//! sys.write_reg(regs::START, 1)?;
//! let cycles = sys.run_until_done(100_000)?;
//! println!("done in {cycles} cycles, {} tiles", sys.counters().tile_count);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

mod compute;
mod counters;
mod dram;
mod error;
mod job;
mod prefetch;
mod regfile;
mod scheduler;
mod sram;
mod subsystem;

pub use compute::{ComputeModel, ComputeOut, MacComputeModel};
pub use counters::PerfCounters;
pub use dram::{DramBeat, DramModel, DramTickOut};
pub use error::{Result, TilemcError};
pub use job::{BufferingMode, FetchKind, FetchRequest, JobDescriptor, TileCoord, TileMeta};
pub use prefetch::{PrefetchEngine, PrefetchIn, PrefetchOut};
pub use regfile::RegisterFile;
pub use scheduler::{SchedIn, SchedOut, SchedState, TileScheduler};
pub use sram::{ArbiterTickOut, BankRequest, Requestor, SramArbiter};
pub use subsystem::MemorySubsystem;

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        BufferingMode, ComputeModel, JobDescriptor, MacComputeModel, MemorySubsystem,
        PerfCounters, Result, TileCoord, TilemcError,
    };
}
