//! Address-mapped configuration register store.
//!
//! The host-facing boundary: plain u32 reads and writes at the offsets in
//! [`tilemc_chip::regs`]. This module owns only the configuration block;
//! `START`, `CTRL_RESET`, `STATUS`, and the counters are wired up by the
//! subsystem, which has the state those registers reflect.
//!
//! Tile dimensions and addresses live here as named fields — the bit-packed
//! words of the original register map are a serialization concern confined
//! to this boundary.

use tilemc_chip::regs;
use tracing::warn;

use crate::error::{Result, TilemcError};
use crate::job::{BufferingMode, JobDescriptor};

/// Backing store for the configuration block.
#[derive(Debug, Clone, Default)]
pub struct RegisterFile {
    matrix_m: u32,
    matrix_n: u32,
    matrix_k: u32,
    tile_m: u32,
    tile_n: u32,
    tile_k: u32,
    buf_mode: u32,
    dram_base_a: u32,
    dram_base_b: u32,
    dram_base_c: u32,
    sram_base_a_ping: u32,
    sram_base_a_pong: u32,
    sram_base_b_ping: u32,
    sram_base_b_pong: u32,
    sram_base_c: u32,
}

impl RegisterFile {
    /// True when `offset` addresses a configuration register.
    #[must_use]
    pub fn is_config_offset(offset: usize) -> bool {
        matches!(
            offset,
            regs::MATRIX_M
                | regs::MATRIX_N
                | regs::MATRIX_K
                | regs::TILE_M
                | regs::TILE_N
                | regs::TILE_K
                | regs::BUF_MODE
                | regs::DRAM_BASE_A
                | regs::DRAM_BASE_B
                | regs::DRAM_BASE_C
                | regs::SRAM_BASE_A_PING
                | regs::SRAM_BASE_A_PONG
                | regs::SRAM_BASE_B_PING
                | regs::SRAM_BASE_B_PONG
                | regs::SRAM_BASE_C
        )
    }

    /// Write a configuration register.
    ///
    /// # Errors
    ///
    /// [`TilemcError::UnmappedRegister`] for offsets outside the config block.
    pub fn write(&mut self, offset: usize, value: u32) -> Result<()> {
        let slot = self.slot(offset)?;
        *slot = value;
        Ok(())
    }

    /// Read a configuration register.
    ///
    /// # Errors
    ///
    /// [`TilemcError::UnmappedRegister`] for offsets outside the config block.
    pub fn read(&self, offset: usize) -> Result<u32> {
        Ok(match offset {
            regs::MATRIX_M => self.matrix_m,
            regs::MATRIX_N => self.matrix_n,
            regs::MATRIX_K => self.matrix_k,
            regs::TILE_M => self.tile_m,
            regs::TILE_N => self.tile_n,
            regs::TILE_K => self.tile_k,
            regs::BUF_MODE => self.buf_mode,
            regs::DRAM_BASE_A => self.dram_base_a,
            regs::DRAM_BASE_B => self.dram_base_b,
            regs::DRAM_BASE_C => self.dram_base_c,
            regs::SRAM_BASE_A_PING => self.sram_base_a_ping,
            regs::SRAM_BASE_A_PONG => self.sram_base_a_pong,
            regs::SRAM_BASE_B_PING => self.sram_base_b_ping,
            regs::SRAM_BASE_B_PONG => self.sram_base_b_pong,
            regs::SRAM_BASE_C => self.sram_base_c,
            _ => return Err(TilemcError::UnmappedRegister { offset }),
        })
    }

    fn slot(&mut self, offset: usize) -> Result<&mut u32> {
        Ok(match offset {
            regs::MATRIX_M => &mut self.matrix_m,
            regs::MATRIX_N => &mut self.matrix_n,
            regs::MATRIX_K => &mut self.matrix_k,
            regs::TILE_M => &mut self.tile_m,
            regs::TILE_N => &mut self.tile_n,
            regs::TILE_K => &mut self.tile_k,
            regs::BUF_MODE => &mut self.buf_mode,
            regs::DRAM_BASE_A => &mut self.dram_base_a,
            regs::DRAM_BASE_B => &mut self.dram_base_b,
            regs::DRAM_BASE_C => &mut self.dram_base_c,
            regs::SRAM_BASE_A_PING => &mut self.sram_base_a_ping,
            regs::SRAM_BASE_A_PONG => &mut self.sram_base_a_pong,
            regs::SRAM_BASE_B_PING => &mut self.sram_base_b_ping,
            regs::SRAM_BASE_B_PONG => &mut self.sram_base_b_pong,
            regs::SRAM_BASE_C => &mut self.sram_base_c,
            _ => return Err(TilemcError::UnmappedRegister { offset }),
        })
    }

    /// Assemble the currently loaded descriptor. The buffering-mode raw
    /// value is decoded here; a reserved encoding is an invalid config.
    ///
    /// # Errors
    ///
    /// [`TilemcError::InvalidConfig`] for a reserved buffering-mode value.
    pub fn to_job(&self) -> Result<JobDescriptor> {
        let buffering = BufferingMode::from_raw(self.buf_mode).ok_or_else(|| {
            warn!(raw = self.buf_mode, "reserved buffering mode");
            TilemcError::invalid_config(format!(
                "reserved buffering_mode encoding {}",
                self.buf_mode
            ))
        })?;
        Ok(JobDescriptor {
            m: self.matrix_m,
            n: self.matrix_n,
            k: self.matrix_k,
            tm: self.tile_m,
            tn: self.tile_n,
            tk: self.tile_k,
            buffering,
            dram_base_a: self.dram_base_a,
            dram_base_b: self.dram_base_b,
            dram_base_c: self.dram_base_c,
            sram_base_a_ping: self.sram_base_a_ping,
            sram_base_a_pong: self.sram_base_a_pong,
            sram_base_b_ping: self.sram_base_b_ping,
            sram_base_b_pong: self.sram_base_b_pong,
            sram_base_c: self.sram_base_c,
        })
    }
}
