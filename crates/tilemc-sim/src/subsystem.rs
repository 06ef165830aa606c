//! Top-level memory subsystem: one synchronous clock over every component.
//!
//! Each tick steps the DRAM channel, the scheduler, the prefetch engine,
//! the compute engine, and the bank arbiter exactly once, in that order.
//! All cross-component handshakes are registered: a component observes the
//! signals its peers produced on the *previous* tick, so every tick is one
//! atomic state update and no component can react to an event twice — the
//! software equivalent of edge-triggered event capture in the RTL.
//!
//! The host drives the model exclusively through [`Self::write_reg`] /
//! [`Self::read_reg`] plus the backdoor preload/snapshot accessors a
//! testbench would use.

use tilemc_chip::regs;
use tracing::{debug, warn};

use crate::compute::{ComputeModel, MacComputeModel};
use crate::counters::PerfCounters;
use crate::dram::DramModel;
use crate::error::{Result, TilemcError};
use crate::prefetch::{PrefetchEngine, PrefetchIn};
use crate::regfile::RegisterFile;
use crate::scheduler::{SchedIn, TileScheduler};
use crate::sram::SramArbiter;

/// The complete controller model plus its external collaborators.
#[derive(Debug)]
pub struct MemorySubsystem {
    regfile: RegisterFile,
    scheduler: TileScheduler,
    prefetch: PrefetchEngine,
    arbiter: SramArbiter,
    dram: DramModel,
    compute: Box<dyn ComputeModel>,
    counters: PerfCounters,
    /// Sticky configuration error, cleared only by `CTRL_RESET`.
    error: bool,

    // Registered inter-component signals (previous tick's outputs).
    fetch_done_l: bool,
    enqueue_accepted_l: bool,
    tile_ready_l: bool,
    tile_done_l: bool,
    pf_granted_l: bool,
    pf_rdata_l: Option<u32>,
    comp_granted_l: bool,
    comp_rdata_l: Option<u32>,
    pf_rready_l: bool,
}

impl MemorySubsystem {
    /// Create a subsystem with `dram_bytes` of backing store and the
    /// reference MAC compute model.
    #[must_use]
    pub fn new(dram_bytes: usize) -> Self {
        Self::with_compute(dram_bytes, Box::new(MacComputeModel::new()))
    }

    /// Create a subsystem with a caller-provided compute engine.
    #[must_use]
    pub fn with_compute(dram_bytes: usize, compute: Box<dyn ComputeModel>) -> Self {
        Self {
            regfile: RegisterFile::default(),
            scheduler: TileScheduler::new(),
            prefetch: PrefetchEngine::new(),
            arbiter: SramArbiter::new(),
            dram: DramModel::new(dram_bytes),
            compute,
            counters: PerfCounters::default(),
            error: false,
            fetch_done_l: false,
            enqueue_accepted_l: false,
            tile_ready_l: false,
            tile_done_l: false,
            pf_granted_l: false,
            pf_rdata_l: None,
            comp_granted_l: false,
            comp_rdata_l: None,
            pf_rready_l: false,
        }
    }

    /// Host register write.
    ///
    /// # Errors
    ///
    /// [`TilemcError::UnmappedRegister`] for an unknown offset, or
    /// [`TilemcError::InvalidConfig`] when a start is rejected (the sticky
    /// error bit is set as well).
    pub fn write_reg(&mut self, offset: usize, value: u32) -> Result<()> {
        match offset {
            regs::START => {
                if value & 1 != 0 {
                    self.start()
                } else {
                    Ok(())
                }
            }
            regs::CTRL_RESET => {
                if value & 1 != 0 {
                    self.reset();
                }
                Ok(())
            }
            regs::STATUS
            | regs::CYCLE_COUNT
            | regs::DRAM_READ_BEATS
            | regs::DRAM_WRITE_BEATS
            | regs::TILE_COUNT
            | regs::IDLE_CYCLES => {
                warn!(offset, "write to read-only register ignored");
                Ok(())
            }
            _ if RegisterFile::is_config_offset(offset) => {
                if self.scheduler.busy() {
                    warn!(offset, "config write ignored while busy");
                    Ok(())
                } else {
                    self.regfile.write(offset, value)
                }
            }
            _ => Err(TilemcError::UnmappedRegister { offset }),
        }
    }

    /// Host register read.
    ///
    /// # Errors
    ///
    /// [`TilemcError::UnmappedRegister`] for an unknown offset.
    pub fn read_reg(&self, offset: usize) -> Result<u32> {
        match offset {
            // Self-clearing pulses always read as zero.
            regs::START | regs::CTRL_RESET => Ok(0),
            regs::STATUS => {
                let mut s = 0;
                if self.scheduler.busy() {
                    s |= regs::status::BUSY;
                }
                if self.scheduler.done() {
                    s |= regs::status::DONE;
                }
                if self.error {
                    s |= regs::status::ERROR;
                }
                Ok(s)
            }
            regs::CYCLE_COUNT => Ok(self.counters.cycle_count as u32),
            regs::DRAM_READ_BEATS => Ok(self.counters.dram_read_beats as u32),
            regs::DRAM_WRITE_BEATS => Ok(self.counters.dram_write_beats as u32),
            regs::TILE_COUNT => Ok(self.counters.tile_count as u32),
            regs::IDLE_CYCLES => Ok(self.counters.idle_cycles as u32),
            _ => self.regfile.read(offset),
        }
    }

    /// Accept the loaded descriptor and begin the job. Rejected while busy
    /// (the write is dropped, hardware-style) and on invalid configuration
    /// (sticky error, no state change).
    fn start(&mut self) -> Result<()> {
        if self.scheduler.busy() {
            warn!("start ignored: job already in flight");
            return Ok(());
        }
        let job = match self.regfile.to_job() {
            Ok(job) => job,
            Err(e) => {
                self.error = true;
                warn!(%e, "start rejected");
                return Err(e);
            }
        };
        if let Err(e) = self.scheduler.activate(job) {
            self.error = true;
            warn!(%e, "start rejected");
            return Err(e);
        }
        // Counters reset only once the job is accepted; a rejected start
        // leaves the previous job's frozen snapshot readable.
        self.counters.reset();
        Ok(())
    }

    /// Full controller reset: every FSM to its initial state, in-flight
    /// work discarded, sticky error cleared. Configuration registers and
    /// memory contents survive, so the host can reconfigure and retry.
    pub fn reset(&mut self) {
        debug!("controller reset");
        self.scheduler.reset();
        self.prefetch.reset();
        self.arbiter.reset();
        self.dram.reset_channel();
        self.compute.reset();
        self.counters.reset();
        self.error = false;
        self.fetch_done_l = false;
        self.enqueue_accepted_l = false;
        self.tile_ready_l = false;
        self.tile_done_l = false;
        self.pf_granted_l = false;
        self.pf_rdata_l = None;
        self.comp_granted_l = false;
        self.comp_rdata_l = None;
        self.pf_rready_l = false;
    }

    /// Advance the whole subsystem one clock tick.
    pub fn tick(&mut self) {
        // Counters track the job that was active entering the tick, so the
        // completing tick is still counted and the counters freeze after.
        let active = self.scheduler.busy();

        // DRAM first; the prefetch engine consumes its outputs this tick.
        let dram_out = self.dram.step(self.pf_rready_l);

        let sched_in = SchedIn {
            fetch_done: std::mem::take(&mut self.fetch_done_l),
            enqueue_accepted: std::mem::take(&mut self.enqueue_accepted_l),
            tile_ready: std::mem::take(&mut self.tile_ready_l),
            tile_done: std::mem::take(&mut self.tile_done_l),
        };
        let sched_out = self.scheduler.step(&sched_in);
        if let Some(req) = sched_out.enqueue {
            if self.prefetch.try_enqueue(req) {
                self.enqueue_accepted_l = true;
            }
        }

        let pf_in = PrefetchIn {
            dram: dram_out,
            sram_granted: std::mem::take(&mut self.pf_granted_l),
            sram_rdata: self.pf_rdata_l.take(),
        };
        let pf_out = self.prefetch.step(&mut self.dram, &pf_in);
        self.fetch_done_l = pf_out.fetch_done;
        self.pf_rready_l = pf_out.rready;

        let comp_out = self.compute.step(
            sched_out.tile_valid.as_ref(),
            std::mem::take(&mut self.comp_granted_l),
            self.comp_rdata_l.take(),
        );
        self.tile_ready_l = comp_out.tile_ready;
        self.tile_done_l = comp_out.tile_done;

        let arb = self.arbiter.step(pf_out.bank_req, comp_out.bank_req);
        self.pf_granted_l = arb.prefetch_granted;
        self.pf_rdata_l = arb.prefetch_rdata;
        self.comp_granted_l = arb.compute_granted;
        self.comp_rdata_l = arb.compute_rdata;

        if active {
            self.counters.cycle_count += 1;
            if pf_out.read_beat {
                self.counters.dram_read_beats += 1;
            }
            if pf_out.write_beat {
                self.counters.dram_write_beats += 1;
            }
            if pf_out.idle {
                self.counters.idle_cycles += 1;
            }
            if sched_out.tile_retired {
                self.counters.tile_count += 1;
            }
        }
    }

    /// Tick until the job completes, bounded by `max_cycles`. The model has
    /// no in-protocol timeout, so this is the external watchdog every
    /// caller needs for liveness.
    ///
    /// # Errors
    ///
    /// [`TilemcError::Watchdog`] when the budget runs out with the job
    /// still busy — the `error`-free hang signature described by the
    /// architecture (busy held forever).
    pub fn run_until_done(&mut self, max_cycles: u64) -> Result<u64> {
        for elapsed in 0..max_cycles {
            if self.scheduler.done() {
                return Ok(elapsed);
            }
            self.tick();
        }
        if self.scheduler.done() {
            Ok(max_cycles)
        } else {
            Err(TilemcError::Watchdog { cycles: max_cycles })
        }
    }

    /// Job in flight.
    #[must_use]
    pub fn busy(&self) -> bool {
        self.scheduler.busy()
    }

    /// Last job completed.
    #[must_use]
    pub fn done(&self) -> bool {
        self.scheduler.done()
    }

    /// Sticky configuration error.
    #[must_use]
    pub fn error(&self) -> bool {
        self.error
    }

    /// Counter snapshot.
    #[must_use]
    pub fn counters(&self) -> &PerfCounters {
        &self.counters
    }

    /// Backdoor DRAM preload (testbench path, no bus timing).
    pub fn preload_dram(&mut self, addr: usize, data: &[u8]) {
        self.dram.preload(addr, data);
    }

    /// Backdoor DRAM snapshot.
    #[must_use]
    pub fn snapshot_dram(&self, addr: usize, len: usize) -> bytes::Bytes {
        self.dram.snapshot(addr, len)
    }

    /// Backdoor SRAM word read.
    #[must_use]
    pub fn peek_sram(&self, word_addr: u32) -> u32 {
        self.arbiter.peek(word_addr)
    }

    /// Backdoor SRAM word write.
    pub fn poke_sram(&mut self, word_addr: u32, data: u32) {
        self.arbiter.poke(word_addr, data);
    }

    /// Same-bank conflicts the arbiter has resolved.
    #[must_use]
    pub fn bank_conflicts(&self) -> u64 {
        self.arbiter.conflict_count()
    }
}
