//! Tile scheduler.
//!
//! Drives the GEMM control flow: enumerates tiles k-innermost, issues
//! operand fetches and result writebacks to the prefetch engine, and hands
//! ready tiles to the compute engine over the `tile_valid`/`tile_ready`
//! handshake. Exposes job status (busy / done / error is the register
//! file's concern).
//!
//! FSM: `IDLE → FETCH_REQ → WAIT_DATA → TILE_READY → COMPUTE → WRITEBACK_C
//! → WB_WAIT_DONE → NEXT_TILE → {FETCH_REQ | DONE}`. `DONE` accepts a new
//! start without an intervening reset — restartability is part of the
//! contract, not an accident of the implementation.
//!
//! Prefetch-ahead: in DOUBLE_AB the next tile's READ_AB is issued while the
//! current tile computes, targeting the other half of each ping/pong pair.
//! In SINGLE (and the partially doubled modes, where one operand still has
//! a single live buffer) the scheduler holds the next fetch until the
//! current tile's compute and writeback have fully drained.

use std::collections::VecDeque;

use tracing::{debug, info};

use crate::error::Result;
use crate::job::{BufferingMode, FetchRequest, JobDescriptor, TileCoord, TileMeta};

/// Scheduler FSM states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedState {
    /// No job loaded.
    Idle,
    /// Issuing (or confirming) the current tile's operand fetch.
    FetchReq,
    /// Waiting for the prefetch engine to land the operands.
    WaitData,
    /// Offering the tile to the compute engine (`tile_valid` held).
    TileReady,
    /// Compute engine owns the tile.
    Compute,
    /// Issuing the writeback request.
    WritebackC,
    /// Waiting for the writeback acknowledgment.
    WbWaitDone,
    /// Advancing the tile coordinate.
    NextTile,
    /// Job complete; restartable without reset.
    Done,
}

/// Which completion pulse the scheduler expects next from the FIFO engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingOp {
    ReadAb,
    WriteC,
}

/// Per-cycle inputs, registered from the previous cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedIn {
    /// The prefetch engine pulsed `fetch_done`.
    pub fetch_done: bool,
    /// Last cycle's presented enqueue was accepted into the queue.
    pub enqueue_accepted: bool,
    /// The compute engine asserted `tile_ready`.
    pub tile_ready: bool,
    /// The compute engine pulsed `tile_done`.
    pub tile_done: bool,
}

/// Per-cycle outputs.
#[derive(Debug, Clone, Default)]
pub struct SchedOut {
    /// Fetch request presented for enqueue (held until accepted).
    pub enqueue: Option<FetchRequest>,
    /// `tile_valid` level plus metadata; stable until accepted.
    pub tile_valid: Option<TileMeta>,
    /// A tile fully retired this cycle (writeback acknowledged).
    pub tile_retired: bool,
    /// The job completed this cycle.
    pub done_pulse: bool,
}

/// The scheduler: tile walker plus handshake state.
#[derive(Debug)]
pub struct TileScheduler {
    state: SchedState,
    job: Option<JobDescriptor>,
    coord: TileCoord,
    tile_idx: u64,
    /// READ_AB requests pushed toward the queue since job start; compared
    /// against `tile_idx` to know whether the current tile's fetch is
    /// already in flight (prefetch-ahead).
    fetches_enqueued: u64,
    /// Enqueues in flight toward the prefetch queue, front presented.
    enq_queue: VecDeque<(FetchRequest, PendingOp)>,
    /// Completion pulses expected, in FIFO order.
    pending: VecDeque<PendingOp>,
    /// Completed READ_AB fetches not yet consumed by WAIT_DATA.
    ready_credits: u32,
    /// The current tile's writeback has been acknowledged.
    wb_done: bool,
    offer: Option<TileMeta>,
    done: bool,
}

impl Default for TileScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TileScheduler {
    /// Create an idle scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SchedState::Idle,
            job: None,
            coord: TileCoord::first(),
            tile_idx: 0,
            fetches_enqueued: 0,
            enq_queue: VecDeque::new(),
            pending: VecDeque::new(),
            ready_credits: 0,
            wb_done: false,
            offer: None,
            done: false,
        }
    }

    /// Activate a job. Legal from `IDLE` and from `DONE` (restart without
    /// reset). Validation happens here, once; on failure no state changes
    /// and `busy` stays false.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TilemcError::InvalidConfig`] when the descriptor
    /// violates a dimension invariant.
    pub fn activate(&mut self, job: JobDescriptor) -> Result<()> {
        job.validate()?;
        info!(
            m = job.m,
            n = job.n,
            k = job.k,
            tiles = job.total_tiles(),
            buffering = ?job.buffering,
            "job activated"
        );
        self.coord = TileCoord::first();
        self.tile_idx = 0;
        self.fetches_enqueued = 0;
        self.enq_queue.clear();
        self.pending.clear();
        self.ready_credits = 0;
        self.wb_done = false;
        self.offer = None;
        self.done = false;
        self.job = Some(job);
        self.state = SchedState::FetchReq;
        Ok(())
    }

    /// Job in flight.
    #[must_use]
    pub fn busy(&self) -> bool {
        !matches!(self.state, SchedState::Idle | SchedState::Done)
    }

    /// Last job completed; held until the next start.
    #[must_use]
    pub fn done(&self) -> bool {
        self.done
    }

    /// Current FSM state (for harness assertions and logs).
    #[must_use]
    pub fn state(&self) -> SchedState {
        self.state
    }

    /// Full reset: back to `IDLE`, discarding the job.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advance one cycle.
    pub fn step(&mut self, input: &SchedIn) -> SchedOut {
        let mut out = SchedOut::default();

        // Attribute completion pulses in FIFO order.
        if input.fetch_done {
            match self.pending.pop_front() {
                Some(PendingOp::ReadAb) => self.ready_credits += 1,
                Some(PendingOp::WriteC) => self.wb_done = true,
                None => debug!("spurious fetch_done pulse ignored"),
            }
        }

        // Retire the front of the enqueue pipeline on acceptance.
        if input.enqueue_accepted {
            if let Some((_, op)) = self.enq_queue.pop_front() {
                self.pending.push_back(op);
            }
        }

        match self.state {
            SchedState::Idle | SchedState::Done => {}

            SchedState::FetchReq => {
                if self.fetches_enqueued <= self.tile_idx {
                    let job = self.job.as_ref().expect("job loaded");
                    let req = job.fetch_request(self.coord, self.tile_idx);
                    self.enq_queue.push_back((req, PendingOp::ReadAb));
                    self.fetches_enqueued += 1;
                }
                self.state = SchedState::WaitData;
            }

            SchedState::WaitData => {
                if self.ready_credits > 0 {
                    self.ready_credits -= 1;
                    let job = self.job.as_ref().expect("job loaded");
                    self.offer = Some(TileMeta {
                        sram_addr_a: job.sram_addr_a(self.tile_idx),
                        sram_addr_b: job.sram_addr_b(self.tile_idx),
                        sram_addr_c: job.sram_base_c,
                        tm: job.tm,
                        tn: job.tn,
                        tk: job.tk,
                    });
                    self.state = SchedState::TileReady;
                }
            }

            SchedState::TileReady => {
                // tile_valid held stable until tile_ready, then deasserted
                // before the next tile is prepared.
                if input.tile_ready {
                    self.offer = None;
                    self.state = SchedState::Compute;
                } else {
                    out.tile_valid = self.offer;
                }
            }

            SchedState::Compute => {
                self.maybe_prefetch_ahead();
                if input.tile_done {
                    self.state = SchedState::WritebackC;
                }
            }

            SchedState::WritebackC => {
                // Enqueue the writeback behind any prefetch-ahead still in
                // flight; FIFO service order keeps the semantics intact.
                let job = self.job.as_ref().expect("job loaded");
                let req = job.writeback_request(self.coord);
                self.wb_done = false;
                self.enq_queue.push_back((req, PendingOp::WriteC));
                self.state = SchedState::WbWaitDone;
            }

            SchedState::WbWaitDone => {
                if self.wb_done {
                    self.wb_done = false;
                    out.tile_retired = true;
                    self.state = SchedState::NextTile;
                }
            }

            SchedState::NextTile => {
                let job = self.job.as_ref().expect("job loaded");
                match self.coord.next(job) {
                    Some(next) => {
                        self.coord = next;
                        self.tile_idx += 1;
                        self.state = SchedState::FetchReq;
                    }
                    None => {
                        info!(tiles = self.tile_idx + 1, "job complete");
                        self.done = true;
                        out.done_pulse = true;
                        self.state = SchedState::Done;
                    }
                }
            }
        }

        // Present the front of the enqueue pipeline (held until accepted).
        out.enqueue = self.enq_queue.front().map(|(req, _)| *req);

        out
    }

    /// Issue the next tile's READ_AB during compute when both operands are
    /// double buffered. With a single live buffer on either operand the
    /// fetch would overwrite data the compute engine is still reading, so
    /// this is gated on DOUBLE_AB.
    fn maybe_prefetch_ahead(&mut self) {
        let job = self.job.as_ref().expect("job loaded");
        if job.buffering != BufferingMode::DoubleAb {
            return;
        }
        if self.fetches_enqueued != self.tile_idx + 1 {
            return; // next fetch already queued (or current not yet issued)
        }
        if let Some(next) = self.coord.next(job) {
            let req = job.fetch_request(next, self.tile_idx + 1);
            self.enq_queue.push_back((req, PendingOp::ReadAb));
            self.fetches_enqueued += 1;
            debug!(m = next.m, n = next.n, k = next.k, "prefetch-ahead issued");
        }
    }
}
