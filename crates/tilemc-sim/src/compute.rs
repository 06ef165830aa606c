//! Compute engine collaborator.
//!
//! The compute engine is external to the memory subsystem: it consumes the
//! tile handshake from the scheduler and issues its own SRAM requests on
//! the arbiter's second port, under the same request/response contract as
//! the prefetch engine. [`ComputeModel`] is the seam; [`MacComputeModel`]
//! is the reference implementation used by the harnesses — an int8 MAC
//! array that loads A and B one word per cycle, multiplies, and stores the
//! int32 partial products back.

use tilemc_chip::geometry::SRAM_WORD_BYTES;
use tracing::debug;

use crate::job::TileMeta;
use crate::sram::{BankRequest, Requestor};

/// Per-cycle outputs of a compute model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeOut {
    /// Accept the offered tile this cycle.
    pub tile_ready: bool,
    /// Single-cycle pulse: the accepted tile's results are in SRAM.
    pub tile_done: bool,
    /// SRAM request on the compute port (held until granted).
    pub bank_req: Option<BankRequest>,
}

/// A compute engine stepped on the subsystem clock.
pub trait ComputeModel: std::fmt::Debug {
    /// Advance one cycle.
    ///
    /// `tile` is the scheduler's offer (`tile_valid` level plus metadata);
    /// `granted` and `rdata` are the previous cycle's arbiter responses on
    /// the compute port.
    fn step(&mut self, tile: Option<&TileMeta>, granted: bool, rdata: Option<u32>) -> ComputeOut;

    /// Return to the initial state, dropping any tile in progress.
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CState {
    Idle,
    LoadA,
    LoadB,
    Mac,
    StoreC,
    Finish,
}

/// Reference int8 GEMM tile engine.
///
/// Word-serial on purpose: every SRAM access goes through the arbiter, so a
/// job run with this model exercises real two-requestor contention. The MAC
/// itself completes in a single cycle — arithmetic timing is out of scope
/// for the memory subsystem model.
#[derive(Debug)]
pub struct MacComputeModel {
    state: CState,
    meta: Option<TileMeta>,
    word_idx: usize,
    /// Request on the wire, not yet granted.
    presented: bool,
    /// Read granted, data still in the bank pipeline.
    awaiting: bool,
    a_bytes: Vec<u8>,
    b_bytes: Vec<u8>,
    c_words: Vec<i32>,
    tiles_done: u64,
}

impl Default for MacComputeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MacComputeModel {
    /// Create an idle engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: CState::Idle,
            meta: None,
            word_idx: 0,
            presented: false,
            awaiting: false,
            a_bytes: Vec::new(),
            b_bytes: Vec::new(),
            c_words: Vec::new(),
            tiles_done: 0,
        }
    }

    /// Tiles completed since construction or reset.
    #[must_use]
    pub fn tiles_done(&self) -> u64 {
        self.tiles_done
    }

    fn words_for_bytes(n: usize) -> usize {
        n.div_ceil(SRAM_WORD_BYTES)
    }

    /// Advance a word-serial read sequence over `total` words starting at
    /// `base`, landing completed words into `sink`. Returns true when all
    /// words have been captured.
    fn load_words(
        &mut self,
        base: u32,
        total: usize,
        granted: bool,
        rdata: Option<u32>,
        out: &mut ComputeOut,
    ) -> bool {
        if self.presented {
            if granted {
                self.presented = false;
                self.awaiting = true;
            } else {
                // Held not-ready; with fixed-priority arbitration the
                // compute port can stall for several cycles on a conflict.
                out.bank_req = Some(BankRequest {
                    requestor: Requestor::Compute,
                    addr: base.wrapping_add(self.word_idx as u32),
                    is_write: false,
                    data: 0,
                });
                return false;
            }
        }
        if self.awaiting {
            let Some(word) = rdata else { return false };
            match self.state {
                CState::LoadA => self.a_bytes.extend_from_slice(&word.to_le_bytes()),
                CState::LoadB => self.b_bytes.extend_from_slice(&word.to_le_bytes()),
                _ => {}
            }
            self.awaiting = false;
            self.word_idx += 1;
        }
        if self.word_idx == total {
            self.word_idx = 0;
            return true;
        }
        out.bank_req = Some(BankRequest {
            requestor: Requestor::Compute,
            addr: base.wrapping_add(self.word_idx as u32),
            is_write: false,
            data: 0,
        });
        self.presented = true;
        false
    }

    fn mac(&mut self) {
        let meta = self.meta.expect("tile in progress");
        let (tm, tn, tk) = (meta.tm as usize, meta.tn as usize, meta.tk as usize);
        self.c_words = vec![0i32; tm * tn];
        for i in 0..tm {
            for j in 0..tn {
                let mut acc = 0i32;
                for kk in 0..tk {
                    let a = self.a_bytes[i * tk + kk] as i8;
                    let b = self.b_bytes[kk * tn + j] as i8;
                    acc = acc.wrapping_add(i32::from(a) * i32::from(b));
                }
                self.c_words[i * tn + j] = acc;
            }
        }
    }
}

impl ComputeModel for MacComputeModel {
    fn step(&mut self, tile: Option<&TileMeta>, granted: bool, rdata: Option<u32>) -> ComputeOut {
        let mut out = ComputeOut::default();

        match self.state {
            CState::Idle => {
                if let Some(meta) = tile {
                    debug!(?meta, "tile accepted");
                    self.meta = Some(*meta);
                    self.a_bytes.clear();
                    self.b_bytes.clear();
                    self.word_idx = 0;
                    self.presented = false;
                    self.awaiting = false;
                    out.tile_ready = true;
                    self.state = CState::LoadA;
                }
            }
            CState::LoadA => {
                let meta = self.meta.expect("tile in progress");
                let total = Self::words_for_bytes((meta.tm * meta.tk) as usize);
                if self.load_words(meta.sram_addr_a, total, granted, rdata, &mut out) {
                    self.state = CState::LoadB;
                }
            }
            CState::LoadB => {
                let meta = self.meta.expect("tile in progress");
                let total = Self::words_for_bytes((meta.tk * meta.tn) as usize);
                if self.load_words(meta.sram_addr_b, total, granted, rdata, &mut out) {
                    self.state = CState::Mac;
                }
            }
            CState::Mac => {
                self.mac();
                self.word_idx = 0;
                self.presented = false;
                self.state = CState::StoreC;
            }
            CState::StoreC => {
                // One write per cycle; a write needs no data return, so the
                // grant alone retires it.
                if self.presented && granted {
                    self.presented = false;
                    self.word_idx += 1;
                }
                if self.word_idx == self.c_words.len() && !self.presented {
                    self.state = CState::Finish;
                } else {
                    let meta = self.meta.expect("tile in progress");
                    out.bank_req = Some(BankRequest {
                        requestor: Requestor::Compute,
                        addr: meta.sram_addr_c.wrapping_add(self.word_idx as u32),
                        is_write: true,
                        data: self.c_words[self.word_idx] as u32,
                    });
                    self.presented = true;
                }
            }
            CState::Finish => {
                out.tile_done = true;
                self.tiles_done += 1;
                self.meta = None;
                self.state = CState::Idle;
            }
        }

        out
    }

    fn reset(&mut self) {
        let done = self.tiles_done;
        *self = Self::new();
        self.tiles_done = done;
    }
}
