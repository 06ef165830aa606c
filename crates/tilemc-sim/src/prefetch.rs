//! DRAM prefetch engine.
//!
//! Executes one [`FetchRequest`] end-to-end: burst-read operand tiles from
//! DRAM, convert 16-byte beats to SRAM words, and write them through the
//! bank arbiter; or, for writeback, read the current C tile from DRAM,
//! accumulate the freshly computed SRAM tile into it (int32 lanes), and
//! stream the sums back, waiting for the write acknowledgment.
//!
//! The engine owns the DRAM channel outright — no other component touches
//! it. Requests are serviced strictly FIFO, one at a time, with no
//! interleaving. `fetch_done` is a single-cycle pulse emitted exactly once
//! per request; the enqueue path is edge-triggered (a producer request is
//! pushed on the accepting call, never re-sampled), so duplicates cannot
//! arise no matter how long the producer holds its request.

use std::collections::VecDeque;

use tilemc_chip::geometry::{
    beats_for, BEAT_BYTES, ELEM_BYTES_AB, ELEM_BYTES_C, FETCH_QUEUE_DEPTH, SRAM_WORD_BYTES,
    WORDS_PER_BEAT,
};
use tracing::{debug, trace};

use crate::dram::{DramModel, DramTickOut};
use crate::job::{FetchKind, FetchRequest};
use crate::sram::{BankRequest, Requestor};

/// Engine state. The ten states mirror the phases of a request's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for (or dequeuing) the next request.
    Idle,
    /// Presenting the A-tile read command to DRAM.
    IssueReadA,
    /// Receiving A beats and draining words into SRAM.
    StreamA,
    /// Presenting the B-tile read command.
    IssueReadB,
    /// Receiving B beats and draining words into SRAM.
    StreamB,
    /// Pulsing `fetch_done`.
    SignalDone,
    /// Presenting the old-C read command (accumulate source).
    IssueReadC,
    /// Collecting the old C beats.
    StreamReadC,
    /// Gathering fresh C words from SRAM and streaming sum beats out.
    StreamWriteC,
    /// Waiting for the DRAM write response.
    WaitWriteAck,
}

/// The bank request the engine put forward last cycle, awaiting grant.
#[derive(Debug, Clone, Copy)]
enum Presented {
    Write,
    Read,
}

/// Per-cycle inputs, all registered from the previous cycle by the caller.
#[derive(Debug, Clone, Copy)]
pub struct PrefetchIn {
    /// DRAM channel outputs for this cycle.
    pub dram: DramTickOut,
    /// Last cycle's presented bank request was granted.
    pub sram_granted: bool,
    /// Read data pulse from the arbiter's prefetch port.
    pub sram_rdata: Option<u32>,
}

/// Per-cycle outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefetchOut {
    /// Bank request presented this cycle (held until granted).
    pub bank_req: Option<BankRequest>,
    /// Completion pulse: the request at the head of the FIFO finished.
    pub fetch_done: bool,
    /// Ready to accept a DRAM read beat next cycle.
    pub rready: bool,
    /// A DRAM read beat was consumed this cycle.
    pub read_beat: bool,
    /// A DRAM write beat was pushed this cycle.
    pub write_beat: bool,
    /// Engine is idle with an empty queue.
    pub idle: bool,
}

/// The prefetch engine: request queue plus streaming state machine.
#[derive(Debug)]
pub struct PrefetchEngine {
    queue: VecDeque<FetchRequest>,
    state: State,
    cur: Option<FetchRequest>,

    // Operand streaming (A/B): words converted from beats, pending drain.
    word_fifo: VecDeque<(u32, u32)>,
    valid_bytes_left: usize,
    next_word_addr: u32,
    beats_remaining: usize,
    presented: Option<Presented>,

    // C writeback bookkeeping.
    old_c: Vec<u8>,
    c_valid_words: usize,
    c_word_idx: usize,
    gather: Vec<u32>,
    wb_beats_total: usize,
    wb_beat_idx: usize,
    aw_issued: bool,
    read_pending: bool,
}

impl Default for PrefetchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PrefetchEngine {
    /// Create an idle engine with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: VecDeque::with_capacity(FETCH_QUEUE_DEPTH),
            state: State::Idle,
            cur: None,
            word_fifo: VecDeque::new(),
            valid_bytes_left: 0,
            next_word_addr: 0,
            beats_remaining: 0,
            presented: None,
            old_c: Vec::new(),
            c_valid_words: 0,
            c_word_idx: 0,
            gather: Vec::with_capacity(WORDS_PER_BEAT),
            wb_beats_total: 0,
            wb_beat_idx: 0,
            aw_issued: false,
            read_pending: false,
        }
    }

    /// Accept a request if the 4-deep queue has room. Returns false to
    /// backpressure the producer; nothing is ever silently dropped.
    pub fn try_enqueue(&mut self, req: FetchRequest) -> bool {
        if self.queue.len() >= FETCH_QUEUE_DEPTH {
            trace!(?req, "fetch queue full, backpressuring");
            return false;
        }
        debug!(kind = ?req.kind, "fetch request accepted");
        self.queue.push_back(req);
        true
    }

    /// Requests accepted but not yet completed.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len() + usize::from(self.cur.is_some())
    }

    /// Engine has nothing to do.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle) && self.queue.is_empty()
    }

    /// Return to the initial state, discarding queued and in-flight work.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advance one cycle.
    pub fn step(&mut self, dram: &mut DramModel, input: &PrefetchIn) -> PrefetchOut {
        let mut out = PrefetchOut::default();

        // Resolve the grant for last cycle's presented bank request.
        if input.sram_granted {
            match self.presented.take() {
                Some(Presented::Write) => {
                    self.word_fifo.pop_front();
                }
                Some(Presented::Read) => {
                    self.read_pending = true;
                }
                None => {}
            }
        }

        match self.state {
            State::Idle => {
                if let Some(req) = self.queue.pop_front() {
                    self.state = match req.kind {
                        FetchKind::ReadAb => State::IssueReadA,
                        FetchKind::WriteC => State::IssueReadC,
                    };
                    debug!(kind = ?req.kind, "dequeued fetch request");
                    self.cur = Some(req);
                } else {
                    out.idle = true;
                }
            }

            State::IssueReadA => {
                let req = self.cur.expect("request in flight");
                let beats = beats_for(req.num_elements_a as usize, ELEM_BYTES_AB);
                if beats == 0 {
                    self.state = State::IssueReadB;
                } else if dram.issue_read(req.dram_addr_a, beats) {
                    self.begin_operand_stream(
                        req.sram_addr_a,
                        req.num_elements_a as usize * ELEM_BYTES_AB,
                        beats,
                    );
                    self.state = State::StreamA;
                }
            }

            State::StreamA => {
                self.stream_operand(input, &mut out);
                if self.operand_drained() {
                    self.state = State::IssueReadB;
                }
            }

            State::IssueReadB => {
                let req = self.cur.expect("request in flight");
                let beats = beats_for(req.num_elements_b as usize, ELEM_BYTES_AB);
                if beats == 0 {
                    self.state = State::SignalDone;
                } else if dram.issue_read(req.dram_addr_b, beats) {
                    self.begin_operand_stream(
                        req.sram_addr_b,
                        req.num_elements_b as usize * ELEM_BYTES_AB,
                        beats,
                    );
                    self.state = State::StreamB;
                }
            }

            State::StreamB => {
                self.stream_operand(input, &mut out);
                if self.operand_drained() {
                    self.state = State::SignalDone;
                }
            }

            State::SignalDone => {
                out.fetch_done = true;
                self.cur = None;
                self.state = State::Idle;
            }

            State::IssueReadC => {
                let req = self.cur.expect("request in flight");
                let beats = beats_for(req.num_elements_c as usize, ELEM_BYTES_C);
                if beats == 0 {
                    self.state = State::SignalDone;
                } else if dram.issue_read(req.dram_addr_c, beats) {
                    self.old_c.clear();
                    self.beats_remaining = beats;
                    self.state = State::StreamReadC;
                }
            }

            State::StreamReadC => {
                out.rready = true;
                if let Some(beat) = input.dram.rdata {
                    self.old_c.extend_from_slice(&beat.data);
                    out.read_beat = true;
                    self.beats_remaining -= 1;
                    if self.beats_remaining == 0 {
                        let req = self.cur.expect("request in flight");
                        self.wb_beats_total =
                            beats_for(req.num_elements_c as usize, ELEM_BYTES_C);
                        self.c_valid_words = req.num_elements_c as usize;
                        self.c_word_idx = 0;
                        self.wb_beat_idx = 0;
                        self.gather.clear();
                        self.aw_issued = false;
                        self.read_pending = false;
                        self.state = State::StreamWriteC;
                    }
                }
            }

            State::StreamWriteC => {
                self.stream_writeback(dram, input, &mut out);
                if self.wb_beat_idx == self.wb_beats_total {
                    self.state = State::WaitWriteAck;
                }
            }

            State::WaitWriteAck => {
                if input.dram.bvalid {
                    self.state = State::SignalDone;
                }
            }
        }

        out
    }

    fn begin_operand_stream(&mut self, sram_addr: u32, valid_bytes: usize, beats: usize) {
        self.word_fifo.clear();
        self.valid_bytes_left = valid_bytes;
        self.next_word_addr = sram_addr;
        self.beats_remaining = beats;
    }

    /// Receive at most one beat and drain at most one SRAM word per cycle.
    fn stream_operand(&mut self, input: &PrefetchIn, out: &mut PrefetchOut) {
        // Accept another beat only when there is room to convert it whole;
        // this is the rready backpressure toward the DRAM channel.
        out.rready = self.beats_remaining > 0 && self.word_fifo.len() <= WORDS_PER_BEAT;

        if let Some(beat) = input.dram.rdata {
            self.ingest_beat(&beat.data);
            out.read_beat = true;
            self.beats_remaining -= 1;
        }

        if let Some(&(addr, data)) = self.word_fifo.front() {
            out.bank_req = Some(BankRequest {
                requestor: Requestor::Prefetch,
                addr,
                is_write: true,
                data,
            });
            if self.presented.is_none() {
                self.presented = Some(Presented::Write);
            }
        }
    }

    /// Width conversion: one 16-byte beat becomes four SRAM words. Bytes at
    /// or past the operand's valid length are forced to zero, so the padded
    /// tail of the last beat is deterministic.
    fn ingest_beat(&mut self, beat: &[u8; BEAT_BYTES]) {
        for chunk in 0..WORDS_PER_BEAT {
            let mut word_bytes = [0u8; SRAM_WORD_BYTES];
            for (i, wb) in word_bytes.iter_mut().enumerate() {
                let byte_idx = chunk * SRAM_WORD_BYTES + i;
                if byte_idx < self.valid_bytes_left {
                    *wb = beat[byte_idx];
                }
            }
            self.word_fifo
                .push_back((self.next_word_addr, u32::from_le_bytes(word_bytes)));
            self.next_word_addr = self.next_word_addr.wrapping_add(1);
        }
        self.valid_bytes_left = self.valid_bytes_left.saturating_sub(BEAT_BYTES);
    }

    fn operand_drained(&self) -> bool {
        self.beats_remaining == 0 && self.word_fifo.is_empty() && self.presented.is_none()
    }

    /// Writeback streaming: gather four fresh C words from SRAM (zero for
    /// words past the valid element count), add them lane-wise onto the old
    /// DRAM beat, and push the sum when the channel is ready.
    fn stream_writeback(&mut self, dram: &mut DramModel, input: &PrefetchIn, out: &mut PrefetchOut) {
        let req = self.cur.expect("request in flight");

        if !self.aw_issued {
            if dram.issue_write(req.dram_addr_c, self.wb_beats_total) {
                self.aw_issued = true;
            }
            return;
        }

        // Land an SRAM word that completed its read pipeline.
        if self.read_pending {
            if let Some(word) = input.sram_rdata {
                self.gather.push(word);
                self.read_pending = false;
                self.c_word_idx += 1;
            }
        }

        // Keep the gather moving: request the next valid word, or pad the
        // tail with zero contributions (old DRAM bytes pass through).
        if !self.read_pending && self.presented.is_none() && self.gather.len() < WORDS_PER_BEAT {
            if self.c_word_idx < self.c_valid_words {
                out.bank_req = Some(BankRequest {
                    requestor: Requestor::Prefetch,
                    addr: req.sram_addr_c.wrapping_add(self.c_word_idx as u32),
                    is_write: false,
                    data: 0,
                });
                self.presented = Some(Presented::Read);
            } else {
                while self.gather.len() < WORDS_PER_BEAT {
                    self.gather.push(0);
                    self.c_word_idx += 1;
                }
            }
        } else if let Some(Presented::Read) = self.presented {
            // Hold the unanswered read request on the port.
            out.bank_req = Some(BankRequest {
                requestor: Requestor::Prefetch,
                addr: req.sram_addr_c.wrapping_add(self.c_word_idx as u32),
                is_write: false,
                data: 0,
            });
        }

        // Beat complete: accumulate onto the old contents and push.
        if self.gather.len() == WORDS_PER_BEAT && input.dram.wready {
            let base = self.wb_beat_idx * BEAT_BYTES;
            let mut beat = [0u8; BEAT_BYTES];
            for lane in 0..WORDS_PER_BEAT {
                let off = base + lane * SRAM_WORD_BYTES;
                let old = i32::from_le_bytes(
                    self.old_c[off..off + SRAM_WORD_BYTES].try_into().expect("lane"),
                );
                let sum = old.wrapping_add(self.gather[lane] as i32);
                beat[lane * SRAM_WORD_BYTES..(lane + 1) * SRAM_WORD_BYTES]
                    .copy_from_slice(&sum.to_le_bytes());
            }
            if dram.push_write_beat(beat) {
                out.write_beat = true;
                self.gather.clear();
                self.wb_beat_idx += 1;
            }
        }
    }
}
