//! Burst DRAM channel model.
//!
//! Split-channel protocol: a read command is accepted when the channel is
//! idle, the first beat appears after a fixed latency, and subsequent beats
//! stream one per cycle under `rvalid`/`rready` flow control with a
//! last-beat marker. Writes accept one beat per cycle under `wready` and
//! pulse a write response a fixed latency after the final beat.
//!
//! The backing store is an explicitly owned, explicitly sized buffer handed
//! to the constructor — never a global. The prefetch engine is the only
//! component wired to this channel.

use bytes::Bytes;
use tilemc_chip::geometry::{BEAT_BYTES, DRAM_READ_LATENCY, DRAM_WRITE_ACK_LATENCY};
use tracing::warn;

/// One 16-byte burst beat plus its last-beat marker.
#[derive(Debug, Clone, Copy)]
pub struct DramBeat {
    /// Beat payload.
    pub data: [u8; BEAT_BYTES],
    /// Set on the final beat of the burst.
    pub last: bool,
}

/// Per-cycle channel outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DramTickOut {
    /// Read beat, emitted only when the consumer asserted ready.
    pub rdata: Option<DramBeat>,
    /// Channel will accept a write beat this cycle.
    pub wready: bool,
    /// Write response pulse: the burst is fully committed.
    pub bvalid: bool,
}

#[derive(Debug)]
enum ChannelState {
    Idle,
    ReadWait { addr: u32, beats_left: usize, cycles_left: u64 },
    ReadStream { addr: u32, beats_left: usize },
    WriteStream { addr: u32, beats_left: usize },
    WriteAck { cycles_left: u64 },
}

/// The DRAM channel and its backing store.
#[derive(Debug)]
pub struct DramModel {
    mem: Vec<u8>,
    state: ChannelState,
}

impl DramModel {
    /// Create a zero-filled DRAM of `bytes` capacity.
    #[must_use]
    pub fn new(bytes: usize) -> Self {
        Self {
            mem: vec![0u8; bytes],
            state: ChannelState::Idle,
        }
    }

    /// Backing store capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.mem.len()
    }

    /// Preload bytes at `addr` (harness backdoor, no timing).
    pub fn preload(&mut self, addr: usize, data: &[u8]) {
        if addr >= self.mem.len() {
            warn!(addr, len = data.len(), "preload past end of backing store dropped");
            return;
        }
        let end = (addr + data.len()).min(self.mem.len());
        if end < addr + data.len() {
            warn!(addr, len = data.len(), "preload truncated at DRAM boundary");
        }
        self.mem[addr..end].copy_from_slice(&data[..end - addr]);
    }

    /// Zero-copy snapshot of `len` bytes at `addr` (harness backdoor).
    #[must_use]
    pub fn snapshot(&self, addr: usize, len: usize) -> Bytes {
        let end = (addr + len).min(self.mem.len());
        Bytes::copy_from_slice(&self.mem[addr.min(self.mem.len())..end])
    }

    /// Present a read command. Returns true when accepted (channel idle).
    pub fn issue_read(&mut self, addr: u32, beats: usize) -> bool {
        if beats == 0 {
            return true;
        }
        match self.state {
            ChannelState::Idle => {
                self.state = ChannelState::ReadWait {
                    addr,
                    beats_left: beats,
                    cycles_left: DRAM_READ_LATENCY,
                };
                true
            }
            _ => false,
        }
    }

    /// Present a write command. Returns true when accepted.
    pub fn issue_write(&mut self, addr: u32, beats: usize) -> bool {
        if beats == 0 {
            return true;
        }
        match self.state {
            ChannelState::Idle => {
                self.state = ChannelState::WriteStream {
                    addr,
                    beats_left: beats,
                };
                true
            }
            _ => false,
        }
    }

    /// Push one write beat. Must only be called in a cycle where the channel
    /// reported `wready`; returns false (and drops nothing) otherwise.
    pub fn push_write_beat(&mut self, data: [u8; BEAT_BYTES]) -> bool {
        match self.state {
            ChannelState::WriteStream { addr, beats_left } => {
                self.store_beat(addr, &data);
                if beats_left == 1 {
                    self.state = ChannelState::WriteAck {
                        cycles_left: DRAM_WRITE_ACK_LATENCY,
                    };
                } else {
                    self.state = ChannelState::WriteStream {
                        addr: addr.wrapping_add(BEAT_BYTES as u32),
                        beats_left: beats_left - 1,
                    };
                }
                true
            }
            _ => false,
        }
    }

    /// Advance one cycle. `rready` is the consumer's registered ready for
    /// the read-data channel; a beat is only emitted (and consumed) when it
    /// is asserted.
    pub fn step(&mut self, rready: bool) -> DramTickOut {
        let mut out = DramTickOut::default();
        match &mut self.state {
            ChannelState::Idle => {}
            ChannelState::ReadWait {
                addr,
                beats_left,
                cycles_left,
            } => {
                if *cycles_left > 1 {
                    *cycles_left -= 1;
                } else {
                    self.state = ChannelState::ReadStream {
                        addr: *addr,
                        beats_left: *beats_left,
                    };
                }
            }
            ChannelState::ReadStream { addr, beats_left } => {
                if rready {
                    let data = Self::load_beat(&self.mem, *addr);
                    let last = *beats_left == 1;
                    out.rdata = Some(DramBeat { data, last });
                    if last {
                        self.state = ChannelState::Idle;
                    } else {
                        *addr = addr.wrapping_add(BEAT_BYTES as u32);
                        *beats_left -= 1;
                    }
                }
            }
            ChannelState::WriteStream { .. } => {
                out.wready = true;
            }
            ChannelState::WriteAck { cycles_left } => {
                if *cycles_left > 1 {
                    *cycles_left -= 1;
                } else {
                    out.bvalid = true;
                    self.state = ChannelState::Idle;
                }
            }
        }
        out
    }

    /// Abandon any in-flight burst (controller reset). Memory contents keep.
    pub fn reset_channel(&mut self) {
        self.state = ChannelState::Idle;
    }

    fn load_beat(mem: &[u8], addr: u32) -> [u8; BEAT_BYTES] {
        let mut beat = [0u8; BEAT_BYTES];
        let base = addr as usize;
        for (i, b) in beat.iter_mut().enumerate() {
            *b = mem.get(base + i).copied().unwrap_or_else(|| {
                warn!(addr = base + i, "DRAM read past end of backing store");
                0
            });
        }
        beat
    }

    fn store_beat(&mut self, addr: u32, data: &[u8; BEAT_BYTES]) {
        let base = addr as usize;
        if base + BEAT_BYTES > self.mem.len() {
            warn!(addr = base, "DRAM write past end of backing store dropped");
            return;
        }
        self.mem[base..base + BEAT_BYTES].copy_from_slice(data);
    }
}
