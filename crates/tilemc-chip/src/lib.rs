//! Silicon model for the GEMM tile memory controller.
//!
//! This crate has **no dependencies** and **no simulation behavior** — it is
//! a pure description of the hardware contract: the address-mapped register
//! map, the fixed memory geometry (banks, beats, queue depths), and the
//! pipeline latencies every requestor must honor.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`regs`] | Configuration/status register map — all offsets and bit definitions |
//! | [`geometry`] | DRAM beat width, SRAM bank layout, element sizes, queue depth |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod geometry;
pub mod regs;
