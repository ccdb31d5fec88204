#![no_std]
#![doc = include_str!("../README.md")]

#[cfg(test)]
extern crate std;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod utils;

pub mod clk;
pub mod regs;
pub mod time;

// Reexports
pub use clk::{Clk, ClkGate, ClockId, ClockTree, Error, ErrorKind, Severity, SharedEnable};
pub use regs::{Mmio, RegisterBus};
pub use time::Hertz;
