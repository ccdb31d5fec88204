//! Hardware clock frequency decoding.
//!
//! These functions read the current clock configuration directly from the
//! system-controller and memory-controller registers. Nothing is cached: the
//! clock source select and dividers can change at runtime, and callers must
//! see the rate the hardware is producing right now.

use super::{Error, ErrorKind};
use crate::regs::RegisterBus;
use crate::time::Hertz;

pub(crate) const SYSC_SYSTEM_CONFIG0: u32 = 0x10;
pub(crate) const SYSC_CLKCFG0: u32 = 0x2c;
pub(crate) const SYSC_CLKCFG1: u32 = 0x30;
pub(crate) const SYSC_CUR_CLK_STS: u32 = 0x44;

pub(crate) const MEMC_CPU_PLL: u32 = 0x648;

const XTAL_MODE_SEL_MASK: u32 = 0x7;
const XTAL_MODE_SEL_SHIFT: u32 = 6;

const CPU_CLK_SEL_MASK: u32 = 0x3;
const CPU_CLK_SEL_SHIFT: u32 = 30;

const CUR_CPU_FDIV_MASK: u32 = 0x1f;
const CUR_CPU_FDIV_SHIFT: u32 = 8;
const CUR_CPU_FFRAC_MASK: u32 = 0x1f;
const CUR_CPU_FFRAC_SHIFT: u32 = 0;

const CPU_PLL_PREDIV_MASK: u32 = 0x3;
const CPU_PLL_PREDIV_SHIFT: u32 = 12;
const CPU_PLL_FBDIV_MASK: u32 = 0x7f;
const CPU_PLL_FBDIV_SHIFT: u32 = 4;

/// PLL pre-divider field to right-shift amount.
const PREDIV_TO_SHIFT: [u32; 4] = [0, 1, 2, 2];

fn field(value: u32, shift: u32, mask: u32) -> u32 {
    (value >> shift) & mask
}

/// Get the crystal frequency from the bootstrap mode field.
pub(crate) fn xtal_rate<B: RegisterBus>(sysc: &B) -> Hertz {
    let mode = field(sysc.read32(SYSC_SYSTEM_CONFIG0), XTAL_MODE_SEL_SHIFT, XTAL_MODE_SEL_MASK);

    if mode <= 2 {
        Hertz::mhz(20)
    } else if mode <= 5 {
        Hertz::mhz(40)
    } else {
        Hertz::mhz(25)
    }
}

/// Get the current CPU frequency from the clock source select, the CPU PLL
/// configuration, and the fractional divider status fields.
///
/// Returns [`ErrorKind::ZeroDivider`] if the integer-divider status field
/// reads zero. The datasheet forbids that state, so rather than dividing by
/// it (or inventing a rate), the violation is handed to the caller.
pub(crate) fn cpu_rate<B: RegisterBus>(sysc: &B, memc: &B, xtal: Hertz) -> Result<Hertz, Error> {
    let clk_sel = field(sysc.read32(SYSC_CLKCFG0), CPU_CLK_SEL_SHIFT, CPU_CLK_SEL_MASK);

    let curclk = sysc.read32(SYSC_CUR_CLK_STS);
    let ffiv = field(curclk, CUR_CPU_FDIV_SHIFT, CUR_CPU_FDIV_MASK);
    let ffrac = field(curclk, CUR_CPU_FFRAC_SHIFT, CUR_CPU_FFRAC_MASK);

    let cpu_clk: u64 = match clk_sel {
        0 => 500_000_000,
        1 => {
            let pll = memc.read32(MEMC_CPU_PLL);
            let fbdiv = field(pll, CPU_PLL_FBDIV_SHIFT, CPU_PLL_FBDIV_MASK);
            let prediv = field(pll, CPU_PLL_PREDIV_SHIFT, CPU_PLL_PREDIV_MASK);
            ((fbdiv as u64 + 1) * xtal.0 as u64) >> PREDIV_TO_SHIFT[prediv as usize]
        }
        _ => xtal.0 as u64,
    };

    if ffiv == 0 {
        return Err(Error::fatal(ErrorKind::ZeroDivider));
    }

    // Divide before multiplying; the fields describe an integer ratio of the
    // raw clock, not a rational to be reduced.
    Ok(Hertz((cpu_clk / ffiv as u64 * ffrac as u64) as u32))
}

/// The bus clock is a fixed quarter of the CPU clock.
pub(crate) fn bus_rate(cpu: Hertz) -> Hertz {
    cpu / 4
}
