//! APB peripheral gate banks.
//!
//! An APB gate bank is a purely bit-indexed variant of the gate clock: gate
//! `i` is bit `i` of the bank's control register, and the whole bank shares
//! one bus-enable signal that must be asserted while any gate is on. The
//! gate list comes from the platform's hardware description rather than a
//! fixed table, so registration is fallible and rolls back: a bank either
//! publishes every described gate or nothing, and losing one optional bank
//! never takes down the rest of the provider.

use heapless::Vec;

use super::gate::GateBank;
use super::{Clk, ClockTree, Error, ErrorKind, SharedEnable};
use crate::regs::RegisterBus;
use crate::time::Hertz;

/// One gate output as described by the platform: the name this bank
/// publishes, and the clock it is fed from. The bit index is the position in
/// the description list.
#[derive(Debug, Copy, Clone)]
pub struct GateDesc {
    pub output: &'static str,
    pub parent: &'static str,
}

impl GateDesc {
    pub const fn new(output: &'static str, parent: &'static str) -> Self {
        Self { output, parent }
    }
}

/// Register placement of one APB gate bank.
#[derive(Debug, Copy, Clone)]
#[non_exhaustive]
pub struct ApbGateConfig {
    /// Byte offset of the gate control register within the bank's window.
    pub ctrl_offset: u32,
    /// The bank-wide bus-enable signal, if this bank has one.
    pub shared_enable: Option<SharedEnable>,
}

impl ApbGateConfig {
    pub const fn new() -> Self {
        Self {
            ctrl_offset: 0,
            shared_enable: None,
        }
    }

    pub const fn with_ctrl_offset(mut self, ctrl_offset: u32) -> Self {
        self.ctrl_offset = ctrl_offset;
        self
    }

    pub const fn with_shared_enable(mut self, shared_enable: SharedEnable) -> Self {
        self.shared_enable = Some(shared_enable);
        self
    }
}

impl Default for ApbGateConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct Output {
    name: &'static str,
    /// Node index of the parent in the backing clock tree.
    parent: u8,
}

/// A registered APB gate bank, publishing an index → handle table over its
/// gates.
pub struct ApbGateBank<'t, B: RegisterBus, G: RegisterBus> {
    tree: &'t ClockTree<'t, B>,
    gates: GateBank<G>,
    outputs: Vec<Output, 32>,
}

impl<'t, B: RegisterBus, G: RegisterBus> ApbGateBank<'t, B, G> {
    /// Register a gate bank over its mapped register window.
    ///
    /// Gates are built in description order. If any description is bad
    /// (empty or duplicate output name, parent not present in `tree`), the
    /// gates built so far are unregistered in reverse order, the register
    /// window is released, and the error comes back
    /// [`recoverable`](Error::is_fatal) — nothing of the bank is published.
    ///
    /// On success the control register has been masked to the described
    /// gates and the shared enable signal matches their state.
    pub fn register(
        regs: G,
        config: ApbGateConfig,
        gates: &[GateDesc],
        tree: &'t ClockTree<'t, B>,
    ) -> Result<Self, Error> {
        if gates.is_empty() {
            return Err(Error::recoverable(ErrorKind::EmptyBank));
        }
        if gates.len() > 32 {
            return Err(Error::recoverable(ErrorKind::TooManyClocks));
        }

        let mut outputs: Vec<Output, 32> = Vec::new();
        for (index, desc) in gates.iter().enumerate() {
            match build_gate(desc, index, &outputs, tree) {
                Ok(output) => {
                    // Capacity checked above.
                    let _ = outputs.push(output);
                }
                Err(err) => {
                    error!(
                        "clk: apbgate: registering gate {} failed, rolling back",
                        index as u32,
                    );
                    rollback(&mut outputs);
                    // `regs` goes out of scope here: the mapping is released
                    // along with everything else the bank acquired.
                    return Err(err);
                }
            }
        }

        debug!("clk: apbgate: registered {} gates", outputs.len());
        Ok(Self {
            tree,
            gates: GateBank::new(regs, config.ctrl_offset, outputs.len() as u8, config.shared_enable),
            outputs,
        })
    }

    /// Number of published gates.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Look up a gate handle by its index in the bank.
    pub fn gate(&self, index: usize) -> Option<ApbGate<'_, 't, B, G>> {
        if index >= self.outputs.len() {
            return None;
        }
        Some(ApbGate {
            bank: self,
            index: index as u8,
        })
    }

    /// Look up a gate handle by output name.
    pub fn find(&self, name: &str) -> Option<ApbGate<'_, 't, B, G>> {
        let index = self.outputs.iter().position(|o| o.name == name)?;
        self.gate(index)
    }
}

impl<'t, B: RegisterBus, G: RegisterBus> core::fmt::Debug for ApbGateBank<'t, B, G> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApbGateBank").field("gates", &self.outputs.len()).finish()
    }
}

fn build_gate<B: RegisterBus>(
    desc: &GateDesc,
    index: usize,
    outputs: &[Output],
    tree: &ClockTree<'_, B>,
) -> Result<Output, Error> {
    if desc.output.is_empty() {
        return Err(Error::recoverable(ErrorKind::EmptyName {
            index: index as u8,
        }));
    }
    if outputs.iter().any(|o| o.name == desc.output) {
        return Err(Error::recoverable(ErrorKind::DuplicateName(desc.output)));
    }
    let parent = tree
        .find(desc.parent)
        .ok_or(Error::recoverable(ErrorKind::UnresolvedParent {
            child: desc.output,
            parent: desc.parent,
        }))?;
    Ok(Output {
        name: desc.output,
        parent: parent.index,
    })
}

fn rollback(outputs: &mut Vec<Output, 32>) {
    while let Some(output) = outputs.pop() {
        trace!("clk: apbgate: unregistered {}", output.name);
    }
}

/// Handle to one gate of an [`ApbGateBank`].
pub struct ApbGate<'a, 't, B: RegisterBus, G: RegisterBus> {
    bank: &'a ApbGateBank<'t, B, G>,
    index: u8,
}

impl<'a, 't, B: RegisterBus, G: RegisterBus> Clone for ApbGate<'a, 't, B, G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, 't, B: RegisterBus, G: RegisterBus> Copy for ApbGate<'a, 't, B, G> {}

impl<'a, 't, B: RegisterBus, G: RegisterBus> ApbGate<'a, 't, B, G> {
    fn output(&self) -> &'a Output {
        &self.bank.outputs[self.index as usize]
    }

    pub fn name(&self) -> &'static str {
        self.output().name
    }

    /// The clock feeding this gate.
    pub fn parent(&self) -> Clk<'t, B> {
        Clk {
            tree: self.bank.tree,
            index: self.output().parent,
        }
    }

    /// Current rate: APB gates carry no divider, they pass their parent
    /// through.
    pub fn rate(&self) -> Result<Hertz, Error> {
        self.parent().rate()
    }

    /// Turn the gate on and assert the bank's shared bus-enable signal.
    pub fn enable(&self) {
        self.bank.gates.enable(self.index);
    }

    /// Turn the gate off; the shared bus-enable signal is deasserted if this
    /// was the bank's last enabled gate.
    pub fn disable(&self) {
        self.bank.gates.disable(self.index);
    }

    /// Whether the gate is on, read back from the control register.
    pub fn is_enabled(&self) -> bool {
        self.bank.gates.is_enabled(self.index)
    }
}
