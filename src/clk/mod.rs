//! MT7621 clock tree.
//!
//! The provider publishes one handle per clock: three derived clocks whose
//! rates are decoded from register state on every query (crystal → CPU →
//! bus), and the `CLKCFG1` peripheral gates. Gate on/off state lives in the
//! hardware register only. Banks with a shared bus-enable line are registered
//! separately, see [`apbgate`].
//!
//! Construction is all-or-nothing: a tree either comes up with every declared
//! clock resolved, or not at all. Failures carry a [`Severity`] so the host
//! decides whether to abort (the base topology is required for the platform
//! to run) or continue degraded (an optional gate bank).

use heapless::Vec;

use crate::regs::RegisterBus;
use crate::time::Hertz;

pub mod apbgate;
mod gate;
mod rate;

pub use gate::SharedEnable;


/// Capacity of one registry. The base topology plus the full gate table is
/// 23 clocks; one control register can gate at most 32.
pub const MAX_CLOCKS: usize = 32;

// =============================================================================
// Errors
// =============================================================================

/// Whether a failure leaves the whole provider unusable or only the
/// subsystem being registered.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Severity {
    /// The platform cannot run without the failed clocks. The caller should
    /// treat the provider as absent and abort startup.
    Fatal,
    /// One optional bank is unavailable; everything registered before it is
    /// untouched and remains usable.
    Recoverable,
}

/// What went wrong.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// A clock names a parent that does not exist in the registry.
    UnresolvedParent {
        child: &'static str,
        parent: &'static str,
    },
    /// Two clocks declare the same name (or the same id).
    DuplicateName(&'static str),
    /// A gate description carries no output name.
    EmptyName { index: u8 },
    /// A clock whose rate derives from its parent declares none.
    MissingParent { child: &'static str },
    /// A parent chain does not terminate at a root.
    ParentCycle(&'static str),
    /// A gate bit index does not fit the bank's control register.
    BitOutOfRange { name: &'static str, bit: u8 },
    /// More clocks declared than the registry can hold.
    TooManyClocks,
    /// A gate bank with no gates.
    EmptyBank,
    /// The CPU integer-divider status field read zero, which the hardware
    /// contract rules out. No rate can be reported.
    ZeroDivider,
}

/// Clock tree error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Error {
    pub kind: ErrorKind,
    pub severity: Severity,
}

impl Error {
    pub(crate) const fn fatal(kind: ErrorKind) -> Self {
        Self {
            kind,
            severity: Severity::Fatal,
        }
    }

    pub(crate) const fn recoverable(kind: ErrorKind) -> Self {
        Self {
            kind,
            severity: Severity::Recoverable,
        }
    }

    /// Whether the caller should give up on the whole provider.
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

// =============================================================================
// Clock identifiers
// =============================================================================

/// Stable numeric clock identifiers, as consumed by downstream drivers.
///
/// The values follow registration order (dependency order) and do not change
/// across platform revisions.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ClockId {
    Xtal = 0,
    Cpu = 1,
    Bus = 2,
    Hsdma = 3,
    Fe = 4,
    SpdifTx = 5,
    Timer = 6,
    Pcm = 7,
    Pio = 8,
    Gdma = 9,
    Nand = 10,
    I2c = 11,
    I2s = 12,
    Spi = 13,
    Uart1 = 14,
    Uart2 = 15,
    Uart3 = 16,
    Eth = 17,
    Pcie0 = 18,
    Pcie1 = 19,
    Pcie2 = 20,
    Crypto = 21,
    Sdxc = 22,
}

impl ClockId {
    /// Every clock the MT7621 topology declares, in registration order.
    pub const ALL: [ClockId; 23] = [
        ClockId::Xtal,
        ClockId::Cpu,
        ClockId::Bus,
        ClockId::Hsdma,
        ClockId::Fe,
        ClockId::SpdifTx,
        ClockId::Timer,
        ClockId::Pcm,
        ClockId::Pio,
        ClockId::Gdma,
        ClockId::Nand,
        ClockId::I2c,
        ClockId::I2s,
        ClockId::Spi,
        ClockId::Uart1,
        ClockId::Uart2,
        ClockId::Uart3,
        ClockId::Eth,
        ClockId::Pcie0,
        ClockId::Pcie1,
        ClockId::Pcie2,
        ClockId::Crypto,
        ClockId::Sdxc,
    ];
}

// =============================================================================
// Topology description
// =============================================================================

/// Rate rule of a derived clock.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RateRule {
    /// Crystal frequency from the bootstrap mode field. Root, no parent.
    Xtal,
    /// CPU frequency from the clock select, PLL and divider status fields.
    CpuPll,
    /// Fixed quarter of the parent.
    BusDiv4,
}

/// One derived clock in a topology table.
#[derive(Debug, Copy, Clone)]
pub struct BaseDef {
    pub id: ClockId,
    pub name: &'static str,
    pub parent: Option<&'static str>,
    pub rule: RateRule,
}

impl BaseDef {
    pub const fn root(id: ClockId, name: &'static str, rule: RateRule) -> Self {
        Self {
            id,
            name,
            parent: None,
            rule,
        }
    }

    pub const fn derived(id: ClockId, name: &'static str, parent: &'static str, rule: RateRule) -> Self {
        Self {
            id,
            name,
            parent: Some(parent),
            rule,
        }
    }
}

/// One gate clock in a topology table.
#[derive(Debug, Copy, Clone)]
pub struct GateDef {
    pub id: ClockId,
    pub name: &'static str,
    pub parent: &'static str,
    pub bit: u8,
    pub fixed_rate: Option<Hertz>,
}

impl GateDef {
    /// A gate reporting a fixed nominal rate, parented to the crystal.
    pub const fn fixed(id: ClockId, name: &'static str, mhz: u32, bit: u8) -> Self {
        Self {
            id,
            name,
            parent: "xtal",
            bit,
            fixed_rate: Some(Hertz::mhz(mhz)),
        }
    }

    /// A gate whose rate follows its parent.
    pub const fn parented(id: ClockId, name: &'static str, parent: &'static str, bit: u8) -> Self {
        Self {
            id,
            name,
            parent,
            bit,
            fixed_rate: None,
        }
    }
}

const BASE_CLOCKS: [BaseDef; 3] = [
    BaseDef::root(ClockId::Xtal, "xtal", RateRule::Xtal),
    BaseDef::derived(ClockId::Cpu, "cpu", "xtal", RateRule::CpuPll),
    BaseDef::derived(ClockId::Bus, "bus", "cpu", RateRule::BusDiv4),
];

const GATE_CLOCKS: [GateDef; 20] = [
    GateDef::fixed(ClockId::Hsdma, "hsdma", 50, 5),
    GateDef::fixed(ClockId::Fe, "fe", 250, 6),
    GateDef::fixed(ClockId::SpdifTx, "spidftx", 270, 7),
    GateDef::fixed(ClockId::Timer, "timer", 50, 8),
    GateDef::fixed(ClockId::Pcm, "pcm", 270, 11),
    GateDef::fixed(ClockId::Pio, "pio", 50, 13),
    GateDef::parented(ClockId::Gdma, "gdma", "bus", 14),
    GateDef::fixed(ClockId::Nand, "nand", 125, 15),
    GateDef::fixed(ClockId::I2c, "i2c", 50, 16),
    GateDef::fixed(ClockId::I2s, "i2s", 270, 17),
    GateDef::parented(ClockId::Spi, "spi", "bus", 18),
    GateDef::fixed(ClockId::Uart1, "uart1", 50, 19),
    GateDef::fixed(ClockId::Uart2, "uart2", 50, 20),
    GateDef::fixed(ClockId::Uart3, "uart3", 50, 21),
    GateDef::fixed(ClockId::Eth, "eth", 50, 23),
    GateDef::fixed(ClockId::Pcie0, "pcie0", 125, 24),
    GateDef::fixed(ClockId::Pcie1, "pcie1", 125, 25),
    GateDef::fixed(ClockId::Pcie2, "pcie2", 125, 26),
    GateDef::fixed(ClockId::Crypto, "crypto", 250, 29),
    GateDef::fixed(ClockId::Sdxc, "sdxc", 50, 30),
];

// =============================================================================
// Clock tree
// =============================================================================

#[derive(Debug, Copy, Clone)]
enum NodeRule {
    Derived(RateRule),
    Gate { bit: u8, fixed_rate: Option<Hertz> },
}

struct Node {
    id: ClockId,
    name: &'static str,
    parent_name: Option<&'static str>,
    parent: Option<u8>,
    rule: NodeRule,
}

impl Node {
    fn needs_parent(&self) -> bool {
        match self.rule {
            NodeRule::Derived(RateRule::Xtal) => false,
            NodeRule::Derived(_) => true,
            NodeRule::Gate { fixed_rate, .. } => fixed_rate.is_none(),
        }
    }
}

/// The clock registry: derived clocks plus the `CLKCFG1` gate bank, built
/// from a topology table and published as id → handle lookups.
pub struct ClockTree<'d, B: RegisterBus> {
    sysc: &'d B,
    memc: &'d B,
    gates: gate::GateBank<&'d B>,
    nodes: Vec<Node, MAX_CLOCKS>,
}

impl<'d, B: RegisterBus> ClockTree<'d, B> {
    /// Build the standard MT7621 topology from the system-controller and
    /// memory-controller register windows.
    ///
    /// An error here is [`Severity::Fatal`]: these clocks are required for
    /// the platform to run at all.
    pub fn new(sysc: &'d B, memc: &'d B) -> Result<Self, Error> {
        Self::with_topology(sysc, memc, &BASE_CLOCKS, &GATE_CLOCKS)
    }

    /// Build a tree from an explicit topology description.
    ///
    /// Derived clocks must precede the gates that scale with them; parents
    /// are resolved by name in a second pass over the constructed nodes, so
    /// table order beyond that does not matter.
    pub fn with_topology(
        sysc: &'d B,
        memc: &'d B,
        base: &[BaseDef],
        gates: &[GateDef],
    ) -> Result<Self, Error> {
        let mut tree = Self {
            sysc,
            memc,
            gates: gate::GateBank::new(sysc, rate::SYSC_CLKCFG1, 32, None),
            nodes: Vec::new(),
        };

        for def in base {
            tree.add_node(def.id, def.name, def.parent, NodeRule::Derived(def.rule))?;
        }
        for def in gates {
            if def.bit >= tree.gates.num_gates() {
                return Err(Error::fatal(ErrorKind::BitOutOfRange {
                    name: def.name,
                    bit: def.bit,
                }));
            }
            let rule = NodeRule::Gate {
                bit: def.bit,
                fixed_rate: def.fixed_rate,
            };
            tree.add_node(def.id, def.name, Some(def.parent), rule)?;
        }

        tree.resolve_parents()?;
        tree.check_forest()?;

        debug!("clk: registered {} clocks", tree.nodes.len());
        Ok(tree)
    }

    fn add_node(
        &mut self,
        id: ClockId,
        name: &'static str,
        parent_name: Option<&'static str>,
        rule: NodeRule,
    ) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::fatal(ErrorKind::EmptyName {
                index: self.nodes.len() as u8,
            }));
        }
        if self.nodes.iter().any(|n| n.name == name || n.id == id) {
            return Err(Error::fatal(ErrorKind::DuplicateName(name)));
        }
        let node = Node {
            id,
            name,
            parent_name,
            parent: None,
            rule,
        };
        self.nodes
            .push(node)
            .map_err(|_| Error::fatal(ErrorKind::TooManyClocks))
    }

    /// Second build phase: turn parent names into indices, so no forward
    /// declarations are needed in the tables.
    fn resolve_parents(&mut self) -> Result<(), Error> {
        for i in 0..self.nodes.len() {
            let node = &self.nodes[i];
            match node.parent_name {
                Some(parent_name) => {
                    let parent = self
                        .nodes
                        .iter()
                        .position(|n| n.name == parent_name)
                        .ok_or(Error::fatal(ErrorKind::UnresolvedParent {
                            child: node.name,
                            parent: parent_name,
                        }))?;
                    self.nodes[i].parent = Some(parent as u8);
                }
                None => {
                    if node.needs_parent() {
                        return Err(Error::fatal(ErrorKind::MissingParent { child: node.name }));
                    }
                }
            }
        }
        Ok(())
    }

    /// Every parent chain must reach a root in finitely many steps.
    fn check_forest(&self) -> Result<(), Error> {
        for node in &self.nodes {
            let mut steps = 0;
            let mut cursor = node.parent;
            while let Some(parent) = cursor {
                steps += 1;
                if steps > self.nodes.len() {
                    return Err(Error::fatal(ErrorKind::ParentCycle(node.name)));
                }
                cursor = self.nodes[parent as usize].parent;
            }
        }
        Ok(())
    }

    /// Look up a clock handle by its stable id.
    pub fn resolve(&self, id: ClockId) -> Option<Clk<'_, B>> {
        let index = self.nodes.iter().position(|n| n.id == id)?;
        Some(Clk {
            tree: self,
            index: index as u8,
        })
    }

    /// Look up a clock handle by name.
    pub fn find(&self, name: &str) -> Option<Clk<'_, B>> {
        let index = self.nodes.iter().position(|n| n.name == name)?;
        Some(Clk {
            tree: self,
            index: index as u8,
        })
    }

    /// Number of published clocks.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn rate_of(&self, index: u8) -> Result<Hertz, Error> {
        let node = &self.nodes[index as usize];
        let parent_rate = match node.parent {
            Some(parent) => Some(self.rate_of(parent)?),
            None => None,
        };
        match node.rule {
            NodeRule::Derived(RateRule::Xtal) => Ok(rate::xtal_rate(self.sysc)),
            NodeRule::Derived(RateRule::CpuPll) => {
                rate::cpu_rate(self.sysc, self.memc, require_parent(parent_rate, node)?)
            }
            NodeRule::Derived(RateRule::BusDiv4) => {
                Ok(rate::bus_rate(require_parent(parent_rate, node)?))
            }
            NodeRule::Gate {
                fixed_rate: Some(rate),
                ..
            } => Ok(rate),
            NodeRule::Gate { fixed_rate: None, .. } => require_parent(parent_rate, node),
        }
    }
}

impl<'d, B: RegisterBus> core::fmt::Debug for ClockTree<'d, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClockTree").field("clocks", &self.nodes.len()).finish()
    }
}

fn require_parent(rate: Option<Hertz>, node: &Node) -> Result<Hertz, Error> {
    // Unreachable after a successful build; kept total instead of panicking.
    rate.ok_or(Error::fatal(ErrorKind::MissingParent { child: node.name }))
}

// =============================================================================
// Handles
// =============================================================================

/// Handle to one clock in a [`ClockTree`].
pub struct Clk<'a, B: RegisterBus> {
    tree: &'a ClockTree<'a, B>,
    index: u8,
}

impl<'a, B: RegisterBus> Clone for Clk<'a, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, B: RegisterBus> Copy for Clk<'a, B> {}

impl<'a, B: RegisterBus> Clk<'a, B> {
    fn node(&self) -> &'a Node {
        &self.tree.nodes[self.index as usize]
    }

    pub fn id(&self) -> ClockId {
        self.node().id
    }

    pub fn name(&self) -> &'static str {
        self.node().name
    }

    pub fn parent(&self) -> Option<Clk<'a, B>> {
        let parent = self.node().parent?;
        Some(Clk {
            tree: self.tree,
            index: parent,
        })
    }

    /// Current rate, re-derived from register state on every call.
    pub fn rate(&self) -> Result<Hertz, Error> {
        self.tree.rate_of(self.index)
    }

    /// The gate capability of this clock, if it has one. Derived clocks
    /// cannot be gated and return `None`.
    pub fn gate(&self) -> Option<ClkGate<'a, B>> {
        match self.node().rule {
            NodeRule::Gate { bit, .. } => Some(ClkGate {
                tree: self.tree,
                index: self.index,
                bit,
            }),
            NodeRule::Derived(_) => None,
        }
    }
}

/// Handle to a gateable clock.
///
/// Obtained through [`Clk::gate`]; carries the enable/disable/is-enabled
/// capability on top of the plain clock handle.
pub struct ClkGate<'a, B: RegisterBus> {
    tree: &'a ClockTree<'a, B>,
    index: u8,
    bit: u8,
}

impl<'a, B: RegisterBus> Clone for ClkGate<'a, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, B: RegisterBus> Copy for ClkGate<'a, B> {}

impl<'a, B: RegisterBus> ClkGate<'a, B> {
    /// The plain clock handle for this gate.
    pub fn clk(&self) -> Clk<'a, B> {
        Clk {
            tree: self.tree,
            index: self.index,
        }
    }

    /// Turn the clock on.
    pub fn enable(&self) {
        self.tree.gates.enable(self.bit);
    }

    /// Turn the clock off.
    pub fn disable(&self) {
        self.tree.gates.disable(self.bit);
    }

    /// Whether the clock is on, read back from the control register.
    pub fn is_enabled(&self) -> bool {
        self.tree.gates.is_enabled(self.bit)
    }
}
