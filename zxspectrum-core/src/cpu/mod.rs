//! The Z80 instruction execution engine (§4.1).
//!
//! `master tick` in this crate is implemented as exactly one T-state: §4.4
//! defines `frame_clocks` as the literal T-state-per-frame count (69888) and
//! end-to-end scenario 1 drives `frame()` for "69888 ticks", which only
//! holds if a tick and a T-state coincide. The glossary's "a master tick
//! equals half a T-state" is read as flavor text about the ULA's two-pixels-
//! per-T-state video clock rather than a binding redefinition of the CPU's
//! own tick unit — see `DESIGN.md`.

pub mod alu;
pub mod bus;
pub mod exec;
pub mod flags;
pub mod registers;

pub use bus::Bus;
pub use flags::CpuFlags;
pub use registers::{IndexPrefix, InterruptMode, Registers, WordReg};

/// The Z80 CPU. Owns only its register file and instruction-boundary
/// bookkeeping; all memory/IO is reached through a [`Bus`].
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "snapshot", derive(serde::Serialize, serde::Deserialize))]
pub struct Cpu {
    pub registers: Registers,
    /// T-states owed for the instruction currently in flight.
    remaining_cycles: i32,
    /// Total T-states executed since construction (or last reset).
    cycle_counter: u64,
    /// Number of ticks the CPU was stalled by bus contention, tracked
    /// separately so `(remaining + executed) == ticks - stalled` holds.
    stalled_ticks: u64,
}

impl Cpu {
    pub fn new() -> Self {
        let mut cpu = Cpu::default();
        cpu.registers.reset();
        cpu
    }

    pub fn reset(&mut self) {
        self.registers.reset();
        self.remaining_cycles = 0;
        self.cycle_counter = 0;
        self.stalled_ticks = 0;
    }

    pub fn cycle_counter(&self) -> u64 {
        self.cycle_counter
    }

    pub fn stalled_ticks(&self) -> u64 {
        self.stalled_ticks
    }

    pub fn is_at_instruction_boundary(&self) -> bool {
        self.remaining_cycles <= 0
    }

    /// Advances exactly one master tick (== one T-state, see module docs).
    ///
    /// `stalled` models ULA memory contention (§4.2/glossary): while true,
    /// the CPU doesn't consume `remaining_cycles` or fetch a new
    /// instruction, but the tick still counts toward the total.
    pub fn clock(&mut self, bus: &mut impl Bus, stalled: bool) {
        if stalled {
            self.stalled_ticks += 1;
            return;
        }
        if self.remaining_cycles <= 0 {
            if bus.irq() && self.registers.iff1 && !self.registers.just_enabled_interrupts {
                self.remaining_cycles = exec::accept_interrupt(self, bus) as i32;
            } else {
                self.registers.just_enabled_interrupts = false;
                self.remaining_cycles = exec::execute_instruction(self, bus) as i32;
            }
        }
        self.remaining_cycles -= 1;
        self.cycle_counter += 1;
    }

    /// Runs `clock()` until the current instruction (or interrupt
    /// acceptance) completes.
    pub fn step(&mut self, bus: &mut impl Bus) {
        self.clock(bus, false);
        while self.remaining_cycles > 0 {
            self.clock(bus, false);
        }
    }
}
