//! Whole-machine wiring.
//!
//! Builds the CPU, bus, PPU and transaction, hangs them off the master clock
//! as divisor callbacks, and drives the reset sequence. The CPU and PPU sit
//! behind `Rc<RefCell<_>>` because each is reached from two places: the clock
//! callback that ticks it, and either the driving loop (CPU halt checks) or
//! the bus (PPU register window).

use crate::bus::{Bus, PrgRom, Transaction};
use crate::cartridge::Cartridge;
use crate::clock::Clock;
use crate::cpu::{Cpu, Halt};
use crate::ppu::Ppu;
use std::cell::RefCell;
use std::rc::Rc;

/// The CPU core and bus tick every 12th master tick.
pub const CPU_DIVISOR: u64 = 12;
/// The PPU ticks every 4th master tick, three dots per CPU cycle.
pub const PPU_DIVISOR: u64 = 4;

pub struct Nes {
    clock: Clock,
    cpu: Rc<RefCell<Cpu>>,
    ppu: Rc<RefCell<Ppu>>,
}

impl Nes {
    /// Assemble a machine around the given cartridge and begin its reset
    /// sequence. The first CPU divisor tick starts resolving the reset
    /// vector; no instruction executes before the vector is loaded.
    pub fn new(cartridge: Cartridge) -> Self {
        let ppu = Rc::new(RefCell::new(Ppu::new()));
        let mut bus = Bus::new(PrgRom::new(cartridge.into_prg_rom()), ppu.clone());
        let cpu = Rc::new(RefCell::new(Cpu::new()));
        let txn = Rc::new(RefCell::new(Transaction::new()));

        cpu.borrow_mut().reset(&mut txn.borrow_mut());

        let mut clock = Clock::new();
        {
            // CPU first, then the bus resolves what the CPU drove; both run
            // inside one divisor callback so no other component can observe
            // a driven-but-unresolved transaction.
            let cpu = cpu.clone();
            clock.add_divisor(CPU_DIVISOR, move || {
                let mut txn = txn.borrow_mut();
                cpu.borrow_mut().clk(&mut txn);
                bus.clk(&mut txn);
            });
        }
        {
            let ppu = ppu.clone();
            clock.add_divisor(PPU_DIVISOR, move || ppu.borrow_mut().clk());
        }

        Self { clock, cpu, ppu }
    }

    /// Run at the nominal master rate until the CPU halts.
    pub fn run(&mut self) {
        let cpu = self.cpu.clone();
        self.clock.run_while(move || !cpu.borrow().is_halted());
    }

    /// Execute `count` master ticks without real-time pacing.
    pub fn step_master(&mut self, count: u64) {
        self.clock.step_n(count);
    }

    pub fn is_halted(&self) -> bool {
        self.cpu.borrow().is_halted()
    }

    /// Halt details, if the CPU has hit an undefined opcode.
    pub fn halt_state(&self) -> Option<Halt> {
        self.cpu.borrow().halt_state().copied()
    }

    pub fn master_ticks(&self) -> u64 {
        self.clock.ticks()
    }

    /// Dot position of the PPU, for observing frame progress.
    pub fn ppu_dot(&self) -> u32 {
        self.ppu.borrow().dot()
    }
}
