use crate::ppu::Ppu;
use std::cell::RefCell;
use std::rc::Rc;

/// Direction of the in-flight bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// The one in-flight memory access: address, data byte, direction.
///
/// The CPU fills in `address` and `direction` (and `data` for writes) during
/// its tick; the bus resolves the access during its own tick in the same
/// divisor callback. Exactly one transaction value exists per machine and it
/// is passed by `&mut` from the driving loop into both steps, so a second
/// live transaction within a tick cannot be constructed.
///
/// The fields model the address and data pins of the real part: they hold
/// their last driven value until the next access begins, which is what lets a
/// micro-operation one tick later still observe the byte the bus fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    pub address: u16,
    pub data: u8,
    pub direction: Direction,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            address: 0,
            data: 0,
            direction: Direction::Read,
        }
    }

    /// Drive the pins for a read of `address`.
    pub fn begin_read(&mut self, address: u16) {
        self.address = address;
        self.direction = Direction::Read;
    }

    /// Drive the pins for a write of `value` to `address`.
    pub fn begin_write(&mut self, address: u16, value: u8) {
        self.address = address;
        self.data = value;
        self.direction = Direction::Write;
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-byte addressable device capability.
///
/// Offsets are relative to the device's own window; the bus performs all
/// address decoding and mirroring before calling in. `get` takes `&mut self`
/// because reads may have side effects (the PPU status register clears its
/// vblank latch when read).
pub trait Device {
    fn get(&mut self, offset: u16) -> u8;
    fn set(&mut self, offset: u16, value: u8);
}

/// 2 KiB of general-purpose work RAM.
pub struct Ram {
    data: Vec<u8>,
}

impl Ram {
    pub const SIZE: usize = 0x0800;

    pub fn new() -> Self {
        Self {
            data: vec![0; Self::SIZE],
        }
    }
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Ram {
    fn get(&mut self, offset: u16) -> u8 {
        self.data[offset as usize]
    }

    fn set(&mut self, offset: u16, value: u8) {
        self.data[offset as usize] = value;
    }
}

/// Read-only program storage backed by the cartridge's PRG slice.
///
/// A 16 KiB image occupies only half of the 0x8000-0xFFFF window, so offsets
/// wrap modulo the image length; the reset vector at the top of the window
/// then resolves into the single bank, which is how the NROM-128 board wires
/// its address lines.
pub struct PrgRom {
    data: Vec<u8>,
}

impl PrgRom {
    pub fn new(data: Vec<u8>) -> Self {
        assert!(!data.is_empty(), "program storage cannot be empty");
        Self { data }
    }
}

impl Device for PrgRom {
    fn get(&mut self, offset: u16) -> u8 {
        self.data[offset as usize % self.data.len()]
    }

    fn set(&mut self, offset: u16, _value: u8) {
        log::warn!("write to read-only program storage at offset {offset:#06x} dropped");
    }
}

/// Memory bus: routes each CPU transaction to the mapped device.
///
/// Address decode contract:
///
/// | range           | target   | offset          |
/// |-----------------|----------|-----------------|
/// | 0x0000-0x1FFF   | RAM      | `addr & 0x07FF` |
/// | 0x2000-0x3FFF   | PPU regs | `addr & 0x0007` |
/// | 0x8000-0xFFFF   | PRG ROM  | `addr - 0x8000` |
/// | anything else   | unmapped | read 0, write dropped |
pub struct Bus {
    ram: Ram,
    prg: PrgRom,
    ppu: Rc<RefCell<Ppu>>,
}

impl Bus {
    pub fn new(prg: PrgRom, ppu: Rc<RefCell<Ppu>>) -> Self {
        Self {
            ram: Ram::new(),
            prg,
            ppu,
        }
    }

    /// Read a byte from the mapped device. Unmapped reads return 0 rather
    /// than faulting so the scheduler can keep going.
    pub fn read(&mut self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => {
                let value = self.ram.get(addr & 0x07FF);
                log::trace!("bus: read RAM  {addr:#06x} -> {value:#04x}");
                value
            }
            0x2000..=0x3FFF => {
                let value = self.ppu.borrow_mut().get(addr & 0x0007);
                log::trace!("bus: read PPU  {addr:#06x} -> {value:#04x}");
                value
            }
            0x8000..=0xFFFF => {
                let value = self.prg.get(addr - 0x8000);
                log::trace!("bus: read PRG  {addr:#06x} -> {value:#04x}");
                value
            }
            _ => {
                log::warn!("bus: read from unmapped address {addr:#06x}, returning 0");
                0
            }
        }
    }

    /// Write a byte to the mapped device. Unmapped writes are dropped.
    pub fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x1FFF => {
                log::trace!("bus: write RAM {addr:#06x} <- {value:#04x}");
                self.ram.set(addr & 0x07FF, value);
            }
            0x2000..=0x3FFF => {
                log::trace!("bus: write PPU {addr:#06x} <- {value:#04x}");
                self.ppu.borrow_mut().set(addr & 0x0007, value);
            }
            0x8000..=0xFFFF => {
                self.prg.set(addr - 0x8000, value);
            }
            _ => {
                log::warn!("bus: write to unmapped address {addr:#06x} dropped");
            }
        }
    }

    /// Resolve the live transaction. This is the only place resolution
    /// happens; the CPU must have driven the pins earlier in the same tick.
    pub fn clk(&mut self, txn: &mut Transaction) {
        match txn.direction {
            Direction::Read => txn.data = self.read(txn.address),
            Direction::Write => self.write(txn.address, txn.data),
        }
    }
}
