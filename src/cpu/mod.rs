//! 6502-class CPU core.
//!
//! The CPU performs exactly one micro-operation per clock tick. Between
//! instructions the queue is empty; the tick that finds it empty issues the
//! opcode fetch and enqueues `Decode`, which on the next tick expands the
//! fetched opcode into the instruction's remaining micro-ops. All memory
//! traffic goes through the shared [`Transaction`], which the bus resolves
//! later in the same divisor callback.

mod decoder;
mod microcode;
mod status;

pub use decoder::{Instruction, Mnemonic, Mode};
pub use status::Status;

use crate::bus::Transaction;
use microcode::MicroOp;
use std::collections::VecDeque;
use std::fmt;

/// Stack page base address.
const STACK_BASE: u16 = 0x0100;
/// Address of the reset vector low byte.
pub const RESET_VECTOR: u16 = 0xFFFC;

/// Per-instruction working storage, reset on every decode.
#[derive(Debug, Default, Clone, Copy)]
struct Scratch {
    /// Low operand byte, latched while the high byte is in flight.
    lo: u8,
    /// Fully resolved effective address.
    addr: u16,
    /// Operand byte held across a read-modify-write.
    operand: u8,
}

/// Register snapshot, taken when the CPU halts.
#[derive(Debug, Clone, Copy)]
pub struct Registers {
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub status: Status,
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pc={:#06x} a={:#04x} x={:#04x} y={:#04x} sp={:#04x} status={:?}",
            self.pc, self.a, self.x, self.y, self.sp, self.status
        )
    }
}

/// Terminal state entered on an undefined opcode.
#[derive(Debug, Clone, Copy)]
pub struct Halt {
    pub opcode: u8,
    pub registers: Registers,
}

pub struct Cpu {
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub status: Status,
    /// Micro-ops still owed by the instruction in flight.
    microcode: VecDeque<MicroOp>,
    table: [Option<Instruction>; 256],
    scratch: Scratch,
    halt: Option<Halt>,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            pc: 0,
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            status: Status::power_up(),
            microcode: VecDeque::new(),
            table: decoder::build_table(),
            scratch: Scratch::default(),
            halt: None,
        }
    }

    /// Begin the reset sequence: issue the read of the reset vector and
    /// queue the three ticks that assemble the entry point into `pc`.
    pub fn reset(&mut self, txn: &mut Transaction) {
        self.microcode.clear();
        self.halt = None;
        txn.begin_read(RESET_VECTOR);
        self.microcode.push_back(MicroOp::Internal);
        self.microcode.push_back(MicroOp::VectorLo);
        self.microcode.push_back(MicroOp::VectorHi);
    }

    /// Advance one CPU clock tick.
    ///
    /// Once halted, ticks are ignored; the clock keeps running but this core
    /// stops driving the pins.
    pub fn clk(&mut self, txn: &mut Transaction) {
        if self.halt.is_some() {
            return;
        }
        match self.microcode.pop_front() {
            Some(op) => self.exec(op, txn),
            None => {
                txn.begin_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.microcode.push_back(MicroOp::Decode);
            }
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halt.is_some()
    }

    pub fn halt_state(&self) -> Option<&Halt> {
        self.halt.as_ref()
    }

    pub fn registers(&self) -> Registers {
        Registers {
            pc: self.pc,
            a: self.a,
            x: self.x,
            y: self.y,
            sp: self.sp,
            status: self.status,
        }
    }

    /// Micro-ops still queued for the instruction in flight. Zero means the
    /// next tick starts a new instruction.
    pub fn pending_micro_ops(&self) -> usize {
        self.microcode.len()
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Bus, PrgRom};
    use crate::ppu::Ppu;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// CPU + bus + shared transaction, ticked in lockstep the way the
    /// machine's divisor callback does it.
    struct TestBed {
        cpu: Cpu,
        bus: Bus,
        txn: Transaction,
    }

    impl TestBed {
        /// Map `program` at $8000 with the reset vector pointing at it, and
        /// run the three-tick reset sequence.
        fn with_program(program: &[u8]) -> Self {
            let mut prg = vec![0u8; 0x8000];
            prg[..program.len()].copy_from_slice(program);
            prg[0x7FFC] = 0x00;
            prg[0x7FFD] = 0x80;

            let bus = Bus::new(PrgRom::new(prg), Rc::new(RefCell::new(Ppu::new())));
            let mut cpu = Cpu::new();
            let mut txn = Transaction::new();
            cpu.reset(&mut txn);

            let mut bed = Self { cpu, bus, txn };
            bed.tick_n(3);
            assert_eq!(bed.cpu.pc, 0x8000);
            bed
        }

        fn tick(&mut self) {
            self.cpu.clk(&mut self.txn);
            self.bus.clk(&mut self.txn);
        }

        fn tick_n(&mut self, n: usize) {
            for _ in 0..n {
                self.tick();
            }
        }

        /// Run one full instruction, returning the ticks it occupied. The
        /// opcode fetch is issued one tick before decode runs, so this is
        /// the instruction's hardware cycle count plus one.
        fn step_instruction(&mut self) -> usize {
            let mut ticks = 0;
            loop {
                self.tick();
                ticks += 1;
                if self.cpu.is_halted() || self.cpu.pending_micro_ops() == 0 {
                    return ticks;
                }
            }
        }
    }

    #[test]
    fn test_reset_loads_vector_in_three_ticks() {
        let mut prg = vec![0u8; 0x8000];
        prg[0x7FFC] = 0x34;
        prg[0x7FFD] = 0x12;
        let bus = Bus::new(PrgRom::new(prg), Rc::new(RefCell::new(Ppu::new())));
        let mut cpu = Cpu::new();
        let mut txn = Transaction::new();
        cpu.reset(&mut txn);
        let mut bed = TestBed { cpu, bus, txn };

        bed.tick_n(2);
        assert_eq!(bed.cpu.pc, 0); // vector not assembled yet
        bed.tick();
        assert_eq!(bed.cpu.pc, 0x1234);
        assert_eq!(bed.cpu.pending_micro_ops(), 0);
    }

    #[test]
    fn test_lda_immediate_loads_and_sets_flags() {
        let mut bed = TestBed::with_program(&[0xA9, 0x00, 0xA9, 0x80]);

        assert_eq!(bed.step_instruction(), 3); // 2 cycles + fetch tick
        assert_eq!(bed.cpu.a, 0x00);
        assert!(bed.cpu.status.contains(Status::ZERO));
        assert!(!bed.cpu.status.contains(Status::NEGATIVE));

        bed.step_instruction();
        assert_eq!(bed.cpu.a, 0x80);
        assert!(!bed.cpu.status.contains(Status::ZERO));
        assert!(bed.cpu.status.contains(Status::NEGATIVE));
    }

    #[test]
    fn test_adc_carry_wraps_through_zero() {
        // LDA #$FF; SEC; ADC #$01 -> A = $FF + $01 + 1 = $01, carry out
        let mut bed = TestBed::with_program(&[0xA9, 0xFF, 0x38, 0x69, 0x01]);
        bed.step_instruction();
        bed.step_instruction();
        bed.step_instruction();
        assert_eq!(bed.cpu.a, 0x01);
        assert!(bed.cpu.status.contains(Status::CARRY));
        assert!(!bed.cpu.status.contains(Status::ZERO));
        assert!(!bed.cpu.status.contains(Status::OVERFLOW));
    }

    #[test]
    fn test_adc_signed_overflow() {
        // LDA #$7F; CLC; ADC #$01 -> $80, signed overflow
        let mut bed = TestBed::with_program(&[0xA9, 0x7F, 0x18, 0x69, 0x01]);
        bed.step_instruction();
        bed.step_instruction();
        bed.step_instruction();
        assert_eq!(bed.cpu.a, 0x80);
        assert!(bed.cpu.status.contains(Status::OVERFLOW));
        assert!(bed.cpu.status.contains(Status::NEGATIVE));
        assert!(!bed.cpu.status.contains(Status::CARRY));
    }

    #[test]
    fn test_sbc_with_borrow_clear() {
        // LDA #$10; SEC; SBC #$01 -> $0F, no borrow
        let mut bed = TestBed::with_program(&[0xA9, 0x10, 0x38, 0xE9, 0x01]);
        bed.step_instruction();
        bed.step_instruction();
        bed.step_instruction();
        assert_eq!(bed.cpu.a, 0x0F);
        assert!(bed.cpu.status.contains(Status::CARRY));
    }

    #[test]
    fn test_cmp_flags() {
        let mut bed = TestBed::with_program(&[0xA9, 0x20, 0xC9, 0x10, 0xC9, 0x20]);
        bed.step_instruction();

        bed.step_instruction(); // CMP #$10: A > operand
        assert!(bed.cpu.status.contains(Status::CARRY));
        assert!(!bed.cpu.status.contains(Status::ZERO));

        bed.step_instruction(); // CMP #$20: equal
        assert!(bed.cpu.status.contains(Status::CARRY));
        assert!(bed.cpu.status.contains(Status::ZERO));
    }

    #[test]
    fn test_sta_absolute_lands_in_ram() {
        // LDA #$42; STA $0123
        let mut bed = TestBed::with_program(&[0xA9, 0x42, 0x8D, 0x23, 0x01]);
        bed.step_instruction();
        assert_eq!(bed.step_instruction(), 5); // 4 cycles + fetch tick
        assert_eq!(bed.bus.read(0x0123), 0x42);
    }

    #[test]
    fn test_stx_sty_absolute_land_in_ram() {
        // LDX #$42; STX $0123; LDY #$24; STY $0124
        let mut bed =
            TestBed::with_program(&[0xA2, 0x42, 0x8E, 0x23, 0x01, 0xA0, 0x24, 0x8C, 0x24, 0x01]);
        bed.step_instruction();
        assert_eq!(bed.step_instruction(), 5); // STX abs: 4 cycles + fetch tick
        bed.step_instruction();
        assert_eq!(bed.step_instruction(), 5); // STY abs: 4 cycles + fetch tick
        assert!(!bed.cpu.is_halted());
        assert_eq!(bed.bus.read(0x0123), 0x42);
        assert_eq!(bed.bus.read(0x0124), 0x24);
    }

    #[test]
    fn test_zero_page_store_and_load() {
        // LDA #$42; STA $10; LDA #$00; LDA $10
        let mut bed = TestBed::with_program(&[0xA9, 0x42, 0x85, 0x10, 0xA9, 0x00, 0xA5, 0x10]);
        bed.step_instruction();
        assert_eq!(bed.step_instruction(), 4); // STA zp: 3 cycles + fetch tick
        bed.step_instruction();
        assert_eq!(bed.cpu.a, 0x00);
        assert_eq!(bed.step_instruction(), 4); // LDA zp: 3 cycles + fetch tick
        assert_eq!(bed.cpu.a, 0x42);
    }

    #[test]
    fn test_inc_zero_page_read_modify_write() {
        // LDA #$05; STA $10; INC $10
        let mut bed = TestBed::with_program(&[0xA9, 0x05, 0x85, 0x10, 0xE6, 0x10]);
        bed.step_instruction();
        bed.step_instruction();
        assert_eq!(bed.step_instruction(), 6); // 5 cycles + fetch tick
        assert_eq!(bed.bus.read(0x0010), 0x06);
        assert!(!bed.cpu.status.contains(Status::ZERO));
    }

    #[test]
    fn test_branch_not_taken_costs_two_cycles() {
        // LDA #$00 sets Z, so BNE falls through.
        let mut bed = TestBed::with_program(&[0xA9, 0x00, 0xD0, 0x02]);
        bed.step_instruction();
        assert_eq!(bed.step_instruction(), 3); // 2 cycles + fetch tick
        assert_eq!(bed.cpu.pc, 0x8004);
    }

    #[test]
    fn test_branch_taken_costs_three_cycles() {
        // LDA #$01 clears Z, so BNE skips forward.
        let mut bed = TestBed::with_program(&[0xA9, 0x01, 0xD0, 0x02]);
        bed.step_instruction();
        assert_eq!(bed.step_instruction(), 4); // 3 cycles + fetch tick
        assert_eq!(bed.cpu.pc, 0x8006);
    }

    #[test]
    fn test_branch_backward_from_next_instruction() {
        // LDA #$01; BNE -2 lands back on the branch opcode itself.
        let mut bed = TestBed::with_program(&[0xA9, 0x01, 0xD0, 0xFE]);
        bed.step_instruction();
        let ticks = bed.step_instruction();
        assert_eq!(ticks, 4); // same page, taken: 3 cycles + fetch tick
        assert_eq!(bed.cpu.pc, 0x8002);
    }

    #[test]
    fn test_branch_across_page_costs_four_cycles() {
        // LDA #$00; BEQ back past the start of the page.
        let mut bed = TestBed::with_program(&[0xA9, 0x00, 0xF0, 0xFA]);
        bed.step_instruction();
        assert_eq!(bed.step_instruction(), 5); // 4 cycles + fetch tick
        assert_eq!(bed.cpu.pc, 0x7FFE);
    }

    #[test]
    fn test_absolute_indexed_page_cross_penalty() {
        // LDX #$01; LDA $80FF,X crosses into $8100.
        let mut program = vec![0u8; 0x200];
        program[0x000..0x005].copy_from_slice(&[0xA2, 0x01, 0xBD, 0xFF, 0x80]);
        program[0x100] = 0x77; // $8100
        let mut bed = TestBed::with_program(&program);

        bed.step_instruction();
        assert_eq!(bed.step_instruction(), 6); // 5 cycles + fetch tick
        assert_eq!(bed.cpu.a, 0x77);
    }

    #[test]
    fn test_absolute_indexed_same_page_no_penalty() {
        // LDX #$01; LDA $8100,X stays in page $81.
        let mut program = vec![0u8; 0x200];
        program[0x000..0x005].copy_from_slice(&[0xA2, 0x01, 0xBD, 0x00, 0x81]);
        program[0x101] = 0x66; // $8101
        let mut bed = TestBed::with_program(&program);

        bed.step_instruction();
        assert_eq!(bed.step_instruction(), 5); // 4 cycles + fetch tick
        assert_eq!(bed.cpu.a, 0x66);
    }

    #[test]
    fn test_jmp_absolute() {
        let mut bed = TestBed::with_program(&[0x4C, 0x10, 0x80]);
        assert_eq!(bed.step_instruction(), 4); // 3 cycles + fetch tick
        assert_eq!(bed.cpu.pc, 0x8010);
    }

    #[test]
    fn test_jsr_rts_round_trip() {
        // $8000: JSR $8006; $8003: LDA #$01
        // $8006: LDA #$42; $8008: RTS
        let mut bed = TestBed::with_program(&[
            0x20, 0x06, 0x80, // JSR $8006
            0xA9, 0x01, // LDA #$01
            0xEA, // padding
            0xA9, 0x42, // LDA #$42
            0x60, // RTS
        ]);
        let sp_before = bed.cpu.sp;

        assert_eq!(bed.step_instruction(), 7); // JSR: 6 cycles + fetch tick
        assert_eq!(bed.cpu.pc, 0x8006);
        assert_eq!(bed.cpu.sp, sp_before.wrapping_sub(2));

        bed.step_instruction();
        assert_eq!(bed.cpu.a, 0x42);

        assert_eq!(bed.step_instruction(), 7); // RTS: 6 cycles + fetch tick
        assert_eq!(bed.cpu.pc, 0x8003);
        assert_eq!(bed.cpu.sp, sp_before);

        bed.step_instruction();
        assert_eq!(bed.cpu.a, 0x01);
    }

    #[test]
    fn test_pha_pla_round_trip() {
        // LDA #$37; PHA; LDA #$00; PLA
        let mut bed = TestBed::with_program(&[0xA9, 0x37, 0x48, 0xA9, 0x00, 0x68]);
        let sp_before = bed.cpu.sp;

        bed.step_instruction();
        assert_eq!(bed.step_instruction(), 4); // PHA: 3 cycles + fetch tick
        bed.step_instruction();
        assert_eq!(bed.cpu.a, 0x00);
        assert_eq!(bed.step_instruction(), 5); // PLA: 4 cycles + fetch tick
        assert_eq!(bed.cpu.a, 0x37);
        assert_eq!(bed.cpu.sp, sp_before);
        assert!(!bed.cpu.status.contains(Status::ZERO));
    }

    #[test]
    fn test_php_plp_restores_flags() {
        // LDA #$00 (Z set); PHP; LDA #$01 (Z clear); PLP
        let mut bed = TestBed::with_program(&[0xA9, 0x00, 0x08, 0xA9, 0x01, 0x28]);
        bed.step_instruction();
        bed.step_instruction();
        bed.step_instruction();
        assert!(!bed.cpu.status.contains(Status::ZERO));

        bed.step_instruction();
        assert!(bed.cpu.status.contains(Status::ZERO));
        // Break never sticks in the live register; bit 5 stays high.
        assert!(!bed.cpu.status.contains(Status::BREAK));
        assert!(bed.cpu.status.contains(Status::UNUSED));
    }

    #[test]
    fn test_undefined_opcode_halts_with_snapshot() {
        let mut bed = TestBed::with_program(&[0x02]);

        assert_eq!(bed.step_instruction(), 2); // fetch tick + decode tick
        assert!(bed.cpu.is_halted());
        let halt = bed.cpu.halt_state().unwrap();
        assert_eq!(halt.opcode, 0x02);
        assert_eq!(halt.registers.pc, 0x8001); // already stepped past it

        // Further ticks are inert.
        let pc = bed.cpu.pc;
        bed.tick_n(10);
        assert_eq!(bed.cpu.pc, pc);
        assert_eq!(bed.cpu.pending_micro_ops(), 0);
    }

    #[test]
    fn test_every_tick_makes_progress() {
        // A NOP sled: whenever the queue is empty a tick must refill it, so
        // the core can never stall while un-halted.
        let mut bed = TestBed::with_program(&[0xEA; 0x40]);
        for _ in 0..60 {
            let empty_before = bed.cpu.pending_micro_ops() == 0;
            bed.tick();
            if empty_before {
                assert!(bed.cpu.pending_micro_ops() > 0);
            }
        }
        assert!(!bed.cpu.is_halted());
    }

    #[test]
    fn test_transfers_and_register_math() {
        // LDX #$41; INX; TXA; TAY; DEY
        let mut bed = TestBed::with_program(&[0xA2, 0x41, 0xE8, 0x8A, 0xA8, 0x88]);
        bed.step_instruction();
        assert_eq!(bed.step_instruction(), 3); // INX: 2 cycles + fetch tick
        assert_eq!(bed.cpu.x, 0x42);
        bed.step_instruction();
        assert_eq!(bed.cpu.a, 0x42);
        bed.step_instruction();
        assert_eq!(bed.cpu.y, 0x42);
        bed.step_instruction();
        assert_eq!(bed.cpu.y, 0x41);
    }

    #[test]
    fn test_accumulator_shifts() {
        // LDA #$81; ASL A -> $02, carry out; ROL A -> $05 (carry back in)
        let mut bed = TestBed::with_program(&[0xA9, 0x81, 0x0A, 0x2A]);
        bed.step_instruction();

        bed.step_instruction();
        assert_eq!(bed.cpu.a, 0x02);
        assert!(bed.cpu.status.contains(Status::CARRY));

        bed.step_instruction();
        assert_eq!(bed.cpu.a, 0x05);
        assert!(!bed.cpu.status.contains(Status::CARRY));
    }

    #[test]
    fn test_bit_zero_page() {
        // LDA #$C0; STA $10; LDA #$0F; BIT $10 -> Z (no common bits), N, V
        let mut bed = TestBed::with_program(&[0xA9, 0xC0, 0x85, 0x10, 0xA9, 0x0F, 0x24, 0x10]);
        bed.step_instruction();
        bed.step_instruction();
        bed.step_instruction();
        bed.step_instruction();
        assert!(bed.cpu.status.contains(Status::ZERO));
        assert!(bed.cpu.status.contains(Status::NEGATIVE));
        assert!(bed.cpu.status.contains(Status::OVERFLOW));
    }
}
