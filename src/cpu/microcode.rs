//! Micro-operation interpreter.
//!
//! Each instruction in flight is represented as a queue of tagged micro-ops,
//! one per clock tick. The decode tick runs the opcode's routine, which
//! issues the first operand fetch and enqueues the remaining micro-ops; the
//! queue length is therefore the instruction's cycle count minus one. A
//! micro-op both consumes the byte the bus resolved on the previous tick
//! (still latched on the transaction pins) and drives the pins for the next
//! access.

use super::decoder::{Instruction, Mnemonic, Mode};
use super::status::Status;
use super::{Cpu, Halt, RESET_VECTOR, STACK_BASE};
use crate::bus::Transaction;

/// Index register selector for indexed addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Index {
    X,
    Y,
}

/// One clock tick's worth of work within an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MicroOp {
    /// Run the routine for the opcode byte the bus just fetched.
    Decode,
    /// Burn a cycle; the pins hold their last driven value.
    Internal,
    /// Reset sequence: latch the vector low byte, issue the high byte read.
    VectorLo,
    /// Reset sequence: assemble the program counter from the vector.
    VectorHi,
    /// Latch the operand low byte, issue the high byte fetch.
    AddrLo,
    /// Consume a zero-page operand and issue the data read.
    IssueZeroPage,
    /// Assemble an absolute address and issue the data read.
    IssueAbsolute,
    /// As `IssueAbsolute` plus an index register; inserts a penalty cycle
    /// when the indexed address crosses a page boundary.
    IssueAbsoluteIndexed(Index),
    /// Consume a zero-page operand without touching the pins (store path).
    ZeroPageAddr,
    /// Assemble an absolute address without touching the pins (store path).
    AbsoluteAddr,
    /// Issue the write of a register to the resolved address.
    Store(Mnemonic),
    /// Consume the fetched operand into registers and flags.
    Execute(Mnemonic),
    /// Latch the operand byte of a read-modify-write.
    RmwRead,
    /// Issue the dummy write-back of the original value, compute the result.
    RmwModify(Mnemonic),
    /// Issue the write of the modified value.
    RmwCommit,
    /// Operations with no memory operand (transfers, flags, shifts on A).
    Implied(Mnemonic),
    /// Consume the relative offset; reschedule the extra cycle(s) if taken.
    BranchCheck { flag: Status, expected: bool },
    /// Load the program counter from the assembled target.
    JumpAbsolute,
    /// JSR: latch the target low byte during the internal stack cycle.
    JsrInternal,
    /// Push the program counter high byte.
    PushPch,
    /// Push the program counter low byte.
    PushPcl,
    /// JSR: issue the fetch of the target high byte.
    JsrFetchHi,
    /// Push the accumulator or status register.
    Push(Mnemonic),
    /// Increment the stack pointer and issue the stack read.
    PullIssue,
    /// RTS: latch the pulled low byte, issue the next stack read.
    PullLoIssue,
    /// RTS: assemble the return address.
    RtsAssemble,
    /// RTS: step past the byte the return address points at.
    RtsFinish,
    /// Commit a pulled byte into the accumulator or status register.
    PullCommit(Mnemonic),
}

fn word(lo: u8, hi: u8) -> u16 {
    u16::from(hi) << 8 | u16::from(lo)
}

fn page_crossed(a: u16, b: u16) -> bool {
    a & 0xFF00 != b & 0xFF00
}

impl Cpu {
    /// Interpret one micro-op. Called exactly once per CPU clock tick while
    /// an instruction is in flight.
    pub(crate) fn exec(&mut self, op: MicroOp, txn: &mut Transaction) {
        use Mnemonic::*;

        match op {
            MicroOp::Decode => self.decode_step(txn),
            MicroOp::Internal => {}

            MicroOp::VectorLo => {
                self.scratch.lo = txn.data;
                txn.begin_read(RESET_VECTOR + 1);
            }
            MicroOp::VectorHi => {
                self.pc = word(self.scratch.lo, txn.data);
                log::debug!("cpu: reset vector -> {:#06x}", self.pc);
            }

            MicroOp::AddrLo => {
                self.scratch.lo = txn.data;
                txn.begin_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
            }
            MicroOp::IssueZeroPage => {
                self.scratch.addr = u16::from(txn.data);
                txn.begin_read(self.scratch.addr);
            }
            MicroOp::IssueAbsolute => {
                self.scratch.addr = word(self.scratch.lo, txn.data);
                txn.begin_read(self.scratch.addr);
            }
            MicroOp::IssueAbsoluteIndexed(index) => {
                let base = word(self.scratch.lo, txn.data);
                let offset = match index {
                    Index::X => self.x,
                    Index::Y => self.y,
                };
                let addr = base.wrapping_add(u16::from(offset));
                self.scratch.addr = addr;
                txn.begin_read(addr);
                // Crossing into the next page costs a cycle: delay the
                // commit by one tick. The pins hold, so the commit still
                // sees the fetched byte.
                if page_crossed(base, addr) {
                    self.microcode.push_front(MicroOp::Internal);
                }
            }
            MicroOp::ZeroPageAddr => {
                self.scratch.addr = u16::from(txn.data);
            }
            MicroOp::AbsoluteAddr => {
                self.scratch.addr = word(self.scratch.lo, txn.data);
            }
            MicroOp::Store(m) => {
                let value = match m {
                    Sta => self.a,
                    Stx => self.x,
                    Sty => self.y,
                    _ => unreachable!("{m:?} is not a store"),
                };
                txn.begin_write(self.scratch.addr, value);
            }

            MicroOp::Execute(m) => self.execute_operand(m, txn.data),

            MicroOp::RmwRead => {
                self.scratch.operand = txn.data;
            }
            MicroOp::RmwModify(m) => {
                // The hardware writes the unmodified value back while the
                // ALU works; the real write follows next cycle.
                txn.begin_write(self.scratch.addr, self.scratch.operand);
                self.scratch.operand = self.apply_rmw(m, self.scratch.operand);
            }
            MicroOp::RmwCommit => {
                txn.begin_write(self.scratch.addr, self.scratch.operand);
            }

            MicroOp::Implied(m) => self.execute_implied(m),

            MicroOp::BranchCheck { flag, expected } => {
                let offset = txn.data as i8;
                if self.status.contains(flag) == expected {
                    let base = self.pc;
                    self.pc = base.wrapping_add_signed(i16::from(offset));
                    // One extra cycle for taking the branch, another when
                    // the target lands in a different page.
                    self.microcode.push_back(MicroOp::Internal);
                    if page_crossed(base, self.pc) {
                        self.microcode.push_back(MicroOp::Internal);
                    }
                }
            }

            MicroOp::JumpAbsolute => {
                self.pc = word(self.scratch.lo, txn.data);
            }
            MicroOp::JsrInternal => {
                self.scratch.lo = txn.data;
            }
            MicroOp::PushPch => {
                txn.begin_write(STACK_BASE + u16::from(self.sp), (self.pc >> 8) as u8);
                self.sp = self.sp.wrapping_sub(1);
            }
            MicroOp::PushPcl => {
                txn.begin_write(STACK_BASE + u16::from(self.sp), self.pc as u8);
                self.sp = self.sp.wrapping_sub(1);
            }
            MicroOp::JsrFetchHi => {
                txn.begin_read(self.pc);
            }

            MicroOp::Push(m) => {
                let value = match m {
                    Pha => self.a,
                    // PHP pushes with the Break bit set, as the hardware does.
                    Php => (self.status | Status::BREAK | Status::UNUSED).bits(),
                    _ => unreachable!("{m:?} is not a push"),
                };
                txn.begin_write(STACK_BASE + u16::from(self.sp), value);
                self.sp = self.sp.wrapping_sub(1);
            }
            MicroOp::PullIssue => {
                self.sp = self.sp.wrapping_add(1);
                txn.begin_read(STACK_BASE + u16::from(self.sp));
            }
            MicroOp::PullLoIssue => {
                self.scratch.lo = txn.data;
                self.sp = self.sp.wrapping_add(1);
                txn.begin_read(STACK_BASE + u16::from(self.sp));
            }
            MicroOp::RtsAssemble => {
                self.pc = word(self.scratch.lo, txn.data);
            }
            MicroOp::RtsFinish => {
                self.pc = self.pc.wrapping_add(1);
            }
            MicroOp::PullCommit(m) => match m {
                Pla => {
                    self.a = txn.data;
                    self.status.set_zn(self.a);
                }
                Plp => {
                    // Break is not a real flag; bit 5 is hardwired high.
                    let mut pulled = Status::from_bits_retain(txn.data);
                    pulled.remove(Status::BREAK);
                    pulled.insert(Status::UNUSED);
                    self.status = pulled;
                }
                _ => unreachable!("{m:?} is not a pull"),
            },
        }
    }

    /// Look up the fetched opcode and run its routine: set up the first
    /// operand fetch and enqueue the instruction's remaining micro-ops.
    fn decode_step(&mut self, txn: &mut Transaction) {
        let opcode = txn.data;
        match self.table[opcode as usize] {
            Some(instr) => {
                self.scratch = Default::default();
                self.begin_instruction(instr, txn);
            }
            None => {
                let registers = self.registers();
                log::error!("cpu: undefined opcode {opcode:#04x}, halting ({registers})");
                self.halt = Some(Halt { opcode, registers });
            }
        }
    }

    /// Expand one decoded instruction into its micro-op sequence.
    fn begin_instruction(&mut self, instr: Instruction, txn: &mut Transaction) {
        use Mnemonic::*;

        let m = instr.mnemonic;
        match instr.mode {
            Mode::Immediate => {
                self.fetch_operand(txn);
                self.microcode.push_back(MicroOp::Execute(m));
            }
            Mode::ZeroPage => {
                self.fetch_operand(txn);
                match m {
                    Sta | Stx | Sty => {
                        self.microcode.push_back(MicroOp::ZeroPageAddr);
                        self.microcode.push_back(MicroOp::Store(m));
                    }
                    Inc | Dec => {
                        self.microcode.push_back(MicroOp::IssueZeroPage);
                        self.microcode.push_back(MicroOp::RmwRead);
                        self.microcode.push_back(MicroOp::RmwModify(m));
                        self.microcode.push_back(MicroOp::RmwCommit);
                    }
                    _ => {
                        self.microcode.push_back(MicroOp::IssueZeroPage);
                        self.microcode.push_back(MicroOp::Execute(m));
                    }
                }
            }
            Mode::Absolute => {
                self.fetch_operand(txn);
                match m {
                    Jmp => {
                        self.microcode.push_back(MicroOp::AddrLo);
                        self.microcode.push_back(MicroOp::JumpAbsolute);
                    }
                    Jsr => {
                        self.microcode.push_back(MicroOp::JsrInternal);
                        self.microcode.push_back(MicroOp::PushPch);
                        self.microcode.push_back(MicroOp::PushPcl);
                        self.microcode.push_back(MicroOp::JsrFetchHi);
                        self.microcode.push_back(MicroOp::JumpAbsolute);
                    }
                    Sta | Stx | Sty => {
                        self.microcode.push_back(MicroOp::AddrLo);
                        self.microcode.push_back(MicroOp::AbsoluteAddr);
                        self.microcode.push_back(MicroOp::Store(m));
                    }
                    _ => {
                        self.microcode.push_back(MicroOp::AddrLo);
                        self.microcode.push_back(MicroOp::IssueAbsolute);
                        self.microcode.push_back(MicroOp::Execute(m));
                    }
                }
            }
            Mode::AbsoluteX | Mode::AbsoluteY => {
                let index = if instr.mode == Mode::AbsoluteX {
                    Index::X
                } else {
                    Index::Y
                };
                self.fetch_operand(txn);
                self.microcode.push_back(MicroOp::AddrLo);
                self.microcode.push_back(MicroOp::IssueAbsoluteIndexed(index));
                self.microcode.push_back(MicroOp::Execute(m));
            }
            Mode::Relative => {
                self.fetch_operand(txn);
                let (flag, expected) = branch_condition(m);
                self.microcode.push_back(MicroOp::BranchCheck { flag, expected });
            }
            Mode::Accumulator => {
                self.microcode.push_back(MicroOp::Implied(m));
            }
            Mode::Implied => match m {
                Rts => {
                    self.microcode.push_back(MicroOp::Internal);
                    self.microcode.push_back(MicroOp::PullIssue);
                    self.microcode.push_back(MicroOp::PullLoIssue);
                    self.microcode.push_back(MicroOp::RtsAssemble);
                    self.microcode.push_back(MicroOp::RtsFinish);
                }
                Pha | Php => {
                    self.microcode.push_back(MicroOp::Internal);
                    self.microcode.push_back(MicroOp::Push(m));
                }
                Pla | Plp => {
                    self.microcode.push_back(MicroOp::Internal);
                    self.microcode.push_back(MicroOp::PullIssue);
                    self.microcode.push_back(MicroOp::PullCommit(m));
                }
                _ => {
                    self.microcode.push_back(MicroOp::Implied(m));
                }
            },
        }
    }

    /// Issue the read of the byte after the opcode and step past it.
    fn fetch_operand(&mut self, txn: &mut Transaction) {
        txn.begin_read(self.pc);
        self.pc = self.pc.wrapping_add(1);
    }

    /// Apply a read-class operation to the operand the bus fetched.
    fn execute_operand(&mut self, m: Mnemonic, operand: u8) {
        use Mnemonic::*;

        match m {
            Lda => {
                self.a = operand;
                self.status.set_zn(self.a);
            }
            Ldx => {
                self.x = operand;
                self.status.set_zn(self.x);
            }
            Ldy => {
                self.y = operand;
                self.status.set_zn(self.y);
            }
            Adc => self.add_with_carry(operand),
            // Subtraction is addition of the one's complement.
            Sbc => self.add_with_carry(!operand),
            And => {
                self.a &= operand;
                self.status.set_zn(self.a);
            }
            Ora => {
                self.a |= operand;
                self.status.set_zn(self.a);
            }
            Eor => {
                self.a ^= operand;
                self.status.set_zn(self.a);
            }
            Cmp => self.compare(self.a, operand),
            Cpx => self.compare(self.x, operand),
            Cpy => self.compare(self.y, operand),
            Bit => {
                self.status.set(Status::ZERO, self.a & operand == 0);
                self.status.set(Status::NEGATIVE, operand & 0x80 != 0);
                self.status.set(Status::OVERFLOW, operand & 0x40 != 0);
            }
            _ => unreachable!("{m:?} does not consume a memory operand"),
        }
    }

    /// Operations with no memory operand.
    fn execute_implied(&mut self, m: Mnemonic) {
        use Mnemonic::*;

        match m {
            Tax => {
                self.x = self.a;
                self.status.set_zn(self.x);
            }
            Tay => {
                self.y = self.a;
                self.status.set_zn(self.y);
            }
            Txa => {
                self.a = self.x;
                self.status.set_zn(self.a);
            }
            Tya => {
                self.a = self.y;
                self.status.set_zn(self.a);
            }
            Tsx => {
                self.x = self.sp;
                self.status.set_zn(self.x);
            }
            // TXS sets no flags.
            Txs => self.sp = self.x,
            Inx => {
                self.x = self.x.wrapping_add(1);
                self.status.set_zn(self.x);
            }
            Iny => {
                self.y = self.y.wrapping_add(1);
                self.status.set_zn(self.y);
            }
            Dex => {
                self.x = self.x.wrapping_sub(1);
                self.status.set_zn(self.x);
            }
            Dey => {
                self.y = self.y.wrapping_sub(1);
                self.status.set_zn(self.y);
            }
            Sec => self.status.insert(Status::CARRY),
            Clc => self.status.remove(Status::CARRY),
            Sei => self.status.insert(Status::INTERRUPT_DISABLE),
            Cli => self.status.remove(Status::INTERRUPT_DISABLE),
            Sed => self.status.insert(Status::DECIMAL),
            Cld => self.status.remove(Status::DECIMAL),
            Clv => self.status.remove(Status::OVERFLOW),
            Asl => {
                self.status.set(Status::CARRY, self.a & 0x80 != 0);
                self.a <<= 1;
                self.status.set_zn(self.a);
            }
            Lsr => {
                self.status.set(Status::CARRY, self.a & 0x01 != 0);
                self.a >>= 1;
                self.status.set_zn(self.a);
            }
            Rol => {
                let carry_in = u8::from(self.status.contains(Status::CARRY));
                self.status.set(Status::CARRY, self.a & 0x80 != 0);
                self.a = self.a << 1 | carry_in;
                self.status.set_zn(self.a);
            }
            Ror => {
                let carry_in = u8::from(self.status.contains(Status::CARRY)) << 7;
                self.status.set(Status::CARRY, self.a & 0x01 != 0);
                self.a = self.a >> 1 | carry_in;
                self.status.set_zn(self.a);
            }
            Nop => {}
            _ => unreachable!("{m:?} is not an implied operation"),
        }
    }

    /// A + M + C, computed wide. Carry out of bit 7 sets Carry; overflow is
    /// the signed condition from the operand and result sign bits.
    fn add_with_carry(&mut self, operand: u8) {
        let carry_in = u16::from(self.status.contains(Status::CARRY));
        let sum = u16::from(self.a) + u16::from(operand) + carry_in;
        let result = sum as u8;
        self.status.set(Status::CARRY, sum > 0xFF);
        self.status.set(
            Status::OVERFLOW,
            (self.a ^ operand) & 0x80 == 0 && (self.a ^ result) & 0x80 != 0,
        );
        self.status.set_zn(result);
        self.a = result;
    }

    fn compare(&mut self, register: u8, operand: u8) {
        self.status.set(Status::CARRY, register >= operand);
        self.status.set_zn(register.wrapping_sub(operand));
    }

    fn apply_rmw(&mut self, m: Mnemonic, operand: u8) -> u8 {
        let result = match m {
            Mnemonic::Inc => operand.wrapping_add(1),
            Mnemonic::Dec => operand.wrapping_sub(1),
            _ => unreachable!("{m:?} is not a read-modify-write operation"),
        };
        self.status.set_zn(result);
        result
    }
}

/// Which flag a branch tests, and the value it branches on.
fn branch_condition(m: Mnemonic) -> (Status, bool) {
    use Mnemonic::*;

    match m {
        Bpl => (Status::NEGATIVE, false),
        Bmi => (Status::NEGATIVE, true),
        Bvc => (Status::OVERFLOW, false),
        Bvs => (Status::OVERFLOW, true),
        Bcc => (Status::CARRY, false),
        Bcs => (Status::CARRY, true),
        Bne => (Status::ZERO, false),
        Beq => (Status::ZERO, true),
        _ => unreachable!("{m:?} is not a branch"),
    }
}
