//! Opcode decode table.
//!
//! Maps each opcode byte to its mnemonic and addressing mode. The table is
//! deliberately partial: the engine executes whatever is defined here, and an
//! undefined opcode drives the CPU into its halted state rather than aborting
//! the process. Completing all 256 opcodes is a non-goal.

/// Instruction mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    // Loads and stores
    Lda,
    Ldx,
    Ldy,
    Sta,
    Stx,
    Sty,
    // Arithmetic and logic
    Adc,
    Sbc,
    And,
    Ora,
    Eor,
    Cmp,
    Cpx,
    Cpy,
    Bit,
    // Memory increment/decrement (read-modify-write)
    Inc,
    Dec,
    // Register increment/decrement
    Inx,
    Iny,
    Dex,
    Dey,
    // Transfers
    Tax,
    Tay,
    Txa,
    Tya,
    Tsx,
    Txs,
    // Shifts and rotates (accumulator)
    Asl,
    Lsr,
    Rol,
    Ror,
    // Flag operations
    Sec,
    Clc,
    Sei,
    Cli,
    Sed,
    Cld,
    Clv,
    // Branches
    Bpl,
    Bmi,
    Bvc,
    Bvs,
    Bcc,
    Bcs,
    Bne,
    Beq,
    // Control flow
    Jmp,
    Jsr,
    Rts,
    // Stack
    Pha,
    Pla,
    Php,
    Plp,
    Nop,
}

/// Addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Relative,
}

/// A decoded instruction: what to do and how to reach the operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub mode: Mode,
}

const fn instr(mnemonic: Mnemonic, mode: Mode) -> Option<Instruction> {
    Some(Instruction { mnemonic, mode })
}

/// Decode a single opcode byte.
pub fn decode(opcode: u8) -> Option<Instruction> {
    use Mnemonic::*;
    use Mode::*;

    match opcode {
        // LDA
        0xA9 => instr(Lda, Immediate),
        0xA5 => instr(Lda, ZeroPage),
        0xAD => instr(Lda, Absolute),
        0xBD => instr(Lda, AbsoluteX),
        0xB9 => instr(Lda, AbsoluteY),
        // LDX
        0xA2 => instr(Ldx, Immediate),
        0xA6 => instr(Ldx, ZeroPage),
        0xAE => instr(Ldx, Absolute),
        // LDY
        0xA0 => instr(Ldy, Immediate),
        0xA4 => instr(Ldy, ZeroPage),
        0xAC => instr(Ldy, Absolute),
        // STA / STX / STY
        0x85 => instr(Sta, ZeroPage),
        0x8D => instr(Sta, Absolute),
        0x86 => instr(Stx, ZeroPage),
        0x8E => instr(Stx, Absolute),
        0x84 => instr(Sty, ZeroPage),
        0x8C => instr(Sty, Absolute),
        // ADC / SBC
        0x69 => instr(Adc, Immediate),
        0x65 => instr(Adc, ZeroPage),
        0x6D => instr(Adc, Absolute),
        0xE9 => instr(Sbc, Immediate),
        0xE5 => instr(Sbc, ZeroPage),
        // AND / ORA / EOR
        0x29 => instr(And, Immediate),
        0x25 => instr(And, ZeroPage),
        0x09 => instr(Ora, Immediate),
        0x05 => instr(Ora, ZeroPage),
        0x49 => instr(Eor, Immediate),
        0x45 => instr(Eor, ZeroPage),
        // Compares
        0xC9 => instr(Cmp, Immediate),
        0xC5 => instr(Cmp, ZeroPage),
        0xE0 => instr(Cpx, Immediate),
        0xC0 => instr(Cpy, Immediate),
        // BIT
        0x24 => instr(Bit, ZeroPage),
        // INC / DEC (read-modify-write)
        0xE6 => instr(Inc, ZeroPage),
        0xC6 => instr(Dec, ZeroPage),
        // Register increment/decrement
        0xE8 => instr(Inx, Implied),
        0xC8 => instr(Iny, Implied),
        0xCA => instr(Dex, Implied),
        0x88 => instr(Dey, Implied),
        // Transfers
        0xAA => instr(Tax, Implied),
        0xA8 => instr(Tay, Implied),
        0x8A => instr(Txa, Implied),
        0x98 => instr(Tya, Implied),
        0xBA => instr(Tsx, Implied),
        0x9A => instr(Txs, Implied),
        // Shifts and rotates on the accumulator
        0x0A => instr(Asl, Accumulator),
        0x4A => instr(Lsr, Accumulator),
        0x2A => instr(Rol, Accumulator),
        0x6A => instr(Ror, Accumulator),
        // Flag operations
        0x38 => instr(Sec, Implied),
        0x18 => instr(Clc, Implied),
        0x78 => instr(Sei, Implied),
        0x58 => instr(Cli, Implied),
        0xF8 => instr(Sed, Implied),
        0xD8 => instr(Cld, Implied),
        0xB8 => instr(Clv, Implied),
        // Branches
        0x10 => instr(Bpl, Relative),
        0x30 => instr(Bmi, Relative),
        0x50 => instr(Bvc, Relative),
        0x70 => instr(Bvs, Relative),
        0x90 => instr(Bcc, Relative),
        0xB0 => instr(Bcs, Relative),
        0xD0 => instr(Bne, Relative),
        0xF0 => instr(Beq, Relative),
        // Control flow
        0x4C => instr(Jmp, Absolute),
        0x20 => instr(Jsr, Absolute),
        0x60 => instr(Rts, Implied),
        // Stack
        0x48 => instr(Pha, Implied),
        0x68 => instr(Pla, Implied),
        0x08 => instr(Php, Implied),
        0x28 => instr(Plp, Implied),
        0xEA => instr(Nop, Implied),

        _ => None,
    }
}

/// Build the fixed 256-entry table consulted on every decode. Constructed
/// once when the CPU is built, never mutated afterwards.
pub fn build_table() -> [Option<Instruction>; 256] {
    let mut table = [None; 256];
    for (opcode, entry) in table.iter_mut().enumerate() {
        *entry = decode(opcode as u8);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_lda_immediate() {
        let instr = decode(0xA9).unwrap();
        assert_eq!(instr.mnemonic, Mnemonic::Lda);
        assert_eq!(instr.mode, Mode::Immediate);
    }

    #[test]
    fn test_undefined_opcode_decodes_to_none() {
        assert!(decode(0x02).is_none());
        assert!(decode(0xFF).is_none());
    }

    #[test]
    fn test_table_matches_decode() {
        let table = build_table();
        for opcode in 0..=255u8 {
            assert_eq!(table[opcode as usize], decode(opcode));
        }
    }

    #[test]
    fn test_branches_are_relative() {
        for opcode in [0x10, 0x30, 0x50, 0x70, 0x90, 0xB0, 0xD0, 0xF0] {
            assert_eq!(decode(opcode).unwrap().mode, Mode::Relative);
        }
    }

    #[test]
    fn test_stores_have_no_immediate_mode() {
        for opcode in 0..=255u8 {
            if let Some(instr) = decode(opcode) {
                if matches!(instr.mnemonic, Mnemonic::Sta | Mnemonic::Stx | Mnemonic::Sty) {
                    assert_ne!(instr.mode, Mode::Immediate, "opcode {opcode:#04x}");
                }
            }
        }
    }
}
