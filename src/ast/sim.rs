//! Bytecode instructions.
//!
//! [`SimInstr`] is the decoded form of a 16-bit instruction word.
//! Every word decodes to exactly one variant, so [`SimInstr::decode`] never fails.
//!
//! ```
//! use lc3_vm::ast::sim::SimInstr;
//! use lc3_vm::ast::{ImmOrReg, IOffset};
//! use lc3_vm::ast::reg_consts::R0;
//!
//! let instr = SimInstr::decode(0x1265);
//! assert_eq!(instr.to_string(), "ADD R1, R1, #5");
//! assert_eq!(instr.encode(), 0x1265);
//!
//! let and = SimInstr::AND(R0, R0, ImmOrReg::Imm(IOffset::new(0).unwrap()));
//! assert_eq!(and.encode(), 0x5020);
//! ```

use super::{CondCode, IOffset, ImmOrReg, Reg, TrapVect8};

/// The 4-bit opcodes of the instruction set, in encoding order.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum OpCode {
    BR = 0b0000,
    ADD = 0b0001,
    LD = 0b0010,
    ST = 0b0011,
    JSR = 0b0100,
    AND = 0b0101,
    LDR = 0b0110,
    STR = 0b0111,
    RTI = 0b1000,
    NOT = 0b1001,
    LDI = 0b1010,
    STI = 0b1011,
    JMP = 0b1100,
    RES = 0b1101,
    LEA = 0b1110,
    TRAP = 0b1111,
}
impl OpCode {
    /// Reads the opcode out of bits 15..12 of an instruction word.
    pub fn of(word: u16) -> Self {
        match word >> 12 {
            0b0000 => OpCode::BR,
            0b0001 => OpCode::ADD,
            0b0010 => OpCode::LD,
            0b0011 => OpCode::ST,
            0b0100 => OpCode::JSR,
            0b0101 => OpCode::AND,
            0b0110 => OpCode::LDR,
            0b0111 => OpCode::STR,
            0b1000 => OpCode::RTI,
            0b1001 => OpCode::NOT,
            0b1010 => OpCode::LDI,
            0b1011 => OpCode::STI,
            0b1100 => OpCode::JMP,
            0b1101 => OpCode::RES,
            0b1110 => OpCode::LEA,
            _      => OpCode::TRAP,
        }
    }

    fn bits(self) -> u16 {
        (self as u16) << 12
    }
}

/// A decoded instruction.
///
/// Register operands are listed destination first, then sources.
/// PC-relative offsets are relative to the address of the *next* instruction.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum SimInstr {
    /// `BR{n}{z}{p} PCOffset9`: conditional branch.
    BR(CondCode, IOffset<9>),
    /// `ADD DR, SR1, SR2/imm5`
    ADD(Reg, Reg, ImmOrReg<5>),
    /// `LD DR, PCOffset9`
    LD(Reg, IOffset<9>),
    /// `ST SR, PCOffset9`
    ST(Reg, IOffset<9>),
    /// `JSR PCOffset11` or `JSRR BaseR`
    JSR(ImmOrReg<11>),
    /// `AND DR, SR1, SR2/imm5`
    AND(Reg, Reg, ImmOrReg<5>),
    /// `LDR DR, BaseR, offset6`
    LDR(Reg, Reg, IOffset<6>),
    /// `STR SR, BaseR, offset6`
    STR(Reg, Reg, IOffset<6>),
    /// Return from interrupt. Not supported by this machine.
    RTI,
    /// `NOT DR, SR`
    NOT(Reg, Reg),
    /// `LDI DR, PCOffset9`
    LDI(Reg, IOffset<9>),
    /// `STI SR, PCOffset9`
    STI(Reg, IOffset<9>),
    /// `JMP BaseR` (`RET` when BaseR is R7)
    JMP(Reg),
    /// The reserved opcode.
    RES,
    /// `LEA DR, PCOffset9`
    LEA(Reg, IOffset<9>),
    /// `TRAP trapvect8`
    TRAP(TrapVect8),
}

impl SimInstr {
    /// Decodes an instruction word.
    ///
    /// Bits that a given opcode does not use are ignored.
    pub fn decode(word: u16) -> Self {
        let dr = Reg::from_field(word, 9);
        let sr1 = Reg::from_field(word, 6);

        match OpCode::of(word) {
            OpCode::BR  => SimInstr::BR(((word >> 9) & 0b111) as CondCode, IOffset::from_field(word)),
            OpCode::ADD => SimInstr::ADD(dr, sr1, decode_imm5_or_reg(word)),
            OpCode::LD  => SimInstr::LD(dr, IOffset::from_field(word)),
            OpCode::ST  => SimInstr::ST(dr, IOffset::from_field(word)),
            OpCode::JSR => match word & 0x0800 != 0 {
                true  => SimInstr::JSR(ImmOrReg::Imm(IOffset::from_field(word))),
                false => SimInstr::JSR(ImmOrReg::Reg(sr1)),
            },
            OpCode::AND => SimInstr::AND(dr, sr1, decode_imm5_or_reg(word)),
            OpCode::LDR => SimInstr::LDR(dr, sr1, IOffset::from_field(word)),
            OpCode::STR => SimInstr::STR(dr, sr1, IOffset::from_field(word)),
            OpCode::RTI => SimInstr::RTI,
            OpCode::NOT => SimInstr::NOT(dr, sr1),
            OpCode::LDI => SimInstr::LDI(dr, IOffset::from_field(word)),
            OpCode::STI => SimInstr::STI(dr, IOffset::from_field(word)),
            OpCode::JMP => SimInstr::JMP(sr1),
            OpCode::RES => SimInstr::RES,
            OpCode::LEA => SimInstr::LEA(dr, IOffset::from_field(word)),
            OpCode::TRAP => SimInstr::TRAP(TrapVect8::new_trunc(word)),
        }
    }

    /// Gets the opcode of this instruction.
    pub fn opcode(&self) -> OpCode {
        match self {
            SimInstr::BR(..)  => OpCode::BR,
            SimInstr::ADD(..) => OpCode::ADD,
            SimInstr::LD(..)  => OpCode::LD,
            SimInstr::ST(..)  => OpCode::ST,
            SimInstr::JSR(..) => OpCode::JSR,
            SimInstr::AND(..) => OpCode::AND,
            SimInstr::LDR(..) => OpCode::LDR,
            SimInstr::STR(..) => OpCode::STR,
            SimInstr::RTI     => OpCode::RTI,
            SimInstr::NOT(..) => OpCode::NOT,
            SimInstr::LDI(..) => OpCode::LDI,
            SimInstr::STI(..) => OpCode::STI,
            SimInstr::JMP(..) => OpCode::JMP,
            SimInstr::RES     => OpCode::RES,
            SimInstr::LEA(..) => OpCode::LEA,
            SimInstr::TRAP(..) => OpCode::TRAP,
        }
    }

    /// Encodes this instruction into a word.
    ///
    /// Unused bits are encoded the way the standard assembler writes them
    /// (e.g., `NOT` sets its low 6 bits).
    pub fn encode(&self) -> u16 {
        let reg = |r: &Reg, shift: u32| u16::from(r.reg_no()) << shift;
        let op = self.opcode().bits();

        let operands = match self {
            SimInstr::BR(cc, off) => (u16::from(*cc & 0b111) << 9) | off.field(),
            SimInstr::ADD(dr, sr1, sr2) | SimInstr::AND(dr, sr1, sr2) => {
                reg(dr, 9) | reg(sr1, 6) | encode_imm5_or_reg(sr2)
            },
            SimInstr::LD(r, off)
            | SimInstr::ST(r, off)
            | SimInstr::LDI(r, off)
            | SimInstr::STI(r, off)
            | SimInstr::LEA(r, off) => reg(r, 9) | off.field(),
            SimInstr::JSR(ImmOrReg::Imm(off)) => 0x0800 | off.field(),
            SimInstr::JSR(ImmOrReg::Reg(br))  => reg(br, 6),
            SimInstr::LDR(r, br, off) | SimInstr::STR(r, br, off) => reg(r, 9) | reg(br, 6) | off.field(),
            SimInstr::RTI | SimInstr::RES => 0,
            SimInstr::NOT(dr, sr) => reg(dr, 9) | reg(sr, 6) | 0b111111,
            SimInstr::JMP(br) => reg(br, 6),
            SimInstr::TRAP(vect) => vect.get() & 0xFF,
        };

        op | operands
    }
}

fn decode_imm5_or_reg(word: u16) -> ImmOrReg<5> {
    match word & 0x0020 != 0 {
        true  => ImmOrReg::Imm(IOffset::from_field(word)),
        false => ImmOrReg::Reg(Reg::from_field(word, 0)),
    }
}
fn encode_imm5_or_reg(operand: &ImmOrReg<5>) -> u16 {
    match operand {
        ImmOrReg::Imm(imm) => 0x0020 | imm.field(),
        ImmOrReg::Reg(r)   => u16::from(r.reg_no()),
    }
}

impl std::fmt::Display for SimInstr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimInstr::BR(0, _) => f.write_str("NOP"),
            SimInstr::BR(cc, off) => {
                f.write_str("BR")?;
                if cc & 0b100 != 0 { f.write_str("n")?; }
                if cc & 0b010 != 0 { f.write_str("z")?; }
                if cc & 0b001 != 0 { f.write_str("p")?; }
                write!(f, " {off}")
            },
            SimInstr::ADD(dr, sr1, sr2) => write!(f, "ADD {dr}, {sr1}, {sr2}"),
            SimInstr::LD(dr, off)  => write!(f, "LD {dr}, {off}"),
            SimInstr::ST(sr, off)  => write!(f, "ST {sr}, {off}"),
            SimInstr::JSR(ImmOrReg::Imm(off)) => write!(f, "JSR {off}"),
            SimInstr::JSR(ImmOrReg::Reg(br))  => write!(f, "JSRR {br}"),
            SimInstr::AND(dr, sr1, sr2) => write!(f, "AND {dr}, {sr1}, {sr2}"),
            SimInstr::LDR(dr, br, off) => write!(f, "LDR {dr}, {br}, {off}"),
            SimInstr::STR(sr, br, off) => write!(f, "STR {sr}, {br}, {off}"),
            SimInstr::RTI => f.write_str("RTI"),
            SimInstr::NOT(dr, sr) => write!(f, "NOT {dr}, {sr}"),
            SimInstr::LDI(dr, off) => write!(f, "LDI {dr}, {off}"),
            SimInstr::STI(sr, off) => write!(f, "STI {sr}, {off}"),
            SimInstr::JMP(Reg(7)) => f.write_str("RET"),
            SimInstr::JMP(br) => write!(f, "JMP {br}"),
            SimInstr::RES => f.write_str("RES"),
            SimInstr::LEA(dr, off) => write!(f, "LEA {dr}, {off}"),
            SimInstr::TRAP(vect) => write!(f, "TRAP {vect:02X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::reg_consts::{R0, R1, R2, R3, R5, R6, R7};

    fn imm<const N: u32>(n: i16) -> IOffset<N> {
        IOffset::new(n).unwrap()
    }

    #[test]
    fn test_decode_add_modes() {
        // ADD R0, R1, #5
        assert_eq!(SimInstr::decode(0x1065), SimInstr::ADD(R0, R1, ImmOrReg::Imm(imm(5))));
        // ADD R0, R1, R2
        assert_eq!(SimInstr::decode(0x1042), SimInstr::ADD(R0, R1, ImmOrReg::Reg(R2)));
        // ADD R3, R3, #-1
        assert_eq!(SimInstr::decode(0x16FF), SimInstr::ADD(R3, R3, ImmOrReg::Imm(imm(-1))));
    }

    #[test]
    fn test_decode_offsets() {
        assert_eq!(SimInstr::decode(0x0FFD), SimInstr::BR(0b111, imm(-3)));
        assert_eq!(SimInstr::decode(0x4FFF), SimInstr::JSR(ImmOrReg::Imm(imm(-1))));
        assert_eq!(SimInstr::decode(0x4140), SimInstr::JSR(ImmOrReg::Reg(R5)));
        assert_eq!(SimInstr::decode(0x6DBF), SimInstr::LDR(R6, R6, imm(-1)));
        assert_eq!(SimInstr::decode(0xE1FF), SimInstr::LEA(R0, imm(-1)));
        assert_eq!(SimInstr::decode(0xC1C0), SimInstr::JMP(R7));
    }

    #[test]
    fn test_decode_trap_and_reserved() {
        assert_eq!(SimInstr::decode(0xF025), SimInstr::TRAP(TrapVect8::new_trunc(0x25)));
        assert_eq!(SimInstr::decode(0x8000), SimInstr::RTI);
        assert_eq!(SimInstr::decode(0xDABC), SimInstr::RES);
    }

    #[test]
    fn test_encode_matches_assembler() {
        let cases = [
            (SimInstr::AND(R0, R0, ImmOrReg::Imm(imm(0))), 0x5020),
            (SimInstr::NOT(R1, R2), 0x92BF),
            (SimInstr::BR(0b010, imm(4)), 0x0404),
            (SimInstr::LD(R2, imm(-2)), 0x25FE),
            (SimInstr::STI(R3, imm(1)), 0xB601),
            (SimInstr::STR(R0, R6, imm(-32)), 0x71A0),
            (SimInstr::JMP(R7), 0xC1C0),
            (SimInstr::TRAP(TrapVect8::new_trunc(0x22)), 0xF022),
        ];

        for (instr, word) in cases {
            assert_eq!(instr.encode(), word, "{instr}");
            assert_eq!(SimInstr::decode(word), instr, "{word:#06X}");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(SimInstr::decode(0x0FFD).to_string(), "BRnzp #-3");
        assert_eq!(SimInstr::decode(0x0000).to_string(), "NOP");
        assert_eq!(SimInstr::decode(0xC1C0).to_string(), "RET");
        assert_eq!(SimInstr::decode(0x4140).to_string(), "JSRR R5");
        assert_eq!(SimInstr::decode(0xF025).to_string(), "TRAP x25");
        assert_eq!(SimInstr::decode(0x1042).to_string(), "ADD R0, R1, R2");
    }
}
