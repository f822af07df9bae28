//! The main decode dispatcher.  Opcode groups overlap, so decoding uses
//! ordered mask/match tests rather than a table lookup: the dense `$4E00`
//! region is matched before the generic `$4xxx` single-operand group, the
//! bit-manipulation forms before the immediate-logical group, and the
//! EXG/MULS/MULU/DIVS/DIVU sub-patterns before the generic AND/OR families.

use super::{
    decode_ea, format_branch_disp, movem_mask_to_list, read_immediate,
};
use crate::isa::{self, size_suffix};
use byteorder::{BigEndian, ByteOrder};

//===========================================================================//

/// The instruction family of a decoded opword, with the fields control-flow
/// analysis needs carried inline so no operand text is ever re-parsed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Class {
    /// A data-movement instruction (MOVE family, MOVEM, MOVEP, MOVEQ).
    Move,
    /// An arithmetic instruction (ADD/SUB/CMP families, MUL, DIV, BCD).
    Arith,
    /// A logical instruction (AND/OR/EOR/NOT and the immediate forms).
    Logic,
    /// A shift or rotate.
    Shift,
    /// A bit-manipulation instruction (BTST/BCHG/BCLR/BSET).
    Bit,
    /// Anything else without control-flow significance.
    Misc,
    /// A branch with a PC-relative displacement (Bcc, BRA, BSR, DBcc).
    Branch {
        /// Displacement from the address following the opword.
        disp: i32,
        /// True for BSR (the target is a subroutine entry).
        subroutine: bool,
        /// True for BRA (execution never falls through).
        always: bool,
    },
    /// A JMP or JSR through an effective address.
    Jump {
        /// The absolute target, when the EA names one.
        target: Option<u32>,
        /// True for JSR.
        subroutine: bool,
    },
    /// RTS, RTE, or RTR.
    Return,
    /// An opword that matched no pattern, rendered as `dc.w`.
    Data,
}

impl Class {
    /// Returns true if execution cannot fall through to the next
    /// instruction.
    pub fn is_terminal(self) -> bool {
        match self {
            Class::Return => true,
            Class::Jump { subroutine, .. } => !subroutine,
            Class::Branch { subroutine, always, .. } => always && !subroutine,
            _ => false,
        }
    }
}

//===========================================================================//

/// A decoded instruction: mnemonic text, operand text, total byte length,
/// and its control-flow class.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Decoded {
    /// The mnemonic, including any size suffix.
    pub mnemonic: String,
    /// The operand text (empty for zero-operand instructions).
    pub operands: String,
    /// Total instruction length in bytes, opword included.
    pub length: u32,
    /// The instruction family.
    pub class: Class,
}

impl Decoded {
    fn new(
        mnemonic: impl Into<String>,
        operands: impl Into<String>,
        used: usize,
        class: Class,
    ) -> Decoded {
        Decoded {
            mnemonic: mnemonic.into(),
            operands: operands.into(),
            length: 2 + used as u32,
            class,
        }
    }

    fn raw_word(op: u16) -> Decoded {
        Decoded::new("dc.w", format!("${op:04x}"), 0, Class::Data)
    }
}

//===========================================================================//

/// Decodes one opword.  `tail` is the byte stream immediately following the
/// opword, from which extension words are read.  Never fails: truncated
/// tails produce `?` placeholders and unrecognised bit patterns decode as
/// `dc.w $xxxx`, so a caller walking a byte stream can always advance.
pub fn decode_instruction(op: u16, tail: &[u8]) -> Decoded {
    // The dense $4E00 region: system instructions and JMP/JSR.
    if op & 0xFF00 == 0x4E00 {
        if op & 0xFFF0 == isa::OP_MOVE_TO_USP {
            let reg = op & 7;
            let ops = if op & 0x0008 != 0 {
                format!("usp,a{reg}")
            } else {
                format!("a{reg},usp")
            };
            return Decoded::new("move.l", ops, 0, Class::Move);
        }
        match op {
            isa::OP_NOP => return Decoded::new("nop", "", 0, Class::Misc),
            isa::OP_RTS => return Decoded::new("rts", "", 0, Class::Return),
            isa::OP_RTR => return Decoded::new("rtr", "", 0, Class::Return),
            isa::OP_RTE => return Decoded::new("rte", "", 0, Class::Return),
            isa::OP_RESET => {
                return Decoded::new("reset", "", 0, Class::Misc);
            }
            isa::OP_TRAPV => {
                return Decoded::new("trapv", "", 0, Class::Misc);
            }
            isa::OP_STOP => {
                let (imm, used) = read_immediate(tail, 0, 1);
                return Decoded::new("stop", imm, used, Class::Misc);
            }
            _ => {}
        }
        if op & 0xFFF8 == isa::OP_LINK {
            let reg = op & 7;
            let (disp, used) = read_immediate(tail, 0, 1);
            return Decoded::new(
                "link",
                format!("a{reg},{disp}"),
                used,
                Class::Misc,
            );
        }
        if op & 0xFFF8 == isa::OP_UNLK {
            return Decoded::new(
                "unlk",
                format!("a{}", op & 7),
                0,
                Class::Misc,
            );
        }
        if op & 0xFFF0 == isa::OP_TRAP {
            return Decoded::new(
                "trap",
                format!("#{}", op & 0xF),
                0,
                Class::Misc,
            );
        }
        if op & 0xFFC0 == isa::OP_JSR {
            return decode_jmp_jsr(op, tail, true);
        }
        if op & 0xFFC0 == isa::OP_JMP {
            return decode_jmp_jsr(op, tail, false);
        }
    }

    match op {
        isa::OP_ILLEGAL => return Decoded::new("illegal", "", 0, Class::Misc),
        isa::OP_ANDI_TO_CCR
        | isa::OP_ORI_TO_CCR
        | isa::OP_EORI_TO_CCR
        | isa::OP_ANDI_TO_SR
        | isa::OP_ORI_TO_SR
        | isa::OP_EORI_TO_SR => return decode_immediate_to_system(op, tail),
        _ => {}
    }

    if op & 0xF138 == 0x0108 {
        return decode_movep(op, tail);
    }

    if matches!(
        op & 0xFF00,
        isa::OP_ORI
            | isa::OP_ANDI
            | isa::OP_SUBI
            | isa::OP_ADDI
            | isa::OP_EORI
            | isa::OP_CMPI
    ) {
        return decode_immediate_logical(op, tail);
    }

    if op & 0xFF00 == 0x0800 {
        return decode_bit_manipulation(op, tail);
    }
    if op & 0xF000 == 0 && op & 0x0100 != 0 {
        return decode_bit_manipulation(op, tail);
    }

    if op & 0xF0C8 == isa::OP_DBCC {
        return decode_dbcc(op, tail);
    }
    if op & 0xF0C0 == isa::OP_SCC {
        return decode_scc(op, tail);
    }
    if op & 0xF000 == isa::OP_MOVEQ {
        let reg = (op >> 9) & 7;
        let imm8 = (op & 0xFF) as u8 as i8;
        return Decoded::new(
            "moveq",
            format!("#{imm8},d{reg}"),
            0,
            Class::Move,
        );
    }
    if op & 0xC000 == 0 {
        return decode_move_general(op, tail);
    }
    if op & 0xF000 == 0x6000 {
        return decode_branch(op, tail);
    }
    if op & 0xF000 == isa::OP_ADDQ {
        return decode_addq_subq(op, tail);
    }

    match op & 0xF000 {
        0xC000 => {
            if op & 0xF1F0 == 0xC100 {
                return decode_bcd(op, "abcd");
            }
            if op & 0xF100 == 0xC100 {
                let opmode = (op >> 3) & 0x1F;
                if matches!(opmode, 0b01000 | 0b01001 | 0b10001) {
                    return decode_exg(op);
                }
            }
            if op & 0xF0C0 == isa::OP_MULU & 0xF0C0 {
                return decode_mul_div(op, tail);
            }
            return decode_logical(op, tail);
        }
        0x8000 => {
            if op & 0xF1F0 == 0x8100 {
                return decode_bcd(op, "sbcd");
            }
            if op & 0xF0C0 == isa::OP_DIVU & 0xF0C0 {
                return decode_mul_div(op, tail);
            }
            return decode_logical(op, tail);
        }
        0xD000 => return decode_add_sub(op, tail, "add"),
        0x9000 => return decode_add_sub(op, tail, "sub"),
        0xB000 => {
            if op & 0xF138 == 0xB108 {
                return decode_cmpm(op);
            }
            return decode_cmp_eor(op, tail);
        }
        _ => {}
    }

    match op & 0xFFC0 {
        isa::OP_MOVE_FROM_SR | isa::OP_MOVE_TO_CCR | isa::OP_MOVE_TO_SR => {
            return decode_move_system(op, tail);
        }
        _ => {}
    }

    if matches!(
        op & 0xFF00,
        isa::OP_NEGX | isa::OP_CLR | isa::OP_NEG | isa::OP_NOT
    ) {
        return decode_single_operand(op, tail);
    }
    if op & 0xFFC0 == isa::OP_TAS {
        let (ea, used) = decode_ea(op & 0x3F, tail, 0, 0);
        return Decoded::new("tas", ea, used, Class::Misc);
    }
    if op & 0xFF00 == isa::OP_TST {
        return decode_single_operand(op, tail);
    }
    if op & 0xFFC0 == isa::OP_NBCD {
        let (ea, used) = decode_ea(op & 0x3F, tail, 0, 0);
        return Decoded::new("nbcd", ea, used, Class::Arith);
    }
    if op & 0xFFF8 == isa::OP_SWAP {
        return Decoded::new("swap", format!("d{}", op & 7), 0, Class::Misc);
    }
    if op & 0xFFC0 == isa::OP_PEA {
        let (ea, used) = decode_ea(op & 0x3F, tail, 0, 1);
        return Decoded::new("pea", ea, used, Class::Misc);
    }
    if op & 0xFFF8 == 0x4880 {
        return Decoded::new("ext.w", format!("d{}", op & 7), 0, Class::Misc);
    }
    if op & 0xFFF8 == 0x48C0 {
        return Decoded::new("ext.l", format!("d{}", op & 7), 0, Class::Misc);
    }
    if op & 0xFB80 == isa::OP_MOVEM {
        return decode_movem(op, tail);
    }
    if op & 0xF1C0 == isa::OP_CHK {
        let reg = (op >> 9) & 7;
        let (ea, used) = decode_ea(op & 0x3F, tail, 0, 1);
        return Decoded::new(
            "chk.w",
            format!("{ea},d{reg}"),
            used,
            Class::Arith,
        );
    }
    if op & 0xF1C0 == isa::OP_LEA {
        let reg = (op >> 9) & 7;
        let (ea, used) = decode_ea(op & 0x3F, tail, 0, 0);
        return Decoded::new("lea", format!("{ea},a{reg}"), used, Class::Misc);
    }
    if op & 0xF000 == isa::OP_SHIFT_ROTATE {
        return decode_shift_rotate(op, tail);
    }

    Decoded::raw_word(op)
}

//===========================================================================//

fn decode_jmp_jsr(op: u16, tail: &[u8], subroutine: bool) -> Decoded {
    let mnemonic = if subroutine { "jsr" } else { "jmp" };
    let ea = op & 0x3F;
    let (text, used) = decode_ea(ea, tail, 0, 1);
    // Absolute targets feed the disassembler's control-flow trace.
    let target = match (ea >> 3, ea & 7) {
        (7, 0) if tail.len() >= 2 => {
            Some(BigEndian::read_u16(tail) as i16 as i32 as u32)
        }
        (7, 1) if tail.len() >= 4 => Some(BigEndian::read_u32(tail)),
        _ => None,
    };
    Decoded::new(mnemonic, text, used, Class::Jump { target, subroutine })
}

fn decode_branch(op: u16, tail: &[u8]) -> Decoded {
    let cond = (op >> 8) & 0xF;
    let name = match cond {
        0x0 => "bra".to_string(),
        0x1 => "bsr".to_string(),
        _ => format!("b{}", isa::condition_name(cond)),
    };
    let class = |disp: i32| Class::Branch {
        disp,
        subroutine: cond == 1,
        always: cond == 0,
    };
    let disp8 = (op & 0xFF) as u8;
    if disp8 != 0x00 && disp8 != 0xFF {
        let disp = disp8 as i8 as i32;
        return Decoded::new(
            name,
            format_branch_disp(disp as i64),
            0,
            class(disp),
        );
    }
    if disp8 == 0x00 {
        if tail.len() < 2 {
            return Decoded::new(name, "?", 0, class(0));
        }
        let disp = BigEndian::read_u16(tail) as i16 as i32;
        return Decoded::new(
            name,
            format_branch_disp(disp as i64),
            2,
            class(disp),
        );
    }
    if tail.len() < 4 {
        return Decoded::new(name, "?", 0, class(0));
    }
    let disp = BigEndian::read_u32(tail) as i32;
    Decoded::new(name, format_branch_disp(disp as i64), 4, class(disp))
}

fn decode_scc(op: u16, tail: &[u8]) -> Decoded {
    let cond = (op >> 8) & 0xF;
    let (ea, used) = decode_ea(op & 0x3F, tail, 0, 0);
    Decoded::new(
        format!("s{}", isa::condition_name(cond)),
        ea,
        used,
        Class::Misc,
    )
}

fn decode_dbcc(op: u16, tail: &[u8]) -> Decoded {
    let cond = (op >> 8) & 0xF;
    let reg = op & 7;
    let mnemonic = format!("db{}", isa::condition_name(cond));
    if tail.len() < 2 {
        return Decoded::new(
            mnemonic,
            format!("d{reg},?"),
            0,
            Class::Branch { disp: 0, subroutine: false, always: false },
        );
    }
    let disp = BigEndian::read_u16(tail) as i16 as i32;
    Decoded::new(
        mnemonic,
        format!("d{reg},{}", format_branch_disp(disp as i64)),
        2,
        Class::Branch { disp, subroutine: false, always: false },
    )
}

fn decode_move_general(op: u16, tail: &[u8]) -> Decoded {
    // MOVE size bits: 01=byte, 11=word, 10=long.
    let (mut mnemonic, size) = match (op >> 12) & 3 {
        1 => ("move.b", 0u16),
        3 => ("move.w", 1),
        2 => ("move.l", 2),
        _ => return Decoded::raw_word(op),
    };
    let src_ea = op & 0x3F;
    let dst_mode = (op >> 6) & 7;
    let dst_ea = (dst_mode << 3) | ((op >> 9) & 7);
    let (src, used_src) = decode_ea(src_ea, tail, 0, size);
    let (dst, used_dst) = decode_ea(dst_ea, tail, used_src, size);
    if dst_mode == 1 {
        mnemonic = if size == 2 { "movea.l" } else { "movea.w" };
    }
    Decoded::new(
        mnemonic,
        format!("{src},{dst}"),
        used_src + used_dst,
        Class::Move,
    )
}

fn decode_movem(op: u16, tail: &[u8]) -> Decoded {
    let load = op & 0x0400 != 0;
    let mnemonic =
        if op & 0x0040 != 0 { "movem.l" } else { "movem.w" };
    if tail.len() < 2 {
        return Decoded::new(mnemonic, "?", 0, Class::Move);
    }
    let mask = BigEndian::read_u16(tail);
    let (ea, used) = decode_ea(op & 0x3F, tail, 2, 0);
    let list = movem_mask_to_list(mask);
    let ops = if load {
        format!("{ea},{list}")
    } else {
        format!("{list},{ea}")
    };
    Decoded::new(mnemonic, ops, used + 2, Class::Move)
}

fn decode_movep(op: u16, tail: &[u8]) -> Decoded {
    let data_reg = (op >> 9) & 7;
    let addr_reg = op & 7;
    let (mnemonic, mem_to_reg) = match (op >> 6) & 7 {
        4 => ("movep.w", true),
        5 => ("movep.l", true),
        6 => ("movep.w", false),
        7 => ("movep.l", false),
        _ => return Decoded::raw_word(op),
    };
    if tail.len() < 2 {
        return Decoded::new(mnemonic, "?", 0, Class::Move);
    }
    let disp = BigEndian::read_u16(tail) as i16;
    let ops = if mem_to_reg {
        format!("({disp},a{addr_reg}),d{data_reg}")
    } else {
        format!("d{data_reg},({disp},a{addr_reg})")
    };
    Decoded::new(mnemonic, ops, 2, Class::Move)
}

fn decode_move_system(op: u16, tail: &[u8]) -> Decoded {
    let (ea, used) = decode_ea(op & 0x3F, tail, 0, 1);
    let ops = match op & 0xFFC0 {
        isa::OP_MOVE_FROM_SR => format!("sr,{ea}"),
        isa::OP_MOVE_TO_CCR => format!("{ea},ccr"),
        isa::OP_MOVE_TO_SR => format!("{ea},sr"),
        _ => return Decoded::raw_word(op),
    };
    Decoded::new("move", ops, used, Class::Move)
}

fn decode_immediate_to_system(op: u16, tail: &[u8]) -> Decoded {
    let (mnemonic, reg, size) = match op {
        isa::OP_ANDI_TO_CCR => ("andi", "ccr", 0),
        isa::OP_ORI_TO_CCR => ("ori", "ccr", 0),
        isa::OP_EORI_TO_CCR => ("eori", "ccr", 0),
        isa::OP_ANDI_TO_SR => ("andi", "sr", 1),
        isa::OP_ORI_TO_SR => ("ori", "sr", 1),
        isa::OP_EORI_TO_SR => ("eori", "sr", 1),
        _ => return Decoded::raw_word(op),
    };
    let (imm, used) = read_immediate(tail, 0, size);
    Decoded::new(mnemonic, format!("{imm},{reg}"), used, Class::Logic)
}

fn decode_immediate_logical(op: u16, tail: &[u8]) -> Decoded {
    let size = (op >> 6) & 3;
    if size == 3 {
        return Decoded::raw_word(op);
    }
    let (mnemonic, class) = match op & 0xFF00 {
        isa::OP_ORI => ("ori", Class::Logic),
        isa::OP_ANDI => ("andi", Class::Logic),
        isa::OP_SUBI => ("subi", Class::Arith),
        isa::OP_ADDI => ("addi", Class::Arith),
        isa::OP_EORI => ("eori", Class::Logic),
        isa::OP_CMPI => ("cmpi", Class::Arith),
        _ => return Decoded::raw_word(op),
    };
    let (imm, used_imm) = read_immediate(tail, 0, size);
    let (ea, used_ea) = decode_ea(op & 0x3F, tail, used_imm, size);
    Decoded::new(
        format!("{mnemonic}{}", size_suffix(size)),
        format!("{imm},{ea}"),
        used_imm + used_ea,
        class,
    )
}

fn decode_logical(op: u16, tail: &[u8]) -> Decoded {
    let mnemonic = match op & 0xF000 {
        isa::OP_AND => "and",
        isa::OP_OR => "or",
        _ => return Decoded::raw_word(op),
    };
    let size = (op >> 6) & 3;
    if size == 3 {
        return Decoded::raw_word(op);
    }
    let reg = (op >> 9) & 7;
    let (ea, used) = decode_ea(op & 0x3F, tail, 0, size);
    let ops = if op & 0x0100 != 0 {
        format!("d{reg},{ea}")
    } else {
        format!("{ea},d{reg}")
    };
    Decoded::new(
        format!("{mnemonic}{}", size_suffix(size)),
        ops,
        used,
        Class::Logic,
    )
}

fn decode_add_sub(op: u16, tail: &[u8], base: &str) -> Decoded {
    // ADDX/SUBX: bit 8 set with EA mode 0 (register) or 1 (predecrement).
    if op & 0x0130 == 0x0100 && (op >> 6) & 3 != 3 {
        let size = (op >> 6) & 3;
        let src = op & 7;
        let dst = (op >> 9) & 7;
        let mnemonic = format!("{base}x{}", size_suffix(size));
        let ops = match (op >> 3) & 7 {
            0 => format!("d{src},d{dst}"),
            1 => format!("-(a{src}),-(a{dst})"),
            _ => return Decoded::raw_word(op),
        };
        return Decoded::new(mnemonic, ops, 0, Class::Arith);
    }
    let reg = (op >> 9) & 7;
    // Address arithmetic: opmode 011 (word) or 111 (long).
    match (op >> 6) & 7 {
        3 => {
            let (ea, used) = decode_ea(op & 0x3F, tail, 0, 1);
            return Decoded::new(
                format!("{base}a.w"),
                format!("{ea},a{reg}"),
                used,
                Class::Arith,
            );
        }
        7 => {
            let (ea, used) = decode_ea(op & 0x3F, tail, 0, 2);
            return Decoded::new(
                format!("{base}a.l"),
                format!("{ea},a{reg}"),
                used,
                Class::Arith,
            );
        }
        _ => {}
    }
    let size = (op >> 6) & 3;
    let (ea, used) = decode_ea(op & 0x3F, tail, 0, size);
    let ops = if op & 0x0100 != 0 {
        format!("d{reg},{ea}")
    } else {
        format!("{ea},d{reg}")
    };
    Decoded::new(
        format!("{base}{}", size_suffix(size)),
        ops,
        used,
        Class::Arith,
    )
}

fn decode_addq_subq(op: u16, tail: &[u8]) -> Decoded {
    let mut imm = (op >> 9) & 7;
    if imm == 0 {
        imm = 8;
    }
    let size = (op >> 6) & 3;
    if size == 3 {
        return Decoded::raw_word(op);
    }
    let (ea, used) = decode_ea(op & 0x3F, tail, 0, size);
    let mnemonic = if op & 0x0100 != 0 { "subq" } else { "addq" };
    Decoded::new(
        format!("{mnemonic}{}", size_suffix(size)),
        format!("#{imm},{ea}"),
        used,
        Class::Arith,
    )
}

fn decode_cmp_eor(op: u16, tail: &[u8]) -> Decoded {
    let opmode = (op >> 6) & 7;
    let reg = (op >> 9) & 7;
    // CMPA claims opmodes 011 and 111 before EOR sees bit 8.
    if op & 0x0100 != 0 && opmode != 7 {
        // EOR: size in the 3-bit opmode field.
        let size = match opmode {
            4 => 0,
            5 => 1,
            6 => 2,
            _ => return Decoded::raw_word(op),
        };
        let (ea, used) = decode_ea(op & 0x3F, tail, 0, size);
        return Decoded::new(
            format!("eor{}", size_suffix(size)),
            format!("d{reg},{ea}"),
            used,
            Class::Logic,
        );
    }
    let (mnemonic, size) = match opmode {
        3 => ("cmpa", 1),
        7 => ("cmpa", 2),
        _ => ("cmp", (op >> 6) & 3),
    };
    let (ea, used) = decode_ea(op & 0x3F, tail, 0, size);
    let ops = if mnemonic == "cmpa" {
        format!("{ea},a{reg}")
    } else {
        format!("{ea},d{reg}")
    };
    Decoded::new(
        format!("{mnemonic}{}", size_suffix(size)),
        ops,
        used,
        Class::Arith,
    )
}

fn decode_cmpm(op: u16) -> Decoded {
    let size = (op >> 6) & 3;
    let rx = (op >> 9) & 7;
    let ry = op & 7;
    Decoded::new(
        format!("cmpm{}", size_suffix(size)),
        format!("(a{ry})+,(a{rx})+"),
        0,
        Class::Arith,
    )
}

fn decode_mul_div(op: u16, tail: &[u8]) -> Decoded {
    // Bit 8 selects the signed form in both families.
    let signed = op & 0x0100 != 0;
    let mnemonic = match (op & 0xF000, signed) {
        (0xC000, false) => "mulu.w",
        (0xC000, true) => "muls.w",
        (0x8000, false) => "divu.w",
        (0x8000, true) => "divs.w",
        _ => return Decoded::raw_word(op),
    };
    let reg = (op >> 9) & 7;
    // The source operand is always word-sized.
    let (ea, used) = decode_ea(op & 0x3F, tail, 0, 1);
    Decoded::new(mnemonic, format!("{ea},d{reg}"), used, Class::Arith)
}

fn decode_exg(op: u16) -> Decoded {
    let rx = (op >> 9) & 7;
    let ry = op & 7;
    let ops = match (op >> 3) & 0x1F {
        0b01000 => format!("d{rx},d{ry}"),
        0b01001 => format!("a{rx},a{ry}"),
        0b10001 => format!("d{rx},a{ry}"),
        _ => return Decoded::raw_word(op),
    };
    Decoded::new("exg", ops, 0, Class::Misc)
}

fn decode_bcd(op: u16, mnemonic: &str) -> Decoded {
    let src = op & 7;
    let dst = (op >> 9) & 7;
    let ops = if op & 0x0008 != 0 {
        format!("-(a{src}),-(a{dst})")
    } else {
        format!("d{src},d{dst}")
    };
    Decoded::new(mnemonic, ops, 0, Class::Arith)
}

fn decode_single_operand(op: u16, tail: &[u8]) -> Decoded {
    let (mnemonic, class) = match (op >> 8) & 0xF {
        0x0 => ("negx", Class::Arith),
        0x2 => ("clr", Class::Misc),
        0x4 => ("neg", Class::Arith),
        0x6 => ("not", Class::Logic),
        0xA => ("tst", Class::Arith),
        _ => return Decoded::raw_word(op),
    };
    let size = (op >> 6) & 3;
    if size == 3 {
        return Decoded::raw_word(op);
    }
    let (ea, used) = decode_ea(op & 0x3F, tail, 0, size);
    Decoded::new(format!("{mnemonic}{}", size_suffix(size)), ea, used, class)
}

fn decode_shift_rotate(op: u16, tail: &[u8]) -> Decoded {
    let left = op & 0x0100 != 0;
    if (op >> 6) & 3 == 3 {
        // Memory form: one word-sized shift through an EA.
        let names = if left {
            ["asl", "lsl", "roxl", "rol"]
        } else {
            ["asr", "lsr", "roxr", "ror"]
        };
        let name = names[usize::from((op >> 9) & 3)];
        let (ea, used) = decode_ea(op & 0x3F, tail, 0, 1);
        return Decoded::new(name, ea, used, Class::Shift);
    }
    let mut index = usize::from((op >> 3) & 3);
    if left {
        index += 4;
    }
    let bases = ["asr", "lsr", "roxr", "ror", "asl", "lsl", "roxl", "rol"];
    let mnemonic = format!("{}{}", bases[index], size_suffix((op >> 6) & 3));
    let dst = op & 7;
    // Bit 5 set means the count lives in a data register; clear means an
    // immediate count in bits 9-11 (0 encodes 8).
    if op & 0x0020 != 0 {
        let count = (op >> 9) & 7;
        return Decoded::new(
            mnemonic,
            format!("d{count},d{dst}"),
            0,
            Class::Shift,
        );
    }
    let mut count = (op >> 9) & 7;
    if count == 0 {
        count = 8;
    }
    Decoded::new(mnemonic, format!("#{count},d{dst}"), 0, Class::Shift)
}

fn decode_bit_manipulation(op: u16, tail: &[u8]) -> Decoded {
    let base = ["btst", "bchg", "bclr", "bset"][usize::from((op >> 6) & 3)];
    let ea = op & 0x3F;
    // Destination size is long for a data register, byte for memory.
    let size = if ea >> 3 == 0 { 2 } else { 0 };
    if op & 0xFF00 == 0x0800 {
        // Static form: the bit number is an immediate byte, no size suffix.
        let (imm, used_imm) = read_immediate(tail, 0, 0);
        let (ea_text, used_ea) = decode_ea(ea, tail, used_imm, size);
        return Decoded::new(
            base,
            format!("{imm},{ea_text}"),
            used_imm + used_ea,
            Class::Bit,
        );
    }
    let reg = (op >> 9) & 7;
    let suffix = if ea >> 3 == 0 { ".l" } else { ".b" };
    let (ea_text, used) = decode_ea(ea, tail, 0, size);
    Decoded::new(
        format!("{base}{suffix}"),
        format!("d{reg},{ea_text}"),
        used,
        Class::Bit,
    )
}

//===========================================================================//

#[cfg(test)]
mod tests {
    use super::{Class, Decoded, decode_instruction};

    fn decode(op: u16, tail: &[u8]) -> (String, String) {
        let inst = decode_instruction(op, tail);
        (inst.mnemonic, inst.operands)
    }

    fn decode_text(op: u16, tail: &[u8]) -> String {
        let (mnemonic, operands) = decode(op, tail);
        if operands.is_empty() {
            mnemonic
        } else {
            format!("{mnemonic} {operands}")
        }
    }

    #[test]
    fn simple_instructions() {
        assert_eq!(decode_text(0x4E71, &[]), "nop");
        assert_eq!(decode_text(0x4E75, &[]), "rts");
        assert_eq!(decode_text(0x4E70, &[]), "reset");
        assert_eq!(decode_text(0x4E73, &[]), "rte");
        assert_eq!(decode_text(0x4E77, &[]), "rtr");
        assert_eq!(decode_text(0x4AFC, &[]), "illegal");
        assert_eq!(decode_text(0x4E76, &[]), "trapv");
        assert_eq!(decode_text(0x4E72, &[0x27, 0x00]), "stop #$2700");
        assert_eq!(decode_text(0x4E41, &[]), "trap #1");
    }

    #[test]
    fn moveq() {
        assert_eq!(decode_text(0x7010, &[]), "moveq #16,d0");
        assert_eq!(decode_text(0x7EFF, &[]), "moveq #-1,d7");
    }

    #[test]
    fn move_general() {
        assert_eq!(decode_text(0x1200, &[]), "move.b d0,d1");
        assert_eq!(
            decode_text(0x303C, &[0x12, 0x34]),
            "move.w #$1234,d0"
        );
        assert_eq!(
            decode_text(0x263C, &[0x12, 0x34, 0x56, 0x78]),
            "move.l #$12345678,d3"
        );
        assert_eq!(decode_text(0x3040, &[]), "movea.w d0,a0");
        assert_eq!(decode_text(0x2040, &[]), "movea.l d0,a0");
    }

    #[test]
    fn add_sub_cmp() {
        assert_eq!(decode_text(0xD040, &[]), "add.w d0,d0");
        assert_eq!(decode_text(0x9441, &[]), "sub.w d1,d2");
        assert_eq!(decode_text(0xB042, &[]), "cmp.w d2,d0");
        assert_eq!(decode_text(0xD0C1, &[]), "adda.w d1,a0");
        assert_eq!(decode_text(0xD1C1, &[]), "adda.l d1,a0");
        assert_eq!(decode_text(0xB0C1, &[]), "cmpa.w d1,a0");
    }

    #[test]
    fn addq_subq() {
        assert_eq!(decode_text(0x5080, &[]), "addq.l #8,d0");
        assert_eq!(decode_text(0x5183, &[]), "subq.l #8,d3");
        assert_eq!(decode_text(0x5240, &[]), "addq.w #1,d0");
    }

    #[test]
    fn addx_subx() {
        assert_eq!(decode_text(0xD101, &[]), "addx.b d1,d0");
        assert_eq!(decode_text(0xD549, &[]), "addx.w -(a1),-(a2)");
        assert_eq!(decode_text(0x9181, &[]), "subx.l d1,d0");
    }

    #[test]
    fn movem() {
        let inst = decode_instruction(0x48E7, &[0x00, 0x3F]);
        assert_eq!(inst.mnemonic, "movem.l");
        assert_eq!(inst.operands, "d0-d5,-(a7)");
        assert_eq!(inst.length, 4);
        let inst = decode_instruction(0x4CDF, &[0x40, 0x0F]);
        assert_eq!(inst.mnemonic, "movem.l");
        assert_eq!(inst.operands, "(a7)+,d0-d3/a6");
    }

    #[test]
    fn lea_pea_link_unlk() {
        assert_eq!(decode_text(0x41FA, &[0x00, 0x10]), "lea ($10,pc),a0");
        assert_eq!(decode_text(0x4850, &[]), "pea (a0)");
        assert_eq!(decode_text(0x4E50, &[0xFF, 0xFC]), "link a0,#$fffc");
        assert_eq!(decode_text(0x4E58, &[]), "unlk a0");
    }

    #[test]
    fn immediate_logicals() {
        let tail = [0x00, 0xFF];
        assert_eq!(decode(0x0240, &tail).0, "andi.w");
        assert_eq!(decode(0x0040, &tail).0, "ori.w");
        assert_eq!(decode(0x0A40, &tail).0, "eori.w");
        assert_eq!(decode(0x0640, &tail).0, "addi.w");
        assert_eq!(decode(0x0440, &tail).0, "subi.w");
        assert_eq!(decode(0x0C40, &tail).0, "cmpi.w");
    }

    #[test]
    fn logical_register_forms() {
        assert_eq!(decode_text(0xC141, &[]), "exg d0,d1");
        assert_eq!(decode_text(0xC041, &[]), "and.w d1,d0");
        assert_eq!(decode_text(0xC150, &[]), "and.w d0,(a0)");
        assert_eq!(decode_text(0xC050, &[]), "and.w (a0),d0");
        assert_eq!(decode_text(0x8543, &[]), "or.w d2,d3");
        assert_eq!(decode_text(0x8450, &[]), "or.w (a0),d2");
        assert_eq!(decode_text(0xB945, &[]), "eor.w d4,d5");
        assert_eq!(decode_text(0xB959, &[]), "eor.w d4,(a1)+");
    }

    #[test]
    fn single_operand_forms() {
        assert_eq!(decode_text(0x4200, &[]), "clr.b d0");
        assert_eq!(decode_text(0x4241, &[]), "clr.w d1");
        assert_eq!(decode_text(0x4282, &[]), "clr.l d2");
        assert_eq!(decode_text(0x4210, &[]), "clr.b (a0)");
        assert_eq!(decode_text(0x4410, &[]), "neg.b (a0)");
        assert_eq!(decode_text(0x4441, &[]), "neg.w d1");
        assert_eq!(decode_text(0x4010, &[]), "negx.b (a0)");
        assert_eq!(decode_text(0x4042, &[]), "negx.w d2");
        assert_eq!(decode_text(0x4603, &[]), "not.b d3");
        assert_eq!(decode_text(0x4804, &[]), "nbcd d4");
        assert_eq!(decode_text(0x4A05, &[]), "tst.b d5");
        assert_eq!(decode_text(0x4A46, &[]), "tst.w d6");
        assert_eq!(decode_text(0x4A9F, &[]), "tst.l (a7)+");
        assert_eq!(decode_text(0x4840, &[]), "swap d0");
        assert_eq!(decode_text(0x4847, &[]), "swap d7");
    }

    // The EA of a single-operand instruction is decoded exactly as its bits
    // say; the postincrement register is a different opword, not a fixup.
    #[test]
    fn single_operand_ea_is_faithful() {
        assert_eq!(decode_text(0x4651, &[]), "not.w (a1)");
        assert_eq!(decode_text(0x4659, &[]), "not.w (a1)+");
        assert_eq!(decode_text(0x4250, &[]), "clr.w (a0)");
    }

    #[test]
    fn branches() {
        assert_eq!(decode_text(0x6002, &[]), "bra +2");
        assert_eq!(decode_text(0x6104, &[]), "bsr +4");
        assert_eq!(decode_text(0x6606, &[]), "bne +6");
        assert_eq!(decode_text(0x6708, &[]), "beq +8");
        assert_eq!(decode_text(0x6C0A, &[]), "bge +10");
        assert_eq!(decode_text(0x66FE, &[]), "bne -2");
        assert_eq!(decode_text(0x6000, &[0x01, 0x00]), "bra +256");
    }

    #[test]
    fn branch_classes() {
        let bra = decode_instruction(0x6002, &[]);
        assert_eq!(
            bra.class,
            Class::Branch { disp: 2, subroutine: false, always: true }
        );
        assert!(bra.class.is_terminal());
        let bsr = decode_instruction(0x6104, &[]);
        assert_eq!(
            bsr.class,
            Class::Branch { disp: 4, subroutine: true, always: false }
        );
        assert!(!bsr.class.is_terminal());
        let bne = decode_instruction(0x6606, &[]);
        assert!(!bne.class.is_terminal());
        assert!(decode_instruction(0x4E75, &[]).class.is_terminal());
        let jmp = decode_instruction(0x4EF9, &[0x00, 0x00, 0x12, 0x34]);
        assert_eq!(
            jmp.class,
            Class::Jump { target: Some(0x1234), subroutine: false }
        );
        assert!(jmp.class.is_terminal());
        let jsr = decode_instruction(0x4EB9, &[0x00, 0x00, 0x00, 0x0E]);
        assert_eq!(
            jsr.class,
            Class::Jump { target: Some(0x0E), subroutine: true }
        );
        assert!(!jsr.class.is_terminal());
    }

    #[test]
    fn shift_rotate() {
        assert_eq!(decode_text(0xE048, &[]), "lsr.w #8,d0");
        assert_eq!(decode_text(0xE058, &[]), "ror.w #8,d0");
        assert_eq!(decode_text(0xE148, &[]), "lsl.w #8,d0");
        assert_eq!(decode_text(0xE158, &[]), "rol.w #8,d0");
        assert_eq!(decode_text(0xE342, &[]), "asl.w #1,d2");
        assert_eq!(decode_text(0xE062, &[]), "asr.w d0,d2");
        assert_eq!(decode_text(0xE361, &[]), "asl.w d1,d1");
    }

    #[test]
    fn bit_manipulation() {
        assert_eq!(decode_text(0x0101, &[]), "btst.l d0,d1");
        assert_eq!(decode_text(0x0542, &[]), "bchg.l d2,d2");
        assert_eq!(decode_text(0x0783, &[]), "bclr.l d3,d3");
        assert_eq!(decode_text(0x09C4, &[]), "bset.l d4,d4");
        assert_eq!(decode_text(0x0F5F, &[]), "bchg.b d7,(a7)+");
        assert_eq!(
            decode_text(0x0801, &[0x00, 0x0F]),
            "btst #15,d1"
        );
        assert_eq!(
            decode_text(0x0842, &[0x00, 0x10]),
            "bchg #16,d2"
        );
        assert_eq!(
            decode_text(0x089F, &[0x00, 0x01]),
            "bclr #1,(a7)+"
        );
        assert_eq!(
            decode_text(0x08C4, &[0x00, 0x02]),
            "bset #2,d4"
        );
    }

    #[test]
    fn jmp_jsr() {
        assert_eq!(decode_text(0x4ED0, &[]), "jmp (a0)");
        assert_eq!(
            decode_text(0x4EF9, &[0x00, 0x00, 0x12, 0x34]),
            "jmp $1234.l"
        );
        assert_eq!(decode_text(0x4E91, &[]), "jsr (a1)");
    }

    #[test]
    fn scc_dbcc() {
        let tail = [0x00, 0x0A];
        assert_eq!(decode_text(0x50C0, &tail), "st d0");
        assert_eq!(decode_text(0x51C1, &tail), "sf d1");
        assert_eq!(decode_text(0x54E0, &tail), "scc -(a0)");
        assert_eq!(decode_text(0x51C8, &tail), "dbf d0,+10");
        assert_eq!(decode_text(0x54C9, &tail), "dbcc d1,+10");
    }

    #[test]
    fn cmpm() {
        assert_eq!(decode_text(0xB308, &[]), "cmpm.b (a0)+,(a1)+");
        assert_eq!(decode_text(0xB748, &[]), "cmpm.w (a0)+,(a3)+");
        assert_eq!(decode_text(0xBB88, &[]), "cmpm.l (a0)+,(a5)+");
    }

    #[test]
    fn ext_exg() {
        assert_eq!(decode_text(0x4880, &[]), "ext.w d0");
        assert_eq!(decode_text(0x4881, &[]), "ext.w d1");
        assert_eq!(decode_text(0x48C2, &[]), "ext.l d2");
        assert_eq!(decode_text(0xC140, &[]), "exg d0,d0");
        assert_eq!(decode_text(0xC148, &[]), "exg a0,a0");
        assert_eq!(decode_text(0xC789, &[]), "exg d3,a1");
        assert_eq!(decode_text(0xCB8A, &[]), "exg d5,a2");
    }

    #[test]
    fn movep() {
        assert_eq!(
            decode_text(0x0189, &[0x12, 0x34]),
            "movep.w d0,(4660,a1)"
        );
        assert_eq!(
            decode_text(0x01CA, &[0xFF, 0xFE]),
            "movep.l d0,(-2,a2)"
        );
        assert_eq!(
            decode_text(0x010B, &[0x00, 0x00]),
            "movep.w (0,a3),d0"
        );
        assert_eq!(
            decode_text(0x054D, &[0x80, 0x00]),
            "movep.l (-32768,a5),d2"
        );
    }

    #[test]
    fn bcd() {
        assert_eq!(decode_text(0xC101, &[]), "abcd d1,d0");
        assert_eq!(decode_text(0xC309, &[]), "abcd -(a1),-(a1)");
        assert_eq!(decode_text(0x8100, &[]), "sbcd d0,d0");
    }

    #[test]
    fn system_register_moves() {
        assert_eq!(decode_text(0x40C0, &[]), "move sr,d0");
        assert_eq!(decode_text(0x44C1, &[]), "move d1,ccr");
        assert_eq!(decode_text(0x46C2, &[]), "move d2,sr");
        assert_eq!(decode_text(0x4E6B, &[]), "move.l usp,a3");
        assert_eq!(decode_text(0x4E64, &[]), "move.l a4,usp");
    }

    #[test]
    fn mul_div() {
        assert_eq!(decode_text(0xC0C1, &[]), "mulu.w d1,d0");
        assert_eq!(decode_text(0xC1C1, &[]), "muls.w d1,d0");
        assert_eq!(decode_text(0x80C1, &[]), "divu.w d1,d0");
        assert_eq!(decode_text(0x81C1, &[]), "divs.w d1,d0");
    }

    #[test]
    fn chk() {
        assert_eq!(decode_text(0x4181, &[]), "chk.w d1,d0");
        assert_eq!(decode_text(0x4190, &[]), "chk.w (a0),d0");
    }

    #[test]
    fn tas() {
        assert_eq!(decode_text(0x4AC0, &[]), "tas d0");
        assert_eq!(decode_text(0x4AD1, &[]), "tas (a1)");
    }

    #[test]
    fn unmatched_opwords_become_data() {
        let inst = decode_instruction(0x4E01, &[]);
        assert_eq!(inst.mnemonic, "dc.w");
        assert_eq!(inst.operands, "$4e01");
        assert_eq!(inst.class, Class::Data);
        assert_eq!(inst.length, 2);
    }

    #[test]
    fn truncated_tails_never_panic() {
        let inst = decode_instruction(0x303C, &[]);
        assert_eq!(inst.operands.split(',').next(), Some("#<trunc>"));
        let inst: Decoded = decode_instruction(0x4E72, &[0x27]);
        assert_eq!(inst.operands, "#<trunc>");
        assert_eq!(inst.length, 2);
    }
}
